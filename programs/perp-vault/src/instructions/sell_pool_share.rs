//! SellPoolShare instruction handler
//!
//! Burns pool share tokens and redeems the pro-rata slice of the pool NAV
//! in one whitelisted asset. The NAV is computed with minimized prices
//! before any balance change, so leavers get the lower bound of their
//! claim, and the redemption cannot dip into reserved funds or drain the
//! asset below its buffer floor.

use {
    crate::{
        error::VaultError,
        math,
        state::{asset::Asset, oracle::OraclePrice, vault::Vault},
    },
    anchor_lang::prelude::*,
    anchor_spl::token::{Mint, Token, TokenAccount},
};

/// Accounts required for selling pool shares
#[derive(Accounts)]
pub struct SellPoolShare<'info> {
    /// Owner of the shares (signer)
    #[account(mut)]
    pub owner: Signer<'info>,

    /// User's token account where redeemed tokens will be received
    #[account(
        mut,
        constraint = receiving_account.mint == custody.mint,
        has_one = owner
    )]
    pub receiving_account: Box<Account<'info, TokenAccount>>,

    /// User's pool share token account the shares are burned from
    #[account(
        mut,
        constraint = lp_token_account.mint == lp_token_mint.key(),
        has_one = owner
    )]
    pub lp_token_account: Box<Account<'info, TokenAccount>>,

    /// Transfer authority PDA (authority for token accounts)
    ///
    /// CHECK: This is a PDA, no data validation needed
    #[account(
        seeds = [b"transfer_authority"],
        bump = vault.transfer_authority_bump
    )]
    pub transfer_authority: AccountInfo<'info>,

    /// Vault account
    #[account(
        mut,
        seeds = [b"vault"],
        bump = vault.vault_bump
    )]
    pub vault: Box<Account<'info, Vault>>,

    /// Asset account for the token being redeemed
    #[account(
        mut,
        seeds = [b"asset",
                 custody.mint.as_ref()],
        bump = custody.bump
    )]
    pub custody: Box<Account<'info, Asset>>,

    /// Oracle account for the token being redeemed
    ///
    /// CHECK: Oracle account, validated by constraint
    #[account(
        constraint = custody_oracle_account.key() == custody.oracle.oracle_account
    )]
    pub custody_oracle_account: AccountInfo<'info>,

    /// Token custody the redemption is paid from
    #[account(
        mut,
        seeds = [b"asset_token_account",
                 custody.mint.as_ref()],
        bump = custody.token_account_bump
    )]
    pub custody_token_account: Box<Account<'info, TokenAccount>>,

    /// Pool share token mint
    #[account(
        mut,
        seeds = [b"lp_token_mint"],
        bump = vault.lp_token_bump
    )]
    pub lp_token_mint: Box<Account<'info, Mint>>,

    token_program: Program<'info, Token>,
    // remaining accounts:
    //   vault.assets.len() asset accounts (read-only, unsigned)
    //   vault.assets.len() asset oracles (read-only, unsigned)
}

/// Parameters for selling pool shares
#[derive(AnchorSerialize, AnchorDeserialize)]
pub struct SellPoolShareParams {
    /// Amount of share tokens to burn (in share token decimals)
    pub lp_amount_in: u64,
    /// Minimum tokens expected back (slippage protection)
    pub min_amount_out: u64,
}

/// Sell pool shares for a whitelisted asset
///
/// This function:
/// 1. Validates permissions and inputs
/// 2. Computes the pool NAV with minimized prices before any change
/// 3. Converts the share of NAV to tokens at the asset's maximized price
/// 4. Charges the mint/burn fee on the redeemed tokens, skewed by how the
///    withdrawal moves the asset against its target weight
/// 5. Enforces the reserve and buffer floors
/// 6. Burns the shares and pays out the net redemption
///
/// # Arguments
/// * `ctx` - Context containing all required accounts
/// * `params` - Parameters including share amount and minimum tokens out
///
/// # Returns
/// Amount of tokens sent to the user
pub fn sell_pool_share(ctx: Context<SellPoolShare>, params: &SellPoolShareParams) -> Result<u64> {
    // Check permissions
    msg!("Check permissions");
    let vault = ctx.accounts.vault.as_mut();
    require!(
        vault.permissions.allow_remove_liquidity,
        VaultError::InstructionNotAllowed
    );

    // Validate inputs
    msg!("Validate inputs");
    if params.lp_amount_in == 0 {
        return Err(anchor_lang::error::ErrorCode::ConstraintRaw.into());
    }
    let custody = ctx.accounts.custody.as_mut();

    let curtime = vault.get_time()?;
    custody.update_cumulative_funding_rate(curtime, &vault.funding)?;

    // NAV before any balance change, minimized
    msg!("Compute assets under management");
    let aum_usd = vault.get_assets_under_management_usd(ctx.remaining_accounts, curtime, false)?;
    msg!("Assets under management: {}", aum_usd);

    // Value of the burned shares
    let lp_supply = ctx.accounts.lp_token_mint.supply;
    let usd_value = math::checked_u128_mul_div(
        params.lp_amount_in as u128,
        aum_usd,
        lp_supply as u128,
    )?;

    // Get token prices (spot and EMA)
    let token_price = OraclePrice::new_from_oracle(
        &ctx.accounts.custody_oracle_account.to_account_info(),
        &custody.oracle,
        curtime,
        false,
    )?;
    let token_ema_price = OraclePrice::new_from_oracle(
        &ctx.accounts.custody_oracle_account.to_account_info(),
        &custody.oracle,
        curtime,
        custody.config.use_ema,
    )?;

    // Redemption tokens at the maximized price
    let redemption_amount = token_price
        .get_max_price(&token_ema_price)
        .get_token_amount(usd_value, custody.decimals)?;

    // Fee rate depends on how the withdrawal moves the asset's LP debt
    // against its target share
    let fee_bps = vault.get_fee_bps(
        custody,
        usd_value,
        vault.fees.mint_burn_fee_bps,
        vault.fees.tax_bps,
        false,
    )?;
    let fee_amount = vault.get_fee_amount(fee_bps, redemption_amount)?;
    msg!("Collected fee: {}", fee_amount);

    let no_fee_amount = math::checked_sub(redemption_amount, fee_amount)?;
    msg!("Amount out: {}", no_fee_amount);

    // Validate slippage protection
    require_gte!(
        no_fee_amount,
        params.min_amount_out,
        VaultError::InsufficientAmountReturned
    );

    // Update custody stats
    msg!("Update custody stats");
    custody.sub_pool_amount(redemption_amount)?;
    custody.add_fee_reserve(fee_amount)?;
    custody.sub_lp_debt(usd_value);
    vault.total_lp_debt_usd = vault.total_lp_debt_usd.saturating_sub(usd_value);

    // Check pool constraints
    msg!("Check pool constraints");
    custody.check_pool_buffer()?;

    // Transfer tokens
    msg!("Transfer tokens");
    vault.burn_tokens(
        ctx.accounts.lp_token_mint.to_account_info(),
        ctx.accounts.lp_token_account.to_account_info(),
        ctx.accounts.owner.to_account_info(),
        ctx.accounts.token_program.to_account_info(),
        params.lp_amount_in,
    )?;
    vault.transfer_tokens(
        ctx.accounts.custody_token_account.to_account_info(),
        ctx.accounts.receiving_account.to_account_info(),
        ctx.accounts.transfer_authority.to_account_info(),
        ctx.accounts.token_program.to_account_info(),
        no_fee_amount,
    )?;
    custody.sub_held(no_fee_amount)?;

    custody.validate_balances()?;

    Ok(no_fee_amount)
}
