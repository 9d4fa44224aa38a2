//! BuyPoolShare instruction handler
//!
//! Deposits one whitelisted asset into the pool and mints pool share tokens
//! against the net asset value. The NAV is computed over all registered
//! assets before any balance changes, with prices maximized so new entrants
//! pay the upper bound of the existing holders' value.

use {
    crate::{
        error::VaultError,
        math,
        state::{asset::Asset, oracle::OraclePrice, vault::Vault},
    },
    anchor_lang::prelude::*,
    anchor_spl::token::{Mint, Token, TokenAccount},
};

/// Accounts required for buying pool shares
#[derive(Accounts)]
pub struct BuyPoolShare<'info> {
    /// Owner of the deposit (signer)
    #[account(mut)]
    pub owner: Signer<'info>,

    /// User's token account from which tokens will be deposited
    #[account(
        mut,
        constraint = funding_account.mint == custody.mint,
        has_one = owner
    )]
    pub funding_account: Box<Account<'info, TokenAccount>>,

    /// User's pool share token account where shares will be minted
    #[account(
        mut,
        constraint = lp_token_account.mint == lp_token_mint.key(),
        has_one = owner
    )]
    pub lp_token_account: Box<Account<'info, TokenAccount>>,

    /// Transfer authority PDA (authority for token accounts and the mint)
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

    /// Asset account for the token being deposited
    #[account(
        mut,
        seeds = [b"asset",
                 custody.mint.as_ref()],
        bump = custody.bump
    )]
    pub custody: Box<Account<'info, Asset>>,

    /// Oracle account for the token being deposited
    ///
    /// CHECK: Oracle account, validated by constraint
    #[account(
        constraint = custody_oracle_account.key() == custody.oracle.oracle_account
    )]
    pub custody_oracle_account: AccountInfo<'info>,

    /// Token custody where deposited tokens will be stored
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

/// Parameters for buying pool shares
#[derive(AnchorSerialize, AnchorDeserialize)]
pub struct BuyPoolShareParams {
    /// Amount of tokens to deposit (in token's native decimals)
    pub amount_in: u64,
    /// Minimum share tokens expected (slippage protection)
    pub min_lp_amount_out: u64,
}

/// Buy pool shares with a whitelisted asset
///
/// This function:
/// 1. Validates permissions and inputs
/// 2. Computes the pool NAV with maximized prices before any change
/// 3. Charges the mint/burn fee on the deposited tokens, skewed by how the
///    deposit moves the asset against its target weight
/// 4. Values the net deposit at the minimized price and mints shares pro
///    rata against the NAV
/// 5. Transfers the deposit into the custody
///
/// # Arguments
/// * `ctx` - Context containing all required accounts
/// * `params` - Parameters including deposit amount and minimum shares out
///
/// # Returns
/// Amount of share tokens minted to the user
pub fn buy_pool_share(ctx: Context<BuyPoolShare>, params: &BuyPoolShareParams) -> Result<u64> {
    // Check permissions
    msg!("Check permissions");
    let vault = ctx.accounts.vault.as_mut();
    require!(
        vault.permissions.allow_add_liquidity,
        VaultError::InstructionNotAllowed
    );

    // Validate inputs
    msg!("Validate inputs");
    if params.amount_in == 0 {
        return Err(anchor_lang::error::ErrorCode::ConstraintRaw.into());
    }
    let custody = ctx.accounts.custody.as_mut();

    let curtime = vault.get_time()?;
    custody.update_cumulative_funding_rate(curtime, &vault.funding)?;

    // NAV before any balance change, maximized
    msg!("Compute assets under management");
    let aum_usd = vault.get_assets_under_management_usd(ctx.remaining_accounts, curtime, true)?;
    msg!("Assets under management: {}", aum_usd);

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
    let min_price = token_price.get_min_price(&token_ema_price, custody.config.is_stable)?;

    // Fee rate depends on how the deposit moves the asset's LP debt
    // against its target share
    let value_usd = min_price.get_asset_amount_usd(params.amount_in, custody.decimals)?;
    let fee_bps = vault.get_fee_bps(
        custody,
        value_usd,
        vault.fees.mint_burn_fee_bps,
        vault.fees.tax_bps,
        true,
    )?;
    let fee_amount = vault.get_fee_amount(fee_bps, params.amount_in)?;
    msg!("Collected fee: {}", fee_amount);

    // Shares are minted against the net deposit valued at the minimized
    // price
    let no_fee_amount = math::checked_sub(params.amount_in, fee_amount)?;
    let deposit_usd = min_price.get_asset_amount_usd(no_fee_amount, custody.decimals)?;

    let lp_supply = ctx.accounts.lp_token_mint.supply;
    let lp_amount = if aum_usd == 0 || lp_supply == 0 {
        // Bootstrap: one share unit per USD
        math::checked_as_u64(math::checked_div(
            deposit_usd,
            Vault::USD_POWER / Vault::LP_POWER,
        )?)?
    } else {
        math::checked_as_u64(math::checked_u128_mul_div(
            deposit_usd,
            lp_supply as u128,
            aum_usd,
        )?)?
    };
    msg!("LP tokens to mint: {}", lp_amount);

    // Validate slippage protection
    require_gte!(
        lp_amount,
        params.min_lp_amount_out,
        VaultError::InsufficientAmountReturned
    );
    require_gt!(lp_amount, 0u64, VaultError::InsufficientAmountReturned);

    // Update custody stats
    msg!("Update custody stats");
    custody.add_held(params.amount_in)?;
    custody.add_pool_amount(no_fee_amount)?;
    custody.add_fee_reserve(fee_amount)?;
    custody.add_lp_debt(deposit_usd)?;
    vault.total_lp_debt_usd = math::checked_add(vault.total_lp_debt_usd, deposit_usd)?;

    // Transfer tokens
    msg!("Transfer tokens");
    vault.transfer_tokens_from_user(
        ctx.accounts.funding_account.to_account_info(),
        ctx.accounts.custody_token_account.to_account_info(),
        ctx.accounts.owner.to_account_info(),
        ctx.accounts.token_program.to_account_info(),
        params.amount_in,
    )?;
    vault.mint_tokens(
        ctx.accounts.lp_token_mint.to_account_info(),
        ctx.accounts.lp_token_account.to_account_info(),
        ctx.accounts.transfer_authority.to_account_info(),
        ctx.accounts.token_program.to_account_info(),
        lp_amount,
    )?;

    custody.validate_balances()?;

    Ok(lp_amount)
}
