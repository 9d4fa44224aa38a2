//! Swap instruction handler
//!
//! Swaps one whitelisted asset for another. The deposit is valued at its
//! minimized price and the output at its maximized price. A single fee is
//! charged on the output leg at the worse of the two deviation-adjusted
//! rates, and LP debt shifts from the outgoing asset to the incoming one.

use {
    crate::{
        error::VaultError,
        math,
        state::{asset::Asset, oracle::OraclePrice, vault::Vault},
    },
    anchor_lang::prelude::*,
    anchor_spl::token::{Token, TokenAccount},
};

/// Accounts required for swapping tokens
#[derive(Accounts)]
pub struct Swap<'info> {
    /// Owner of the swap transaction (signer)
    #[account()]
    pub owner: Signer<'info>,

    /// User's token account from which tokens will be deposited
    #[account(
        mut,
        constraint = funding_account.mint == receiving_custody.mint,
        has_one = owner
    )]
    pub funding_account: Box<Account<'info, TokenAccount>>,

    /// User's token account where tokens will be received
    #[account(
        mut,
        constraint = receiving_account.mint == dispensing_custody.mint,
        has_one = owner
    )]
    pub receiving_account: Box<Account<'info, TokenAccount>>,

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
        seeds = [b"vault"],
        bump = vault.vault_bump
    )]
    pub vault: Box<Account<'info, Vault>>,

    /// Asset account for the token being deposited
    #[account(
        mut,
        seeds = [b"asset",
                 receiving_custody.mint.as_ref()],
        bump = receiving_custody.bump
    )]
    pub receiving_custody: Box<Account<'info, Asset>>,

    /// Oracle account for the token being deposited
    ///
    /// CHECK: Oracle account, validated by constraint
    #[account(
        constraint = receiving_custody_oracle_account.key() == receiving_custody.oracle.oracle_account
    )]
    pub receiving_custody_oracle_account: AccountInfo<'info>,

    /// Token custody where deposited tokens are stored
    #[account(
        mut,
        seeds = [b"asset_token_account",
                 receiving_custody.mint.as_ref()],
        bump = receiving_custody.token_account_bump
    )]
    pub receiving_custody_token_account: Box<Account<'info, TokenAccount>>,

    /// Asset account for the token being dispensed
    #[account(
        mut,
        seeds = [b"asset",
                 dispensing_custody.mint.as_ref()],
        bump = dispensing_custody.bump
    )]
    pub dispensing_custody: Box<Account<'info, Asset>>,

    /// Oracle account for the token being dispensed
    ///
    /// CHECK: Oracle account, validated by constraint
    #[account(
        constraint = dispensing_custody_oracle_account.key() == dispensing_custody.oracle.oracle_account
    )]
    pub dispensing_custody_oracle_account: AccountInfo<'info>,

    /// Token custody the dispensed tokens are paid from
    #[account(
        mut,
        seeds = [b"asset_token_account",
                 dispensing_custody.mint.as_ref()],
        bump = dispensing_custody.token_account_bump
    )]
    pub dispensing_custody_token_account: Box<Account<'info, TokenAccount>>,

    token_program: Program<'info, Token>,
}

/// Parameters for swapping tokens
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy)]
pub struct SwapParams {
    /// Amount of tokens to deposit (in token decimals)
    pub amount_in: u64,
    /// Minimum tokens expected (slippage protection, in token decimals)
    pub min_amount_out: u64,
}

/// Swap tokens against the pool
///
/// This function:
/// 1. Validates permissions and inputs
/// 2. Accrues funding on both assets
/// 3. Values the deposit at its minimized price and converts to output
///    tokens at their maximized price
/// 4. Charges the swap fee on the output leg at the worse of the two
///    deviation-adjusted rates
/// 5. Shifts LP debt from the outgoing asset to the incoming one
/// 6. Enforces the outgoing asset's buffer floor
/// 7. Transfers tokens both ways
///
/// # Arguments
/// * `ctx` - Context containing all required accounts
/// * `params` - Parameters including input amount and minimum output amount
///
/// # Returns
/// Amount of output tokens sent to the user
pub fn swap(ctx: Context<Swap>, params: &SwapParams) -> Result<u64> {
    // Check permissions
    msg!("Check permissions");
    let vault = ctx.accounts.vault.as_ref();
    require!(vault.permissions.allow_swap, VaultError::InstructionNotAllowed);

    // Validate inputs
    msg!("Validate inputs");
    if params.amount_in == 0 {
        return Err(anchor_lang::error::ErrorCode::ConstraintRaw.into());
    }
    let receiving_custody = ctx.accounts.receiving_custody.as_mut();
    let dispensing_custody = ctx.accounts.dispensing_custody.as_mut();
    require_keys_neq!(receiving_custody.key(), dispensing_custody.key());

    let curtime = vault.get_time()?;
    receiving_custody.update_cumulative_funding_rate(curtime, &vault.funding)?;
    dispensing_custody.update_cumulative_funding_rate(curtime, &vault.funding)?;

    // Get prices for the token being deposited (spot and EMA)
    let received_token_price = OraclePrice::new_from_oracle(
        &ctx.accounts
            .receiving_custody_oracle_account
            .to_account_info(),
        &receiving_custody.oracle,
        curtime,
        false,
    )?;
    let received_token_ema_price = OraclePrice::new_from_oracle(
        &ctx.accounts
            .receiving_custody_oracle_account
            .to_account_info(),
        &receiving_custody.oracle,
        curtime,
        receiving_custody.config.use_ema,
    )?;

    // Get prices for the token being dispensed (spot and EMA)
    let dispensed_token_price = OraclePrice::new_from_oracle(
        &ctx.accounts
            .dispensing_custody_oracle_account
            .to_account_info(),
        &dispensing_custody.oracle,
        curtime,
        false,
    )?;
    let dispensed_token_ema_price = OraclePrice::new_from_oracle(
        &ctx.accounts
            .dispensing_custody_oracle_account
            .to_account_info(),
        &dispensing_custody.oracle,
        curtime,
        dispensing_custody.config.use_ema,
    )?;

    // The deposit is valued at its minimized price, the output at its
    // maximized one
    msg!("Compute swap amount");
    let amount_in_usd = received_token_price
        .get_min_price(&received_token_ema_price, receiving_custody.config.is_stable)?
        .get_asset_amount_usd(params.amount_in, receiving_custody.decimals)?;
    let amount_out = dispensed_token_price
        .get_max_price(&dispensed_token_ema_price)
        .get_token_amount(amount_in_usd, dispensing_custody.decimals)?;

    // One fee on the output leg, at the worse of the two deviation rates
    let fee_bps = vault.get_swap_fee_bps(receiving_custody, dispensing_custody, amount_in_usd)?;
    let fee_amount = vault.get_fee_amount(fee_bps, amount_out)?;
    msg!("Collected fee: {}", fee_amount);

    let no_fee_amount = math::checked_sub(amount_out, fee_amount)?;
    msg!("Amount out: {}", no_fee_amount);

    // Validate slippage protection
    require_gte!(
        no_fee_amount,
        params.min_amount_out,
        VaultError::InsufficientAmountReturned
    );

    // Update custody stats
    msg!("Update custody stats");
    receiving_custody.add_held(params.amount_in)?;
    receiving_custody.add_pool_amount(params.amount_in)?;
    receiving_custody.add_lp_debt(amount_in_usd)?;

    dispensing_custody.sub_pool_amount(amount_out)?;
    dispensing_custody.add_fee_reserve(fee_amount)?;
    dispensing_custody.sub_lp_debt(amount_in_usd);

    // Check pool constraints
    msg!("Check pool constraints");
    dispensing_custody.check_pool_buffer()?;

    // Transfer tokens
    msg!("Transfer tokens");
    vault.transfer_tokens_from_user(
        ctx.accounts.funding_account.to_account_info(),
        ctx.accounts
            .receiving_custody_token_account
            .to_account_info(),
        ctx.accounts.owner.to_account_info(),
        ctx.accounts.token_program.to_account_info(),
        params.amount_in,
    )?;
    vault.transfer_tokens(
        ctx.accounts
            .dispensing_custody_token_account
            .to_account_info(),
        ctx.accounts.receiving_account.to_account_info(),
        ctx.accounts.transfer_authority.to_account_info(),
        ctx.accounts.token_program.to_account_info(),
        no_fee_amount,
    )?;
    dispensing_custody.sub_held(no_fee_amount)?;

    receiving_custody.validate_balances()?;
    dispensing_custody.validate_balances()?;

    Ok(no_fee_amount)
}
