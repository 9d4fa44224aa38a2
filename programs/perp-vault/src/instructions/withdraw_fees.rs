//! WithdrawFees instruction handler
//!
//! Moves accrued fees out of an asset's fee reserve to a receiving token
//! account. Fees accumulate token-side in `fee_reserve` from margin, swap
//! and liquidity operations; withdrawal is the only path that releases
//! them.

use {
    crate::{
        error::VaultError,
        state::{asset::Asset, vault::Vault},
    },
    anchor_lang::prelude::*,
    anchor_spl::token::{Token, TokenAccount},
};

/// Accounts required for withdrawing collected fees
#[derive(Accounts)]
pub struct WithdrawFees<'info> {
    /// Vault authority (must sign)
    #[account()]
    pub authority: Signer<'info>,

    /// Transfer authority PDA for token transfers
    ///
    /// CHECK: Empty PDA, authority for token accounts
    #[account(
        seeds = [b"transfer_authority"],
        bump = vault.transfer_authority_bump
    )]
    pub transfer_authority: AccountInfo<'info>,

    /// Vault account
    #[account(
        has_one = authority,
        seeds = [b"vault"],
        bump = vault.vault_bump
    )]
    pub vault: Box<Account<'info, Vault>>,

    /// Asset account (mutable, fee reserve will be decremented)
    #[account(
        mut,
        seeds = [b"asset",
                 asset.mint.as_ref()],
        bump = asset.bump
    )]
    pub asset: Box<Account<'info, Asset>>,

    /// Token custody holding the fees (mutable, tokens transferred out)
    #[account(
        mut,
        seeds = [b"asset_token_account",
                 asset.mint.as_ref()],
        bump = asset.token_account_bump
    )]
    pub asset_token_account: Box<Account<'info, TokenAccount>>,

    /// Receiving token account (must have the same mint as the asset)
    #[account(
        mut,
        constraint = receiving_account.mint == asset.mint
    )]
    pub receiving_account: Box<Account<'info, TokenAccount>>,

    token_program: Program<'info, Token>,
}

/// Parameters for withdrawing collected fees
#[derive(AnchorSerialize, AnchorDeserialize)]
pub struct WithdrawFeesParams {
    /// Amount of tokens to withdraw (in token decimals)
    pub amount: u64,
}

/// Withdraw collected fees from an asset
///
/// This function:
/// 1. Validates the requested amount against the fee reserve
/// 2. Moves the amount out of the fee reserve and the held balance
/// 3. Transfers tokens to the receiving account
/// 4. Re-checks balance conservation
///
/// # Arguments
/// * `ctx` - Context containing all required accounts
/// * `params` - Withdrawal amount
///
/// # Returns
/// `Result<()>` - Success if fees were withdrawn
pub fn withdraw_fees(ctx: Context<WithdrawFees>, params: &WithdrawFeesParams) -> Result<()> {
    if params.amount == 0 {
        return Err(anchor_lang::error::ErrorCode::ConstraintRaw.into());
    }

    let asset = ctx.accounts.asset.as_mut();
    msg!(
        "Withdraw fees: {} / {}",
        params.amount,
        asset.balances.fee_reserve
    );
    require_gte!(
        asset.balances.fee_reserve,
        params.amount,
        VaultError::InsufficientAmountReturned
    );

    asset.sub_fee_reserve(params.amount)?;
    asset.sub_held(params.amount)?;

    ctx.accounts.vault.transfer_tokens(
        ctx.accounts.asset_token_account.to_account_info(),
        ctx.accounts.receiving_account.to_account_info(),
        ctx.accounts.transfer_authority.to_account_info(),
        ctx.accounts.token_program.to_account_info(),
        params.amount,
    )?;

    ctx.accounts.asset.validate_balances()?;

    Ok(())
}
