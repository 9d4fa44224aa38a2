//! GetFeeBps instruction handler
//!
//! This is a view/query instruction that quotes the deviation-adjusted fee
//! rate for moving a USD amount of LP debt into or out of an asset. It
//! lets clients preview swap and liquidity fees before submitting.

use {
    crate::state::{asset::Asset, vault::Vault},
    anchor_lang::prelude::*,
};

/// Accounts required for quoting a fee rate
///
/// This instruction is read-only and doesn't modify any state.
#[derive(Accounts)]
pub struct GetFeeBps<'info> {
    /// Vault account (read-only)
    #[account(
        seeds = [b"vault"],
        bump = vault.vault_bump
    )]
    pub vault: Box<Account<'info, Vault>>,

    /// Asset account the quote is against (read-only)
    #[account(
        seeds = [b"asset",
                 asset.mint.as_ref()],
        bump = asset.bump
    )]
    pub asset: Box<Account<'info, Asset>>,
}

/// Parameters for quoting a fee rate
#[derive(AnchorSerialize, AnchorDeserialize, Copy, Clone)]
pub struct GetFeeBpsParams {
    /// USD value being moved (Vault::USD_DECIMALS decimals)
    pub usd_delta: u128,
    /// Base fee rate before the deviation adjustment, basis points
    pub base_fee_bps: u64,
    /// Deviation tax ceiling, basis points
    pub tax_bps: u64,
    /// True when LP debt moves into the asset, false when it moves out
    pub increment: bool,
}

/// Quote the deviation-adjusted fee rate for an operation (view function)
///
/// Applies the same rebate/tax skew the mutating instructions use: moves
/// toward the asset's weight-derived target earn a rebate down to at most
/// half the base fee, moves away pay an extra tax up to the full tax rate.
///
/// # Arguments
/// * `ctx` - Context containing all required accounts (read-only)
/// * `params` - USD delta, base rates and direction
///
/// # Returns
/// Fee rate in basis points
pub fn get_fee_bps(ctx: Context<GetFeeBps>, params: &GetFeeBpsParams) -> Result<u64> {
    ctx.accounts.vault.get_fee_bps(
        &ctx.accounts.asset,
        params.usd_delta,
        params.base_fee_bps,
        params.tax_bps,
        params.increment,
    )
}
