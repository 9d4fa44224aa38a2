//! SetShortAveragePrice instruction handler
//!
//! Seeds or corrects the global short exposure tracker for an asset. Used
//! after deployment or a reset, when the tracker reports not ready and NAV
//! falls back to the plain entry average. Setting a price marks the
//! tracker ready.

use {
    crate::state::{asset::Asset, vault::Vault},
    anchor_lang::prelude::*,
};

/// Accounts required for setting the tracked short average price
#[derive(Accounts)]
pub struct SetShortAveragePrice<'info> {
    /// Vault authority (must sign)
    #[account()]
    pub authority: Signer<'info>,

    /// Vault account
    #[account(
        has_one = authority,
        seeds = [b"vault"],
        bump = vault.vault_bump
    )]
    pub vault: Box<Account<'info, Vault>>,

    /// Asset whose short tracker is being seeded
    #[account(
        mut,
        seeds = [b"asset",
                 asset.mint.as_ref()],
        bump = asset.bump
    )]
    pub asset: Box<Account<'info, Asset>>,
}

/// Parameters for setting the tracked short average price
#[derive(AnchorSerialize, AnchorDeserialize, Copy, Clone)]
pub struct SetShortAveragePriceParams {
    /// Aggregate short average price (USD, Vault::USD_DECIMALS decimals)
    pub average_price: u128,
}

/// Seed the global short average price and mark the tracker ready
///
/// # Arguments
/// * `ctx` - Context containing all required accounts
/// * `params` - The new aggregate average price
///
/// # Returns
/// `Result<()>` - Success if the tracker was updated
pub fn set_short_average_price(
    ctx: Context<SetShortAveragePrice>,
    params: &SetShortAveragePriceParams,
) -> Result<()> {
    if params.average_price == 0 {
        return Err(anchor_lang::error::ErrorCode::ConstraintRaw.into());
    }

    let asset = ctx.accounts.asset.as_mut();
    asset.shorts.average_price = params.average_price;
    asset.shorts.data_ready = true;

    Ok(())
}
