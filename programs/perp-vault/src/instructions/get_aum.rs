//! GetAum instruction handler
//!
//! This is a view/query instruction that computes the pool's net asset
//! value on demand. Nothing is cached: every call walks the registered
//! assets with fresh oracle reads.

use {
    crate::state::vault::Vault,
    anchor_lang::prelude::*,
};

/// Accounts required for querying assets under management
///
/// This instruction is read-only and doesn't modify any state.
#[derive(Accounts)]
pub struct GetAum<'info> {
    /// Vault account (read-only)
    #[account(
        seeds = [b"vault"],
        bump = vault.vault_bump
    )]
    pub vault: Box<Account<'info, Vault>>,
    // remaining accounts:
    //   vault.assets.len() asset accounts (read-only, unsigned)
    //   vault.assets.len() asset oracles (read-only, unsigned)
}

/// Parameters for querying assets under management
#[derive(AnchorSerialize, AnchorDeserialize, Copy, Clone)]
pub struct GetAumParams {
    /// Value the unreserved pool at the upper price bound (and shorts at
    /// the lower one); false gives the opposite, lower reading
    pub maximize: bool,
}

/// Net asset value of the pool (view function)
///
/// The two `maximize` readings bracket the NAV; buy and sell share flows
/// use the maximized and minimized reading respectively. Floors at zero.
///
/// # Arguments
/// * `ctx` - Context containing all required accounts (read-only)
/// * `params` - Price bias selection
///
/// # Returns
/// Total NAV in USD (scaled to Vault::USD_DECIMALS)
pub fn get_aum(ctx: Context<GetAum>, params: &GetAumParams) -> Result<u128> {
    ctx.accounts.vault.get_assets_under_management_usd(
        ctx.remaining_accounts,
        ctx.accounts.vault.get_time()?,
        params.maximize,
    )
}
