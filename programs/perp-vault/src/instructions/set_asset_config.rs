//! SetAssetConfig instruction handler
//!
//! Replaces a registered asset's oracle and trading configuration. Trading
//! operations never mutate configuration; this is the only path.

use {
    crate::{
        error::VaultError,
        math,
        state::{
            asset::{Asset, AssetConfig},
            oracle::OracleParams,
            vault::Vault,
        },
    },
    anchor_lang::prelude::*,
};

/// Accounts required for updating an asset's configuration
#[derive(Accounts)]
pub struct SetAssetConfig<'info> {
    /// Vault authority (must sign)
    #[account()]
    pub authority: Signer<'info>,

    /// Vault account (mutable, total weights may change)
    #[account(
        mut,
        has_one = authority,
        seeds = [b"vault"],
        bump = vault.vault_bump
    )]
    pub vault: Box<Account<'info, Vault>>,

    /// Asset account to update
    #[account(
        mut,
        seeds = [b"asset",
                 asset.mint.as_ref()],
        bump = asset.bump
    )]
    pub asset: Box<Account<'info, Asset>>,
}

/// Parameters for updating an asset's configuration
#[derive(AnchorSerialize, AnchorDeserialize, Clone)]
pub struct SetAssetConfigParams {
    /// Oracle configuration for price feeds
    pub oracle: OracleParams,
    /// Pool weight, stable/shortable flags, caps and buffer floor
    pub config: AssetConfig,
}

/// Update an asset's configuration
///
/// Adjusts the vault's total weights by the weight delta, replaces the
/// oracle and config blocks and validates the result.
///
/// # Arguments
/// * `ctx` - Context containing all required accounts
/// * `params` - New oracle and asset configuration
///
/// # Returns
/// `Result<()>` - Success if the configuration was updated
pub fn set_asset_config(ctx: Context<SetAssetConfig>, params: &SetAssetConfigParams) -> Result<()> {
    let vault = ctx.accounts.vault.as_mut();
    let asset = ctx.accounts.asset.as_mut();

    vault.total_weights = math::checked_sub(vault.total_weights, asset.config.weight)?;
    vault.total_weights = math::checked_add(vault.total_weights, params.config.weight)?;

    asset.oracle = params.oracle;
    asset.config = params.config;

    if !asset.validate() {
        return err!(VaultError::InvalidAssetConfig);
    }

    Ok(())
}
