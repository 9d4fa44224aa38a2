//! SetVaultConfig instruction handler
//!
//! Replaces the vault-level configuration: permissions, fee schedule,
//! funding parameters, leverage limit, min-profit window and the short
//! tracker blend weight.

use {
    crate::{
        error::VaultError,
        state::vault::{FeeConfig, FundingConfig, Permissions, Vault},
    },
    anchor_lang::prelude::*,
};

/// Accounts required for updating the vault configuration
#[derive(Accounts)]
pub struct SetVaultConfig<'info> {
    /// Vault authority (must sign)
    #[account()]
    pub authority: Signer<'info>,

    /// Vault account to update
    #[account(
        mut,
        has_one = authority,
        seeds = [b"vault"],
        bump = vault.vault_bump
    )]
    pub vault: Box<Account<'info, Vault>>,
}

/// Parameters for updating the vault configuration
#[derive(AnchorSerialize, AnchorDeserialize, Copy, Clone)]
pub struct SetVaultConfigParams {
    pub permissions: Permissions,
    pub fees: FeeConfig,
    pub funding: FundingConfig,
    pub max_leverage_bps: u64,
    pub min_profit_time: i64,
    pub shorts_tracker_average_price_weight_bps: u64,
}

/// Update the vault configuration
///
/// # Arguments
/// * `ctx` - Context containing all required accounts
/// * `params` - New configuration values
///
/// # Returns
/// `Result<()>` - Success if the configuration was updated
pub fn set_vault_config(ctx: Context<SetVaultConfig>, params: &SetVaultConfigParams) -> Result<()> {
    let vault = ctx.accounts.vault.as_mut();

    vault.permissions = params.permissions;
    vault.fees = params.fees;
    vault.funding = params.funding;
    vault.max_leverage_bps = params.max_leverage_bps;
    vault.min_profit_time = params.min_profit_time;
    vault.shorts_tracker_average_price_weight_bps =
        params.shorts_tracker_average_price_weight_bps;

    if !vault.validate() {
        return err!(VaultError::InvalidVaultConfig);
    }

    Ok(())
}
