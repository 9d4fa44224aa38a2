//! Initialize instruction handler
//!
//! Creates the vault singleton, the transfer authority PDA and the LP token
//! mint. Must be called once before any other instruction. The signer
//! becomes the vault authority for all later configuration changes.

use {
    crate::{
        error::VaultError,
        state::vault::{FeeConfig, FundingConfig, Permissions, Vault},
    },
    anchor_lang::prelude::*,
    anchor_spl::token::{Mint, Token},
};

/// Accounts required for initializing the vault
#[derive(Accounts)]
pub struct Initialize<'info> {
    /// Becomes the vault authority; pays for account creation
    #[account(mut)]
    pub authority: Signer<'info>,

    /// Transfer authority PDA to be initialized (will be created)
    /// Empty PDA used as authority for the asset token accounts and the
    /// LP token mint
    ///
    /// CHECK: Empty PDA, will be set as authority for token accounts
    #[account(
        init,
        payer = authority,
        space = 0,
        seeds = [b"transfer_authority"],
        bump
    )]
    pub transfer_authority: AccountInfo<'info>,

    /// Vault account to be initialized (will be created)
    #[account(
        init,
        payer = authority,
        space = Vault::LEN,
        seeds = [b"vault"],
        bump
    )]
    pub vault: Box<Account<'info, Vault>>,

    /// LP token mint to be initialized (will be created)
    #[account(
        init,
        payer = authority,
        mint::authority = transfer_authority,
        mint::decimals = Vault::LP_DECIMALS,
        seeds = [b"lp_token_mint"],
        bump
    )]
    pub lp_token_mint: Box<Account<'info, Mint>>,

    system_program: Program<'info, System>,
    token_program: Program<'info, Token>,
    rent: Sysvar<'info, Rent>,
}

/// Parameters for initializing the vault
#[derive(AnchorSerialize, AnchorDeserialize, Copy, Clone)]
pub struct InitializeParams {
    /// Permission flags for each operation class
    pub permissions: Permissions,
    /// Fee schedule
    pub fees: FeeConfig,
    /// Funding accrual configuration
    pub funding: FundingConfig,
    /// Maximum position leverage in basis points
    pub max_leverage_bps: u64,
    /// Window after an increase during which small profits are clamped
    pub min_profit_time: i64,
    /// Blend weight of the tracked short average for NAV, basis points
    pub shorts_tracker_average_price_weight_bps: u64,
}

/// Initialize the vault
///
/// This function:
/// 1. Records the signer as the vault authority
/// 2. Stores permissions, fees, funding and leverage configuration
/// 3. Records PDA bumps for future account derivations
/// 4. Sets inception_time to current time
/// 5. Validates the resulting configuration
///
/// # Arguments
/// * `ctx` - Context containing all required accounts
/// * `params` - Initialization parameters
///
/// # Returns
/// `Result<()>` - Success if initialization completed successfully
pub fn initialize(ctx: Context<Initialize>, params: &InitializeParams) -> Result<()> {
    let vault = ctx.accounts.vault.as_mut();

    vault.authority = ctx.accounts.authority.key();
    vault.permissions = params.permissions;
    vault.fees = params.fees;
    vault.funding = params.funding;
    vault.max_leverage_bps = params.max_leverage_bps;
    vault.min_profit_time = params.min_profit_time;
    vault.shorts_tracker_average_price_weight_bps =
        params.shorts_tracker_average_price_weight_bps;
    vault.total_weights = 0;
    vault.total_lp_debt_usd = 0;
    vault.assets = Vec::new();

    // Record PDA bumps for future account derivations
    vault.transfer_authority_bump = ctx.bumps.transfer_authority;
    vault.vault_bump = ctx.bumps.vault;
    vault.lp_token_bump = ctx.bumps.lp_token_mint;

    vault.inception_time = vault.get_time()?;

    if !vault.validate() {
        return err!(VaultError::InvalidVaultConfig);
    }

    Ok(())
}
