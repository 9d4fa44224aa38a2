//! AddAsset instruction handler
//!
//! Registers a new token in the vault's whitelisted-asset table. Creates the
//! asset account and its token custody, appends the asset to the vault's
//! registration list (the NAV walk order) and adds its weight to the total.

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
    anchor_spl::token::{Mint, Token, TokenAccount},
};

/// Accounts required for adding a new asset to the vault
#[derive(Accounts)]
pub struct AddAsset<'info> {
    /// Vault authority (must sign)
    #[account(mut)]
    pub authority: Signer<'info>,

    /// Transfer authority PDA for the asset token account
    ///
    /// CHECK: Empty PDA, authority for token accounts
    #[account(
        seeds = [b"transfer_authority"],
        bump = vault.transfer_authority_bump
    )]
    pub transfer_authority: AccountInfo<'info>,

    /// Vault account (mutable, will be reallocated to fit the new entry)
    #[account(
        mut,
        has_one = authority,
        realloc = Vault::size(vault.assets.len() + 1),
        realloc::payer = authority,
        realloc::zero = false,
        seeds = [b"vault"],
        bump = vault.vault_bump
    )]
    pub vault: Box<Account<'info, Vault>>,

    /// New asset account to be initialized (PDA derived from the token mint)
    #[account(
        init_if_needed,
        payer = authority,
        space = Asset::LEN,
        seeds = [b"asset",
                 asset_token_mint.key().as_ref()],
        bump
    )]
    pub asset: Box<Account<'info, Asset>>,

    /// Token custody for the asset, owned by the transfer authority PDA
    #[account(
        init_if_needed,
        payer = authority,
        token::mint = asset_token_mint,
        token::authority = transfer_authority,
        seeds = [b"asset_token_account",
                 asset_token_mint.key().as_ref()],
        bump
    )]
    pub asset_token_account: Box<Account<'info, TokenAccount>>,

    /// Mint of the token being added
    #[account()]
    pub asset_token_mint: Box<Account<'info, Mint>>,

    system_program: Program<'info, System>,
    token_program: Program<'info, Token>,
    rent: Sysvar<'info, Rent>,
}

/// Parameters for adding a new asset
#[derive(AnchorSerialize, AnchorDeserialize, Clone)]
pub struct AddAssetParams {
    /// Oracle configuration for price feeds
    pub oracle: OracleParams,
    /// Pool weight, stable/shortable flags, caps and buffer floor
    pub config: AssetConfig,
}

/// Add a new asset to the vault
///
/// This function:
/// 1. Checks that the asset is not already registered
/// 2. Appends the asset to the vault's registration list
/// 3. Adds the asset weight to the vault's total weights
/// 4. Initializes the asset account with oracle and configuration
/// 5. Validates the resulting configuration
///
/// # Arguments
/// * `ctx` - Context containing all required accounts
/// * `params` - Oracle and asset configuration
///
/// # Returns
/// `Result<()>` - Success if the asset was registered
pub fn add_asset(ctx: Context<AddAsset>, params: &AddAssetParams) -> Result<()> {
    let vault = ctx.accounts.vault.as_mut();
    if vault.assets.contains(&ctx.accounts.asset.key()) {
        return Err(ProgramError::AccountAlreadyInitialized.into());
    }

    vault.assets.push(ctx.accounts.asset.key());
    vault.total_weights = math::checked_add(vault.total_weights, params.config.weight)?;

    let asset = ctx.accounts.asset.as_mut();
    asset.mint = ctx.accounts.asset_token_mint.key();
    asset.token_account = ctx.accounts.asset_token_account.key();
    asset.decimals = ctx.accounts.asset_token_mint.decimals;
    asset.oracle = params.oracle;
    asset.config = params.config;
    asset.bump = ctx.bumps.asset;
    asset.token_account_bump = ctx.bumps.asset_token_account;

    if !asset.validate() {
        return err!(VaultError::InvalidAssetConfig);
    }

    Ok(())
}
