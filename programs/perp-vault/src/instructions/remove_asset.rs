//! RemoveAsset instruction handler
//!
//! Deregisters a quiescent asset. The asset must carry no pool balance,
//! no reservations, no fees, no escrowed margin, no long guarantees, no LP
//! debt and no short interest; trading against it must already be fully
//! unwound. Closes the asset account and its token custody.

use {
    crate::{
        error::VaultError,
        math,
        state::{asset::Asset, vault::Vault},
    },
    anchor_lang::prelude::*,
    anchor_spl::token::{Token, TokenAccount},
};

/// Accounts required for removing an asset from the vault
#[derive(Accounts)]
pub struct RemoveAsset<'info> {
    /// Vault authority (must sign); receives rent from closed accounts
    #[account(mut)]
    pub authority: Signer<'info>,

    /// Transfer authority PDA that owns the asset token account
    ///
    /// CHECK: Empty PDA, authority for token accounts
    #[account(
        seeds = [b"transfer_authority"],
        bump = vault.transfer_authority_bump
    )]
    pub transfer_authority: AccountInfo<'info>,

    /// Vault account (mutable, shrinks by one registration entry)
    #[account(
        mut,
        has_one = authority,
        realloc = Vault::size(vault.assets.len().saturating_sub(1)),
        realloc::payer = authority,
        realloc::zero = false,
        seeds = [b"vault"],
        bump = vault.vault_bump
    )]
    pub vault: Box<Account<'info, Vault>>,

    /// Asset account to be removed (mutable, will be closed)
    #[account(
        mut,
        seeds = [b"asset",
                 asset.mint.as_ref()],
        bump = asset.bump,
        close = authority
    )]
    pub asset: Box<Account<'info, Asset>>,

    /// Token custody for the asset (mutable, will be closed)
    /// Must be empty before removal
    #[account(
        mut,
        seeds = [b"asset_token_account",
                 asset.mint.as_ref()],
        bump = asset.token_account_bump,
    )]
    pub asset_token_account: Box<Account<'info, TokenAccount>>,

    system_program: Program<'info, System>,
    token_program: Program<'info, Token>,
}

/// Parameters for removing an asset
#[derive(AnchorSerialize, AnchorDeserialize)]
pub struct RemoveAssetParams {}

/// Remove an asset from the vault
///
/// This function:
/// 1. Validates the asset holds no balances, positions or short interest
/// 2. Removes the asset from the vault's registration list
/// 3. Subtracts the asset weight from the vault's total weights
/// 4. Closes the asset token account and the asset account
///
/// # Arguments
/// * `ctx` - Context containing all required accounts
/// * `_params` - No parameters
///
/// # Returns
/// `Result<()>` - Success if the asset was removed
pub fn remove_asset(ctx: Context<RemoveAsset>, _params: &RemoveAssetParams) -> Result<()> {
    let asset = &ctx.accounts.asset;

    // Only a fully unwound asset can leave the table
    require!(
        asset.balances.held == 0
            && asset.balances.pool_amount == 0
            && asset.balances.reserved_amount == 0
            && asset.balances.fee_reserve == 0
            && asset.balances.escrowed == 0
            && asset.guaranteed_usd == 0
            && asset.lp_debt_usd == 0
            && asset.shorts.size_usd == 0,
        VaultError::AssetInUse
    );
    require!(
        ctx.accounts.asset_token_account.amount == 0,
        VaultError::AssetInUse
    );

    let vault = ctx.accounts.vault.as_mut();
    let idx = vault
        .assets
        .iter()
        .position(|key| *key == ctx.accounts.asset.key())
        .ok_or(VaultError::UnsupportedToken)?;
    vault.assets.remove(idx);
    vault.total_weights =
        math::checked_sub(vault.total_weights, ctx.accounts.asset.config.weight)?;

    // Close the token custody; the asset account itself is closed by the
    // account constraint
    vault.close_token_account(
        ctx.accounts.authority.to_account_info(),
        ctx.accounts.asset_token_account.to_account_info(),
        ctx.accounts.token_program.to_account_info(),
        ctx.accounts.transfer_authority.to_account_info(),
    )?;

    Ok(())
}
