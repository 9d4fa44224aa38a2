//! SetCustomOraclePrice instruction handler
//!
//! Writes price data into the custom oracle account of an asset. The
//! custom oracle is the price source for tests and for operational
//! overrides; production assets normally point at a Pyth feed instead.

use {
    crate::state::{asset::Asset, oracle::CustomOracle, vault::Vault},
    anchor_lang::prelude::*,
};

/// Accounts required for setting a custom oracle price
#[derive(Accounts)]
pub struct SetCustomOraclePrice<'info> {
    /// Vault authority (must sign); pays for oracle account creation
    #[account(mut)]
    pub authority: Signer<'info>,

    /// Vault account
    #[account(
        has_one = authority,
        seeds = [b"vault"],
        bump = vault.vault_bump
    )]
    pub vault: Box<Account<'info, Vault>>,

    /// Asset whose oracle price is being set
    #[account(
        seeds = [b"asset",
                 asset.mint.as_ref()],
        bump = asset.bump
    )]
    pub asset: Box<Account<'info, Asset>>,

    /// Custom oracle account (will be created if it doesn't exist)
    #[account(
        init_if_needed,
        payer = authority,
        space = CustomOracle::LEN,
        seeds = [b"oracle_account",
                 asset.mint.as_ref()],
        bump
    )]
    pub oracle_account: Box<Account<'info, CustomOracle>>,

    system_program: Program<'info, System>,
}

/// Parameters for setting a custom oracle price
#[derive(AnchorSerialize, AnchorDeserialize, Copy, Clone)]
pub struct SetCustomOraclePriceParams {
    /// Price value (scaled by exponent)
    pub price: u64,
    /// Price exponent (for decimal scaling)
    pub expo: i32,
    /// Price confidence interval
    pub conf: u64,
    /// Exponential moving average price
    pub ema: u64,
    /// Timestamp when price was published
    pub publish_time: i64,
}

/// Set or update the custom oracle price for an asset
///
/// # Arguments
/// * `ctx` - Context containing all required accounts
/// * `params` - Oracle price parameters
///
/// # Returns
/// `Result<()>` - Success if the price was stored
pub fn set_custom_oracle_price(
    ctx: Context<SetCustomOraclePrice>,
    params: &SetCustomOraclePriceParams,
) -> Result<()> {
    ctx.accounts.oracle_account.set(
        params.price,
        params.expo,
        params.conf,
        params.ema,
        params.publish_time,
    );

    Ok(())
}
