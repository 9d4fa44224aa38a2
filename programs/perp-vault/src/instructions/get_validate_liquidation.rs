//! GetValidateLiquidation instruction handler
//!
//! This is a view/query instruction that classifies a position against the
//! liquidation rules without touching it. With `raise` set the call errors
//! out when the position is healthy, so callers can assert liquidation
//! eligibility in one step.

use {
    crate::state::{
        asset::Asset,
        oracle::OraclePrice,
        position::{Position, Side},
        vault::{LiquidationState, Vault},
    },
    anchor_lang::prelude::*,
};

/// Accounts required for querying a position's liquidation state
///
/// This instruction is read-only and doesn't modify any state.
#[derive(Accounts)]
pub struct GetValidateLiquidation<'info> {
    /// Vault account (read-only)
    #[account(
        seeds = [b"vault"],
        bump = vault.vault_bump
    )]
    pub vault: Box<Account<'info, Vault>>,

    /// Position account to query (read-only)
    #[account(
        seeds = [b"position",
                 position.owner.as_ref(),
                 custody.key().as_ref(),
                 index_asset.key().as_ref(),
                 &[position.side as u8]],
        bump = position.bump
    )]
    pub position: Box<Account<'info, Position>>,

    /// Asset account for the collateral token (read-only, carries the
    /// cumulative funding rate the position owes against)
    #[account(
        seeds = [b"asset",
                 custody.mint.as_ref()],
        bump = custody.bump
    )]
    pub custody: Box<Account<'info, Asset>>,

    /// Asset account for the index token (read-only)
    #[account(
        seeds = [b"asset",
                 index_asset.mint.as_ref()],
        bump = index_asset.bump
    )]
    pub index_asset: Box<Account<'info, Asset>>,

    /// Oracle account for the index token price feed
    ///
    /// CHECK: Oracle account, validated by constraint
    #[account(
        constraint = index_oracle_account.key() == index_asset.oracle.oracle_account
    )]
    pub index_oracle_account: AccountInfo<'info>,
}

/// Parameters for querying a position's liquidation state
#[derive(AnchorSerialize, AnchorDeserialize, Copy, Clone)]
pub struct GetValidateLiquidationParams {
    /// Error out instead of returning state 0 for a healthy position
    pub raise: bool,
}

/// Classify a position against the liquidation rules (view function)
///
/// Returns state 0 for a healthy position, 1 when losses or outstanding
/// fees exhaust the collateral (full close), 2 when only the leverage cap
/// is exceeded (deleverage). The funding owed is read from the stored
/// cumulative rate; a mutating instruction would first accrue pending
/// intervals, so this view can slightly understate the margin fee.
///
/// # Arguments
/// * `ctx` - Context containing all required accounts (read-only)
/// * `params` - The `raise` flag
///
/// # Returns
/// `Result<LiquidationState>` - Classification and outstanding margin fee
pub fn get_validate_liquidation(
    ctx: Context<GetValidateLiquidation>,
    params: &GetValidateLiquidationParams,
) -> Result<LiquidationState> {
    let vault = &ctx.accounts.vault;
    let position = &ctx.accounts.position;
    let custody = &ctx.accounts.custody;
    let index_asset = &ctx.accounts.index_asset;
    let curtime = vault.get_time()?;

    // Get index token prices (spot and EMA)
    let index_price = OraclePrice::new_from_oracle(
        &ctx.accounts.index_oracle_account.to_account_info(),
        &index_asset.oracle,
        curtime,
        false,
    )?;
    let index_ema_price = OraclePrice::new_from_oracle(
        &ctx.accounts.index_oracle_account.to_account_info(),
        &index_asset.oracle,
        curtime,
        index_asset.config.use_ema,
    )?;

    // Longs are marked at the minimized price, shorts at the maximized one
    let mark_price_usd = if position.side == Side::Long {
        index_price
            .get_min_price(&index_ema_price, index_asset.config.is_stable)?
            .get_price_usd()?
    } else {
        index_price.get_max_price(&index_ema_price).get_price_usd()?
    };

    vault.validate_liquidation(
        position,
        custody.funding.cumulative_rate,
        index_asset.config.min_profit_bps,
        mark_price_usd,
        curtime,
        params.raise,
    )
}
