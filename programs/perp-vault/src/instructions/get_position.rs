//! GetPosition instruction handler
//!
//! This is a view/query instruction that returns a full readout of an
//! existing position, including its unrealized PnL at the current
//! conservative mark price. It doesn't modify any state.

use {
    crate::state::{
        asset::Asset,
        oracle::OraclePrice,
        position::{Position, Side},
        vault::{PositionSnapshot, Vault},
    },
    anchor_lang::prelude::*,
};

/// Accounts required for querying a position
///
/// This instruction is read-only and doesn't modify any state.
#[derive(Accounts)]
pub struct GetPosition<'info> {
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

    /// Asset account for the collateral token (read-only)
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

/// Parameters for querying a position
///
/// Currently empty, but kept for consistency with other instructions.
#[derive(AnchorSerialize, AnchorDeserialize)]
pub struct GetPositionParams {}

/// Read out a position (view function)
///
/// Marks the position at the conservative side of the index price (the
/// minimized price for longs, the maximized one for shorts), the same mark
/// the liquidation check uses.
///
/// # Arguments
/// * `ctx` - Context containing all required accounts (read-only)
/// * `_params` - Parameters (currently unused)
///
/// # Returns
/// `Result<PositionSnapshot>` - Full position readout including PnL
pub fn get_position(ctx: Context<GetPosition>, _params: &GetPositionParams) -> Result<PositionSnapshot> {
    let vault = &ctx.accounts.vault;
    let position = &ctx.accounts.position;
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

    let mark_price_usd = if position.side == Side::Long {
        index_price
            .get_min_price(&index_ema_price, index_asset.config.is_stable)?
            .get_price_usd()?
    } else {
        index_price.get_max_price(&index_ema_price).get_price_usd()?
    };

    let (has_profit, delta_usd) = position.get_delta(
        mark_price_usd,
        vault.min_profit_time,
        index_asset.config.min_profit_bps,
        curtime,
    )?;

    Ok(PositionSnapshot {
        size_usd: position.size_usd,
        collateral_usd: position.collateral_usd,
        average_price: position.average_price,
        entry_funding_rate: position.entry_funding_rate,
        reserve_amount: position.reserve_amount,
        realized_pnl_usd: position.realized_pnl_usd,
        has_profit,
        delta_usd,
        last_increase_time: position.last_increase_time,
    })
}
