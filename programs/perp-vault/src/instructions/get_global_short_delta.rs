//! GetGlobalShortDelta instruction handler
//!
//! This is a view/query instruction that reports the aggregate unrealized
//! PnL of all open shorts against one index asset, computed in O(1) from
//! the global short exposure tracker instead of iterating positions.

use {
    crate::state::{asset::Asset, oracle::OraclePrice, vault::{ProfitAndLoss, Vault}},
    anchor_lang::prelude::*,
};

/// Accounts required for querying the aggregate short PnL
///
/// This instruction is read-only and doesn't modify any state.
#[derive(Accounts)]
pub struct GetGlobalShortDelta<'info> {
    /// Vault account (read-only)
    #[account(
        seeds = [b"vault"],
        bump = vault.vault_bump
    )]
    pub vault: Box<Account<'info, Vault>>,

    /// Asset account serving as the short index (read-only)
    #[account(
        seeds = [b"asset",
                 asset.mint.as_ref()],
        bump = asset.bump
    )]
    pub asset: Box<Account<'info, Asset>>,

    /// Oracle account for the asset price feed
    ///
    /// CHECK: Oracle account, validated by constraint
    #[account(
        constraint = oracle_account.key() == asset.oracle.oracle_account
    )]
    pub oracle_account: AccountInfo<'info>,
}

/// Parameters for querying the aggregate short PnL
///
/// Currently empty, but kept for consistency with other instructions.
#[derive(AnchorSerialize, AnchorDeserialize)]
pub struct GetGlobalShortDeltaParams {}

/// Aggregate PnL of open shorts against one index asset (view function)
///
/// Marks the shorts at the maximized price, the conservative direction for
/// the pool. The tracked average is blended with the plain entry average
/// at the vault's configured weight; while the tracker is not ready the
/// entry average alone is used.
///
/// # Arguments
/// * `ctx` - Context containing all required accounts (read-only)
/// * `_params` - Parameters (currently unused)
///
/// # Returns
/// `Result<ProfitAndLoss>` - Aggregate short profit or loss in USD
pub fn get_global_short_delta(
    ctx: Context<GetGlobalShortDelta>,
    _params: &GetGlobalShortDeltaParams,
) -> Result<ProfitAndLoss> {
    let vault = &ctx.accounts.vault;
    let asset = &ctx.accounts.asset;
    let curtime = vault.get_time()?;

    // Get asset prices (spot and EMA)
    let price = OraclePrice::new_from_oracle(
        &ctx.accounts.oracle_account.to_account_info(),
        &asset.oracle,
        curtime,
        false,
    )?;
    let ema_price = OraclePrice::new_from_oracle(
        &ctx.accounts.oracle_account.to_account_info(),
        &asset.oracle,
        curtime,
        asset.config.use_ema,
    )?;
    let mark_price_usd = price.get_max_price(&ema_price).get_price_usd()?;

    let (has_profit, delta_usd) = asset.shorts.get_global_delta(
        vault.shorts_tracker_average_price_weight_bps,
        mark_price_usd,
    )?;

    Ok(if has_profit {
        ProfitAndLoss {
            profit_usd: delta_usd,
            loss_usd: 0,
        }
    } else {
        ProfitAndLoss {
            profit_usd: 0,
            loss_usd: delta_usd,
        }
    })
}
