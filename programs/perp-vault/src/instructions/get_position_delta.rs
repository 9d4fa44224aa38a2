//! GetPositionDelta instruction handler
//!
//! This is a view/query instruction that calculates the current unrealized
//! profit and loss of a position, without closing it or modifying any
//! state.

use {
    crate::state::{
        asset::Asset,
        oracle::OraclePrice,
        position::{Position, Side},
        vault::{ProfitAndLoss, Vault},
    },
    anchor_lang::prelude::*,
};

/// Accounts required for querying a position's profit and loss
///
/// This instruction is read-only and doesn't modify any state.
#[derive(Accounts)]
pub struct GetPositionDelta<'info> {
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

/// Parameters for querying a position's profit and loss
///
/// Currently empty, but kept for consistency with other instructions.
#[derive(AnchorSerialize, AnchorDeserialize)]
pub struct GetPositionDeltaParams {}

/// Calculate unrealized profit and loss for a position (view function)
///
/// Uses the same conservative exit price a decrease would settle at: the
/// minimized index price for longs, the maximized one for shorts. The
/// min-profit gate applies, so small profits read as zero inside the
/// window after the last increase.
///
/// # Arguments
/// * `ctx` - Context containing all required accounts (read-only)
/// * `_params` - Parameters (currently unused)
///
/// # Returns
/// `Result<ProfitAndLoss>` - Unrealized profit and loss in USD
pub fn get_position_delta(
    ctx: Context<GetPositionDelta>,
    _params: &GetPositionDeltaParams,
) -> Result<ProfitAndLoss> {
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

    let exit_price_usd = if position.side == Side::Long {
        index_price
            .get_min_price(&index_ema_price, index_asset.config.is_stable)?
            .get_price_usd()?
    } else {
        index_price.get_max_price(&index_ema_price).get_price_usd()?
    };

    let (has_profit, delta_usd) = position.get_delta(
        exit_price_usd,
        vault.min_profit_time,
        index_asset.config.min_profit_bps,
        curtime,
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
