//! DecreasePosition instruction handler
//!
//! Reduces position size, withdraws collateral, or both. PnL is realized in
//! proportion to the size reduction; setting the size delta to the full
//! position size closes it. The payout is denominated in the collateral
//! asset and converted at its maximized price.

use {
    crate::{
        error::VaultError,
        math,
        state::{
            asset::Asset,
            oracle::OraclePrice,
            position::{Position, Side},
            vault::Vault,
        },
    },
    anchor_lang::prelude::*,
    anchor_spl::token::{Token, TokenAccount},
};

/// Accounts required for decreasing a position
#[derive(Accounts)]
pub struct DecreasePosition<'info> {
    /// Position owner (must sign the transaction)
    #[account(mut)]
    pub owner: Signer<'info>,

    /// User's token account that receives the payout
    #[account(
        mut,
        constraint = receiving_account.mint == custody.mint,
        has_one = owner
    )]
    pub receiving_account: Box<Account<'info, TokenAccount>>,

    /// Transfer authority PDA (authority for token accounts)
    ///
    /// CHECK: This is a PDA, no data validation needed
    #[account(
        seeds = [b"transfer_authority"],
        bump = vault.transfer_authority_bump
    )]
    pub transfer_authority: AccountInfo<'info>,

    /// Vault account
    #[account(
        seeds = [b"vault"],
        bump = vault.vault_bump
    )]
    pub vault: Box<Account<'info, Vault>>,

    /// Position account to decrease
    #[account(
        mut,
        has_one = owner,
        seeds = [b"position",
                 owner.key().as_ref(),
                 custody.key().as_ref(),
                 index_asset.key().as_ref(),
                 &[position.side as u8]],
        bump = position.bump
    )]
    pub position: Box<Account<'info, Position>>,

    /// Asset account for the collateral token
    #[account(
        mut,
        seeds = [b"asset",
                 custody.mint.as_ref()],
        bump = custody.bump
    )]
    pub custody: Box<Account<'info, Asset>>,

    /// Oracle account for the collateral token price feed
    ///
    /// CHECK: Oracle account, validated by constraint
    #[account(
        constraint = custody_oracle_account.key() == custody.oracle.oracle_account
    )]
    pub custody_oracle_account: AccountInfo<'info>,

    /// Token custody for the collateral asset (pays the payout)
    #[account(
        mut,
        seeds = [b"asset_token_account",
                 custody.mint.as_ref()],
        bump = custody.token_account_bump
    )]
    pub custody_token_account: Box<Account<'info, TokenAccount>>,

    /// Asset account for the index token
    #[account(
        mut,
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

    token_program: Program<'info, Token>,
}

/// Parameters for decreasing a position
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy)]
pub struct DecreasePositionParams {
    /// Worst acceptable exit price (USD, Vault::USD_DECIMALS decimals)
    ///
    /// For longs: exit price must be >= acceptable_price
    /// For shorts: exit price must be <= acceptable_price
    pub acceptable_price: u128,
    /// Collateral to withdraw (USD, Vault::USD_DECIMALS decimals)
    pub collateral_delta_usd: u128,
    /// Notional size to reduce (USD, Vault::USD_DECIMALS decimals)
    pub size_delta_usd: u128,
}

/// Decrease or close a position
///
/// This function:
/// 1. Validates permissions, inputs and slippage protection
/// 2. Accrues funding on the collateral asset
/// 3. Settles the reduction against the pool and the position
/// 4. Forwards short size deltas to the global short exposure tracker
/// 5. Transfers the payout to the owner's receiving account
///
/// # Arguments
/// * `ctx` - Context containing all required accounts
/// * `params` - Parameters including price bound, collateral and size deltas
///
/// # Returns
/// Payout in collateral-asset units
pub fn decrease_position(
    ctx: Context<DecreasePosition>,
    params: &DecreasePositionParams,
) -> Result<u64> {
    // Check permissions
    msg!("Check permissions");
    let vault = ctx.accounts.vault.as_ref();
    require!(
        vault.permissions.allow_decrease_position,
        VaultError::InstructionNotAllowed
    );

    // Validate inputs
    msg!("Validate inputs");
    if params.acceptable_price == 0
        || (params.collateral_delta_usd == 0 && params.size_delta_usd == 0)
    {
        return Err(anchor_lang::error::ErrorCode::ConstraintRaw.into());
    }
    let position = ctx.accounts.position.as_mut();
    let custody = ctx.accounts.custody.as_mut();
    let index_asset = &ctx.accounts.index_asset;
    let side = position.side;

    // Accrue funding before any fee is computed against the cumulative rate
    let curtime = vault.get_time()?;
    custody.update_cumulative_funding_rate(curtime, &vault.funding)?;

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

    // Longs exit at the minimized price, shorts at the maximized one; the
    // same side serves as the conservative mark for the health check
    let exit_price_usd = if side == Side::Long {
        index_price
            .get_min_price(&index_ema_price, index_asset.config.is_stable)?
            .get_price_usd()?
    } else {
        index_price.get_max_price(&index_ema_price).get_price_usd()?
    };
    msg!("Exit price: {}", exit_price_usd);

    // Validate slippage protection
    if side == Side::Long {
        require_gte!(
            exit_price_usd,
            params.acceptable_price,
            VaultError::MaxPriceSlippage
        );
    } else {
        require_gte!(
            params.acceptable_price,
            exit_price_usd,
            VaultError::MaxPriceSlippage
        );
    }

    // Get collateral token prices (spot and EMA)
    let collateral_price = OraclePrice::new_from_oracle(
        &ctx.accounts.custody_oracle_account.to_account_info(),
        &custody.oracle,
        curtime,
        false,
    )?;
    let collateral_ema_price = OraclePrice::new_from_oracle(
        &ctx.accounts.custody_oracle_account.to_account_info(),
        &custody.oracle,
        curtime,
        custody.config.use_ema,
    )?;
    let collateral_max_price = collateral_price.get_max_price(&collateral_ema_price);

    // Settle the reduction
    msg!("Settle position");
    let amount_out = settle_decrease(
        vault,
        position,
        custody,
        index_asset.config.min_profit_bps,
        exit_price_usd,
        &collateral_max_price,
        params.collateral_delta_usd,
        params.size_delta_usd,
        curtime,
    )?;

    if side == Side::Short && params.size_delta_usd > 0 {
        let index_asset = ctx.accounts.index_asset.as_mut();
        index_asset.shorts.record_decrease(params.size_delta_usd);
    }

    // Transfer tokens
    msg!("Transfer tokens");
    if amount_out > 0 {
        vault.transfer_tokens(
            ctx.accounts.custody_token_account.to_account_info(),
            ctx.accounts.receiving_account.to_account_info(),
            ctx.accounts.transfer_authority.to_account_info(),
            ctx.accounts.token_program.to_account_info(),
            amount_out,
        )?;
        custody.sub_held(amount_out)?;
    }

    custody.validate_balances()?;

    if side == Side::Long {
        // Collateral and index are the same account passed twice; sync the
        // copies so the last writeback carries the updated data
        let index_asset = ctx.accounts.index_asset.as_mut();
        *index_asset = custody.clone();
    }

    Ok(amount_out)
}

/// Settle a size reduction and/or collateral withdrawal against the pool.
///
/// Shared by position decrease and by deleveraging liquidations. Releases
/// the proportional reserve, charges the margin and funding fees, realizes
/// PnL on the reduced size and routes the payout out of the pool (longs) or
/// out of escrow (shorts). The caller transfers `amount_out` to the
/// receiver and updates the short exposure tracker.
///
/// Token conversions floor independently for the payout and the fee so the
/// custody balance identity stays exact.
#[allow(clippy::too_many_arguments)]
pub fn settle_decrease(
    vault: &Vault,
    position: &mut Position,
    custody: &mut Asset,
    min_profit_bps: u64,
    exit_price_usd: u128,
    collateral_max_price: &OraclePrice,
    collateral_delta_usd: u128,
    size_delta_usd: u128,
    current_time: i64,
) -> Result<u64> {
    require!(position.is_open(), VaultError::InvalidPositionState);
    require_gte!(
        position.size_usd,
        size_delta_usd,
        VaultError::InvalidPositionState
    );

    let collateral_usd_before = position.collateral_usd;
    let collateral_amount_before = position.collateral_amount;
    let is_full_close = size_delta_usd == position.size_usd;

    // Release the reserve in proportion to the size reduction
    let reserve_delta = math::checked_as_u64(math::checked_u128_mul_div(
        position.reserve_amount as u128,
        size_delta_usd,
        position.size_usd,
    )?)?;
    position.reserve_amount = math::checked_sub(position.reserve_amount, reserve_delta)?;
    custody.sub_reserved(reserve_delta)?;

    // Margin fee on the reduced size plus funding owed since the last touch
    let fee_usd = math::checked_add(
        vault.get_position_fee_usd(size_delta_usd)?,
        position.get_funding_fee_usd(custody.funding.cumulative_rate)?,
    )?;
    msg!("Collected fee: {}", fee_usd);

    // Realize PnL in proportion to the reduced size
    let (has_profit, delta_usd) = position.get_delta(
        exit_price_usd,
        vault.min_profit_time,
        min_profit_bps,
        current_time,
    )?;
    let adjusted_delta_usd =
        math::checked_u128_mul_div(size_delta_usd, delta_usd, position.size_usd)?;

    let mut usd_out = 0u128;
    if adjusted_delta_usd > 0 {
        if has_profit {
            usd_out = adjusted_delta_usd;
            position.realized_pnl_usd = math::checked_add(
                position.realized_pnl_usd,
                math::checked_as_i128(adjusted_delta_usd)?,
            )?;
        } else {
            require_gte!(
                position.collateral_usd,
                adjusted_delta_usd,
                VaultError::LossesExceedCollateral
            );
            position.collateral_usd =
                math::checked_sub(position.collateral_usd, adjusted_delta_usd)?;
            position.realized_pnl_usd = math::checked_sub(
                position.realized_pnl_usd,
                math::checked_as_i128(adjusted_delta_usd)?,
            )?;
        }
    }

    // Withdraw the requested collateral
    if collateral_delta_usd > 0 {
        require_gte!(
            position.collateral_usd,
            collateral_delta_usd,
            VaultError::InsufficientCollateral
        );
        position.collateral_usd =
            math::checked_sub(position.collateral_usd, collateral_delta_usd)?;
        usd_out = math::checked_add(usd_out, collateral_delta_usd)?;
    }

    // A full close sweeps the remaining collateral into the payout
    if is_full_close {
        usd_out = math::checked_add(usd_out, position.collateral_usd)?;
        position.collateral_usd = 0;
    }

    // The fee comes out of the payout when it covers it, otherwise out of
    // the remaining collateral
    let usd_out_after_fee = if usd_out > fee_usd {
        math::checked_sub(usd_out, fee_usd)?
    } else {
        require_gte!(
            position.collateral_usd,
            fee_usd,
            VaultError::InsufficientCollateral
        );
        position.collateral_usd = math::checked_sub(position.collateral_usd, fee_usd)?;
        usd_out
    };

    let fee_tokens = collateral_max_price.get_token_amount(fee_usd, custody.decimals)?;
    let amount_out = collateral_max_price.get_token_amount(usd_out_after_fee, custody.decimals)?;
    custody.add_fee_reserve(fee_tokens)?;

    if position.side == Side::Long {
        // guaranteed_usd tracks sum(size - collateral) over long positions
        custody.add_guaranteed_usd(math::checked_sub(
            collateral_usd_before,
            position.collateral_usd,
        )?)?;
        custody.sub_guaranteed_usd(size_delta_usd)?;
        // Both the payout and the fee leave the pool
        custody.sub_pool_amount(math::checked_add(amount_out, fee_tokens)?)?;
    } else {
        // Escrow releases in proportion to the collateral consumed; the
        // difference against what is paid out settles with the pool
        let escrow_release = if is_full_close {
            position.collateral_amount
        } else {
            math::checked_as_u64(math::checked_u128_mul_div(
                collateral_amount_before as u128,
                math::checked_sub(collateral_usd_before, position.collateral_usd)?,
                collateral_usd_before,
            )?)?
        };
        position.collateral_amount =
            math::checked_sub(position.collateral_amount, escrow_release)?;
        custody.sub_escrowed(escrow_release)?;
        let used = math::checked_add(amount_out, fee_tokens)?;
        if escrow_release >= used {
            custody.add_pool_amount(math::checked_sub(escrow_release, used)?)?;
        } else {
            custody.sub_pool_amount(math::checked_sub(used, escrow_release)?)?;
        }
    }

    if is_full_close {
        msg!("Close position: realized pnl {}", position.realized_pnl_usd);
        position.size_usd = 0;
        position.average_price = 0;
        position.entry_funding_rate = 0;
        position.realized_pnl_usd = 0;
    } else {
        position.entry_funding_rate = custody.funding.cumulative_rate;
        position.size_usd = math::checked_sub(position.size_usd, size_delta_usd)?;
        require_gte!(
            position.size_usd,
            position.collateral_usd,
            VaultError::CollateralExceedsSize
        );
        vault.check_position_health(
            position,
            custody.funding.cumulative_rate,
            min_profit_bps,
            exit_price_usd,
            current_time,
        )?;
    }

    Ok(amount_out)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::state::{asset::AssetBalances, vault::FeeConfig};

    fn usd(value: u64) -> u128 {
        value as u128 * Vault::USD_POWER
    }

    fn test_vault() -> Vault {
        Vault {
            fees: FeeConfig {
                margin_fee_bps: 10,
                liquidation_fee_usd: usd(5),
                ..FeeConfig::default()
            },
            max_leverage_bps: 500_000,
            ..Vault::default()
        }
    }

    // Stable collateral custody holding a 100k short's escrow and reserve:
    // 200k pool + 10k escrow, 100k of the pool reserved, 6 decimals, 1 USD.
    fn stable_custody() -> Asset {
        Asset {
            decimals: 6,
            balances: AssetBalances {
                held: 210_000_000_000,
                pool_amount: 200_000_000_000,
                reserved_amount: 100_000_000_000,
                fee_reserve: 0,
                escrowed: 10_000_000_000,
            },
            ..Asset::default()
        }
    }

    fn short_100k_at_60k() -> Position {
        Position {
            side: Side::Short,
            size_usd: usd(100_000),
            collateral_usd: usd(10_000),
            collateral_amount: 10_000_000_000,
            average_price: usd(60_000),
            reserve_amount: 100_000_000_000,
            ..Position::default()
        }
    }

    fn one_usd() -> OraclePrice {
        OraclePrice::new(1_000_000, -6)
    }

    #[test]
    fn partial_decrease_keeps_average_and_pays_profit() {
        let vault = test_vault();
        let mut custody = stable_custody();
        let mut position = short_100k_at_60k();

        // Close 40k of the short at 54,000: 40% of the 10k profit, less the
        // 40 USD margin fee on the reduced size.
        let amount_out = settle_decrease(
            &vault,
            &mut position,
            &mut custody,
            0,
            usd(54_000),
            &one_usd(),
            0,
            usd(40_000),
            1,
        )
        .unwrap();
        assert_eq!(amount_out, 3_960_000_000);

        assert_eq!(position.average_price, usd(60_000));
        assert_eq!(position.size_usd, usd(60_000));
        assert_eq!(position.collateral_usd, usd(10_000));
        assert_eq!(position.realized_pnl_usd, usd(4_000) as i128);
        assert_eq!(position.reserve_amount, 60_000_000_000);

        assert_eq!(custody.balances.reserved_amount, 60_000_000_000);
        assert_eq!(custody.balances.fee_reserve, 40_000_000);
        // No collateral consumed, so the escrow is untouched.
        assert_eq!(custody.balances.escrowed, 10_000_000_000);

        custody.sub_held(amount_out).unwrap();
        custody.validate_balances().unwrap();
    }

    #[test]
    fn full_close_conserves_custody_balances() {
        let vault = test_vault();
        let mut custody = stable_custody();
        let mut position = short_100k_at_60k();

        // Full close at 54,000: 10k profit plus the 10k collateral sweep,
        // less the 100 USD margin fee on the whole size.
        let amount_out = settle_decrease(
            &vault,
            &mut position,
            &mut custody,
            0,
            usd(54_000),
            &one_usd(),
            0,
            usd(100_000),
            1,
        )
        .unwrap();
        assert_eq!(amount_out, 19_900_000_000);

        assert_eq!(position.size_usd, 0);
        assert_eq!(position.collateral_usd, 0);
        assert_eq!(position.collateral_amount, 0);
        assert_eq!(position.average_price, 0);
        assert_eq!(position.realized_pnl_usd, 0);

        assert_eq!(custody.balances.reserved_amount, 0);
        assert_eq!(custody.balances.escrowed, 0);
        // The profit leg comes out of the pool, the escrow covers the rest.
        assert_eq!(custody.balances.pool_amount, 190_000_000_000);
        assert_eq!(custody.balances.fee_reserve, 100_000_000);

        custody.sub_held(amount_out).unwrap();
        custody.validate_balances().unwrap();
    }

    #[test]
    fn fee_comes_from_collateral_when_payout_is_smaller() {
        let vault = test_vault();
        let mut custody = stable_custody();
        let mut position = short_100k_at_60k();

        // Flat exit: no PnL, no collateral withdrawal, so the 40 USD fee on
        // the 40k reduction has no payout to come out of.
        let amount_out = settle_decrease(
            &vault,
            &mut position,
            &mut custody,
            0,
            usd(60_000),
            &one_usd(),
            0,
            usd(40_000),
            1,
        )
        .unwrap();
        assert_eq!(amount_out, 0);

        assert_eq!(position.collateral_usd, usd(9_960));
        assert_eq!(position.collateral_amount, 9_960_000_000);

        // The consumed escrow settles the fee without touching the pool.
        assert_eq!(custody.balances.escrowed, 9_960_000_000);
        assert_eq!(custody.balances.pool_amount, 200_000_000_000);
        assert_eq!(custody.balances.fee_reserve, 40_000_000);
        custody.validate_balances().unwrap();
    }
}
