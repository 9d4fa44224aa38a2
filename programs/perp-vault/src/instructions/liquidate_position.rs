//! LiquidatePosition instruction handler
//!
//! Anyone can liquidate a position that fails the health check. Positions
//! whose losses or outstanding fees consume the collateral are closed
//! outright: the margin fee moves to the fee reserve, whatever collateral
//! value remains is kept by the pool and the liquidator earns the flat
//! liquidation fee. Positions that merely exceed maximum leverage are
//! deleveraged instead: size is reduced until leverage is back under the
//! cap and any payout goes to the position owner, not the liquidator.

use {
    crate::{
        error::VaultError,
        instructions::decrease_position,
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

/// Accounts required for liquidating a position
#[derive(Accounts)]
pub struct LiquidatePosition<'info> {
    /// Liquidator account (signer, receives the liquidation fee)
    #[account(mut)]
    pub signer: Signer<'info>,

    /// Position owner's token account for deleveraging payouts
    #[account(
        mut,
        constraint = receiving_account.mint == custody.mint,
        constraint = receiving_account.owner == position.owner
    )]
    pub receiving_account: Box<Account<'info, TokenAccount>>,

    /// Liquidator's token account for the liquidation fee
    #[account(
        mut,
        constraint = rewards_receiving_account.mint == custody.mint,
        constraint = rewards_receiving_account.owner == signer.key()
    )]
    pub rewards_receiving_account: Box<Account<'info, TokenAccount>>,

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

    /// Position account to liquidate
    #[account(
        mut,
        seeds = [b"position",
                 position.owner.as_ref(),
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

    /// Token custody for the collateral asset
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

/// Parameters for liquidating a position
///
/// Currently empty, but kept for consistency with other instructions.
#[derive(AnchorSerialize, AnchorDeserialize)]
pub struct LiquidatePositionParams {}

/// Liquidate or deleverage an unhealthy position
///
/// This function:
/// 1. Validates permissions and classifies the position's health
/// 2. For insolvent positions, closes them: the margin fee moves to the
///    fee reserve, remaining collateral value is kept by the pool and the
///    liquidator receives the flat liquidation fee out of the pool
/// 3. For over-leveraged positions, reduces size until leverage is back
///    under the maximum, paying any settlement to the position owner
/// 4. Releases the reserve and updates the short exposure tracker
///
/// # Arguments
/// * `ctx` - Context containing all required accounts
/// * `_params` - Parameters (currently unused)
///
/// # Returns
/// Error if the position is healthy, otherwise Ok(())
pub fn liquidate_position(
    ctx: Context<LiquidatePosition>,
    _params: &LiquidatePositionParams,
) -> Result<()> {
    // Check permissions
    msg!("Check permissions");
    let vault = ctx.accounts.vault.as_ref();
    require!(
        vault.permissions.allow_liquidation,
        VaultError::InstructionNotAllowed
    );

    let position = ctx.accounts.position.as_mut();
    let custody = ctx.accounts.custody.as_mut();
    let index_asset = &ctx.accounts.index_asset;
    let side = position.side;

    // Check position state
    msg!("Check position state");
    require!(position.is_open(), VaultError::InvalidPositionState);
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

    // Longs are marked at the minimized price, shorts at the maximized one
    let mark_price_usd = if side == Side::Long {
        index_price
            .get_min_price(&index_ema_price, index_asset.config.is_stable)?
            .get_price_usd()?
    } else {
        index_price.get_max_price(&index_ema_price).get_price_usd()?
    };
    msg!("Mark price: {}", mark_price_usd);

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

    // Errors out with PositionNotLiquidatable when the position is healthy
    let liquidation_state = vault.validate_liquidation(
        position,
        custody.funding.cumulative_rate,
        index_asset.config.min_profit_bps,
        mark_price_usd,
        curtime,
        true,
    )?;

    if liquidation_state.state == 2 {
        // Deleverage: bring size down to what the collateral net of losses
        // and fees supports at maximum leverage
        msg!("Deleverage position");
        let (has_profit, delta_usd) = position.get_delta(
            mark_price_usd,
            vault.min_profit_time,
            index_asset.config.min_profit_bps,
            curtime,
        )?;
        let remaining_collateral_usd = if has_profit {
            position.collateral_usd
        } else {
            math::checked_sub(position.collateral_usd, delta_usd)?
        };
        let free_collateral_usd = math::checked_sub(
            remaining_collateral_usd,
            liquidation_state.margin_fee_usd,
        )?;
        let target_size_usd = math::checked_u128_mul_div(
            free_collateral_usd,
            vault.max_leverage_bps as u128,
            Vault::BPS_POWER,
        )?;
        let size_delta_usd =
            if free_collateral_usd <= vault.fees.liquidation_fee_usd || target_size_usd == 0 {
                position.size_usd
            } else {
                math::checked_sub(position.size_usd, target_size_usd)?
            };
        msg!("Size delta: {}", size_delta_usd);

        let amount_out = decrease_position::settle_decrease(
            vault,
            position,
            custody,
            index_asset.config.min_profit_bps,
            mark_price_usd,
            &collateral_max_price,
            0,
            size_delta_usd,
            curtime,
        )?;
        if side == Side::Short {
            let index_asset = ctx.accounts.index_asset.as_mut();
            index_asset.shorts.record_decrease(size_delta_usd);
        }

        // Transfer tokens
        msg!("Transfer tokens");
        msg!("Amount out: {}", amount_out);
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
    } else {
        // Close the position: collateral is forfeited to the pool net of
        // the margin fee, the liquidator earns the flat liquidation fee
        msg!("Close position");
        let fee_usd = liquidation_state.margin_fee_usd;
        let fee_tokens = collateral_max_price.get_token_amount(fee_usd, custody.decimals)?;
        msg!("Collected fee: {}", fee_usd);

        custody.add_fee_reserve(fee_tokens)?;
        custody.sub_reserved(position.reserve_amount)?;
        if side == Side::Long {
            // The position no longer guarantees size - collateral; its
            // collateral value stays in the pool, the fee moves on
            custody.sub_guaranteed_usd(math::checked_sub(
                position.size_usd,
                position.collateral_usd,
            )?)?;
            custody.sub_pool_amount(fee_tokens)?;
        } else {
            // Sweep the escrowed margin; what the fee does not consume
            // joins the pool
            let escrow_release = position.collateral_amount;
            custody.sub_escrowed(escrow_release)?;
            if escrow_release >= fee_tokens {
                custody.add_pool_amount(math::checked_sub(escrow_release, fee_tokens)?)?;
            } else {
                custody.sub_pool_amount(math::checked_sub(fee_tokens, escrow_release)?)?;
            }
            let index_asset = ctx.accounts.index_asset.as_mut();
            index_asset.shorts.record_decrease(position.size_usd);
        }

        // Pay the liquidator out of the pool
        let reward_tokens =
            collateral_max_price.get_token_amount(vault.fees.liquidation_fee_usd, custody.decimals)?;
        custody.sub_pool_amount(reward_tokens)?;
        msg!("Reward: {}", reward_tokens);

        // Transfer tokens
        msg!("Transfer tokens");
        if reward_tokens > 0 {
            vault.transfer_tokens(
                ctx.accounts.custody_token_account.to_account_info(),
                ctx.accounts.rewards_receiving_account.to_account_info(),
                ctx.accounts.transfer_authority.to_account_info(),
                ctx.accounts.token_program.to_account_info(),
                reward_tokens,
            )?;
            custody.sub_held(reward_tokens)?;
        }

        position.size_usd = 0;
        position.collateral_usd = 0;
        position.collateral_amount = 0;
        position.average_price = 0;
        position.entry_funding_rate = 0;
        position.reserve_amount = 0;
        position.realized_pnl_usd = 0;
    }

    custody.validate_balances()?;

    if side == Side::Long {
        // Collateral and index are the same account passed twice; sync the
        // copies so the last writeback carries the updated data
        let index_asset = ctx.accounts.index_asset.as_mut();
        *index_asset = custody.clone();
    }

    Ok(())
}
