//! IncreasePosition instruction handler
//!
//! Opens a new position or grows an existing one. Collateral is transferred
//! in with the call; the margin fee on the size delta plus any funding owed
//! since the last touch is debited from collateral. Long margin joins the
//! pool (tracked through `guaranteed_usd`); short margin stays escrowed in
//! the collateral asset's custody and the global short exposure tracker is
//! forwarded the size delta.

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

/// Accounts required for increasing a position
///
/// For longs the collateral asset and the index asset are the same account
/// passed twice. For shorts the collateral asset must be a stable and the
/// index asset a shortable non-stable.
#[derive(Accounts)]
#[instruction(params: IncreasePositionParams)]
pub struct IncreasePosition<'info> {
    /// Position owner (must sign the transaction)
    #[account(mut)]
    pub owner: Signer<'info>,

    /// User's token account the collateral is pulled from
    ///
    /// Must match the collateral asset mint and be owned by the owner.
    #[account(
        mut,
        constraint = funding_account.mint == custody.mint,
        has_one = owner
    )]
    pub funding_account: Box<Account<'info, TokenAccount>>,

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

    /// Position account (created on first increase)
    #[account(
        init_if_needed,
        payer = owner,
        space = Position::LEN,
        seeds = [b"position",
                 owner.key().as_ref(),
                 custody.key().as_ref(),
                 index_asset.key().as_ref(),
                 &[params.side as u8]],
        bump
    )]
    pub position: Box<Account<'info, Position>>,

    /// Asset account for the collateral token (margin and reserves)
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

    /// Token custody for the collateral asset (receives the margin)
    #[account(
        mut,
        seeds = [b"asset_token_account",
                 custody.mint.as_ref()],
        bump = custody.token_account_bump
    )]
    pub custody_token_account: Box<Account<'info, TokenAccount>>,

    /// Asset account for the index token (the asset being traded)
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

    system_program: Program<'info, System>,
    token_program: Program<'info, Token>,
}

/// Parameters for increasing a position
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy)]
pub struct IncreasePositionParams {
    /// Worst acceptable entry price (USD, Vault::USD_DECIMALS decimals)
    ///
    /// For longs: entry price must be <= acceptable_price
    /// For shorts: entry price must be >= acceptable_price
    pub acceptable_price: u128,
    /// Collateral tokens to deposit (native decimals)
    pub collateral_amount: u64,
    /// Notional size to add (USD, Vault::USD_DECIMALS decimals)
    pub size_delta_usd: u128,
    /// Position side
    pub side: Side,
}

/// Open or grow a position
///
/// This function:
/// 1. Validates permissions, inputs and the collateral/index pairing
/// 2. Accrues funding on the collateral asset
/// 3. Computes the entry price and validates slippage protection
/// 4. Charges the margin fee plus funding owed and updates the position
/// 5. Reserves collateral-asset units against the added size
/// 6. Routes the margin into the pool (longs) or escrow (shorts)
/// 7. Forwards short size deltas to the global short exposure tracker
/// 8. Asserts the resulting position is healthy
///
/// # Arguments
/// * `ctx` - Context containing all required accounts
/// * `params` - Parameters including price bound, collateral and size delta
///
/// # Returns
/// Error if validation fails, otherwise Ok(())
pub fn increase_position(
    ctx: Context<IncreasePosition>,
    params: &IncreasePositionParams,
) -> Result<()> {
    // Check permissions
    msg!("Check permissions");
    let vault = ctx.accounts.vault.as_ref();
    require!(
        vault.permissions.allow_increase_position,
        VaultError::InstructionNotAllowed
    );

    // Validate inputs
    msg!("Validate inputs");
    if params.acceptable_price == 0
        || params.side == Side::None
        || (params.collateral_amount == 0 && params.size_delta_usd == 0)
    {
        return Err(anchor_lang::error::ErrorCode::ConstraintRaw.into());
    }
    let custody = ctx.accounts.custody.as_mut();
    let index_asset = &ctx.accounts.index_asset;

    // Collateral/index pairing rules
    if params.side == Side::Long {
        require_keys_eq!(
            custody.key(),
            index_asset.key(),
            VaultError::InvalidCollateralToken
        );
        require!(!custody.config.is_stable, VaultError::InvalidCollateralToken);
    } else {
        require_keys_neq!(
            custody.key(),
            index_asset.key(),
            VaultError::InvalidCollateralToken
        );
        require!(custody.config.is_stable, VaultError::InvalidCollateralToken);
        require!(
            index_asset.config.is_shortable && !index_asset.config.is_stable,
            VaultError::UnsupportedToken
        );
    }

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
    let index_max_price_usd = index_price.get_max_price(&index_ema_price).get_price_usd()?;
    let index_min_price_usd = index_price
        .get_min_price(&index_ema_price, index_asset.config.is_stable)?
        .get_price_usd()?;

    // Longs enter at the maximized price, shorts at the minimized one
    let entry_price_usd = if params.side == Side::Long {
        index_max_price_usd
    } else {
        index_min_price_usd
    };
    msg!("Entry price: {}", entry_price_usd);

    // Validate slippage protection
    if params.side == Side::Long {
        require_gte!(
            params.acceptable_price,
            entry_price_usd,
            VaultError::MaxPriceSlippage
        );
    } else {
        require_gte!(
            entry_price_usd,
            params.acceptable_price,
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
    let collateral_min_price =
        collateral_price.get_min_price(&collateral_ema_price, custody.config.is_stable)?;
    let collateral_max_price = collateral_price.get_max_price(&collateral_ema_price);

    // Update the position
    msg!("Update position");
    let position = ctx.accounts.position.as_mut();
    if position.size_usd == 0 {
        position.owner = ctx.accounts.owner.key();
        position.collateral_asset = custody.key();
        position.index_asset = index_asset.key();
        position.side = params.side;
        position.open_time = curtime;
        position.average_price = entry_price_usd;
        position.bump = ctx.bumps.position;
    } else if params.size_delta_usd > 0 {
        // Realized-PnL-neutral weighted entry; decreases never touch it
        position.average_price = position.get_next_average_price(
            params.size_delta_usd,
            entry_price_usd,
            vault.min_profit_time,
            index_asset.config.min_profit_bps,
            curtime,
        )?;
    }

    // Margin fee on the size delta plus funding owed since the last touch
    let position_fee_usd = vault.get_position_fee_usd(params.size_delta_usd)?;
    let funding_fee_usd = position.get_funding_fee_usd(custody.funding.cumulative_rate)?;
    let fee_usd = math::checked_add(position_fee_usd, funding_fee_usd)?;
    // Fee tokens leave at the maximized collateral price
    let fee_tokens = collateral_max_price.get_token_amount(fee_usd, custody.decimals)?;
    msg!("Collected fee: {}", fee_usd);

    // Deposited collateral is valued at the minimized price
    let collateral_usd_delta =
        collateral_min_price.get_asset_amount_usd(params.collateral_amount, custody.decimals)?;

    position.collateral_usd = math::checked_add(position.collateral_usd, collateral_usd_delta)?;
    require_gte!(
        position.collateral_usd,
        fee_usd,
        VaultError::InsufficientCollateral
    );
    position.collateral_usd = math::checked_sub(position.collateral_usd, fee_usd)?;
    position.entry_funding_rate = custody.funding.cumulative_rate;
    position.size_usd = math::checked_add(position.size_usd, params.size_delta_usd)?;
    position.last_increase_time = curtime;

    require!(position.size_usd > 0, VaultError::InvalidPositionState);
    require_gte!(
        position.size_usd,
        position.collateral_usd,
        VaultError::CollateralExceedsSize
    );

    // Reserve collateral-asset units against the added size, converted at
    // the minimized collateral price so the reserve covers the payout
    let reserve_delta =
        collateral_min_price.get_token_amount(params.size_delta_usd, custody.decimals)?;
    position.reserve_amount = math::checked_add(position.reserve_amount, reserve_delta)?;
    custody.add_reserved(reserve_delta)?;

    // Transfer tokens
    msg!("Transfer tokens");
    vault.transfer_tokens_from_user(
        ctx.accounts.funding_account.to_account_info(),
        ctx.accounts.custody_token_account.to_account_info(),
        ctx.accounts.owner.to_account_info(),
        ctx.accounts.token_program.to_account_info(),
        params.collateral_amount,
    )?;

    // Update custody stats
    msg!("Update custody stats");
    custody.add_held(params.collateral_amount)?;
    if params.side == Side::Long {
        // guaranteed_usd tracks sum(size - collateral) over long positions;
        // the fee was debited from collateral so it raises the guarantee
        custody.add_guaranteed_usd(math::checked_add(params.size_delta_usd, fee_usd)?)?;
        custody.sub_guaranteed_usd(collateral_usd_delta)?;
        // Long margin joins the pool; the fee moves on into the fee reserve
        custody.add_pool_amount(params.collateral_amount)?;
        custody.add_fee_reserve(fee_tokens)?;
        custody.sub_pool_amount(fee_tokens)?;
    } else {
        // Short margin stays escrowed; the fee is carved out of escrow
        custody.add_escrowed(params.collateral_amount)?;
        position.collateral_amount =
            math::checked_add(position.collateral_amount, params.collateral_amount)?;
        custody.add_fee_reserve(fee_tokens)?;
        custody.sub_escrowed(fee_tokens)?;
        position.collateral_amount = math::checked_sub(position.collateral_amount, fee_tokens)?;
    }

    if params.side == Side::Short && params.size_delta_usd > 0 {
        let index_asset = ctx.accounts.index_asset.as_mut();
        index_asset
            .shorts
            .record_increase(params.size_delta_usd, entry_price_usd)?;
        if index_asset.config.max_global_short_size_usd > 0 {
            require_gte!(
                index_asset.config.max_global_short_size_usd,
                index_asset.shorts.size_usd,
                VaultError::MaxGlobalShortSizeExceeded
            );
        }
    }

    // Check position health
    msg!("Check position health");
    let liquidation_mark_price = if params.side == Side::Long {
        index_min_price_usd
    } else {
        index_max_price_usd
    };
    vault.check_position_health(
        position,
        custody.funding.cumulative_rate,
        ctx.accounts.index_asset.config.min_profit_bps,
        liquidation_mark_price,
        curtime,
    )?;

    custody.validate_balances()?;

    if params.side == Side::Long {
        // Collateral and index are the same account passed twice; sync the
        // copies so the last writeback carries the updated data
        let index_asset = ctx.accounts.index_asset.as_mut();
        *index_asset = custody.clone();
    }

    Ok(())
}
