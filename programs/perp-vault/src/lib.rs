//! Leveraged trading vault: pooled collateral, long and short positions
//! against an index price, and an LP share priced by the pool's net asset
//! value.

#![allow(clippy::result_large_err)]

pub mod error;
pub mod instructions;
pub mod math;
pub mod state;

use {anchor_lang::prelude::*, instructions::*, state::vault::*};

#[cfg(not(feature = "no-entrypoint"))]
solana_security_txt::security_txt! {
    name: "Perp Vault",
    project_url: "https://github.com/perp-vault/perp-vault",
    contacts: "email:security@perp-vault.dev",
    policy: "https://github.com/perp-vault/perp-vault/blob/main/SECURITY.md",
    preferred_languages: "en"
}

declare_id!("GxegSBD3PQFQjzYui524RWraUM7SzQsBZpWnwBbpLQbk");

#[program]
pub mod perp_vault {
    use super::*;

    // admin instructions

    /// Create the vault singleton, transfer authority and LP token mint
    pub fn initialize(ctx: Context<Initialize>, params: InitializeParams) -> Result<()> {
        instructions::initialize(ctx, &params)
    }

    /// Whitelist a new asset and create its token custody
    pub fn add_asset(ctx: Context<AddAsset>, params: AddAssetParams) -> Result<()> {
        instructions::add_asset(ctx, &params)
    }

    /// Deregister a fully unwound asset
    pub fn remove_asset(ctx: Context<RemoveAsset>, params: RemoveAssetParams) -> Result<()> {
        instructions::remove_asset(ctx, &params)
    }

    /// Replace an asset's oracle and trading configuration
    pub fn set_asset_config(
        ctx: Context<SetAssetConfig>,
        params: SetAssetConfigParams,
    ) -> Result<()> {
        instructions::set_asset_config(ctx, &params)
    }

    /// Replace the vault-level configuration
    pub fn set_vault_config(
        ctx: Context<SetVaultConfig>,
        params: SetVaultConfigParams,
    ) -> Result<()> {
        instructions::set_vault_config(ctx, &params)
    }

    /// Seed the global short average price and mark the tracker ready
    pub fn set_short_average_price(
        ctx: Context<SetShortAveragePrice>,
        params: SetShortAveragePriceParams,
    ) -> Result<()> {
        instructions::set_short_average_price(ctx, &params)
    }

    /// Publish a price into an asset's custom oracle account
    pub fn set_custom_oracle_price(
        ctx: Context<SetCustomOraclePrice>,
        params: SetCustomOraclePriceParams,
    ) -> Result<()> {
        instructions::set_custom_oracle_price(ctx, &params)
    }

    /// Withdraw collected fees from an asset's fee reserve
    pub fn withdraw_fees(ctx: Context<WithdrawFees>, params: WithdrawFeesParams) -> Result<()> {
        instructions::withdraw_fees(ctx, &params)
    }

    // test instructions

    /// Set the wall clock time (test builds only)
    pub fn set_test_time(ctx: Context<SetTestTime>, params: SetTestTimeParams) -> Result<()> {
        instructions::set_test_time(ctx, &params)
    }

    // public instructions

    /// Swap one whitelisted asset for another against the pool
    pub fn swap(ctx: Context<Swap>, params: SwapParams) -> Result<u64> {
        instructions::swap(ctx, &params)
    }

    /// Deposit an asset and mint pool share tokens against the NAV
    pub fn buy_pool_share(ctx: Context<BuyPoolShare>, params: BuyPoolShareParams) -> Result<u64> {
        instructions::buy_pool_share(ctx, &params)
    }

    /// Burn pool share tokens and redeem the pro-rata slice of the NAV
    pub fn sell_pool_share(
        ctx: Context<SellPoolShare>,
        params: SellPoolShareParams,
    ) -> Result<u64> {
        instructions::sell_pool_share(ctx, &params)
    }

    /// Open a new position or grow an existing one
    pub fn increase_position(
        ctx: Context<IncreasePosition>,
        params: IncreasePositionParams,
    ) -> Result<()> {
        instructions::increase_position(ctx, &params)
    }

    /// Reduce or close a position; returns the payout in collateral tokens
    pub fn decrease_position(
        ctx: Context<DecreasePosition>,
        params: DecreasePositionParams,
    ) -> Result<u64> {
        instructions::decrease_position(ctx, &params)
    }

    /// Liquidate an insolvent position or deleverage an over-leveraged one
    pub fn liquidate_position(
        ctx: Context<LiquidatePosition>,
        params: LiquidatePositionParams,
    ) -> Result<()> {
        instructions::liquidate_position(ctx, &params)
    }

    // public queries

    /// Full position readout including unrealized PnL
    pub fn get_position(
        ctx: Context<GetPosition>,
        params: GetPositionParams,
    ) -> Result<PositionSnapshot> {
        instructions::get_position(ctx, &params)
    }

    /// Unrealized PnL of a position at the conservative exit price
    pub fn get_position_delta(
        ctx: Context<GetPositionDelta>,
        params: GetPositionDeltaParams,
    ) -> Result<ProfitAndLoss> {
        instructions::get_position_delta(ctx, &params)
    }

    /// Classify a position against the liquidation rules
    pub fn get_validate_liquidation(
        ctx: Context<GetValidateLiquidation>,
        params: GetValidateLiquidationParams,
    ) -> Result<LiquidationState> {
        instructions::get_validate_liquidation(ctx, &params)
    }

    /// Aggregate PnL of open shorts against one index asset
    pub fn get_global_short_delta(
        ctx: Context<GetGlobalShortDelta>,
        params: GetGlobalShortDeltaParams,
    ) -> Result<ProfitAndLoss> {
        instructions::get_global_short_delta(ctx, &params)
    }

    /// Net asset value of the pool in USD
    pub fn get_aum(ctx: Context<GetAum>, params: GetAumParams) -> Result<u128> {
        instructions::get_aum(ctx, &params)
    }

    /// Quote the deviation-adjusted fee rate for an operation
    pub fn get_fee_bps(ctx: Context<GetFeeBps>, params: GetFeeBpsParams) -> Result<u64> {
        instructions::get_fee_bps(ctx, &params)
    }
}
