// admin instructions
pub mod add_asset;
pub mod initialize;
pub mod remove_asset;
pub mod set_asset_config;
pub mod set_custom_oracle_price;
pub mod set_short_average_price;
pub mod set_vault_config;
pub mod withdraw_fees;

// test instructions
pub mod set_test_time;

// public instructions
pub mod buy_pool_share;
pub mod decrease_position;
pub mod increase_position;
pub mod liquidate_position;
pub mod sell_pool_share;
pub mod swap;

// public queries
pub mod get_aum;
pub mod get_fee_bps;
pub mod get_global_short_delta;
pub mod get_position;
pub mod get_position_delta;
pub mod get_validate_liquidation;

// bring everything in scope
pub use {
    add_asset::*, buy_pool_share::*, decrease_position::*, get_aum::*, get_fee_bps::*,
    get_global_short_delta::*, get_position::*, get_position_delta::*,
    get_validate_liquidation::*, increase_position::*, initialize::*, liquidate_position::*,
    remove_asset::*, sell_pool_share::*, set_asset_config::*, set_custom_oracle_price::*,
    set_short_average_price::*, set_test_time::*, set_vault_config::*, swap::*, withdraw_fees::*,
};
