use anchor_lang::prelude::*;

#[error_code]
pub enum VaultError {
    #[msg("Math overflow")]
    MathOverflow,
    #[msg("Unsupported oracle type")]
    UnsupportedOracle,
    #[msg("Invalid oracle account")]
    InvalidOracleAccount,
    #[msg("Stale oracle price")]
    StaleOraclePrice,
    #[msg("Invalid oracle price")]
    InvalidOraclePrice,
    #[msg("Instruction is not allowed in production")]
    InvalidEnvironment,
    #[msg("Invalid vault config")]
    InvalidVaultConfig,
    #[msg("Invalid asset config")]
    InvalidAssetConfig,
    #[msg("Invalid position state")]
    InvalidPositionState,
    #[msg("Instruction is not allowed at this time")]
    InstructionNotAllowed,
    #[msg("Token is not whitelisted for this operation")]
    UnsupportedToken,
    #[msg("Invalid collateral asset for the requested side")]
    InvalidCollateralToken,
    #[msg("Price slippage limit exceeded")]
    MaxPriceSlippage,
    #[msg("Position leverage limit exceeded")]
    MaxLeverage,
    #[msg("Position size must exceed collateral")]
    CollateralExceedsSize,
    #[msg("Insufficient collateral to cover fees")]
    InsufficientCollateral,
    #[msg("Losses exceed position collateral")]
    LossesExceedCollateral,
    #[msg("Pool reserve limit exceeded")]
    ReserveExceedsPool,
    #[msg("Pool amount limit exceeded")]
    PoolAmountLimit,
    #[msg("Pool buffer limit breached")]
    PoolBufferLimit,
    #[msg("Max global short size exceeded")]
    MaxGlobalShortSizeExceeded,
    #[msg("Insufficient amount returned")]
    InsufficientAmountReturned,
    #[msg("Position is not liquidatable")]
    PositionNotLiquidatable,
    #[msg("Pool balances out of sync with custody")]
    BalanceConservation,
    #[msg("Asset is still in use")]
    AssetInUse,
}
