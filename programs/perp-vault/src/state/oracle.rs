//! Oracle price feed integration.
//!
//! Price feeds come from Pyth or from a custom on-chain oracle account.
//! Every mutating instruction samples the feed in both directions (spot vs
//! EMA extremes) so it can price conservatively for the pool.

use {
    crate::{error::VaultError, math, state::vault::Vault},
    anchor_lang::prelude::*,
    core::cmp::Ordering,
};

/// Supported oracle types for price feeds
#[derive(Copy, Clone, PartialEq, AnchorSerialize, AnchorDeserialize, Debug)]
pub enum OracleType {
    /// No oracle configured
    None,
    /// Custom oracle implementation
    Custom,
    /// Pyth Network oracle
    Pyth,
}

impl Default for OracleType {
    fn default() -> Self {
        Self::None
    }
}

/// Oracle price representation with mantissa and exponent
///
/// Price = price * 10^exponent
/// Example: price=12300, exponent=-3 represents 12.3
#[derive(Copy, Clone, Eq, PartialEq, AnchorSerialize, AnchorDeserialize, Default, Debug)]
pub struct OraclePrice {
    /// Price mantissa (the significant digits)
    pub price: u64,
    /// Price exponent (power of 10)
    pub exponent: i32,
}

/// Configuration parameters for oracle price feeds
#[derive(Copy, Clone, PartialEq, AnchorSerialize, AnchorDeserialize, Default, Debug)]
pub struct OracleParams {
    /// Public key of the oracle account
    pub oracle_account: Pubkey,
    /// Type of oracle (Pyth, Custom, etc.)
    pub oracle_type: OracleType,
    /// Maximum acceptable price error in basis points (BPS)
    pub max_price_error: u64,
    /// Maximum age of price data in seconds before considered stale
    pub max_price_age_sec: u32,
}

/// Custom oracle account structure for storing price data on-chain
#[account]
#[derive(Default, Debug)]
pub struct CustomOracle {
    /// Current price mantissa
    pub price: u64,
    /// Price exponent
    pub expo: i32,
    /// Price confidence interval (uncertainty)
    pub conf: u64,
    /// Exponential moving average (EMA) price
    pub ema: u64,
    /// Unix timestamp when price was last published
    pub publish_time: i64,
}

impl CustomOracle {
    pub const LEN: usize = 8 + std::mem::size_of::<CustomOracle>();

    /// Update all oracle price fields
    pub fn set(&mut self, price: u64, expo: i32, conf: u64, ema: u64, publish_time: i64) {
        self.price = price;
        self.expo = expo;
        self.conf = conf;
        self.ema = ema;
        self.publish_time = publish_time;
    }
}

impl PartialOrd for OraclePrice {
    fn partial_cmp(&self, other: &OraclePrice) -> Option<Ordering> {
        let (lhs, rhs) = if self.exponent == other.exponent {
            (self.price, other.price)
        } else if self.exponent < other.exponent {
            if let Ok(scaled_price) = other.scale_to_exponent(self.exponent) {
                (self.price, scaled_price.price)
            } else {
                return None;
            }
        } else if let Ok(scaled_price) = self.scale_to_exponent(other.exponent) {
            (scaled_price.price, other.price)
        } else {
            return None;
        };
        lhs.partial_cmp(&rhs)
    }
}

impl OraclePrice {
    pub fn new(price: u64, exponent: i32) -> Self {
        Self { price, exponent }
    }

    /// Fetch price from oracle account based on oracle type
    ///
    /// # Arguments
    /// * `oracle_account` - Account info of the oracle
    /// * `oracle_params` - Oracle configuration parameters
    /// * `current_time` - Current Unix timestamp
    /// * `use_ema` - Whether to use EMA (exponential moving average) price instead of spot price
    pub fn new_from_oracle(
        oracle_account: &AccountInfo,
        oracle_params: &OracleParams,
        current_time: i64,
        use_ema: bool,
    ) -> Result<Self> {
        match oracle_params.oracle_type {
            OracleType::Custom => Self::get_custom_price(
                oracle_account,
                oracle_params.max_price_error,
                oracle_params.max_price_age_sec,
                current_time,
                use_ema,
            ),
            OracleType::Pyth => Self::get_pyth_price(
                oracle_account,
                oracle_params.max_price_error,
                oracle_params.max_price_age_sec,
                current_time,
                use_ema,
            ),
            _ => err!(VaultError::UnsupportedOracle),
        }
    }

    /// Converts token amount to USD value using oracle price
    ///
    /// # Arguments
    /// * `token_amount` - Amount of tokens in native decimals
    /// * `token_decimals` - Number of decimals for the token
    ///
    /// # Returns
    /// USD value with Vault::USD_DECIMALS decimals
    pub fn get_asset_amount_usd(&self, token_amount: u64, token_decimals: u8) -> Result<u128> {
        if token_amount == 0 || self.price == 0 {
            return Ok(0);
        }
        let value = math::checked_mul(token_amount as u128, self.price as u128)?;
        let shift = math::checked_add(
            math::checked_sub(Vault::USD_DECIMALS as i32, token_decimals as i32)?,
            self.exponent,
        )?;
        if shift >= 0 {
            math::checked_mul(value, math::checked_pow(10u128, shift as usize)?)
        } else {
            math::checked_div(value, math::checked_pow(10u128, (-shift) as usize)?)
        }
    }

    /// Converts USD amount to token amount using oracle price
    ///
    /// # Arguments
    /// * `asset_amount_usd` - USD amount with Vault::USD_DECIMALS decimals
    /// * `token_decimals` - Number of decimals for the token
    ///
    /// # Returns
    /// Token amount in native decimals, rounded down
    pub fn get_token_amount(&self, asset_amount_usd: u128, token_decimals: u8) -> Result<u64> {
        if asset_amount_usd == 0 || self.price == 0 {
            return Ok(0);
        }
        let shift = math::checked_sub(
            token_decimals as i32,
            math::checked_add(Vault::USD_DECIMALS as i32, self.exponent)?,
        )?;
        if shift >= 0 {
            math::checked_as_u64(math::checked_u128_mul_div(
                asset_amount_usd,
                math::checked_pow(10u128, shift as usize)?,
                self.price as u128,
            )?)
        } else {
            math::checked_as_u64(math::checked_div(
                asset_amount_usd,
                math::checked_mul(
                    math::checked_pow(10u128, (-shift) as usize)?,
                    self.price as u128,
                )?,
            )?)
        }
    }

    /// Price of one whole token unit in USD with Vault::USD_DECIMALS decimals
    pub fn get_price_usd(&self) -> Result<u128> {
        let shift = math::checked_add(Vault::USD_DECIMALS as i32, self.exponent)?;
        if shift >= 0 {
            math::checked_mul(self.price as u128, math::checked_pow(10u128, shift as usize)?)
        } else {
            math::checked_div(
                self.price as u128,
                math::checked_pow(10u128, (-shift) as usize)?,
            )
        }
    }

    /// Scale price to a different exponent while maintaining the same value
    pub fn scale_to_exponent(&self, target_exponent: i32) -> Result<OraclePrice> {
        if target_exponent == self.exponent {
            return Ok(*self);
        }
        let delta = math::checked_sub(target_exponent, self.exponent)?;
        if delta > 0 {
            Ok(OraclePrice {
                price: math::checked_div(self.price, math::checked_pow(10, delta as usize)?)?,
                exponent: target_exponent,
            })
        } else {
            Ok(OraclePrice {
                price: math::checked_mul(self.price, math::checked_pow(10, (-delta) as usize)?)?,
                exponent: target_exponent,
            })
        }
    }

    /// Get the minimum price between two prices
    ///
    /// For stablecoins, ensures price doesn't exceed 1 USD.
    pub fn get_min_price(&self, other: &OraclePrice, is_stable: bool) -> Result<OraclePrice> {
        let min_price = if self < other { self } else { other };
        if is_stable {
            if min_price.exponent > 0 {
                if min_price.price == 0 {
                    return Ok(*min_price);
                } else {
                    return Ok(OraclePrice {
                        price: 1000000u64,
                        exponent: -6,
                    });
                }
            }
            let one_usd = math::checked_pow(10u64, (-min_price.exponent) as usize)?;
            if min_price.price > one_usd {
                Ok(OraclePrice {
                    price: one_usd,
                    exponent: min_price.exponent,
                })
            } else {
                Ok(*min_price)
            }
        } else {
            Ok(*min_price)
        }
    }

    /// Get the maximum price between two prices
    pub fn get_max_price(&self, other: &OraclePrice) -> OraclePrice {
        if self < other {
            *other
        } else {
            *self
        }
    }

    // ========== Private Helper Functions ==========

    /// Fetch price from custom oracle account
    ///
    /// Validates price freshness and confidence interval.
    fn get_custom_price(
        custom_price_info: &AccountInfo,
        max_price_error: u64,
        max_price_age_sec: u32,
        current_time: i64,
        use_ema: bool,
    ) -> Result<OraclePrice> {
        require!(
            !Vault::is_empty_account(custom_price_info)?,
            VaultError::InvalidOracleAccount
        );

        let data = custom_price_info.try_borrow_data()?;
        let oracle_acc = CustomOracle::try_deserialize(&mut &data[..])?;

        let last_update_age_sec = math::checked_sub(current_time, oracle_acc.publish_time)?;
        if last_update_age_sec > max_price_age_sec as i64 {
            msg!("Error: Custom oracle price is stale");
            return err!(VaultError::StaleOraclePrice);
        }
        let price = if use_ema {
            oracle_acc.ema
        } else {
            oracle_acc.price
        };

        if price == 0
            || math::checked_div(
                math::checked_mul(oracle_acc.conf as u128, Vault::BPS_POWER)?,
                price as u128,
            )? > max_price_error as u128
        {
            msg!("Error: Custom oracle price is out of bounds");
            return err!(VaultError::InvalidOraclePrice);
        }

        Ok(OraclePrice {
            price,
            exponent: oracle_acc.expo,
        })
    }

    /// Fetch price from Pyth Network oracle
    ///
    /// Validates price freshness and confidence interval.
    fn get_pyth_price(
        pyth_price_info: &AccountInfo,
        max_price_error: u64,
        max_price_age_sec: u32,
        current_time: i64,
        use_ema: bool,
    ) -> Result<OraclePrice> {
        require!(
            !Vault::is_empty_account(pyth_price_info)?,
            VaultError::InvalidOracleAccount
        );
        let price_feed = pyth_sdk_solana::load_price_feed_from_account_info(pyth_price_info)
            .map_err(|_| VaultError::InvalidOracleAccount)?;
        let pyth_price = if use_ema {
            price_feed.get_ema_price_unchecked()
        } else {
            price_feed.get_price_unchecked()
        };

        let last_update_age_sec = math::checked_sub(current_time, pyth_price.publish_time)?;
        if last_update_age_sec > max_price_age_sec as i64 {
            msg!("Error: Pyth oracle price is stale");
            return err!(VaultError::StaleOraclePrice);
        }

        if pyth_price.price <= 0
            || math::checked_div(
                math::checked_mul(pyth_price.conf as u128, Vault::BPS_POWER)?,
                pyth_price.price as u128,
            )? > max_price_error as u128
        {
            msg!("Error: Pyth oracle price is out of bounds");
            return err!(VaultError::InvalidOraclePrice);
        }

        Ok(OraclePrice {
            // price is i64 and > 0 per check above
            price: pyth_price.price as u64,
            exponent: pyth_price.expo,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn asset_amount_usd_at_usd_scale() {
        // 60,000 USD per token, 8 token decimals
        let price = OraclePrice::new(60_000_000_000, -6);
        // 1.5 tokens
        let usd = price.get_asset_amount_usd(150_000_000, 8).unwrap();
        assert_eq!(usd, 90_000 * 10u128.pow(30));
        assert_eq!(price.get_asset_amount_usd(0, 8).unwrap(), 0);
    }

    #[test]
    fn token_amount_round_trip() {
        let price = OraclePrice::new(60_000_000_000, -6);
        let usd = 90_000 * 10u128.pow(30);
        assert_eq!(price.get_token_amount(usd, 8).unwrap(), 150_000_000);
        // Conversion floors
        assert_eq!(price.get_token_amount(1, 8).unwrap(), 0);
    }

    #[test]
    fn price_usd_per_unit() {
        let price = OraclePrice::new(60_000_000_000, -6);
        assert_eq!(price.get_price_usd().unwrap(), 60_000 * 10u128.pow(30));
        let one = OraclePrice::new(1_000_000, -6);
        assert_eq!(one.get_price_usd().unwrap(), 10u128.pow(30));
    }

    #[test]
    fn min_price_caps_stable_at_one_usd() {
        let above_peg = OraclePrice::new(1_050_000, -6);
        let spot = OraclePrice::new(1_060_000, -6);
        let capped = above_peg.get_min_price(&spot, true).unwrap();
        assert_eq!(capped.price, 1_000_000);
        assert_eq!(capped.exponent, -6);

        let below_peg = OraclePrice::new(980_000, -6);
        let kept = below_peg.get_min_price(&spot, true).unwrap();
        assert_eq!(kept.price, 980_000);

        let volatile = above_peg.get_min_price(&spot, false).unwrap();
        assert_eq!(volatile.price, 1_050_000);
    }

    #[test]
    fn compare_across_exponents() {
        let a = OraclePrice::new(60_000, 0);
        let b = OraclePrice::new(59_999_000_000, -6);
        assert!(b < a);
        assert_eq!(a.get_max_price(&b).price, 60_000);
    }

    #[test]
    fn custom_oracle_account_read() {
        let oracle = CustomOracle {
            price: 60_000_000_000,
            expo: -6,
            conf: 0,
            ema: 59_000_000_000,
            publish_time: 100,
        };
        let mut data: Vec<u8> = Vec::new();
        oracle.try_serialize(&mut data).unwrap();

        let key = Pubkey::new_unique();
        let owner = crate::ID;
        let mut lamports = 1u64;
        let info = AccountInfo::new(
            &key,
            false,
            false,
            &mut lamports,
            &mut data,
            &owner,
            false,
            0,
        );
        let params = OracleParams {
            oracle_account: key,
            oracle_type: OracleType::Custom,
            max_price_error: 10_000,
            max_price_age_sec: 60,
        };

        let spot = OraclePrice::new_from_oracle(&info, &params, 110, false).unwrap();
        assert_eq!(spot.price, 60_000_000_000);
        assert_eq!(spot.exponent, -6);
        let ema = OraclePrice::new_from_oracle(&info, &params, 110, true).unwrap();
        assert_eq!(ema.price, 59_000_000_000);

        // One second past the staleness window is rejected.
        assert!(OraclePrice::new_from_oracle(&info, &params, 161, false).is_err());
    }
}
