//! Per-asset custody: token balances, funding state and global short interest.

use {
    crate::{
        error::VaultError,
        math,
        state::{
            oracle::{OracleParams, OraclePrice, OracleType},
            vault::{FundingConfig, Vault},
        },
    },
    anchor_lang::prelude::*,
};

#[derive(Copy, Clone, PartialEq, AnchorSerialize, AnchorDeserialize, Default, Debug)]
pub struct AssetConfig {
    pub is_stable: bool,
    pub is_shortable: bool,
    /// Sample the EMA price next to the spot price when reading the oracle
    pub use_ema: bool,
    /// Relative weight used to derive this asset's target share of LP debt
    pub weight: u64,
    /// Profits below this fraction of size are treated as zero inside the
    /// configured minimum profit window
    pub min_profit_bps: u64,
    /// Cap on LP debt attributed to this asset, 0 for uncapped
    pub max_lp_debt_usd: u128,
    /// Pool floor that swaps and share redemptions may not draw below
    pub buffer_amount: u64,
    /// Cap on aggregate short size against this index, 0 for uncapped
    pub max_global_short_size_usd: u128,
}

impl AssetConfig {
    pub fn validate(&self) -> bool {
        self.weight > 0 && (self.min_profit_bps as u128) < Vault::BPS_POWER
    }
}

/// Token-denominated balances of one custody.
///
/// `held` mirrors the custody token account. Every token that enters or
/// leaves the account is attributed to exactly one of `pool_amount`,
/// `fee_reserve` or `escrowed`, so the three always sum to `held`.
#[derive(Copy, Clone, PartialEq, AnchorSerialize, AnchorDeserialize, Default, Debug)]
pub struct AssetBalances {
    pub held: u64,
    /// Tokens owned by liquidity providers, including traders' realized
    /// losses and long collateral
    pub pool_amount: u64,
    /// Part of `pool_amount` locked to back open position sizes
    pub reserved_amount: u64,
    /// Collected protocol fees, withdrawable by the authority
    pub fee_reserve: u64,
    /// Short collateral held outside the pool
    pub escrowed: u64,
}

#[derive(Copy, Clone, PartialEq, AnchorSerialize, AnchorDeserialize, Default, Debug)]
pub struct FundingState {
    /// Cumulative funding rate with Vault::FUNDING_RATE_DECIMALS decimals
    pub cumulative_rate: u128,
    /// Start of the last interval the rate was accrued to
    pub last_funding_time: i64,
}

/// Aggregate short exposure against this asset as the index.
///
/// `average_price` is maintained with the same PnL-neutral update that
/// individual positions use, but only once `data_ready` is set. Until then
/// `entry_price`, a plain size-weighted average of entry marks, is the only
/// usable aggregate and all consumers fall back to it.
#[derive(Copy, Clone, PartialEq, AnchorSerialize, AnchorDeserialize, Default, Debug)]
pub struct ShortInterest {
    pub size_usd: u128,
    pub average_price: u128,
    pub entry_price: u128,
    pub data_ready: bool,
}

impl ShortInterest {
    /// Aggregate PnL of open shorts against the given average entry price.
    /// Returns (has_profit, delta_usd).
    pub fn get_delta(&self, average_price: u128, mark_price: u128) -> Result<(bool, u128)> {
        if self.size_usd == 0 || average_price == 0 {
            return Ok((false, 0));
        }
        let price_delta = if average_price > mark_price {
            math::checked_sub(average_price, mark_price)?
        } else {
            math::checked_sub(mark_price, average_price)?
        };
        let delta = math::checked_u128_mul_div(self.size_usd, price_delta, average_price)?;
        Ok((mark_price < average_price, delta))
    }

    /// PnL of open shorts against the blended average price.
    pub fn get_global_delta(
        &self,
        tracker_weight_bps: u64,
        mark_price: u128,
    ) -> Result<(bool, u128)> {
        self.get_delta(self.blended_average_price(tracker_weight_bps)?, mark_price)
    }

    /// Next tracked average such that the aggregate PnL measured against it
    /// equals the PnL measured against the current average, both at
    /// `mark_price`, after the size grows by `size_delta_usd`.
    pub fn get_next_average_price(
        &self,
        size_delta_usd: u128,
        mark_price: u128,
    ) -> Result<u128> {
        if self.size_usd == 0 || !self.data_ready {
            return Ok(mark_price);
        }
        let (has_profit, delta) = self.get_delta(self.average_price, mark_price)?;
        let next_size = math::checked_add(self.size_usd, size_delta_usd)?;
        let divisor = if has_profit {
            math::checked_sub(next_size, delta)?
        } else {
            math::checked_add(next_size, delta)?
        };
        require_gt!(divisor, 0u128, VaultError::InvalidPositionState);
        math::checked_u128_mul_div(mark_price, next_size, divisor)
    }

    pub fn record_increase(&mut self, size_delta_usd: u128, mark_price: u128) -> Result<()> {
        if size_delta_usd == 0 {
            return Ok(());
        }
        if self.size_usd == 0 {
            self.average_price = mark_price;
            self.entry_price = mark_price;
            self.size_usd = size_delta_usd;
            self.data_ready = true;
            return Ok(());
        }
        if self.data_ready {
            self.average_price = self.get_next_average_price(size_delta_usd, mark_price)?;
        }
        let next_size = math::checked_add(self.size_usd, size_delta_usd)?;
        self.entry_price = if mark_price >= self.entry_price {
            let shift = math::checked_sub(mark_price, self.entry_price)?;
            math::checked_add(
                self.entry_price,
                math::checked_u128_mul_div(shift, size_delta_usd, next_size)?,
            )?
        } else {
            let shift = math::checked_sub(self.entry_price, mark_price)?;
            math::checked_sub(
                self.entry_price,
                math::checked_u128_mul_div(shift, size_delta_usd, next_size)?,
            )?
        };
        self.size_usd = next_size;
        Ok(())
    }

    /// Decreases never move the averages. Sizes recorded before the tracker
    /// was seeded may not be fully covered, hence the saturation.
    pub fn record_decrease(&mut self, size_delta_usd: u128) {
        self.size_usd = self.size_usd.saturating_sub(size_delta_usd);
    }

    /// Average entry price used for aggregate PnL: the tracked neutral
    /// average blended with the plain entry average at the configured
    /// weight. Falls back to the entry average alone until the tracker
    /// is seeded.
    pub fn blended_average_price(&self, tracker_weight_bps: u64) -> Result<u128> {
        if !self.data_ready {
            return Ok(self.entry_price);
        }
        let weight = std::cmp::min(tracker_weight_bps as u128, Vault::BPS_POWER);
        if weight == Vault::BPS_POWER {
            return Ok(self.average_price);
        }
        let entry_part = math::checked_u128_mul_div(
            self.entry_price,
            math::checked_sub(Vault::BPS_POWER, weight)?,
            Vault::BPS_POWER,
        )?;
        let tracked_part =
            math::checked_u128_mul_div(self.average_price, weight, Vault::BPS_POWER)?;
        math::checked_add(entry_part, tracked_part)
    }
}

#[account]
#[derive(Default, Debug)]
pub struct Asset {
    pub mint: Pubkey,
    pub token_account: Pubkey,
    pub decimals: u8,
    pub oracle: OracleParams,
    pub config: AssetConfig,
    pub balances: AssetBalances,
    /// USD owed to longs' sizes beyond their collateral, with
    /// Vault::USD_DECIMALS decimals
    pub guaranteed_usd: u128,
    /// USD value attributed to LPs for deposits routed into this asset
    pub lp_debt_usd: u128,
    pub funding: FundingState,
    pub shorts: ShortInterest,
    pub bump: u8,
    pub token_account_bump: u8,
}

impl Asset {
    pub const LEN: usize = 8 + std::mem::size_of::<Asset>();

    pub fn validate(&self) -> bool {
        matches!(self.oracle.oracle_type, OracleType::Custom | OracleType::Pyth)
            && self.oracle.oracle_account != Pubkey::default()
            && self.config.validate()
    }

    /// Accrues funding lazily up to the last whole interval boundary. The
    /// first touch only pins the boundary so that a custody idle since
    /// inception does not accrue a giant backlog.
    pub fn update_cumulative_funding_rate(
        &mut self,
        current_time: i64,
        funding: &FundingConfig,
    ) -> Result<()> {
        require_gt!(funding.funding_interval, 0i64, VaultError::InvalidVaultConfig);
        if self.funding.last_funding_time == 0 {
            self.funding.last_funding_time =
                Self::interval_start(current_time, funding.funding_interval);
            return Ok(());
        }
        if math::checked_add(self.funding.last_funding_time, funding.funding_interval)?
            > current_time
        {
            return Ok(());
        }
        let intervals = math::checked_div(
            math::checked_sub(current_time, self.funding.last_funding_time)?,
            funding.funding_interval,
        )?;
        if self.balances.pool_amount > 0 && self.balances.reserved_amount > 0 {
            let factor = if self.config.is_stable {
                funding.stable_funding_rate_factor
            } else {
                funding.funding_rate_factor
            };
            let weighted = math::checked_mul(factor as u128, intervals as u128)?;
            let rate = math::checked_u128_mul_div(
                weighted,
                self.balances.reserved_amount as u128,
                self.balances.pool_amount as u128,
            )?;
            self.funding.cumulative_rate = math::checked_add(self.funding.cumulative_rate, rate)?;
        }
        self.funding.last_funding_time =
            Self::interval_start(current_time, funding.funding_interval);
        Ok(())
    }

    fn interval_start(time: i64, interval: i64) -> i64 {
        time - time % interval
    }

    pub fn add_held(&mut self, amount: u64) -> Result<()> {
        self.balances.held = math::checked_add(self.balances.held, amount)?;
        Ok(())
    }

    pub fn sub_held(&mut self, amount: u64) -> Result<()> {
        self.balances.held = math::checked_sub(self.balances.held, amount)?;
        Ok(())
    }

    pub fn add_pool_amount(&mut self, amount: u64) -> Result<()> {
        self.balances.pool_amount = math::checked_add(self.balances.pool_amount, amount)?;
        Ok(())
    }

    pub fn sub_pool_amount(&mut self, amount: u64) -> Result<()> {
        self.balances.pool_amount = math::checked_sub(self.balances.pool_amount, amount)?;
        require_gte!(
            self.balances.pool_amount,
            self.balances.reserved_amount,
            VaultError::ReserveExceedsPool
        );
        Ok(())
    }

    pub fn add_reserved(&mut self, amount: u64) -> Result<()> {
        self.balances.reserved_amount = math::checked_add(self.balances.reserved_amount, amount)?;
        require_gte!(
            self.balances.pool_amount,
            self.balances.reserved_amount,
            VaultError::ReserveExceedsPool
        );
        Ok(())
    }

    pub fn sub_reserved(&mut self, amount: u64) -> Result<()> {
        self.balances.reserved_amount = math::checked_sub(self.balances.reserved_amount, amount)?;
        Ok(())
    }

    pub fn add_fee_reserve(&mut self, amount: u64) -> Result<()> {
        self.balances.fee_reserve = math::checked_add(self.balances.fee_reserve, amount)?;
        Ok(())
    }

    pub fn sub_fee_reserve(&mut self, amount: u64) -> Result<()> {
        self.balances.fee_reserve = math::checked_sub(self.balances.fee_reserve, amount)?;
        Ok(())
    }

    pub fn add_escrowed(&mut self, amount: u64) -> Result<()> {
        self.balances.escrowed = math::checked_add(self.balances.escrowed, amount)?;
        Ok(())
    }

    pub fn sub_escrowed(&mut self, amount: u64) -> Result<()> {
        self.balances.escrowed = math::checked_sub(self.balances.escrowed, amount)?;
        Ok(())
    }

    pub fn add_guaranteed_usd(&mut self, usd: u128) -> Result<()> {
        self.guaranteed_usd = math::checked_add(self.guaranteed_usd, usd)?;
        Ok(())
    }

    pub fn sub_guaranteed_usd(&mut self, usd: u128) -> Result<()> {
        self.guaranteed_usd = math::checked_sub(self.guaranteed_usd, usd)?;
        Ok(())
    }

    pub fn add_lp_debt(&mut self, usd: u128) -> Result<()> {
        self.lp_debt_usd = math::checked_add(self.lp_debt_usd, usd)?;
        if self.config.max_lp_debt_usd > 0 {
            require_gte!(
                self.config.max_lp_debt_usd,
                self.lp_debt_usd,
                VaultError::PoolAmountLimit
            );
        }
        Ok(())
    }

    /// LP debt bookkeeping can lag reality for assets registered after
    /// trading started, so redemptions clamp rather than underflow.
    /// Returns the amount actually subtracted.
    pub fn sub_lp_debt(&mut self, usd: u128) -> u128 {
        let applied = std::cmp::min(self.lp_debt_usd, usd);
        self.lp_debt_usd -= applied;
        applied
    }

    pub fn check_pool_buffer(&self) -> Result<()> {
        require_gte!(
            self.balances.pool_amount,
            self.config.buffer_amount,
            VaultError::PoolBufferLimit
        );
        Ok(())
    }

    pub fn validate_balances(&self) -> Result<()> {
        let accounted = math::checked_add(
            math::checked_add(self.balances.pool_amount, self.balances.fee_reserve)?,
            self.balances.escrowed,
        )?;
        require_eq!(accounted, self.balances.held, VaultError::BalanceConservation);
        require_gte!(
            self.balances.pool_amount,
            self.balances.reserved_amount,
            VaultError::ReserveExceedsPool
        );
        Ok(())
    }

    /// NAV contribution of this custody as (additions, deductions), both in
    /// USD. Stables contribute their pool value only. Non-stables
    /// contribute guaranteed USD plus the unreserved pool valued at
    /// `pool_price`, grown by shorts' aggregate losses; shorts' aggregate
    /// profits are returned as a deduction so the caller can floor the
    /// total at zero.
    pub fn get_aum_usd(
        &self,
        pool_price: &OraclePrice,
        short_mark_price: &OraclePrice,
        tracker_weight_bps: u64,
    ) -> Result<(u128, u128)> {
        if self.config.is_stable {
            let aum =
                pool_price.get_asset_amount_usd(self.balances.pool_amount, self.decimals)?;
            return Ok((aum, 0));
        }
        let unreserved =
            math::checked_sub(self.balances.pool_amount, self.balances.reserved_amount)?;
        let mut aum = math::checked_add(
            self.guaranteed_usd,
            pool_price.get_asset_amount_usd(unreserved, self.decimals)?,
        )?;
        let mut deduction = 0u128;
        if self.shorts.size_usd > 0 {
            let (has_profit, delta) = self
                .shorts
                .get_global_delta(tracker_weight_bps, short_mark_price.get_price_usd()?)?;
            if has_profit {
                deduction = delta;
            } else {
                aum = math::checked_add(aum, delta)?;
            }
        }
        Ok((aum, deduction))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn usd(value: u64) -> u128 {
        value as u128 * 10u128.pow(Vault::USD_DECIMALS as u32)
    }

    fn funding_config() -> FundingConfig {
        FundingConfig {
            funding_interval: 3600,
            funding_rate_factor: 100,
            stable_funding_rate_factor: 50,
        }
    }

    #[test]
    fn funding_first_touch_pins_boundary_without_accrual() {
        let mut asset = Asset {
            balances: AssetBalances {
                pool_amount: 1_000_000,
                reserved_amount: 250_000,
                ..AssetBalances::default()
            },
            ..Asset::default()
        };
        asset
            .update_cumulative_funding_rate(1_000_000, &funding_config())
            .unwrap();
        assert_eq!(asset.funding.cumulative_rate, 0);
        // 1_000_000 = 277 * 3600 + 2800
        assert_eq!(asset.funding.last_funding_time, 997_200);
    }

    #[test]
    fn funding_accrues_whole_intervals_only() {
        let mut asset = Asset {
            balances: AssetBalances {
                pool_amount: 1_000_000,
                reserved_amount: 250_000,
                ..AssetBalances::default()
            },
            ..Asset::default()
        };
        let config = funding_config();
        asset.update_cumulative_funding_rate(1_000_000, &config).unwrap();

        // Less than one interval past the boundary changes nothing.
        asset
            .update_cumulative_funding_rate(997_200 + 3599, &config)
            .unwrap();
        assert_eq!(asset.funding.cumulative_rate, 0);
        assert_eq!(asset.funding.last_funding_time, 997_200);

        // Two whole intervals plus some drift: factor 100 at one quarter
        // utilization accrues 25 per interval.
        asset
            .update_cumulative_funding_rate(997_200 + 7300, &config)
            .unwrap();
        assert_eq!(asset.funding.cumulative_rate, 50);
        assert_eq!(asset.funding.last_funding_time, 997_200 + 7200);
    }

    #[test]
    fn funding_skips_idle_pool_but_advances_boundary() {
        let mut asset = Asset::default();
        let config = funding_config();
        asset.update_cumulative_funding_rate(997_200, &config).unwrap();
        asset
            .update_cumulative_funding_rate(997_200 + 7200, &config)
            .unwrap();
        assert_eq!(asset.funding.cumulative_rate, 0);
        assert_eq!(asset.funding.last_funding_time, 997_200 + 7200);
    }

    #[test]
    fn funding_uses_stable_factor_for_stables() {
        let mut asset = Asset {
            config: AssetConfig {
                is_stable: true,
                ..AssetConfig::default()
            },
            balances: AssetBalances {
                pool_amount: 1_000_000,
                reserved_amount: 500_000,
                ..AssetBalances::default()
            },
            ..Asset::default()
        };
        let config = funding_config();
        asset.update_cumulative_funding_rate(997_200, &config).unwrap();
        asset
            .update_cumulative_funding_rate(997_200 + 3600, &config)
            .unwrap();
        assert_eq!(asset.funding.cumulative_rate, 25);
    }

    #[test]
    fn balance_mutators_keep_conservation() {
        let mut asset = Asset::default();
        asset.add_held(1_000).unwrap();
        asset.add_pool_amount(900).unwrap();
        asset.add_fee_reserve(60).unwrap();
        asset.add_escrowed(40).unwrap();
        asset.validate_balances().unwrap();

        asset.sub_held(10).unwrap();
        assert!(asset.validate_balances().is_err());
        asset.sub_fee_reserve(10).unwrap();
        asset.validate_balances().unwrap();
    }

    fn reserved_asset() -> Asset {
        let mut asset = Asset::default();
        asset.add_held(500).unwrap();
        asset.add_pool_amount(500).unwrap();
        asset.add_reserved(400).unwrap();
        asset
    }

    // A failed mutator leaves the in-memory copy dirty, mirroring how a
    // failed instruction discards the whole account, so each error probe
    // gets a fresh asset.
    #[test]
    fn reserve_is_bounded_by_pool() {
        assert!(reserved_asset().add_reserved(101).is_err());
        assert!(reserved_asset().sub_pool_amount(101).is_err());

        let mut asset = reserved_asset();
        asset.add_reserved(100).unwrap();
        asset.sub_reserved(200).unwrap();
        asset.sub_pool_amount(100).unwrap();
        asset.sub_held(100).unwrap();
        asset.validate_balances().unwrap();
    }

    #[test]
    fn lp_debt_cap_applies_when_configured() {
        let mut asset = Asset {
            config: AssetConfig {
                max_lp_debt_usd: usd(1_000),
                ..AssetConfig::default()
            },
            ..Asset::default()
        };
        asset.add_lp_debt(usd(1_000)).unwrap();
        assert_eq!(asset.sub_lp_debt(usd(2_000)), usd(1_000));
        assert_eq!(asset.lp_debt_usd, 0);

        let mut capped = Asset {
            config: AssetConfig {
                max_lp_debt_usd: usd(1_000),
                ..AssetConfig::default()
            },
            ..Asset::default()
        };
        capped.add_lp_debt(usd(999)).unwrap();
        assert!(capped.add_lp_debt(usd(2)).is_err());
    }

    #[test]
    fn short_tracker_seeds_on_first_increase() {
        let mut shorts = ShortInterest::default();
        shorts.record_increase(usd(100_000), usd(60_000)).unwrap();
        assert!(shorts.data_ready);
        assert_eq!(shorts.average_price, usd(60_000));
        assert_eq!(shorts.entry_price, usd(60_000));
        assert_eq!(shorts.size_usd, usd(100_000));
    }

    #[test]
    fn short_tracker_average_preserves_pending_delta() {
        let mut shorts = ShortInterest::default();
        shorts.record_increase(usd(100_000), usd(60_000)).unwrap();
        let (has_profit, delta_before) =
            shorts.get_delta(shorts.average_price, usd(58_000)).unwrap();
        assert!(has_profit);

        shorts.record_increase(usd(50_000), usd(58_000)).unwrap();
        let (still_profit, delta_after) =
            shorts.get_delta(shorts.average_price, usd(58_000)).unwrap();
        assert!(still_profit);
        let drift = delta_after.abs_diff(delta_before);
        assert!(drift <= 2, "delta drifted by {}", drift);
    }

    #[test]
    fn short_tracker_decrease_leaves_averages() {
        let mut shorts = ShortInterest::default();
        shorts.record_increase(usd(100_000), usd(60_000)).unwrap();
        shorts.record_increase(usd(100_000), usd(50_000)).unwrap();
        let average = shorts.average_price;
        let entry = shorts.entry_price;
        shorts.record_decrease(usd(150_000));
        assert_eq!(shorts.size_usd, usd(50_000));
        assert_eq!(shorts.average_price, average);
        assert_eq!(shorts.entry_price, entry);
        shorts.record_decrease(usd(80_000));
        assert_eq!(shorts.size_usd, 0);
    }

    #[test]
    fn short_tracker_not_ready_uses_entry_average() {
        let shorts = ShortInterest {
            size_usd: usd(10_000),
            average_price: 0,
            entry_price: usd(50_000),
            data_ready: false,
        };
        assert_eq!(shorts.blended_average_price(10_000).unwrap(), usd(50_000));
        let (has_profit, delta) = shorts.get_global_delta(10_000, usd(45_000)).unwrap();
        assert!(has_profit);
        assert_eq!(delta, usd(1_000));
    }

    #[test]
    fn short_tracker_blend_weights_both_sources() {
        let shorts = ShortInterest {
            size_usd: usd(10_000),
            average_price: usd(60_000),
            entry_price: usd(50_000),
            data_ready: true,
        };
        assert_eq!(shorts.blended_average_price(0).unwrap(), usd(50_000));
        assert_eq!(shorts.blended_average_price(10_000).unwrap(), usd(60_000));
        assert_eq!(shorts.blended_average_price(2_500).unwrap(), usd(52_500));
    }

    #[test]
    fn aum_for_stable_is_pool_value() {
        let asset = Asset {
            decimals: 6,
            config: AssetConfig {
                is_stable: true,
                ..AssetConfig::default()
            },
            balances: AssetBalances {
                pool_amount: 1_000_000_000,
                ..AssetBalances::default()
            },
            ..Asset::default()
        };
        let price = OraclePrice::new(1_000_000, -6);
        let (aum, deduction) = asset.get_aum_usd(&price, &price, 10_000).unwrap();
        assert_eq!(aum, usd(1_000));
        assert_eq!(deduction, 0);
    }

    #[test]
    fn aum_moves_with_short_pnl() {
        let mut asset = Asset {
            decimals: 6,
            balances: AssetBalances {
                pool_amount: 2_000_000,
                reserved_amount: 1_000_000,
                ..AssetBalances::default()
            },
            guaranteed_usd: usd(40_000),
            ..Asset::default()
        };
        asset.shorts.record_increase(usd(100_000), usd(60_000)).unwrap();

        // 1 unreserved token at 60k plus guaranteed USD; shorts flat.
        let price = OraclePrice::new(60_000_000_000, -6);
        let (aum, deduction) = asset.get_aum_usd(&price, &price, 10_000).unwrap();
        assert_eq!(aum, usd(100_000));
        assert_eq!(deduction, 0);

        // Mark below the shorts' average: their profit is a deduction.
        let down = OraclePrice::new(54_000_000_000, -6);
        let (aum, deduction) = asset.get_aum_usd(&price, &down, 10_000).unwrap();
        assert_eq!(aum, usd(100_000));
        assert_eq!(deduction, usd(10_000));

        // Mark above: their loss accrues to the pool.
        let up = OraclePrice::new(66_000_000_000, -6);
        let (aum, deduction) = asset.get_aum_usd(&price, &up, 10_000).unwrap();
        assert_eq!(aum, usd(110_000));
        assert_eq!(deduction, 0);
    }
}
