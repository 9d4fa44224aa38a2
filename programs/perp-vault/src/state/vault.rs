//! Root vault state and shared helpers
//!
//! The Vault account is the singleton root of the program. It owns the
//! registered asset list, protocol configuration and the transfer authority
//! used for all token movements, and it hosts the fee, liquidation and NAV
//! math that spans more than one account.

use {
    crate::{
        error::VaultError,
        math,
        state::{asset::Asset, oracle::OraclePrice, position::Position},
    },
    anchor_lang::prelude::*,
    anchor_spl::token::{Burn, CloseAccount, MintTo, Transfer},
};

/// Profit and loss calculation result, USD with Vault::USD_DECIMALS decimals
#[derive(Copy, Clone, PartialEq, AnchorSerialize, AnchorDeserialize, Default, Debug)]
pub struct ProfitAndLoss {
    pub profit_usd: u128,
    pub loss_usd: u128,
}

/// Liquidation classification of a position.
///
/// `state` 0 means healthy, 1 means insolvent (losses or fees exhaust the
/// collateral) and calls for a full close, 2 means the position merely
/// exceeds maximum leverage and only needs to be reduced.
#[derive(Copy, Clone, PartialEq, AnchorSerialize, AnchorDeserialize, Default, Debug)]
pub struct LiquidationState {
    pub state: u8,
    pub margin_fee_usd: u128,
}

/// Full position readout for off-chain consumers
#[derive(Copy, Clone, PartialEq, AnchorSerialize, AnchorDeserialize, Default, Debug)]
pub struct PositionSnapshot {
    pub size_usd: u128,
    pub collateral_usd: u128,
    pub average_price: u128,
    pub entry_funding_rate: u128,
    pub reserve_amount: u64,
    pub realized_pnl_usd: i128,
    pub has_profit: bool,
    pub delta_usd: u128,
    pub last_increase_time: i64,
}

/// Permission flags controlling which operations are allowed
#[derive(Copy, Clone, PartialEq, AnchorSerialize, AnchorDeserialize, Default, Debug)]
pub struct Permissions {
    pub allow_swap: bool,
    pub allow_add_liquidity: bool,
    pub allow_remove_liquidity: bool,
    pub allow_increase_position: bool,
    pub allow_decrease_position: bool,
    pub allow_liquidation: bool,
}

/// Protocol fee rates. All rates are in basis points except the
/// liquidation fee, which is a flat USD amount.
#[derive(Copy, Clone, PartialEq, AnchorSerialize, AnchorDeserialize, Default, Debug)]
pub struct FeeConfig {
    pub swap_fee_bps: u64,
    pub stable_swap_fee_bps: u64,
    pub mint_burn_fee_bps: u64,
    /// Deviation tax ceiling for volatile assets
    pub tax_bps: u64,
    /// Deviation tax ceiling applied when both legs are stables
    pub stable_tax_bps: u64,
    pub margin_fee_bps: u64,
    pub liquidation_fee_usd: u128,
}

#[derive(Copy, Clone, PartialEq, AnchorSerialize, AnchorDeserialize, Default, Debug)]
pub struct FundingConfig {
    /// Accrual granularity in seconds
    pub funding_interval: i64,
    /// Rate per interval at full utilization, Vault::FUNDING_RATE_DECIMALS
    /// decimals
    pub funding_rate_factor: u64,
    pub stable_funding_rate_factor: u64,
}

/// Root program account
#[account]
#[derive(Default, Debug)]
pub struct Vault {
    /// Authority allowed to change configuration and withdraw fees
    pub authority: Pubkey,
    pub permissions: Permissions,
    pub fees: FeeConfig,
    pub funding: FundingConfig,
    /// Maximum position leverage in basis points (500_000 = 50x)
    pub max_leverage_bps: u64,
    /// Window after the last increase during which small profits are
    /// clamped to zero
    pub min_profit_time: i64,
    /// Blend weight of the tracked short average vs the plain entry
    /// average, in basis points
    pub shorts_tracker_average_price_weight_bps: u64,
    /// Sum of registered asset weights
    pub total_weights: u64,
    /// Sum of per-asset LP debt
    pub total_lp_debt_usd: u128,
    /// Registered asset accounts, in NAV walk order
    pub assets: Vec<Pubkey>,

    /// Bump seed for the transfer authority PDA
    pub transfer_authority_bump: u8,
    /// Bump seed for the vault PDA
    pub vault_bump: u8,
    /// Bump seed for the LP token mint PDA
    pub lp_token_bump: u8,
    /// Time of inception, also used as current wall clock time for testing
    pub inception_time: i64,
}

impl Vault {
    pub const LEN: usize = 8 + std::mem::size_of::<Vault>();
    /// Basis points decimal places (1 bps = 0.01%)
    pub const BPS_DECIMALS: u8 = 4;
    pub const BPS_POWER: u128 = 10u64.pow(Self::BPS_DECIMALS as u32) as u128;
    /// Decimal places for USD amounts
    pub const USD_DECIMALS: u8 = 30;
    pub const USD_POWER: u128 = 10u128.pow(Self::USD_DECIMALS as u32);
    /// Decimal places for funding rate accumulators
    pub const FUNDING_RATE_DECIMALS: u8 = 6;
    pub const FUNDING_RATE_POWER: u128 = 10u64.pow(Self::FUNDING_RATE_DECIMALS as u32) as u128;
    /// Decimal places for LP (liquidity provider) tokens
    pub const LP_DECIMALS: u8 = 6;
    pub const LP_POWER: u128 = 10u64.pow(Self::LP_DECIMALS as u32) as u128;

    /// Account size covering `registered` asset entries past the base layout
    pub fn size(registered: usize) -> usize {
        Self::LEN + registered * std::mem::size_of::<Pubkey>()
    }

    pub fn validate(&self) -> bool {
        self.funding.funding_interval > 0
            && self.max_leverage_bps as u128 > Self::BPS_POWER
            && (self.fees.swap_fee_bps as u128) < Self::BPS_POWER
            && (self.fees.stable_swap_fee_bps as u128) < Self::BPS_POWER
            && (self.fees.mint_burn_fee_bps as u128) < Self::BPS_POWER
            && (self.fees.tax_bps as u128) < Self::BPS_POWER
            && (self.fees.stable_tax_bps as u128) < Self::BPS_POWER
            && (self.fees.margin_fee_bps as u128) < Self::BPS_POWER
            && self.shorts_tracker_average_price_weight_bps as u128 <= Self::BPS_POWER
            && self.min_profit_time >= 0
    }

    /// Get current time (test mode - uses inception_time)
    #[cfg(feature = "test")]
    pub fn get_time(&self) -> Result<i64> {
        Ok(self.inception_time)
    }

    /// Get current time from Solana clock sysvar (production mode)
    #[cfg(not(feature = "test"))]
    pub fn get_time(&self) -> Result<i64> {
        let time = Clock::get()?.unix_timestamp;
        if time > 0 {
            Ok(time)
        } else {
            Err(ProgramError::InvalidAccountData.into())
        }
    }

    pub fn is_empty_account(account_info: &AccountInfo) -> Result<bool> {
        Ok(account_info.try_data_is_empty()? || account_info.try_lamports()? == 0)
    }

    /// This asset's target share of total LP debt, derived from its weight.
    pub fn get_target_lp_debt_usd(&self, asset: &Asset) -> Result<u128> {
        if self.total_weights == 0 {
            return Ok(0);
        }
        math::checked_u128_mul_div(
            self.total_lp_debt_usd,
            asset.config.weight as u128,
            self.total_weights as u128,
        )
    }

    /// Dynamic fee rate for moving `usd_delta` of LP debt into
    /// (`increment`) or out of an asset.
    ///
    /// Operations that bring the asset's share of LP debt closer to its
    /// weight-derived target earn a rebate proportional to the current
    /// deviation, bounded below by half the base fee. Operations that push
    /// it further away pay an extra tax proportional to the average
    /// deviation, bounded above by the full tax rate.
    pub fn get_fee_bps(
        &self,
        asset: &Asset,
        usd_delta: u128,
        base_fee_bps: u64,
        tax_bps: u64,
        increment: bool,
    ) -> Result<u64> {
        let target_usd = self.get_target_lp_debt_usd(asset)?;
        if target_usd == 0 {
            return Ok(base_fee_bps);
        }

        let initial_usd = asset.lp_debt_usd;
        let next_usd = if increment {
            math::checked_add(initial_usd, usd_delta)?
        } else {
            initial_usd.saturating_sub(usd_delta)
        };

        let initial_diff_usd = initial_usd.abs_diff(target_usd);
        let next_diff_usd = next_usd.abs_diff(target_usd);

        if next_diff_usd < initial_diff_usd {
            let rebate_bps = std::cmp::min(
                math::checked_u128_mul_div(tax_bps as u128, initial_diff_usd, target_usd)?,
                tax_bps as u128,
            ) as u64;
            return Ok(std::cmp::max(
                base_fee_bps.saturating_sub(rebate_bps),
                base_fee_bps / 2,
            ));
        }

        let mut average_diff_usd = math::checked_div(
            math::checked_add(initial_diff_usd, next_diff_usd)?,
            2u128,
        )?;
        if average_diff_usd > target_usd {
            average_diff_usd = target_usd;
        }
        let extra_tax_bps =
            math::checked_u128_mul_div(tax_bps as u128, average_diff_usd, target_usd)? as u64;
        math::checked_add(base_fee_bps, extra_tax_bps)
    }

    /// Swap fee is quoted on both legs and the worse one applies, once, to
    /// the output amount.
    pub fn get_swap_fee_bps(
        &self,
        asset_in: &Asset,
        asset_out: &Asset,
        usd_delta: u128,
    ) -> Result<u64> {
        let stable_swap = asset_in.config.is_stable && asset_out.config.is_stable;
        let (base_fee_bps, tax_bps) = if stable_swap {
            (self.fees.stable_swap_fee_bps, self.fees.stable_tax_bps)
        } else {
            (self.fees.swap_fee_bps, self.fees.tax_bps)
        };
        let fee_in_bps = self.get_fee_bps(asset_in, usd_delta, base_fee_bps, tax_bps, true)?;
        let fee_out_bps = self.get_fee_bps(asset_out, usd_delta, base_fee_bps, tax_bps, false)?;
        Ok(std::cmp::max(fee_in_bps, fee_out_bps))
    }

    /// Fee amount in tokens, rounded against the user.
    pub fn get_fee_amount(&self, fee_bps: u64, amount: u64) -> Result<u64> {
        if fee_bps == 0 || amount == 0 {
            return Ok(0);
        }
        math::checked_as_u64(math::checked_u128_mul_div_ceil(
            amount as u128,
            fee_bps as u128,
            Self::BPS_POWER,
        )?)
    }

    /// Margin fee on a size change, rounded against the user.
    pub fn get_position_fee_usd(&self, size_delta_usd: u128) -> Result<u128> {
        if size_delta_usd == 0 {
            return Ok(0);
        }
        math::checked_u128_mul_div_ceil(
            size_delta_usd,
            self.fees.margin_fee_bps as u128,
            Self::BPS_POWER,
        )
    }

    /// Classifies a position against the liquidation rules, in order:
    /// losses exhausting collateral, then the flat liquidation fee, then
    /// outstanding margin and funding fees, each forcing a full close
    /// (state 1); then maximum leverage, forcing a reduction (state 2).
    ///
    /// With `raise` set, a healthy position is an error. Callers that use
    /// the classification to assert health pass `raise = false` and check
    /// for state 0.
    pub fn validate_liquidation(
        &self,
        position: &Position,
        cumulative_funding_rate: u128,
        min_profit_bps: u64,
        mark_price: u128,
        current_time: i64,
        raise: bool,
    ) -> Result<LiquidationState> {
        let (has_profit, delta_usd) = position.get_delta(
            mark_price,
            self.min_profit_time,
            min_profit_bps,
            current_time,
        )?;
        let margin_fee_usd = math::checked_add(
            position.get_funding_fee_usd(cumulative_funding_rate)?,
            self.get_position_fee_usd(position.size_usd)?,
        )?;

        if !has_profit && delta_usd > position.collateral_usd {
            msg!("Losses exceed collateral");
            return Ok(LiquidationState {
                state: 1,
                margin_fee_usd,
            });
        }

        let remaining_collateral_usd = if has_profit {
            position.collateral_usd
        } else {
            math::checked_sub(position.collateral_usd, delta_usd)?
        };

        if remaining_collateral_usd < self.fees.liquidation_fee_usd {
            msg!("Remaining collateral does not cover the liquidation fee");
            return Ok(LiquidationState {
                state: 1,
                margin_fee_usd,
            });
        }

        if remaining_collateral_usd < margin_fee_usd {
            msg!("Remaining collateral does not cover outstanding fees");
            return Ok(LiquidationState {
                state: 1,
                margin_fee_usd,
            });
        }

        // Compare collateral * max_leverage with size * BPS_POWER; both
        // products can exceed u128.
        let scaled_collateral =
            math::U256::mul_u128(remaining_collateral_usd, self.max_leverage_bps as u128);
        let scaled_size = math::U256::mul_u128(position.size_usd, Vault::BPS_POWER);
        if scaled_collateral < scaled_size {
            msg!("Position exceeds maximum leverage");
            return Ok(LiquidationState {
                state: 2,
                margin_fee_usd,
            });
        }

        if raise {
            return err!(VaultError::PositionNotLiquidatable);
        }
        Ok(LiquidationState {
            state: 0,
            margin_fee_usd,
        })
    }

    /// Post-trade health assertion for increase and decrease flows.
    pub fn check_position_health(
        &self,
        position: &Position,
        cumulative_funding_rate: u128,
        min_profit_bps: u64,
        mark_price: u128,
        current_time: i64,
    ) -> Result<()> {
        let liquidation_state = self.validate_liquidation(
            position,
            cumulative_funding_rate,
            min_profit_bps,
            mark_price,
            current_time,
            false,
        )?;
        match liquidation_state.state {
            0 => Ok(()),
            2 => err!(VaultError::MaxLeverage),
            _ => err!(VaultError::InsufficientCollateral),
        }
    }

    /// Net asset value of the whole pool in USD.
    ///
    /// `accounts` carries the registered asset accounts in registration
    /// order followed by their oracle accounts in the same order. With
    /// `maximize` the unreserved pool is valued at the upper price bound
    /// while shorts are marked at the lower one, and vice versa, so the two
    /// readings bracket the NAV. Floors at zero when aggregate short
    /// profits exceed everything else.
    pub fn get_assets_under_management_usd(
        &self,
        accounts: &[AccountInfo],
        current_time: i64,
        maximize: bool,
    ) -> Result<u128> {
        let mut pool_aum_usd: u128 = 0;
        let mut short_profits_usd: u128 = 0;
        for (idx, &asset_key) in self.assets.iter().enumerate() {
            let oracle_idx = idx + self.assets.len();
            if oracle_idx >= accounts.len() {
                return Err(VaultError::UnsupportedOracle.into());
            }

            require_keys_eq!(accounts[idx].key(), asset_key);
            let data = accounts[idx].try_borrow_data()?;
            let asset = Asset::try_deserialize(&mut &data[..])?;

            require_keys_eq!(accounts[oracle_idx].key(), asset.oracle.oracle_account);
            let spot_price = OraclePrice::new_from_oracle(
                &accounts[oracle_idx],
                &asset.oracle,
                current_time,
                false,
            )?;
            let ema_price = if asset.config.use_ema {
                OraclePrice::new_from_oracle(
                    &accounts[oracle_idx],
                    &asset.oracle,
                    current_time,
                    true,
                )?
            } else {
                spot_price
            };
            let min_price = spot_price.get_min_price(&ema_price, asset.config.is_stable)?;
            let max_price = spot_price.get_max_price(&ema_price);

            let (pool_price, short_mark_price) = if maximize {
                (max_price, min_price)
            } else {
                (min_price, max_price)
            };
            let (aum_usd, short_profit_usd) = asset.get_aum_usd(
                &pool_price,
                &short_mark_price,
                self.shorts_tracker_average_price_weight_bps,
            )?;
            pool_aum_usd = math::checked_add(pool_aum_usd, aum_usd)?;
            short_profits_usd = math::checked_add(short_profits_usd, short_profit_usd)?;
        }
        Ok(pool_aum_usd.saturating_sub(short_profits_usd))
    }

    pub fn transfer_tokens<'info>(
        &self,
        from: AccountInfo<'info>,
        to: AccountInfo<'info>,
        authority: AccountInfo<'info>,
        token_program: AccountInfo<'info>,
        amount: u64,
    ) -> Result<()> {
        let authority_seeds: &[&[&[u8]]] =
            &[&[b"transfer_authority", &[self.transfer_authority_bump]]];

        let context = CpiContext::new(
            token_program,
            Transfer {
                from,
                to,
                authority,
            },
        )
        .with_signer(authority_seeds);

        anchor_spl::token::transfer(context, amount)
    }

    pub fn transfer_tokens_from_user<'info>(
        &self,
        from: AccountInfo<'info>,
        to: AccountInfo<'info>,
        authority: AccountInfo<'info>,
        token_program: AccountInfo<'info>,
        amount: u64,
    ) -> Result<()> {
        let context = CpiContext::new(
            token_program,
            Transfer {
                from,
                to,
                authority,
            },
        );
        anchor_spl::token::transfer(context, amount)
    }

    pub fn mint_tokens<'info>(
        &self,
        mint: AccountInfo<'info>,
        to: AccountInfo<'info>,
        authority: AccountInfo<'info>,
        token_program: AccountInfo<'info>,
        amount: u64,
    ) -> Result<()> {
        let authority_seeds: &[&[&[u8]]] =
            &[&[b"transfer_authority", &[self.transfer_authority_bump]]];

        let context = CpiContext::new(
            token_program,
            MintTo {
                mint,
                to,
                authority,
            },
        )
        .with_signer(authority_seeds);

        anchor_spl::token::mint_to(context, amount)
    }

    pub fn burn_tokens<'info>(
        &self,
        mint: AccountInfo<'info>,
        from: AccountInfo<'info>,
        authority: AccountInfo<'info>,
        token_program: AccountInfo<'info>,
        amount: u64,
    ) -> Result<()> {
        let context = CpiContext::new(
            token_program,
            Burn {
                mint,
                from,
                authority,
            },
        );

        anchor_spl::token::burn(context, amount)
    }

    pub fn close_token_account<'info>(
        &self,
        receiver: AccountInfo<'info>,
        token_account: AccountInfo<'info>,
        token_program: AccountInfo<'info>,
        authority: AccountInfo<'info>,
    ) -> Result<()> {
        let authority_seeds: &[&[&[u8]]] =
            &[&[b"transfer_authority", &[self.transfer_authority_bump]]];

        let context = CpiContext::new(
            token_program,
            CloseAccount {
                account: token_account,
                destination: receiver,
                authority,
            },
        );

        anchor_spl::token::close_account(context.with_signer(authority_seeds))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::state::{
        asset::{AssetBalances, AssetConfig},
        oracle::{CustomOracle, OracleParams, OracleType},
        position::Side,
    };

    fn usd(value: u64) -> u128 {
        value as u128 * Vault::USD_POWER
    }

    fn test_vault() -> Vault {
        Vault {
            fees: FeeConfig {
                swap_fee_bps: 30,
                stable_swap_fee_bps: 4,
                mint_burn_fee_bps: 30,
                tax_bps: 30,
                stable_tax_bps: 5,
                margin_fee_bps: 10,
                liquidation_fee_usd: usd(5),
            },
            funding: FundingConfig {
                funding_interval: 3600,
                funding_rate_factor: 100,
                stable_funding_rate_factor: 50,
            },
            max_leverage_bps: 500_000,
            total_weights: 2,
            total_lp_debt_usd: usd(30_000),
            ..Vault::default()
        }
    }

    fn weighted_asset(lp_debt_usd: u128) -> Asset {
        Asset {
            config: AssetConfig {
                weight: 1,
                ..AssetConfig::default()
            },
            lp_debt_usd,
            ..Asset::default()
        }
    }

    fn short_position(size: u64, average_price: u64, collateral: u64) -> Position {
        Position {
            side: Side::Short,
            size_usd: usd(size),
            collateral_usd: usd(collateral),
            average_price: usd(average_price),
            ..Position::default()
        }
    }

    #[test]
    fn fee_bps_is_base_without_target() {
        let mut vault = test_vault();
        vault.total_weights = 0;
        let asset = weighted_asset(usd(10_000));
        assert_eq!(
            vault.get_fee_bps(&asset, usd(1_000), 30, 30, true).unwrap(),
            30
        );
    }

    #[test]
    fn fee_bps_taxes_moves_away_from_target() {
        let vault = test_vault();
        // Target is 15k; the asset sits exactly on it.
        let asset = weighted_asset(usd(15_000));
        // 10k deposit averages 5k of deviation: tax 30 * 5/15 = 10.
        assert_eq!(
            vault.get_fee_bps(&asset, usd(10_000), 30, 30, true).unwrap(),
            40
        );
        // Huge deposit caps the average deviation at the target itself.
        assert_eq!(
            vault.get_fee_bps(&asset, usd(40_000), 30, 30, true).unwrap(),
            60
        );
    }

    #[test]
    fn fee_bps_rebates_moves_toward_target() {
        let vault = test_vault();
        let asset = weighted_asset(usd(25_000));
        // Rebate 10 * 10k/15k = 6 off the base fee.
        assert_eq!(
            vault
                .get_fee_bps(&asset, usd(10_000), 30, 10, false)
                .unwrap(),
            24
        );
    }

    #[test]
    fn fee_bps_rebate_floors_at_half_base() {
        let vault = test_vault();
        let asset = weighted_asset(usd(25_000));
        // Raw rebate would be 20, leaving 10, but the fee never drops below
        // half the base rate.
        assert_eq!(
            vault
                .get_fee_bps(&asset, usd(10_000), 30, 30, false)
                .unwrap(),
            15
        );
    }

    #[test]
    fn swap_fee_takes_the_worse_leg() {
        let vault = test_vault();
        let asset_in = weighted_asset(usd(15_000));
        let asset_out = weighted_asset(usd(25_000));
        // In-leg moves away (30 + 5), out-leg would rebate down to 15.
        assert_eq!(
            vault
                .get_swap_fee_bps(&asset_in, &asset_out, usd(5_000))
                .unwrap(),
            35
        );
    }

    #[test]
    fn stable_swap_uses_stable_rates() {
        let vault = test_vault();
        let mut asset_in = weighted_asset(usd(15_000));
        let mut asset_out = weighted_asset(usd(15_000));
        asset_in.config.is_stable = true;
        asset_out.config.is_stable = true;
        // Both legs on target moving away by 2.5k average: tax 5 * 2.5/15
        // floors to 0, so the stable base fee stands.
        assert_eq!(
            vault
                .get_swap_fee_bps(&asset_in, &asset_out, usd(5_000))
                .unwrap(),
            4
        );
    }

    #[test]
    fn position_fee_rounds_against_user() {
        let vault = test_vault();
        assert_eq!(vault.get_position_fee_usd(usd(2_000)).unwrap(), usd(2));
        assert_eq!(vault.get_position_fee_usd(0).unwrap(), 0);
        // 10 bps of 999 units rounds 0.999 up to 1.
        assert_eq!(vault.get_position_fee_usd(999).unwrap(), 1);
    }

    #[test]
    fn fee_amount_rounds_up() {
        let vault = test_vault();
        assert_eq!(vault.get_fee_amount(30, 10_000).unwrap(), 30);
        assert_eq!(vault.get_fee_amount(30, 10_001).unwrap(), 31);
        assert_eq!(vault.get_fee_amount(0, 10_000).unwrap(), 0);
    }

    #[test]
    fn healthy_position_classifies_state_0() {
        let vault = test_vault();
        let position = short_position(100_000, 60_000, 10_000);
        let state = vault
            .validate_liquidation(&position, 0, 0, usd(60_000), 1, false)
            .unwrap();
        assert_eq!(state.state, 0);
        assert_eq!(state.margin_fee_usd, usd(100));
    }

    #[test]
    fn raise_rejects_healthy_position() {
        let vault = test_vault();
        let position = short_position(100_000, 60_000, 10_000);
        assert!(vault
            .validate_liquidation(&position, 0, 0, usd(60_000), 1, true)
            .is_err());
        // Liquidatable positions pass through untouched under raise.
        let state = vault
            .validate_liquidation(&position, 0, 0, usd(66_600), 1, true)
            .unwrap();
        assert_eq!(state.state, 1);
    }

    #[test]
    fn losses_beyond_collateral_classify_state_1() {
        let vault = test_vault();
        let position = short_position(100_000, 60_000, 10_000);
        // 11% adverse move on a 10x position: loss 11k > 10k collateral.
        let state = vault
            .validate_liquidation(&position, 0, 0, usd(66_600), 1, false)
            .unwrap();
        assert_eq!(state.state, 1);
    }

    #[test]
    fn fee_shortfall_classifies_state_1() {
        let vault = test_vault();
        let position = short_position(100_000, 60_000, 10_000);
        // Loss of 9,950 leaves 50: covers the 5 USD liquidation fee but not
        // the 100 USD margin fee.
        let state = vault
            .validate_liquidation(&position, 0, 0, usd(65_970), 1, false)
            .unwrap();
        assert_eq!(state.state, 1);
    }

    #[test]
    fn liquidation_fee_boundary_is_exact() {
        let mut vault = test_vault();
        vault.fees.margin_fee_bps = 0;
        vault.fees.liquidation_fee_usd = usd(50);
        vault.max_leverage_bps = u64::MAX;
        let position = short_position(100_000, 60_000, 10_000);
        // Loss of 9,950 leaves exactly the liquidation fee: still healthy.
        let state = vault
            .validate_liquidation(&position, 0, 0, usd(65_970), 1, false)
            .unwrap();
        assert_eq!(state.state, 0);
        // One more dollar of fee flips it.
        vault.fees.liquidation_fee_usd = usd(51);
        let state = vault
            .validate_liquidation(&position, 0, 0, usd(65_970), 1, false)
            .unwrap();
        assert_eq!(state.state, 1);
    }

    #[test]
    fn excess_leverage_classifies_state_2() {
        let vault = test_vault();
        let position = short_position(100_000, 60_000, 10_000);
        // Loss of 8,000 leaves 2,000: exactly 50x, the configured maximum.
        let state = vault
            .validate_liquidation(&position, 0, 0, usd(64_800), 1, false)
            .unwrap();
        assert_eq!(state.state, 0);
        // Loss of 8,300 leaves 1,700: about 59x.
        let state = vault
            .validate_liquidation(&position, 0, 0, usd(64_980), 1, false)
            .unwrap();
        assert_eq!(state.state, 2);
    }

    #[test]
    fn funding_debt_counts_toward_fees() {
        let mut vault = test_vault();
        vault.fees.margin_fee_bps = 0;
        let mut position = short_position(100_000, 60_000, 10_000);
        position.entry_funding_rate = 0;
        // 2,500 / 1e6 of size = 250 USD owed in funding.
        let state = vault
            .validate_liquidation(&position, 2_500, 0, usd(60_000), 1, false)
            .unwrap();
        assert_eq!(state.state, 0);
        assert_eq!(state.margin_fee_usd, usd(250));
    }

    #[test]
    fn health_check_maps_states_to_errors() {
        let vault = test_vault();
        let position = short_position(100_000, 60_000, 10_000);
        assert!(vault
            .check_position_health(&position, 0, 0, usd(60_000), 1)
            .is_ok());
        assert!(vault
            .check_position_health(&position, 0, 0, usd(64_980), 1)
            .is_err());
        assert!(vault
            .check_position_health(&position, 0, 0, usd(66_600), 1)
            .is_err());
    }

    #[test]
    fn target_share_follows_weights() {
        let vault = test_vault();
        let asset = weighted_asset(0);
        assert_eq!(vault.get_target_lp_debt_usd(&asset).unwrap(), usd(15_000));
    }

    #[test]
    fn account_size_shrinks_without_underflow() {
        assert_eq!(Vault::size(0), Vault::LEN);
        assert_eq!(
            Vault::size(3),
            Vault::LEN + 3 * std::mem::size_of::<Pubkey>()
        );
        // Resizing down from an empty registration list stays at the base
        // layout instead of wrapping.
        let vault = Vault::default();
        assert_eq!(
            Vault::size(vault.assets.len().saturating_sub(1)),
            Vault::LEN
        );
    }

    #[test]
    fn composite_fee_on_routed_deposit() {
        let vault = test_vault();
        // 200 USDC (6 decimals) enter through the 30 bps swap leg, then the
        // 10 bps margin fee on the 2,000 USD increase comes off the top.
        let deposit: u64 = 200_000_000;
        let swap_fee = vault
            .get_fee_amount(vault.fees.swap_fee_bps, deposit)
            .unwrap();
        assert_eq!(swap_fee, 600_000);

        let one_usd = OraclePrice::new(1_000_000, -6);
        let collateral_usd = one_usd
            .get_asset_amount_usd(deposit - swap_fee, 6)
            .unwrap();
        let position_fee = vault.get_position_fee_usd(usd(2_000)).unwrap();
        assert_eq!(position_fee, usd(2));

        // 200 − 0.60 − 2.00 = 197.40 of collateral against the 2,000 size
        assert_eq!(collateral_usd - position_fee, usd(1_974) / 10);
    }

    #[test]
    fn aum_walk_deserializes_assets_and_oracles() {
        let asset_key = Pubkey::new_unique();
        let oracle_key = Pubkey::new_unique();
        let owner = crate::ID;

        let oracle = CustomOracle {
            price: 1_000_000,
            expo: -6,
            conf: 0,
            ema: 1_000_000,
            publish_time: 100,
        };
        let asset = Asset {
            decimals: 6,
            oracle: OracleParams {
                oracle_account: oracle_key,
                oracle_type: OracleType::Custom,
                max_price_error: 10_000,
                max_price_age_sec: 60,
            },
            config: AssetConfig {
                is_stable: true,
                ..AssetConfig::default()
            },
            balances: AssetBalances {
                held: 150_000_000_000,
                pool_amount: 150_000_000_000,
                ..AssetBalances::default()
            },
            ..Asset::default()
        };

        let mut asset_data: Vec<u8> = Vec::new();
        asset.try_serialize(&mut asset_data).unwrap();
        let mut oracle_data: Vec<u8> = Vec::new();
        oracle.try_serialize(&mut oracle_data).unwrap();

        let mut asset_lamports = 1u64;
        let mut oracle_lamports = 1u64;
        let accounts = [
            AccountInfo::new(
                &asset_key,
                false,
                false,
                &mut asset_lamports,
                &mut asset_data,
                &owner,
                false,
                0,
            ),
            AccountInfo::new(
                &oracle_key,
                false,
                false,
                &mut oracle_lamports,
                &mut oracle_data,
                &owner,
                false,
                0,
            ),
        ];

        let mut vault = test_vault();
        vault.assets = vec![asset_key];
        // 150k stable pool tokens at 1 USD, in both price directions.
        assert_eq!(
            vault
                .get_assets_under_management_usd(&accounts, 110, true)
                .unwrap(),
            usd(150_000)
        );
        assert_eq!(
            vault
                .get_assets_under_management_usd(&accounts, 110, false)
                .unwrap(),
            usd(150_000)
        );
    }
}
