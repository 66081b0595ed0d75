use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use signal_core::{
    MarketSnapshot, PositionType, SignalAdjustments, TakeProfitLadder, TAKE_PROFIT_ALLOCATIONS,
};
use tracing::debug;

use crate::error::RiskError;
use crate::models::{RiskParameters, RiskPlan, RiskRewardVerdict, VolatilitySource};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Sub-unit prices keep this many places regardless of `price_precision`.
const SUB_UNIT_PRICE_PRECISION: u32 = 8;

const MAX_PRICE_PRECISION: u32 = 28;

/// Fewest price ticks a stop distance may span before prices get more places.
const MIN_TICKS_PER_STOP: i64 = 100;

/// Explicit price levels for a plan; `take_profits: None` derives the ladder
/// from the configured R multiples.
#[derive(Debug, Clone, Copy)]
pub struct PlanLevels {
    pub position_type: PositionType,
    pub entry: Decimal,
    pub stop_loss: Decimal,
    pub take_profits: Option<[Decimal; 3]>,
    pub account_balance: Decimal,
    pub max_risk_fraction: Decimal,
    pub volatility_source: VolatilitySource,
}

#[derive(Debug, Clone, Default)]
pub struct RiskEngine {
    params: RiskParameters,
}

impl RiskEngine {
    pub fn new(params: RiskParameters) -> Result<Self, RiskError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &RiskParameters {
        &self.params
    }

    /// Builds stop, size and take-profit ladder for `snapshot`.
    ///
    /// `max_risk_fraction` falls back to the configured cap (2% by default).
    pub fn build_risk_plan(
        &self,
        snapshot: &MarketSnapshot,
        position_type: PositionType,
        account_balance: Decimal,
        max_risk_fraction: Option<Decimal>,
    ) -> Result<RiskPlan, RiskError> {
        let entry = Decimal::from_f64(snapshot.price)
            .filter(|p| *p > Decimal::ZERO)
            .ok_or_else(|| RiskError::InvalidPrice(format!("entry {}", snapshot.price)))?;

        let (distance, source) = self.stop_distance(snapshot, entry)?;
        let stop_loss = self.offset_price(entry, -position_type.sign(), Decimal::ONE, distance)?;

        self.plan(PlanLevels {
            position_type,
            entry,
            stop_loss,
            take_profits: None,
            account_balance,
            max_risk_fraction: max_risk_fraction.unwrap_or(self.params.max_risk_fraction),
            volatility_source: source,
        })
    }

    /// Stop distance from ATR, else realized volatility, else the fallback
    /// percentage, clamped to the configured bounds.
    pub fn stop_distance(
        &self,
        snapshot: &MarketSnapshot,
        entry: Decimal,
    ) -> Result<(Decimal, VolatilitySource), RiskError> {
        let p = &self.params;

        let atr = snapshot
            .technical
            .atr
            .and_then(Decimal::from_f64)
            .filter(|atr| *atr > Decimal::ZERO);
        let volatility = snapshot
            .risk
            .volatility_pct
            .and_then(Decimal::from_f64)
            .filter(|v| *v > Decimal::ZERO);

        let (raw, source) = match (atr, volatility) {
            (Some(atr), _) => (
                checked(atr.checked_mul(p.atr_multiplier), "ATR stop distance")?,
                VolatilitySource::Atr,
            ),
            (None, Some(v)) => (
                percent_of(entry, v, "volatility stop distance")?,
                VolatilitySource::RealizedVolatility,
            ),
            (None, None) => (
                percent_of(entry, p.fallback_stop_percent, "fallback stop distance")?,
                VolatilitySource::Fallback,
            ),
        };

        let min = percent_of(entry, p.min_stop_percent, "minimum stop distance")?;
        let max = percent_of(entry, p.max_stop_percent, "maximum stop distance")?;
        Ok((raw.clamp(min, max), source))
    }

    /// Sizes and ladders a plan from explicit levels.
    pub fn plan(&self, levels: PlanLevels) -> Result<RiskPlan, RiskError> {
        let PlanLevels {
            position_type,
            entry,
            stop_loss,
            take_profits,
            account_balance,
            max_risk_fraction,
            volatility_source,
        } = levels;

        if account_balance <= Decimal::ZERO {
            return Err(RiskError::InvalidAccountBalance(account_balance));
        }
        if max_risk_fraction <= Decimal::ZERO || max_risk_fraction > Decimal::ONE {
            return Err(RiskError::InvalidRiskFraction(max_risk_fraction));
        }
        if entry <= Decimal::ZERO {
            return Err(RiskError::InvalidPrice(format!("entry {}", entry)));
        }
        if stop_loss <= Decimal::ZERO {
            return Err(RiskError::InvalidPrice(format!("stop loss {}", stop_loss)));
        }

        let sign = Decimal::from(position_type.sign());
        if (entry - stop_loss) * sign <= Decimal::ZERO {
            return Err(RiskError::InvalidPrice(format!(
                "stop loss {} is on the wrong side of entry {} for a {} position",
                stop_loss, entry, position_type
            )));
        }
        let stop_distance = (entry - stop_loss).abs();

        let max_loss = checked(account_balance.checked_mul(max_risk_fraction), "max loss")?;
        // Truncate so a move straight to the stop never loses more than max_loss
        let position_size = checked(max_loss.checked_div(stop_distance), "position size")?
            .round_dp_with_strategy(self.params.size_precision, RoundingStrategy::ToZero);
        if position_size <= Decimal::ZERO {
            return Err(RiskError::InvalidAccountBalance(account_balance));
        }

        let prices = match take_profits {
            Some(prices) => ordered_targets(prices, entry, position_type)?,
            None => {
                let [m1, m2, m3] = self.params.take_profit_multiples;
                let side = position_type.sign();
                [
                    self.offset_price(entry, side, m1, stop_distance)?,
                    self.offset_price(entry, side, m2, stop_distance)?,
                    self.offset_price(entry, side, m3, stop_distance)?,
                ]
            }
        };
        let ladder = TakeProfitLadder::from_prices(prices);

        let risk_reward = risk_reward(&ladder, entry, stop_distance)?;
        let verdict = if risk_reward >= self.params.min_risk_reward {
            RiskRewardVerdict::MeetsMinimum
        } else {
            RiskRewardVerdict::Unfavorable
        };

        debug!(
            "{} plan: entry {} stop {} ({:?}) size {} max loss {} R:R {:.2} ({})",
            position_type,
            entry,
            stop_loss,
            volatility_source,
            position_size,
            max_loss,
            risk_reward,
            verdict.description()
        );

        Ok(RiskPlan {
            position_type,
            entry,
            stop_loss,
            stop_distance,
            take_profits: ladder,
            risk_reward,
            verdict,
            position_size,
            max_loss,
            account_balance,
            max_risk_fraction,
            volatility_source,
        })
    }

    /// Re-plans from reviewer adjustments.
    ///
    /// Moving only the entry keeps the stop distance. Targets are kept only
    /// when entry and stop are unchanged; otherwise they are re-derived.
    pub fn replan(
        &self,
        base: &RiskPlan,
        adjustments: &SignalAdjustments,
    ) -> Result<RiskPlan, RiskError> {
        let entry = adjustments.entry.unwrap_or(base.entry);

        let (stop_loss, volatility_source) = match adjustments.stop_loss {
            Some(stop) => (stop, VolatilitySource::Manual),
            None if entry == base.entry => (base.stop_loss, base.volatility_source),
            None => (
                self.offset_price(
                    entry,
                    -base.position_type.sign(),
                    Decimal::ONE,
                    base.stop_distance,
                )?,
                base.volatility_source,
            ),
        };

        let take_profits = adjustments.take_profits.or_else(|| {
            (entry == base.entry && stop_loss == base.stop_loss).then(|| base.take_profits.prices())
        });

        self.plan(PlanLevels {
            position_type: base.position_type,
            entry,
            stop_loss,
            take_profits,
            account_balance: adjustments.account_balance.unwrap_or(base.account_balance),
            max_risk_fraction: base.max_risk_fraction,
            volatility_source,
        })
    }

    /// `entry + side * multiple * distance`, rounded to the price tick.
    fn offset_price(
        &self,
        entry: Decimal,
        side: i32,
        multiple: Decimal,
        distance: Decimal,
    ) -> Result<Decimal, RiskError> {
        let offset = checked(multiple.checked_mul(distance), "price offset")?;
        let price = if side < 0 {
            checked(entry.checked_sub(offset), "price level")?
        } else {
            checked(entry.checked_add(offset), "price level")?
        };
        Ok(price.round_dp(self.price_precision(entry, distance)))
    }

    /// Configured places for the price range, made finer until the stop
    /// distance spans at least `MIN_TICKS_PER_STOP` ticks.
    fn price_precision(&self, entry: Decimal, distance: Decimal) -> u32 {
        let mut dp = if entry >= Decimal::ONE {
            self.params.price_precision
        } else {
            SUB_UNIT_PRICE_PRECISION
        };
        while dp < MAX_PRICE_PRECISION && Decimal::new(MIN_TICKS_PER_STOP, dp) > distance {
            dp += 1;
        }
        dp
    }
}

fn checked(value: Option<Decimal>, what: &str) -> Result<Decimal, RiskError> {
    value.ok_or_else(|| RiskError::Overflow(what.to_string()))
}

fn percent_of(value: Decimal, percent: Decimal, what: &str) -> Result<Decimal, RiskError> {
    checked(
        value.checked_mul(percent).and_then(|v| v.checked_div(HUNDRED)),
        what,
    )
}

/// Validates reviewer targets and orders them nearest first.
fn ordered_targets(
    prices: [Decimal; 3],
    entry: Decimal,
    position_type: PositionType,
) -> Result<[Decimal; 3], RiskError> {
    let sign = Decimal::from(position_type.sign());
    for price in prices {
        if (price - entry) * sign <= Decimal::ZERO {
            return Err(RiskError::InvalidTarget(format!(
                "{} is not beyond entry {} for a {} position",
                price, entry, position_type
            )));
        }
    }

    let mut ordered = prices;
    ordered.sort_by_key(|p| (*p - entry).abs());
    if ordered[0] == ordered[1] || ordered[1] == ordered[2] {
        return Err(RiskError::InvalidTarget(
            "take-profit prices must be distinct".to_string(),
        ));
    }
    Ok(ordered)
}

/// Allocation-weighted reward distance over risk distance, to 2 places.
fn risk_reward(
    ladder: &TakeProfitLadder,
    entry: Decimal,
    stop_distance: Decimal,
) -> Result<f64, RiskError> {
    let mut weighted = Decimal::ZERO;
    for (price, alloc) in ladder.prices().iter().zip(TAKE_PROFIT_ALLOCATIONS) {
        let share = checked(
            (*price - entry).abs().checked_mul(Decimal::from(alloc)),
            "risk/reward",
        )?;
        weighted = checked(weighted.checked_add(share), "risk/reward")?;
    }

    let ratio = checked(
        (weighted / HUNDRED).checked_div(stop_distance),
        "risk/reward",
    )?;
    Ok(ratio.round_dp(2).to_f64().unwrap_or(0.0))
}
