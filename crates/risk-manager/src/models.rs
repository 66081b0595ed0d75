use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use signal_core::{PositionType, TakeProfitLadder};

use crate::error::RiskError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskParameters {
    /// Share of the account that may be lost on one trade
    pub max_risk_fraction: Decimal,
    /// Stop distance in ATRs
    pub atr_multiplier: Decimal,
    /// Stop distance bounds, percent of entry
    pub min_stop_percent: Decimal,
    pub max_stop_percent: Decimal,
    /// Take-profit distances in multiples of the stop distance, nearest first
    pub take_profit_multiples: [Decimal; 3],
    /// Allocation-weighted R:R at or above which a plan "meets minimum"
    pub min_risk_reward: f64,
    /// Decimal places for stop and targets when entry >= 1; a narrow stop
    /// gets more
    pub price_precision: u32,
    /// Decimal places for position size
    pub size_precision: u32,
    /// Stop distance as percent of price when neither ATR nor volatility is known
    pub fallback_stop_percent: Decimal,
}

impl Default for RiskParameters {
    fn default() -> Self {
        Self {
            max_risk_fraction: dec!(0.02),
            atr_multiplier: dec!(1.5),
            min_stop_percent: dec!(0.5),
            max_stop_percent: dec!(10),
            take_profit_multiples: [dec!(1.5), dec!(2.5), dec!(4.0)],
            min_risk_reward: 2.0,
            price_precision: 2,
            size_precision: 8,
            fallback_stop_percent: dec!(2),
        }
    }
}

impl RiskParameters {
    pub fn validate(&self) -> Result<(), RiskError> {
        if self.max_risk_fraction <= Decimal::ZERO || self.max_risk_fraction > Decimal::ONE {
            return Err(RiskError::InvalidRiskFraction(self.max_risk_fraction));
        }
        if self.atr_multiplier <= Decimal::ZERO {
            return Err(RiskError::InvalidConfig(format!(
                "ATR multiplier must be positive, got {}",
                self.atr_multiplier
            )));
        }
        if self.min_stop_percent <= Decimal::ZERO || self.min_stop_percent > self.max_stop_percent {
            return Err(RiskError::InvalidConfig(format!(
                "stop bounds must satisfy 0 < min ({}) <= max ({})",
                self.min_stop_percent, self.max_stop_percent
            )));
        }
        if self.max_stop_percent >= dec!(100) {
            return Err(RiskError::InvalidConfig(
                "max stop must be below 100% of entry".to_string(),
            ));
        }
        let [m1, m2, m3] = self.take_profit_multiples;
        if m1 <= Decimal::ZERO || m1 >= m2 || m2 >= m3 {
            return Err(RiskError::InvalidConfig(format!(
                "take-profit multiples must be positive and increasing, got {}/{}/{}",
                m1, m2, m3
            )));
        }
        if self.fallback_stop_percent <= Decimal::ZERO {
            return Err(RiskError::InvalidConfig(
                "fallback stop percent must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// What the stop distance was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilitySource {
    Atr,
    RealizedVolatility,
    Fallback,
    /// Stop placed by a reviewer
    Manual,
}

/// Advisory only; a poor ratio never blocks a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskRewardVerdict {
    MeetsMinimum,
    Unfavorable,
}

impl RiskRewardVerdict {
    pub fn description(&self) -> &'static str {
        match self {
            RiskRewardVerdict::MeetsMinimum => "meets minimum requirement",
            RiskRewardVerdict::Unfavorable => "unfavorable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskPlan {
    pub position_type: PositionType,
    pub entry: Decimal,
    pub stop_loss: Decimal,
    pub stop_distance: Decimal,
    pub take_profits: TakeProfitLadder,
    pub risk_reward: f64,
    pub verdict: RiskRewardVerdict,
    pub position_size: Decimal,
    pub max_loss: Decimal,
    pub account_balance: Decimal,
    pub max_risk_fraction: Decimal,
    pub volatility_source: VolatilitySource,
}

impl RiskPlan {
    /// Loss if price goes straight to the stop.
    pub fn loss_at_stop(&self) -> Decimal {
        self.position_size * self.stop_distance
    }

    pub fn meets_minimum(&self) -> bool {
        self.verdict == RiskRewardVerdict::MeetsMinimum
    }
}
