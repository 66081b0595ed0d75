use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ParseError;

/// Fixed capital split across the three take-profit tiers (nearest first).
pub const TAKE_PROFIT_ALLOCATIONS: [u8; 3] = [50, 30, 20];

/// Timeframe for analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    Minute1,
    #[serde(rename = "5m")]
    Minute5,
    #[serde(rename = "15m")]
    Minute15,
    #[serde(rename = "30m")]
    Minute30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "1d")]
    Day1,
    #[serde(rename = "1w")]
    Week1,
    #[serde(rename = "1M")]
    Month1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Minute1 => "1m",
            Timeframe::Minute5 => "5m",
            Timeframe::Minute15 => "15m",
            Timeframe::Minute30 => "30m",
            Timeframe::Hour1 => "1h",
            Timeframe::Hour4 => "4h",
            Timeframe::Day1 => "1d",
            Timeframe::Week1 => "1w",
            Timeframe::Month1 => "1M",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // "1M" is the only case-sensitive spelling (month vs minute)
        if s.trim() == "1M" {
            return Ok(Timeframe::Month1);
        }
        match s.trim().to_ascii_lowercase().as_str() {
            "1m" | "1min" => Ok(Timeframe::Minute1),
            "5m" | "5min" => Ok(Timeframe::Minute5),
            "15m" | "15min" => Ok(Timeframe::Minute15),
            "30m" | "30min" => Ok(Timeframe::Minute30),
            "1h" | "1hour" | "60m" => Ok(Timeframe::Hour1),
            "4h" | "4hour" => Ok(Timeframe::Hour4),
            "1d" | "daily" | "1day" => Ok(Timeframe::Day1),
            "1w" | "weekly" | "1week" => Ok(Timeframe::Week1),
            "1mo" | "monthly" => Ok(Timeframe::Month1),
            other => Err(ParseError::Timeframe(other.to_string())),
        }
    }
}

/// Symbol + timeframe pair; the unit of isolation for per-symbol state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolKey {
    pub symbol: String,
    pub timeframe: Timeframe,
}

impl SymbolKey {
    pub fn new(symbol: impl AsRef<str>, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.as_ref().trim().to_uppercase(),
            timeframe,
        }
    }
}

impl fmt::Display for SymbolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.symbol, self.timeframe)
    }
}

/// Qualitative label attached to an indicator or a dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalLabel {
    Bullish,
    Bearish,
    Neutral,
    Overbought,
    Oversold,
}

impl SignalLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalLabel::Bullish => "BULLISH",
            SignalLabel::Bearish => "BEARISH",
            SignalLabel::Neutral => "NEUTRAL",
            SignalLabel::Overbought => "OVERBOUGHT",
            SignalLabel::Oversold => "OVERSOLD",
        }
    }

    /// Directional vote: +1 bullish, -1 bearish, 0 otherwise.
    pub fn bias(&self) -> i32 {
        match self {
            SignalLabel::Bullish => 1,
            SignalLabel::Bearish => -1,
            _ => 0,
        }
    }
}

impl fmt::Display for SignalLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a value came from: the feed, or a neutral placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Reported,
    Defaulted,
}

/// A normalized scalar indicator with its label.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub value: f64,
    pub signal: SignalLabel,
    pub provenance: Provenance,
}

impl Reading {
    pub fn reported(value: f64, signal: SignalLabel) -> Self {
        Self {
            value,
            signal,
            provenance: Provenance::Reported,
        }
    }

    /// Neutral placeholder for an indicator the feed did not supply.
    pub fn neutral(value: f64) -> Self {
        Self {
            value,
            signal: SignalLabel::Neutral,
            provenance: Provenance::Defaulted,
        }
    }

    pub fn is_defaulted(&self) -> bool {
        self.provenance == Provenance::Defaulted
    }
}

/// MACD state. The numeric parts stay unknown unless reported.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacdReading {
    pub value: Option<f64>,
    pub histogram: Option<f64>,
    pub signal: SignalLabel,
    pub provenance: Provenance,
}

impl MacdReading {
    pub fn neutral() -> Self {
        Self {
            value: None,
            histogram: None,
            signal: SignalLabel::Neutral,
            provenance: Provenance::Defaulted,
        }
    }

    pub fn is_defaulted(&self) -> bool {
        self.provenance == Provenance::Defaulted
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BollingerBands {
    pub upper: Option<f64>,
    pub middle: Option<f64>,
    pub lower: Option<f64>,
}

impl BollingerBands {
    pub fn is_known(&self) -> bool {
        self.upper.is_some() && self.lower.is_some()
    }
}

/// Supply or demand zone, inclusive price range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceZone {
    pub low: f64,
    pub high: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicalIndicators {
    pub rsi: Reading,
    pub macd: MacdReading,
    pub bollinger: BollingerBands,
    pub support: Option<f64>,
    pub resistance: Option<f64>,
    pub supply_zones: Vec<PriceZone>,
    pub demand_zones: Vec<PriceZone>,
    pub atr: Option<f64>,
    pub trend: Option<SignalLabel>,
    /// Technical dimension score (0-100) as produced upstream
    pub score: Option<f64>,
}

impl Default for TechnicalIndicators {
    fn default() -> Self {
        Self {
            rsi: Reading::neutral(50.0),
            macd: MacdReading::neutral(),
            bollinger: BollingerBands::default(),
            support: None,
            resistance: None,
            supply_zones: Vec::new(),
            demand_zones: Vec::new(),
            atr: None,
            trend: None,
            score: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentMetrics {
    pub score: Option<f64>,
    pub fear_greed_index: Option<f64>,
    pub label: Option<SignalLabel>,
    pub breakdown: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnChainMetrics {
    pub score: Option<f64>,
    pub exchange_net_flow: Option<f64>,
    pub whale_activity: Option<f64>,
    pub active_addresses: Option<f64>,
    pub label: Option<SignalLabel>,
    pub breakdown: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskMetrics {
    pub score: Option<f64>,
    /// Realized volatility as a percentage of price
    pub volatility_pct: Option<f64>,
    pub max_drawdown_pct: Option<f64>,
    pub level: Option<String>,
}

/// Role a data source plays; drives per-dimension availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceRole {
    Market,
    Technical,
    Sentiment,
    OnChain,
    Risk,
    Context,
}

impl FromStr for SourceRole {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "market" => Ok(SourceRole::Market),
            "technical" => Ok(SourceRole::Technical),
            "sentiment" => Ok(SourceRole::Sentiment),
            "onchain" | "on_chain" | "on-chain" => Ok(SourceRole::OnChain),
            "risk" => Ok(SourceRole::Risk),
            "context" | "news" => Ok(SourceRole::Context),
            other => Err(ParseError::SourceRole(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceReport {
    pub successful: Vec<String>,
    pub failed: Vec<SourceFailure>,
}

/// Availability per dimension, as percentages (0-100).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQuality {
    pub overall: f64,
    pub market: f64,
    pub technical: f64,
    pub sentiment: f64,
    pub on_chain: f64,
    pub risk: f64,
    #[serde(default)]
    pub sources: SourceReport,
}

impl DataQuality {
    /// Same availability for every dimension, no source report.
    pub fn uniform(pct: f64) -> Self {
        Self {
            overall: pct,
            market: pct,
            technical: pct,
            sentiment: pct,
            on_chain: pct,
            risk: pct,
            sources: SourceReport::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub price: f64,
    pub is_live: bool,
    pub price_change_24h: Option<f64>,
    pub volume_24h: Option<f64>,
    pub technical: TechnicalIndicators,
    pub sentiment: SentimentMetrics,
    pub on_chain: OnChainMetrics,
    pub risk: RiskMetrics,
    pub data_quality: DataQuality,
    pub predictions: Option<serde_json::Value>,
    pub news_context: Vec<serde_json::Value>,
    pub last_updated: Option<DateTime<Utc>>,
    pub validated_at: DateTime<Utc>,
}

impl MarketSnapshot {
    /// Live snapshot at `price` with every secondary field defaulted and full
    /// reported quality. Callers fill in what they have.
    pub fn new(key: &SymbolKey, price: f64) -> Self {
        Self {
            symbol: key.symbol.clone(),
            timeframe: key.timeframe,
            price,
            is_live: true,
            price_change_24h: None,
            volume_24h: None,
            technical: TechnicalIndicators::default(),
            sentiment: SentimentMetrics::default(),
            on_chain: OnChainMetrics::default(),
            risk: RiskMetrics::default(),
            data_quality: DataQuality::uniform(100.0),
            predictions: None,
            news_context: Vec::new(),
            last_updated: None,
            validated_at: Utc::now(),
        }
    }

    pub fn key(&self) -> SymbolKey {
        SymbolKey::new(&self.symbol, self.timeframe)
    }

    /// Names of secondary fields that hold placeholders rather than readings.
    pub fn defaulted_fields(&self) -> Vec<&'static str> {
        let t = &self.technical;
        let checks = [
            ("rsi", t.rsi.is_defaulted()),
            ("macd", t.macd.is_defaulted()),
            ("bollingerBands", !t.bollinger.is_known()),
            ("support", t.support.is_none()),
            ("resistance", t.resistance.is_none()),
            ("atr", t.atr.is_none()),
            ("trend", t.trend.is_none()),
            ("technicalScore", t.score.is_none()),
            ("sentimentScore", self.sentiment.score.is_none()),
            ("onChainScore", self.on_chain.score.is_none()),
            ("riskScore", self.risk.score.is_none()),
        ];
        checks
            .iter()
            .filter(|(_, defaulted)| *defaulted)
            .map(|(name, _)| *name)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionType {
    Long,
    Short,
}

impl PositionType {
    /// +1 for long, -1 for short. Targets sit on the `sign` side of entry.
    pub fn sign(&self) -> i32 {
        match self {
            PositionType::Long => 1,
            PositionType::Short => -1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PositionType::Long => "LONG",
            PositionType::Short => "SHORT",
        }
    }
}

impl fmt::Display for PositionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PositionType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "long" | "buy" => Ok(PositionType::Long),
            "short" | "sell" => Ok(PositionType::Short),
            other => Err(ParseError::PositionType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TakeProfitTier {
    pub price: Decimal,
    /// Percentage of the position closed at this tier
    pub allocation: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TakeProfitLadder {
    pub tp1: TakeProfitTier,
    pub tp2: TakeProfitTier,
    pub tp3: TakeProfitTier,
}

impl TakeProfitLadder {
    /// Builds the ladder from three prices, nearest first, using the fixed split.
    pub fn from_prices(prices: [Decimal; 3]) -> Self {
        let [a1, a2, a3] = TAKE_PROFIT_ALLOCATIONS;
        Self {
            tp1: TakeProfitTier {
                price: prices[0],
                allocation: a1,
            },
            tp2: TakeProfitTier {
                price: prices[1],
                allocation: a2,
            },
            tp3: TakeProfitTier {
                price: prices[2],
                allocation: a3,
            },
        }
    }

    pub fn tiers(&self) -> [&TakeProfitTier; 3] {
        [&self.tp1, &self.tp2, &self.tp3]
    }

    pub fn prices(&self) -> [Decimal; 3] {
        [self.tp1.price, self.tp2.price, self.tp3.price]
    }

    pub fn total_allocation(&self) -> u32 {
        self.tiers().iter().map(|t| t.allocation as u32).sum()
    }
}

/// Reviewer edits carried by a MODIFY action. Unset fields keep the
/// original signal's value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalAdjustments {
    pub entry: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    /// Three take-profit prices, nearest first
    pub take_profits: Option<[Decimal; 3]>,
    pub account_balance: Option<Decimal>,
}

impl SignalAdjustments {
    pub fn is_empty(&self) -> bool {
        self.entry.is_none()
            && self.stop_loss.is_none()
            && self.take_profits.is_none()
            && self.account_balance.is_none()
    }
}

/// Per-dimension and overall confidence, each 0-100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confidence {
    pub overall: f64,
    pub technical: f64,
    pub sentiment: f64,
    pub on_chain: f64,
    pub risk: f64,
}

/// How much the data behind a signal can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityFlag {
    Sufficient,
    Degraded,
    Insufficient,
}

impl QualityFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityFlag::Sufficient => "SUFFICIENT",
            QualityFlag::Degraded => "DEGRADED",
            QualityFlag::Insufficient => "INSUFFICIENT",
        }
    }
}

/// Link from a modified signal back to the one it supersedes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lineage {
    pub parent_id: Uuid,
    pub root_id: Uuid,
    pub generation: u32,
}

impl Lineage {
    /// Lineage for a successor of `parent`.
    pub fn descend_from(parent: &TradeSignal) -> Self {
        match parent.lineage {
            Some(l) => Lineage {
                parent_id: parent.id,
                root_id: l.root_id,
                generation: l.generation + 1,
            },
            None => Lineage {
                parent_id: parent.id,
                root_id: parent.id,
                generation: 1,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeSignal {
    pub id: Uuid,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub position_type: PositionType,
    pub entry: Decimal,
    pub stop_loss: Decimal,
    pub take_profits: TakeProfitLadder,
    pub confidence: Confidence,
    pub risk_reward: f64,
    pub position_size: Decimal,
    pub max_loss: Decimal,
    pub data_quality: f64,
    pub quality_flag: QualityFlag,
    pub lineage: Option<Lineage>,
    pub created_at: DateTime<Utc>,
}

impl TradeSignal {
    pub fn key(&self) -> SymbolKey {
        SymbolKey::new(&self.symbol, self.timeframe)
    }

    pub fn risk_distance(&self) -> Decimal {
        (self.entry - self.stop_loss).abs()
    }

    /// Built from data below the quality bar; must be shown as such.
    pub fn is_flagged(&self) -> bool {
        self.quality_flag != QualityFlag::Sufficient
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalStatus {
    Generated,
    PendingReview,
    Approved,
    Rejected,
    Modified,
}

impl SignalStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SignalStatus::Approved | SignalStatus::Rejected | SignalStatus::Modified
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::Generated => "GENERATED",
            SignalStatus::PendingReview => "PENDING_REVIEW",
            SignalStatus::Approved => "APPROVED",
            SignalStatus::Rejected => "REJECTED",
            SignalStatus::Modified => "MODIFIED",
        }
    }
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DecisionOutcome {
    Approved,
    Rejected,
    Modified,
}

impl DecisionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionOutcome::Approved => "APPROVED",
            DecisionOutcome::Rejected => "REJECTED",
            DecisionOutcome::Modified => "MODIFIED",
        }
    }
}

/// Outcome of a human review. Written once per terminal transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalDecision {
    pub signal_id: Uuid,
    pub outcome: DecisionOutcome,
    pub reason: Option<String>,
    /// Set for MODIFIED: the signal that supersedes this one
    pub successor_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

/// Difference between two validated snapshots of the same symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeReport {
    pub price_changed: bool,
    pub price_delta: f64,
    pub price_delta_pct: f64,
    pub indicators_changed: Vec<String>,
    pub sentiment_changed: bool,
    pub on_chain_changed: bool,
    pub significant_changes: bool,
    pub detected_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_timeframe_parse() {
        assert_eq!("4h".parse::<Timeframe>().unwrap(), Timeframe::Hour4);
        assert_eq!("1M".parse::<Timeframe>().unwrap(), Timeframe::Month1);
        assert_eq!("1m".parse::<Timeframe>().unwrap(), Timeframe::Minute1);
        assert_eq!("DAILY".parse::<Timeframe>().unwrap(), Timeframe::Day1);
        assert!("2h".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_timeframe_serializes_short_form() {
        let json = serde_json::to_string(&Timeframe::Hour4).unwrap();
        assert_eq!(json, "\"4h\"");
    }

    #[test]
    fn test_symbol_key_normalizes() {
        let key = SymbolKey::new(" btcusdt ", Timeframe::Hour1);
        assert_eq!(key.symbol, "BTCUSDT");
        assert_eq!(key.to_string(), "BTCUSDT@1h");
    }

    #[test]
    fn test_ladder_allocations_sum_to_100() {
        let ladder = TakeProfitLadder::from_prices([dec!(101), dec!(102), dec!(104)]);
        assert_eq!(ladder.total_allocation(), 100);
        assert_eq!(ladder.tp1.allocation, 50);
        assert_eq!(ladder.tp3.allocation, 20);
    }

    #[test]
    fn test_lineage_descends() {
        let root_id = Uuid::new_v4();
        let parent = TradeSignal {
            id: Uuid::new_v4(),
            symbol: "BTCUSDT".to_string(),
            timeframe: Timeframe::Hour4,
            position_type: PositionType::Long,
            entry: dec!(100),
            stop_loss: dec!(98),
            take_profits: TakeProfitLadder::from_prices([dec!(103), dec!(105), dec!(108)]),
            confidence: Confidence {
                overall: 70.0,
                technical: 70.0,
                sentiment: 70.0,
                on_chain: 70.0,
                risk: 70.0,
            },
            risk_reward: 2.3,
            position_size: dec!(10),
            max_loss: dec!(20),
            data_quality: 100.0,
            quality_flag: QualityFlag::Sufficient,
            lineage: Some(Lineage {
                parent_id: root_id,
                root_id,
                generation: 1,
            }),
            created_at: Utc::now(),
        };

        let lineage = Lineage::descend_from(&parent);
        assert_eq!(lineage.parent_id, parent.id);
        assert_eq!(lineage.root_id, root_id);
        assert_eq!(lineage.generation, 2);
        assert_eq!(parent.risk_distance(), dec!(2));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!SignalStatus::Generated.is_terminal());
        assert!(!SignalStatus::PendingReview.is_terminal());
        assert!(SignalStatus::Approved.is_terminal());
        assert!(SignalStatus::Rejected.is_terminal());
        assert!(SignalStatus::Modified.is_terminal());
    }
}
