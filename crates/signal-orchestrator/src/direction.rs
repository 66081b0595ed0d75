use signal_core::{MarketSnapshot, PositionType};

/// Majority vote of trend, MACD and sentiment labels. Ties and silence go LONG.
pub fn infer_direction(snapshot: &MarketSnapshot) -> PositionType {
    let votes: i32 = [
        snapshot.technical.trend,
        Some(snapshot.technical.macd.signal),
        snapshot.sentiment.label,
    ]
    .iter()
    .flatten()
    .map(|label| label.bias())
    .sum();

    if votes < 0 {
        PositionType::Short
    } else {
        PositionType::Long
    }
}
