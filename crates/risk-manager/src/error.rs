use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskError {
    #[error("Account balance must be positive, got {0}")]
    InvalidAccountBalance(Decimal),

    #[error("Risk fraction must be in (0, 1], got {0}")]
    InvalidRiskFraction(Decimal),

    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid take-profit target: {0}")]
    InvalidTarget(String),

    #[error("Invalid risk configuration: {0}")]
    InvalidConfig(String),

    #[error("Arithmetic overflow computing {0}")]
    Overflow(String),
}
