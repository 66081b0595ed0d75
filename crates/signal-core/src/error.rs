use thiserror::Error;

/// Reasons a raw payload is refused at the pipeline gate. Both are fatal:
/// no snapshot, and therefore no signal, exists afterwards.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing price data: neither currentPrice nor marketData.price is present")]
    MissingPriceData,

    #[error("Not live data: isLiveData is absent or false")]
    NotLiveData,

    #[error("Invalid price: {0} is not a positive number")]
    NonPositivePrice(f64),
}

/// Failure of a single upstream feed.
#[derive(Error, Debug, Clone)]
pub enum SourceError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

/// Failure of the persistence collaborator.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Unknown timeframe: {0}")]
    Timeframe(String),

    #[error("Unknown position type: {0}")]
    PositionType(String),

    #[error("Unknown source role: {0}")]
    SourceRole(String),
}
