use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Insufficient data for {indicator}: need {needed} values, got {got}")]
    InsufficientData {
        indicator: &'static str,
        needed: usize,
        got: usize,
    },

    #[error("Invalid period for {indicator}: {reason}")]
    InvalidPeriod {
        indicator: &'static str,
        reason: String,
    },

    #[error("Price series is empty")]
    EmptySeries,

    #[error("Invalid candle at {timestamp}: {reason}")]
    InvalidCandle { timestamp: i64, reason: String },

    #[error("Invalid price {price} at index {index}")]
    InvalidPrice { index: usize, price: f64 },

    #[error("Investment amount must be positive and finite, got {0}")]
    InvalidInvestment(f64),

    #[error("Ledger inconsistency for {symbol}: {reason}")]
    Ledger { symbol: String, reason: String },

    #[error("Collaborator error: {0}")]
    Source(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Input errors are caller mistakes; they abort the current evaluation only.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Error::InsufficientData { .. }
                | Error::InvalidPeriod { .. }
                | Error::EmptySeries
                | Error::InvalidCandle { .. }
                | Error::InvalidPrice { .. }
                | Error::InvalidInvestment(_)
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
