//! Series indicators over close prices (oldest first).
//!
//! Every function returns a vector aligned with its input: index `i` of the
//! output belongs to close `i`, and `None` marks the warm-up window.

pub mod ema;
pub mod macd;
pub mod rsi;

pub use ema::ema;
pub use macd::{macd, macd_with, Macd, MacdParams};
pub use rsi::{rsi, DEFAULT_RSI_PERIOD};

/// Last computed value of an aligned indicator series.
pub fn latest(series: &[Option<f64>]) -> Option<f64> {
    series.last().copied().flatten()
}
