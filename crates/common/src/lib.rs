pub mod config;
pub mod error;
pub mod kline;
pub mod source;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use source::{CandleSource, LedgerSink, SignalSource};
pub use types::*;
