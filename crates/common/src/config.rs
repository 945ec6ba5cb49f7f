use std::collections::HashSet;
use std::time::Duration;

use crate::{Error, Result};

/// Runtime configuration loaded from environment variables at startup.
/// Every variable is optional; unparsable values are a configuration error.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    // Watchlist
    pub symbols: Vec<String>,
    pub interval: String,
    pub candle_limit: usize,

    // Scheduling
    pub tick_interval: Duration,

    // Hindsight analysis
    pub investment_amount: f64,
    pub history_dir: String,

    // Strategy config file path
    pub strategy_config_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            symbols: vec!["BTCUSDT".to_string()],
            interval: "5m".to_string(),
            candle_limit: 70,
            tick_interval: Duration::from_secs(300),
            investment_amount: 100.0,
            history_dir: "history".to_string(),
            strategy_config_path: "config/strategies.toml".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment. Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let symbols = match lookup("CANDLEBOT_SYMBOLS") {
            Some(raw) => {
                let mut seen = HashSet::new();
                let symbols: Vec<String> = raw
                    .split(',')
                    .map(|s| s.trim().to_uppercase())
                    .filter(|s| !s.is_empty() && seen.insert(s.clone()))
                    .collect();
                if symbols.is_empty() {
                    return Err(Error::Config("CANDLEBOT_SYMBOLS is empty".into()));
                }
                symbols
            }
            None => defaults.symbols,
        };

        let candle_limit: usize =
            parse_var(&lookup, "CANDLEBOT_CANDLE_LIMIT")?.unwrap_or(defaults.candle_limit);
        if candle_limit == 0 {
            return Err(Error::Config("CANDLEBOT_CANDLE_LIMIT must be positive".into()));
        }

        let tick_interval = match parse_var::<u64, _>(&lookup, "CANDLEBOT_TICK_SECS")? {
            Some(0) => return Err(Error::Config("CANDLEBOT_TICK_SECS must be positive".into())),
            Some(secs) => Duration::from_secs(secs),
            None => defaults.tick_interval,
        };

        let investment_amount: f64 =
            parse_var(&lookup, "CANDLEBOT_INVESTMENT")?.unwrap_or(defaults.investment_amount);
        if !(investment_amount.is_finite() && investment_amount > 0.0) {
            return Err(Error::Config(format!(
                "CANDLEBOT_INVESTMENT must be positive, got {investment_amount}"
            )));
        }

        Ok(Config {
            symbols,
            interval: lookup("CANDLEBOT_INTERVAL").unwrap_or(defaults.interval),
            candle_limit,
            tick_interval,
            investment_amount,
            history_dir: lookup("CANDLEBOT_HISTORY_DIR").unwrap_or(defaults.history_dir),
            strategy_config_path: lookup("CANDLEBOT_STRATEGY_CONFIG")
                .unwrap_or(defaults.strategy_config_path),
        })
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| Error::Config(format!("{key}='{raw}': {e}")))
        })
        .transpose()
}
