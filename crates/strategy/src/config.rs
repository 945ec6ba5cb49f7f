use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use common::{Error, Result};

use crate::indicators::{MacdParams, DEFAULT_RSI_PERIOD};

/// Top-level strategy config file (TOML).
///
/// Example `config/strategies.toml`:
/// ```toml
/// [indicators]
/// ema_short = 9
/// ema_long = 21
/// rsi_period = 14
///
/// [[rule]]
/// type = "rsi"
/// name = "BTC RSI 14"
/// symbol = "BTCUSDT"
///
/// [rule.params]
/// overbought = 70.0
/// oversold = 30.0
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StrategyFileConfig {
    #[serde(default)]
    pub indicators: IndicatorConfig,
    #[serde(rename = "rule", default)]
    pub rules: Vec<RuleConfig>,
}

/// Periods used when building an indicator snapshot.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub ema_short: usize,
    pub ema_long: usize,
    pub rsi_period: usize,
    pub macd: MacdParams,
    /// Number of trailing closes handed to the decision source.
    pub price_tail: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            ema_short: 9,
            ema_long: 21,
            rsi_period: DEFAULT_RSI_PERIOD,
            macd: MacdParams::default(),
            price_tail: 70,
        }
    }
}

impl IndicatorConfig {
    /// Shortest series every configured indicator can be computed on.
    pub fn min_candles(&self) -> usize {
        [
            self.ema_short,
            self.ema_long,
            self.rsi_period + 1,
            self.macd.min_len(),
        ]
        .into_iter()
        .max()
        .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleConfig {
    /// Rule type identifier: "rsi", "macd" or "ema_cross".
    #[serde(rename = "type")]
    pub rule_type: String,
    /// Human-readable name shown in logs and decision reasons.
    pub name: String,
    /// Symbol the rule applies to, e.g. "BTCUSDT"; "*" matches every symbol.
    pub symbol: String,
    /// Rule-specific parameters.
    #[serde(default)]
    pub params: HashMap<String, toml::Value>,
}

impl StrategyFileConfig {
    /// Load from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read strategy config at '{path}': {e}")))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(content)?;
        cfg.indicators.macd.validate()?;
        if cfg.indicators.ema_short == 0 || cfg.indicators.ema_long == 0 || cfg.indicators.rsi_period == 0 {
            return Err(Error::Config("indicator periods must be at least 1".into()));
        }
        Ok(cfg)
    }
}
