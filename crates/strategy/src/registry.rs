use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, info};

use common::{Decision, DecisionRequest, Directive, Error, OrderSide, Result, SignalSource};

use crate::config::{RuleConfig, StrategyFileConfig};
use crate::Rule;

const DEFAULT_CONFIDENCE: u8 = 60;

/// Rule-based decision source. Rules are consulted in file order; the first
/// one that fires decides, otherwise the answer is HOLD.
pub struct RuleRegistry {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleRegistry {
    /// Build the registry from config, failing on unknown rule types.
    pub fn from_config(file_cfg: &StrategyFileConfig) -> Result<Self> {
        let mut rules: Vec<Box<dyn Rule>> = Vec::new();

        for cfg in &file_cfg.rules {
            let rule = build_rule(cfg)?;
            info!(name = %rule.name(), symbol = %rule.symbol(), "Registered rule");
            rules.push(rule);
        }

        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Evaluate all rules for the request's symbol.
    pub fn evaluate(&self, request: &DecisionRequest) -> Decision {
        self.rules
            .iter()
            .filter(|r| r.applies_to(&request.symbol))
            .find_map(|r| {
                let decision = r.evaluate(request)?;
                debug!(rule = %r.name(), symbol = %request.symbol, signal = %decision.directive, "Rule fired");
                Some(decision)
            })
            .unwrap_or_else(|| Decision::hold("no rule fired"))
    }
}

#[async_trait]
impl SignalSource for RuleRegistry {
    async fn decide(&self, request: &DecisionRequest) -> Result<Decision> {
        Ok(self.evaluate(request))
    }
}

// ─── Rule builders ────────────────────────────────────────────────────────────

fn build_rule(cfg: &RuleConfig) -> Result<Box<dyn Rule>> {
    let confidence = param_u8(&cfg.params, "confidence", DEFAULT_CONFIDENCE);
    match cfg.rule_type.as_str() {
        "rsi" => {
            let overbought = param_f64(&cfg.params, "overbought", 70.0);
            let oversold = param_f64(&cfg.params, "oversold", 30.0);
            if oversold >= overbought {
                return Err(Error::Config(format!(
                    "rule '{}': oversold ({oversold}) must be below overbought ({overbought})",
                    cfg.name
                )));
            }
            Ok(Box::new(RsiRule {
                cfg: cfg.clone(),
                overbought,
                oversold,
                confidence,
            }))
        }
        "macd" => Ok(Box::new(MacdRule {
            cfg: cfg.clone(),
            confidence,
        })),
        "ema_cross" => Ok(Box::new(EmaCrossRule {
            cfg: cfg.clone(),
            min_spread_pct: param_f64(&cfg.params, "min_spread_pct", 0.0),
            confidence,
        })),
        other => Err(Error::Config(format!(
            "rule '{}': unknown type '{other}'",
            cfg.name
        ))),
    }
}

fn param_f64(params: &HashMap<String, toml::Value>, key: &str, default: f64) -> f64 {
    params
        .get(key)
        .and_then(|v| v.as_float().or_else(|| v.as_integer().map(|i| i as f64)))
        .unwrap_or(default)
}

fn param_u8(params: &HashMap<String, toml::Value>, key: &str, default: u8) -> u8 {
    params
        .get(key)
        .and_then(|v| v.as_integer())
        .map(|v| v.clamp(0, 100) as u8)
        .unwrap_or(default)
}

fn open(side: OrderSide, confidence: u8, reason: String) -> Decision {
    Decision {
        directive: Directive::Open {
            side,
            quadrant: None,
        },
        confidence,
        take_profit: None,
        reason,
    }
}

// ─── Concrete rule types ──────────────────────────────────────────────────────

/// Buys when RSI is at or below `oversold`, sells at or above `overbought`.
struct RsiRule {
    cfg: RuleConfig,
    overbought: f64,
    oversold: f64,
    confidence: u8,
}

impl Rule for RsiRule {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    fn symbol(&self) -> &str {
        &self.cfg.symbol
    }

    fn evaluate(&self, request: &DecisionRequest) -> Option<Decision> {
        let rsi = request.snapshot.rsi;
        if rsi <= self.oversold {
            Some(open(
                OrderSide::Buy,
                self.confidence,
                format!("{}: RSI {rsi:.2} <= oversold {}", self.cfg.name, self.oversold),
            ))
        } else if rsi >= self.overbought {
            Some(open(
                OrderSide::Sell,
                self.confidence,
                format!("{}: RSI {rsi:.2} >= overbought {}", self.cfg.name, self.overbought),
            ))
        } else {
            None
        }
    }
}

/// Fires when the MACD histogram changes sign on the latest bar, i.e. the
/// MACD line crosses its signal line.
struct MacdRule {
    cfg: RuleConfig,
    confidence: u8,
}

impl Rule for MacdRule {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    fn symbol(&self) -> &str {
        &self.cfg.symbol
    }

    fn evaluate(&self, request: &DecisionRequest) -> Option<Decision> {
        let prev = request.snapshot.prev_macd_histogram?;
        let curr = request.snapshot.macd_histogram;

        if prev <= 0.0 && curr > 0.0 {
            Some(open(
                OrderSide::Buy,
                self.confidence,
                format!("{}: MACD crossed above signal", self.cfg.name),
            ))
        } else if prev >= 0.0 && curr < 0.0 {
            Some(open(
                OrderSide::Sell,
                self.confidence,
                format!("{}: MACD crossed below signal", self.cfg.name),
            ))
        } else {
            None
        }
    }
}

/// Follows the side of the short EMA relative to the long EMA, ignoring
/// spreads smaller than `min_spread_pct` percent of the long EMA.
struct EmaCrossRule {
    cfg: RuleConfig,
    min_spread_pct: f64,
    confidence: u8,
}

impl Rule for EmaCrossRule {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    fn symbol(&self) -> &str {
        &self.cfg.symbol
    }

    fn evaluate(&self, request: &DecisionRequest) -> Option<Decision> {
        let snap = &request.snapshot;
        if snap.ema_long == 0.0 {
            return None;
        }
        let spread_pct = (snap.ema_short - snap.ema_long) / snap.ema_long * 100.0;
        if spread_pct.abs() <= self.min_spread_pct {
            return None;
        }

        let side = if spread_pct > 0.0 {
            OrderSide::Buy
        } else {
            OrderSide::Sell
        };
        Some(open(
            side,
            self.confidence,
            format!("{}: EMA spread {spread_pct:.3}%", self.cfg.name),
        ))
    }
}
