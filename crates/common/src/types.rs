use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One time-bucketed OHLCV summary. `timestamp` is the bucket open time in
/// milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(Error::InvalidCandle {
                    timestamp: self.timestamp,
                    reason: format!("{name} is not finite ({value})"),
                });
            }
        }
        if self.volume < 0.0 {
            return Err(Error::InvalidCandle {
                timestamp: self.timestamp,
                reason: format!("negative volume ({})", self.volume),
            });
        }
        Ok(())
    }

    pub fn time(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

/// Candles ordered strictly ascending by timestamp.
///
/// Duplicate timestamps are resolved last-write-wins: a later candle with the
/// same timestamp replaces the earlier one wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    /// Normalize raw candles: validate, sort ascending, deduplicate.
    pub fn new(mut candles: Vec<Candle>) -> Result<Self> {
        for candle in &candles {
            candle.validate()?;
        }

        // Stable sort keeps arrival order among equal timestamps, so the
        // last one in the input is the one that survives.
        candles.sort_by_key(|c| c.timestamp);

        let mut normalized: Vec<Candle> = Vec::with_capacity(candles.len());
        for candle in candles {
            match normalized.last_mut() {
                Some(last) if last.timestamp == candle.timestamp => *last = candle,
                _ => normalized.push(candle),
            }
        }

        Ok(Self { candles: normalized })
    }

    /// Insert or replace the candle with the same timestamp.
    pub fn upsert(&mut self, candle: Candle) -> Result<()> {
        candle.validate()?;
        match self
            .candles
            .binary_search_by_key(&candle.timestamp, |c| c.timestamp)
        {
            Ok(idx) => self.candles[idx] = candle,
            Err(idx) => self.candles.insert(idx, candle),
        }
        Ok(())
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn first(&self) -> Option<&Candle> {
        self.candles.first()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// The last `n` candles (or all of them if the series is shorter).
    pub fn tail(&self, n: usize) -> &[Candle] {
        &self.candles[self.candles.len().saturating_sub(n)..]
    }
}

/// Side of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// The discrete input of the trade state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Buy => write!(f, "BUY"),
            Signal::Sell => write!(f, "SELL"),
            Signal::Hold => write!(f, "HOLD"),
        }
    }
}

impl From<OrderSide> for Signal {
    fn from(side: OrderSide) -> Self {
        match side {
            OrderSide::Buy => Signal::Buy,
            OrderSide::Sell => Signal::Sell,
        }
    }
}

impl FromStr for Signal {
    type Err = Error;

    /// Accepts plain `BUY`/`SELL`/`HOLD` as well as any directive label.
    fn from_str(s: &str) -> Result<Self> {
        s.parse::<Directive>().map(Signal::from)
    }
}

/// Richer signal vocabulary: explicit open/close labels with an optional
/// quadrant tag (`OPEN_BUY`, `CLOSE_SELL_3`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Directive {
    Hold,
    Open { side: OrderSide, quadrant: Option<u8> },
    Close { side: OrderSide, quadrant: Option<u8> },
}

impl Directive {
    pub const MAX_QUADRANT: u8 = 4;
}

impl From<Directive> for Signal {
    /// Opening a long or closing a short buys; opening a short or closing a
    /// long sells.
    fn from(directive: Directive) -> Self {
        match directive {
            Directive::Hold => Signal::Hold,
            Directive::Open { side, .. } => side.into(),
            Directive::Close {
                side: OrderSide::Buy,
                ..
            } => Signal::Sell,
            Directive::Close {
                side: OrderSide::Sell,
                ..
            } => Signal::Buy,
        }
    }
}

impl From<Signal> for Directive {
    fn from(signal: Signal) -> Self {
        match signal {
            Signal::Hold => Directive::Hold,
            Signal::Buy => Directive::Open {
                side: OrderSide::Buy,
                quadrant: None,
            },
            Signal::Sell => Directive::Open {
                side: OrderSide::Sell,
                quadrant: None,
            },
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (action, side, quadrant) = match self {
            Directive::Hold => return write!(f, "HOLD"),
            Directive::Open { side, quadrant } => ("OPEN", side, quadrant),
            Directive::Close { side, quadrant } => ("CLOSE", side, quadrant),
        };
        match quadrant {
            Some(q) => write!(f, "{action}_{side}_{q}"),
            None => write!(f, "{action}_{side}"),
        }
    }
}

impl FromStr for Directive {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let label = s.trim().to_ascii_uppercase();
        let unknown = || Error::Source(format!("unknown signal label '{s}'"));

        match label.as_str() {
            "HOLD" => return Ok(Directive::Hold),
            "BUY" => return Ok(Signal::Buy.into()),
            "SELL" => return Ok(Signal::Sell.into()),
            _ => {}
        }

        let mut parts = label.split('_');
        let action = parts.next().ok_or_else(unknown)?;
        let side = match parts.next() {
            Some("BUY") => OrderSide::Buy,
            Some("SELL") => OrderSide::Sell,
            _ => return Err(unknown()),
        };
        let quadrant = match parts.next() {
            None => None,
            Some(q) => match q.parse::<u8>() {
                Ok(n) if (1..=Self::MAX_QUADRANT).contains(&n) => Some(n),
                _ => return Err(unknown()),
            },
        };
        if parts.next().is_some() {
            return Err(unknown());
        }

        match action {
            "OPEN" => Ok(Directive::Open { side, quadrant }),
            "CLOSE" => Ok(Directive::Close { side, quadrant }),
            _ => Err(unknown()),
        }
    }
}

impl TryFrom<String> for Directive {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Directive> for String {
    fn from(value: Directive) -> Self {
        value.to_string()
    }
}

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSide::Long => write!(f, "LONG"),
            PositionSide::Short => write!(f, "SHORT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    Open,
    Closed,
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionStatus::Open => write!(f, "OPEN"),
            PositionStatus::Closed => write!(f, "CLOSED"),
        }
    }
}

/// What a ledger entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// A new order number was opened.
    Open,
    /// The current order number was closed.
    Close,
    /// The signal was logged against the current order number; no transition.
    Mark,
}

/// One immutable record of the order log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub symbol: String,
    pub order_number: u64,
    pub signal: Signal,
    pub status: PositionStatus,
    pub kind: EntryKind,
    pub timestamp: DateTime<Utc>,
}

/// Latest indicator values for one symbol, as handed to the decision source
/// and to notification subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub ema_short: f64,
    pub ema_long: f64,
    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_histogram: f64,
    /// Histogram of the bar before the latest one; `None` on a one-bar tail.
    pub prev_macd_histogram: Option<f64>,
    pub last_close: f64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: i64,
    pub close: f64,
}

/// Everything the decision source is given for one symbol on one tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub symbol: String,
    pub interval: String,
    pub snapshot: IndicatorSnapshot,
    pub prices: Vec<PricePoint>,
}

/// The decision source's answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    #[serde(rename = "signal")]
    pub directive: Directive,
    /// 0–100.
    #[serde(deserialize_with = "confidence_percent")]
    pub confidence: u8,
    #[serde(rename = "TP", default, skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<f64>,
    pub reason: String,
}

/// Highest accepted decision confidence.
pub const MAX_CONFIDENCE: u8 = 100;

fn confidence_percent<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = u8::deserialize(deserializer)?;
    if value > MAX_CONFIDENCE {
        return Err(serde::de::Error::custom(format!(
            "confidence {value} is outside 0..={MAX_CONFIDENCE}"
        )));
    }
    Ok(value)
}

impl Decision {
    pub fn hold(reason: impl Into<String>) -> Self {
        Self {
            directive: Directive::Hold,
            confidence: 0,
            take_profit: None,
            reason: reason.into(),
        }
    }

    pub fn signal(&self) -> Signal {
        self.directive.into()
    }
}

/// Pushed to presentation subscribers after each symbol evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub symbol: String,
    pub interval: String,
    pub snapshot: IndicatorSnapshot,
    pub decision: Decision,
    pub entries: Vec<LedgerEntry>,
    pub at: DateTime<Utc>,
}

/// Current state of the evaluation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    #[default]
    Stopped,
    Running,
    Paused,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Stopped => write!(f, "stopped"),
            EngineState::Running => write!(f, "running"),
            EngineState::Paused => write!(f, "paused"),
        }
    }
}

/// Commands sent to the engine via the command channel.
#[derive(Debug, Clone)]
pub enum EngineCommand {
    Start,
    Stop,
    Pause,
    Resume,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(timestamp: i64, close: f64) -> Candle {
        Candle {
            timestamp,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn series_sorts_and_keeps_last_duplicate() {
        let series =
            CandleSeries::new(vec![candle(3, 30.0), candle(1, 10.0), candle(3, 31.0), candle(2, 20.0)])
                .unwrap();
        let stamps: Vec<i64> = series.candles().iter().map(|c| c.timestamp).collect();
        assert_eq!(stamps, vec![1, 2, 3]);
        assert_eq!(series.closes(), vec![10.0, 20.0, 31.0]);
    }

    #[test]
    fn upsert_replaces_and_inserts_in_order() {
        let mut series = CandleSeries::new(vec![candle(1, 10.0), candle(3, 30.0)]).unwrap();
        series.upsert(candle(2, 20.0)).unwrap();
        series.upsert(candle(3, 33.0)).unwrap();
        assert_eq!(series.closes(), vec![10.0, 20.0, 33.0]);
    }

    #[test]
    fn non_finite_candle_is_rejected() {
        let err = CandleSeries::new(vec![candle(1, f64::NAN)]).unwrap_err();
        assert!(matches!(err, Error::InvalidCandle { timestamp: 1, .. }));
        assert!(err.is_input_error());
    }

    #[test]
    fn tail_is_clamped_to_series_length() {
        let series = CandleSeries::new(vec![candle(1, 1.0), candle(2, 2.0)]).unwrap();
        assert_eq!(series.tail(5).len(), 2);
        assert_eq!(series.tail(1)[0].close, 2.0);
    }

    #[test]
    fn directive_labels_round_trip_through_display() {
        for label in ["HOLD", "OPEN_BUY", "CLOSE_SELL", "OPEN_SELL_2", "CLOSE_BUY_4"] {
            let directive: Directive = label.parse().unwrap();
            assert_eq!(directive.to_string(), label);
        }
    }

    #[test]
    fn directive_maps_onto_state_machine_signal() {
        assert_eq!(Signal::from("OPEN_BUY_1".parse::<Directive>().unwrap()), Signal::Buy);
        assert_eq!(Signal::from("CLOSE_SELL".parse::<Directive>().unwrap()), Signal::Buy);
        assert_eq!(Signal::from("OPEN_SELL".parse::<Directive>().unwrap()), Signal::Sell);
        assert_eq!(Signal::from("CLOSE_BUY_3".parse::<Directive>().unwrap()), Signal::Sell);
        assert_eq!("hold".parse::<Signal>().unwrap(), Signal::Hold);
    }

    #[test]
    fn unknown_labels_are_rejected() {
        for label in ["", "BUY_NOW", "OPEN_BUY_5", "OPEN_BUY_1_2", "SHORT"] {
            assert!(label.parse::<Directive>().is_err(), "accepted '{label}'");
        }
    }

    #[test]
    fn decision_deserializes_from_decider_json() {
        let json = r#"{"signal":"OPEN_BUY","confidence":72,"TP":101.5,"reason":"RSI oversold"}"#;
        let decision: Decision = serde_json::from_str(json).unwrap();
        assert_eq!(decision.signal(), Signal::Buy);
        assert_eq!(decision.confidence, 72);
        assert_eq!(decision.take_profit, Some(101.5));
    }

    #[test]
    fn decision_confidence_above_100_is_rejected() {
        let json = r#"{"signal":"HOLD","confidence":200,"reason":"sure"}"#;
        let err = serde_json::from_str::<Decision>(json).unwrap_err();
        assert!(err.to_string().contains("confidence 200"));

        let json = r#"{"signal":"HOLD","confidence":100,"reason":"sure"}"#;
        assert_eq!(serde_json::from_str::<Decision>(json).unwrap().confidence, 100);
    }
}
