use common::{
    CandleSeries, DecisionRequest, Error, IndicatorSnapshot, PricePoint, Result,
};

use crate::config::IndicatorConfig;
use crate::indicators::{ema, latest, macd_with, rsi};

/// Compute the latest indicator values for a normalized series.
///
/// Fails with the first indicator's input error when the series is shorter
/// than `cfg.min_candles()`.
pub fn compute_snapshot(series: &CandleSeries, cfg: &IndicatorConfig) -> Result<IndicatorSnapshot> {
    let last = series.last().ok_or(Error::EmptySeries)?;
    let closes = series.closes();

    let ema_short = last_value("EMA", &ema(&closes, cfg.ema_short)?)?;
    let ema_long = last_value("EMA", &ema(&closes, cfg.ema_long)?)?;
    let rsi_value = last_value("RSI", &rsi(&closes, cfg.rsi_period)?)?;
    let macd = macd_with(&closes, cfg.macd)?;

    let n = closes.len();
    Ok(IndicatorSnapshot {
        ema_short,
        ema_long,
        rsi: rsi_value,
        macd: macd.macd_line[n - 1],
        macd_signal: last_value("MACD", &macd.signal_line)?,
        macd_histogram: macd.histogram[n - 1],
        prev_macd_histogram: n
            .checked_sub(2)
            .filter(|&i| macd.is_warm(i))
            .map(|i| macd.histogram[i]),
        last_close: last.close,
        timestamp: last.timestamp,
    })
}

/// Assemble what the decision source sees for one symbol.
pub fn decision_request(
    symbol: &str,
    interval: &str,
    series: &CandleSeries,
    snapshot: IndicatorSnapshot,
    tail: usize,
) -> DecisionRequest {
    DecisionRequest {
        symbol: symbol.to_string(),
        interval: interval.to_string(),
        snapshot,
        prices: series
            .tail(tail)
            .iter()
            .map(|c| PricePoint {
                timestamp: c.timestamp,
                close: c.close,
            })
            .collect(),
    }
}

fn last_value(indicator: &'static str, series: &[Option<f64>]) -> Result<f64> {
    latest(series).ok_or(Error::InsufficientData {
        indicator,
        needed: series.len() + 1,
        got: series.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Candle;

    fn series(closes: &[f64]) -> CandleSeries {
        CandleSeries::new(
            closes
                .iter()
                .enumerate()
                .map(|(i, &close)| Candle {
                    timestamp: 1_700_000_000_000 + i as i64 * 300_000,
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 1.0,
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn snapshot_uses_latest_values() {
        let closes: Vec<f64> = (0..70).map(|i| 100.0 + (i as f64 * 0.3).sin() * 5.0).collect();
        let s = series(&closes);
        let cfg = IndicatorConfig::default();
        let snap = compute_snapshot(&s, &cfg).unwrap();

        assert_eq!(snap.last_close, *closes.last().unwrap());
        assert_eq!(snap.ema_short, ema(&closes, 9).unwrap()[69].unwrap());
        assert_eq!(snap.rsi, rsi(&closes, 14).unwrap()[69].unwrap());
        assert_eq!(snap.timestamp, s.last().unwrap().timestamp);
        assert!(snap.prev_macd_histogram.is_some());
    }

    #[test]
    fn previous_histogram_is_warm_at_minimum_length() {
        let cfg = IndicatorConfig::default();
        let closes: Vec<f64> = (0..cfg.min_candles()).map(|i| 50.0 + i as f64).collect();
        let snap = compute_snapshot(&series(&closes), &cfg).unwrap();

        let full = macd_with(&closes, cfg.macd).unwrap();
        assert_eq!(snap.prev_macd_histogram, Some(full.histogram[closes.len() - 2]));
    }

    #[test]
    fn snapshot_fails_fast_on_short_series() {
        let s = series(&[1.0; 20]);
        let err = compute_snapshot(&s, &IndicatorConfig::default()).unwrap_err();
        assert!(matches!(err, Error::InsufficientData { .. }));
    }

    #[test]
    fn snapshot_of_empty_series_is_an_error() {
        let err = compute_snapshot(&CandleSeries::default(), &IndicatorConfig::default()).unwrap_err();
        assert!(matches!(err, Error::EmptySeries));
    }

    #[test]
    fn recomputation_is_bit_identical() {
        let closes: Vec<f64> = (0..50).map(|i| 50.0 + (i % 7) as f64 * 1.25).collect();
        let s = series(&closes);
        let cfg = IndicatorConfig::default();
        assert_eq!(compute_snapshot(&s, &cfg).unwrap(), compute_snapshot(&s, &cfg).unwrap());
    }

    #[test]
    fn decision_request_carries_close_tail() {
        let closes: Vec<f64> = (0..40).map(|i| i as f64 + 1.0).collect();
        let s = series(&closes);
        let snap = compute_snapshot(&s, &IndicatorConfig::default()).unwrap();
        let req = decision_request("BTCUSDT", "5m", &s, snap, 10);
        assert_eq!(req.prices.len(), 10);
        assert_eq!(req.prices[9].close, 40.0);
        assert_eq!(req.prices[0].close, 31.0);
    }
}
