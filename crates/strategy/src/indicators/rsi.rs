use common::{Error, Result};

pub const DEFAULT_RSI_PERIOD: usize = 14;

/// RSI (Relative Strength Index).
///
/// Uses Wilder's smoothed moving average (same as TradingView / standard RSI).
/// The first value sits at index `period`, built from the first `period`
/// price changes. A zero average loss yields 100.
pub fn rsi(closes: &[f64], period: usize) -> Result<Vec<Option<f64>>> {
    if period == 0 {
        return Err(Error::InvalidPeriod {
            indicator: "RSI",
            reason: "period must be at least 1".into(),
        });
    }
    if closes.len() < period + 1 {
        return Err(Error::InsufficientData {
            indicator: "RSI",
            needed: period + 1,
            got: closes.len(),
        });
    }

    let mut out = vec![None; closes.len()];
    let p = period as f64;

    // First average gain/loss over the initial `period` changes
    let (mut gains, mut losses) = (0.0, 0.0);
    for w in closes[..=period].windows(2) {
        let change = w[1] - w[0];
        if change > 0.0 {
            gains += change;
        } else {
            losses -= change;
        }
    }
    let mut avg_gain = gains / p;
    let mut avg_loss = losses / p;
    out[period] = Some(strength(avg_gain, avg_loss));

    // Wilder smoothing over remaining changes
    for i in period + 1..closes.len() {
        let change = closes[i] - closes[i - 1];
        let gain = if change > 0.0 { change } else { 0.0 };
        let loss = if change < 0.0 { -change } else { 0.0 };
        avg_gain = (avg_gain * (p - 1.0) + gain) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss) / p;
        out[i] = Some(strength(avg_gain, avg_loss));
    }

    Ok(out)
}

fn strength(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}
