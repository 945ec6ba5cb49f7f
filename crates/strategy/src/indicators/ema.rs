use common::{Error, Result};

/// Exponential Moving Average.
///
/// Seeded with the SMA of the first `period` values at index `period - 1`,
/// then `ema[i] = value[i] * k + ema[i-1] * (1 - k)` with `k = 2 / (period + 1)`.
pub fn ema(values: &[f64], period: usize) -> Result<Vec<Option<f64>>> {
    if period == 0 {
        return Err(Error::InvalidPeriod {
            indicator: "EMA",
            reason: "period must be at least 1".into(),
        });
    }
    if values.len() < period {
        return Err(Error::InsufficientData {
            indicator: "EMA",
            needed: period,
            got: values.len(),
        });
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut out = vec![None; values.len()];

    let mut ema_val = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(ema_val);

    for (i, &value) in values.iter().enumerate().skip(period) {
        ema_val = value * k + ema_val * (1.0 - k);
        out[i] = Some(ema_val);
    }

    Ok(out)
}
