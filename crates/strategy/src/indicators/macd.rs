use serde::{Deserialize, Serialize};

use common::{Error, Result};

use super::ema;

/// MACD periods. Defaults to the classic 12/26/9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacdParams {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

impl Default for MacdParams {
    fn default() -> Self {
        Self {
            fast: 12,
            slow: 26,
            signal: 9,
        }
    }
}

impl MacdParams {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Result<Self> {
        let params = Self { fast, slow, signal };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fast == 0 || self.signal == 0 {
            return Err(Error::InvalidPeriod {
                indicator: "MACD",
                reason: "fast and signal periods must be at least 1".into(),
            });
        }
        if self.fast >= self.slow {
            return Err(Error::InvalidPeriod {
                indicator: "MACD",
                reason: format!(
                    "fast period ({}) must be less than slow period ({})",
                    self.fast, self.slow
                ),
            });
        }
        Ok(())
    }

    /// Shortest input that yields a non-degenerate signal line.
    pub fn min_len(&self) -> usize {
        self.slow + self.signal
    }

    /// First index whose signal line is seeded entirely from real MACD values.
    pub fn warm_up(&self) -> usize {
        self.slow + self.signal - 2
    }
}

/// MACD (Moving Average Convergence/Divergence) output, aligned with the
/// input closes.
///
/// While the slow EMA is still warming up its value is taken as 0, so the
/// MACD line is defined at every index. Entries before `warm_up` are built
/// on that substitution and should not drive decisions.
#[derive(Debug, Clone, PartialEq)]
pub struct Macd {
    pub macd_line: Vec<f64>,
    pub signal_line: Vec<Option<f64>>,
    pub histogram: Vec<f64>,
    pub warm_up: usize,
}

impl Macd {
    pub fn is_warm(&self, index: usize) -> bool {
        index >= self.warm_up
    }
}

/// MACD with the default 12/26/9 periods.
pub fn macd(closes: &[f64]) -> Result<Macd> {
    macd_with(closes, MacdParams::default())
}

pub fn macd_with(closes: &[f64], params: MacdParams) -> Result<Macd> {
    params.validate()?;
    if closes.len() < params.min_len() {
        return Err(Error::InsufficientData {
            indicator: "MACD",
            needed: params.min_len(),
            got: closes.len(),
        });
    }

    let fast = ema(closes, params.fast)?;
    let slow = ema(closes, params.slow)?;

    let macd_line: Vec<f64> = fast
        .iter()
        .zip(&slow)
        .map(|(f, s)| f.unwrap_or(0.0) - s.unwrap_or(0.0))
        .collect();

    let signal_line = ema(&macd_line, params.signal)?;

    let histogram = macd_line
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| m - s.unwrap_or(0.0))
        .collect();

    Ok(Macd {
        macd_line,
        signal_line,
        histogram,
        warm_up: params.warm_up(),
    })
}
