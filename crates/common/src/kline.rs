//! Decoding of Binance kline payloads.
//!
//! A kline is a JSON array `[openTime, "open", "high", "low", "close",
//! "volume", closeTime, ...]`; prices arrive as strings, trailing fields are
//! ignored.

use serde_json::Value;

use crate::{Candle, Error, Result};

pub fn parse_klines(json: &str) -> Result<Vec<Candle>> {
    let rows: Vec<Vec<Value>> = serde_json::from_str(json)?;
    rows.iter().enumerate().map(|(i, row)| parse_row(i, row)).collect()
}

fn parse_row(index: usize, row: &[Value]) -> Result<Candle> {
    if row.len() < 6 {
        return Err(Error::InvalidCandle {
            timestamp: row.first().and_then(Value::as_i64).unwrap_or_default(),
            reason: format!("kline #{index} has {} fields, expected at least 6", row.len()),
        });
    }

    let timestamp = row[0].as_i64().ok_or_else(|| Error::InvalidCandle {
        timestamp: 0,
        reason: format!("kline #{index} open time is not an integer"),
    })?;

    let number = |pos: usize, name: &str| -> Result<f64> {
        let parsed = match &row[pos] {
            Value::String(s) => s.parse::<f64>().ok(),
            Value::Number(n) => n.as_f64(),
            _ => None,
        };
        parsed.ok_or_else(|| Error::InvalidCandle {
            timestamp,
            reason: format!("{name} is not numeric: {}", row[pos]),
        })
    };

    Ok(Candle {
        timestamp,
        open: number(1, "open")?,
        high: number(2, "high")?,
        low: number(3, "low")?,
        close: number(4, "close")?,
        volume: number(5, "volume")?,
    })
}
