//! Hindsight search for the single most profitable buy-then-sell pair.
//!
//! Both variants are one left-to-right pass that tracks the cheapest close
//! seen so far and only replaces the best pair on strict improvement, so the
//! earliest of several equal maxima wins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use common::{Candle, Error, Result};

/// Default amount invested in the hindsight trade, in quote currency.
pub const DEFAULT_INVESTMENT: f64 = 100.0;

/// Best trade measured per unit of the asset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitTrade {
    pub buy_index: usize,
    pub sell_index: usize,
    pub buy_price: f64,
    pub sell_price: f64,
    /// `sell_price - buy_price`.
    pub profit: f64,
    pub profit_percentage: f64,
}

/// Best trade for a fixed investment amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeResult {
    pub buy_index: usize,
    pub sell_index: usize,
    pub buy_time: Option<DateTime<Utc>>,
    pub sell_time: Option<DateTime<Utc>>,
    pub buy_price: f64,
    pub sell_price: f64,
    pub investment_amount: f64,
    pub shares_count: f64,
    pub sell_value: f64,
    pub profit: f64,
    pub profit_percentage: f64,
}

/// Find the pair maximizing percentage gain and size it for `investment_amount`.
///
/// A series that never rises yields `buy_index == sell_index == 0` and zero
/// profit.
pub fn find_optimal_trade(candles: &[Candle], investment_amount: f64) -> Result<TradeResult> {
    if !(investment_amount.is_finite() && investment_amount > 0.0) {
        return Err(Error::InvalidInvestment(investment_amount));
    }
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    validate_prices(&closes)?;

    let (buy, sell) = scan(&closes, |buy, sell| (sell - buy) / buy);

    let buy_price = closes[buy];
    let sell_price = closes[sell];
    let shares_count = investment_amount / buy_price;
    let sell_value = shares_count * sell_price;

    Ok(TradeResult {
        buy_index: buy,
        sell_index: sell,
        buy_time: candles[buy].time(),
        sell_time: candles[sell].time(),
        buy_price,
        sell_price,
        investment_amount,
        shares_count,
        sell_value,
        profit: sell_value - investment_amount,
        profit_percentage: percentage(buy_price, sell_price),
    })
}

/// Find the pair maximizing absolute per-unit profit.
pub fn find_max_profit(closes: &[f64]) -> Result<UnitTrade> {
    validate_prices(closes)?;

    let (buy, sell) = scan(closes, |buy, sell| sell - buy);

    let buy_price = closes[buy];
    let sell_price = closes[sell];
    Ok(UnitTrade {
        buy_index: buy,
        sell_index: sell,
        buy_price,
        sell_price,
        profit: sell_price - buy_price,
        profit_percentage: percentage(buy_price, sell_price),
    })
}

/// Single pass over `closes`; `gain(min_so_far, close)` scores selling at the
/// current index against the cheapest earlier (or same) close.
fn scan(closes: &[f64], gain: impl Fn(f64, f64) -> f64) -> (usize, usize) {
    let mut best_gain = 0.0;
    let (mut best_buy, mut best_sell) = (0, 0);
    let (mut min_price, mut min_index) = (closes[0], 0);

    for (i, &close) in closes.iter().enumerate().skip(1) {
        if close < min_price {
            min_price = close;
            min_index = i;
        }

        let g = gain(min_price, close);
        if g > best_gain {
            best_gain = g;
            best_buy = min_index;
            best_sell = i;
        }
    }

    (best_buy, best_sell)
}

fn percentage(buy_price: f64, sell_price: f64) -> f64 {
    (sell_price - buy_price) / buy_price * 100.0
}

fn validate_prices(closes: &[f64]) -> Result<()> {
    if closes.is_empty() {
        return Err(Error::EmptySeries);
    }
    match closes
        .iter()
        .enumerate()
        .find(|(_, &p)| !(p.is_finite() && p > 0.0))
    {
        Some((index, &price)) => Err(Error::InvalidPrice { index, price }),
        None => Ok(()),
    }
}
