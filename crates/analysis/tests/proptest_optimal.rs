use analysis::{find_max_profit, find_optimal_trade};
use common::Candle;
use proptest::prelude::*;

fn candles(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            timestamp: i as i64 * 60_000,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        })
        .collect()
}

fn closes() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0.01f64..100_000.0f64, 1..300)
}

/// Brute-force O(n²) reference: best percentage gain, first pair on ties.
fn brute_force_pct(closes: &[f64]) -> f64 {
    let mut best = 0.0;
    for buy in 0..closes.len() {
        for sell in buy..closes.len() {
            let pct = (closes[sell] - closes[buy]) / closes[buy] * 100.0;
            if pct > best {
                best = pct;
            }
        }
    }
    best
}

proptest! {
    /// The chosen buy never comes after the sell.
    #[test]
    fn buy_never_after_sell(prices in closes()) {
        let pct = find_optimal_trade(&candles(&prices), 100.0).unwrap();
        prop_assert!(pct.buy_index <= pct.sell_index);

        let unit = find_max_profit(&prices).unwrap();
        prop_assert!(unit.buy_index <= unit.sell_index);
        prop_assert!(unit.profit >= 0.0);
    }

    /// Scaling every price by a positive constant keeps the chosen pair and
    /// the percentage. Powers of two keep the scaling exact in f64.
    #[test]
    fn percentage_variant_is_scale_invariant(prices in closes(), exp in -8i32..8) {
        let factor = 2f64.powi(exp);
        let scaled: Vec<f64> = prices.iter().map(|p| p * factor).collect();

        let base = find_optimal_trade(&candles(&prices), 100.0).unwrap();
        let other = find_optimal_trade(&candles(&scaled), 100.0).unwrap();

        prop_assert_eq!((base.buy_index, base.sell_index), (other.buy_index, other.sell_index));
        prop_assert_eq!(base.profit_percentage, other.profit_percentage);
    }

    /// The single pass finds the same best percentage as the exhaustive search.
    #[test]
    fn single_pass_matches_brute_force(prices in prop::collection::vec(0.5f64..50.0, 1..60)) {
        let found = find_optimal_trade(&candles(&prices), 100.0).unwrap();
        let expected = brute_force_pct(&prices);
        prop_assert!((found.profit_percentage - expected).abs() <= 1e-9 * expected.max(1.0));
    }

    /// profit == shares * (sell - buy) for the invested variant.
    #[test]
    fn profit_matches_share_count(prices in closes(), investment in 1.0f64..1_000_000.0) {
        let r = find_optimal_trade(&candles(&prices), investment).unwrap();
        let expected = r.shares_count * (r.sell_price - r.buy_price);
        prop_assert!((r.profit - expected).abs() <= 1e-6 * investment.max(expected.abs()));
    }
}
