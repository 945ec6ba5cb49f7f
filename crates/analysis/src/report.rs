//! Markdown report over a batch of hindsight trades.

use std::fmt::Write as _;

use chrono::{NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use common::{Candle, Result};

use crate::optimal::{find_optimal_trade, TradeResult};

/// One history download: which symbol/interval and how many candles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySpec {
    pub symbol: String,
    pub interval: String,
    pub limit: usize,
}

impl HistorySpec {
    pub fn file_name(&self, date: NaiveDate) -> String {
        history_file_name(&self.symbol, &self.interval, self.limit, date)
    }
}

/// Cache file name for a history download taken on `date`:
/// `{symbol lowercase}-{interval}-{limit}-{yymmdd}.json`.
pub fn history_file_name(symbol: &str, interval: &str, limit: usize, date: NaiveDate) -> String {
    format!(
        "{}-{interval}-{limit}-{}.json",
        symbol.to_lowercase(),
        date.format("%y%m%d")
    )
}

/// The optimal trade found in one candle file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisEntry {
    pub file: String,
    pub records: usize,
    pub first_timestamp: i64,
    pub last_timestamp: i64,
    pub result: TradeResult,
}

impl AnalysisEntry {
    /// Run the optimal trade search over `candles` (already normalized).
    pub fn from_candles(file: impl Into<String>, candles: &[Candle], investment: f64) -> Result<Self> {
        let result = find_optimal_trade(candles, investment)?;
        // find_optimal_trade rejects empty input, so both ends exist.
        let first_timestamp = candles.first().map(|c| c.timestamp).unwrap_or_default();
        let last_timestamp = candles.last().map(|c| c.timestamp).unwrap_or_default();
        Ok(Self {
            file: file.into(),
            records: candles.len(),
            first_timestamp,
            last_timestamp,
            result,
        })
    }

    pub fn date_range(&self) -> String {
        format!(
            "{} to {}",
            format_millis(self.first_timestamp),
            format_millis(self.last_timestamp)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub investment_amount: f64,
    pub analysis_date: NaiveDate,
    pub configurations: Vec<HistorySpec>,
    entries: Vec<AnalysisEntry>,
}

impl AnalysisReport {
    pub fn new(investment_amount: f64, analysis_date: NaiveDate, configurations: Vec<HistorySpec>) -> Self {
        Self {
            investment_amount,
            analysis_date,
            configurations,
            entries: Vec::new(),
        }
    }

    /// Add an entry, keeping entries ordered by profit percentage (best first).
    pub fn push(&mut self, entry: AnalysisEntry) {
        debug!(file = %entry.file, pct = entry.result.profit_percentage, "Report entry added");
        let pos = self.entries.partition_point(|e| {
            e.result.profit_percentage.total_cmp(&entry.result.profit_percentage).is_ge()
        });
        self.entries.insert(pos, entry);
    }

    pub fn entries(&self) -> &[AnalysisEntry] {
        &self.entries
    }

    pub fn best(&self) -> Option<&AnalysisEntry> {
        self.entries.first()
    }

    pub fn average_profit(&self) -> Option<f64> {
        if self.entries.is_empty() {
            return None;
        }
        let total: f64 = self.entries.iter().map(|e| e.result.profit).sum();
        Some(total / self.entries.len() as f64)
    }

    pub fn total_records(&self) -> usize {
        self.entries.iter().map(|e| e.records).sum()
    }

    /// The results table alone (header, separator, one row per entry).
    pub fn results_table(&self) -> String {
        let mut out = String::new();
        out.push_str("| File | Date Range | Buy Date | Buy Price | Sell Date | Sell Price | Shares | Sell Value | Profit | Profit % |\n");
        out.push_str("|------|------------|----------|-----------|-----------|------------|--------|------------|--------|----------|\n");
        for entry in &self.entries {
            let r = &entry.result;
            let _ = writeln!(
                out,
                "| {} | {} | {} | ${:.2} | {} | ${:.2} | {:.8} | ${:.2} | ${:.2} | {:.2}% |",
                entry.file,
                entry.date_range(),
                format_day(r.buy_time),
                r.buy_price,
                format_day(r.sell_time),
                r.sell_price,
                r.shares_count,
                r.sell_value,
                r.profit,
                r.profit_percentage,
            );
        }
        out
    }

    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        md.push_str("# Crypto Price Analyzer - Finding Optimal Buy/Sell Dates\n\n");
        let _ = writeln!(md, "**Investment Amount:** ${}", group_thousands(self.investment_amount));
        let _ = writeln!(md, "**Analysis Date:** {}", self.analysis_date.format("%Y-%m-%d"));
        let _ = writeln!(md, "**Total Configurations:** {}", self.configurations.len());
        let _ = writeln!(md, "**Files Successfully Analyzed:** {}\n", self.entries.len());

        md.push_str("## Data Configurations\n\n");
        md.push_str("| Symbol | Interval | Limit | Expected File |\n");
        md.push_str("|--------|----------|-------|---------------|\n");
        for spec in &self.configurations {
            let file = spec.file_name(self.analysis_date);
            let analyzed = if self.entries.iter().any(|e| e.file == file) { "✅" } else { "❌" };
            let _ = writeln!(
                md,
                "| {} | {} | {} | {file} {analyzed} |",
                spec.symbol, spec.interval, spec.limit
            );
        }

        md.push_str("\n## Analysis Results\n\n");
        if let (Some(best), Some(average)) = (self.best(), self.average_profit()) {
            md.push_str(&self.results_table());
            md.push_str("\n## Summary\n");
            let _ = writeln!(
                md,
                "- **Best Profit:** {} with ${:.2} ({:.2}%)",
                best.file, best.result.profit, best.result.profit_percentage
            );
            let _ = writeln!(md, "- **Average Profit:** ${average:.2}");
            let _ = writeln!(
                md,
                "- **Total Records Processed:** {}",
                group_thousands(self.total_records() as f64)
            );
        }
        md
    }
}

fn format_millis(ms: i64) -> String {
    format_day(Utc.timestamp_millis_opt(ms).single())
}

fn format_day(time: Option<chrono::DateTime<Utc>>) -> String {
    time.map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "n/a".to_string())
}

/// en-US style: `12345.5` → `12,345.5`, at most three fraction digits,
/// trailing zeros dropped.
fn group_thousands(value: f64) -> String {
    let fixed = format!("{:.3}", value.abs());
    let (whole, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let fraction = fraction.trim_end_matches('0');

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 && (whole != "0" || !fraction.is_empty()) { "-" } else { "" };
    if fraction.is_empty() {
        format!("{sign}{grouped}")
    } else {
        format!("{sign}{grouped}.{fraction}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY_MS: i64 = 86_400_000;
    const JAN_1_2024: i64 = 1_704_067_200_000;

    fn candles(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                timestamp: JAN_1_2024 + i as i64 * DAY_MS,
                open: close,
                high: close,
                low: close,
                close,
                volume: 1.0,
            })
            .collect()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    #[test]
    fn history_file_name_matches_cache_layout() {
        assert_eq!(
            history_file_name("BTCUSDT", "1d", 365, date()),
            "btcusdt-1d-365-240309.json"
        );
    }

    #[test]
    fn entries_are_kept_best_first() {
        let mut report = AnalysisReport::new(100.0, date(), Vec::new());
        report.push(AnalysisEntry::from_candles("a", &candles(&[10.0, 11.0]), 100.0).unwrap());
        report.push(AnalysisEntry::from_candles("b", &candles(&[10.0, 20.0]), 100.0).unwrap());
        report.push(AnalysisEntry::from_candles("c", &candles(&[10.0, 15.0]), 100.0).unwrap());
        let order: Vec<&str> = report.entries().iter().map(|e| e.file.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
        assert_eq!(report.total_records(), 6);
        assert!((report.average_profit().unwrap() - 160.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn markdown_contains_tables_and_summary() {
        let spec = HistorySpec {
            symbol: "BTCUSDT".into(),
            interval: "1d".into(),
            limit: 5,
        };
        let missing = HistorySpec {
            symbol: "ETHUSDT".into(),
            interval: "1d".into(),
            limit: 5,
        };
        let file = spec.file_name(date());
        let mut report = AnalysisReport::new(1000.0, date(), vec![spec, missing]);
        report.push(
            AnalysisEntry::from_candles(file.clone(), &candles(&[10.0, 12.0, 8.0, 15.0, 9.0]), 1000.0)
                .unwrap(),
        );

        let md = report.to_markdown();
        assert!(md.contains("**Investment Amount:** $1,000"));
        assert!(md.contains("**Analysis Date:** 2024-03-09"));
        assert!(md.contains(&format!("| BTCUSDT | 1d | 5 | {file} ✅ |")));
        assert!(md.contains("| ETHUSDT | 1d | 5 | ethusdt-1d-5-240309.json ❌ |"));
        assert!(md.contains(
            "| 2024-01-01 to 2024-01-05 | 2024-01-03 | $8.00 | 2024-01-04 | $15.00 | 125.00000000 | $1875.00 | $875.00 | 87.50% |"
        ));
        assert!(md.contains(&format!("- **Best Profit:** {file} with $875.00 (87.50%)")));
        assert!(md.contains("- **Total Records Processed:** 5"));
    }

    #[test]
    fn empty_report_has_no_summary() {
        let md = AnalysisReport::new(100.0, date(), Vec::new()).to_markdown();
        assert!(md.contains("**Files Successfully Analyzed:** 0"));
        assert!(!md.contains("## Summary"));
    }

    #[test]
    fn thousands_grouping() {
        assert_eq!(group_thousands(100.0), "100");
        assert_eq!(group_thousands(1_234_567.0), "1,234,567");
        assert_eq!(group_thousands(12_345.5), "12,345.5");
        assert_eq!(group_thousands(100.5), "100.5");
        assert_eq!(group_thousands(0.1234), "0.123");
        assert_eq!(group_thousands(999.9999), "1,000");
        assert_eq!(group_thousands(-2_500.25), "-2,500.25");
    }
}
