pub mod history;
pub mod optimal;
pub mod report;

pub use optimal::{find_max_profit, find_optimal_trade, TradeResult, UnitTrade, DEFAULT_INVESTMENT};
pub use report::{history_file_name, AnalysisEntry, AnalysisReport, HistorySpec};
pub use history::HistoryConfig;
