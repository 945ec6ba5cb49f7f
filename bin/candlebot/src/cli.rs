use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "candlebot",
    about = "Indicator-driven signal bot and hindsight trade analyzer"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Find the best buy/sell pair in kline files and print a markdown report
    Analyze {
        /// Kline JSON files (Binance array format); defaults to the
        /// `[[history]]` downloads resolved under CANDLEBOT_HISTORY_DIR
        files: Vec<PathBuf>,
        /// Amount invested per trade; defaults to CANDLEBOT_INVESTMENT
        #[arg(long)]
        investment: Option<f64>,
        /// Analysis date used for expected file names; defaults to today (UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Evaluate the watchlist on a fixed tick until interrupted
    Run {
        /// Run a single round and exit
        #[arg(long)]
        once: bool,
    },
}
