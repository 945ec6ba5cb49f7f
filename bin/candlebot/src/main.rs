use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use analysis::{AnalysisEntry, AnalysisReport, HistoryConfig};
use common::{CandleSeries, Config, EngineCommand};
use engine::{Engine, EngineHandle, Pipeline};
use ledger::{PositionLedger, TracingSink};
use strategy::{RuleRegistry, StrategyFileConfig};

mod cli;
mod files;

use cli::{Cli, Command};
use files::{read_klines, FileCandleSource};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env().context("invalid configuration")?;
    let cli = Cli::parse();

    match cli.command {
        Command::Analyze {
            files,
            investment,
            date,
            output,
        } => {
            let investment = investment.unwrap_or(cfg.investment_amount);
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            let history = HistoryConfig::load(&cfg.strategy_config_path)
                .with_context(|| format!("loading {}", cfg.strategy_config_path))?;
            if history.downloads.is_empty() && files.is_empty() {
                anyhow::bail!(
                    "no [[history]] entries in {} and no files given",
                    cfg.strategy_config_path
                );
            }
            let report = analyze(&history, files, Path::new(&cfg.history_dir), investment, date).await;
            let markdown = report.to_markdown();
            match output {
                Some(path) => {
                    tokio::fs::write(&path, markdown)
                        .await
                        .with_context(|| format!("writing {}", path.display()))?;
                    info!(path = %path.display(), "Report written");
                }
                None => print!("{markdown}"),
            }
        }
        Command::Run { once } => run(cfg, once).await?,
    }

    Ok(())
}

/// Hindsight analysis over the configured history downloads, each resolved
/// under `history_dir` by its cache file name. Explicit `files` replace that
/// lookup. Files that fail to load are skipped and show up as missing in the
/// configuration table.
async fn analyze(
    history: &HistoryConfig,
    files: Vec<PathBuf>,
    history_dir: &Path,
    investment: f64,
    date: NaiveDate,
) -> AnalysisReport {
    let paths = if files.is_empty() {
        history.paths(history_dir, date)
    } else {
        files
    };
    let mut report = AnalysisReport::new(investment, date, history.downloads.clone());

    for path in &paths {
        match analyze_file(path, investment).await {
            Ok(entry) => {
                info!(
                    file = %entry.file,
                    records = entry.records,
                    profit_pct = entry.result.profit_percentage,
                    "File analyzed"
                );
                report.push(entry);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping file"),
        }
    }

    report
}

async fn analyze_file(path: &Path, investment: f64) -> common::Result<AnalysisEntry> {
    let series = CandleSeries::new(read_klines(path).await?)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    AnalysisEntry::from_candles(name, series.candles(), investment)
}

async fn run(cfg: Config, once: bool) -> anyhow::Result<()> {
    info!(symbols = ?cfg.symbols, interval = %cfg.interval, "Candlebot starting");

    // ── Strategy ──────────────────────────────────────────────────────────────
    let strategy_file = StrategyFileConfig::load(&cfg.strategy_config_path)
        .with_context(|| format!("loading {}", cfg.strategy_config_path))?;
    let registry = RuleRegistry::from_config(&strategy_file)?;
    info!(rules = registry.len(), "Rule registry ready");

    let min_candles = strategy_file.indicators.min_candles();
    if cfg.candle_limit < min_candles {
        anyhow::bail!(
            "CANDLEBOT_CANDLE_LIMIT={} is below the {min_candles} candles the indicators need",
            cfg.candle_limit
        );
    }

    // ── Engine ────────────────────────────────────────────────────────────────
    let pipeline = Pipeline::new(
        Arc::new(FileCandleSource::new(&cfg.history_dir)),
        Arc::new(registry),
        Arc::new(PositionLedger::new()),
        Arc::new(TracingSink),
        strategy_file.indicators,
        cfg.interval.clone(),
        cfg.candle_limit,
    );
    let (engine, handle) = Engine::new(cfg.symbols.clone(), cfg.tick_interval, pipeline);

    if once {
        if let Some(report) = engine.run_round().await {
            for (symbol, error) in &report.failed {
                warn!(symbol = %symbol, error = %error, "Symbol failed");
            }
            info!(updated = ?report.updated, "Single round done");
        }
        return Ok(());
    }

    // ── Notifications ─────────────────────────────────────────────────────────
    spawn_notification_logger(&handle);

    let engine_task = tokio::spawn(engine.run());
    handle.send(EngineCommand::Start).await;

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("Shutdown requested");
    handle.send(EngineCommand::Stop).await;

    let ledger = handle.ledger();
    drop(handle);
    engine_task.await.context("engine task")?;

    for symbol in ledger.symbols().await {
        if let Some(state) = ledger.state(&symbol).await {
            info!(
                symbol = %symbol,
                order = state.order_number,
                position = ?state.position,
                entries = ledger.entries(&symbol).await.len(),
                "Final position"
            );
        }
    }
    Ok(())
}

fn spawn_notification_logger(handle: &EngineHandle) {
    let mut rx = handle.subscribe();
    tokio::spawn(async move {
        use tokio::sync::broadcast::error::RecvError;
        loop {
            match rx.recv().await {
                Ok(n) => info!(
                    symbol = %n.symbol,
                    interval = %n.interval,
                    close = n.snapshot.last_close,
                    rsi = n.snapshot.rsi,
                    directive = %n.decision.directive,
                    confidence = n.decision.confidence,
                    reason = %n.decision.reason,
                    entries = n.entries.len(),
                    "Signal"
                ),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Notification logger lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}
