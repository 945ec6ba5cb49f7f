use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinSet;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use common::{EngineCommand, EngineState, Notification};
use ledger::PositionLedger;

use crate::pipeline::Pipeline;

/// Outcome of one evaluation round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundReport {
    /// Symbols whose update completed, sorted.
    pub updated: Vec<String>,
    /// `(symbol, error)` for every symbol whose update was aborted, sorted.
    pub failed: Vec<(String, String)>,
}

/// Cloneable handle passed to the binary and presentation layers.
#[derive(Clone)]
pub struct EngineHandle {
    command_tx: mpsc::Sender<EngineCommand>,
    state: Arc<RwLock<EngineState>>,
    notify_tx: broadcast::Sender<Notification>,
    ledger: Arc<PositionLedger>,
}

impl EngineHandle {
    pub async fn send(&self, cmd: EngineCommand) {
        let _ = self.command_tx.send(cmd).await;
    }

    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }

    /// Subscribe to per-symbol notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notify_tx.subscribe()
    }

    pub fn ledger(&self) -> Arc<PositionLedger> {
        self.ledger.clone()
    }
}

/// The periodic driver: fires a round of symbol evaluations on every tick
/// while running. Rounds never overlap; a tick that finds the previous round
/// still in progress is skipped.
pub struct Engine {
    symbols: Vec<String>,
    tick: Duration,
    pipeline: Arc<Pipeline>,
    state: Arc<RwLock<EngineState>>,
    round_guard: Arc<Mutex<()>>,
    command_rx: mpsc::Receiver<EngineCommand>,
}

impl Engine {
    pub fn new(symbols: Vec<String>, tick: Duration, pipeline: Pipeline) -> (Self, EngineHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let state = Arc::new(RwLock::new(EngineState::Stopped));

        let handle = EngineHandle {
            command_tx,
            state: state.clone(),
            notify_tx: pipeline.notifier(),
            ledger: pipeline.ledger(),
        };

        let engine = Engine {
            symbols,
            tick,
            pipeline: Arc::new(pipeline),
            state,
            round_guard: Arc::new(Mutex::new(())),
            command_rx,
        };

        (engine, handle)
    }

    /// Run the engine until every handle is dropped. Call from `tokio::spawn`.
    pub async fn run(mut self) {
        info!(
            symbols = ?self.symbols,
            tick_secs = self.tick.as_secs(),
            "Engine initialized in Stopped state. Waiting for Start command."
        );

        let mut ticker = time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => {
                        warn!("Engine command channel closed, shutting down");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if *self.state.read().await == EngineState::Running {
                        self.spawn_round();
                    }
                }
            }
        }
    }

    async fn handle_command(&self, cmd: EngineCommand) {
        let current = *self.state.read().await;
        match cmd {
            EngineCommand::Start => {
                if current == EngineState::Running {
                    info!("Engine already running");
                    return;
                }
                info!(symbols = ?self.symbols, "Engine started");
                *self.state.write().await = EngineState::Running;
            }
            EngineCommand::Stop => {
                info!("Engine stopped; an in-flight round is allowed to finish");
                *self.state.write().await = EngineState::Stopped;
            }
            EngineCommand::Pause => {
                if current == EngineState::Running {
                    info!("Engine paused, ticks ignored");
                    *self.state.write().await = EngineState::Paused;
                } else {
                    warn!(state = %current, "Pause received but engine is not running");
                }
            }
            EngineCommand::Resume => {
                if current == EngineState::Paused {
                    info!("Engine resumed");
                    *self.state.write().await = EngineState::Running;
                } else {
                    warn!(state = %current, "Resume received but engine is not paused");
                }
            }
        }
    }

    fn spawn_round(&self) {
        let Ok(guard) = self.round_guard.clone().try_lock_owned() else {
            warn!("Previous round still running, skipping tick");
            return;
        };
        let pipeline = self.pipeline.clone();
        let symbols = self.symbols.clone();
        tokio::spawn(async move {
            evaluate_all(pipeline, symbols).await;
            drop(guard);
        });
    }

    /// Run one round now. Returns `None` when a round is already in progress.
    pub async fn run_round(&self) -> Option<RoundReport> {
        let Ok(_guard) = self.round_guard.clone().try_lock_owned() else {
            warn!("Previous round still running, skipping");
            return None;
        };
        Some(evaluate_all(self.pipeline.clone(), self.symbols.clone()).await)
    }
}

/// Evaluate every symbol concurrently. Same-symbol work is serialized by the
/// ledger, so this only bounds the round, not the symbols.
async fn evaluate_all(pipeline: Arc<Pipeline>, symbols: Vec<String>) -> RoundReport {
    let started = Instant::now();
    let mut tasks = JoinSet::new();
    for symbol in symbols {
        let pipeline = pipeline.clone();
        tasks.spawn(async move {
            let outcome = pipeline.evaluate(&symbol).await;
            (symbol, outcome)
        });
    }

    let mut report = RoundReport::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((symbol, Ok(_))) => report.updated.push(symbol),
            Ok((symbol, Err(e))) => {
                if e.is_input_error() {
                    warn!(symbol = %symbol, error = %e, "Symbol input rejected");
                } else {
                    error!(symbol = %symbol, error = %e, "Symbol update aborted");
                }
                report.failed.push((symbol, e.to_string()));
            }
            Err(e) => error!(error = %e, "Symbol task failed to complete"),
        }
    }
    report.updated.sort();
    report.failed.sort();

    info!(
        updated = report.updated.len(),
        failed = report.failed.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Round complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use common::{
        Candle, CandleSource, Decision, DecisionRequest, Directive, EntryKind, Error, LedgerEntry,
        LedgerSink, OrderSide, PositionSide, Result, SignalSource,
    };
    use ledger::MemorySink;
    use strategy::IndicatorConfig;

    struct StubCandles {
        fail_for: Option<&'static str>,
    }

    #[async_trait]
    impl CandleSource for StubCandles {
        async fn candles(&self, symbol: &str, _interval: &str, limit: usize) -> Result<Vec<Candle>> {
            if self.fail_for == Some(symbol) {
                return Err(Error::Source(format!("no data for {symbol}")));
            }
            Ok((0..limit)
                .map(|i| {
                    let close = 100.0 + i as f64 + (i % 3) as f64;
                    Candle {
                        timestamp: i as i64 * 300_000,
                        open: close,
                        high: close + 1.0,
                        low: close - 1.0,
                        close,
                        volume: 10.0,
                    }
                })
                .collect())
        }
    }

    struct FixedDecider(Directive);

    #[async_trait]
    impl SignalSource for FixedDecider {
        async fn decide(&self, _request: &DecisionRequest) -> Result<Decision> {
            Ok(Decision {
                directive: self.0,
                confidence: 80,
                take_profit: None,
                reason: "fixed".into(),
            })
        }
    }

    struct BrokenSink;

    #[async_trait]
    impl LedgerSink for BrokenSink {
        async fn append(&self, _entry: &LedgerEntry) -> Result<()> {
            Err(Error::Source("disk full".into()))
        }
    }

    fn buy() -> Directive {
        Directive::Open {
            side: OrderSide::Buy,
            quadrant: None,
        }
    }

    fn engine(
        symbols: &[&str],
        candles: StubCandles,
        directive: Directive,
        sink: Arc<dyn LedgerSink>,
    ) -> (Engine, EngineHandle) {
        let pipeline = Pipeline::new(
            Arc::new(candles),
            Arc::new(FixedDecider(directive)),
            Arc::new(PositionLedger::new()),
            sink,
            IndicatorConfig::default(),
            "5m",
            70,
        );
        Engine::new(
            symbols.iter().map(|s| s.to_string()).collect(),
            Duration::from_secs(60),
            pipeline,
        )
    }

    #[tokio::test]
    async fn round_updates_every_symbol() {
        let sink = MemorySink::new();
        let (engine, handle) = engine(
            &["ETHUSDT", "BTCUSDT"],
            StubCandles { fail_for: None },
            buy(),
            Arc::new(sink.clone()),
        );
        let mut rx = handle.subscribe();

        let report = engine.run_round().await.unwrap();
        assert_eq!(report.updated, vec!["BTCUSDT", "ETHUSDT"]);
        assert!(report.failed.is_empty());

        let ledger = handle.ledger();
        for symbol in ["BTCUSDT", "ETHUSDT"] {
            let state = ledger.state(symbol).await.unwrap();
            assert_eq!(state.position, Some(PositionSide::Long));
            assert_eq!(state.order_number, 1);
        }
        assert_eq!(sink.entries().await.len(), 2);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        let mut seen = vec![first.symbol, second.symbol];
        seen.sort();
        assert_eq!(seen, vec!["BTCUSDT", "ETHUSDT"]);
    }

    #[tokio::test]
    async fn failing_symbol_does_not_abort_the_round() {
        let (engine, handle) = engine(
            &["BTCUSDT", "DOGEUSDT"],
            StubCandles {
                fail_for: Some("DOGEUSDT"),
            },
            buy(),
            Arc::new(MemorySink::new()),
        );

        let report = engine.run_round().await.unwrap();
        assert_eq!(report.updated, vec!["BTCUSDT"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "DOGEUSDT");

        let ledger = handle.ledger();
        assert_eq!(ledger.state("DOGEUSDT").await, None);
        assert_eq!(ledger.entries("BTCUSDT").await.len(), 1);
    }

    #[tokio::test]
    async fn sink_failure_keeps_ledger_entries() {
        let (engine, handle) = engine(
            &["BTCUSDT"],
            StubCandles { fail_for: None },
            buy(),
            Arc::new(BrokenSink),
        );

        let report = engine.run_round().await.unwrap();
        assert_eq!(report.updated, vec!["BTCUSDT"]);
        let entries = handle.ledger().entries("BTCUSDT").await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, EntryKind::Open);
    }

    /// Records appends, stalling on opens.
    struct SlowSink(MemorySink);

    #[async_trait]
    impl LedgerSink for SlowSink {
        async fn append(&self, entry: &LedgerEntry) -> Result<()> {
            if entry.kind == EntryKind::Open {
                time::sleep(Duration::from_millis(50)).await;
            }
            self.0.append(entry).await
        }
    }

    #[tokio::test]
    async fn overlapping_evaluations_persist_in_ledger_order() {
        let sink = Arc::new(SlowSink(MemorySink::new()));
        let (engine, handle) = engine(
            &["BTCUSDT"],
            StubCandles { fail_for: None },
            buy(),
            sink.clone(),
        );

        let (a, b) = tokio::join!(
            engine.pipeline.evaluate("BTCUSDT"),
            engine.pipeline.evaluate("BTCUSDT")
        );
        a.unwrap();
        b.unwrap();

        let persisted = sink.0.entries().await;
        let kinds: Vec<EntryKind> = persisted.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EntryKind::Open, EntryKind::Mark]);
        assert_eq!(persisted, handle.ledger().entries("BTCUSDT").await);
        assert!(ledger::TradeState::replay("BTCUSDT", &persisted).is_ok());
    }

    #[tokio::test]
    async fn round_is_skipped_while_another_holds_the_guard() {
        let (engine, handle) = engine(
            &["BTCUSDT"],
            StubCandles { fail_for: None },
            buy(),
            Arc::new(MemorySink::new()),
        );

        let held = engine.round_guard.clone().try_lock_owned().unwrap();
        assert!(engine.run_round().await.is_none());
        assert_eq!(handle.ledger().state("BTCUSDT").await, None);

        drop(held);
        assert!(engine.run_round().await.is_some());
    }

    #[tokio::test]
    async fn close_directive_maps_to_opposite_signal() {
        let close_buy = Directive::Close {
            side: OrderSide::Buy,
            quadrant: Some(2),
        };
        let (engine, handle) = engine(
            &["BTCUSDT"],
            StubCandles { fail_for: None },
            close_buy,
            Arc::new(MemorySink::new()),
        );

        engine.run_round().await.unwrap();
        let entries = handle.ledger().entries("BTCUSDT").await;
        // CLOSE_BUY acts as SELL: no position is opened from flat.
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, EntryKind::Mark);
        assert_eq!(entries[0].signal, common::Signal::Sell);
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_drive_rounds_only_while_running() {
        let (engine, handle) = engine(
            &["BTCUSDT"],
            StubCandles { fail_for: None },
            buy(),
            Arc::new(MemorySink::new()),
        );
        let mut rx = handle.subscribe();
        let task = tokio::spawn(engine.run());

        // Stopped: ticks are ignored.
        assert!(time::timeout(Duration::from_secs(150), rx.recv()).await.is_err());
        assert_eq!(handle.state().await, EngineState::Stopped);

        handle.send(EngineCommand::Start).await;
        let n = time::timeout(Duration::from_secs(120), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n.symbol, "BTCUSDT");
        assert_eq!(handle.state().await, EngineState::Running);

        handle.send(EngineCommand::Pause).await;
        assert!(time::timeout(Duration::from_secs(300), rx.recv()).await.is_err());
        assert_eq!(handle.state().await, EngineState::Paused);

        handle.send(EngineCommand::Resume).await;
        assert!(time::timeout(Duration::from_secs(120), rx.recv()).await.is_ok());

        handle.send(EngineCommand::Stop).await;
        let ledger = handle.ledger();
        drop(handle);
        task.await.unwrap();

        // BUY then BUY again: one open, then marks.
        let entries = ledger.entries("BTCUSDT").await;
        assert!(entries.len() >= 2);
        assert_eq!(entries[0].kind, EntryKind::Open);
        assert!(entries[1..].iter().all(|e| e.kind == EntryKind::Mark));
    }
}
