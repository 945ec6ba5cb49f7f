//! One symbol's evaluation: candles → indicators → decision → ledger.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use common::{CandleSeries, CandleSource, LedgerSink, Notification, Result, SignalSource};
use ledger::PositionLedger;
use strategy::{compute_snapshot, decision_request, IndicatorConfig};

/// Collaborators and settings shared by every symbol evaluation.
pub struct Pipeline {
    candles: Arc<dyn CandleSource>,
    decider: Arc<dyn SignalSource>,
    ledger: Arc<PositionLedger>,
    sink: Arc<dyn LedgerSink>,
    indicators: IndicatorConfig,
    interval: String,
    candle_limit: usize,
    notify_tx: broadcast::Sender<Notification>,
}

impl Pipeline {
    pub fn new(
        candles: Arc<dyn CandleSource>,
        decider: Arc<dyn SignalSource>,
        ledger: Arc<PositionLedger>,
        sink: Arc<dyn LedgerSink>,
        indicators: IndicatorConfig,
        interval: impl Into<String>,
        candle_limit: usize,
    ) -> Self {
        let (notify_tx, _) = broadcast::channel(256);
        Self {
            candles,
            decider,
            ledger,
            sink,
            indicators,
            interval: interval.into(),
            candle_limit,
            notify_tx,
        }
    }

    pub fn ledger(&self) -> Arc<PositionLedger> {
        self.ledger.clone()
    }

    pub fn interval(&self) -> &str {
        &self.interval
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notify_tx.subscribe()
    }

    pub(crate) fn notifier(&self) -> broadcast::Sender<Notification> {
        self.notify_tx.clone()
    }

    /// Run the full update for `symbol`. Any error aborts this symbol only;
    /// the ledger is untouched unless the decision was obtained.
    pub async fn evaluate(&self, symbol: &str) -> Result<Notification> {
        let raw = self
            .candles
            .candles(symbol, &self.interval, self.candle_limit)
            .await?;
        let series = CandleSeries::new(raw)?;
        debug!(symbol, candles = series.len(), "Candles loaded");

        let snapshot = compute_snapshot(&series, &self.indicators)?;
        let request = decision_request(
            symbol,
            &self.interval,
            &series,
            snapshot.clone(),
            self.indicators.price_tail,
        );
        let decision = self.decider.decide(&request).await?;
        info!(
            symbol,
            directive = %decision.directive,
            confidence = decision.confidence,
            rsi = snapshot.rsi,
            macd_histogram = snapshot.macd_histogram,
            "Decision received"
        );

        let at = Utc::now();
        let entries = self
            .ledger
            .apply_and_persist(symbol, decision.signal(), at, self.sink.as_ref())
            .await?;

        let notification = Notification {
            symbol: symbol.to_string(),
            interval: self.interval.clone(),
            snapshot,
            decision,
            entries,
            at,
        };
        // No subscribers is fine.
        let _ = self.notify_tx.send(notification.clone());
        Ok(notification)
    }
}
