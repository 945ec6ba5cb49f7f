use async_trait::async_trait;

use crate::{Candle, Decision, DecisionRequest, LedgerEntry, Result};

/// Market-data collaborator.
///
/// Implementations own transport and caching. Returned candles may arrive in
/// any order; callers normalize them into a `CandleSeries`.
#[async_trait]
pub trait CandleSource: Send + Sync {
    async fn candles(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Candle>>;
}

/// Decision collaborator (rule engine, model, operator).
///
/// It only ever sees computed indicators and the close tail; it never touches
/// trade state.
#[async_trait]
pub trait SignalSource: Send + Sync {
    async fn decide(&self, request: &DecisionRequest) -> Result<Decision>;
}

/// Persistence collaborator. Receives every ledger append exactly once, in
/// order, and must treat entries as immutable facts.
#[async_trait]
pub trait LedgerSink: Send + Sync {
    async fn append(&self, entry: &LedgerEntry) -> Result<()>;
}
