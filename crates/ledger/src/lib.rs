//! Per-symbol position ledger.
//!
//! Each symbol owns a `Book` (trade state plus its entries) behind its own
//! async mutex, so signals for one symbol are applied one at a time while
//! different symbols proceed independently.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

use common::{Error, LedgerEntry, LedgerSink, Result, Signal};

pub mod sink;
pub mod state;

pub use sink::{MemorySink, TracingSink};
pub use state::{PendingEntry, TradeState, Transition};

#[derive(Debug, Default)]
struct Book {
    state: TradeState,
    entries: Vec<LedgerEntry>,
}

impl Book {
    fn commit(&mut self, symbol: &str, signal: Signal, at: DateTime<Utc>) -> Result<Vec<LedgerEntry>> {
        let transition = self.state.transition(signal);
        let next = self.state.validate(symbol, &transition)?;

        let entries: Vec<LedgerEntry> = transition
            .entries
            .iter()
            .map(|pending| pending.stamp(symbol, at))
            .collect();

        if next.order_number != self.state.order_number {
            info!(
                symbol,
                signal = %signal,
                order = next.order_number,
                position = ?next.position,
                "Position opened"
            );
        } else {
            debug!(symbol, signal = %signal, order = next.order_number, "Signal recorded");
        }

        self.entries.extend(entries.iter().cloned());
        self.state = next;
        Ok(entries)
    }
}

#[derive(Debug, Default)]
pub struct PositionLedger {
    books: RwLock<HashMap<String, Arc<Mutex<Book>>>>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Book for `symbol`, created empty on first use.
    async fn book(&self, symbol: &str) -> Arc<Mutex<Book>> {
        if let Some(book) = self.books.read().await.get(symbol) {
            return book.clone();
        }
        self.books
            .write()
            .await
            .entry(symbol.to_string())
            .or_default()
            .clone()
    }

    /// Feed one signal for `symbol` and return the entries it produced.
    ///
    /// State and entries are committed together; on error neither changes.
    pub async fn apply(&self, symbol: &str, signal: Signal, at: DateTime<Utc>) -> Result<Vec<LedgerEntry>> {
        let book = self.book(symbol).await;
        let mut book = book.lock().await;
        book.commit(symbol, signal, at)
    }

    /// `apply`, then hand the new entries to `sink` before the symbol's lock
    /// is released, so the sink receives each symbol's entries in ledger
    /// order. A failed append is logged; the ledger keeps the entries.
    pub async fn apply_and_persist(
        &self,
        symbol: &str,
        signal: Signal,
        at: DateTime<Utc>,
        sink: &dyn LedgerSink,
    ) -> Result<Vec<LedgerEntry>> {
        let book = self.book(symbol).await;
        let mut book = book.lock().await;
        let entries = book.commit(symbol, signal, at)?;

        for entry in &entries {
            if let Err(e) = sink.append(entry).await {
                error!(symbol, order = entry.order_number, error = %e, "Ledger sink append failed");
            }
        }
        Ok(entries)
    }

    /// Load a persisted log for `symbol`. Only allowed before the symbol has
    /// seen any signal.
    pub async fn restore(&self, symbol: &str, entries: Vec<LedgerEntry>) -> Result<TradeState> {
        let state = TradeState::replay(symbol, &entries)?;

        let book = self.book(symbol).await;
        let mut book = book.lock().await;
        if !book.entries.is_empty() {
            return Err(Error::Ledger {
                symbol: symbol.to_string(),
                reason: "ledger already has entries".to_string(),
            });
        }

        info!(symbol, entries = entries.len(), order = state.order_number, "Ledger restored");
        book.state = state;
        book.entries = entries;
        Ok(state)
    }

    /// Current state, or `None` if the symbol has never been seen.
    pub async fn state(&self, symbol: &str) -> Option<TradeState> {
        let book = self.books.read().await.get(symbol).cloned()?;
        let state = book.lock().await.state;
        Some(state)
    }

    pub async fn entries(&self, symbol: &str) -> Vec<LedgerEntry> {
        let Some(book) = self.books.read().await.get(symbol).cloned() else {
            return Vec::new();
        };
        let entries = book.lock().await.entries.clone();
        entries
    }

    pub async fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.books.read().await.keys().cloned().collect();
        symbols.sort();
        symbols
    }
}
