//! `LedgerSink` implementations.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use common::{LedgerEntry, LedgerSink, Result};

/// Keeps every appended entry in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    entries: Arc<RwLock<Vec<LedgerEntry>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the appended entries (for inspection and tests).
    pub fn entries_handle(&self) -> Arc<RwLock<Vec<LedgerEntry>>> {
        self.entries.clone()
    }

    pub async fn entries(&self) -> Vec<LedgerEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl LedgerSink for MemorySink {
    async fn append(&self, entry: &LedgerEntry) -> Result<()> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }
}

/// Writes every entry to the log instead of storing it.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl LedgerSink for TracingSink {
    async fn append(&self, entry: &LedgerEntry) -> Result<()> {
        info!(
            symbol = %entry.symbol,
            order = entry.order_number,
            signal = %entry.signal,
            status = %entry.status,
            kind = ?entry.kind,
            at = %entry.timestamp,
            "Ledger entry"
        );
        Ok(())
    }
}
