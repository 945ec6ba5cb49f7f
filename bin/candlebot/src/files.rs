//! Candle source backed by kline JSON files on disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use common::{kline::parse_klines, Candle, CandleSource, Error, Result};

/// Reads `{dir}/{symbol lowercase}-{interval}.json`, a Binance kline array,
/// on every request so an external downloader can refresh it between ticks.
pub struct FileCandleSource {
    dir: PathBuf,
}

impl FileCandleSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, symbol: &str, interval: &str) -> PathBuf {
        self.dir
            .join(format!("{}-{interval}.json", symbol.to_lowercase()))
    }
}

/// Read and decode one kline file.
pub async fn read_klines(path: &Path) -> Result<Vec<Candle>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::Source(format!("{}: {e}", path.display())))?;
    parse_klines(&raw)
}

#[async_trait]
impl CandleSource for FileCandleSource {
    async fn candles(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Candle>> {
        let path = self.path_for(symbol, interval);
        let mut candles = read_klines(&path).await?;
        if candles.len() > limit {
            candles.drain(..candles.len() - limit);
        }
        debug!(symbol, path = %path.display(), count = candles.len(), "Klines read");
        Ok(candles)
    }
}
