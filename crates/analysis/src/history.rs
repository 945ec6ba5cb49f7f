//! The list of history downloads to analyze, read from the `[[history]]`
//! tables of the TOML config:
//!
//! ```toml
//! [[history]]
//! symbol = "BTCUSDT"
//! interval = "1d"
//! limit = 365
//! ```

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use common::{Error, Result};

use crate::report::HistorySpec;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(rename = "history", default)]
    pub downloads: Vec<HistorySpec>,
}

impl HistoryConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read history config at '{}': {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(content)?;
        if let Some(spec) = cfg.downloads.iter().find(|s| s.limit == 0 || s.symbol.is_empty()) {
            return Err(Error::Config(format!(
                "history entry '{}' ({}) needs a symbol and a positive limit",
                spec.symbol, spec.interval
            )));
        }
        Ok(cfg)
    }

    /// Where each download is cached under `dir` for the given analysis date.
    pub fn paths(&self, dir: impl AsRef<Path>, date: NaiveDate) -> Vec<PathBuf> {
        let dir = dir.as_ref();
        self.downloads
            .iter()
            .map(|spec| dir.join(spec.file_name(date)))
            .collect()
    }
}
