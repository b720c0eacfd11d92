//! Strategy state persistence

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Store data error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// State carried across restarts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyState {
    pub current_stake: Decimal,
    pub analyzer: String,
    /// Confidence weights in effect when saved
    #[serde(default)]
    pub analyzer_weights: BTreeMap<String, f64>,
    pub total_trades: u64,
    pub wins: u64,
    pub losses: u64,
    pub saved_at: DateTime<Utc>,
}

impl StrategyState {
    pub fn win_rate(&self) -> Option<f64> {
        if self.total_trades == 0 {
            None
        } else {
            Some(self.wins as f64 / self.total_trades as f64)
        }
    }
}

/// Trait for strategy state storage
pub trait StrategyStore: Send + Sync {
    /// Saved state, or `None` when nothing was saved yet
    fn load(&self) -> Result<Option<StrategyState>, StoreError>;
    fn save(&self, state: &StrategyState) -> Result<(), StoreError>;
}

/// JSON file store; writes go through a temp file and a rename
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StrategyStore for JsonFileStore {
    fn load(&self) -> Result<Option<StrategyState>, StoreError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&text)?))
    }

    fn save(&self, state: &StrategyState) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(state)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Store that keeps nothing
#[derive(Debug, Default, Clone)]
pub struct NullStore;

impl StrategyStore for NullStore {
    fn load(&self) -> Result<Option<StrategyState>, StoreError> {
        Ok(None)
    }

    fn save(&self, _state: &StrategyState) -> Result<(), StoreError> {
        Ok(())
    }
}
