// ⚙️ Configuration - Tunables as data
//
// Loaded from JSON. Every field has a default, so a partial file (or no file
// at all) is valid:
//
//   { "price_tolerance": "0.01", "match_threshold": 0.6, "window_days": 30 }

use crate::classifier::Classifier;
use crate::matcher::Matcher;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "CATALOG_SYNC_CONFIG";

/// Picked up from the working directory when no env override is set
pub const DEFAULT_CONFIG_FILE: &str = "catalog-sync.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Absolute price difference still considered "in sync"
    pub price_tolerance: Decimal,

    /// Minimum name similarity for a link suggestion (0.0 - 1.0)
    pub match_threshold: f64,

    /// Length of the initial window, ending today
    pub window_days: u32,

    /// SQLite catalog database
    pub database_path: PathBuf,

    /// Ledger CSV export
    pub ledger_export_path: PathBuf,

    /// Bind address for the HTTP server
    pub server_addr: String,

    /// Name written to the audit trail
    pub actor: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            price_tolerance: Decimal::new(1, 2),
            match_threshold: 0.60,
            window_days: 30,
            database_path: PathBuf::from("catalog.db"),
            ledger_export_path: PathBuf::from("ledger_export.csv"),
            server_addr: "127.0.0.1:3000".to_string(),
            actor: "operator".to_string(),
        }
    }
}

impl SyncConfig {
    /// Load config from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: SyncConfig =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;

        Ok(config)
    }

    /// `$CATALOG_SYNC_CONFIG`, else `./catalog-sync.json` if present, else defaults
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::from_file(path);
        }

        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return Self::from_file(local);
        }

        Ok(Self::default())
    }

    pub fn classifier(&self) -> Classifier {
        Classifier::with_tolerance(self.price_tolerance)
    }

    pub fn matcher(&self) -> Matcher {
        Matcher::with_threshold(self.match_threshold)
    }
}
