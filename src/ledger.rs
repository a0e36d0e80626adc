// 📒 Ledger Export - LedgerClient backed by the ERP's CSV product export
//
// The ERP can dump its product table as CSV:
//   Id,Name,Code,Price,Stock,Status,Created
// When backed by a file the export is re-read on every query, so each fetch
// sees the ledger as it is now (records are snapshots, never cached).

use crate::dates::parse_date;
use crate::ports::LedgerClient;
use crate::records::{LedgerRecord, RecordStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// One CSV row exactly as exported (everything as text)
#[derive(Debug, Deserialize)]
struct LedgerRow {
    #[serde(rename = "Id")]
    id: String,

    #[serde(rename = "Name")]
    name: String,

    #[serde(rename = "Code", default)]
    code: String,

    #[serde(rename = "Price")]
    price: String,

    #[serde(rename = "Stock", default)]
    stock: String,

    #[serde(rename = "Status")]
    status: String,

    #[serde(rename = "Created")]
    created: String,
}

impl LedgerRow {
    fn into_record(self) -> Result<LedgerRecord> {
        let price = Decimal::from_str(self.price.trim().trim_start_matches('$'))
            .with_context(|| format!("Invalid price {:?} for ledger record {}", self.price, self.id))?;

        let stock_quantity = if self.stock.trim().is_empty() {
            0
        } else {
            self.stock
                .trim()
                .parse::<i64>()
                .with_context(|| format!("Invalid stock {:?} for ledger record {}", self.stock, self.id))?
        };

        let status = RecordStatus::from_str(&self.status)
            .with_context(|| format!("Invalid status for ledger record {}", self.id))?;

        let created_at = parse_timestamp(&self.created)
            .with_context(|| format!("Invalid created date {:?} for ledger record {}", self.created, self.id))?;

        Ok(LedgerRecord {
            id: self.id.trim().to_string(),
            name: self.name,
            code: self.code.trim().to_string(),
            price,
            stock_quantity,
            status,
            created_at,
        })
    }
}

/// Parse RFC 3339 timestamps, falling back to plain dates (midnight UTC)
fn parse_timestamp(input: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input.trim()) {
        return Some(dt.with_timezone(&Utc));
    }

    parse_date(input)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Load every record from a ledger CSV export
pub fn load_csv(csv_path: &Path) -> Result<Vec<LedgerRecord>> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open ledger export {:?}", csv_path))?;

    let mut records = Vec::new();

    for (line, result) in rdr.deserialize::<LedgerRow>().enumerate() {
        let row = result.with_context(|| format!("Failed to read ledger row {}", line + 2))?;
        records.push(row.into_record()?);
    }

    Ok(records)
}

// ============================================================================
// LEDGER CLIENT
// ============================================================================

enum Source {
    File(PathBuf),
    Records(Vec<LedgerRecord>),
}

pub struct LedgerExport {
    source: Source,
}

impl LedgerExport {
    /// Re-read `path` on every fetch
    pub fn from_csv_path(path: impl Into<PathBuf>) -> Self {
        LedgerExport {
            source: Source::File(path.into()),
        }
    }

    /// Fixed in-memory ledger (tests, demos)
    pub fn from_records(records: Vec<LedgerRecord>) -> Self {
        LedgerExport {
            source: Source::Records(records),
        }
    }
}

#[async_trait]
impl LedgerClient for LedgerExport {
    async fn fetch_ledger_records(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<LedgerRecord>> {
        let all = match &self.source {
            Source::File(path) => {
                let path = path.clone();
                tokio::task::spawn_blocking(move || load_csv(&path))
                    .await
                    .context("Ledger export reader panicked")??
            }
            Source::Records(records) => records.clone(),
        };

        let in_range: Vec<LedgerRecord> = all
            .into_iter()
            .filter(|r| start <= r.created_on() && r.created_on() <= end)
            .collect();

        debug!(%start, %end, count = in_range.len(), "ledger export queried");
        Ok(in_range)
    }
}

// ============================================================================
// TESTS
// ============================================================================
