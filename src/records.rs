// 📦 Records - The two sides of a reconcilable product
//
// LedgerRecord: immutable snapshot from the ERP ledger (price, stock, codes)
// LocalRecord:  mutable catalog entry, optionally linked to a ledger id
//
// The link is the only thing tying them together. Names, prices and status
// are compared, never merged, by the classifier.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Active,
    Inactive,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Active => "active",
            RecordStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = anyhow::Error;

    /// Accepts the spellings ledger exports actually use ("active", "A", "1", "true")
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" | "a" | "1" | "true" | "yes" => Ok(RecordStatus::Active),
            "inactive" | "i" | "0" | "false" | "no" => Ok(RecordStatus::Inactive),
            other => Err(anyhow::anyhow!("unknown record status: {:?}", other)),
        }
    }
}

// ============================================================================
// LEDGER RECORD (external, read-only)
// ============================================================================

/// Product as the ledger sees it. Fetched fresh on every query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// Ledger-assigned id, stable across fetches
    pub id: String,
    pub name: String,
    /// Ledger product code (SKU)
    pub code: String,
    pub price: Decimal,
    /// May be negative (backorders)
    pub stock_quantity: i64,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
}

impl LedgerRecord {
    /// Calendar day the record was created, used for window membership
    pub fn created_on(&self) -> NaiveDate {
        self.created_at.date_naive()
    }
}

// ============================================================================
// LOCAL RECORD (catalog-owned)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalRecord {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    pub status: RecordStatus,
    /// Foreign key into LedgerRecord.id (None = not linked)
    pub ledger_id: Option<String>,
    #[serde(default)]
    pub category_id: Option<String>,
}

impl LocalRecord {
    pub fn is_linked(&self) -> bool {
        self.ledger_id.is_some()
    }

    pub fn is_linked_to(&self, ledger_id: &str) -> bool {
        self.ledger_id.as_deref() == Some(ledger_id)
    }
}

/// Fields for a catalog record created by Import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLocalRecord {
    pub name: String,
    pub price: Decimal,
    pub status: RecordStatus,
    pub ledger_id: Option<String>,
    pub category_id: Option<String>,
}

impl NewLocalRecord {
    pub fn from_ledger(ledger: &LedgerRecord, category_id: &str) -> Self {
        NewLocalRecord {
            name: ledger.name.clone(),
            price: ledger.price,
            status: ledger.status,
            ledger_id: Some(ledger.id.clone()),
            category_id: Some(category_id.to_string()),
        }
    }
}

/// Partial update; `None` leaves the stored value untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalRecordPatch {
    pub name: Option<String>,
    pub price: Option<Decimal>,
    pub status: Option<RecordStatus>,
    pub ledger_id: Option<String>,
}

impl LocalRecordPatch {
    pub fn link_to(ledger_id: &str) -> Self {
        LocalRecordPatch {
            ledger_id: Some(ledger_id.to_string()),
            ..Default::default()
        }
    }

    /// Copy the ledger-authoritative fields, leave the link alone
    pub fn values_from(ledger: &LedgerRecord) -> Self {
        LocalRecordPatch {
            name: Some(ledger.name.clone()),
            price: Some(ledger.price),
            status: Some(ledger.status),
            ledger_id: None,
        }
    }

    pub fn apply_to(&self, record: &mut LocalRecord) {
        if let Some(name) = &self.name {
            record.name = name.clone();
        }
        if let Some(price) = self.price {
            record.price = price;
        }
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(ledger_id) = &self.ledger_id {
            record.ledger_id = Some(ledger_id.clone());
        }
    }
}

// ============================================================================
// CATEGORY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
}

impl Category {
    pub fn new(name: &str) -> Self {
        Category {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
        }
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Normalize a product name for comparison
///
/// - Lowercase
/// - Trim and collapse internal whitespace to single spaces
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}
