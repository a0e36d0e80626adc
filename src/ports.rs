// 🔌 Collaborator interfaces - the ledger and the catalog store
//
// The engine only ever talks to these traits. Implementations report failures
// as anyhow errors; the window manager and executor convert them to SyncError.

use crate::records::{Category, LedgerRecord, LocalRecord, LocalRecordPatch, NewLocalRecord};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Read-only query side of the ERP ledger
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// All records whose creation date lies in `[start, end]` (inclusive)
    async fn fetch_ledger_records(&self, start: NaiveDate, end: NaiveDate)
        -> Result<Vec<LedgerRecord>>;
}

/// Local catalog store
#[async_trait]
pub trait CatalogAccessor: Send + Sync {
    async fn list_local_records(&self) -> Result<Vec<LocalRecord>>;

    async fn list_categories(&self) -> Result<Vec<Category>>;

    async fn create_local_record(&self, fields: NewLocalRecord) -> Result<LocalRecord>;

    async fn update_local_record(&self, id: &str, fields: LocalRecordPatch) -> Result<LocalRecord>;
}
