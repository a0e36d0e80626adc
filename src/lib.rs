// Catalog Sync - Core Library
// Reconciles a ledger's product records against the local catalog.
// Exposes all modules for use in the CLI, the API server, and tests.

pub mod error;      // SyncError + Origin
pub mod records;    // LedgerRecord, LocalRecord, Category, patches
pub mod dates;      // DateRange + week arithmetic
pub mod ports;      // LedgerClient / CatalogAccessor traits
pub mod window;     // Window Manager
pub mod ledger;     // CSV ledger export adapter
pub mod classifier; // Unlinked / Diff / Synced
pub mod matcher;    // Name-similarity link suggestions
pub mod db;         // SQLite catalog + audit trail
pub mod config;     // SyncConfig
pub mod view;       // Reconciled view + optimistic patching
pub mod executor;   // Link / Import / Update
pub mod session;    // Operator session state machine
pub mod logging;

#[cfg(test)]
mod fixtures;

// Re-export commonly used types
pub use error::{Origin, SyncError, SyncResult};
pub use records::{
    Category, LedgerRecord, LocalRecord, LocalRecordPatch, NewLocalRecord, RecordStatus,
};
pub use dates::{parse_date, DateRange, DAYS_PER_WEEK};
pub use ports::{CatalogAccessor, LedgerClient};
pub use window::{WindowManager, WindowState};
pub use ledger::{load_csv, LedgerExport};
pub use classifier::{
    Bucket, ClassificationSets, Classifier, DiffPair, Field, FieldDifference, SyncedPair,
};
pub use matcher::{similarity, CandidateMatch, Matcher};
pub use db::{setup_database, Event, SqliteCatalog};
pub use config::SyncConfig;
pub use view::{reconcile, CatalogView};
pub use executor::{ImportDefaults, Operation, OperationExecutor, OperationKind, OperationOutcome};
pub use session::{
    ClassificationSnapshot, ConfirmationPrompt, OperationReport, ReconciliationSession,
    SessionState, UnlinkedEntry, WindowSummary,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
