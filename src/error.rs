// 🚨 Sync Errors - Everything that can go wrong during a reconciliation pass
//
// Collaborator failures (ledger API, catalog store) arrive as anyhow errors and
// are converted here, at the window/executor boundary. Nothing else is allowed
// to reach the presentation layer.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Which collaborator a remote failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Origin {
    Ledger,
    Catalog,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Ledger => write!(f, "ledger"),
            Origin::Catalog => write!(f, "catalog"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    #[error("window end {end} is before window start {start}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("{origin} request failed: {message}")]
    Fetch { origin: Origin, message: String },

    #[error("the catalog has no categories; create one before importing")]
    NoCategoryAvailable,

    #[error("local record {local_id} is already linked to ledger record {linked_to}")]
    AlreadyLinked { local_id: String, linked_to: String },

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("cannot {action} while the session is {state}")]
    SessionBusy { action: &'static str, state: &'static str },
}

impl SyncError {
    /// Wrap a collaborator error, keeping the full context chain as the message
    pub fn fetch(origin: Origin, err: anyhow::Error) -> Self {
        SyncError::Fetch {
            origin,
            message: format!("{:#}", err),
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        SyncError::NotFound { kind, id: id.into() }
    }

    /// Short heading for the operator-facing error dialog
    pub fn title(&self) -> &'static str {
        match self {
            SyncError::InvalidRange { .. } => "Invalid date range",
            SyncError::Fetch { origin: Origin::Ledger, .. } => "Ledger unavailable",
            SyncError::Fetch { origin: Origin::Catalog, .. } => "Catalog unavailable",
            SyncError::NoCategoryAvailable => "No category available",
            SyncError::AlreadyLinked { .. } => "Already linked",
            SyncError::NotFound { .. } => "Record not found",
            SyncError::SessionBusy { .. } => "Please wait",
        }
    }

    /// Body text for the operator-facing error dialog
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Stable machine-readable code (used by the HTTP API)
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::InvalidRange { .. } => "invalid_range",
            SyncError::Fetch { .. } => "fetch_error",
            SyncError::NoCategoryAvailable => "no_category_available",
            SyncError::AlreadyLinked { .. } => "already_linked",
            SyncError::NotFound { .. } => "not_found",
            SyncError::SessionBusy { .. } => "session_busy",
        }
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_keeps_context_chain() {
        let err = anyhow::anyhow!("connection refused").context("GET /products");
        let sync_err = SyncError::fetch(Origin::Ledger, err);

        assert_eq!(sync_err.title(), "Ledger unavailable");
        assert_eq!(
            sync_err.message(),
            "ledger request failed: GET /products: connection refused"
        );
    }

    #[test]
    fn test_every_error_has_title_and_message() {
        let errors = vec![
            SyncError::InvalidRange {
                start: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
                end: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            },
            SyncError::NoCategoryAvailable,
            SyncError::AlreadyLinked {
                local_id: "L1".to_string(),
                linked_to: "C9".to_string(),
            },
            SyncError::not_found("ledger record", "C404"),
            SyncError::SessionBusy {
                action: "expand the window",
                state: "executing",
            },
        ];

        for err in errors {
            assert!(!err.title().is_empty());
            assert!(!err.message().is_empty());
            assert!(!err.code().is_empty());
        }
    }
}
