// 🧭 Reconciliation Session - One operator, one pass, explicit states
//
//   Idle ──request()──▶ AwaitingConfirmation ──confirm()──▶ Executing ──▶ Idle
//    │                          └──dismiss()──▶ Idle (nothing happened)
//    └──expand_window() / set_window()──▶ Fetching ──▶ Idle
//
// Window changes and new requests are only accepted while Idle. Whatever
// fails, the session returns to Idle with the previous window and
// classification intact.

use crate::classifier::{Bucket, DiffPair, SyncedPair};
use crate::config::SyncConfig;
use crate::error::{Origin, SyncError, SyncResult};
use crate::executor::{ImportDefaults, Operation, OperationExecutor, OperationOutcome};
use crate::matcher::CandidateMatch;
use crate::ports::{CatalogAccessor, LedgerClient};
use crate::records::{LedgerRecord, LocalRecord};
use crate::view::{reconcile, CatalogView};
use crate::window::{WindowManager, WindowState};
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

// ============================================================================
// SESSION STATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Fetching,
    AwaitingConfirmation,
    Executing,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Fetching => "fetching",
            SessionState::AwaitingConfirmation => "awaiting confirmation",
            SessionState::Executing => "executing",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Holds the session in a busy phase and puts it back to Idle when dropped,
/// including when the owning future is dropped mid-await.
struct BusyPhase<'a> {
    state: &'a mut SessionState,
    finished: bool,
}

impl<'a> BusyPhase<'a> {
    fn enter(state: &'a mut SessionState, phase: SessionState) -> Self {
        *state = phase;
        BusyPhase {
            state,
            finished: false,
        }
    }

    fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for BusyPhase<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let phase = *self.state;
            warn!(phase = %phase, "session phase cancelled before completion");
        }
        *self.state = SessionState::Idle;
    }
}

// ============================================================================
// SNAPSHOTS (what the presentation layer gets)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowSummary {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub record_count: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnlinkedEntry {
    pub record: LedgerRecord,
    pub candidate: Option<CandidateMatch>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationSnapshot {
    pub window: WindowSummary,
    pub state: SessionState,
    pub unlinked: Vec<UnlinkedEntry>,
    pub diff: Vec<DiffPair>,
    pub synced: Vec<SyncedPair>,
}

impl ClassificationSnapshot {
    pub fn bucket_of(&self, ledger_id: &str) -> Option<Bucket> {
        if self.unlinked.iter().any(|e| e.record.id == ledger_id) {
            Some(Bucket::Unlinked)
        } else if self.diff.iter().any(|p| p.ledger.id == ledger_id) {
            Some(Bucket::Diff)
        } else if self.synced.iter().any(|p| p.ledger.id == ledger_id) {
            Some(Bucket::Synced)
        } else {
            None
        }
    }
}

/// The question put to the operator before anything is written
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmationPrompt {
    pub title: String,
    pub message: String,
    pub operation: Operation,
}

/// Result of an operation plus the classification after it
#[derive(Debug, Clone)]
pub struct OperationReport {
    pub outcome: SyncResult<OperationOutcome>,
    pub snapshot: ClassificationSnapshot,
}

impl OperationReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

// ============================================================================
// SESSION
// ============================================================================

pub struct ReconciliationSession {
    window: WindowManager,
    catalog: Arc<dyn CatalogAccessor>,
    executor: OperationExecutor,
    view: CatalogView,
    state: SessionState,
    pending: Option<Operation>,
}

impl ReconciliationSession {
    /// Fetch the initial window and the catalog, then classify
    pub async fn open(
        ledger: Arc<dyn LedgerClient>,
        catalog: Arc<dyn CatalogAccessor>,
        config: &SyncConfig,
        start: NaiveDate,
        end: NaiveDate,
    ) -> SyncResult<Self> {
        let window = WindowManager::initialize(ledger, start, end).await?;
        let locals = catalog
            .list_local_records()
            .await
            .map_err(|e| SyncError::fetch(Origin::Catalog, e))?;

        let executor = OperationExecutor::new(catalog.clone(), config.classifier(), config.matcher());
        let view = CatalogView::build(executor.classifier(), executor.matcher(), window.state(), locals);

        info!("{}", view.sets.summary());

        Ok(ReconciliationSession {
            window,
            catalog,
            executor,
            view,
            state: SessionState::Idle,
            pending: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn window(&self) -> &WindowState {
        self.window.state()
    }

    pub fn pending(&self) -> Option<&Operation> {
        self.pending.as_ref()
    }

    pub fn local_records(&self) -> &[LocalRecord] {
        &self.view.locals
    }

    pub fn classification(&self) -> ClassificationSnapshot {
        let window = self.window.state();
        ClassificationSnapshot {
            window: WindowSummary {
                start: window.start,
                end: window.end,
                record_count: window.record_count(),
                has_more: window.has_more,
            },
            state: self.state,
            unlinked: self
                .view
                .sets
                .unlinked
                .iter()
                .map(|record| UnlinkedEntry {
                    record: record.clone(),
                    candidate: self.view.candidate_for(&record.id).cloned(),
                })
                .collect(),
            diff: self.view.sets.diff.clone(),
            synced: self.view.sets.synced.clone(),
        }
    }

    /// Classification recomputed from scratch over the resident data
    ///
    /// Always equal to the optimistically maintained sets.
    pub fn recomputed(&self) -> crate::classifier::ClassificationSets {
        reconcile(self.executor.classifier(), self.window.state(), &self.view.locals)
    }

    fn require_idle(&self, action: &'static str) -> SyncResult<()> {
        if self.state != SessionState::Idle {
            return Err(SyncError::SessionBusy {
                action,
                state: self.state.as_str(),
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Window
    // ------------------------------------------------------------------------

    /// Grow the window one week back and reclassify
    pub async fn expand_window(&mut self) -> SyncResult<WindowState> {
        self.require_idle("expand the window")?;

        let busy = BusyPhase::enter(&mut self.state, SessionState::Fetching);
        let result = self.window.expand_backward().await;
        busy.finish();
        result?;

        let locals = std::mem::take(&mut self.view.locals);
        self.rebuild(locals);
        Ok(self.window.state().clone())
    }

    /// Replace the window, refetch both sides and reclassify
    pub async fn set_window(&mut self, start: NaiveDate, end: NaiveDate) -> SyncResult<WindowState> {
        self.require_idle("change the window")?;

        let busy = BusyPhase::enter(&mut self.state, SessionState::Fetching);
        let result = refetch(self.catalog.as_ref(), &mut self.window, start, end).await;
        busy.finish();
        let locals = result?;

        self.rebuild(locals);
        Ok(self.window.state().clone())
    }

    fn rebuild(&mut self, locals: Vec<LocalRecord>) {
        self.view = CatalogView::build(
            self.executor.classifier(),
            self.executor.matcher(),
            self.window.state(),
            locals,
        );
        info!("{}", self.view.sets.summary());
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    /// Stage an operation and describe it for confirmation
    pub fn request(&mut self, operation: Operation) -> SyncResult<ConfirmationPrompt> {
        self.require_idle("start an operation")?;

        let ledger = self
            .window
            .state()
            .get(operation.ledger_id())
            .ok_or_else(|| SyncError::not_found("ledger record", operation.ledger_id()))?;

        let local = match operation.local_id() {
            Some(id) => Some(
                self.view
                    .local(id)
                    .ok_or_else(|| SyncError::not_found("local record", id))?,
            ),
            None => None,
        };

        let prompt = describe(&operation, ledger, local);
        self.pending = Some(operation);
        self.state = SessionState::AwaitingConfirmation;
        Ok(prompt)
    }

    /// Drop the staged operation; nothing is written
    pub fn dismiss(&mut self) {
        if self.state == SessionState::AwaitingConfirmation {
            self.pending = None;
            self.state = SessionState::Idle;
        }
    }

    /// Run the staged operation to completion (or failure)
    pub async fn confirm(&mut self) -> OperationReport {
        let operation = match (self.state, self.pending.take()) {
            (SessionState::AwaitingConfirmation, Some(op)) => op,
            (state, pending) => {
                self.pending = pending;
                return OperationReport {
                    outcome: Err(SyncError::SessionBusy {
                        action: "confirm an operation",
                        state: state.as_str(),
                    }),
                    snapshot: self.classification(),
                };
            }
        };

        // A cancelled operation may or may not have reached the catalog;
        // set_window() reloads it.
        let busy = BusyPhase::enter(&mut self.state, SessionState::Executing);
        let result = self
            .executor
            .execute(&operation, self.window.state(), &mut self.view)
            .await;
        busy.finish();

        OperationReport {
            outcome: result,
            snapshot: self.classification(),
        }
    }

    /// request + confirm, for callers that collected confirmation themselves
    pub async fn link(&mut self, ledger_id: &str, local_id: &str) -> OperationReport {
        self.run(Operation::Link {
            ledger_id: ledger_id.to_string(),
            local_id: local_id.to_string(),
        })
        .await
    }

    pub async fn import(&mut self, ledger_id: &str, defaults: ImportDefaults) -> OperationReport {
        self.run(Operation::Import {
            ledger_id: ledger_id.to_string(),
            defaults,
        })
        .await
    }

    pub async fn update(&mut self, ledger_id: &str, local_id: &str) -> OperationReport {
        self.run(Operation::Update {
            ledger_id: ledger_id.to_string(),
            local_id: local_id.to_string(),
        })
        .await
    }

    async fn run(&mut self, operation: Operation) -> OperationReport {
        if let Err(err) = self.request(operation) {
            return OperationReport {
                outcome: Err(err),
                snapshot: self.classification(),
            };
        }
        self.confirm().await
    }
}

/// Catalog first, so a ledger failure cannot leave a half-replaced view
async fn refetch(
    catalog: &dyn CatalogAccessor,
    window: &mut WindowManager,
    start: NaiveDate,
    end: NaiveDate,
) -> SyncResult<Vec<LocalRecord>> {
    let locals = catalog
        .list_local_records()
        .await
        .map_err(|e| SyncError::fetch(Origin::Catalog, e))?;
    window.set_range(start, end).await?;
    Ok(locals)
}

/// Human-readable confirmation text
fn describe(operation: &Operation, ledger: &LedgerRecord, local: Option<&LocalRecord>) -> ConfirmationPrompt {
    let local_name = local.map(|l| l.name.as_str()).unwrap_or("?");
    let (title, message) = match operation {
        Operation::Link { .. } => (
            "Link product",
            format!(
                "Link ledger product {} \"{}\" ({}) to catalog product \"{}\"?",
                ledger.id, ledger.name, ledger.code, local_name
            ),
        ),
        Operation::Import { .. } => (
            "Import product",
            format!(
                "Create a catalog product from ledger product {} \"{}\" at {}?",
                ledger.id, ledger.name, ledger.price
            ),
        ),
        Operation::Update { .. } => (
            "Update product",
            format!(
                "Overwrite name, price and status of catalog product \"{}\" with ledger product {} \"{}\" ({}, {})?",
                local_name, ledger.id, ledger.name, ledger.price, ledger.status
            ),
        ),
    };

    ConfirmationPrompt {
        title: title.to_string(),
        message,
        operation: operation.clone(),
    }
}

// ============================================================================
// TESTS
// ============================================================================
