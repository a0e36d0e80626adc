// 🛠️ Operation Executor - Link, Import, Update
//
// Each operation touches exactly one store (the catalog) and only after its
// preconditions pass, so a failure never leaves a partial write behind.
// On success the in-memory view is patched for the affected ledger record
// instead of refetching everything.
//
//   Link   - local.ledger_id = ledger.id           (idempotent)
//   Import - new local record from ledger values   (NOT idempotent by id)
//   Update - local name/price/status = ledger's    (idempotent)

use crate::classifier::{Bucket, Classifier};
use crate::error::{Origin, SyncError, SyncResult};
use crate::matcher::Matcher;
use crate::ports::CatalogAccessor;
use crate::records::{Category, LedgerRecord, LocalRecord, LocalRecordPatch, NewLocalRecord};
use crate::view::CatalogView;
use crate::window::WindowState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

// ============================================================================
// OPERATIONS
// ============================================================================

/// Operator-chosen defaults for Import
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportDefaults {
    /// None = first category by name
    pub category_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Operation {
    Link { ledger_id: String, local_id: String },
    Import { ledger_id: String, defaults: ImportDefaults },
    Update { ledger_id: String, local_id: String },
}

impl Operation {
    pub fn ledger_id(&self) -> &str {
        match self {
            Operation::Link { ledger_id, .. }
            | Operation::Import { ledger_id, .. }
            | Operation::Update { ledger_id, .. } => ledger_id,
        }
    }

    pub fn local_id(&self) -> Option<&str> {
        match self {
            Operation::Link { local_id, .. } | Operation::Update { local_id, .. } => Some(local_id),
            Operation::Import { .. } => None,
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Link { .. } => OperationKind::Link,
            Operation::Import { .. } => OperationKind::Import,
            Operation::Update { .. } => OperationKind::Update,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Link,
    Import,
    Update,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Link => write!(f, "link"),
            OperationKind::Import => write!(f, "import"),
            OperationKind::Update => write!(f, "update"),
        }
    }
}

/// What a successful operation did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationOutcome {
    pub kind: OperationKind,
    pub ledger_id: String,
    /// Catalog record as it is after the operation
    pub local: LocalRecord,
    /// False when the catalog already had the target state (no write issued)
    pub wrote: bool,
    pub from: Option<Bucket>,
    pub to: Bucket,
}

// ============================================================================
// EXECUTOR
// ============================================================================

pub struct OperationExecutor {
    catalog: Arc<dyn CatalogAccessor>,
    classifier: Classifier,
    matcher: Matcher,
}

impl OperationExecutor {
    pub fn new(catalog: Arc<dyn CatalogAccessor>, classifier: Classifier, matcher: Matcher) -> Self {
        OperationExecutor {
            catalog,
            classifier,
            matcher,
        }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Run a confirmed operation and patch `view` on success
    pub async fn execute(
        &self,
        operation: &Operation,
        window: &WindowState,
        view: &mut CatalogView,
    ) -> SyncResult<OperationOutcome> {
        let ledger = window
            .get(operation.ledger_id())
            .cloned()
            .ok_or_else(|| SyncError::not_found("ledger record", operation.ledger_id()))?;

        let result = match operation {
            Operation::Link { local_id, .. } => self.link(&ledger, local_id, view).await,
            Operation::Import { defaults, .. } => self.import(&ledger, defaults).await,
            Operation::Update { local_id, .. } => self.update(&ledger, local_id, view).await,
        };

        let (local, wrote) = match result {
            Ok(done) => done,
            Err(err) => {
                warn!(
                    operation = %operation.kind(),
                    ledger_id = %ledger.id,
                    error = %err,
                    "operation failed"
                );
                return Err(err);
            }
        };

        view.upsert_local(local.clone());
        let (from, to) = view.reclassify(&self.classifier, &ledger);
        view.refresh_candidates(&self.matcher);

        info!(
            operation = %operation.kind(),
            ledger_id = %ledger.id,
            local_id = %local.id,
            wrote,
            from = ?from,
            to = ?to,
            "operation applied"
        );

        Ok(OperationOutcome {
            kind: operation.kind(),
            ledger_id: ledger.id,
            local,
            wrote,
            from,
            to,
        })
    }

    async fn link(
        &self,
        ledger: &LedgerRecord,
        local_id: &str,
        view: &CatalogView,
    ) -> SyncResult<(LocalRecord, bool)> {
        let local = view
            .local(local_id)
            .ok_or_else(|| SyncError::not_found("local record", local_id))?;

        match local.ledger_id.as_deref() {
            Some(existing) if existing == ledger.id => return Ok((local.clone(), false)),
            Some(existing) => {
                return Err(SyncError::AlreadyLinked {
                    local_id: local.id.clone(),
                    linked_to: existing.to_string(),
                })
            }
            None => {}
        }

        // One-to-one: the ledger record must not be claimed by someone else
        if let Some(holder) = view.linked_local(&ledger.id) {
            return Err(SyncError::AlreadyLinked {
                local_id: holder.id.clone(),
                linked_to: ledger.id.clone(),
            });
        }

        let updated = self
            .catalog
            .update_local_record(local_id, LocalRecordPatch::link_to(&ledger.id))
            .await
            .map_err(|e| SyncError::fetch(Origin::Catalog, e))?;
        Ok((updated, true))
    }

    async fn import(
        &self,
        ledger: &LedgerRecord,
        defaults: &ImportDefaults,
    ) -> SyncResult<(LocalRecord, bool)> {
        let categories = self
            .catalog
            .list_categories()
            .await
            .map_err(|e| SyncError::fetch(Origin::Catalog, e))?;

        let category = choose_category(&categories, defaults)?;

        let created = self
            .catalog
            .create_local_record(NewLocalRecord::from_ledger(ledger, &category.id))
            .await
            .map_err(|e| SyncError::fetch(Origin::Catalog, e))?;
        Ok((created, true))
    }

    async fn update(
        &self,
        ledger: &LedgerRecord,
        local_id: &str,
        view: &CatalogView,
    ) -> SyncResult<(LocalRecord, bool)> {
        let local = view
            .local(local_id)
            .ok_or_else(|| SyncError::not_found("local record", local_id))?;

        match local.ledger_id.as_deref() {
            Some(existing) if existing == ledger.id => {}
            Some(existing) => {
                return Err(SyncError::AlreadyLinked {
                    local_id: local.id.clone(),
                    linked_to: existing.to_string(),
                })
            }
            None => {
                return Err(SyncError::not_found(
                    "link to the ledger record for local record",
                    local_id,
                ))
            }
        }

        let already_equal =
            local.name == ledger.name && local.price == ledger.price && local.status == ledger.status;
        if already_equal {
            return Ok((local.clone(), false));
        }

        let updated = self
            .catalog
            .update_local_record(local_id, LocalRecordPatch::values_from(ledger))
            .await
            .map_err(|e| SyncError::fetch(Origin::Catalog, e))?;
        Ok((updated, true))
    }
}

/// Operator's pick if given (must exist), otherwise the first category by name
fn choose_category<'a>(categories: &'a [Category], defaults: &ImportDefaults) -> SyncResult<&'a Category> {
    if categories.is_empty() {
        return Err(SyncError::NoCategoryAvailable);
    }

    match &defaults.category_id {
        Some(wanted) => categories
            .iter()
            .find(|c| &c.id == wanted)
            .ok_or_else(|| SyncError::not_found("category", wanted.clone())),
        None => categories
            .iter()
            .min_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)))
            .ok_or(SyncError::NoCategoryAvailable),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::DateRange;
    use crate::db::SqliteCatalog;
    use crate::fixtures::{day, dec, ledger};
    use crate::records::RecordStatus;
    use crate::view::reconcile;
    use std::collections::BTreeMap;

    struct Harness {
        catalog: SqliteCatalog,
        executor: OperationExecutor,
        window: WindowState,
        view: CatalogView,
    }

    impl Harness {
        async fn new(ledger_records: Vec<LedgerRecord>, seed: Vec<NewLocalRecord>) -> Self {
            let catalog = SqliteCatalog::open_in_memory().unwrap();
            for fields in seed {
                catalog.insert_local_record(fields).unwrap();
            }
            let range = DateRange::new(day(2025, 3, 1), day(2025, 3, 31)).unwrap();
            let window = WindowState {
                start: range.start,
                end: range.end,
                records: ledger_records
                    .into_iter()
                    .map(|r| (r.id.clone(), r))
                    .collect::<BTreeMap<_, _>>(),
                has_more: true,
            };
            let executor =
                OperationExecutor::new(Arc::new(catalog.clone()), Classifier::new(), Matcher::new());
            let locals = catalog.list_local_records().await.unwrap();
            let view = CatalogView::build(executor.classifier(), executor.matcher(), &window, locals);
            Harness {
                catalog,
                executor,
                window,
                view,
            }
        }

        fn local_id_named(&self, name: &str) -> String {
            self.view.locals.iter().find(|l| l.name == name).unwrap().id.clone()
        }

        async fn run(&mut self, op: Operation) -> SyncResult<OperationOutcome> {
            self.executor.execute(&op, &self.window, &mut self.view).await
        }

        async fn assert_view_matches_store(&self) {
            let stored = self.catalog.list_local_records().await.unwrap();
            assert_eq!(self.view.locals, stored);
            assert_eq!(self.view.sets, reconcile(&Classifier::new(), &self.window, &stored));
        }
    }

    fn seed(name: &str, price: &str, ledger_id: Option<&str>) -> NewLocalRecord {
        NewLocalRecord {
            name: name.to_string(),
            price: dec(price),
            status: RecordStatus::Active,
            ledger_id: ledger_id.map(|s| s.to_string()),
            category_id: None,
        }
    }

    #[tokio::test]
    async fn test_link_moves_record_out_of_unlinked() {
        let mut h = Harness::new(
            vec![ledger("C1", "Queso Andino", "4.50")],
            vec![seed("Queso Andino Premium", "5.00", None)],
        )
        .await;
        let local_id = h.local_id_named("Queso Andino Premium");

        let outcome = h
            .run(Operation::Link {
                ledger_id: "C1".to_string(),
                local_id: local_id.clone(),
            })
            .await
            .unwrap();

        assert!(outcome.wrote);
        assert_eq!(outcome.from, Some(Bucket::Unlinked));
        assert_eq!(outcome.to, Bucket::Diff);
        assert_eq!(outcome.local.ledger_id, Some("C1".to_string()));
        h.assert_view_matches_store().await;
    }

    #[tokio::test]
    async fn test_link_twice_is_noop_success() {
        let mut h = Harness::new(
            vec![ledger("C1", "Queso Andino", "4.50")],
            vec![seed("Queso Andino", "4.50", None)],
        )
        .await;
        let local_id = h.local_id_named("Queso Andino");
        let op = Operation::Link {
            ledger_id: "C1".to_string(),
            local_id: local_id.clone(),
        };

        let first = h.run(op.clone()).await.unwrap();
        let second = h.run(op).await.unwrap();

        assert!(first.wrote);
        assert!(!second.wrote);
        assert_eq!(first.local, second.local);
        assert_eq!(second.to, Bucket::Synced);
        assert_eq!(h.catalog.events_for("local_record", &local_id).unwrap().len(), 2);
        h.assert_view_matches_store().await;
    }

    #[tokio::test]
    async fn test_link_rejects_local_linked_elsewhere() {
        let mut h = Harness::new(
            vec![ledger("C1", "Queso Andino", "4.50")],
            vec![seed("Queso Andino", "4.50", Some("C9"))],
        )
        .await;
        let local_id = h.local_id_named("Queso Andino");
        let before = h.view.sets.clone();

        let err = h
            .run(Operation::Link {
                ledger_id: "C1".to_string(),
                local_id,
            })
            .await
            .unwrap_err();

        assert_eq!(
            err,
            SyncError::AlreadyLinked {
                local_id: h.local_id_named("Queso Andino"),
                linked_to: "C9".to_string(),
            }
        );
        assert_eq!(h.view.sets, before);
    }

    #[tokio::test]
    async fn test_link_rejects_second_claim_on_same_ledger_record() {
        let mut h = Harness::new(
            vec![ledger("C1", "Queso Andino", "4.50")],
            vec![seed("Queso Andino", "4.50", Some("C1")), seed("Queso", "4.50", None)],
        )
        .await;
        let other = h.local_id_named("Queso");

        let err = h
            .run(Operation::Link {
                ledger_id: "C1".to_string(),
                local_id: other,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::AlreadyLinked { .. }));
    }

    #[tokio::test]
    async fn test_import_without_categories_creates_nothing() {
        let mut h = Harness::new(vec![ledger("C1", "Queso Andino", "4.50")], vec![]).await;

        let err = h
            .run(Operation::Import {
                ledger_id: "C1".to_string(),
                defaults: ImportDefaults::default(),
            })
            .await
            .unwrap_err();

        assert_eq!(err, SyncError::NoCategoryAvailable);
        assert!(h.catalog.list_local_records().await.unwrap().is_empty());
        assert_eq!(h.view.sets.bucket_of("C1"), Some(Bucket::Unlinked));
    }

    #[tokio::test]
    async fn test_import_places_record_in_synced() {
        let mut h = Harness::new(vec![ledger("C1", "Queso Andino", "4.50")], vec![]).await;
        h.catalog.add_category("Quesos").unwrap();
        let lacteos = h.catalog.add_category("Lácteos").unwrap();

        let outcome = h
            .run(Operation::Import {
                ledger_id: "C1".to_string(),
                defaults: ImportDefaults::default(),
            })
            .await
            .unwrap();

        assert_eq!(outcome.to, Bucket::Synced);
        assert_eq!(outcome.local.name, "Queso Andino");
        assert_eq!(outcome.local.price, dec("4.50"));
        // First by name
        assert_eq!(outcome.local.category_id, Some(lacteos.id));
        h.assert_view_matches_store().await;
    }

    #[tokio::test]
    async fn test_import_with_unknown_category_fails() {
        let mut h = Harness::new(vec![ledger("C1", "Queso Andino", "4.50")], vec![]).await;
        h.catalog.add_category("Quesos").unwrap();

        let err = h
            .run(Operation::Import {
                ledger_id: "C1".to_string(),
                defaults: ImportDefaults {
                    category_id: Some("nope".to_string()),
                },
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::NotFound { kind: "category", .. }));
        assert!(h.catalog.list_local_records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_import_twice_creates_two_records() {
        let mut h = Harness::new(vec![ledger("C1", "Queso Andino", "4.50")], vec![]).await;
        h.catalog.add_category("Quesos").unwrap();
        let op = Operation::Import {
            ledger_id: "C1".to_string(),
            defaults: ImportDefaults::default(),
        };

        h.run(op.clone()).await.unwrap();
        let second = h.run(op).await.unwrap();

        assert_eq!(second.from, Some(Bucket::Synced));
        assert_eq!(h.catalog.list_local_records().await.unwrap().len(), 2);
        h.assert_view_matches_store().await;
    }

    #[tokio::test]
    async fn test_update_converges_diff_to_synced() {
        let mut h = Harness::new(
            vec![ledger("C2", "Yogur Natural", "10.20")],
            vec![seed("Yogur Natural", "10.00", Some("C2"))],
        )
        .await;
        let local_id = h.local_id_named("Yogur Natural");
        assert_eq!(h.view.sets.bucket_of("C2"), Some(Bucket::Diff));
        let op = Operation::Update {
            ledger_id: "C2".to_string(),
            local_id: local_id.clone(),
        };

        let first = h.run(op.clone()).await.unwrap();
        let second = h.run(op).await.unwrap();

        assert_eq!(first.local.price, dec("10.20"));
        assert_eq!(first.local.ledger_id, Some("C2".to_string()));
        assert_eq!((first.from, first.to), (Some(Bucket::Diff), Bucket::Synced));
        assert!(!second.wrote);
        assert_eq!(first.local, second.local);
        h.assert_view_matches_store().await;
    }

    #[tokio::test]
    async fn test_update_requires_link_to_that_ledger_record() {
        let mut h = Harness::new(
            vec![ledger("C2", "Yogur Natural", "10.20")],
            vec![seed("Yogur Natural", "10.00", None)],
        )
        .await;
        let local_id = h.local_id_named("Yogur Natural");

        let err = h
            .run(Operation::Update {
                ledger_id: "C2".to_string(),
                local_id,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::NotFound { .. }));
        assert_eq!(h.catalog.list_local_records().await.unwrap()[0].price, dec("10.00"));
    }

    #[tokio::test]
    async fn test_unknown_ledger_record() {
        let mut h = Harness::new(vec![], vec![]).await;

        let err = h
            .run(Operation::Update {
                ledger_id: "C404".to_string(),
                local_id: "L1".to_string(),
            })
            .await
            .unwrap_err();

        assert_eq!(err, SyncError::not_found("ledger record", "C404"));
    }

    #[test]
    fn test_choose_category() {
        let categories = vec![
            Category { id: "b".to_string(), name: "Quesos".to_string() },
            Category { id: "a".to_string(), name: "Lácteos".to_string() },
        ];

        let picked = choose_category(&categories, &ImportDefaults::default()).unwrap();
        assert_eq!(picked.id, "a");

        let picked = choose_category(
            &categories,
            &ImportDefaults { category_id: Some("b".to_string()) },
        )
        .unwrap();
        assert_eq!(picked.name, "Quesos");

        assert_eq!(
            choose_category(&[], &ImportDefaults::default()).unwrap_err(),
            SyncError::NoCategoryAvailable
        );
    }
}
