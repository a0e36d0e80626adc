// 🪟 Window Manager - Which slice of the ledger are we reconciling?
//
// Owns a contiguous date range plus every ledger record fetched for it.
// The window only grows backward, one calendar week per step, and records are
// merged by ledger id so a re-fetched record never replaces the one we have.
//
// A failed fetch changes nothing: new state is built aside and committed only
// after the ledger answered.

use crate::dates::DateRange;
use crate::error::{Origin, SyncError, SyncResult};
use crate::ports::LedgerClient;
use crate::records::LedgerRecord;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

// ============================================================================
// WINDOW STATE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowState {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Accumulated ledger records, keyed (and therefore deduplicated) by id
    pub records: BTreeMap<String, LedgerRecord>,
    /// False once a backward expansion brought in nothing new
    pub has_more: bool,
}

impl WindowState {
    fn empty(range: DateRange) -> Self {
        WindowState {
            start: range.start,
            end: range.end,
            records: BTreeMap::new(),
            has_more: true,
        }
    }

    pub fn range(&self) -> DateRange {
        DateRange {
            start: self.start,
            end: self.end,
        }
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn get(&self, ledger_id: &str) -> Option<&LedgerRecord> {
        self.records.get(ledger_id)
    }

    /// Records in id order
    pub fn ledger_records(&self) -> Vec<LedgerRecord> {
        self.records.values().cloned().collect()
    }

    /// Insert records not already present; returns how many were new
    fn merge(&mut self, fetched: Vec<LedgerRecord>) -> usize {
        let mut added = 0;
        for record in fetched {
            if !self.records.contains_key(&record.id) {
                self.records.insert(record.id.clone(), record);
                added += 1;
            }
        }
        added
    }
}

// ============================================================================
// WINDOW MANAGER
// ============================================================================

pub struct WindowManager {
    ledger: Arc<dyn LedgerClient>,
    state: WindowState,
}

impl WindowManager {
    /// Set the initial range and perform the first fetch
    pub async fn initialize(
        ledger: Arc<dyn LedgerClient>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> SyncResult<Self> {
        let range = DateRange::new(start, end)?;
        let state = Self::fetch_fresh(ledger.as_ref(), range).await?;
        Ok(WindowManager { ledger, state })
    }

    pub fn state(&self) -> &WindowState {
        &self.state
    }

    /// Grow the window one calendar week into the past
    ///
    /// Fetches only the new week `[new_start, old_start)` and merges it in.
    /// Returns the number of records that were not already accumulated.
    pub async fn expand_backward(&mut self) -> SyncResult<usize> {
        let slice = self.state.range().week_before();
        debug!(start = %slice.start, end = %slice.end, "fetching earlier week");

        let fetched = self
            .ledger
            .fetch_ledger_records(slice.start, slice.end)
            .await
            .map_err(|e| SyncError::fetch(Origin::Ledger, e))?;

        let added = self.state.merge(fetched);
        self.state.start = slice.start;
        self.state.has_more = added > 0;

        info!(
            start = %self.state.start,
            end = %self.state.end,
            added,
            total = self.state.record_count(),
            has_more = self.state.has_more,
            "window expanded"
        );
        Ok(added)
    }

    /// Replace the window outright and refetch everything
    pub async fn set_range(&mut self, start: NaiveDate, end: NaiveDate) -> SyncResult<()> {
        let range = DateRange::new(start, end)?;
        self.state = Self::fetch_fresh(self.ledger.as_ref(), range).await?;
        Ok(())
    }

    async fn fetch_fresh(ledger: &dyn LedgerClient, range: DateRange) -> SyncResult<WindowState> {
        let fetched = ledger
            .fetch_ledger_records(range.start, range.end)
            .await
            .map_err(|e| SyncError::fetch(Origin::Ledger, e))?;

        let mut state = WindowState::empty(range);
        let fetched_count = fetched.len();
        state.merge(fetched);

        info!(
            start = %range.start,
            end = %range.end,
            fetched = fetched_count,
            unique = state.record_count(),
            "window loaded"
        );
        Ok(state)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{day, ledger_on};
    use crate::ledger::LedgerExport;
    use async_trait::async_trait;

    fn sample_ledger() -> Arc<dyn LedgerClient> {
        Arc::new(LedgerExport::from_records(vec![
            ledger_on("C1", "Queso Andino", "4.50", day(2025, 3, 10)),
            ledger_on("C2", "Yogur Natural", "2.10", day(2025, 3, 3)),
            ledger_on("C3", "Manteca", "3.00", day(2025, 2, 26)),
            ledger_on("C4", "Leche Entera", "1.20", day(2025, 2, 10)),
        ]))
    }

    struct FailingLedger;

    #[async_trait]
    impl LedgerClient for FailingLedger {
        async fn fetch_ledger_records(
            &self,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> anyhow::Result<Vec<LedgerRecord>> {
            Err(anyhow::anyhow!("503 Service Unavailable"))
        }
    }

    #[tokio::test]
    async fn test_initialize_fetches_range() {
        let window = WindowManager::initialize(sample_ledger(), day(2025, 3, 1), day(2025, 3, 31))
            .await
            .unwrap();

        let ids: Vec<&String> = window.state().records.keys().collect();
        assert_eq!(ids, vec!["C1", "C2"]);
        assert!(window.state().has_more);
    }

    #[tokio::test]
    async fn test_initialize_rejects_inverted_range() {
        let result =
            WindowManager::initialize(sample_ledger(), day(2025, 3, 31), day(2025, 3, 1)).await;
        assert!(matches!(result, Err(SyncError::InvalidRange { .. })));
    }

    #[tokio::test]
    async fn test_expand_backward_is_monotonic() {
        let mut window =
            WindowManager::initialize(sample_ledger(), day(2025, 3, 1), day(2025, 3, 31))
                .await
                .unwrap();
        let before = window.state().records.clone();

        let added = window.expand_backward().await.unwrap();

        assert_eq!(added, 1); // C3 on 2025-02-26
        assert_eq!(window.state().start, day(2025, 2, 22));
        assert_eq!(window.state().end, day(2025, 3, 31));
        for id in before.keys() {
            assert!(window.state().records.contains_key(id));
        }
        assert!(window.state().has_more);
    }

    #[tokio::test]
    async fn test_empty_week_clears_has_more() {
        let mut window =
            WindowManager::initialize(sample_ledger(), day(2025, 3, 1), day(2025, 3, 31))
                .await
                .unwrap();

        window.expand_backward().await.unwrap(); // 02-22..02-28: C3
        let added = window.expand_backward().await.unwrap(); // 02-15..02-21: nothing

        assert_eq!(added, 0);
        assert!(!window.state().has_more);
        assert_eq!(window.state().start, day(2025, 2, 15));
    }

    #[tokio::test]
    async fn test_merge_never_overwrites_existing_record() {
        let mut state = WindowState::empty(DateRange::new(day(2025, 3, 1), day(2025, 3, 31)).unwrap());
        state.merge(vec![ledger_on("C1", "Queso Andino", "4.50", day(2025, 3, 10))]);

        let added = state.merge(vec![ledger_on("C1", "Queso Viejo", "3.99", day(2025, 3, 10))]);

        assert_eq!(added, 0);
        assert_eq!(state.records["C1"].name, "Queso Andino");
    }

    #[tokio::test]
    async fn test_set_range_replaces_window() {
        let mut window =
            WindowManager::initialize(sample_ledger(), day(2025, 3, 1), day(2025, 3, 31))
                .await
                .unwrap();

        window.set_range(day(2025, 2, 1), day(2025, 2, 28)).await.unwrap();

        let ids: Vec<&String> = window.state().records.keys().collect();
        assert_eq!(ids, vec!["C3", "C4"]);
        assert_eq!(window.state().start, day(2025, 2, 1));
    }

    #[tokio::test]
    async fn test_failed_fetch_surfaces_fetch_error() {
        let result =
            WindowManager::initialize(Arc::new(FailingLedger), day(2025, 3, 1), day(2025, 3, 31))
                .await;

        match result {
            Err(SyncError::Fetch { origin, message }) => {
                assert_eq!(origin, Origin::Ledger);
                assert!(message.contains("503"));
            }
            _ => panic!("expected fetch error"),
        }
    }
}
