// 🧮 Reconciliation View - The in-memory picture the operator works from
//
// reconcile() is the single source of truth:
//   (WindowState, LocalRecords) -> ClassificationSets
//
// After an operation the executor patches the view for just the one ledger
// record it touched (reclassify). That shortcut must always agree with a full
// reconcile() of the patched inputs; the tests below check it.

use crate::classifier::{link_index, Bucket, ClassificationSets, Classifier};
use crate::matcher::{CandidateMatch, Matcher};
use crate::records::{LedgerRecord, LocalRecord};
use crate::window::WindowState;

/// Pure classification of the accumulated window against the catalog
pub fn reconcile(classifier: &Classifier, window: &WindowState, locals: &[LocalRecord]) -> ClassificationSets {
    classifier.classify(&window.ledger_records(), locals)
}

#[derive(Debug, Clone, Default)]
pub struct CatalogView {
    /// Resident catalog records, ordered by id
    pub locals: Vec<LocalRecord>,
    pub sets: ClassificationSets,
    /// One suggestion per unlinked record at most
    pub candidates: Vec<CandidateMatch>,
}

impl CatalogView {
    /// Full recompute from scratch
    pub fn build(
        classifier: &Classifier,
        matcher: &Matcher,
        window: &WindowState,
        mut locals: Vec<LocalRecord>,
    ) -> Self {
        locals.sort_by(|a, b| a.id.cmp(&b.id));
        let sets = reconcile(classifier, window, &locals);
        let candidates = matcher.propose(&sets.unlinked, &locals);
        CatalogView {
            locals,
            sets,
            candidates,
        }
    }

    pub fn local(&self, id: &str) -> Option<&LocalRecord> {
        self.locals.iter().find(|l| l.id == id)
    }

    /// Catalog record currently holding the link to `ledger_id`, if any
    pub fn linked_local(&self, ledger_id: &str) -> Option<&LocalRecord> {
        link_index(&self.locals).get(ledger_id).copied()
    }

    pub fn candidate_for(&self, ledger_id: &str) -> Option<&CandidateMatch> {
        self.candidates.iter().find(|c| c.ledger_id == ledger_id)
    }

    /// Insert or replace a catalog record (keeps id order)
    pub(crate) fn upsert_local(&mut self, record: LocalRecord) {
        match self.locals.binary_search_by(|l| l.id.cmp(&record.id)) {
            Ok(pos) => self.locals[pos] = record,
            Err(pos) => self.locals.insert(pos, record),
        }
    }

    /// Move one ledger record to the bucket its current link dictates
    ///
    /// Returns (previous bucket, new bucket).
    pub(crate) fn reclassify(
        &mut self,
        classifier: &Classifier,
        ledger: &LedgerRecord,
    ) -> (Option<Bucket>, Bucket) {
        let from = self.sets.remove(&ledger.id);
        let local = self.linked_local(&ledger.id).cloned();
        let to = self.sets.place(classifier.classify_pair(ledger, local.as_ref()));
        (from, to)
    }

    pub(crate) fn refresh_candidates(&mut self, matcher: &Matcher) {
        self.candidates = matcher.propose(&self.sets.unlinked, &self.locals);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::DateRange;
    use crate::fixtures::{day, ledger, local};
    use crate::records::{LocalRecordPatch, RecordStatus};
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use std::collections::BTreeMap;

    fn window_of(records: Vec<LedgerRecord>) -> WindowState {
        let range = DateRange::new(day(2025, 3, 1), day(2025, 3, 31)).unwrap();
        WindowState {
            start: range.start,
            end: range.end,
            records: records.into_iter().map(|r| (r.id.clone(), r)).collect::<BTreeMap<_, _>>(),
            has_more: true,
        }
    }

    #[test]
    fn test_build_annotates_unlinked_with_candidates() {
        let window = window_of(vec![ledger("C1", "Queso Andino", "4.50")]);
        let locals = vec![local("L1", "Queso Andino Premium", "5.00", None)];

        let view = CatalogView::build(&Classifier::new(), &Matcher::new(), &window, locals);

        assert_eq!(view.sets.unlinked.len(), 1);
        assert_eq!(view.candidate_for("C1").map(|c| c.local_id.as_str()), Some("L1"));
    }

    #[test]
    fn test_reclassify_after_link_matches_full_recompute() {
        let classifier = Classifier::new();
        let matcher = Matcher::new();
        let window = window_of(vec![
            ledger("C1", "Queso Andino", "4.50"),
            ledger("C2", "Yogur", "2.00"),
        ]);
        let locals = vec![local("L1", "Queso Andino Premium", "5.00", None)];
        let mut view = CatalogView::build(&classifier, &matcher, &window, locals);

        let mut linked = view.local("L1").unwrap().clone();
        LocalRecordPatch::link_to("C1").apply_to(&mut linked);
        view.upsert_local(linked);
        let (from, to) = view.reclassify(&classifier, &window.records["C1"]);
        view.refresh_candidates(&matcher);

        assert_eq!(from, Some(Bucket::Unlinked));
        assert_eq!(to, Bucket::Diff);
        assert_eq!(view.sets, reconcile(&classifier, &window, &view.locals));
        assert!(view.candidate_for("C1").is_none());
    }

    /// Applies one operation the way the executor would, if its preconditions hold
    fn apply(view: &mut CatalogView, ledger: &LedgerRecord, local_idx: usize, kind: u8, seq: usize) -> bool {
        let patched = match kind {
            0 => {
                if view.linked_local(&ledger.id).is_some() {
                    return false;
                }
                let Some(target) = view.locals.get(local_idx % view.locals.len().max(1)) else {
                    return false;
                };
                if target.is_linked() {
                    return false;
                }
                let mut target = target.clone();
                LocalRecordPatch::link_to(&ledger.id).apply_to(&mut target);
                target
            }
            1 => {
                let Some(target) = view.linked_local(&ledger.id) else {
                    return false;
                };
                let mut target = target.clone();
                LocalRecordPatch::values_from(ledger).apply_to(&mut target);
                target
            }
            _ => LocalRecord {
                id: format!("N{:03}", seq),
                name: ledger.name.clone(),
                price: ledger.price,
                status: ledger.status,
                ledger_id: Some(ledger.id.clone()),
                category_id: Some("cat".to_string()),
            },
        };
        view.upsert_local(patched);
        true
    }

    proptest! {
        #[test]
        fn prop_patched_view_equals_full_recompute(
            ledger_rows in prop::collection::vec((0i64..400, any::<bool>()), 1..8),
            local_rows in prop::collection::vec((0u8..8, 0i64..400, prop::option::of(0u8..8)), 0..8),
            ops in prop::collection::vec((0u8..3, 0usize..8, 0usize..8), 0..12),
        ) {
            let classifier = Classifier::new();
            let matcher = Matcher::new();

            let ledger_records: Vec<LedgerRecord> = ledger_rows
                .iter()
                .enumerate()
                .map(|(i, (cents, active))| {
                    let mut r = ledger(&format!("C{}", i), &format!("Item {}", i % 3), "0");
                    r.price = Decimal::new(*cents, 2);
                    r.status = if *active { RecordStatus::Active } else { RecordStatus::Inactive };
                    r
                })
                .collect();
            let locals: Vec<LocalRecord> = local_rows
                .iter()
                .enumerate()
                .map(|(i, (n, cents, link))| {
                    let link = link.map(|l| format!("C{}", l));
                    let mut r = local(&format!("L{}", i), &format!("Item {}", n % 3), "0", link.as_deref());
                    r.price = Decimal::new(*cents, 2);
                    r
                })
                .collect();

            let window = window_of(ledger_records.clone());
            let mut view = CatalogView::build(&classifier, &matcher, &window, locals);

            for (seq, (kind, ledger_idx, local_idx)) in ops.into_iter().enumerate() {
                let record = &ledger_records[ledger_idx % ledger_records.len()];
                if apply(&mut view, record, local_idx, kind, seq) {
                    view.reclassify(&classifier, record);
                    view.refresh_candidates(&matcher);
                }

                let fresh = CatalogView::build(&classifier, &matcher, &window, view.locals.clone());
                prop_assert_eq!(&view.sets, &fresh.sets);
                prop_assert_eq!(&view.candidates, &fresh.candidates);
            }
        }
    }
}
