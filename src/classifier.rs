// ⚖️ Classifier - Where does each ledger record stand against the catalog?
//
// Every ledger record lands in exactly one bucket:
//   Unlinked - no catalog record carries its ledger id
//   Diff     - linked, but name / price / status disagree
//   Synced   - linked and materially identical
//
// classify() is a pure function of its two inputs. Output order is by ledger
// id, so the result does not depend on the order records were fetched in.

use crate::records::{normalize_name, LedgerRecord, LocalRecord};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

// ============================================================================
// BUCKETS & PAIRS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Unlinked,
    Diff,
    Synced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Name,
    Price,
    Status,
}

/// One disagreeing field, rendered for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDifference {
    pub field: Field,
    pub ledger_value: String,
    pub local_value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffPair {
    pub ledger: LedgerRecord,
    pub local: LocalRecord,
    pub differences: Vec<FieldDifference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncedPair {
    pub ledger: LedgerRecord,
    pub local: LocalRecord,
}

// ============================================================================
// CLASSIFICATION SETS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationSets {
    pub unlinked: Vec<LedgerRecord>,
    pub diff: Vec<DiffPair>,
    pub synced: Vec<SyncedPair>,
}

impl ClassificationSets {
    pub fn total(&self) -> usize {
        self.unlinked.len() + self.diff.len() + self.synced.len()
    }

    pub fn bucket_of(&self, ledger_id: &str) -> Option<Bucket> {
        if self.unlinked.iter().any(|r| r.id == ledger_id) {
            Some(Bucket::Unlinked)
        } else if self.diff.iter().any(|p| p.ledger.id == ledger_id) {
            Some(Bucket::Diff)
        } else if self.synced.iter().any(|p| p.ledger.id == ledger_id) {
            Some(Bucket::Synced)
        } else {
            None
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} ledger records: {} unlinked, {} with differences, {} synced",
            self.total(),
            self.unlinked.len(),
            self.diff.len(),
            self.synced.len()
        )
    }

    /// Drop a ledger record from whichever bucket holds it
    pub(crate) fn remove(&mut self, ledger_id: &str) -> Option<Bucket> {
        if let Some(pos) = self.unlinked.iter().position(|r| r.id == ledger_id) {
            self.unlinked.remove(pos);
            return Some(Bucket::Unlinked);
        }
        if let Some(pos) = self.diff.iter().position(|p| p.ledger.id == ledger_id) {
            self.diff.remove(pos);
            return Some(Bucket::Diff);
        }
        if let Some(pos) = self.synced.iter().position(|p| p.ledger.id == ledger_id) {
            self.synced.remove(pos);
            return Some(Bucket::Synced);
        }
        None
    }

    /// Place a classified record, keeping every bucket ordered by ledger id
    pub(crate) fn place(&mut self, outcome: PairOutcome) -> Bucket {
        match outcome {
            PairOutcome::Unlinked(ledger) => {
                let pos = self
                    .unlinked
                    .binary_search_by(|r| r.id.cmp(&ledger.id))
                    .unwrap_or_else(|p| p);
                self.unlinked.insert(pos, ledger);
                Bucket::Unlinked
            }
            PairOutcome::Diff(pair) => {
                let pos = self
                    .diff
                    .binary_search_by(|p| p.ledger.id.cmp(&pair.ledger.id))
                    .unwrap_or_else(|p| p);
                self.diff.insert(pos, pair);
                Bucket::Diff
            }
            PairOutcome::Synced(pair) => {
                let pos = self
                    .synced
                    .binary_search_by(|p| p.ledger.id.cmp(&pair.ledger.id))
                    .unwrap_or_else(|p| p);
                self.synced.insert(pos, pair);
                Bucket::Synced
            }
        }
    }
}

/// Result of classifying a single ledger record
#[derive(Debug, Clone, PartialEq)]
pub enum PairOutcome {
    Unlinked(LedgerRecord),
    Diff(DiffPair),
    Synced(SyncedPair),
}

// ============================================================================
// CLASSIFIER
// ============================================================================

pub struct Classifier {
    /// Absolute price tolerance (default: 0.01, inclusive)
    pub price_tolerance: Decimal,
}

impl Classifier {
    pub fn new() -> Self {
        Classifier {
            price_tolerance: Decimal::new(1, 2),
        }
    }

    pub fn with_tolerance(price_tolerance: Decimal) -> Self {
        Classifier {
            price_tolerance: price_tolerance.abs(),
        }
    }

    /// Partition `ledger` relative to `locals`
    ///
    /// Input order never matters: repeated ledger ids keep the earliest
    /// created record (remaining ties broken field by field).
    pub fn classify(&self, ledger: &[LedgerRecord], locals: &[LocalRecord]) -> ClassificationSets {
        let links = link_index(locals);

        let mut ordered: Vec<&LedgerRecord> = ledger.iter().collect();
        ordered.sort_by(|a, b| canonical_order(a, b));
        ordered.dedup_by(|a, b| a.id == b.id);

        let mut sets = ClassificationSets::default();
        for record in ordered {
            let local = links.get(record.id.as_str()).copied();
            match self.classify_pair(record, local) {
                PairOutcome::Unlinked(r) => sets.unlinked.push(r),
                PairOutcome::Diff(p) => sets.diff.push(p),
                PairOutcome::Synced(p) => sets.synced.push(p),
            }
        }

        sets
    }

    /// Classify one ledger record given the catalog record linked to it (if any)
    pub fn classify_pair(&self, ledger: &LedgerRecord, local: Option<&LocalRecord>) -> PairOutcome {
        let Some(local) = local else {
            return PairOutcome::Unlinked(ledger.clone());
        };

        let differences = self.compare(ledger, local);
        if differences.is_empty() {
            PairOutcome::Synced(SyncedPair {
                ledger: ledger.clone(),
                local: local.clone(),
            })
        } else {
            PairOutcome::Diff(DiffPair {
                ledger: ledger.clone(),
                local: local.clone(),
                differences,
            })
        }
    }

    /// Fields on which the pair materially disagree
    pub fn compare(&self, ledger: &LedgerRecord, local: &LocalRecord) -> Vec<FieldDifference> {
        let mut differences = Vec::new();

        if normalize_name(&ledger.name) != normalize_name(&local.name) {
            differences.push(FieldDifference {
                field: Field::Name,
                ledger_value: ledger.name.clone(),
                local_value: local.name.clone(),
            });
        }

        if !self.prices_match(ledger.price, local.price) {
            differences.push(FieldDifference {
                field: Field::Price,
                ledger_value: ledger.price.to_string(),
                local_value: local.price.to_string(),
            });
        }

        if ledger.status != local.status {
            differences.push(FieldDifference {
                field: Field::Status,
                ledger_value: ledger.status.to_string(),
                local_value: local.status.to_string(),
            });
        }

        differences
    }

    pub fn prices_match(&self, a: Decimal, b: Decimal) -> bool {
        (a - b).abs() <= self.price_tolerance
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Map ledger id → linked catalog record
///
/// If several catalog records claim the same ledger id, the smallest local id
/// wins so the lookup does not depend on list order.
/// Total order on ledger records, id first
fn canonical_order(a: &LedgerRecord, b: &LedgerRecord) -> Ordering {
    a.id.cmp(&b.id)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.code.cmp(&b.code))
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.price.cmp(&b.price))
        .then_with(|| a.stock_quantity.cmp(&b.stock_quantity))
        .then_with(|| a.status.as_str().cmp(b.status.as_str()))
}

pub fn link_index(locals: &[LocalRecord]) -> HashMap<&str, &LocalRecord> {
    let mut index: HashMap<&str, &LocalRecord> = HashMap::new();
    for local in locals {
        if let Some(ledger_id) = local.ledger_id.as_deref() {
            index
                .entry(ledger_id)
                .and_modify(|current| {
                    if local.id < current.id {
                        *current = local;
                    }
                })
                .or_insert(local);
        }
    }
    index
}

// ============================================================================
// TESTS
// ============================================================================
