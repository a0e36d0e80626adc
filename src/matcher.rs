// 🔍 Matcher - Suggest which catalog record an unlinked ledger record probably is
//
// Purely advisory: nothing here is persisted, and the operator still has to
// confirm a Link. Only catalog records that are not linked yet are considered
// (links are one-to-one).
//
// Score = max(normalized Levenshtein, token containment)
//   "queso andino" vs "queso andino premium" → containment 0.85

use crate::records::{normalize_name, LedgerRecord, LocalRecord};
use serde::{Deserialize, Serialize};
use strsim::normalized_levenshtein;

/// Score given when every word of the shorter name appears in the longer one
pub const CONTAINMENT_SCORE: f64 = 0.85;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateMatch {
    pub ledger_id: String,
    pub local_id: String,
    pub local_name: String,
    /// Similarity (0.0 - 1.0)
    pub score: f64,
}

pub struct Matcher {
    /// Minimum similarity for a suggestion (default: 0.60)
    pub threshold: f64,
}

impl Matcher {
    pub fn new() -> Self {
        Matcher { threshold: 0.60 }
    }

    pub fn with_threshold(threshold: f64) -> Self {
        Matcher {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    /// One candidate (at most) per unlinked ledger record, in input order
    pub fn propose(&self, unlinked: &[LedgerRecord], locals: &[LocalRecord]) -> Vec<CandidateMatch> {
        let mut free: Vec<&LocalRecord> = locals.iter().filter(|l| !l.is_linked()).collect();
        free.sort_by(|a, b| a.id.cmp(&b.id));

        unlinked
            .iter()
            .filter_map(|record| self.best_candidate(record, &free))
            .collect()
    }

    /// Highest score at or above threshold; ties go to the smaller local id
    pub fn best_candidate(&self, record: &LedgerRecord, free: &[&LocalRecord]) -> Option<CandidateMatch> {
        let target = normalize_name(&record.name);
        let mut best: Option<(&LocalRecord, f64)> = None;

        for local in free {
            let score = similarity(&target, &normalize_name(&local.name));
            if score < self.threshold {
                continue;
            }
            let better = match best {
                None => true,
                Some((current, best_score)) => {
                    score > best_score || (score == best_score && local.id < current.id)
                }
            };
            if better {
                best = Some((local, score));
            }
        }

        best.map(|(local, score)| CandidateMatch {
            ledger_id: record.id.clone(),
            local_id: local.id.clone(),
            local_name: local.name.clone(),
            score,
        })
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Similarity of two already-normalized names
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let edit = normalized_levenshtein(a, b);

    let (shorter, longer) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let longer_words: Vec<&str> = longer.split(' ').collect();
    let contained = shorter.split(' ').all(|w| longer_words.contains(&w));

    if contained {
        edit.max(CONTAINMENT_SCORE)
    } else {
        edit
    }
}

// ============================================================================
// TESTS
// ============================================================================
