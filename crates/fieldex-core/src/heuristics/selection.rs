//! Ranking, deduplication and the uncertainty gate.

use std::collections::HashSet;

use super::candidate::Candidate;
use super::UNCERTAIN_THRESHOLD;
use crate::normalize::normalize_for_matching;

/// Ranked candidates for one field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    /// Up to `k` deduplicated candidates, best first.
    pub top: Vec<Candidate>,
    /// Top candidate when its total clears the uncertainty threshold.
    pub best: Option<Candidate>,
}

impl Selection {
    /// The best candidate if it also clears `threshold`.
    pub fn accepted(&self, threshold: f64) -> Option<&Candidate> {
        self.best.as_ref().filter(|c| c.total_score >= threshold)
    }

    /// Values of the ranked candidates.
    pub fn top_values(&self) -> Vec<String> {
        self.top.iter().map(|c| c.value.clone()).collect()
    }
}

/// Rank `candidates` by total score, ties by emission order, drop values
/// that normalize identically, and keep the first `k`.
pub fn select_candidates(mut candidates: Vec<Candidate>, k: usize) -> Selection {
    candidates.sort_by(|a, b| {
        b.total_score
            .total_cmp(&a.total_score)
            .then(a.sequence.cmp(&b.sequence))
    });

    let mut seen = HashSet::new();
    candidates.retain(|c| seen.insert(normalize_for_matching(&c.value)));

    candidates.truncate(k);

    let best = candidates
        .first()
        .filter(|c| c.total_score >= UNCERTAIN_THRESHOLD)
        .cloned();

    Selection {
        top: candidates,
        best,
    }
}
