//! Anchor-based heuristics: candidate extraction, scoring and selection.

pub mod candidate;
pub mod extractor;
pub mod patterns;
pub mod scoring;
pub mod selection;

pub use candidate::{Candidate, Method, ANCHOR_WEIGHT, ENUM_WEIGHT, POSITION_WEIGHT};
pub use extractor::extract_candidates;
pub use scoring::score_candidates;
pub use selection::{select_candidates, Selection};

use tracing::debug;

use crate::layout::Line;

/// Below this total a candidate is never selected.
pub const UNCERTAIN_THRESHOLD: f64 = 0.6;

/// At or above this total a selected candidate is accepted without fallback.
pub const ACCEPT_THRESHOLD: f64 = 0.8;

/// Default number of ranked candidates kept per field.
pub const DEFAULT_TOP_K: usize = 3;

/// Knowledge the heuristics use for one field.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldHints<'a> {
    /// Anchor phrases.
    pub anchors: &'a [String],
    /// Accepted enumerated values.
    pub enums: &'a [String],
    /// Region tags where the value usually sits.
    pub region_hint: &'a [String],
}

/// Runs extract, score and select for single fields.
pub struct FieldMatcher {
    top_k: usize,
}

impl FieldMatcher {
    /// Create a matcher keeping the default number of candidates.
    pub fn new() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Set how many ranked candidates to keep.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Propose, score and rank candidates for `field`.
    ///
    /// `y_positions` holds the `y_rel` of every line, or nothing when
    /// positions are unknown.
    pub fn match_field(
        &self,
        lines: &[Line],
        y_positions: &[f64],
        field: &str,
        description: &str,
        hints: &FieldHints<'_>,
    ) -> Selection {
        let mut candidates = extract_candidates(lines, field, description, hints);
        score_candidates(&mut candidates, hints, y_positions);
        let selection = select_candidates(candidates, self.top_k);

        debug!(
            "Field '{}': {} candidates, best={:?}",
            field,
            selection.top.len(),
            selection.best.as_ref().map(|c| c.total_score)
        );

        selection
    }
}

impl Default for FieldMatcher {
    fn default() -> Self {
        Self::new()
    }
}
