//! Candidate values proposed by the extractor.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Weight of the anchor sub-score in the total.
pub const ANCHOR_WEIGHT: f64 = 0.5;
/// Weight of the position sub-score in the total.
pub const POSITION_WEIGHT: f64 = 0.3;
/// Weight of the enum sub-score in the total.
pub const ENUM_WEIGHT: f64 = 0.2;

/// How a candidate was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// Value follows the anchor and a separator on the same line.
    AnchorSameLine,
    /// Value sits on the line after the anchor.
    NextLine,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::AnchorSameLine => "anchor_same_line",
            Method::NextLine => "next_line",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provisional value for one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Raw value captured from the line text.
    pub value: String,
    /// Index of the line the value was taken from.
    pub line_idx: usize,
    /// Extraction strategy.
    pub method: Method,
    /// Anchor that produced this candidate.
    pub anchor_used: String,
    /// Emission order, used to break score ties.
    pub sequence: usize,
    /// Anchor quality in [0, 1].
    pub anchor_score: f64,
    /// Positional plausibility in [0, 1].
    pub position_score: f64,
    /// Enumerated-value membership, 0 or 1.
    pub enum_score: f64,
    /// Weighted sum of the sub-scores.
    pub total_score: f64,
}

impl Candidate {
    /// Create an unscored candidate.
    pub fn new(
        value: impl Into<String>,
        line_idx: usize,
        method: Method,
        anchor_used: impl Into<String>,
        sequence: usize,
    ) -> Self {
        let anchor_score = match method {
            Method::AnchorSameLine => 1.0,
            Method::NextLine => 0.9,
        };
        let mut candidate = Self {
            value: value.into(),
            line_idx,
            method,
            anchor_used: anchor_used.into(),
            sequence,
            anchor_score,
            position_score: 0.0,
            enum_score: 0.0,
            total_score: 0.0,
        };
        candidate.recompute_total();
        candidate
    }

    /// Recompute `total_score` from the sub-scores.
    pub fn recompute_total(&mut self) {
        self.total_score = ANCHOR_WEIGHT * self.anchor_score
            + POSITION_WEIGHT * self.position_score
            + ENUM_WEIGHT * self.enum_score;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchor_score_by_method() {
        let same = Candidate::new("x", 0, Method::AnchorSameLine, "a", 0);
        let next = Candidate::new("x", 1, Method::NextLine, "a", 1);
        assert_eq!(same.anchor_score, 1.0);
        assert_eq!(next.anchor_score, 0.9);
        assert!((same.total_score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_total_is_weighted_sum() {
        let mut c = Candidate::new("x", 0, Method::NextLine, "a", 0);
        c.position_score = 0.5;
        c.enum_score = 1.0;
        c.recompute_total();
        assert!((c.total_score - (0.5 * 0.9 + 0.3 * 0.5 + 0.2 * 1.0)).abs() < 1e-9);
    }

    #[test]
    fn test_method_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Method::AnchorSameLine).unwrap(),
            "\"anchor_same_line\""
        );
        assert_eq!(Method::NextLine.to_string(), "next_line");
    }
}
