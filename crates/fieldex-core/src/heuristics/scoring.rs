//! Confidence scoring of candidates.

use std::collections::HashSet;

use super::candidate::Candidate;
use super::FieldHints;
use crate::normalize::normalize_for_matching;

/// Region tags on the upper part of a page.
pub const TOP_REGIONS: &[&str] = &["top_left", "top_center", "top_right", "header"];

/// Region tags on the lower part of a page.
pub const BOTTOM_REGIONS: &[&str] = &["bottom_left", "bottom_center", "bottom_right", "footer"];

const TOP_LIMIT: f64 = 0.3;
const BOTTOM_LIMIT: f64 = 0.7;
const NEUTRAL_POSITION: f64 = 0.5;

/// Fill the enum and position sub-scores and recompute totals.
///
/// `y_positions` is indexed by line; pass an empty slice when positions are
/// unknown. Each candidate is scored independently of the others.
pub fn score_candidates(candidates: &mut [Candidate], hints: &FieldHints<'_>, y_positions: &[f64]) {
    let enums: HashSet<String> = hints
        .enums
        .iter()
        .map(|e| normalize_for_matching(e))
        .collect();

    for candidate in candidates.iter_mut() {
        candidate.enum_score = if enums.contains(&normalize_for_matching(&candidate.value)) {
            1.0
        } else {
            0.0
        };
        candidate.position_score = position_score(hints.region_hint, y_positions.get(candidate.line_idx).copied());
        candidate.recompute_total();
    }
}

/// Plausibility of a line at `y_rel` given the field's region hints.
pub fn position_score(region_hint: &[String], y_rel: Option<f64>) -> f64 {
    let Some(y) = y_rel else {
        return NEUTRAL_POSITION;
    };

    let top = region_hint.iter().any(|r| TOP_REGIONS.contains(&r.as_str()));
    let bottom = region_hint.iter().any(|r| BOTTOM_REGIONS.contains(&r.as_str()));

    if (top && y < TOP_LIMIT) || (bottom && y > BOTTOM_LIMIT) {
        1.0
    } else {
        NEUTRAL_POSITION
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heuristics::candidate::Method;

    fn strings(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn candidate(value: &str, line_idx: usize, sequence: usize) -> Candidate {
        Candidate::new(value, line_idx, Method::AnchorSameLine, "a", sequence)
    }

    #[test]
    fn test_enum_membership_is_normalized() {
        let enums = strings(&["ATIVO", "SUSPENSO"]);
        let hints = FieldHints {
            enums: &enums,
            ..FieldHints::default()
        };
        let mut candidates = vec![candidate("ativo", 0, 0), candidate("Inativo", 0, 1)];

        score_candidates(&mut candidates, &hints, &[]);

        assert_eq!(candidates[0].enum_score, 1.0);
        assert_eq!(candidates[1].enum_score, 0.0);
    }

    #[test]
    fn test_no_enums_scores_zero() {
        let mut candidates = vec![candidate("ATIVO", 0, 0)];
        score_candidates(&mut candidates, &FieldHints::default(), &[]);
        assert_eq!(candidates[0].enum_score, 0.0);
        assert_eq!(candidates[0].position_score, 0.5);
    }

    #[test]
    fn test_position_score_regions() {
        let top = strings(&["top_left"]);
        let bottom = strings(&["footer"]);
        let both = strings(&["middle_left", "header", "bottom_right"]);

        assert_eq!(position_score(&top, Some(0.1)), 1.0);
        assert_eq!(position_score(&top, Some(0.5)), 0.5);
        assert_eq!(position_score(&bottom, Some(0.9)), 1.0);
        assert_eq!(position_score(&bottom, Some(0.2)), 0.5);
        assert_eq!(position_score(&both, Some(0.05)), 1.0);
        assert_eq!(position_score(&both, Some(0.95)), 1.0);
        assert_eq!(position_score(&[], Some(0.1)), 0.5);
        assert_eq!(position_score(&top, None), 0.5);
    }

    #[test]
    fn test_total_uses_fixed_weights() {
        let enums = strings(&["SP"]);
        let region = strings(&["top_right"]);
        let hints = FieldHints {
            enums: &enums,
            region_hint: &region,
            ..FieldHints::default()
        };
        let mut candidates = vec![Candidate::new("SP", 1, Method::NextLine, "UF", 0)];

        score_candidates(&mut candidates, &hints, &[0.05, 0.1]);

        let c = &candidates[0];
        assert_eq!(c.position_score, 1.0);
        assert!((c.total_score - (0.5 * 0.9 + 0.3 * 1.0 + 0.2 * 1.0)).abs() < 1e-9);
    }

    #[test]
    fn test_scores_do_not_depend_on_order() {
        let enums = strings(&["ATIVO"]);
        let region = strings(&["header"]);
        let hints = FieldHints {
            enums: &enums,
            region_hint: &region,
            ..FieldHints::default()
        };
        let y = [0.1, 0.5, 0.9];

        let mut forward = vec![candidate("ativo", 0, 0), candidate("x", 1, 1), candidate("y", 2, 2)];
        let mut reversed: Vec<Candidate> = forward.iter().rev().cloned().collect();

        score_candidates(&mut forward, &hints, &y);
        score_candidates(&mut reversed, &hints, &y);
        reversed.reverse();

        assert_eq!(forward, reversed);
    }
}
