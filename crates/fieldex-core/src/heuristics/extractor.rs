//! Candidate generation from anchor phrases.

use tracing::trace;

use super::candidate::{Candidate, Method};
use super::patterns::{same_line_pattern, NEXT_LINE_KEYWORDS, SEPARATOR_ONLY};
use super::FieldHints;
use crate::layout::Line;
use crate::normalize::{fold_with_offsets, normalize_for_matching};

/// Propose candidates for `field` by scanning `lines` for its anchors.
///
/// For every line containing an anchor, two strategies run: the value after
/// a separator on the same line, and the value on the following line.
/// Candidates are numbered in emission order.
pub fn extract_candidates(
    lines: &[Line],
    field: &str,
    description: &str,
    hints: &FieldHints<'_>,
) -> Vec<Candidate> {
    let anchors: Vec<(&str, String)> = hints
        .anchors
        .iter()
        .map(|a| (a.as_str(), normalize_for_matching(a)))
        .filter(|(_, norm)| !norm.is_empty())
        .collect();

    if anchors.is_empty() {
        trace!("No anchors for field '{}' ({})", field, description);
        return Vec::new();
    }

    let mut candidates = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let line_norm = normalize_for_matching(&line.text);

        for (anchor, anchor_norm) in &anchors {
            if !line_norm.contains(anchor_norm.as_str()) {
                continue;
            }

            if let Some(value) = same_line_value(&line.text, anchor_norm) {
                trace!("'{}' same-line via '{}': {}", field, anchor, value);
                let seq = candidates.len();
                candidates.push(Candidate::new(value, idx, Method::AnchorSameLine, *anchor, seq));
            }

            if let Some(next) = lines.get(idx + 1) {
                if let Some(value) = next_line_value(&line.text, &line_norm, &next.text, anchor_norm) {
                    trace!("'{}' next-line via '{}': {}", field, anchor, value);
                    let seq = candidates.len();
                    candidates.push(Candidate::new(value, idx + 1, Method::NextLine, *anchor, seq));
                }
            }
        }
    }

    candidates
}

/// Text after `anchor` and a separator, taken from the original line.
fn same_line_value(text: &str, anchor_norm: &str) -> Option<String> {
    let pattern = same_line_pattern(anchor_norm)?;
    let (folded, offsets) = fold_with_offsets(text);

    let caps = pattern.captures(&folded)?;
    let group = caps.get(1)?;
    let value = text[offsets[group.start()]..offsets[group.end()]].trim();

    if value.is_empty() || SEPARATOR_ONLY.is_match(value) {
        None
    } else {
        Some(value.to_string())
    }
}

/// Value on the line following an anchor line without a separator.
fn next_line_value(anchor_line: &str, anchor_line_norm: &str, next_line: &str, anchor_norm: &str) -> Option<String> {
    if anchor_line.contains(':') || anchor_line.contains('-') {
        return None;
    }

    let next = next_line.trim();
    if next.is_empty() {
        return None;
    }

    let tokens: Vec<&str> = next.split_whitespace().collect();
    if tokens.len() == 1 {
        return Some(tokens[0].to_string());
    }

    let anchor_words: Vec<&str> = anchor_line.split_whitespace().collect();
    if anchor_words.len() <= 2 || NEXT_LINE_KEYWORDS.iter().any(|k| anchor_line_norm.contains(k)) {
        return Some(next.to_string());
    }

    let token = anchor_word_position(&anchor_words, anchor_norm)
        .and_then(|pos| tokens.get(pos))
        .unwrap_or(&tokens[0]);
    Some(token.to_string())
}

/// Index of the first word (or word window, for multi-word anchors) that
/// matches the anchor.
fn anchor_word_position(words: &[&str], anchor_norm: &str) -> Option<usize> {
    let width = anchor_norm.split(' ').count();
    let normalized: Vec<String> = words.iter().map(|w| normalize_for_matching(w)).collect();

    if width <= 1 {
        return normalized.iter().position(|w| w.contains(anchor_norm));
    }

    (0..normalized.len().saturating_sub(width - 1))
        .find(|&start| normalized[start..start + width].join(" ") == anchor_norm)
}
