//! Knowledge base learning from run feedback.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, trace};

use fieldex_resolver::ResolverMetadata;

use super::region::{categorize_position, dominant_region, RESOLVER_REGIONS};
use super::KnowledgeBase;
use crate::heuristics::Method;
use crate::models::output::FieldValues;
use crate::models::Schema;
use crate::normalize::normalize_for_matching;

/// Longest line prefix (in words) learned as an anchor.
const MAX_PREFIX_WORDS: usize = 3;

/// How the heuristics settled a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Anchor that produced the accepted candidate.
    pub anchor_used: String,
    /// Extraction strategy.
    pub method: Method,
    /// Raw text of the candidate's line.
    pub line_text: String,
    /// Total score of the accepted candidate.
    pub score: f64,
    /// `(x_rel, y_rel)` of the candidate's line, when known.
    pub position: Option<(f64, f64)>,
}

/// Everything a run teaches the knowledge base.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Feedback {
    /// Final value per field.
    pub results: FieldValues,
    /// Heuristic evidence for accepted fields.
    pub evidence: BTreeMap<String, Evidence>,
    /// Metadata reported by the resolver.
    pub llm_metadata: BTreeMap<String, ResolverMetadata>,
}

impl Feedback {
    /// True when there is nothing to learn from.
    pub fn is_empty(&self) -> bool {
        self.evidence.is_empty() && self.llm_metadata.is_empty()
    }

    fn final_value(&self, field: &str) -> Option<&str> {
        self.results
            .get(field)
            .and_then(|v| v.as_deref())
            .filter(|v| !v.trim().is_empty())
    }
}

/// Anchor seeds derived from a field name, normalized and deduplicated.
pub fn anchor_variants(field: &str) -> Vec<String> {
    let base = field.replace('_', " ").trim().to_string();
    let variants = [
        base.clone(),
        base.to_lowercase(),
        base.to_uppercase(),
        title_case(&base),
        base.replace(' ', ""),
        base.replace(' ', "_"),
        base.replace(' ', "-"),
    ];

    let mut anchors: Vec<String> = Vec::new();
    for variant in variants {
        let normalized = normalize_for_matching(&variant);
        if !normalized.is_empty() && !anchors.contains(&normalized) {
            anchors.push(normalized);
        }
    }
    anchors
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

/// Append `candidate` (normalized) unless it is empty, already present
/// under normalization, or equal to `value`.
fn push_anchor(list: &mut Vec<String>, candidate: &str, value: &str) -> bool {
    let normalized = normalize_for_matching(candidate);
    if normalized.is_empty() || normalized == value {
        return false;
    }
    push_unique(list, normalized)
}

/// Run `push` on the list for `field`, creating the entry only if it adds something.
fn push_entry(
    map: &mut BTreeMap<String, Vec<String>>,
    field: &str,
    push: impl FnOnce(&mut Vec<String>) -> bool,
) -> bool {
    if let Some(list) = map.get_mut(field) {
        return push(list);
    }
    let mut list = Vec::new();
    let added = push(&mut list);
    if added {
        map.insert(field.to_string(), list);
    }
    added
}

fn push_unique(list: &mut Vec<String>, normalized: String) -> bool {
    if list.iter().any(|existing| normalize_for_matching(existing) == normalized) {
        return false;
    }
    list.push(normalized);
    true
}

impl KnowledgeBase {
    /// Seed anchors for schema fields that have none.
    ///
    /// Returns whether anything was added.
    pub fn seed_from_schema(&mut self, schema: &Schema) -> bool {
        let mut changed = false;
        for field in schema.keys() {
            let missing = self.anchors.get(field).is_none_or(|a| a.is_empty());
            if missing {
                let seeds = anchor_variants(field);
                if !seeds.is_empty() {
                    trace!("Seeding {} anchors for '{}'", seeds.len(), field);
                    self.anchors.insert(field.clone(), seeds);
                    changed = true;
                }
            }
        }
        changed
    }

    /// Apply one run's feedback. Returns whether anything changed.
    pub fn learn(&mut self, feedback: &Feedback) -> bool {
        let mut changed = false;

        for (field, evidence) in &feedback.evidence {
            let Some(value) = feedback.final_value(field) else {
                continue;
            };
            let value_norm = normalize_for_matching(value);

            if let Some((x_rel, y_rel)) = evidence.position {
                changed |= self.observe_region(field, x_rel, y_rel);
            }

            if push_entry(&mut self.anchors, field, |anchors| {
                push_anchor(anchors, &evidence.anchor_used, &value_norm)
            }) {
                debug!("Learned anchor '{}' for '{}'", evidence.anchor_used, field);
                changed = true;
            }

            if let Some((prefix, rest)) = evidence.line_text.split_once(':') {
                let prefix = prefix.trim();
                let words = prefix.split_whitespace().count();
                if (1..=MAX_PREFIX_WORDS).contains(&words)
                    && push_entry(&mut self.anchors, field, |anchors| {
                        push_anchor(anchors, prefix, &normalize_for_matching(rest))
                    })
                {
                    debug!("Learned line prefix '{}' as anchor for '{}'", prefix, field);
                    changed = true;
                }
            }
        }

        for (field, metadata) in &feedback.llm_metadata {
            let Some(value) = feedback.final_value(field) else {
                continue;
            };
            let value_norm = normalize_for_matching(value);

            for anchor in &metadata.anchors {
                changed |= push_entry(&mut self.anchors, field, |anchors| {
                    push_anchor(anchors, anchor, &value_norm)
                });
            }

            for item in &metadata.enums {
                let normalized = normalize_for_matching(item);
                if !normalized.is_empty() {
                    changed |= push_entry(&mut self.enums, field, |enums| {
                        push_unique(enums, normalized)
                    });
                }
            }

            if let Some(region) = metadata.region.as_deref().map(str::trim) {
                if RESOLVER_REGIONS.contains(&region) {
                    let hints = self.region_hint.entry(field.clone()).or_default();
                    if !hints.iter().any(|h| h == region) {
                        hints.push(region.to_string());
                        changed = true;
                    }
                }
            }
        }

        changed
    }

    /// Count one observation and promote a dominant region to a hint.
    fn observe_region(&mut self, field: &str, x_rel: f64, y_rel: f64) -> bool {
        let region = categorize_position(x_rel, y_rel);
        let counts = self.region_counts.entry(field.to_string()).or_default();
        *counts.entry(region.to_string()).or_insert(0) += 1;

        if let Some(dominant) = dominant_region(counts) {
            let hints = self.region_hint.entry(field.to_string()).or_default();
            if !hints.iter().any(|h| h == dominant) {
                debug!("Region '{}' is now dominant for '{}'", dominant, field);
                hints.push(dominant.to_string());
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn evidence(anchor: &str, line: &str, position: Option<(f64, f64)>) -> Evidence {
        Evidence {
            anchor_used: anchor.to_string(),
            method: Method::AnchorSameLine,
            line_text: line.to_string(),
            score: 0.95,
            position,
        }
    }

    fn feedback(field: &str, value: Option<&str>, ev: Option<Evidence>) -> Feedback {
        let mut fb = Feedback::default();
        fb.results.insert(field.to_string(), value.map(str::to_string));
        if let Some(ev) = ev {
            fb.evidence.insert(field.to_string(), ev);
        }
        fb
    }

    #[test]
    fn test_anchor_variants() {
        assert_eq!(
            anchor_variants("nome_completo"),
            vec!["nome completo", "nomecompleto", "nome_completo", "nome-completo"]
        );
        assert_eq!(anchor_variants("UF"), vec!["uf"]);
        assert!(anchor_variants("__").is_empty());
    }

    #[test]
    fn test_seed_only_missing_fields() {
        let mut kb = KnowledgeBase::new();
        kb.anchors.insert("uf".into(), vec!["estado".into()]);

        let schema: Schema = [("uf", "Estado"), ("nome", "Nome")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        assert!(kb.seed_from_schema(&schema));
        assert_eq!(kb.anchors["uf"], vec!["estado"]);
        assert_eq!(kb.anchors["nome"], vec!["nome"]);
        assert!(kb.enums.is_empty());
        assert!(!kb.seed_from_schema(&schema));
    }

    #[test]
    fn test_region_learning_promotes_dominant() {
        let mut kb = KnowledgeBase::new();
        kb.anchors.insert("nome".into(), vec!["nome".into()]);

        let fb = feedback("nome", Some("Maria"), Some(evidence("nome", "Nome: Maria", Some((0.1, 0.1)))));
        assert!(kb.learn(&fb));

        assert_eq!(kb.region_counts["nome"]["top_left"], 1);
        assert_eq!(kb.region_hint["nome"], vec!["top_left"]);
    }

    #[test]
    fn test_no_dominant_region_leaves_hint_unchanged() {
        let mut kb = KnowledgeBase::new();
        kb.region_counts.insert(
            "nome".into(),
            [("top_left".to_string(), 5), ("header".to_string(), 4)].into_iter().collect(),
        );

        let fb = feedback("nome", Some("Maria"), Some(evidence("nome", "Maria", Some((0.9, 0.1)))));
        kb.learn(&fb);

        assert!(kb.region_hint.get("nome").is_none_or(|h| h.is_empty()));
        assert_eq!(kb.region_counts["nome"]["top_right"], 1);
    }

    #[test]
    fn test_learns_anchor_and_line_prefix() {
        let mut kb = KnowledgeBase::new();
        kb.anchors.insert("inscricao".into(), vec!["inscricao".into()]);

        let fb = feedback(
            "inscricao",
            Some("101943"),
            Some(evidence("Nº Inscrição", "Nº OAB: 101943", None)),
        );
        assert!(kb.learn(&fb));

        assert_eq!(kb.anchors["inscricao"], vec!["inscricao", "nº inscricao", "nº oab"]);
        assert!(kb.region_counts.is_empty());
    }

    #[test]
    fn test_skips_anchor_equal_to_value_and_long_prefix() {
        let mut kb = KnowledgeBase::new();
        let fb = feedback(
            "uf",
            Some("SP"),
            Some(evidence("sp", "Unidade da Federação Brasileira: SP", None)),
        );
        assert!(!kb.learn(&fb));
        assert!(!kb.anchors.contains_key("uf"));
    }

    #[test]
    fn test_nothing_learned_leaves_no_empty_entries() {
        let mut kb = KnowledgeBase::new();
        let mut fb = feedback("uf", Some("SP"), Some(evidence("SP", "SP", None)));
        fb.llm_metadata.insert(
            "uf".into(),
            ResolverMetadata {
                anchors: vec!["sp".into(), "  ".into()],
                enums: vec!["".into()],
                region: None,
            },
        );

        assert!(!kb.learn(&fb));
        assert!(kb.anchors.is_empty());
        assert!(kb.enums.is_empty());
        assert_eq!(serde_json::to_value(&kb).unwrap()["anchors"], serde_json::json!({}));
    }

    #[test]
    fn test_no_learning_without_final_value() {
        let mut kb = KnowledgeBase::new();
        let fb = feedback("nome", None, Some(evidence("nome", "Nome: x", Some((0.1, 0.1)))));
        assert!(!kb.learn(&fb));
        assert!(kb.is_empty());
    }

    #[test]
    fn test_llm_metadata_learning() {
        let mut kb = KnowledgeBase::new();
        kb.region_hint.insert("situacao".into(), vec!["header".into()]);

        let mut fb = feedback("situacao", Some("ATIVO"), None);
        fb.llm_metadata.insert(
            "situacao".into(),
            ResolverMetadata {
                anchors: vec!["Situação".into(), "ativo".into(), "SITUACAO".into()],
                enums: vec!["ATIVO".into(), "Suspenso".into(), "ativo".into()],
                region: Some("top_right".into()),
            },
        );

        assert!(kb.learn(&fb));
        assert_eq!(kb.anchors["situacao"], vec!["situacao"]);
        assert_eq!(kb.enums["situacao"], vec!["ativo", "suspenso"]);
        assert_eq!(kb.region_hint["situacao"], vec!["header", "top_right"]);

        assert!(!kb.learn(&fb));
    }

    #[test]
    fn test_llm_region_outside_allow_list_ignored() {
        let mut kb = KnowledgeBase::new();
        let mut fb = feedback("uf", Some("SP"), None);
        fb.llm_metadata.insert(
            "uf".into(),
            ResolverMetadata {
                region: Some("middle_left".into()),
                ..ResolverMetadata::default()
            },
        );
        assert!(!kb.learn(&fb));
        assert!(kb.region_hint.is_empty());
    }

    #[test]
    fn test_anchor_uniqueness_over_update_sequences() {
        let mut kb = KnowledgeBase::new();
        kb.seed_from_schema(&[("nome".to_string(), "Nome".to_string())].into_iter().collect());

        let phrasings = ["Nome", "NOME", " nome ", "Nóme", "Nome Completo", "nome  completo", "NOME COMPLETO:"];
        for (i, anchor) in phrasings.iter().enumerate() {
            let line = format!("{}: Valor {}", anchor, i);
            let mut fb = feedback("nome", Some("Valor"), Some(evidence(anchor, &line, Some((0.2, 0.2)))));
            fb.llm_metadata.insert(
                "nome".into(),
                ResolverMetadata {
                    anchors: vec![anchor.to_uppercase(), anchor.to_string()],
                    ..ResolverMetadata::default()
                },
            );
            kb.learn(&fb);
        }

        let normalized: Vec<String> = kb.anchors["nome"].iter().map(|a| normalize_for_matching(a)).collect();
        let mut deduped = normalized.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(normalized.len(), deduped.len());
    }
}
