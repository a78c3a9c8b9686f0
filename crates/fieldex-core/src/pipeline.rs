//! Extraction pipeline: heuristics, time-budgeted fallback, knowledge base feedback.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use fieldex_resolver::{ResolveRequest, Resolutions, Resolver, UncertainField};

use crate::heuristics::{FieldMatcher, ACCEPT_THRESHOLD};
use crate::kb::{Evidence, Feedback, KbStore, KnowledgeBase};
use crate::layout::DocumentLayout;
use crate::models::config::PipelineConfig;
use crate::models::output::{
    ExtractionMetadata, ExtractionOutput, ExtractionRun, FieldValues, RunReport, StageStatus,
};
use crate::models::Schema;
use crate::normalize::normalize_for_output;

/// Input for one extraction run.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionRequest<'a> {
    /// Knowledge base partition.
    pub label: &'a str,
    /// Fields to extract.
    pub schema: &'a Schema,
    /// Document lines.
    pub layout: &'a DocumentLayout,
    /// When the request arrived; document parsing counts against the budget.
    pub started: Instant,
}

impl<'a> ExtractionRequest<'a> {
    /// Request starting now.
    pub fn new(label: &'a str, schema: &'a Schema, layout: &'a DocumentLayout) -> Self {
        Self {
            label,
            schema,
            layout,
            started: Instant::now(),
        }
    }

    pub fn with_started(mut self, started: Instant) -> Self {
        self.started = started;
        self
    }
}

/// Heuristic pass over all schema fields.
struct HeuristicPass {
    results: FieldValues,
    evidence: BTreeMap<String, Evidence>,
    uncertain: Vec<String>,
    hints: BTreeMap<String, Vec<String>>,
}

/// Orchestrates one extraction per request.
pub struct Pipeline<S: KbStore, R: Resolver> {
    store: S,
    resolver: R,
    config: PipelineConfig,
}

impl<S: KbStore, R: Resolver> Pipeline<S, R> {
    /// Create a pipeline with default timing.
    pub fn new(store: S, resolver: R) -> Self {
        Self {
            store,
            resolver,
            config: PipelineConfig::default(),
        }
    }

    /// Replace the pipeline configuration.
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Extract every schema field from the request's layout.
    ///
    /// Never fails: fallback and persistence problems are logged and
    /// reported in the run report.
    pub async fn run(&self, request: ExtractionRequest<'_>) -> ExtractionRun {
        let kb = self.prepare_kb(request.label, request.schema);
        let pass = self.heuristic_pass(&request, &kb);

        let mut results = pass.results;
        let mut llm_used = false;
        let mut resolutions = Resolutions::new();

        let elapsed = request.started.elapsed().as_secs_f64();
        let remaining = self.config.timeout_seconds - elapsed;

        let fallback = if pass.uncertain.is_empty() {
            StageStatus::skipped("no uncertain fields")
        } else if !self.config.fallback_enabled {
            StageStatus::skipped("fallback disabled")
        } else if remaining <= self.config.min_time_for_llm {
            debug!(
                "Skipping fallback: {:.2}s left, {:.2}s needed",
                remaining, self.config.min_time_for_llm
            );
            StageStatus::Skipped(format!("{:.2}s left of budget", remaining.max(0.0)))
        } else {
            llm_used = true;
            let (status, resolved) = self
                .fallback(&request, &pass.uncertain, &pass.hints, remaining)
                .await;
            resolutions = resolved;
            status
        };

        let mut llm_metadata = BTreeMap::new();
        for (field, resolution) in resolutions {
            if !request.schema.contains_key(&field) {
                continue;
            }
            if let Some(value) = resolution.value.and_then(normalize_for_output) {
                results.insert(field.clone(), Some(value));
            }
            if let Some(metadata) = resolution.metadata {
                llm_metadata.insert(field, metadata);
            }
        }

        let feedback = Feedback {
            results: results.clone(),
            evidence: pass.evidence,
            llm_metadata,
        };
        let kb_update = self.learn(request.label, &feedback);

        let output = ExtractionOutput {
            fields: results,
            metadata: ExtractionMetadata {
                processing_time: request.started.elapsed().as_secs_f64(),
                llm_used,
            },
        };

        info!(
            "Extracted {}/{} fields for '{}' in {:.2}s (llm_used={})",
            output.filled_count(),
            output.fields.len(),
            request.label,
            output.metadata.processing_time,
            llm_used
        );

        ExtractionRun {
            output,
            report: RunReport {
                uncertain_fields: pass.uncertain,
                fallback,
                kb_update,
            },
        }
    }

    /// Load the label's knowledge base and seed missing anchors.
    fn prepare_kb(&self, label: &str, schema: &Schema) -> KnowledgeBase {
        match self.store.init_from_schema(label, schema) {
            Ok(kb) => kb,
            Err(e) => {
                warn!("Using in-memory knowledge base for '{}': {}", label, e);
                let mut kb = KnowledgeBase::new();
                kb.seed_from_schema(schema);
                kb
            }
        }
    }

    fn heuristic_pass(&self, request: &ExtractionRequest<'_>, kb: &KnowledgeBase) -> HeuristicPass {
        let layout = request.layout;
        let y_positions = layout.y_positions();
        let matcher = FieldMatcher::new().with_top_k(self.config.top_k);

        let mut pass = HeuristicPass {
            results: FieldValues::new(),
            evidence: BTreeMap::new(),
            uncertain: Vec::new(),
            hints: BTreeMap::new(),
        };

        for (field, description) in request.schema {
            let selection =
                matcher.match_field(&layout.lines, &y_positions, field, description, &kb.field(field));

            let accepted = selection
                .accepted(ACCEPT_THRESHOLD)
                .and_then(|best| normalize_for_output(&best.value).map(|value| (best, value)));

            match accepted {
                Some((best, value)) => {
                    let line = layout.lines.get(best.line_idx);
                    pass.evidence.insert(
                        field.clone(),
                        Evidence {
                            anchor_used: best.anchor_used.clone(),
                            method: best.method,
                            line_text: line.map(|l| l.text.clone()).unwrap_or_default(),
                            score: best.total_score,
                            position: line
                                .filter(|_| layout.positioned)
                                .map(|l| (l.x_rel, l.y_rel)),
                        },
                    );
                    pass.results.insert(field.clone(), Some(value));
                }
                None => {
                    pass.results.insert(field.clone(), None);
                    pass.uncertain.push(field.clone());
                    pass.hints.insert(field.clone(), selection.top_values());
                }
            }
        }

        debug!(
            "Heuristics settled {}/{} fields",
            request.schema.len() - pass.uncertain.len(),
            request.schema.len()
        );
        pass
    }

    /// One batched resolver call under `remaining + slack`.
    async fn fallback(
        &self,
        request: &ExtractionRequest<'_>,
        uncertain: &[String],
        hints: &BTreeMap<String, Vec<String>>,
        remaining: f64,
    ) -> (StageStatus, Resolutions) {
        let fields = uncertain
            .iter()
            .map(|name| {
                let description = request.schema.get(name).cloned().unwrap_or_default();
                let field = UncertainField::new(name.clone(), description);
                match hints.get(name).and_then(|h| h.first()) {
                    Some(hint) => field.with_hint(hint.clone()),
                    None => field,
                }
            })
            .collect();
        let resolve_request = ResolveRequest::new(request.layout.full_text.clone(), fields);

        let deadline = Duration::try_from_secs_f64(remaining + self.config.llm_slack_seconds.max(0.0))
            .unwrap_or(Duration::MAX);
        debug!(
            "Calling resolver for {} fields with {:.2}s deadline",
            uncertain.len(),
            deadline.as_secs_f64()
        );

        match tokio::time::timeout(deadline, self.resolver.resolve(&resolve_request)).await {
            Ok(outcome) => {
                let status = match outcome.reason() {
                    Some(reason) => StageStatus::Degraded(reason.to_string()),
                    None => StageStatus::Complete,
                };
                (status, outcome.into_resolutions())
            }
            Err(_) => {
                warn!("Resolver exceeded {:.2}s deadline", deadline.as_secs_f64());
                (
                    StageStatus::Degraded(format!("timed out after {:.2}s", deadline.as_secs_f64())),
                    Resolutions::new(),
                )
            }
        }
    }

    fn learn(&self, label: &str, feedback: &Feedback) -> StageStatus {
        if feedback.is_empty() {
            return StageStatus::skipped("no evidence");
        }

        match self.store.update(label, feedback) {
            Ok(true) => StageStatus::Complete,
            Ok(false) => StageStatus::skipped("nothing new to learn"),
            Err(e) => {
                warn!("Knowledge base update failed for '{}': {}", label, e);
                StageStatus::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::kb::{MemoryKbStore, StoreResult};
    use crate::layout::Line;
    use fieldex_resolver::{BatchResolver, MockBackend};
    use pretty_assertions::assert_eq;

    fn schema() -> Schema {
        [
            ("nome", "Nome completo"),
            ("inscricao", "Número de inscrição"),
            ("situacao", "Situação cadastral"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn layout() -> DocumentLayout {
        DocumentLayout::new(
            vec![
                Line::new("CONSELHO SECCIONAL", 0.5, 0.02),
                Line::new("Nome: Maria Silva", 0.2, 0.1),
                Line::new("Inscrição", 0.2, 0.3),
                Line::new("101943", 0.2, 0.33),
                Line::new("Situação Regular", 0.8, 0.9),
            ],
            1,
        )
    }

    const REPLY: &str = r#"{
        "fields": {"nome": "Maria  Silva", "inscricao": "101943", "situacao": "REGULAR"},
        "metadata": {
            "nome": {"anchors": ["Nome"], "region": "top_left"},
            "situacao": {"enums": ["REGULAR", "SUSPENSO"], "region": "footer"}
        }
    }"#;

    fn pipeline(backend: MockBackend) -> Pipeline<MemoryKbStore, BatchResolver<MockBackend>> {
        Pipeline::new(MemoryKbStore::new(), BatchResolver::new(backend))
    }

    #[tokio::test]
    async fn test_first_run_uses_fallback_and_learns() {
        let backend = MockBackend::new(REPLY);
        let pipeline = pipeline(backend.clone());
        let schema = schema();
        let layout = layout();

        let run = pipeline.run(ExtractionRequest::new("oab", &schema, &layout)).await;

        assert!(run.output.metadata.llm_used);
        assert_eq!(run.report.fallback, StageStatus::Complete);
        assert_eq!(run.report.kb_update, StageStatus::Complete);
        assert_eq!(run.output.fields["nome"].as_deref(), Some("Maria Silva"));
        assert_eq!(run.output.fields["situacao"].as_deref(), Some("REGULAR"));
        assert_eq!(run.output.fields.len(), 3);

        let prompt = backend.last_prompt().unwrap();
        assert!(prompt.user.contains("\"nome\": Nome completo [Maria Silva]"));
        assert!(prompt.user.contains("\"inscricao\": Número de inscrição [101943]"));

        let kb = pipeline.store().load("oab").unwrap();
        assert_eq!(kb.region_hint["nome"], vec!["top_left"]);
        assert_eq!(kb.enums["situacao"], vec!["regular", "suspenso"]);
    }

    #[tokio::test]
    async fn test_learned_region_lets_heuristics_accept() {
        let backend = MockBackend::new(REPLY);
        let pipeline = pipeline(backend.clone());
        let schema = schema();
        let layout = layout();

        pipeline.run(ExtractionRequest::new("oab", &schema, &layout)).await;
        let second = pipeline.run(ExtractionRequest::new("oab", &schema, &layout)).await;

        assert!(!second.report.uncertain_fields.contains(&"nome".to_string()));
        assert_eq!(second.output.fields["nome"].as_deref(), Some("Maria Silva"));
        assert!(!backend.last_prompt().unwrap().user.contains("\"nome\""));

        let kb = pipeline.store().load("oab").unwrap();
        assert_eq!(kb.region_counts["nome"]["top_left"], 1);
    }

    #[tokio::test]
    async fn test_fallback_skipped_when_budget_low() {
        let backend = MockBackend::new(REPLY);
        let pipeline = pipeline(backend.clone());
        let schema = schema();
        let layout = layout();

        let started = Instant::now()
            .checked_sub(Duration::from_secs(7))
            .unwrap();
        let run = pipeline
            .run(ExtractionRequest::new("oab", &schema, &layout).with_started(started))
            .await;

        assert!(!run.output.metadata.llm_used);
        assert!(matches!(run.report.fallback, StageStatus::Skipped(_)));
        assert!(run.output.fields.values().all(Option::is_none));
        assert_eq!(backend.call_count(), 0);
        assert!(run.output.metadata.processing_time >= 7.0);
    }

    #[tokio::test]
    async fn test_fallback_disabled() {
        let backend = MockBackend::new(REPLY);
        let config = PipelineConfig {
            fallback_enabled: false,
            ..PipelineConfig::default()
        };
        let pipeline = pipeline(backend.clone()).with_config(config);
        let schema = schema();
        let layout = layout();

        let run = pipeline.run(ExtractionRequest::new("oab", &schema, &layout)).await;

        assert_eq!(run.report.fallback, StageStatus::skipped("fallback disabled"));
        assert_eq!(run.report.kb_update, StageStatus::skipped("no evidence"));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_resolver_degrades_to_null() {
        let backend = MockBackend::new(REPLY).with_delay(Duration::from_secs(60));
        let config = PipelineConfig {
            timeout_seconds: 3.0,
            min_time_for_llm: 0.5,
            llm_slack_seconds: 0.5,
            ..PipelineConfig::default()
        };
        let pipeline = pipeline(backend.clone()).with_config(config);
        let schema = schema();
        let layout = layout();

        let run = pipeline.run(ExtractionRequest::new("oab", &schema, &layout)).await;

        assert!(run.output.metadata.llm_used);
        assert!(matches!(run.report.fallback, StageStatus::Degraded(ref r) if r.contains("timed out")));
        assert!(run.output.fields.values().all(Option::is_none));
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_degrades() {
        let pipeline = pipeline(MockBackend::failing("connection refused"));
        let schema = schema();
        let layout = layout();

        let run = pipeline.run(ExtractionRequest::new("oab", &schema, &layout)).await;

        assert!(matches!(run.report.fallback, StageStatus::Degraded(ref r) if r.contains("connection refused")));
        assert!(run.output.fields.values().all(Option::is_none));
        assert_eq!(run.report.uncertain_fields.len(), 3);
    }

    #[tokio::test]
    async fn test_unpositioned_layout_learns_no_region() {
        let backend = MockBackend::new(REPLY);
        let pipeline = pipeline(backend);
        let schema = schema();
        let mut layout = layout();
        layout.positioned = false;

        pipeline.run(ExtractionRequest::new("oab", &schema, &layout)).await;
        pipeline.run(ExtractionRequest::new("oab", &schema, &layout)).await;

        let kb = pipeline.store().load("oab").unwrap();
        assert!(kb.region_counts.is_empty());
    }

    struct BrokenStore;

    impl KbStore for BrokenStore {
        fn load(&self, label: &str) -> StoreResult<KnowledgeBase> {
            Err(StoreError::Persist {
                label: label.to_string(),
                reason: "disk on fire".to_string(),
            })
        }

        fn save(&self, label: &str, _kb: &KnowledgeBase) -> StoreResult<()> {
            self.load(label).map(|_| ())
        }

        fn modify(
            &self,
            label: &str,
            _f: &mut dyn FnMut(&mut KnowledgeBase) -> bool,
        ) -> StoreResult<KnowledgeBase> {
            self.load(label)
        }

        fn remove(&self, _label: &str) -> StoreResult<bool> {
            Ok(false)
        }

        fn labels(&self) -> StoreResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_store_failures_are_absorbed() {
        let pipeline = Pipeline::new(BrokenStore, BatchResolver::new(MockBackend::new(REPLY)));
        let schema = schema();
        let layout = layout();

        let run = pipeline.run(ExtractionRequest::new("oab", &schema, &layout)).await;

        assert_eq!(run.output.fields["inscricao"].as_deref(), Some("101943"));
        assert!(matches!(run.report.kb_update, StageStatus::Failed(ref r) if r.contains("disk on fire")));
    }
}
