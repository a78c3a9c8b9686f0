//! Extraction output and run report.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Extracted values keyed by schema field; `None` when nothing was found.
pub type FieldValues = BTreeMap<String, Option<String>>;

/// Response for one extraction request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionOutput {
    /// One entry per schema field.
    pub fields: FieldValues,

    /// Run metadata.
    pub metadata: ExtractionMetadata,
}

/// Metadata about how a result was produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionMetadata {
    /// Seconds since the request started.
    pub processing_time: f64,

    /// Whether the fallback resolver was called.
    pub llm_used: bool,
}

impl ExtractionOutput {
    /// Number of fields with a value.
    pub fn filled_count(&self) -> usize {
        self.fields.values().filter(|v| v.is_some()).count()
    }
}

/// How a pipeline stage went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum StageStatus {
    /// The stage ran to completion.
    Complete,
    /// The stage had nothing to do or was not allowed to run.
    Skipped(String),
    /// The stage ran but its result was replaced by a fallback.
    Degraded(String),
    /// The stage failed; the run continued without it.
    Failed(String),
}

impl StageStatus {
    pub fn skipped(reason: impl Into<String>) -> Self {
        StageStatus::Skipped(reason.into())
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, StageStatus::Complete)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Complete => write!(f, "complete"),
            StageStatus::Skipped(reason) => write!(f, "skipped ({})", reason),
            StageStatus::Degraded(reason) => write!(f, "degraded ({})", reason),
            StageStatus::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

/// Diagnostics for one run, next to the output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Fields the heuristics could not settle.
    pub uncertain_fields: Vec<String>,

    /// Fallback resolver stage.
    pub fallback: StageStatus,

    /// Knowledge base update stage.
    pub kb_update: StageStatus,
}

/// Output plus report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRun {
    pub output: ExtractionOutput,
    pub report: RunReport,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_output_json_shape() {
        let mut fields = FieldValues::new();
        fields.insert("nome".to_string(), Some("Maria".to_string()));
        fields.insert("uf".to_string(), None);

        let output = ExtractionOutput {
            fields,
            metadata: ExtractionMetadata {
                processing_time: 0.25,
                llm_used: false,
            },
        };

        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "fields": {"nome": "Maria", "uf": null},
                "metadata": {"processing_time": 0.25, "llm_used": false}
            })
        );
        assert_eq!(output.filled_count(), 1);
    }

    #[test]
    fn test_stage_status_serialization() {
        assert_eq!(
            serde_json::to_value(StageStatus::Complete).unwrap(),
            serde_json::json!({"status": "complete"})
        );
        assert_eq!(
            serde_json::to_value(StageStatus::Degraded("timeout".into())).unwrap(),
            serde_json::json!({"status": "degraded", "reason": "timeout"})
        );
        assert_eq!(StageStatus::skipped("no uncertain fields").to_string(), "skipped (no uncertain fields)");
    }
}
