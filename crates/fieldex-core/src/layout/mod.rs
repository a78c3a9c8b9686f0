//! Document text layout: positioned lines and the extractors producing them.

mod pdf;

pub use pdf::PdfLayoutExtractor;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::LayoutError;
use crate::models::output::StageStatus;

/// Result type for layout operations.
pub type Result<T> = std::result::Result<T, LayoutError>;

/// Bounding box of a line in page points, top-left origin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    pub width: f64,
    pub height: f64,
    /// Page number (1-indexed).
    pub page: u32,
}

impl BoundingBox {
    /// Build a box from its corners.
    pub fn from_corners(x0: f64, y0: f64, x1: f64, y1: f64, page: u32) -> Self {
        Self {
            x0,
            y0,
            x1,
            y1,
            width: x1 - x0,
            height: y1 - y0,
            page,
        }
    }
}

/// One row of document text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    /// Text of the line.
    pub text: String,
    /// Horizontal center relative to page width, in [0, 1].
    pub x_rel: f64,
    /// Top edge relative to page height, in [0, 1].
    pub y_rel: f64,
    /// Bounding box.
    #[serde(default)]
    pub bbox: BoundingBox,
}

impl Line {
    /// Create a line without a bounding box.
    pub fn new(text: impl Into<String>, x_rel: f64, y_rel: f64) -> Self {
        Self {
            text: text.into(),
            x_rel,
            y_rel,
            bbox: BoundingBox::default(),
        }
    }
}

/// Positioned lines of a document in reading order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentLayout {
    pub lines: Vec<Line>,
    /// Line texts joined by newlines.
    #[serde(default)]
    pub full_text: String,
    #[serde(default)]
    pub page_count: u32,
    /// False when line positions are synthetic.
    #[serde(default = "default_positioned")]
    pub positioned: bool,
}

fn default_positioned() -> bool {
    true
}

impl DocumentLayout {
    /// Build a layout from positioned lines.
    pub fn new(lines: Vec<Line>, page_count: u32) -> Self {
        let full_text = join_lines(&lines);
        Self {
            lines,
            full_text,
            page_count,
            positioned: true,
        }
    }

    /// Build a layout from plain text, one line per non-empty text line.
    ///
    /// Positions are synthetic: lines are spread evenly down one page.
    pub fn from_text(text: &str, page_count: u32) -> Self {
        let rows: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        let count = rows.len().max(1) as f64;

        let lines: Vec<Line> = rows
            .iter()
            .enumerate()
            .map(|(idx, row)| Line {
                bbox: BoundingBox {
                    page: 1,
                    ..BoundingBox::default()
                },
                ..Line::new(*row, 0.5, idx as f64 / count)
            })
            .collect();

        let full_text = join_lines(&lines);
        Self {
            lines,
            full_text,
            page_count,
            positioned: false,
        }
    }

    /// An empty layout.
    pub fn empty() -> Self {
        Self {
            lines: Vec::new(),
            full_text: String::new(),
            page_count: 0,
            positioned: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Parse a pre-extracted layout from JSON.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let mut layout: DocumentLayout =
            serde_json::from_slice(data).map_err(|e| LayoutError::Parse(format!("invalid layout JSON: {}", e)))?;
        layout.refresh_full_text();
        Ok(layout)
    }

    /// Rebuild `full_text` from the lines if it is missing.
    pub fn refresh_full_text(&mut self) {
        if self.full_text.is_empty() {
            self.full_text = join_lines(&self.lines);
        }
    }

    /// Per-line `y_rel`, or nothing when positions are synthetic.
    pub fn y_positions(&self) -> Vec<f64> {
        if self.positioned {
            self.lines.iter().map(|l| l.y_rel).collect()
        } else {
            Vec::new()
        }
    }
}

fn join_lines(lines: &[Line]) -> String {
    lines.iter().map(|l| l.text.as_str()).collect::<Vec<_>>().join("\n")
}

/// Trait for document layout extractors.
pub trait LayoutExtractor: Send + Sync {
    /// Extract positioned lines from raw document bytes.
    fn extract(&self, data: &[u8]) -> Result<DocumentLayout>;
}

/// Layout together with how its extraction went.
#[derive(Debug, Clone)]
pub struct LayoutOutcome {
    pub layout: DocumentLayout,
    pub status: StageStatus,
}

/// Run `extractor` on a blocking thread, giving up after `timeout`.
///
/// Failures and timeouts yield an empty layout with a degraded status.
pub async fn extract_layout_with_timeout<E>(
    extractor: Arc<E>,
    data: Vec<u8>,
    timeout: Duration,
) -> LayoutOutcome
where
    E: LayoutExtractor + ?Sized + 'static,
{
    let task = tokio::task::spawn_blocking(move || extractor.extract(&data));

    let reason = match tokio::time::timeout(timeout, task).await {
        Ok(Ok(Ok(layout))) => {
            debug!("Extracted {} lines from {} pages", layout.lines.len(), layout.page_count);
            return LayoutOutcome {
                layout,
                status: StageStatus::Complete,
            };
        }
        Ok(Ok(Err(e))) => e.to_string(),
        Ok(Err(e)) => format!("extraction task failed: {}", e),
        Err(_) => LayoutError::Timeout(timeout.as_secs_f64()).to_string(),
    };

    warn!("Layout extraction degraded: {}", reason);
    LayoutOutcome {
        layout: DocumentLayout::empty(),
        status: StageStatus::Degraded(reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct FixedExtractor(Option<DocumentLayout>);

    impl LayoutExtractor for FixedExtractor {
        fn extract(&self, _data: &[u8]) -> Result<DocumentLayout> {
            self.0.clone().ok_or(LayoutError::NoPages)
        }
    }

    #[test]
    fn test_layout_from_json_defaults() {
        let layout = DocumentLayout::from_json(
            br#"{"lines": [{"text": "Nome: Maria", "x_rel": 0.2, "y_rel": 0.1}, {"text": "UF: SP", "x_rel": 0.2, "y_rel": 0.2}]}"#,
        )
        .unwrap();

        assert_eq!(layout.full_text, "Nome: Maria\nUF: SP");
        assert!(layout.positioned);
        assert_eq!(layout.page_count, 0);
        assert_eq!(layout.y_positions(), vec![0.1, 0.2]);
    }

    #[test]
    fn test_layout_from_json_rejects_garbage() {
        let err = DocumentLayout::from_json(b"[1, 2").unwrap_err();
        assert!(matches!(err, LayoutError::Parse(_)));
    }

    struct SlowExtractor;

    impl LayoutExtractor for SlowExtractor {
        fn extract(&self, _data: &[u8]) -> Result<DocumentLayout> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(DocumentLayout::from_text("late", 1))
        }
    }

    #[test]
    fn test_from_text_is_unpositioned() {
        let layout = DocumentLayout::from_text("Nome: Maria\n\n  UF: SP  \n", 1);
        assert_eq!(layout.lines.len(), 2);
        assert_eq!(layout.lines[1].text, "UF: SP");
        assert_eq!(layout.full_text, "Nome: Maria\nUF: SP");
        assert!(!layout.positioned);
        assert!(layout.y_positions().is_empty());
    }

    #[test]
    fn test_layout_json_defaults() {
        let json = r#"{"lines": [{"text": "Nome: Maria", "x_rel": 0.2, "y_rel": 0.1}]}"#;
        let mut layout: DocumentLayout = serde_json::from_str(json).unwrap();
        layout.refresh_full_text();

        assert!(layout.positioned);
        assert_eq!(layout.full_text, "Nome: Maria");
        assert_eq!(layout.y_positions(), vec![0.1]);
        assert_eq!(layout.lines[0].bbox, BoundingBox::default());
    }

    #[tokio::test]
    async fn test_extract_with_timeout_complete() {
        let layout = DocumentLayout::new(vec![Line::new("a", 0.5, 0.5)], 1);
        let extractor = Arc::new(FixedExtractor(Some(layout.clone())));

        let outcome = extract_layout_with_timeout(extractor, Vec::new(), Duration::from_secs(5)).await;

        assert_eq!(outcome.status, StageStatus::Complete);
        assert_eq!(outcome.layout, layout);
    }

    #[tokio::test]
    async fn test_extract_with_timeout_failure_degrades() {
        let extractor = Arc::new(FixedExtractor(None));
        let outcome = extract_layout_with_timeout(extractor, Vec::new(), Duration::from_secs(5)).await;

        assert!(outcome.layout.is_empty());
        assert!(matches!(outcome.status, StageStatus::Degraded(ref r) if r.contains("no pages")));
    }

    #[tokio::test]
    async fn test_extract_with_timeout_deadline_degrades() {
        let outcome =
            extract_layout_with_timeout(Arc::new(SlowExtractor), Vec::new(), Duration::from_millis(20)).await;

        assert!(outcome.layout.is_empty());
        assert!(matches!(outcome.status, StageStatus::Degraded(ref r) if r.contains("timed out")));
    }
}
