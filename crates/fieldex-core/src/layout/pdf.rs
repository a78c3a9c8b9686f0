//! PDF text layout extraction using lopdf, with pdf-extract as a fallback.

use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};
use std::borrow::Cow;
use tracing::{debug, trace, warn};

use super::{BoundingBox, DocumentLayout, LayoutExtractor, Line, Result};
use crate::error::LayoutError;

/// US Letter, used when a page has no usable MediaBox.
const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// Average glyph advance in text space units per point of font size.
const GLYPH_ADVANCE: f64 = 0.5;

/// `TJ` adjustments below this (thousandths of an em) are word gaps.
const WORD_GAP: f64 = -200.0;

/// Above this share of control characters the decoded text is unusable.
const MAX_CONTROL_RATIO: f64 = 0.3;

/// Parent chain depth limit when resolving inherited page attributes.
const MAX_INHERITANCE_DEPTH: usize = 32;

/// PDF layout extractor reading positioned text from page content streams.
pub struct PdfLayoutExtractor {
    y_tolerance: f64,
}

impl PdfLayoutExtractor {
    /// Create an extractor with the default line tolerance.
    pub fn new() -> Self {
        Self { y_tolerance: 3.0 }
    }

    /// Set the vertical distance (points) within which text runs share a line.
    pub fn with_y_tolerance(mut self, y_tolerance: f64) -> Self {
        self.y_tolerance = y_tolerance;
        self
    }

    /// Parse the document, decrypting with an empty password if needed.
    ///
    /// Returns the document and the bytes pdf-extract should read.
    fn load<'a>(&self, data: &'a [u8]) -> Result<(Document, Cow<'a, [u8]>)> {
        let mut doc = Document::load_mem(data).map_err(|e| LayoutError::Parse(e.to_string()))?;

        if !doc.is_encrypted() {
            return Ok((doc, Cow::Borrowed(data)));
        }

        if doc.decrypt("").is_err() {
            return Err(LayoutError::Encrypted);
        }
        debug!("Decrypted PDF with empty password");

        let mut decrypted = Vec::new();
        doc.save_to(&mut decrypted)
            .map_err(|e| LayoutError::Parse(format!("Failed to save decrypted PDF: {}", e)))?;
        Ok((doc, Cow::Owned(decrypted)))
    }

    /// Group runs of one page into lines.
    fn group_lines(&self, mut runs: Vec<TextRun>, page: u32, media_box: [f64; 4]) -> Vec<Line> {
        let [llx, lly, urx, ury] = media_box;
        let width = urx - llx;
        let height = ury - lly;

        // Flip to a top-left origin.
        for run in &mut runs {
            run.x -= llx;
            run.top = height - (run.baseline - lly) - run.height;
        }
        runs.retain(|r| !r.text.trim().is_empty());
        runs.sort_by(|a, b| a.top.total_cmp(&b.top).then(a.x.total_cmp(&b.x)));

        let mut groups: Vec<Vec<TextRun>> = Vec::new();
        let mut current_top = f64::NAN;
        for run in runs {
            match groups.last_mut() {
                Some(group) if (run.top - current_top).abs() <= self.y_tolerance => group.push(run),
                _ => {
                    current_top = run.top;
                    groups.push(vec![run]);
                }
            }
        }

        groups
            .into_iter()
            .map(|mut group| {
                group.sort_by(|a, b| a.x.total_cmp(&b.x));

                let text = group.iter().map(|r| r.text.trim()).collect::<Vec<_>>().join(" ");
                let x0 = group.iter().map(|r| r.x).fold(f64::INFINITY, f64::min);
                let x1 = group.iter().map(|r| r.x + r.width).fold(f64::NEG_INFINITY, f64::max);
                let y0 = group.iter().map(|r| r.top).fold(f64::INFINITY, f64::min);
                let y1 = group.iter().map(|r| r.top + r.height).fold(f64::NEG_INFINITY, f64::max);

                let x_rel = if width > 0.0 { ((x0 + x1) / 2.0 / width).clamp(0.0, 1.0) } else { 0.0 };
                let y_rel = if height > 0.0 { (y0 / height).clamp(0.0, 1.0) } else { 0.0 };

                Line {
                    text,
                    x_rel,
                    y_rel,
                    bbox: BoundingBox::from_corners(x0, y0, x1, y1, page),
                }
            })
            .collect()
    }
}

impl Default for PdfLayoutExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutExtractor for PdfLayoutExtractor {
    fn extract(&self, data: &[u8]) -> Result<DocumentLayout> {
        let (doc, raw) = self.load(data)?;

        let pages = doc.get_pages();
        if pages.is_empty() {
            return Err(LayoutError::NoPages);
        }
        let page_count = pages.len() as u32;

        let mut lines = Vec::new();
        let mut stats = DecodeStats::default();

        for (&number, &page_id) in pages.iter() {
            let content = match doc.get_page_content(page_id) {
                Ok(content) => content,
                Err(e) => {
                    warn!("Skipping page {}: {}", number, e);
                    continue;
                }
            };
            let content = match Content::decode(&content) {
                Ok(content) => content,
                Err(e) => {
                    warn!("Skipping page {}: undecodable content stream: {}", number, e);
                    continue;
                }
            };

            let runs = scan_runs(&content, &mut stats);
            trace!("Page {}: {} text runs", number, runs.len());

            let media_box = media_box(&doc, page_id);
            lines.extend(self.group_lines(runs, number, media_box));
        }

        if lines.is_empty() || stats.is_garbled() {
            debug!(
                "No usable positioned text ({} lines, {}/{} control chars), using plain text",
                lines.len(),
                stats.control,
                stats.total
            );
            let text = pdf_extract::extract_text_from_mem(&raw)
                .map_err(|e| LayoutError::TextExtraction(e.to_string()))?;
            return Ok(DocumentLayout::from_text(&text, page_count));
        }

        debug!("PDF layout: {} pages, {} lines", page_count, lines.len());
        Ok(DocumentLayout::new(lines, page_count))
    }
}

/// A string shown by one text operator, in unflipped page space.
#[derive(Debug, Clone)]
struct TextRun {
    text: String,
    x: f64,
    baseline: f64,
    top: f64,
    width: f64,
    height: f64,
}

#[derive(Debug, Default)]
struct DecodeStats {
    control: usize,
    total: usize,
}

impl DecodeStats {
    fn is_garbled(&self) -> bool {
        self.total > 0 && self.control as f64 / self.total as f64 > MAX_CONTROL_RATIO
    }
}

/// Affine transform `[a b c d e f]`, PDF row-vector convention.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f64; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translate(tx: f64, ty: f64) -> Self {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    /// `self × other`.
    fn then(self, other: Matrix) -> Matrix {
        let [a, b, c, d, e, f] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Matrix([
            a * a2 + b * c2,
            a * b2 + b * d2,
            c * a2 + d * c2,
            c * b2 + d * d2,
            e * a2 + f * c2 + e2,
            e * b2 + f * d2 + f2,
        ])
    }

    fn from_operands(operands: &[Object]) -> Option<Matrix> {
        if operands.len() < 6 {
            return None;
        }
        let mut m = [0.0; 6];
        for (slot, operand) in m.iter_mut().zip(operands) {
            *slot = number(operand)?;
        }
        Some(Matrix(m))
    }

    fn x_scale(&self) -> f64 {
        self.0[0].hypot(self.0[1])
    }

    fn y_scale(&self) -> f64 {
        self.0[2].hypot(self.0[3])
    }
}

/// Text and graphics state tracked while walking a content stream.
struct TextState {
    ctm: Matrix,
    ctm_stack: Vec<Matrix>,
    tm: Matrix,
    tlm: Matrix,
    font_size: f64,
    leading: f64,
    char_spacing: f64,
    word_spacing: f64,
}

impl TextState {
    fn new() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            ctm_stack: Vec::new(),
            tm: Matrix::IDENTITY,
            tlm: Matrix::IDENTITY,
            font_size: 12.0,
            leading: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
        }
    }

    fn move_line(&mut self, tx: f64, ty: f64) {
        self.tlm = Matrix::translate(tx, ty).then(self.tlm);
        self.tm = self.tlm;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.leading);
    }

    /// Text-space advance of `text` at the current font settings.
    fn advance(&self, text: &str) -> f64 {
        let chars = text.chars().count() as f64;
        let spaces = text.chars().filter(|&c| c == ' ').count() as f64;
        chars * (GLYPH_ADVANCE * self.font_size + self.char_spacing) + spaces * self.word_spacing
    }

    /// Emit a run at the current position and move past it.
    fn show(&mut self, text: String, advance: f64, runs: &mut Vec<TextRun>) {
        let trm = self.tm.then(self.ctm);
        let [.., e, f] = trm.0;
        let y_scale = trm.y_scale();
        let height = self.font_size.abs() * if y_scale > 0.0 { y_scale } else { 1.0 };

        runs.push(TextRun {
            text,
            x: e,
            baseline: f,
            top: 0.0,
            width: advance * trm.x_scale(),
            height,
        });

        self.tm = Matrix::translate(advance, 0.0).then(self.tm);
    }
}

/// Walk the operators of one page and collect its text runs.
fn scan_runs(content: &Content, stats: &mut DecodeStats) -> Vec<TextRun> {
    let mut state = TextState::new();
    let mut runs = Vec::new();

    for op in &content.operations {
        let operands = op.operands.as_slice();
        match op.operator.as_str() {
            "q" => state.ctm_stack.push(state.ctm),
            "Q" => {
                if let Some(ctm) = state.ctm_stack.pop() {
                    state.ctm = ctm;
                }
            }
            "cm" => {
                if let Some(m) = Matrix::from_operands(operands) {
                    state.ctm = m.then(state.ctm);
                }
            }
            "BT" => {
                state.tm = Matrix::IDENTITY;
                state.tlm = Matrix::IDENTITY;
            }
            "Tf" => {
                if let Some(size) = operands.get(1).and_then(number) {
                    state.font_size = size;
                }
            }
            "TL" => {
                if let Some(leading) = operands.first().and_then(number) {
                    state.leading = leading;
                }
            }
            "Tc" => {
                if let Some(spacing) = operands.first().and_then(number) {
                    state.char_spacing = spacing;
                }
            }
            "Tw" => {
                if let Some(spacing) = operands.first().and_then(number) {
                    state.word_spacing = spacing;
                }
            }
            "Td" | "TD" => {
                if let (Some(tx), Some(ty)) = (
                    operands.first().and_then(number),
                    operands.get(1).and_then(number),
                ) {
                    if op.operator == "TD" {
                        state.leading = -ty;
                    }
                    state.move_line(tx, ty);
                }
            }
            "Tm" => {
                if let Some(m) = Matrix::from_operands(operands) {
                    state.tm = m;
                    state.tlm = m;
                }
            }
            "T*" => state.next_line(),
            "Tj" | "'" | "\"" => {
                let string_idx = match op.operator.as_str() {
                    "'" => {
                        state.next_line();
                        0
                    }
                    "\"" => {
                        if let Some(aw) = operands.first().and_then(number) {
                            state.word_spacing = aw;
                        }
                        if let Some(ac) = operands.get(1).and_then(number) {
                            state.char_spacing = ac;
                        }
                        state.next_line();
                        2
                    }
                    _ => 0,
                };
                if let Some(text) = operands.get(string_idx).and_then(|o| decode_string(o, stats)) {
                    let advance = state.advance(&text);
                    state.show(text, advance, &mut runs);
                }
            }
            "TJ" => {
                let Some(Object::Array(items)) = operands.first() else {
                    continue;
                };
                let mut text = String::new();
                let mut advance = 0.0;
                for item in items {
                    if let Some(part) = decode_string(item, stats) {
                        advance += state.advance(&part);
                        text.push_str(&part);
                    } else if let Some(adjust) = number(item) {
                        advance -= adjust / 1000.0 * state.font_size;
                        if adjust < WORD_GAP && !text.ends_with(' ') {
                            text.push(' ');
                        }
                    }
                }
                state.show(text, advance, &mut runs);
            }
            _ => {}
        }
    }

    runs
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

/// Decode a string operand: UTF-16BE with a byte order mark, otherwise one
/// byte per character. Control characters are dropped and counted.
fn decode_string(obj: &Object, stats: &mut DecodeStats) -> Option<String> {
    let Object::String(bytes, _) = obj else {
        return None;
    };

    let decoded = decode_pdf_bytes(bytes);
    stats.total += decoded.chars().count();

    let mut text = String::with_capacity(decoded.len());
    for c in decoded.chars() {
        if c.is_control() {
            stats.control += 1;
        } else {
            text.push(c);
        }
    }
    Some(text)
}

fn decode_pdf_bytes(bytes: &[u8]) -> String {
    match bytes {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// MediaBox of a page, following the page tree for inherited values.
fn media_box(doc: &Document, page_id: ObjectId) -> [f64; 4] {
    let mut node = Some(page_id);

    for _ in 0..MAX_INHERITANCE_DEPTH {
        let Some(id) = node else { break };
        let Ok(dict) = doc.get_dictionary(id) else { break };

        if let Some(rect) = dict
            .get(b"MediaBox")
            .ok()
            .and_then(|obj| doc.dereference(obj).ok())
            .and_then(|(_, obj)| obj.as_array().ok())
            .and_then(|items| parse_rect(items))
        {
            return rect;
        }

        node = dict.get(b"Parent").ok().and_then(|p| p.as_reference().ok());
    }

    DEFAULT_MEDIA_BOX
}

fn parse_rect(items: &[Object]) -> Option<[f64; 4]> {
    if items.len() != 4 {
        return None;
    }
    let mut rect = [0.0; 4];
    for (slot, item) in rect.iter_mut().zip(items) {
        *slot = number(item)?;
    }
    let [x0, y0, x1, y1] = rect;
    if x1 > x0 && y1 > y0 {
        Some(rect)
    } else {
        None
    }
}
