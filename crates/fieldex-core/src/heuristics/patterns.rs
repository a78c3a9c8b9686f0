//! Regex patterns and keyword lists for anchor matching.

use lazy_static::lazy_static;
use regex::Regex;

/// Characters accepted between an anchor and its value.
pub const SEPARATORS: &[char] = &[':', '：', '-', '–', '—'];

/// Anchor-line keywords that make the whole next line the value.
pub const NEXT_LINE_KEYWORDS: &[&str] = &["profissional", "completo", "numero", "nome"];

lazy_static! {
    // Capture made of separators and spacing only
    pub static ref SEPARATOR_ONLY: Regex = Regex::new(
        r"^[\s:：\-–—]*$"
    ).unwrap();
}

/// Same-line pattern for a normalized anchor.
///
/// Matches the anchor with flexible internal spacing, a separator, and
/// captures the rest of the line. Intended for text folded the same way
/// as the anchor.
pub fn same_line_pattern(normalized_anchor: &str) -> Option<Regex> {
    let words: Vec<String> = normalized_anchor.split_whitespace().map(regex::escape).collect();
    if words.is_empty() {
        return None;
    }

    Regex::new(&format!(r"{}\s*[:：\-–—]\s*(.+?)\s*$", words.join(r"\s+"))).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_line_pattern_flexible_spacing() {
        let re = same_line_pattern("nome completo").unwrap();
        let caps = re.captures("nome   completo : maria silva ").unwrap();
        assert_eq!(&caps[1], "maria silva");
        assert!(re.captures("nome completo maria").is_none());
    }

    #[test]
    fn test_same_line_pattern_escapes_anchor() {
        let re = same_line_pattern("n.o (x)").unwrap();
        assert!(re.is_match("n.o (x): 12"));
        assert!(!re.is_match("nao (x): 12"));
        assert!(same_line_pattern("   ").is_none());
    }

    #[test]
    fn test_separator_only() {
        assert!(SEPARATOR_ONLY.is_match(" - : "));
        assert!(SEPARATOR_ONLY.is_match("—"));
        assert!(!SEPARATOR_ONLY.is_match("- 12"));
    }
}
