//! String canonicalization for matching and output.
//!
//! Every comparison between anchors, enum values and candidate values goes
//! through [`normalize_for_matching`]. Output values only get whitespace
//! cleanup via [`normalize_for_output`].

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Canonical form for case, accent and whitespace insensitive comparison.
///
/// Lowercases, strips diacritics, transliterates the Latin letters that do
/// not decompose (`ß`, `æ`, `œ`, `ø`, `ł`, `đ`, `þ`), collapses runs of
/// whitespace to one space and trims. Idempotent.
pub fn normalize_for_matching(s: &str) -> String {
    let mut folded = String::with_capacity(s.len());
    for c in s.chars() {
        fold_char(c, &mut folded);
    }
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Clean an extracted value for output.
///
/// Collapses whitespace and trims, keeping casing and accents. Returns
/// `None` when nothing is left.
pub fn normalize_for_output(value: impl AsRef<str>) -> Option<String> {
    let cleaned = value.as_ref().split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Fold `s` like [`normalize_for_matching`] without touching whitespace,
/// returning the folded text and, for every byte of it (plus one past the
/// end), the byte offset of the source character in `s`.
pub(crate) fn fold_with_offsets(s: &str) -> (String, Vec<usize>) {
    let mut folded = String::with_capacity(s.len());
    let mut offsets = Vec::with_capacity(s.len() + 1);

    for (idx, c) in s.char_indices() {
        let before = folded.len();
        fold_char(c, &mut folded);
        offsets.resize(offsets.len() + (folded.len() - before), idx);
    }
    offsets.push(s.len());

    (folded, offsets)
}

fn fold_char(c: char, out: &mut String) {
    for lower in c.to_lowercase() {
        for d in lower.nfd() {
            if is_combining_mark(d) {
                continue;
            }
            match d {
                'ß' => out.push_str("ss"),
                'æ' => out.push_str("ae"),
                'œ' => out.push_str("oe"),
                'ø' => out.push('o'),
                'ł' => out.push('l'),
                'đ' => out.push('d'),
                'þ' => out.push_str("th"),
                other => out.push(other),
            }
        }
    }
}
