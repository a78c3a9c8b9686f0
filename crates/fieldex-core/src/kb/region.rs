//! Page regions: classification and dominance.

use std::collections::BTreeMap;

/// Share of observations a region needs to become a hint.
pub const DOMINANCE_RATIO: f64 = 0.6;

/// Region tags accepted from resolver metadata.
pub const RESOLVER_REGIONS: &[&str] = &[
    "top_left",
    "top_right",
    "bottom_left",
    "bottom_right",
    "header",
    "footer",
    "body",
];

const FIRST_THIRD: f64 = 0.33;
const SECOND_THIRD: f64 = 0.67;

/// Classify a page-relative position into one of nine regions.
///
/// The middle cell is `center`; the other middle-row cells are
/// `middle_left` and `middle_right`.
pub fn categorize_position(x_rel: f64, y_rel: f64) -> &'static str {
    let row = band(y_rel);
    let col = band(x_rel);

    match (row, col) {
        (0, 0) => "top_left",
        (0, 1) => "top_center",
        (0, _) => "top_right",
        (1, 0) => "middle_left",
        (1, 1) => "center",
        (1, _) => "middle_right",
        (_, 0) => "bottom_left",
        (_, 1) => "bottom_center",
        _ => "bottom_right",
    }
}

fn band(value: f64) -> u8 {
    if value < FIRST_THIRD {
        0
    } else if value < SECOND_THIRD {
        1
    } else {
        2
    }
}

/// Region holding at least [`DOMINANCE_RATIO`] of all observations.
pub fn dominant_region(counts: &BTreeMap<String, u32>) -> Option<&str> {
    let total: u64 = counts.values().map(|&c| u64::from(c)).sum();
    if total == 0 {
        return None;
    }

    let (region, count) = counts.iter().max_by_key(|(_, count)| **count)?;
    if f64::from(*count) / total as f64 >= DOMINANCE_RATIO {
        Some(region.as_str())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(entries: &[(&str, u32)]) -> BTreeMap<String, u32> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_categorize_grid() {
        assert_eq!(categorize_position(0.1, 0.1), "top_left");
        assert_eq!(categorize_position(0.5, 0.1), "top_center");
        assert_eq!(categorize_position(0.9, 0.1), "top_right");
        assert_eq!(categorize_position(0.1, 0.5), "middle_left");
        assert_eq!(categorize_position(0.5, 0.5), "center");
        assert_eq!(categorize_position(0.9, 0.5), "middle_right");
        assert_eq!(categorize_position(0.1, 0.9), "bottom_left");
        assert_eq!(categorize_position(0.5, 0.9), "bottom_center");
        assert_eq!(categorize_position(0.9, 0.9), "bottom_right");
    }

    #[test]
    fn test_categorize_is_total() {
        let labels = [
            "top_left",
            "top_center",
            "top_right",
            "middle_left",
            "center",
            "middle_right",
            "bottom_left",
            "bottom_center",
            "bottom_right",
        ];
        for i in 0..=20 {
            for j in 0..=20 {
                let region = categorize_position(i as f64 / 20.0, j as f64 / 20.0);
                assert!(labels.contains(&region), "unexpected region {region}");
            }
        }
        assert_eq!(categorize_position(0.33, 0.67), "bottom_center");
        assert_eq!(categorize_position(0.0, 1.0), "bottom_left");
    }

    #[test]
    fn test_dominant_region() {
        assert_eq!(dominant_region(&counts(&[("top_left", 8), ("header", 2)])), Some("top_left"));
        assert_eq!(dominant_region(&counts(&[("top_left", 5), ("header", 5)])), None);
        assert_eq!(dominant_region(&counts(&[("center", 3), ("footer", 2)])), Some("center"));
        assert_eq!(dominant_region(&counts(&[])), None);
        assert_eq!(dominant_region(&counts(&[("center", 0)])), None);
    }
}
