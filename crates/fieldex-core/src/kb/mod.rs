//! Per-label knowledge base: learned anchors, enum values and region hints.

pub mod learning;
pub mod region;
pub mod store;

pub use learning::{anchor_variants, Evidence, Feedback};
pub use region::{categorize_position, dominant_region, DOMINANCE_RATIO, RESOLVER_REGIONS};
pub use store::{FileKbStore, KbStore, MemoryKbStore, StoreResult};

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::heuristics::FieldHints;

/// Learned knowledge for one label, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeBase {
    /// Normalized anchor phrases, unique under normalization.
    pub anchors: BTreeMap<String, Vec<String>>,

    /// Normalized accepted values.
    pub enums: BTreeMap<String, Vec<String>>,

    /// Region tags where the value usually sits.
    #[serde(deserialize_with = "one_or_many")]
    pub region_hint: BTreeMap<String, Vec<String>>,

    /// Observed region counts.
    pub region_counts: BTreeMap<String, BTreeMap<String, u32>>,
}

impl KnowledgeBase {
    /// An empty knowledge base.
    pub fn new() -> Self {
        Self::default()
    }

    /// Heuristic view of one field.
    pub fn field(&self, name: &str) -> FieldHints<'_> {
        FieldHints {
            anchors: slice(&self.anchors, name),
            enums: slice(&self.enums, name),
            region_hint: slice(&self.region_hint, name),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
            && self.enums.is_empty()
            && self.region_hint.is_empty()
            && self.region_counts.is_empty()
    }

    /// Names of every field mentioned anywhere in the knowledge base.
    pub fn fields(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .anchors
            .keys()
            .chain(self.enums.keys())
            .chain(self.region_hint.keys())
            .chain(self.region_counts.keys())
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

fn slice<'a>(map: &'a BTreeMap<String, Vec<String>>, name: &str) -> &'a [String] {
    map.get(name).map(Vec::as_slice).unwrap_or(&[])
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
    None(()),
}

/// Accept a bare string (or null) where a list of region tags is expected.
fn one_or_many<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, OneOrMany>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(field, value)| {
            let tags = match value {
                OneOrMany::One(tag) if tag.is_empty() => Vec::new(),
                OneOrMany::One(tag) => vec![tag],
                OneOrMany::Many(tags) => tags,
                OneOrMany::None(()) => Vec::new(),
            };
            (field, tags)
        })
        .collect())
}
