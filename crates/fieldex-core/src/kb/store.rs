//! Knowledge base persistence.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, trace};

use super::learning::Feedback;
use super::KnowledgeBase;
use crate::error::StoreError;
use crate::models::Schema;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Trait for knowledge base stores.
///
/// A missing label is never an error: it loads as an empty knowledge base.
/// Writes replace the whole record.
pub trait KbStore: Send + Sync {
    /// Load the record for `label`, or an empty one.
    fn load(&self, label: &str) -> StoreResult<KnowledgeBase>;

    /// Replace the record for `label`.
    fn save(&self, label: &str, kb: &KnowledgeBase) -> StoreResult<()>;

    /// Load, apply `f`, and save if `f` reports a change, as one step per
    /// label. Returns the resulting knowledge base.
    fn modify(
        &self,
        label: &str,
        f: &mut dyn FnMut(&mut KnowledgeBase) -> bool,
    ) -> StoreResult<KnowledgeBase>;

    /// Delete the record for `label`. Returns whether one existed.
    fn remove(&self, label: &str) -> StoreResult<bool>;

    /// Labels with a stored record, sorted.
    fn labels(&self) -> StoreResult<Vec<String>>;

    /// Seed anchors for schema fields that have none.
    fn init_from_schema(&self, label: &str, schema: &Schema) -> StoreResult<KnowledgeBase> {
        self.modify(label, &mut |kb| kb.seed_from_schema(schema))
    }

    /// Learn from one run. Returns whether the record changed.
    fn update(&self, label: &str, feedback: &Feedback) -> StoreResult<bool> {
        let mut changed = false;
        self.modify(label, &mut |kb| {
            changed = kb.learn(feedback);
            changed
        })?;
        Ok(changed)
    }
}

/// Store keeping one pretty-printed JSON file per label.
///
/// Updates for one label are serialized within a store instance. Each save
/// writes a temporary file and renames it over the record, so readers in
/// other processes never see a partial file.
///
/// File names keep the label's case. On a case-insensitive filesystem,
/// labels that differ only by case share one record.
pub struct FileKbStore {
    dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FileKbStore {
    /// Create a store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Record path for `label`.
    pub fn path_for(&self, label: &str) -> PathBuf {
        self.dir.join(format!("label_{}.json", escape_label(label)))
    }

    /// Run `f` holding the lock for `label`. The lock entry is dropped once
    /// no other caller holds or waits on it.
    fn with_label_lock<T>(&self, label: &str, f: impl FnOnce() -> T) -> T {
        let lock = self
            .locks
            .lock()
            .entry(label.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock();
            f()
        };

        let mut locks = self.locks.lock();
        // One reference in the map, one here.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(label);
        }
        result
    }

    fn read_record(&self, label: &str) -> StoreResult<KnowledgeBase> {
        let path = self.path_for(label);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                trace!("No record for label '{}'", label);
                return Ok(KnowledgeBase::new());
            }
            Err(source) => {
                return Err(StoreError::Io {
                    label: label.to_string(),
                    source,
                })
            }
        };

        serde_json::from_str(&content).map_err(|source| StoreError::Json {
            label: label.to_string(),
            source,
        })
    }

    fn write_record(&self, label: &str, kb: &KnowledgeBase) -> StoreResult<()> {
        let io_err = |source| StoreError::Io {
            label: label.to_string(),
            source,
        };

        std::fs::create_dir_all(&self.dir).map_err(io_err)?;

        let content = serde_json::to_string_pretty(kb).map_err(|source| StoreError::Json {
            label: label.to_string(),
            source,
        })?;

        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(io_err)?;
        tmp.write_all(content.as_bytes()).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;

        let path = self.path_for(label);
        tmp.persist(&path).map_err(|e| StoreError::Persist {
            label: label.to_string(),
            reason: e.to_string(),
        })?;

        debug!("Saved knowledge base for '{}' to {}", label, path.display());
        Ok(())
    }
}

impl KbStore for FileKbStore {
    fn load(&self, label: &str) -> StoreResult<KnowledgeBase> {
        self.read_record(label)
    }

    fn save(&self, label: &str, kb: &KnowledgeBase) -> StoreResult<()> {
        self.with_label_lock(label, || self.write_record(label, kb))
    }

    fn modify(
        &self,
        label: &str,
        f: &mut dyn FnMut(&mut KnowledgeBase) -> bool,
    ) -> StoreResult<KnowledgeBase> {
        self.with_label_lock(label, || {
            let mut kb = self.read_record(label)?;
            if f(&mut kb) {
                self.write_record(label, &kb)?;
            }
            Ok(kb)
        })
    }

    fn remove(&self, label: &str) -> StoreResult<bool> {
        self.with_label_lock(label, || match std::fs::remove_file(self.path_for(label)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Io {
                label: label.to_string(),
                source,
            }),
        })
    }

    fn labels(&self) -> StoreResult<Vec<String>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    label: String::new(),
                    source,
                })
            }
        };

        let mut labels: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                let escaped = name.strip_prefix("label_")?.strip_suffix(".json")?;
                unescape_label(escaped)
            })
            .collect();
        labels.sort();
        Ok(labels)
    }
}

/// Escape `label` into a file-name-safe, reversible form.
///
/// `[A-Za-z0-9_-]` pass through; every other byte becomes `%XX`.
pub fn escape_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for byte in label.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn unescape_label(escaped: &str) -> Option<String> {
    let bytes = escaped.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = escaped.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// In-process store.
#[derive(Default)]
pub struct MemoryKbStore {
    records: Mutex<HashMap<String, KnowledgeBase>>,
    writes: AtomicUsize,
}

impl MemoryKbStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of writes performed so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl KbStore for MemoryKbStore {
    fn load(&self, label: &str) -> StoreResult<KnowledgeBase> {
        Ok(self.records.lock().get(label).cloned().unwrap_or_default())
    }

    fn save(&self, label: &str, kb: &KnowledgeBase) -> StoreResult<()> {
        self.records.lock().insert(label.to_string(), kb.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn modify(
        &self,
        label: &str,
        f: &mut dyn FnMut(&mut KnowledgeBase) -> bool,
    ) -> StoreResult<KnowledgeBase> {
        let mut records = self.records.lock();
        let mut kb = records.get(label).cloned().unwrap_or_default();
        if f(&mut kb) {
            records.insert(label.to_string(), kb.clone());
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(kb)
    }

    fn remove(&self, label: &str) -> StoreResult<bool> {
        Ok(self.records.lock().remove(label).is_some())
    }

    fn labels(&self) -> StoreResult<Vec<String>> {
        let mut labels: Vec<String> = self.records.lock().keys().cloned().collect();
        labels.sort();
        Ok(labels)
    }
}
