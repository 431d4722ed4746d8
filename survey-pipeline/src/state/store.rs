//! In-process pipeline state store.
//!
//! One bucket per step plus the raw-input bucket. Each bucket maps a source
//! (file stem, subject, consolidation prefix) to its named tables. Tables are
//! shared by `Arc`, so carrying a predecessor's output forward is cheap.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::domain::step::BucketKey;
use crate::domain::table::Table;

pub type TableRef = Arc<Table>;

/// The named tables produced for one source.
#[derive(Debug, Clone, Default)]
pub struct SourceTables {
    name: String,
    tables: Vec<(String, TableRef)>,
}

impl SourceTables {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, table: &str) -> Option<&TableRef> {
        self.tables
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, t)| t)
    }

    pub fn tables(&self) -> impl Iterator<Item = (&str, &TableRef)> {
        self.tables.iter().map(|(name, t)| (name.as_str(), t))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Insertion-ordered source -> table -> data mapping.
#[derive(Debug, Clone, Default)]
pub struct Bucket {
    sources: Vec<SourceTables>,
}

impl Bucket {
    pub const fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Insert or replace a table, keeping first-insertion order.
    pub fn insert(&mut self, source: &str, table: &str, data: impl Into<TableRef>) {
        let data = data.into();
        let entry = match self.sources.iter_mut().position(|s| s.name == source) {
            Some(i) => &mut self.sources[i],
            None => {
                self.sources.push(SourceTables {
                    name: source.to_string(),
                    tables: Vec::new(),
                });
                let last = self.sources.len() - 1;
                &mut self.sources[last]
            }
        };
        match entry.tables.iter_mut().find(|(name, _)| name == table) {
            Some(slot) => slot.1 = data,
            None => entry.tables.push((table.to_string(), data)),
        }
    }

    pub fn get(&self, source: &str, table: &str) -> Option<&TableRef> {
        self.source(source).and_then(|s| s.get(table))
    }

    pub fn source(&self, source: &str) -> Option<&SourceTables> {
        self.sources.iter().find(|s| s.name == source)
    }

    pub fn sources(&self) -> impl Iterator<Item = &SourceTables> {
        self.sources.iter()
    }

    /// Every `(source, table, data)` triple in insertion order.
    pub fn iter_tables(&self) -> impl Iterator<Item = (&str, &str, &TableRef)> {
        self.sources.iter().flat_map(|s| {
            s.tables
                .iter()
                .map(move |(name, t)| (s.name.as_str(), name.as_str(), t))
        })
    }

    pub fn table_count(&self) -> usize {
        self.sources.iter().map(SourceTables::len).sum()
    }

    /// True when the bucket holds no tables at all.
    pub fn is_empty(&self) -> bool {
        self.table_count() == 0
    }

    /// Copy every table of `other` into this bucket (shared, not deep-copied).
    pub fn extend_from(&mut self, other: &Bucket) {
        for (source, table, data) in other.iter_tables() {
            self.insert(source, table, Arc::clone(data));
        }
    }

    pub fn clear(&mut self) {
        self.sources.clear();
    }
}

static EMPTY_BUCKET: Bucket = Bucket::new();

/// The whole process-wide store.
#[derive(Debug)]
pub struct PipelineStore {
    buckets: HashMap<BucketKey, Bucket>,
}

impl Default for PipelineStore {
    fn default() -> Self {
        Self {
            buckets: BucketKey::all().map(|k| (k, Bucket::new())).collect(),
        }
    }
}

impl PipelineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a bucket. Never missing: unknown keys read as empty.
    pub fn bucket(&self, key: BucketKey) -> &Bucket {
        self.buckets.get(&key).unwrap_or(&EMPTY_BUCKET)
    }

    pub fn bucket_mut(&mut self, key: BucketKey) -> &mut Bucket {
        self.buckets.entry(key).or_default()
    }

    pub fn is_empty(&self, key: BucketKey) -> bool {
        self.bucket(key).is_empty()
    }

    pub fn clear_bucket(&mut self, key: BucketKey) {
        self.bucket_mut(key).clear();
    }

    /// Swap in a new bucket wholesale.
    pub fn replace(&mut self, key: BucketKey, bucket: Bucket) {
        self.buckets.insert(key, bucket);
    }

    /// Take a bucket out, leaving it empty.
    pub fn take(&mut self, key: BucketKey) -> Bucket {
        std::mem::take(self.bucket_mut(key))
    }

    /// Reset to empty buckets for every known key.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Handle shared by the orchestrator and the step runner.
pub type SharedStore = Arc<Mutex<PipelineStore>>;

pub fn shared_store() -> SharedStore {
    Arc::new(Mutex::new(PipelineStore::new()))
}
