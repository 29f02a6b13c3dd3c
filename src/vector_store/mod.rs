//! Vector store interface: named collections with keyed upsert and similarity search.

pub mod local;
pub mod pgvector;

use std::collections::BTreeMap;
use std::fmt;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::bundle::{Metadata, MetadataValue};
use crate::raw::ModuleInfo;

/// Deterministic collection identifier: `module_{course_id}_{normalized_module_name}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionName(String);

impl CollectionName {
    /// Derives the collection name for a module.
    ///
    /// The module name is lower-cased and spaces become underscores; nothing else changes,
    /// so existing collections keep their address across runs.
    pub fn for_module(course_id: &str, module_name: &str) -> Result<Self> {
        anyhow::ensure!(!course_id.trim().is_empty(), "course id is required");
        anyhow::ensure!(!module_name.trim().is_empty(), "module name is required");
        let normalized = module_name.to_lowercase().replace(' ', "_");
        Self::new(format!("module_{course_id}_{normalized}"))
    }

    /// Collection name for a bundle's identity block.
    pub fn for_info(info: &ModuleInfo) -> Result<Self> {
        Self::for_module(&info.course_id.to_string(), &info.competency_name)
    }

    /// Wraps an explicit name, rejecting values unusable as a directory or table name.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        anyhow::ensure!(!name.trim().is_empty(), "collection name is required");
        anyhow::ensure!(
            name != "." && name != "..",
            "collection name {name:?} is reserved"
        );
        anyhow::ensure!(
            !name.contains(['/', '\\', '\0']),
            "collection name {name:?} contains a path separator"
        );
        Ok(Self(name))
    }

    /// Raw name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One record submitted to a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorEntry {
    /// Upsert key.
    pub id: String,
    /// Text the vector was computed from.
    pub document: String,
    /// Flat metadata.
    pub metadata: Metadata,
    /// Embedding vector.
    pub embedding: Vec<f32>,
}

/// Ranked similarity search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Record id.
    pub id: String,
    /// Stored text.
    pub document: String,
    /// Stored metadata.
    pub metadata: Metadata,
    /// Cosine similarity to the query (higher is closer).
    pub score: f32,
}

/// Conjunction of metadata equality constraints.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetadataFilter(BTreeMap<String, MetadataValue>);

impl MetadataFilter {
    /// Empty filter that matches everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a `key == value` constraint.
    pub fn equals(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Whether `metadata` satisfies every constraint.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.0
            .iter()
            .all(|(key, expected)| metadata.get(key) == Some(expected))
    }
}

/// A named, persistent set of vectors.
pub trait Collection {
    /// Number of stored vectors.
    fn count(&self) -> Result<usize>;

    /// Every stored id.
    fn ids(&self) -> Result<Vec<String>>;

    /// Stored entry for `id`, if any.
    fn get(&self, id: &str) -> Result<Option<VectorEntry>>;

    /// Inserts new ids and fully replaces existing ones.
    fn upsert(&mut self, entries: &[VectorEntry]) -> Result<()>;

    /// Removes the given ids; returns how many existed.
    fn delete(&mut self, ids: &[String]) -> Result<usize>;

    /// Top-`k` entries by cosine similarity among those matching `filter`.
    fn similarity_search(
        &self,
        query: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<SearchHit>>;
}

/// Backend able to open or create named collections.
pub trait VectorStore {
    /// Opens `name`, creating it empty when missing.
    fn open_or_create(&mut self, name: &CollectionName) -> Result<Box<dyn Collection + '_>>;

    /// Human readable location of a collection, for logs.
    fn location(&self, name: &CollectionName) -> String;
}

/// Cosine similarity; zero-length vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
