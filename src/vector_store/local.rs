//! File-backed persistent collections, one directory per collection.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::{cosine_similarity, Collection, CollectionName, MetadataFilter, SearchHit, VectorEntry};
use crate::bundle::Metadata;

const COLLECTION_FILE: &str = "collection.json";

/// Store rooted at a persist directory; collections live in `{root}/{collection_name}/`.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    embedding_model: String,
}

impl LocalStore {
    /// Opens (and creates) the store root. Vectors are tagged with `embedding_model`.
    pub fn open(root: impl Into<PathBuf>, embedding_model: impl Into<String>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create persist directory {:?}", root))?;
        Ok(Self {
            root,
            embedding_model: embedding_model.into(),
        })
    }

    /// Directory of a collection.
    pub fn collection_dir(&self, name: &CollectionName) -> PathBuf {
        self.root.join(name.as_str())
    }
}

impl super::VectorStore for LocalStore {
    fn open_or_create(&mut self, name: &CollectionName) -> Result<Box<dyn Collection + '_>> {
        let dir = self.collection_dir(name);
        let path = dir.join(COLLECTION_FILE);
        let state = if path.exists() {
            let state = CollectionFile::read(&path)?;
            anyhow::ensure!(
                state.embedding_model == self.embedding_model,
                "collection {name} was built with embedding model {:?}, not {:?}",
                state.embedding_model,
                self.embedding_model
            );
            state
        } else {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create collection directory {:?}", dir))?;
            let state = CollectionFile {
                name: name.to_string(),
                embedding_model: self.embedding_model.clone(),
                dimensions: None,
                entries: BTreeMap::new(),
            };
            state.write(&path)?;
            tracing::debug!(collection = %name, path = ?path, "created collection");
            state
        };
        Ok(Box::new(LocalCollection {
            name: name.clone(),
            path,
            state,
        }))
    }

    fn location(&self, name: &CollectionName) -> String {
        self.collection_dir(name).display().to_string()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CollectionFile {
    name: String,
    embedding_model: String,
    dimensions: Option<usize>,
    entries: BTreeMap<String, StoredEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    document: String,
    metadata: Metadata,
    embedding: Vec<f32>,
}

impl CollectionFile {
    fn read(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("failed to open {:?}", path))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("corrupt collection file {:?}", path))
    }

    fn write(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        {
            let file =
                File::create(&tmp).with_context(|| format!("failed to create {:?}", tmp))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, self)?;
            writer.flush()?;
        }
        fs::rename(&tmp, path).with_context(|| format!("failed to replace {:?}", path))?;
        Ok(())
    }
}

/// Collection held in memory and flushed to disk after every mutation.
struct LocalCollection {
    name: CollectionName,
    path: PathBuf,
    state: CollectionFile,
}

impl Collection for LocalCollection {
    fn count(&self) -> Result<usize> {
        Ok(self.state.entries.len())
    }

    fn ids(&self) -> Result<Vec<String>> {
        Ok(self.state.entries.keys().cloned().collect())
    }

    fn get(&self, id: &str) -> Result<Option<VectorEntry>> {
        Ok(self.state.entries.get(id).map(|stored| VectorEntry {
            id: id.to_string(),
            document: stored.document.clone(),
            metadata: stored.metadata.clone(),
            embedding: stored.embedding.clone(),
        }))
    }

    fn upsert(&mut self, entries: &[VectorEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut dims = self.state.dimensions;
        for entry in entries {
            anyhow::ensure!(!entry.embedding.is_empty(), "entry {} has an empty vector", entry.id);
            let expected = *dims.get_or_insert(entry.embedding.len());
            anyhow::ensure!(
                entry.embedding.len() == expected,
                "entry {} has {} dimensions, collection {} expects {}",
                entry.id,
                entry.embedding.len(),
                self.name,
                expected
            );
        }
        self.state.dimensions = dims;
        for entry in entries {
            self.state.entries.insert(
                entry.id.clone(),
                StoredEntry {
                    document: entry.document.clone(),
                    metadata: entry.metadata.clone(),
                    embedding: entry.embedding.clone(),
                },
            );
        }
        self.state.write(&self.path)
    }

    fn delete(&mut self, ids: &[String]) -> Result<usize> {
        let removed = ids
            .iter()
            .filter(|id| self.state.entries.remove(id.as_str()).is_some())
            .count();
        if removed > 0 {
            self.state.write(&self.path)?;
        }
        Ok(removed)
    }

    fn similarity_search(
        &self,
        query: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        if let Some(dims) = self.state.dimensions {
            anyhow::ensure!(
                query.len() == dims,
                "query has {} dimensions, collection {} expects {}",
                query.len(),
                self.name,
                dims
            );
        }
        let mut hits: Vec<SearchHit> = self
            .state
            .entries
            .iter()
            .filter(|(_, stored)| filter.matches(&stored.metadata))
            .map(|(id, stored)| SearchHit {
                id: id.clone(),
                document: stored.document.clone(),
                metadata: stored.metadata.clone(),
                score: cosine_similarity(query, &stored.embedding),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);
        Ok(hits)
    }
}
