//! Loads a module bundle into its vector collection via keyed upsert.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::bundle::{CanonicalRecord, ModuleBundle, RecordKind};
use crate::embedder::{embed_texts, Embedder};
use crate::error::{ExternalServiceError, PipelineWarning, Service};
use crate::vector_store::{CollectionName, VectorEntry, VectorStore};

/// Loader tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct LoaderConfig {
    /// L2-normalize vectors before storage.
    pub normalize_embeddings: bool,
    /// Delete collection ids that are absent from the bundle after upserting.
    pub prune_stale: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            normalize_embeddings: true,
            prune_stale: false,
        }
    }
}

/// Errors surfaced by the loader stage.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Embedding service or vector store failure.
    #[error(transparent)]
    ExternalService(#[from] ExternalServiceError),
    /// The bundle file could not be read or parsed.
    #[error("failed to read bundle {path:?}: {source}")]
    Bundle {
        /// Bundle path.
        path: PathBuf,
        /// Underlying I/O or parse error.
        source: std::io::Error,
    },
    /// The module identity does not yield a usable collection name.
    #[error("invalid collection name: {0:#}")]
    CollectionName(anyhow::Error),
}

/// Outcome of one load run.
#[derive(Debug, Clone)]
pub struct LoadReport {
    /// Target collection.
    pub collection: CollectionName,
    /// Where the collection lives.
    pub location: String,
    /// Vector count before the upsert.
    pub before: usize,
    /// Records submitted.
    pub upserted: usize,
    /// Stale ids removed (only with pruning enabled).
    pub pruned: usize,
    /// Vector count after the run.
    pub after: usize,
    /// Non-fatal signals raised during the run.
    pub warnings: Vec<PipelineWarning>,
}

/// Sequences embedding and upsert for one bundle.
pub struct Loader<'a> {
    embedder: &'a dyn Embedder,
    store: &'a mut dyn VectorStore,
    config: LoaderConfig,
}

impl<'a> Loader<'a> {
    /// Binds the loader to its collaborators.
    pub fn new(
        embedder: &'a dyn Embedder,
        store: &'a mut dyn VectorStore,
        config: LoaderConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            config,
        }
    }

    /// Reads a bundle from disk and loads it.
    pub fn load_path(&mut self, path: &Path) -> Result<LoadReport, LoadError> {
        tracing::info!(path = ?path, "loading preprocessed bundle");
        let bundle = ModuleBundle::read_from(path).map_err(|source| LoadError::Bundle {
            path: path.to_path_buf(),
            source,
        })?;
        self.load(&bundle)
    }

    /// Upserts every record of `bundle` into its module collection.
    ///
    /// Records go in kind order (competencies, questions, checklists), one embedding batch at a
    /// time; each batch is upserted before the next is embedded.
    pub fn load(&mut self, bundle: &ModuleBundle) -> Result<LoadReport, LoadError> {
        let mut warnings = Vec::new();
        let actual = bundle.record_count();
        if bundle.total_vectors != actual {
            warnings.push(
                PipelineWarning::BundleCountMismatch {
                    declared: bundle.total_vectors,
                    actual,
                }
                .emit(),
            );
        }
        tracing::info!(
            total = actual,
            competencies = bundle.competencies.len(),
            mcqs = bundle.mcqs.len(),
            checklists = bundle.checklists.len(),
            "bundle loaded"
        );

        let name =
            CollectionName::for_info(&bundle.module_info).map_err(LoadError::CollectionName)?;
        let location = self.store.location(&name);
        let embedder = self.embedder;
        let config = self.config;
        tracing::info!(collection = %name, model = embedder.model_id(), "opening collection");

        let mut collection = self.store.open_or_create(&name).map_err(store_error)?;
        let before = collection.count().map_err(store_error)?;
        if before > 0 {
            warnings.push(
                PipelineWarning::ExistingCollection {
                    collection: name.to_string(),
                    count: before,
                }
                .emit(),
            );
        }

        let records: Vec<(RecordKind, &CanonicalRecord)> = bundle.records().collect();
        let mut upserted = 0usize;
        for batch in records.chunks(embedder.batch_size().max(1)) {
            let texts: Vec<&str> = batch
                .iter()
                .map(|(_, record)| record.embedding_text.as_str())
                .collect();
            let vectors = embed_texts(embedder, &texts, config.normalize_embeddings)
                .map_err(|err| ExternalServiceError::new(Service::Embedding, err))?;
            let entries: Vec<VectorEntry> = batch
                .iter()
                .zip(vectors)
                .map(|((_, record), embedding)| VectorEntry {
                    id: record.id.clone(),
                    document: record.embedding_text.clone(),
                    metadata: record.metadata.clone(),
                    embedding,
                })
                .collect();
            collection.upsert(&entries).map_err(store_error)?;
            upserted += entries.len();
            tracing::debug!(upserted, total = records.len(), "upserted batch");
        }

        let mut pruned = 0usize;
        if config.prune_stale {
            let current: HashSet<&str> = records.iter().map(|(_, r)| r.id.as_str()).collect();
            let stale: Vec<String> = collection
                .ids()
                .map_err(store_error)?
                .into_iter()
                .filter(|id| !current.contains(id.as_str()))
                .collect();
            if !stale.is_empty() {
                pruned = collection.delete(&stale).map_err(store_error)?;
                tracing::info!(pruned, "removed stale ids");
            }
        }

        let after = collection.count().map_err(store_error)?;
        tracing::info!(
            collection = %name,
            before,
            upserted,
            after,
            location = %location,
            "vector collection built/updated"
        );
        Ok(LoadReport {
            collection: name,
            location,
            before,
            upserted,
            pruned,
            after,
            warnings,
        })
    }
}

fn store_error(err: anyhow::Error) -> LoadError {
    ExternalServiceError::new(Service::VectorStore, err).into()
}
