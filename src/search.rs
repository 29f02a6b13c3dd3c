//! Similarity search over a loaded module collection.

use crate::embedder::{embed_texts, Embedder};
use crate::error::{ExternalServiceError, Service};
use crate::vector_store::{CollectionName, MetadataFilter, SearchHit, VectorStore};

/// Embeds `query` and returns the top `k` hits of `collection` that match `filter`.
///
/// Queries are normalized the same way stored vectors were, so `normalize` must match the
/// setting used at load time.
pub fn search(
    embedder: &dyn Embedder,
    store: &mut dyn VectorStore,
    collection: &CollectionName,
    query: &str,
    k: usize,
    filter: &MetadataFilter,
    normalize: bool,
) -> Result<Vec<SearchHit>, ExternalServiceError> {
    let vector = embed_texts(embedder, &[query], normalize)
        .map_err(|err| ExternalServiceError::new(Service::Embedding, err))?
        .pop()
        .ok_or_else(|| {
            ExternalServiceError::new(
                Service::Embedding,
                anyhow::anyhow!("no vector returned for the query"),
            )
        })?;
    let store_err = |err: anyhow::Error| ExternalServiceError::new(Service::VectorStore, err);
    let opened = store.open_or_create(collection).map_err(store_err)?;
    let hits = opened
        .similarity_search(&vector, k, filter)
        .map_err(store_err)?;
    tracing::debug!(collection = %collection, hits = hits.len(), "similarity search finished");
    Ok(hits)
}
