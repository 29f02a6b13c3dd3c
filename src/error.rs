//! Error taxonomy and non-fatal warnings shared by both pipeline stages.

use std::fmt;

use thiserror::Error;

use crate::bundle::RecordKind;

/// A required structural field is missing or unusable in the raw export.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed module export: {reason}")]
pub struct MalformedInputError {
    reason: String,
}

impl MalformedInputError {
    /// Builds a new error with a human readable reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Returns the reason string.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// External collaborator that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// Embedding model endpoint.
    Embedding,
    /// Vector store backend.
    VectorStore,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Embedding => write!(f, "embedding"),
            Self::VectorStore => write!(f, "vector store"),
        }
    }
}

/// Failure reported by the embedding service or the vector store. Always fatal.
#[derive(Debug, Error)]
#[error("{service} service failed: {message}")]
pub struct ExternalServiceError {
    service: Service,
    message: String,
}

impl ExternalServiceError {
    /// Wraps a collaborator error, keeping its full context chain in the message.
    pub fn new(service: Service, err: anyhow::Error) -> Self {
        Self {
            service,
            message: format!("{err:#}"),
        }
    }

    /// Which collaborator failed.
    pub fn service(&self) -> Service {
        self.service
    }
}

/// Non-fatal signals raised while normalizing or loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineWarning {
    /// Embedding text exceeded the character budget and was hard-cut.
    Truncated {
        /// Record kind that was truncated.
        kind: RecordKind,
        /// Record identifier.
        id: String,
        /// Length in characters before truncation.
        original_chars: usize,
        /// Character budget applied.
        max_chars: usize,
    },
    /// Checklist rendering fell back to the compact template.
    ChecklistCompressed {
        /// Checklist question id.
        id: String,
    },
    /// Two records in one bundle share an id; the later one wins on upsert.
    DuplicateId {
        /// Colliding identifier.
        id: String,
        /// Kind of the record that collides with an earlier one.
        kind: RecordKind,
    },
    /// The target collection already held vectors before the upsert.
    ExistingCollection {
        /// Collection name.
        collection: String,
        /// Vector count before the upsert.
        count: usize,
    },
    /// The bundle's stored `total_vectors` disagrees with its record lists.
    BundleCountMismatch {
        /// Count stored in the artifact.
        declared: usize,
        /// Records actually present.
        actual: usize,
    },
}

impl fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated {
                kind,
                id,
                original_chars,
                max_chars,
            } => write!(
                f,
                "{kind} {id} text truncated: {original_chars} -> {max_chars} chars"
            ),
            Self::ChecklistCompressed { id } => {
                write!(f, "checklist {id} too long, using compact template")
            }
            Self::DuplicateId { id, kind } => {
                write!(f, "{kind} id {id} collides with an earlier record")
            }
            Self::ExistingCollection { collection, count } => write!(
                f,
                "collection {collection} already holds {count} vectors; upserting replaces matching ids"
            ),
            Self::BundleCountMismatch { declared, actual } => write!(
                f,
                "bundle declares {declared} vectors but carries {actual} records"
            ),
        }
    }
}

impl PipelineWarning {
    /// Logs the warning and hands it back so callers can record it.
    pub(crate) fn emit(self) -> Self {
        tracing::warn!("{self}");
        self
    }
}
