#![warn(missing_docs)]
//! Course-module vectorization pipeline.
//!
//! A raw module export is normalized into a [`ModuleBundle`] of competency, question and
//! checklist records, written to disk, then embedded and upserted into a per-module vector
//! collection by the [`Loader`].

pub mod bundle;
pub mod config;
pub mod embedder;
pub mod error;
pub mod loader;
pub mod logging;
pub mod normalizer;
pub mod raw;
pub mod search;
pub mod text;
pub mod vector_store;

pub use bundle::{CanonicalRecord, Metadata, MetadataValue, ModuleBundle, RecordKind};
pub use config::{EmbeddingArgs, PipelineArgs, PipelineConfig, StoreArgs, StoreBackend};
pub use embedder::Embedder;
pub use error::{ExternalServiceError, MalformedInputError, PipelineWarning, Service};
pub use loader::{LoadError, LoadReport, Loader, LoaderConfig};
pub use normalizer::{NormalizationConfig, NormalizeError, NormalizedModule, Normalizer};
pub use raw::{ModuleInfo, RawModuleExport, SourceId};
pub use vector_store::{CollectionName, MetadataFilter, SearchHit, VectorStore};
