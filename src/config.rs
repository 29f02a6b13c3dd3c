//! Pipeline configuration and the command-line groups shared by the binaries.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};

use crate::bundle::ModuleBundle;
use crate::embedder::openai::OpenAiEmbedder;
use crate::vector_store::local::LocalStore;
use crate::vector_store::pgvector::PgVectorStore;
use crate::vector_store::VectorStore;

/// Default character budget (~512 tokens at ~4 characters per token).
pub const DEFAULT_MAX_CHARS: usize = 2048;
/// Default embedding model identifier.
pub const DEFAULT_EMBEDDING_MODEL: &str = "abhinand/MedEmbed-small-v0.1";

/// Explicit configuration handed to each stage at construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    input_path: PathBuf,
    output_dir: PathBuf,
    persist_dir: PathBuf,
    embedding_model_id: String,
    max_chars: usize,
}

impl PipelineConfig {
    /// Constructs a validated configuration.
    pub fn new(
        input_path: PathBuf,
        output_dir: PathBuf,
        persist_dir: PathBuf,
        embedding_model_id: String,
        max_chars: usize,
    ) -> Result<Self> {
        anyhow::ensure!(max_chars > 0, "max_chars must be positive");
        anyhow::ensure!(
            !embedding_model_id.trim().is_empty(),
            "embedding model id is required"
        );
        Ok(Self {
            input_path,
            output_dir,
            persist_dir,
            embedding_model_id,
            max_chars,
        })
    }

    /// Raw module export consumed by the normalizer.
    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    /// Directory holding intermediate bundles.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Root directory of the persistent vector store.
    pub fn persist_dir(&self) -> &Path {
        &self.persist_dir
    }

    /// Embedding model identity.
    pub fn embedding_model_id(&self) -> &str {
        &self.embedding_model_id
    }

    /// Character budget for embedding text.
    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// `{output_dir}/processed_module_{course_id}.json`.
    pub fn bundle_path(&self, course_id: &str) -> PathBuf {
        self.output_dir.join(ModuleBundle::file_name(course_id))
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("data/raw/module.json"),
            output_dir: PathBuf::from("data/preprocessed"),
            persist_dir: PathBuf::from("vectorstore/chroma"),
            embedding_model_id: DEFAULT_EMBEDDING_MODEL.to_string(),
            max_chars: DEFAULT_MAX_CHARS,
        }
    }
}

/// Flags for the five pipeline options, shared by every binary.
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    /// Raw module export (JSON)
    #[arg(long, env = "COURSEVEC_INPUT", default_value = "data/raw/module.json")]
    pub input: PathBuf,

    /// Directory for processed_module_{course_id}.json artifacts
    #[arg(long, env = "COURSEVEC_OUTPUT_DIR", default_value = "data/preprocessed")]
    pub output_dir: PathBuf,

    /// Root directory of the persistent vector store
    #[arg(long, env = "COURSEVEC_PERSIST_DIR", default_value = "vectorstore/chroma")]
    pub persist_dir: PathBuf,

    /// Embedding model identifier
    #[arg(long, env = "COURSEVEC_EMBED_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    pub embedding_model: String,

    /// Character budget for embedding text before a hard cut
    #[arg(long, env = "COURSEVEC_MAX_CHARS", default_value_t = DEFAULT_MAX_CHARS)]
    pub max_chars: usize,
}

impl PipelineArgs {
    /// Converts the parsed flags into a `PipelineConfig`.
    pub fn build_config(&self) -> Result<PipelineConfig> {
        PipelineConfig::new(
            self.input.clone(),
            self.output_dir.clone(),
            self.persist_dir.clone(),
            self.embedding_model.trim().to_string(),
            self.max_chars,
        )
    }
}

/// Embedding service connection flags.
#[derive(Args, Debug, Clone)]
pub struct EmbeddingArgs {
    /// Base URL of an OpenAI-compatible embeddings API
    #[arg(
        long,
        env = "COURSEVEC_EMBED_BASE",
        default_value = "http://127.0.0.1:8080/v1"
    )]
    pub embed_base_url: String,

    /// API key sent as a bearer token (optional for local inference servers)
    #[arg(long, env = "COURSEVEC_EMBED_API_KEY")]
    pub embed_api_key: Option<String>,

    /// Max texts per embedding request
    #[arg(long, env = "COURSEVEC_EMBED_BATCH", default_value_t = 32)]
    pub embed_batch_size: usize,

    /// Seconds to wait for each embedding request
    #[arg(long, env = "COURSEVEC_EMBED_TIMEOUT_SECS", default_value_t = 60)]
    pub embed_timeout_secs: u64,

    /// Attempts per request on rate limits or transient errors
    #[arg(long, env = "COURSEVEC_EMBED_MAX_RETRIES", default_value_t = 3)]
    pub embed_max_retries: usize,

    /// L2-normalize vectors before storage
    #[arg(
        long,
        env = "COURSEVEC_NORMALIZE_EMBEDDINGS",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub normalize_embeddings: bool,
}

impl EmbeddingArgs {
    /// Builds the HTTP embedding client for `model`.
    pub fn build_embedder(&self, model: &str) -> Result<OpenAiEmbedder> {
        OpenAiEmbedder::new(
            self.embed_api_key.clone(),
            self.embed_base_url.clone(),
            model.to_string(),
            Duration::from_secs(self.embed_timeout_secs.max(1)),
            self.embed_max_retries.max(1),
            self.embed_batch_size.max(1),
        )
    }
}

/// Vector store backends.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum StoreBackend {
    /// File-backed collections under the persist directory.
    Local,
    /// Postgres tables with the pgvector extension.
    Pgvector,
}

/// Vector store selection flags.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Storage backend for collections
    #[arg(long, env = "COURSEVEC_STORE", value_enum, default_value = "local")]
    pub store: StoreBackend,

    /// Postgres connection string (pgvector backend only)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Schema holding collection tables (pgvector backend only)
    #[arg(long, env = "COURSEVEC_PG_SCHEMA", default_value = "public")]
    pub pg_schema: String,
}

impl StoreArgs {
    /// Opens the configured backend.
    pub fn open_store(&self, config: &PipelineConfig) -> Result<Box<dyn VectorStore>> {
        match self.store {
            StoreBackend::Local => {
                let store = LocalStore::open(config.persist_dir(), config.embedding_model_id())
                    .with_context(|| {
                        format!("failed to open local store at {:?}", config.persist_dir())
                    })?;
                Ok(Box::new(store))
            }
            StoreBackend::Pgvector => {
                let url = self
                    .database_url
                    .as_deref()
                    .context("--database-url is required for the pgvector backend")?;
                let store = PgVectorStore::connect(url, &self.pg_schema)?;
                Ok(Box::new(store))
            }
        }
    }
}
