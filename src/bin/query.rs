use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use coursevec::search::search;
use coursevec::text::preview;
use coursevec::{
    logging, CollectionName, EmbeddingArgs, MetadataFilter, MetadataValue, ModuleBundle,
    PipelineArgs, StoreArgs,
};

const PREVIEW_CHARS: usize = 100;

#[derive(Parser, Debug)]
#[command(
    name = "coursevec-query",
    about = "Run a similarity search against a loaded module collection"
)]
struct QueryCli {
    /// Search text
    #[arg(long)]
    query: String,

    /// Course id of the module (with --module-name)
    #[arg(long, requires = "module_name")]
    course_id: Option<String>,

    /// Module name as it appears in the export (with --course-id)
    #[arg(long, requires = "course_id")]
    module_name: Option<String>,

    /// Take the module identity from a processed bundle instead
    #[arg(long, conflicts_with_all = ["course_id", "module_name"])]
    bundle: Option<PathBuf>,

    /// Number of hits to print
    #[arg(long, default_value_t = 5)]
    top_k: usize,

    /// Restrict hits to one record kind (competency, mcq, checklist)
    #[arg(long)]
    doc_type: Option<String>,

    /// Extra metadata equality constraint, repeatable; numbers match numeric fields
    /// and a JSON-quoted value ("12") forces a text match
    #[arg(long = "filter", value_name = "KEY=VALUE", value_parser = parse_filter)]
    filters: Vec<(String, MetadataValue)>,

    /// Log debug events
    #[arg(long, short, default_value_t = false)]
    verbose: bool,

    #[command(flatten)]
    pipeline: PipelineArgs,

    #[command(flatten)]
    embedding: EmbeddingArgs,

    #[command(flatten)]
    store: StoreArgs,
}

fn parse_filter(raw: &str) -> Result<(String, MetadataValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {raw:?}"))?;
    if key.trim().is_empty() {
        return Err(format!("filter key is empty in {raw:?}"));
    }
    Ok((key.trim().to_string(), MetadataValue::parse_lenient(value)))
}

fn main() -> Result<()> {
    let cli = QueryCli::parse();
    logging::init(cli.verbose);
    let config = cli.pipeline.build_config()?;

    let collection = match (&cli.bundle, &cli.course_id, &cli.module_name) {
        (Some(path), _, _) => {
            let bundle = ModuleBundle::read_from(path)
                .with_context(|| format!("failed to read bundle {}", path.display()))?;
            CollectionName::for_info(&bundle.module_info)?
        }
        (None, Some(course_id), Some(module_name)) => {
            CollectionName::for_module(course_id, module_name)?
        }
        _ => anyhow::bail!("pass --bundle, or --course-id with --module-name"),
    };

    let mut filter = MetadataFilter::new();
    if let Some(doc_type) = &cli.doc_type {
        filter = filter.equals("doc_type", doc_type.as_str());
    }
    for (key, value) in &cli.filters {
        filter = filter.equals(key.as_str(), value.clone());
    }

    let embedder = cli.embedding.build_embedder(config.embedding_model_id())?;
    let mut store = cli.store.open_store(&config)?;
    let hits = search(
        &embedder,
        store.as_mut(),
        &collection,
        &cli.query,
        cli.top_k,
        &filter,
        cli.embedding.normalize_embeddings,
    )?;

    if hits.is_empty() {
        println!("no results in {collection}");
        return Ok(());
    }
    for (rank, hit) in hits.iter().enumerate() {
        let doc_type = hit
            .metadata
            .get("doc_type")
            .and_then(|value| value.as_str())
            .unwrap_or("-");
        println!(
            "{}. [{:.4}] {} ({})\n   {}",
            rank + 1,
            hit.score,
            hit.id,
            doc_type,
            preview(&hit.document, PREVIEW_CHARS)
        );
    }
    Ok(())
}
