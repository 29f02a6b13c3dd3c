use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use coursevec::{logging, EmbeddingArgs, Loader, LoaderConfig, PipelineArgs, StoreArgs};

#[derive(Parser, Debug)]
#[command(
    name = "coursevec-load",
    about = "Embed a processed module bundle and upsert it into its vector collection"
)]
struct LoadCli {
    /// Bundle to load (defaults to {output-dir}/processed_module_{course-id}.json)
    #[arg(long)]
    bundle: Option<PathBuf>,

    /// Course id whose bundle should be loaded from the output directory
    #[arg(long, env = "COURSEVEC_COURSE_ID")]
    course_id: Option<String>,

    /// Delete ids that are no longer present in the bundle
    #[arg(long, default_value_t = false)]
    prune_stale: bool,

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

fn main() -> Result<()> {
    let cli = LoadCli::parse();
    logging::init(cli.verbose);
    let config = cli.pipeline.build_config()?;

    let bundle_path = match (&cli.bundle, &cli.course_id) {
        (Some(path), _) => path.clone(),
        (None, Some(course_id)) => config.bundle_path(course_id),
        (None, None) => anyhow::bail!("pass --bundle or --course-id"),
    };

    let embedder = cli.embedding.build_embedder(config.embedding_model_id())?;
    let mut store = cli.store.open_store(&config)?;
    let mut loader = Loader::new(
        &embedder,
        store.as_mut(),
        LoaderConfig {
            normalize_embeddings: cli.embedding.normalize_embeddings,
            prune_stale: cli.prune_stale,
        },
    );
    let report = loader
        .load_path(&bundle_path)
        .with_context(|| format!("failed to load {}", bundle_path.display()))?;

    println!(
        "collection {}: {} -> {} vectors ({} upserted, {} pruned) at {}",
        report.collection,
        report.before,
        report.after,
        report.upserted,
        report.pruned,
        report.location
    );
    Ok(())
}
