use anyhow::{Context, Result};
use clap::Parser;
use coursevec::{logging, normalizer, PipelineArgs};

#[derive(Parser, Debug)]
#[command(
    name = "coursevec-normalize",
    about = "Normalize a raw course-module export into an embedding-ready bundle"
)]
struct NormalizeCli {
    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Log debug events
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = NormalizeCli::parse();
    logging::init(cli.verbose);
    let config = cli.pipeline.build_config()?;

    let (path, normalized) = normalizer::run(&config)
        .with_context(|| format!("failed to normalize {:?}", config.input_path()))?;

    let bundle = &normalized.bundle;
    println!(
        "wrote {} ({} competencies, {} mcqs, {} checklists, {} vectors, {} warnings)",
        path.display(),
        bundle.competencies.len(),
        bundle.mcqs.len(),
        bundle.checklists.len(),
        bundle.total_vectors,
        normalized.warnings.len()
    );
    Ok(())
}
