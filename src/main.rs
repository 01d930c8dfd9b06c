use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use medprep::{Pipeline, RunConfig};

/// medprep: assemble brain MRI autoencoder and classifier datasets.
#[derive(Parser)]
#[command(name = "medprep", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Normalize and write both corpora with manifests and extents.
    Run {
        #[command(flatten)]
        paths: PathArgs,
        /// Hide the per-split progress bars.
        #[arg(long)]
        quiet: bool,
    },
    /// Print split sizes and label counts without decoding or writing.
    Plan {
        #[command(flatten)]
        paths: PathArgs,
    },
}

#[derive(Args)]
struct PathArgs {
    /// Run configuration TOML; built-in cohorts when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the source data root.
    #[arg(long)]
    source: Option<PathBuf>,
    /// Override the output root.
    #[arg(long)]
    output: Option<PathBuf>,
    /// Override the split seed.
    #[arg(long)]
    seed: Option<u64>,
}

impl PathArgs {
    fn load(&self) -> anyhow::Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => RunConfig::default(),
        };
        if let Some(source) = &self.source {
            config.source_root = source.clone();
        }
        if let Some(output) = &self.output {
            config.output_root = output.clone();
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("medprep=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run { paths, quiet } => {
            let config = paths.load()?;
            tracing::info!(
                source = %config.source_root.display(),
                output = %config.output_root.display(),
                seed = config.seed,
                "starting run"
            );
            let report = Pipeline::new(config)
                .context("invalid run configuration")?
                .with_progress(!quiet)
                .run()
                .context("dataset assembly failed")?;
            tracing::info!(items = report.total_items(), "run complete");
        }
        Command::Plan { paths } => {
            let config = paths.load()?;
            let plans = Pipeline::new(config)
                .context("invalid run configuration")?
                .plan()
                .context("planning failed")?;
            for plan in plans {
                print!("{plan}");
            }
        }
    }
    Ok(())
}
