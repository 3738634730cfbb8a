// brickscan command line interface
// Segments photos of loose pieces and identifies each one

mod commands;
mod report;

use brickscan_core::{BrickscanConfig, Category, EnrichmentScope};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "brickscan")]
#[command(about = "Segment a photo of loose pieces and identify each piece", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (JSON, TOML or YAML)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Segment, identify and enrich one photo
    Process {
        /// Photo containing the pieces
        image: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Only cut the photo into piece crops, no service calls
    Segment {
        image: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Identify crops saved by an earlier `segment` run
    Identify {
        /// Directory of crop images
        dir: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Process every photo in a directory
    Batch {
        dir: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Output directory
    #[arg(long, short, default_value = "output")]
    pub output: PathBuf,

    /// Minimum piece area in pixels
    #[arg(long)]
    pub min_area: Option<f64>,

    /// Maximum piece area in pixels
    #[arg(long)]
    pub max_area: Option<f64>,

    /// Padding around each crop in pixels
    #[arg(long)]
    pub padding: Option<u32>,

    /// Search category: parts, sets or figs
    #[arg(long)]
    pub category: Option<Category>,

    /// Predictions kept per piece
    #[arg(long)]
    pub top_n: Option<usize>,

    /// Skip catalog lookups
    #[arg(long)]
    pub no_enrich: bool,

    /// Look up every kept prediction, not only the best one
    #[arg(long)]
    pub all_predictions: bool,

    /// Do not write the annotated overview image
    #[arg(long)]
    pub no_visualize: bool,
}

impl RunArgs {
    /// Fold command-line overrides into `config`
    pub fn apply(&self, config: &mut BrickscanConfig) {
        let pipeline = &mut config.pipeline;
        if let Some(v) = self.min_area {
            pipeline.min_area = v;
        }
        if let Some(v) = self.max_area {
            pipeline.max_area = v;
        }
        if let Some(v) = self.padding {
            pipeline.padding = v;
        }
        if let Some(v) = self.category {
            pipeline.category = v;
        }
        if let Some(v) = self.top_n {
            pipeline.top_n = v;
        }
        if self.no_enrich {
            pipeline.use_enrichment = false;
        }
        if self.all_predictions {
            pipeline.enrichment_scope = EnrichmentScope::All;
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();
}

fn load_config(path: Option<&PathBuf>, run: &RunArgs) -> anyhow::Result<BrickscanConfig> {
    let mut config = match path {
        Some(path) => BrickscanConfig::from_file(path)?,
        None => BrickscanConfig::default(),
    };
    config.apply_env();
    run.apply(&mut config);
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Commands::Process { image, run } => {
            let config = load_config(cli.config.as_ref(), run)?;
            commands::process(image, run, &config).await?;
        }
        Commands::Segment { image, run } => {
            let config = load_config(cli.config.as_ref(), run)?;
            commands::segment(image, run, &config)?;
        }
        Commands::Identify { dir, run } => {
            let config = load_config(cli.config.as_ref(), run)?;
            commands::identify(dir, run, &config).await?;
        }
        Commands::Batch { dir, run } => {
            let config = load_config(cli.config.as_ref(), run)?;
            commands::batch(dir, run, &config).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_process_flags() {
        let cli = Cli::try_parse_from([
            "brickscan",
            "process",
            "tray.jpg",
            "--min-area",
            "200",
            "--category",
            "figs",
            "--no-enrich",
            "--verbose",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Process { image, run } => {
                assert_eq!(image, PathBuf::from("tray.jpg"));
                assert_eq!(run.min_area, Some(200.0));
                assert_eq!(run.category, Some(Category::Figs));
                assert!(run.no_enrich);
                assert_eq!(run.output, PathBuf::from("output"));
            }
            _ => panic!("Expected process command"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_category() {
        let parsed =
            Cli::try_parse_from(["brickscan", "segment", "x.jpg", "--category", "gears"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_run_args_override_config() {
        let cli = Cli::try_parse_from([
            "brickscan",
            "identify",
            "crops",
            "--top-n",
            "5",
            "--all-predictions",
            "--padding",
            "4",
        ])
        .unwrap();
        let Commands::Identify { run, .. } = cli.command else {
            panic!("Expected identify command");
        };
        let mut config = BrickscanConfig::default();
        run.apply(&mut config);
        assert_eq!(config.pipeline.top_n, 5);
        assert_eq!(config.pipeline.padding, 4);
        assert_eq!(config.pipeline.enrichment_scope, EnrichmentScope::All);
        assert!(config.pipeline.use_enrichment);
    }
}
