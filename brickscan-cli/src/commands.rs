use crate::report::{render_text, write_reports, BatchTally};
use crate::RunArgs;
use anyhow::Context;
use brickscan_core::BrickscanConfig;
use brickscan_eye::{list_images, save_annotated, save_crops, Segmenter, SegmenterConfig};
use brickscan_pipeline::{BatchInput, LoggingObserver, Pipeline};
use brickscan_remote::{
    BrickognizeClient, CatalogLookup, EnrichmentCache, Identifier, RebrickableClient, RequestGate,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

const PIECES_DIR: &str = "pieces";
const RESULTS_DIR: &str = "results";
const OVERVIEW_FILE: &str = "detected_pieces.jpg";

/// Service clients shared by every batch of one invocation
///
/// The gates live here so rate limits hold across batches; catalog caches
/// are created fresh per batch.
struct Services {
    identifier: Arc<BrickognizeClient>,
    catalog_gate: Arc<RequestGate>,
}

impl Services {
    fn new(config: &BrickscanConfig) -> anyhow::Result<Self> {
        let identifier = BrickognizeClient::new(&config.identification, config.pipeline.top_n)
            .context("failed to build identification client")?;
        Ok(Self {
            identifier: Arc::new(identifier),
            catalog_gate: Arc::new(RequestGate::for_service("rebrickable", &config.catalog)),
        })
    }

    fn catalog(&self, config: &BrickscanConfig) -> anyhow::Result<Option<Arc<dyn CatalogLookup>>> {
        if !config.pipeline.use_enrichment {
            return Ok(None);
        }
        let client = RebrickableClient::with_gate(
            &config.catalog,
            self.catalog_gate.clone(),
            Arc::new(EnrichmentCache::new()),
        )
        .context("failed to build catalog client")?;
        let catalog: Arc<dyn CatalogLookup> = Arc::new(client);
        Ok(Some(catalog))
    }

    fn pipeline(&self, config: &BrickscanConfig) -> anyhow::Result<Pipeline> {
        let identifier: Arc<dyn Identifier> = self.identifier.clone();
        let pipeline = Pipeline::new(config.pipeline.clone(), identifier, self.catalog(config)?)?
            .with_observer(Arc::new(LoggingObserver));
        Ok(pipeline)
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("image")
        .to_string()
}

fn ensure_exists(path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        anyhow::bail!("input not found: {}", path.display());
    }
    Ok(())
}

pub async fn process(image: &Path, run: &RunArgs, config: &BrickscanConfig) -> anyhow::Result<()> {
    ensure_exists(image)?;
    let services = Services::new(config)?;
    let tally = process_one(&services, image, &run.output, run, config).await?;
    println!(
        "\nProcessed {} pieces: {} identified, {} failed",
        tally.pieces, tally.identified, tally.failed
    );
    Ok(())
}

async fn process_one(
    services: &Services,
    image: &Path,
    output: &Path,
    run: &RunArgs,
    config: &BrickscanConfig,
) -> anyhow::Result<BatchTally> {
    let stem = file_stem(image);
    let results_dir = output.join(RESULTS_DIR);

    let mut pipeline = services
        .pipeline(config)?
        .with_crop_output(output.join(PIECES_DIR), stem.clone());
    let outcome = pipeline
        .run(BatchInput::ImagePath(image.to_path_buf()))
        .await
        .with_context(|| format!("failed to process {}", image.display()))?;

    std::fs::create_dir_all(&results_dir)?;
    if !run.no_visualize {
        if let Some(source) = &outcome.image {
            let path = results_dir.join(OVERVIEW_FILE);
            match save_annotated(source, &outcome.regions, &path) {
                Ok(()) => info!("Overview saved to {}", path.display()),
                Err(e) => warn!("Could not write overview image: {}", e),
            }
        }
    }

    let (json_path, text_path) = write_reports(&outcome.report, &results_dir, &stem)?;
    info!("Results saved to {} and {}", json_path.display(), text_path.display());
    println!("{}", render_text(&outcome.report));

    Ok(BatchTally::from_report(&outcome.report))
}

pub fn segment(image: &Path, run: &RunArgs, config: &BrickscanConfig) -> anyhow::Result<()> {
    ensure_exists(image)?;
    let segmenter = Segmenter::new(SegmenterConfig::from(&config.pipeline))?;
    let (source, mut segmentation) = segmenter
        .segment_file(image)
        .with_context(|| format!("failed to segment {}", image.display()))?;

    let stem = file_stem(image);
    let pieces_dir = run.output.join(PIECES_DIR);
    let written = save_crops(&mut segmentation.crops, &pieces_dir, &stem)?;

    if !run.no_visualize {
        let results_dir = run.output.join(RESULTS_DIR);
        std::fs::create_dir_all(&results_dir)?;
        let overview = results_dir.join(OVERVIEW_FILE);
        if let Err(e) = save_annotated(&source, &segmentation.regions, overview) {
            warn!("Could not write overview image: {}", e);
        }
    }

    println!("Detected {} pieces, crops written to {}", written.len(), pieces_dir.display());
    if !written.is_empty() {
        println!("Identify them later with: brickscan identify {}", pieces_dir.display());
    }
    Ok(())
}

pub async fn identify(dir: &Path, run: &RunArgs, config: &BrickscanConfig) -> anyhow::Result<()> {
    ensure_exists(dir)?;
    let services = Services::new(config)?;
    let mut pipeline = services.pipeline(config)?;
    let outcome = pipeline
        .run(BatchInput::CropDirectory(dir.to_path_buf()))
        .await
        .with_context(|| format!("failed to read crops from {}", dir.display()))?;

    let results_dir = run.output.join(RESULTS_DIR);
    let stem = dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("crops")
        .to_string();
    let (json_path, _) = write_reports(&outcome.report, &results_dir, &stem)?;
    println!("{}", render_text(&outcome.report));
    println!("Results saved to {}", json_path.display());
    Ok(())
}

pub async fn batch(dir: &Path, run: &RunArgs, config: &BrickscanConfig) -> anyhow::Result<()> {
    ensure_exists(dir)?;
    let images = list_images(dir)?;
    if images.is_empty() {
        println!("No images found in {}", dir.display());
        return Ok(());
    }
    info!("Found {} images to process", images.len());

    let services = Services::new(config)?;
    let mut rows: Vec<(PathBuf, Option<BatchTally>)> = Vec::with_capacity(images.len());
    for (i, image) in images.iter().enumerate() {
        info!("Image {}/{}: {}", i + 1, images.len(), image.display());
        let output = run.output.join(file_stem(image));
        match process_one(&services, image, &output, run, config).await {
            Ok(tally) => rows.push((image.clone(), Some(tally))),
            Err(e) => {
                error!("{:#}", e);
                rows.push((image.clone(), None));
            }
        }
    }

    let succeeded = rows.iter().filter(|(_, t)| t.is_some()).count();
    let pieces: usize = rows.iter().filter_map(|(_, t)| t.map(|t| t.pieces)).sum();
    println!("\n{}", "=".repeat(80));
    println!("BATCH SUMMARY");
    println!("{}", "=".repeat(80));
    println!("Images processed: {}", rows.len());
    println!("Successful: {}", succeeded);
    println!("Failed: {}", rows.len() - succeeded);
    println!("Total pieces detected: {}", pieces);
    for (image, tally) in &rows {
        let name = image.file_name().and_then(|n| n.to_str()).unwrap_or("?");
        match tally {
            Some(t) => println!("  {}: {} pieces, {} identified", name, t.pieces, t.identified),
            None => println!("  {}: failed", name),
        }
    }
    Ok(())
}
