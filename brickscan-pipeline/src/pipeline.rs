//! Batch orchestrator

use crate::error::{PipelineError, Result};
use crate::input::BatchInput;
use crate::observer::{NoopObserver, PipelineObserver};
use brickscan_core::{
    BatchReport, BatchSummary, CatalogInfo, EnrichmentScope, EnrichmentStats, PieceResult,
    PipelineConfig, Prediction, Region, SegmentationStats, ServiceReply, Stage,
};
use brickscan_eye::{load_crop_dir, save_crops, Crop, Segmenter, SegmenterConfig};
use brickscan_remote::{CatalogLookup, Identifier};
use chrono::Utc;
use image::DynamicImage;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Everything a finished batch produced
#[derive(Debug)]
pub struct BatchRun {
    pub report: BatchReport,
    /// Accepted regions, empty when segmentation was skipped
    pub regions: Vec<Region>,
    /// Decoded source photo, when the batch started from one
    pub image: Option<DynamicImage>,
}

struct Prepared {
    crops: Vec<Crop>,
    regions: Vec<Region>,
    image: Option<DynamicImage>,
    stats: Option<SegmentationStats>,
}

/// Runs one batch from input to report
///
/// Build a new pipeline, with a fresh catalog cache, for every batch.
pub struct Pipeline {
    config: PipelineConfig,
    segmenter: Segmenter,
    identifier: Arc<dyn Identifier>,
    catalog: Option<Arc<dyn CatalogLookup>>,
    observer: Arc<dyn PipelineObserver>,
    crop_sink: Option<(PathBuf, String)>,
    stage: Stage,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        identifier: Arc<dyn Identifier>,
        catalog: Option<Arc<dyn CatalogLookup>>,
    ) -> Result<Self> {
        config.validate()?;
        let segmenter = Segmenter::new(SegmenterConfig::from(&config))?;
        Ok(Self {
            config,
            segmenter,
            identifier,
            catalog,
            observer: Arc::new(NoopObserver),
            crop_sink: None,
            stage: Stage::Start,
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Write segmented crops to `dir` as `{base}_{idx:03}.jpg` before identification
    pub fn with_crop_output(mut self, dir: impl Into<PathBuf>, base: impl Into<String>) -> Self {
        self.crop_sink = Some((dir.into(), base.into()));
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn advance(&mut self, stage: Stage) {
        debug!("Pipeline {} -> {}", self.stage, stage);
        self.stage = stage;
        self.observer.on_stage(stage);
    }

    fn enrichment_enabled(&self) -> bool {
        self.config.use_enrichment && self.catalog.is_some()
    }

    pub async fn run(&mut self, input: BatchInput) -> Result<BatchRun> {
        if self.stage != Stage::Start {
            return Err(PipelineError::Input(format!(
                "pipeline already used (stage {})",
                self.stage
            )));
        }

        let started_at = Utc::now();
        let timer = Instant::now();
        let source = input.source();
        info!("Processing {}", source);

        let prepared = self.prepare(input)?;
        let total = prepared.crops.len();

        let mut pieces = Vec::with_capacity(total);
        let mut enrichment = None;
        if total > 0 {
            self.advance(Stage::Identifying);
            for (i, crop) in prepared.crops.iter().enumerate() {
                let result = self.identify_crop(crop).await;
                self.observer.on_piece(i + 1, total, &result);
                pieces.push(result);
            }

            if self.enrichment_enabled() {
                self.advance(Stage::Enriching);
                let (enriched, stats) = self.enrich(pieces).await;
                pieces = enriched;
                self.observer.on_enriched(&stats);
                enrichment = Some(stats);
            }
        } else {
            info!("No pieces found in {}", source);
        }

        self.advance(Stage::Done);
        let summary = BatchSummary::from_pieces(&pieces);
        info!(
            "Finished {}: {} pieces, {} identified, {} failed",
            source, summary.total, summary.succeeded, summary.failed
        );

        Ok(BatchRun {
            report: BatchReport {
                source,
                stage: self.stage,
                pieces,
                summary,
                segmentation: prepared.stats,
                enrichment,
                started_at,
                elapsed_ms: timer.elapsed().as_millis() as u64,
            },
            regions: prepared.regions,
            image: prepared.image,
        })
    }

    /// Turn the input into crops, segmenting when needed
    fn prepare(&mut self, input: BatchInput) -> Result<Prepared> {
        let (image, segmentation) = match input {
            BatchInput::ImagePath(path) => {
                self.advance(Stage::Segmenting);
                let (image, segmentation) = self.segmenter.segment_file(&path)?;
                (image, segmentation)
            }
            BatchInput::Image { image, .. } => {
                self.advance(Stage::Segmenting);
                let segmentation = self.segmenter.segment(&image);
                (image, segmentation)
            }
            BatchInput::CropDirectory(dir) => {
                let loaded = load_crop_dir(&dir)?;
                if !loaded.skipped.is_empty() {
                    warn!(
                        "Skipped {} unreadable files in {}",
                        loaded.skipped.len(),
                        dir.display()
                    );
                }
                return Ok(Prepared {
                    crops: loaded.crops,
                    regions: Vec::new(),
                    image: None,
                    stats: None,
                });
            }
            BatchInput::Crops { crops, .. } => {
                return Ok(Prepared {
                    crops,
                    regions: Vec::new(),
                    image: None,
                    stats: None,
                });
            }
        };

        self.observer.on_segmented(&segmentation.stats);
        let mut crops = segmentation.crops;
        if let Some((dir, base)) = &self.crop_sink {
            if !crops.is_empty() {
                save_crops(&mut crops, dir, base)?;
            }
        }

        Ok(Prepared {
            crops,
            regions: segmentation.regions,
            image: Some(image),
            stats: Some(segmentation.stats),
        })
    }

    /// Identify a single crop
    ///
    /// Never fails: service problems are recorded in the returned result.
    pub async fn identify_crop(&self, crop: &Crop) -> PieceResult {
        let reference = crop.reference();
        match self.identifier.identify(crop, self.config.category).await {
            ServiceReply::Data(mut predictions) => {
                predictions.truncate(self.config.top_n);
                PieceResult::succeeded(reference, predictions)
            }
            ServiceReply::Empty => PieceResult::succeeded(reference, Vec::new()),
            ServiceReply::Failed(reason) => PieceResult::failed(reference, reason),
        }
    }

    /// Look up each distinct in-scope item id once and attach the metadata
    async fn enrich(&self, pieces: Vec<PieceResult>) -> (Vec<PieceResult>, EnrichmentStats) {
        let mut stats = EnrichmentStats::default();
        let Some(catalog) = self.catalog.as_ref() else {
            return (pieces, stats);
        };
        let scope = self.config.enrichment_scope;

        let ids = unique_item_ids(&pieces, scope);
        stats.unique_items = ids.len();
        debug!("Enriching {} unique items via {}", ids.len(), catalog.name());

        let mut infos: HashMap<String, CatalogInfo> = HashMap::with_capacity(ids.len());
        for id in ids {
            let info = match catalog.enrich(&id).await {
                ServiceReply::Data(record) => {
                    stats.resolved += 1;
                    record.catalog_info()
                }
                ServiceReply::Empty => {
                    stats.no_data += 1;
                    CatalogInfo::placeholder(&id)
                }
                ServiceReply::Failed(reason) => {
                    debug!("Using placeholder for {}: {}", id, reason);
                    stats.failed += 1;
                    CatalogInfo::placeholder(&id)
                }
            };
            infos.insert(id, info);
        }

        let pieces = pieces
            .into_iter()
            .map(|piece| {
                if !piece.success {
                    return piece;
                }
                let predictions = piece
                    .predictions
                    .into_iter()
                    .map(|mut p| {
                        if in_scope(&p, scope) {
                            p.catalog = infos.get(&p.item_id).cloned();
                        }
                        p
                    })
                    .collect();
                PieceResult::succeeded(piece.crop, predictions)
            })
            .collect();
        (pieces, stats)
    }
}

fn in_scope(prediction: &Prediction, scope: EnrichmentScope) -> bool {
    match scope {
        EnrichmentScope::TopRanked => prediction.rank == 1,
        EnrichmentScope::All => true,
    }
}

/// Item ids to enrich, in first-seen order
fn unique_item_ids(pieces: &[PieceResult], scope: EnrichmentScope) -> Vec<String> {
    let mut seen = HashSet::new();
    pieces
        .iter()
        .filter(|p| p.success)
        .flat_map(|p| p.predictions.iter())
        .filter(|p| in_scope(p, scope))
        .filter(|p| seen.insert(p.item_id.clone()))
        .map(|p| p.item_id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use brickscan_core::{BoundingBox, CropRef, ItemType};

    fn prediction(rank: u32, id: &str, item_type: ItemType) -> Prediction {
        Prediction {
            rank,
            item_id: id.to_string(),
            item_type,
            score: 1.0 / rank as f32,
            name: None,
            category_name: None,
            catalog: None,
        }
    }

    fn piece(index: usize, predictions: Vec<Prediction>) -> PieceResult {
        PieceResult::succeeded(
            CropRef {
                sequence_index: index,
                bounding_box: BoundingBox::new(0, 0, 1, 1),
                label: format!("piece_{:03}", index),
                path: None,
            },
            predictions,
        )
    }

    #[test]
    fn test_unique_ids_top_ranked() {
        let pieces = vec![
            piece(
                0,
                vec![prediction(1, "3001", ItemType::Part), prediction(2, "3002", ItemType::Part)],
            ),
            piece(1, vec![prediction(1, "3001", ItemType::Part)]),
            piece(2, vec![prediction(1, "3700", ItemType::Part)]),
        ];
        assert_eq!(
            unique_item_ids(&pieces, EnrichmentScope::TopRanked),
            vec!["3001", "3700"]
        );
        assert_eq!(
            unique_item_ids(&pieces, EnrichmentScope::All),
            vec!["3001", "3002", "3700"]
        );
    }

    #[test]
    fn test_unique_ids_include_every_item_type() {
        let pieces = vec![
            piece(
                0,
                vec![
                    prediction(1, "sw0001", ItemType::Minifig),
                    prediction(2, "3001", ItemType::Part),
                ],
            ),
            piece(1, vec![prediction(1, "75192-1", ItemType::Set)]),
        ];
        assert_eq!(
            unique_item_ids(&pieces, EnrichmentScope::TopRanked),
            vec!["sw0001", "75192-1"]
        );
        assert_eq!(
            unique_item_ids(&pieces, EnrichmentScope::All),
            vec!["sw0001", "3001", "75192-1"]
        );
    }
}
