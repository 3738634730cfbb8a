//! Progress callbacks

use brickscan_core::{EnrichmentStats, PieceResult, SegmentationStats, Stage};
use tracing::info;

/// Receives progress from a running [`crate::Pipeline`]
///
/// All methods default to no-ops.
pub trait PipelineObserver: Send + Sync {
    fn on_stage(&self, _stage: Stage) {}

    fn on_segmented(&self, _stats: &SegmentationStats) {}

    /// Called after each crop, `position` is 1-based
    fn on_piece(&self, _position: usize, _total: usize, _result: &PieceResult) {}

    fn on_enriched(&self, _stats: &EnrichmentStats) {}
}

pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Reports progress through `tracing`
pub struct LoggingObserver;

impl PipelineObserver for LoggingObserver {
    fn on_stage(&self, stage: Stage) {
        info!("Stage: {}", stage);
    }

    fn on_segmented(&self, stats: &SegmentationStats) {
        info!(
            "Found {} pieces ({} contours, {} too small, {} too large)",
            stats.accepted, stats.contours_found, stats.rejected_small, stats.rejected_large
        );
    }

    fn on_piece(&self, position: usize, total: usize, result: &PieceResult) {
        match (result.top_prediction(), &result.error_reason) {
            (Some(top), _) => info!(
                "[{}/{}] {}: {} ({:.1}%)",
                position,
                total,
                result.crop.label,
                top.item_id,
                top.score * 100.0
            ),
            (None, Some(reason)) => {
                info!("[{}/{}] {}: failed, {}", position, total, result.crop.label, reason)
            }
            (None, None) => info!("[{}/{}] {}: no match", position, total, result.crop.label),
        }
    }

    fn on_enriched(&self, stats: &EnrichmentStats) {
        info!(
            "Catalog: {} unique items, {} resolved, {} without data, {} failed",
            stats.unique_items, stats.resolved, stats.no_data, stats.failed
        );
    }
}
