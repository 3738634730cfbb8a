//! brickscan-core: shared data model for the brickscan pipeline
//!
//! Types that flow between the segmenter, the remote service clients and
//! the orchestrator, plus configuration and its error type.

pub mod types;
pub mod error;
pub mod config;

pub use error::ConfigError;
pub use types::{
    BatchReport, BatchSummary, BoundingBox, CatalogInfo, Category, ColorVariant, CropRef,
    EnrichmentRecord, EnrichmentStats, FailureReason, ItemType, PartVariant, PieceResult,
    Prediction, Region, SegmentationStats, ServiceReply, Stage,
};
pub use config::{
    BrickscanConfig, EnrichmentScope, PipelineConfig, RetryConfig, ServiceConfig,
};
