//! brickscan-pipeline: segment, identify and enrich one batch
//!
//! A [`Pipeline`] drives a single batch through
//! `Start → Segmenting → Identifying → Enriching → Done`. Item-level
//! failures are recorded in the results; only unreadable input ends a
//! batch early.

pub mod error;
pub mod input;
pub mod observer;
pub mod pipeline;

pub use error::PipelineError;
pub use input::BatchInput;
pub use observer::{LoggingObserver, NoopObserver, PipelineObserver};
pub use pipeline::{BatchRun, Pipeline};
