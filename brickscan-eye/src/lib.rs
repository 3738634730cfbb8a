//! brickscan-eye: segmentation of loose-piece photos
//!
//! Turns a single photo of pieces on a plain background into an ordered
//! set of regions and the crops cut around them. Also owns the crop
//! directory layout and the annotated overview image.

pub mod config;
pub mod crops;
pub mod error;
pub mod geometry;
pub mod segmenter;
pub mod visualize;

pub use config::SegmenterConfig;
pub use crops::{list_images, load_crop_dir, load_image, save_crops, Crop, LoadedCrops};
pub use error::VisionError;
pub use geometry::{GeometryFilter, Verdict};
pub use segmenter::{Segmentation, Segmenter};
pub use visualize::{annotate, save_annotated};
