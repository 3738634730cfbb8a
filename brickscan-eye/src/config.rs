//! Configuration for brickscan-eye

use brickscan_core::PipelineConfig;
use serde::{Deserialize, Serialize};

/// Segmenter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// Smallest accepted contour area, inclusive
    pub min_area: f64,
    /// Largest accepted contour area, inclusive
    pub max_area: f64,
    /// Pixels added on every side of a region when cutting its crop
    pub padding: u32,
    /// Gaussian blur sigma applied before thresholding
    pub blur_sigma: f32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for SegmenterConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            min_area: config.min_area,
            max_area: config.max_area,
            padding: config.padding,
            blur_sigma: config.blur_sigma,
        }
    }
}

impl SegmenterConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.min_area.is_finite() || self.min_area < 0.0 {
            return Err("min_area must be finite and >= 0".to_string());
        }

        if !self.max_area.is_finite() || self.max_area < self.min_area {
            return Err("max_area must be finite and >= min_area".to_string());
        }

        if !self.blur_sigma.is_finite() || self.blur_sigma <= 0.0 {
            return Err("blur_sigma must be > 0".to_string());
        }

        Ok(())
    }
}
