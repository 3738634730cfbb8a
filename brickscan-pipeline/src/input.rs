use brickscan_eye::Crop;
use image::DynamicImage;
use std::path::PathBuf;

/// What a batch starts from
pub enum BatchInput {
    /// Photo on disk, segmented first
    ImagePath(PathBuf),
    /// Already decoded photo, segmented first
    Image { image: DynamicImage, source: String },
    /// Directory of crops from an earlier run, segmentation skipped
    CropDirectory(PathBuf),
    /// Crops held in memory, segmentation skipped
    Crops { crops: Vec<Crop>, source: String },
}

impl BatchInput {
    pub fn source(&self) -> String {
        match self {
            BatchInput::ImagePath(path) | BatchInput::CropDirectory(path) => {
                path.display().to_string()
            }
            BatchInput::Image { source, .. } | BatchInput::Crops { source, .. } => source.clone(),
        }
    }

    pub fn needs_segmentation(&self) -> bool {
        matches!(self, BatchInput::ImagePath(_) | BatchInput::Image { .. })
    }
}

impl std::fmt::Debug for BatchInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchInput::ImagePath(path) => f.debug_tuple("ImagePath").field(path).finish(),
            BatchInput::Image { image, source } => f
                .debug_struct("Image")
                .field("source", source)
                .field("width", &image.width())
                .field("height", &image.height())
                .finish(),
            BatchInput::CropDirectory(path) => f.debug_tuple("CropDirectory").field(path).finish(),
            BatchInput::Crops { crops, source } => f
                .debug_struct("Crops")
                .field("source", source)
                .field("count", &crops.len())
                .finish(),
        }
    }
}
