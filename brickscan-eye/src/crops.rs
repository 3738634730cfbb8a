//! Crops and their on-disk layout

use crate::error::VisionError;
use brickscan_core::{BoundingBox, CropRef};
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File extensions treated as images when scanning a directory
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

const JPEG_QUALITY: u8 = 95;

/// Sub-image holding exactly one accepted region
#[derive(Debug, Clone)]
pub struct Crop {
    pub image: RgbImage,
    pub sequence_index: usize,
    /// Region box in source-image coordinates
    pub bounding_box: BoundingBox,
    /// Padded box actually cut from the source image
    pub crop_box: BoundingBox,
    pub label: String,
    pub path: Option<PathBuf>,
}

impl Crop {
    /// Crop that is a whole image on its own, e.g. a file from a crop directory
    pub fn from_image(sequence_index: usize, image: RgbImage, label: impl Into<String>) -> Self {
        let bbox = BoundingBox::new(0, 0, image.width() as i32, image.height() as i32);
        Self {
            image,
            sequence_index,
            bounding_box: bbox,
            crop_box: bbox,
            label: label.into(),
            path: None,
        }
    }

    pub fn reference(&self) -> CropRef {
        CropRef {
            sequence_index: self.sequence_index,
            bounding_box: self.bounding_box,
            label: self.label.clone(),
            path: self.path.clone(),
        }
    }

    /// JPEG bytes for upload
    pub fn encode_jpeg(&self) -> Result<Vec<u8>, VisionError> {
        if self.image.width() == 0 || self.image.height() == 0 {
            return Err(VisionError::Processing(format!(
                "crop '{}' has no pixels",
                self.label
            )));
        }
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(self.image.clone())
            .write_to(&mut Cursor::new(&mut buffer), ImageOutputFormat::Jpeg(JPEG_QUALITY))?;
        Ok(buffer)
    }

    /// File name used for upload, always ending in `.jpg`
    pub fn upload_name(&self) -> String {
        let stem = Path::new(&self.label)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("crop");
        format!("{}.jpg", stem)
    }
}

/// Crops read back from a directory
#[derive(Debug, Default)]
pub struct LoadedCrops {
    pub crops: Vec<Crop>,
    /// Files with an image extension that failed to decode
    pub skipped: Vec<PathBuf>,
}

pub fn load_image(path: impl AsRef<Path>) -> Result<DynamicImage, VisionError> {
    let path = path.as_ref();
    debug!("Loading image {}", path.display());
    Ok(image::open(path)?)
}

/// Image files in `dir`, sorted by file name
pub fn list_images(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, VisionError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir.as_ref())? {
        let path = entry?.path();
        if path.is_file() && has_image_extension(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Index encoded as a trailing `_NNN` in a file stem
fn trailing_index(path: &Path) -> Option<usize> {
    let stem = path.file_stem()?.to_str()?;
    let (_, digits) = stem.rsplit_once('_')?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Write each crop as `{base}_{idx:03}.jpg` and record its path
pub fn save_crops(
    crops: &mut [Crop],
    dir: impl AsRef<Path>,
    base: &str,
) -> Result<Vec<PathBuf>, VisionError> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;

    let mut written = Vec::with_capacity(crops.len());
    for crop in crops.iter_mut() {
        let path = dir.join(format!("{}_{:03}.jpg", base, crop.sequence_index));
        crop.image.save(&path)?;
        crop.path = Some(path.clone());
        written.push(path);
    }
    debug!("Saved {} crops to {}", written.len(), dir.display());
    Ok(written)
}

/// Load every image in `dir` as a crop
///
/// Sequence indices come from the `_NNN` suffix when every file carries a
/// distinct one, otherwise from the sorted file order. Undecodable files
/// are skipped and reported in [`LoadedCrops::skipped`].
pub fn load_crop_dir(dir: impl AsRef<Path>) -> Result<LoadedCrops, VisionError> {
    let files = list_images(dir.as_ref())?;

    let suffixes: Vec<Option<usize>> = files.iter().map(|p| trailing_index(p)).collect();
    let mut seen = std::collections::HashSet::new();
    let suffixes_usable = suffixes.iter().all(|i| i.map(|i| seen.insert(i)).unwrap_or(false));
    let indices: Vec<usize> = if suffixes_usable {
        suffixes.into_iter().flatten().collect()
    } else {
        (0..files.len()).collect()
    };

    let mut loaded = LoadedCrops::default();
    for (path, index) in files.into_iter().zip(indices) {
        match image::open(&path) {
            Ok(img) => {
                let label = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("crop")
                    .to_string();
                let mut crop = Crop::from_image(index, img.to_rgb8(), label);
                crop.path = Some(path);
                loaded.crops.push(crop);
            }
            Err(e) => {
                warn!("Skipping undecodable crop {}: {}", path.display(), e);
                loaded.skipped.push(path);
            }
        }
    }
    loaded.crops.sort_by_key(|c| c.sequence_index);
    Ok(loaded)
}
