//! Contour-based segmentation of a photo into piece regions

use crate::config::SegmenterConfig;
use crate::crops::{load_image, Crop};
use crate::error::VisionError;
use crate::geometry::{GeometryFilter, Verdict};
use brickscan_core::{BoundingBox, Region, SegmentationStats};
use image::{imageops, DynamicImage, GrayImage, RgbImage};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::contrast::{otsu_level, threshold};
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::{close, open};
use std::path::Path;
use tracing::{debug, info};

/// Below this spread between darkest and brightest pixel the image is blank
const MIN_CONTRAST: u8 = 16;
const CLOSE_RADIUS: u8 = 2;
const OPEN_RADIUS: u8 = 1;

/// Result of segmenting one image
#[derive(Debug, Clone, Default)]
pub struct Segmentation {
    pub regions: Vec<Region>,
    /// One crop per region, same order
    pub crops: Vec<Crop>,
    pub stats: SegmentationStats,
}

impl Segmentation {
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Splits a photo of pieces on a plain background into regions and crops
///
/// The background is assumed to dominate the image border. Pieces touching
/// each other come out as one region.
#[derive(Debug, Clone)]
pub struct Segmenter {
    config: SegmenterConfig,
    filter: GeometryFilter,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Result<Self, VisionError> {
        config.validate().map_err(VisionError::Config)?;
        let filter = GeometryFilter::new(config.min_area, config.max_area);
        Ok(Self { config, filter })
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Decode an image file and segment it
    pub fn segment_file(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<(DynamicImage, Segmentation), VisionError> {
        let image = load_image(path)?;
        let segmentation = self.segment(&image);
        Ok((image, segmentation))
    }

    pub fn segment(&self, image: &DynamicImage) -> Segmentation {
        let rgb = image.to_rgb8();
        let (regions, stats) = self.find_regions(&image.to_luma8());
        let crops = self.cut_crops(&rgb, &regions);
        info!(
            "Segmented {}x{} image: {} contours, {} accepted",
            rgb.width(),
            rgb.height(),
            stats.contours_found,
            stats.accepted
        );
        Segmentation {
            regions,
            crops,
            stats,
        }
    }

    /// Accepted regions in reading order, with indices assigned
    pub fn find_regions(&self, gray: &GrayImage) -> (Vec<Region>, SegmentationStats) {
        let mut stats = SegmentationStats::default();
        if gray.width() == 0 || gray.height() == 0 {
            return (Vec::new(), stats);
        }

        let mask = framed(&self.foreground_mask(gray));
        let contours: Vec<Contour<i32>> = find_contours(&mask);

        let mut regions = Vec::new();
        for contour in contours
            .iter()
            .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        {
            stats.contours_found += 1;
            let Some(region) = contour_region(contour) else {
                stats.rejected_degenerate += 1;
                continue;
            };
            match self.filter.classify(&region) {
                Verdict::Accepted => regions.push(region),
                Verdict::TooSmall => stats.rejected_small += 1,
                Verdict::TooLarge => stats.rejected_large += 1,
                Verdict::Degenerate => stats.rejected_degenerate += 1,
            }
        }

        order_regions(&mut regions);
        stats.accepted = regions.len();
        debug!(
            "Rejected {} small, {} large, {} degenerate contours",
            stats.rejected_small, stats.rejected_large, stats.rejected_degenerate
        );
        (regions, stats)
    }

    /// Binary mask with pieces at 255 and background at 0
    fn foreground_mask(&self, gray: &GrayImage) -> GrayImage {
        let blurred = gaussian_blur_f32(gray, self.config.blur_sigma);

        let (lo, hi) = blurred
            .pixels()
            .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));
        if hi.saturating_sub(lo) < MIN_CONTRAST {
            debug!("No contrast in image (range {}..={}), nothing to segment", lo, hi);
            return GrayImage::new(gray.width(), gray.height());
        }

        let level = otsu_level(&blurred);
        let mut mask = threshold(&blurred, level);
        if border_mean(&blurred) > level as f64 {
            // light background, dark pieces
            imageops::invert(&mut mask);
        }

        let mask = close(&mask, Norm::LInf, CLOSE_RADIUS);
        open(&mask, Norm::LInf, OPEN_RADIUS)
    }

    fn cut_crops(&self, rgb: &RgbImage, regions: &[Region]) -> Vec<Crop> {
        let (width, height) = rgb.dimensions();
        regions
            .iter()
            .filter_map(|region| {
                let crop_box = region.bounding_box.padded(self.config.padding, width, height)?;
                let image = imageops::crop_imm(
                    rgb,
                    crop_box.x as u32,
                    crop_box.y as u32,
                    crop_box.width as u32,
                    crop_box.height as u32,
                )
                .to_image();
                Some(Crop {
                    image,
                    sequence_index: region.sequence_index,
                    bounding_box: region.bounding_box,
                    crop_box,
                    label: format!("piece_{:03}", region.sequence_index),
                    path: None,
                })
            })
            .collect()
    }
}

/// Copy of `mask` inside a 1-px background frame
///
/// `find_contours` mislabels blobs that touch column 0, so tracing always
/// runs on a framed mask. Points come back shifted by one in both axes.
fn framed(mask: &GrayImage) -> GrayImage {
    let mut out = GrayImage::new(mask.width() + 2, mask.height() + 2);
    imageops::replace(&mut out, mask, 1, 1);
    out
}

fn border_mean(gray: &GrayImage) -> f64 {
    let (w, h) = gray.dimensions();
    let mut sum = 0u64;
    let mut count = 0u64;
    for (x, y, p) in gray.enumerate_pixels() {
        if x == 0 || y == 0 || x + 1 == w || y + 1 == h {
            sum += p[0] as u64;
            count += 1;
        }
    }
    if count == 0 {
        return 0.0;
    }
    sum as f64 / count as f64
}

/// Bounding box from the point extents, area by the shoelace formula
///
/// Points are in framed-mask coordinates and are mapped back to the image.
fn contour_region(contour: &Contour<i32>) -> Option<Region> {
    let first = contour.points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in &contour.points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }

    let n = contour.points.len();
    let twice_area: i64 = (0..n)
        .map(|i| {
            let a = &contour.points[i];
            let b = &contour.points[(i + 1) % n];
            a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64
        })
        .sum();

    let bbox = BoundingBox::new(min_x - 1, min_y - 1, max_x - min_x + 1, max_y - min_y + 1);
    Some(Region::new(bbox, twice_area.unsigned_abs() as f64 / 2.0))
}

/// Sort regions into rows, top to bottom, then left to right within a row
///
/// A region starts a new row when its top edge lies more than half the
/// median region height below the top of the current row's first region.
pub fn order_regions(regions: &mut Vec<Region>) {
    if regions.is_empty() {
        return;
    }

    let mut heights: Vec<i32> = regions.iter().map(|r| r.bounding_box.height).collect();
    heights.sort_unstable();
    let row_tolerance = heights[heights.len() / 2] as f64 / 2.0;

    regions.sort_by_key(|r| (r.bounding_box.y, r.bounding_box.x));

    let mut rows: Vec<Vec<Region>> = Vec::new();
    let mut row_top = i32::MIN;
    for region in regions.drain(..) {
        let top = region.bounding_box.y;
        match rows.last_mut() {
            Some(row) if (top as f64 - row_top as f64) <= row_tolerance => row.push(region),
            _ => {
                row_top = top;
                rows.push(vec![region]);
            }
        }
    }

    for mut row in rows {
        row.sort_by_key(|r| {
            let b = r.bounding_box;
            (b.x, b.y, b.width, b.height)
        });
        regions.extend(row);
    }
    for (index, region) in regions.iter_mut().enumerate() {
        region.sequence_index = index;
    }
}
