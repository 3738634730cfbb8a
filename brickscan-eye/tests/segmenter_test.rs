//! Segmentation tests on synthetic trays

use brickscan_eye::{save_crops, Segmenter, SegmenterConfig};
use image::{DynamicImage, Rgb, RgbImage};

const BACKGROUND: Rgb<u8> = Rgb([235, 235, 235]);
const PIECE: Rgb<u8> = Rgb([180, 20, 20]);

fn tray(width: u32, height: u32, squares: &[(u32, u32, u32)]) -> DynamicImage {
    let mut img = RgbImage::from_pixel(width, height, BACKGROUND);
    for &(x, y, side) in squares {
        for dy in 0..side {
            for dx in 0..side {
                img.put_pixel(x + dx, y + dy, PIECE);
            }
        }
    }
    DynamicImage::ImageRgb8(img)
}

fn segmenter(min_area: f64, max_area: f64) -> Segmenter {
    Segmenter::new(SegmenterConfig {
        min_area,
        max_area,
        padding: 10,
        blur_sigma: 1.0,
    })
    .unwrap()
}

#[test]
fn test_three_separated_pieces() {
    let image = tray(300, 120, &[(20, 30, 40), (120, 35, 40), (220, 28, 40)]);
    let result = segmenter(500.0, 100_000.0).segment(&image);

    assert_eq!(result.regions.len(), 3);
    assert_eq!(result.crops.len(), 3);
    assert_eq!(result.stats.accepted, 3);

    let xs: Vec<_> = result.regions.iter().map(|r| r.bounding_box.x).collect();
    assert!(xs.windows(2).all(|w| w[0] < w[1]), "regions not in reading order: {:?}", xs);

    for (i, region) in result.regions.iter().enumerate() {
        assert_eq!(region.sequence_index, i);
        assert!(region.area > 1_200.0 && region.area < 1_900.0, "area {}", region.area);
        assert!(region.bounding_box.fits_within(300, 120));
    }
}

#[test]
fn test_crops_are_padded_and_clamped() {
    let image = tray(100, 100, &[(5, 30, 40)]);
    let result = segmenter(500.0, 100_000.0).segment(&image);
    assert_eq!(result.crops.len(), 1);

    let crop = &result.crops[0];
    assert_eq!(crop.crop_box.x, 0);
    assert!(crop.crop_box.width > crop.bounding_box.width);
    assert!(crop.crop_box.fits_within(100, 100));
    assert_eq!(
        crop.image.dimensions(),
        (crop.crop_box.width as u32, crop.crop_box.height as u32)
    );
    assert_eq!(crop.label, "piece_000");
}

#[test]
fn test_area_band_filters_regions() {
    // 12x12 speck, two 40x40 pieces, one 90x90 slab
    let image = tray(
        400,
        200,
        &[(20, 20, 12), (80, 20, 40), (160, 20, 40), (260, 20, 90)],
    );
    let result = segmenter(500.0, 4_000.0).segment(&image);

    assert_eq!(result.regions.len(), 2);
    assert_eq!(result.stats.contours_found, 4);
    assert_eq!(result.stats.rejected_small, 1);
    assert_eq!(result.stats.rejected_large, 1);
}

#[test]
fn test_nothing_passes_filter() {
    let image = tray(200, 100, &[(20, 20, 10), (100, 20, 12)]);
    let result = segmenter(500.0, 100_000.0).segment(&image);
    assert!(result.is_empty());
    assert!(result.crops.is_empty());
}

#[test]
fn test_rows_are_ordered_top_to_bottom() {
    let image = tray(
        260,
        200,
        &[(150, 110, 40), (20, 20, 40), (150, 24, 40), (20, 114, 40)],
    );
    let result = segmenter(500.0, 100_000.0).segment(&image);
    let origins: Vec<_> = result
        .regions
        .iter()
        .map(|r| (r.bounding_box.x / 10, r.bounding_box.y / 50))
        .collect();
    assert_eq!(origins.len(), 4);
    assert!(origins[0].1 == origins[1].1 && origins[2].1 == origins[3].1);
    assert!(origins[0].0 < origins[1].0 && origins[2].0 < origins[3].0);
    assert!(result.regions[0].bounding_box.y < result.regions[2].bounding_box.y);
}

#[test]
fn test_segmentation_is_repeatable() {
    let image = tray(300, 200, &[(20, 30, 40), (120, 35, 45), (60, 120, 50)]);
    let seg = segmenter(500.0, 100_000.0);
    let first = seg.segment(&image);
    let second = seg.segment(&image);
    assert_eq!(first.regions, second.regions);
}

#[test]
fn test_segment_file_and_save_crops() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("tray.png");
    tray(200, 100, &[(20, 20, 40), (120, 25, 40)])
        .save(&source)
        .unwrap();

    let (_, mut result) = segmenter(500.0, 100_000.0).segment_file(&source).unwrap();
    let written = save_crops(&mut result.crops, dir.path().join("crops"), "tray").unwrap();
    assert_eq!(written.len(), 2);
    assert!(written[0].ends_with("tray_000.jpg"));
    assert!(result.crops.iter().all(|c| c.path.is_some()));
}

#[test]
fn test_segment_file_undecodable() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("broken.jpg");
    std::fs::write(&source, b"definitely not a jpeg").unwrap();
    assert!(segmenter(500.0, 100_000.0).segment_file(&source).is_err());
}

#[test]
fn test_piece_on_left_edge_is_kept() {
    let image = tray(300, 120, &[(0, 50, 40), (120, 35, 40), (200, 40, 40)]);
    let result = segmenter(500.0, 100_000.0).segment(&image);

    assert_eq!(result.stats.contours_found, 3);
    assert_eq!(result.regions.len(), 3);
    assert_eq!(result.regions[0].bounding_box.x, 0);
}

#[test]
fn test_pieces_in_every_corner() {
    let image = tray(
        300,
        200,
        &[(0, 0, 40), (260, 0, 40), (0, 160, 40), (260, 160, 40), (130, 80, 40)],
    );
    let result = segmenter(500.0, 100_000.0).segment(&image);

    assert_eq!(result.stats.contours_found, 5);
    assert_eq!(result.regions.len(), 5);
    let origins: Vec<_> = result
        .regions
        .iter()
        .map(|r| (r.bounding_box.x, r.bounding_box.y))
        .collect();
    let near = |(x, y): (i32, i32), (ex, ey): (i32, i32)| {
        (x - ex).abs() <= 2 && (y - ey).abs() <= 2
    };
    assert_eq!(origins[0], (0, 0));
    assert!(near(origins[1], (260, 0)));
    assert!(near(origins[2], (130, 80)));
    assert!(near(origins[3], (0, 160)));
    assert!(near(origins[4], (260, 160)));
    for region in &result.regions {
        assert!((38..=42).contains(&region.bounding_box.width));
        assert!((38..=42).contains(&region.bounding_box.height));
    }
}

#[test]
fn test_light_pieces_on_dark_background() {
    let mut img = RgbImage::from_pixel(300, 120, Rgb([25, 25, 30]));
    for &(x, y) in &[(20u32, 30u32), (120, 35), (220, 28)] {
        for dy in 0..40 {
            for dx in 0..40 {
                img.put_pixel(x + dx, y + dy, Rgb([240, 230, 210]));
            }
        }
    }
    let result = segmenter(500.0, 100_000.0).segment(&DynamicImage::ImageRgb8(img));

    assert_eq!(result.regions.len(), 3);
    let xs: Vec<_> = result.regions.iter().map(|r| r.bounding_box.x).collect();
    assert!(xs[0] < xs[1] && xs[1] < xs[2]);
    for region in &result.regions {
        assert!(region.area > 1_000.0 && region.area < 2_000.0);
    }
}
