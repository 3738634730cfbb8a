//! Overview image with detected regions outlined

use crate::error::VisionError;
use brickscan_core::Region;
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use std::path::Path;

const OUTLINE: Rgb<u8> = Rgb([0, 255, 0]);
const OUTLINE_WIDTH: i32 = 2;
const LABEL_BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);

const DIGIT_WIDTH: i32 = 3;
const DIGIT_HEIGHT: i32 = 5;
const LABEL_SCALE: i32 = 2;
const LABEL_SPACING: i32 = LABEL_SCALE;

// 3x5 bitmap digits, rows top to bottom
const DIGITS: [[u8; 15]; 10] = [
    [1, 1, 1, 1, 0, 1, 1, 0, 1, 1, 0, 1, 1, 1, 1],
    [0, 1, 0, 1, 1, 0, 0, 1, 0, 0, 1, 0, 1, 1, 1],
    [1, 1, 1, 0, 0, 1, 1, 1, 1, 1, 0, 0, 1, 1, 1],
    [1, 1, 1, 0, 0, 1, 0, 1, 1, 0, 0, 1, 1, 1, 1],
    [1, 0, 1, 1, 0, 1, 1, 1, 1, 0, 0, 1, 0, 0, 1],
    [1, 1, 1, 1, 0, 0, 1, 1, 1, 0, 0, 1, 1, 1, 1],
    [1, 1, 1, 1, 0, 0, 1, 1, 1, 1, 0, 1, 1, 1, 1],
    [1, 1, 1, 0, 0, 1, 0, 1, 0, 0, 1, 0, 0, 1, 0],
    [1, 1, 1, 1, 0, 1, 1, 1, 1, 1, 0, 1, 1, 1, 1],
    [1, 1, 1, 1, 0, 1, 1, 1, 1, 0, 0, 1, 1, 1, 1],
];

/// Copy of `image` with a 2 px box and the sequence index drawn for every region
pub fn annotate(image: &DynamicImage, regions: &[Region]) -> RgbImage {
    let mut canvas = image.to_rgb8();
    for region in regions {
        let b = region.bounding_box;
        for inset in 0..OUTLINE_WIDTH {
            let (w, h) = (b.width - 2 * inset, b.height - 2 * inset);
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(b.x + inset, b.y + inset).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(&mut canvas, rect, OUTLINE);
        }
        draw_label(&mut canvas, region);
    }
    canvas
}

/// Index label just above the box, or inside its top edge when there is no room
fn draw_label(canvas: &mut RgbImage, region: &Region) {
    let label = region.sequence_index.to_string();
    let digit_w = DIGIT_WIDTH * LABEL_SCALE;
    let digit_h = DIGIT_HEIGHT * LABEL_SCALE;
    let total_w = label.len() as i32 * (digit_w + LABEL_SPACING) - LABEL_SPACING;

    let b = region.bounding_box;
    let x = b.x.min(canvas.width() as i32 - total_w - 1).max(1);
    let mut y = b.y - digit_h - 2;
    if y < 1 {
        y = b.y + OUTLINE_WIDTH + 1;
    }

    let background = Rect::at(x - 1, y - 1).of_size(total_w as u32 + 2, digit_h as u32 + 2);
    draw_filled_rect_mut(canvas, background, LABEL_BACKGROUND);

    let mut left = x;
    for digit in label.bytes().map(|c| (c - b'0') as usize) {
        for (cell, &on) in DIGITS[digit].iter().enumerate() {
            if on == 0 {
                continue;
            }
            let col = (cell % 3) as i32;
            let row = (cell / 3) as i32;
            let dot = Rect::at(left + col * LABEL_SCALE, y + row * LABEL_SCALE)
                .of_size(LABEL_SCALE as u32, LABEL_SCALE as u32);
            draw_filled_rect_mut(canvas, dot, OUTLINE);
        }
        left += digit_w + LABEL_SPACING;
    }
}

pub fn save_annotated(
    image: &DynamicImage,
    regions: &[Region],
    path: impl AsRef<Path>,
) -> Result<(), VisionError> {
    annotate(image, regions).save(path.as_ref())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use brickscan_core::BoundingBox;

    #[test]
    fn test_annotate_draws_two_pixel_outline() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(50, 50, Rgb([255, 255, 255])));
        let regions = vec![Region::new(BoundingBox::new(10, 20, 20, 20), 300.0)];
        let out = annotate(&image, &regions);

        assert_eq!(out.get_pixel(10, 25), &OUTLINE);
        assert_eq!(out.get_pixel(11, 25), &OUTLINE);
        assert_eq!(out.get_pixel(12, 25), &Rgb([255, 255, 255]));
        assert_eq!(out.get_pixel(20, 30), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_annotate_labels_region_index() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(80, 80, Rgb([255, 255, 255])));
        let mut region = Region::new(BoundingBox::new(30, 40, 30, 30), 800.0);
        region.sequence_index = 7;
        let out = annotate(&image, &[region]);

        // Label sits above the box: top row of the 7 is lit, background around it
        let y = 40 - DIGIT_HEIGHT * LABEL_SCALE - 2;
        assert_eq!(out.get_pixel(30, y as u32), &OUTLINE);
        assert_eq!(out.get_pixel(34, y as u32), &OUTLINE);
        assert_eq!(out.get_pixel(29, (y - 1) as u32), &LABEL_BACKGROUND);
        // Second row of the 7 only has its right column lit
        let second = (y + LABEL_SCALE) as u32;
        assert_eq!(out.get_pixel(30, second), &LABEL_BACKGROUND);
        assert_eq!(out.get_pixel(34, second), &OUTLINE);
    }

    #[test]
    fn test_annotate_label_moves_inside_at_top_edge() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(60, 60, Rgb([255, 255, 255])));
        let region = Region::new(BoundingBox::new(5, 0, 40, 40), 1_500.0);
        let out = annotate(&image, &[region]);

        let y = (OUTLINE_WIDTH + 1) as u32;
        // "0" has a lit top-left cell
        assert_eq!(out.get_pixel(5, y), &OUTLINE);
        let inner = (5 + LABEL_SCALE as u32, y + LABEL_SCALE as u32);
        assert_eq!(out.get_pixel(inner.0, inner.1), &LABEL_BACKGROUND);
    }

    #[test]
    fn test_annotate_leaves_source_untouched() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(20, 20, Rgb([1, 2, 3])));
        let regions = vec![Region::new(BoundingBox::new(0, 0, 20, 20), 100.0)];
        let _ = annotate(&image, &regions);
        assert_eq!(image.to_rgb8().get_pixel(0, 0), &Rgb([1, 2, 3]));
    }

    #[test]
    fn test_annotate_tiny_region() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(10, 10));
        let regions = vec![Region::new(BoundingBox::new(2, 2, 1, 1), 1.0)];
        let out = annotate(&image, &regions);
        assert_eq!(out.get_pixel(2, 2), &OUTLINE);
    }
}
