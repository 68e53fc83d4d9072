//! Working-frame extraction: owned crops of the source image.
//!
//! Every stage takes its own crop, so the source frame is never mutated
//! and stages never share a pixel buffer. A crop that would be empty is
//! reported as `None` rather than a zero-sized image.

use image::{GrayImage, RgbImage};

use crate::config::Margins;
use crate::types::{BoundingBox, Dimensions};

/// Crop `margins` off each side of `image`.
///
/// Returns `None` if the margins leave no pixels.
#[must_use]
pub fn crop_margins(image: &RgbImage, margins: Margins) -> Option<RgbImage> {
    let (w, h) = image.dimensions();
    let width = w.checked_sub(margins.left)?.checked_sub(margins.right)?;
    let height = h.checked_sub(margins.top)?.checked_sub(margins.bottom)?;
    crop(image, margins.left, margins.top, width, height)
}

/// Drop the top `rows` rows of `image`.
#[must_use]
pub fn crop_top(image: &RgbImage, rows: u32) -> Option<RgbImage> {
    crop_margins(image, Margins::new(rows, 0, 0, 0))
}

/// Crop the pixels covered by `bbox`, clamped to the image.
///
/// Corner order does not matter. Returns `None` if the clamped box is
/// empty.
#[must_use]
pub fn crop_box(image: &RgbImage, bbox: BoundingBox) -> Option<RgbImage> {
    let (x, y, width, height) = clamp_box(bbox, Dimensions::of(image));
    crop(image, x, y, width, height)
}

/// The `(x, y, width, height)` rectangle `bbox` covers inside `frame`.
///
/// Corner order does not matter; the size is zero on an axis the box
/// misses.
#[must_use]
pub fn clamp_box(bbox: BoundingBox, frame: Dimensions) -> (u32, u32, u32, u32) {
    let clamp_x = |v: i32| u32::try_from(v).map_or(0, |v| v.min(frame.width));
    let clamp_y = |v: i32| u32::try_from(v).map_or(0, |v| v.min(frame.height));

    let (x1, x2) = (clamp_x(bbox.x1.min(bbox.x2)), clamp_x(bbox.x1.max(bbox.x2)));
    let (y1, y2) = (clamp_y(bbox.y1.min(bbox.y2)), clamp_y(bbox.y1.max(bbox.y2)));
    (x1, y1, x2 - x1, y2 - y1)
}

/// Luma conversion of an RGB frame.
#[must_use]
pub fn to_gray(image: &RgbImage) -> GrayImage {
    image::imageops::grayscale(image)
}

fn crop(image: &RgbImage, x: u32, y: u32, width: u32, height: u32) -> Option<RgbImage> {
    if width == 0 || height == 0 {
        return None;
    }
    Some(image::imageops::crop_imm(image, x, y, width, height).to_image())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Pixel value encodes its own coordinates.
    #[allow(clippy::cast_possible_truncation)]
    fn coordinate_image(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| image::Rgb([x as u8, y as u8, 0]))
    }

    #[test]
    fn margins_remove_each_side() {
        let img = coordinate_image(20, 10);
        let cropped = crop_margins(&img, Margins::new(1, 2, 3, 4)).unwrap();
        assert_eq!(cropped.dimensions(), (13, 7));
        assert_eq!(cropped.get_pixel(0, 0).0, [3, 1, 0]);
    }

    #[test]
    fn oversized_margins_are_none() {
        let img = coordinate_image(20, 10);
        assert!(crop_margins(&img, Margins::new(5, 5, 0, 0)).is_none());
        assert!(crop_margins(&img, Margins::new(0, 0, 30, 0)).is_none());
    }

    #[test]
    fn crop_top_keeps_bottom_rows() {
        let img = coordinate_image(8, 10);
        let cropped = crop_top(&img, 4).unwrap();
        assert_eq!(cropped.dimensions(), (8, 6));
        assert_eq!(cropped.get_pixel(0, 0).0[1], 4);
        assert!(crop_top(&img, 10).is_none());
    }

    #[test]
    fn box_is_clamped_to_image() {
        let img = coordinate_image(20, 10);
        let cropped = crop_box(&img, BoundingBox::new(-5, 2, 50, 6)).unwrap();
        assert_eq!(cropped.dimensions(), (20, 4));
        assert_eq!(cropped.get_pixel(0, 0).0, [0, 2, 0]);
    }

    #[test]
    fn clamped_box_matches_crop() {
        let frame = Dimensions {
            width: 20,
            height: 10,
        };
        assert_eq!(clamp_box(BoundingBox::new(-5, 2, 50, 6), frame), (0, 2, 20, 4));
        assert_eq!(clamp_box(BoundingBox::new(30, 0, 40, 5), frame), (20, 0, 0, 5));
    }

    #[test]
    fn swapped_corners_are_normalised() {
        let img = coordinate_image(20, 10);
        let cropped = crop_box(&img, BoundingBox::new(8, 6, 4, 2)).unwrap();
        assert_eq!(cropped.dimensions(), (4, 4));
        assert_eq!(cropped.get_pixel(0, 0).0, [4, 2, 0]);
    }

    #[test]
    fn empty_box_is_none() {
        let img = coordinate_image(20, 10);
        assert!(crop_box(&img, BoundingBox::new(5, 5, 5, 9)).is_none());
        assert!(crop_box(&img, BoundingBox::new(30, 0, 40, 5)).is_none());
    }

    #[test]
    fn gray_preserves_dimensions() {
        let img = coordinate_image(7, 3);
        assert_eq!(to_gray(&img).dimensions(), (7, 3));
    }
}
