//! Segment cleansing: turn a raw segmentation polygon into the contour of
//! its dominant, denoised region.
//!
//! The polygon is rasterised into a binary mask, opened (erode then
//! dilate) to drop speckle, closed (dilate then erode) to seal small gaps,
//! and traced with Suzuki-Abe border following via
//! `imageproc::contours::find_contours`. Only outermost borders are
//! considered; the one enclosing the largest area wins.

use image::{GrayImage, Luma};
use imageproc::contours::{BorderType, Contour};
use imageproc::distance_transform::Norm;

use crate::geometry;
use crate::types::{Dimensions, Point};

/// Mask value for pixels inside the polygon.
pub(crate) const FOREGROUND: Luma<u8> = Luma([255]);

/// Radius of the structuring element. An L1 ball of radius 1 is the 3×3
/// cross, i.e. the 3×3 elliptical kernel.
const KERNEL_RADIUS: u8 = 1;

/// Clean a polygon and return the contour of its largest region.
///
/// Returns `None` when the polygon has fewer than three distinct
/// vertices, when the frame is empty, or when nothing survives the
/// morphological cleanup. Never panics.
#[must_use = "returns the cleaned contour"]
pub fn clean(polygon: &[Point], frame: Dimensions) -> Option<Vec<Point>> {
    if frame.is_empty() {
        return None;
    }
    let mask = rasterize(polygon, frame)?;
    let cleaned = morph(&mask);
    largest_external_contour(&cleaned)
}

/// Rasterise a polygon into a binary mask of the frame size.
///
/// The polygon is clipped to the frame first, so vertices anywhere in the
/// `i32` range are accepted. Returns `None` for a degenerate polygon or
/// one that misses the frame.
#[must_use]
pub fn rasterize(polygon: &[Point], frame: Dimensions) -> Option<GrayImage> {
    let mut mask = GrayImage::new(frame.width, frame.height);
    fill_polygon(&mut mask, polygon).then_some(mask)
}

/// Fill a polygon into an existing mask.
///
/// Returns `false`, leaving the mask untouched, when the polygon has
/// fewer than three distinct vertices or lies entirely outside the mask.
pub fn fill_polygon(mask: &mut GrayImage, polygon: &[Point]) -> bool {
    let (width, height) = mask.dimensions();
    let vertices = geometry::polygon_vertices(&geometry::clip_polygon(polygon, width, height));
    if vertices.is_empty() {
        return false;
    }
    let poly: Vec<imageproc::point::Point<i32>> = vertices
        .iter()
        .map(|p| imageproc::point::Point::new(p.x, p.y))
        .collect();
    imageproc::drawing::draw_polygon_mut(mask, &poly, FOREGROUND);
    true
}

/// Morphological open followed by close with the 3×3 cross element.
#[must_use]
pub fn morph(mask: &GrayImage) -> GrayImage {
    let opened = imageproc::morphology::open(mask, Norm::L1, KERNEL_RADIUS);
    imageproc::morphology::close(&opened, Norm::L1, KERNEL_RADIUS)
}

/// Outermost contours of a binary mask.
///
/// Border following never starts on column 0, so the mask is traced
/// inside a one-pixel background border and the points shifted back.
#[must_use]
pub fn external_contours(mask: &GrayImage) -> Vec<Vec<Point>> {
    let mut padded = GrayImage::new(mask.width() + 2, mask.height() + 2);
    image::imageops::replace(&mut padded, mask, 1, 1);
    let contours: Vec<Contour<i32>> = imageproc::contours::find_contours(&padded);
    contours
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| {
            c.points
                .into_iter()
                .map(|p| Point::new(p.x - 1, p.y - 1))
                .collect()
        })
        .collect()
}

/// The external contour with the largest enclosed area.
///
/// Ties keep the first contour found.
fn largest_external_contour(mask: &GrayImage) -> Option<Vec<Point>> {
    let mut best: Option<(f64, Vec<Point>)> = None;
    for contour in external_contours(mask) {
        let area = geometry::polygon_area(&contour);
        if best.as_ref().is_none_or(|(best_area, _)| area > *best_area) {
            best = Some((area, contour));
        }
    }
    best.map(|(_, contour)| contour)
}
