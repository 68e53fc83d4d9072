//! Direction stage: read the steering bias off the navigation overlay.
//!
//! The overlay draws the planned route in red. Within the cropped overlay
//! the stage keeps every sizeable red region (filled, so outlines count
//! as solid), then measures in the upper half of the crop:
//!
//! * **bias**: mean horizontal offset of red pixels from the centre
//!   column, as a percentage of the half-width (`-100..=100`);
//! * **on-lane ratio**: share of the centre pillar that is red.
//!
//! A strong bias with the route leaving the pillar is a turn; a centred
//! route filling the pillar is straight; anything else is ambiguous and
//! produces no direction.

use image::{GrayImage, Luma, RgbImage};
use serde::Serialize;
use tracing::debug;

use crate::cleanse;
use crate::config::DirectionConfig;
use crate::frame;
use crate::geometry;
use crate::types::{Direction, StageError};

/// Raw measurements behind a direction decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DirectionReading {
    /// Horizontal lean of the route, in percent of the half-width.
    pub bias: i64,
    /// Red share of the centre pillar, in `[0, 1]`.
    pub on_lane: f64,
}

/// Run the direction stage on a source frame.
///
/// # Errors
///
/// Returns [`StageError::OutOfBounds`] only if the decision table
/// produced a value outside `-1..=1`.
pub fn extract(image: &RgbImage, config: &DirectionConfig) -> Result<Option<Direction>, StageError> {
    let Some(overlay) = frame::crop_margins(image, config.crop) else {
        debug!("direction crop is empty");
        return Ok(None);
    };
    let Some(reading) = measure(&route_mask(&overlay, config), config) else {
        debug!("no route in the overlay");
        return Ok(None);
    };
    let decision = decide(reading, config);
    debug!(reading.bias, reading.on_lane, ?decision, "direction");
    Ok(decision.map(Direction::try_from).transpose()?)
}

/// Binary mask of the sizeable, filled red regions of `overlay`.
#[must_use]
pub fn route_mask(overlay: &RgbImage, config: &DirectionConfig) -> GrayImage {
    let red = GrayImage::from_fn(overlay.width(), overlay.height(), |x, y| {
        let [r, g, b] = overlay.get_pixel(x, y).0;
        if r > config.red_threshold && r > g && r > b {
            cleanse::FOREGROUND
        } else {
            Luma([0])
        }
    });

    let mut filled = GrayImage::new(red.width(), red.height());
    for contour in cleanse::external_contours(&red) {
        if geometry::polygon_area(&contour) < config.contour_min_area {
            continue;
        }
        for p in &contour {
            // Contour points come from the mask itself, so they are in bounds.
            if let (Ok(x), Ok(y)) = (u32::try_from(p.x), u32::try_from(p.y)) {
                filled.put_pixel(x, y, cleanse::FOREGROUND);
            }
        }
        cleanse::fill_polygon(&mut filled, &contour);
    }
    filled
}

/// Bias and on-lane ratio of a route mask, or `None` if the upper half
/// holds no route pixels.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn measure(mask: &GrayImage, config: &DirectionConfig) -> Option<DirectionReading> {
    let (width, height) = mask.dimensions();
    let centre = i64::from(width / 2);
    let top = height / 2;
    let pillar = config.center_pillar_crop..width.saturating_sub(config.center_pillar_crop);

    let mut count: i64 = 0;
    let mut offset_sum: i64 = 0;
    let mut pillar_count: u64 = 0;
    for (x, _y, pixel) in mask.enumerate_pixels().filter(|(_, y, _)| *y < top) {
        if pixel.0[0] == 0 {
            continue;
        }
        count += 1;
        offset_sum += i64::from(x) - centre;
        if pillar.contains(&x) {
            pillar_count += 1;
        }
    }

    if count == 0 || centre == 0 {
        return None;
    }

    let bias = (100.0 * offset_sum as f64 / (count * centre) as f64).trunc() as i64;
    let pillar_size = u64::from(pillar.end.saturating_sub(pillar.start)) * u64::from(top);
    let on_lane = if pillar_count == 0 {
        0.0
    } else {
        pillar_count as f64 / pillar_size as f64
    };
    Some(DirectionReading { bias, on_lane })
}

/// Apply the decision table to a reading.
///
/// Returns the signed direction value, or `None` when ambiguous.
#[must_use]
pub fn decide(reading: DirectionReading, config: &DirectionConfig) -> Option<i64> {
    let off_lane = reading.on_lane < config.on_lane_ratio;
    if reading.bias <= -config.turn_bias && off_lane {
        Some(-1)
    } else if reading.bias >= config.turn_bias && off_lane {
        Some(1)
    } else if reading.bias.abs() < config.straight_bias && !off_lane {
        Some(0)
    } else {
        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::Margins;

    const RED: image::Rgb<u8> = image::Rgb([220, 30, 30]);
    const ROAD: image::Rgb<u8> = image::Rgb([90, 90, 90]);

    fn config() -> DirectionConfig {
        DirectionConfig {
            crop: Margins::default(),
            center_pillar_crop: 20,
            ..DirectionConfig::default()
        }
    }

    /// 100×40 overlay with red in `x_range` across the upper rows.
    fn overlay(x_range: std::ops::Range<u32>, rows: std::ops::Range<u32>) -> RgbImage {
        RgbImage::from_fn(100, 40, |x, y| {
            if x_range.contains(&x) && rows.contains(&y) {
                RED
            } else {
                ROAD
            }
        })
    }

    #[test]
    fn route_on_the_left_turns_left() {
        let img = overlay(0..20, 0..20);
        assert_eq!(extract(&img, &config()).unwrap(), Some(Direction::TurnLeft));
    }

    #[test]
    fn route_on_the_right_turns_right() {
        let img = overlay(80..100, 0..20);
        assert_eq!(extract(&img, &config()).unwrap(), Some(Direction::TurnRight));
    }

    #[test]
    fn centred_route_filling_pillar_is_straight() {
        let img = overlay(20..80, 0..40);
        let cfg = config();
        let reading = measure(&route_mask(&img, &cfg), &cfg).unwrap();
        assert!(reading.bias.abs() < 5, "{reading:?}");
        assert!((reading.on_lane - 1.0).abs() < 1e-9, "{reading:?}");
        assert_eq!(extract(&img, &cfg).unwrap(), Some(Direction::Straight));
    }

    #[test]
    fn moderate_lean_is_ambiguous() {
        // Mean x = 39.5 against centre 50: bias -21.
        let img = overlay(30..50, 0..20);
        assert_eq!(extract(&img, &config()).unwrap(), None);
    }

    #[test]
    fn no_red_is_absent() {
        let img = RgbImage::from_pixel(100, 40, ROAD);
        assert_eq!(extract(&img, &config()).unwrap(), None);
    }

    #[test]
    fn red_only_in_lower_half_is_absent() {
        let img = overlay(0..100, 25..40);
        assert_eq!(extract(&img, &config()).unwrap(), None);
    }

    #[test]
    fn speckles_below_min_area_are_ignored() {
        let img = overlay(5..8, 5..8);
        let cfg = config();
        let mask = route_mask(&img, &cfg);
        assert!(mask.pixels().all(|p| p.0[0] == 0));
        assert_eq!(extract(&img, &cfg).unwrap(), None);
    }

    #[test]
    fn outlined_route_is_filled() {
        // Hollow red rectangle: the interior counts as route after filling.
        let img = RgbImage::from_fn(100, 40, |x, y| {
            let inside = (10..40).contains(&x) && (2..18).contains(&y);
            let interior = (12..38).contains(&x) && (4..16).contains(&y);
            if inside && !interior { RED } else { ROAD }
        });
        let mask = route_mask(&img, &config());
        assert_eq!(mask.get_pixel(25, 10).0[0], 255);
    }

    #[test]
    fn crop_larger_than_frame_is_absent() {
        let img = overlay(0..20, 0..20);
        assert_eq!(extract(&img, &DirectionConfig::default()).unwrap(), None);
    }

    #[test]
    fn decision_table_edges() {
        let cfg = config();
        let at = |bias, on_lane| decide(DirectionReading { bias, on_lane }, &cfg);
        assert_eq!(at(-40, 0.49), Some(-1));
        assert_eq!(at(40, 0.0), Some(1));
        assert_eq!(at(-39, 0.0), None);
        assert_eq!(at(-40, 0.5), None);
        assert_eq!(at(4, 0.5), Some(0));
        assert_eq!(at(-4, 1.0), Some(0));
        assert_eq!(at(5, 0.9), None);
        assert_eq!(at(0, 0.49), None);
    }
}
