//! Path extraction: fit a bounded quadratic `x = f(y)` through a contour
//! or sample an arbitrary polynomial into a [`Path`].
//!
//! Samples are clipped to the frame before a [`Path`] is built, so every
//! consumer may index or draw [`Path::points`] without further bounds
//! checks.

use serde::Serialize;

use crate::geometry::{self, Polynomial};
use crate::types::Point;

/// Degree of the lane model. Quadratic captures lane curvature without
/// chasing contour noise.
pub const PATH_DEGREE: usize = 2;

/// A polynomial `x = f(y)` and its clipped integer sample.
///
/// A `Path` always holds at least one sample; extraction returns `None`
/// instead of building an empty one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Path {
    function: Polynomial,
    points: Vec<Point>,
    scope: (i32, i32),
    range: (i32, i32),
}

impl Path {
    /// The fitted function `x = f(y)`.
    #[must_use]
    pub const fn function(&self) -> &Polynomial {
        &self.function
    }

    /// Sample points ordered by ascending `y`.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Horizontal extent `(min x, max x)` of the sample.
    #[must_use]
    pub const fn scope(&self) -> (i32, i32) {
        self.scope
    }

    /// Vertical extent `(min y, max y)` of the sample.
    #[must_use]
    pub const fn range(&self) -> (i32, i32) {
        self.range
    }

    /// Mean `x` of the sample.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_x(&self) -> f64 {
        let sum: f64 = self.points.iter().map(|p| f64::from(p.x)).sum();
        sum / self.points.len() as f64
    }
}

/// Builds [`Path`]s for a frame, discarding the unreliable far-field tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathExtractor {
    height_reduction_factor: u32,
}

impl PathExtractor {
    /// Create an extractor that samples `y` from
    /// `height / height_reduction_factor` down to the bottom edge.
    ///
    /// A factor of one keeps only the bottom edge (`y == height`); larger
    /// factors reach further up the frame. Zero is treated as one.
    #[must_use]
    pub const fn new(height_reduction_factor: u32) -> Self {
        Self {
            height_reduction_factor: if height_reduction_factor == 0 {
                1
            } else {
                height_reduction_factor
            },
        }
    }

    /// Fit a quadratic `x = f(y)` through `points` and sample it.
    #[must_use]
    pub fn from_points(&self, points: &[Point], width: u32, height: u32) -> Option<Path> {
        let function = Polynomial::fit(points, PATH_DEGREE)?;
        self.from_function(function, width, height)
    }

    /// Sample `function` at every integer `y` in
    /// `[height / factor, height]`, keeping samples with `0 <= x <= width`.
    ///
    /// Returns `None` when no sample lands inside the frame.
    #[must_use]
    pub fn from_function(&self, function: Polynomial, width: u32, height: u32) -> Option<Path> {
        let min_y = height / self.height_reduction_factor;
        let max_x = f64::from(width);

        let points: Vec<Point> = (min_y..=height)
            .filter_map(|y| {
                let yf = f64::from(y);
                let x = function.eval(yf);
                if !geometry::within_bounds(x, yf, max_x, f64::from(min_y), f64::from(height)) {
                    return None;
                }
                // x lies in [0, width] and y <= height, both fit in i32.
                #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
                let point = Point::new(x as i32, y as i32);
                Some(point)
            })
            .collect();

        let scope = min_max(points.iter().map(|p| p.x))?;
        let range = min_max(points.iter().map(|p| p.y))?;

        Some(Path {
            function,
            points,
            scope,
            range,
        })
    }
}

impl Default for PathExtractor {
    fn default() -> Self {
        Self::new(crate::config::PathConfig::DEFAULT_HEIGHT_REDUCTION_FACTOR)
    }
}

/// Minimum and maximum of an iterator, or `None` if it is empty.
fn min_max(values: impl Iterator<Item = i32>) -> Option<(i32, i32)> {
    values.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}
