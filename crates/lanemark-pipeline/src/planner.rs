//! Path planning: pick the lanes the vehicle can reach and synthesize a
//! centerline between each adjacent pair.
//!
//! Lanes are the [`RoadSegment::Passable`] and [`RoadSegment::Impassable`]
//! variants. A lane lying beyond the nearest impassable boundary on its
//! side of the frame is unreachable and is stripped before centerlines are
//! built.
//!
//! Single-lane frames produce no plan. [`Polynomial::mirror_around`] is
//! the primitive for estimating a centerline from one boundary, but no
//! trust policy for such an estimate exists yet.

use tracing::debug;

use crate::geometry::Polynomial;
use crate::path::{Path, PathExtractor};
use crate::types::{PathsBox, RoadSegment, RoadSegmentsBox};

/// A lane together with its signed distance from the frame centre.
#[derive(Debug, Clone, Copy)]
pub struct MeasuredLane<'a> {
    pub segment: &'a RoadSegment,
    pub distance: f64,
}

/// Closest impassable boundaries on either side of the frame centre.
///
/// Infinite when there is no impassable lane on that side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub left: f64,
    pub right: f64,
}

impl Bounds {
    /// No boundary on either side.
    pub const UNBOUNDED: Self = Self {
        left: f64::NEG_INFINITY,
        right: f64::INFINITY,
    };

    /// Returns `true` if `distance` lies in `[left, right]`.
    #[must_use]
    pub fn contains(&self, distance: f64) -> bool {
        (self.left..=self.right).contains(&distance)
    }
}

/// Mean horizontal offset of a path's samples from the frame centre
/// column `width / 2` (integer division, so odd widths round down).
///
/// Negative is left of centre, positive is right.
#[must_use]
pub fn signed_distance(path: &Path, width: u32) -> f64 {
    path.mean_x() - f64::from(width / 2)
}

/// Closest impassable lane on each side: the largest distance `<= 0` and
/// the smallest distance `> 0`.
#[must_use]
pub fn impassable_bounds(lanes: &[MeasuredLane<'_>]) -> Bounds {
    lanes
        .iter()
        .filter(|lane| matches!(lane.segment, RoadSegment::Impassable { .. }))
        .fold(Bounds::UNBOUNDED, |bounds, lane| {
            if lane.distance <= 0.0 {
                Bounds {
                    left: bounds.left.max(lane.distance),
                    ..bounds
                }
            } else {
                Bounds {
                    right: bounds.right.min(lane.distance),
                    ..bounds
                }
            }
        })
}

/// Drop lanes lying outside the impassable bounds of `lanes`.
///
/// The bounds are computed once from the input set. Order of the
/// surviving lanes is preserved.
#[must_use]
pub fn strip_unreachable(lanes: Vec<MeasuredLane<'_>>) -> Vec<MeasuredLane<'_>> {
    let bounds = impassable_bounds(&lanes);
    debug!(
        left = bounds.left,
        right = bounds.right,
        "impassable bounds"
    );
    lanes
        .into_iter()
        .filter(|lane| bounds.contains(lane.distance))
        .collect()
}

/// Plans centerline paths between adjacent reachable lanes.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathPlanner {
    extractor: PathExtractor,
}

impl PathPlanner {
    #[must_use]
    pub const fn new(extractor: PathExtractor) -> Self {
        Self { extractor }
    }

    /// Plan centerlines for a `width` × `height` frame.
    ///
    /// Returns `None` when fewer than two lanes are present. Adjacent
    /// pairs whose averaged curve leaves the frame entirely contribute
    /// nothing, so the box may be empty.
    #[must_use]
    pub fn plan(&self, segments: &RoadSegmentsBox, width: u32, height: u32) -> Option<PathsBox> {
        let lanes: Vec<MeasuredLane<'_>> = segments
            .iter()
            .filter(|segment| segment.is_lane())
            .map(|segment| MeasuredLane {
                segment,
                distance: signed_distance(segment.path(), width),
            })
            .collect();

        if lanes.len() < 2 {
            debug!(lanes = lanes.len(), "too few lanes to plan");
            return None;
        }

        let mut reachable = strip_unreachable(lanes);
        reachable.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        debug!(reachable = reachable.len(), "lanes after stripping");

        let paths: PathsBox = reachable
            .windows(2)
            .filter_map(|pair| {
                let centre = Polynomial::average(
                    pair[0].segment.path().function(),
                    pair[1].segment.path().function(),
                );
                self.extractor.from_function(centre, width, height)
            })
            .collect();
        Some(paths)
    }
}
