//! Shared types for the lanemark annotation pipeline.

use std::fmt;

use serde::Serialize;

use crate::diagnostics::Task;
use crate::model::ModelError;
use crate::path::Path;

/// Re-export `RgbImage` so downstream crates can hand frames to the
/// pipeline without depending on `image` directly.
pub use image::RgbImage;

/// Re-export `GrayImage` for collaborators that consume single-channel
/// intermediates (e.g. the OCR reader in the speed stage).
pub use image::GrayImage;

/// An integer pixel coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: i32,
    /// Vertical position (pixels from top edge).
    pub y: i32,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of an image buffer.
    #[must_use]
    pub fn of<P: image::Pixel>(image: &image::ImageBuffer<P, Vec<P::Subpixel>>) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }

    /// Returns `true` if either side is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

// ───────────────────────── Bounded scalars ──────────────────────────

/// A bounded scalar was constructed outside its valid domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BoundsError {
    /// Speed outside `0..=100`.
    #[error("the speed must be between 0 and 100, got {0}")]
    Speed(i64),
    /// Direction not one of -1, 0 or 1.
    #[error("direction must be -1, 0 or 1, got {0}")]
    Direction(i64),
}

/// Speed read from the dashboard, in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Speed(u8);

impl Speed {
    /// Largest representable speed.
    pub const MAX: u8 = 100;

    /// The speed value.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Speed {
    type Error = BoundsError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match u8::try_from(value) {
            Ok(v) if v <= Self::MAX => Ok(Self(v)),
            _ => Err(BoundsError::Speed(value)),
        }
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Steering bias advised by the navigation overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(i8)]
pub enum Direction {
    /// Turn left (`-1`).
    TurnLeft = -1,
    /// Keep straight (`0`).
    Straight = 0,
    /// Turn right (`1`).
    TurnRight = 1,
}

impl Direction {
    /// The signed representation: `-1`, `0` or `1`.
    #[must_use]
    pub const fn value(self) -> i8 {
        self as i8
    }
}

impl TryFrom<i64> for Direction {
    type Error = BoundsError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::TurnLeft),
            0 => Ok(Self::Straight),
            1 => Ok(Self::TurnRight),
            other => Err(BoundsError::Direction(other)),
        }
    }
}

// ───────────────────────── Road objects ─────────────────────────────

/// Axis-aligned box `(x1, y1)`–`(x2, y2)` in pixels of the cropped
/// detection frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    /// Create a new bounding box.
    #[must_use]
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

/// An object detected on the road.
///
/// Sign and traffic-light class ids come from the classification
/// refinement when one was available; vehicle ids are the detector's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoadObject {
    Vehicle { bbox: BoundingBox, class_id: u32 },
    Sign { bbox: BoundingBox, class_id: u32 },
    TrafficLight { bbox: BoundingBox, class_id: u32 },
}

impl RoadObject {
    /// The object's bounding box.
    #[must_use]
    pub const fn bbox(&self) -> BoundingBox {
        match *self {
            Self::Vehicle { bbox, .. } | Self::Sign { bbox, .. } | Self::TrafficLight { bbox, .. } => {
                bbox
            }
        }
    }

    /// The object's class id.
    #[must_use]
    pub const fn class_id(&self) -> u32 {
        match *self {
            Self::Vehicle { class_id, .. }
            | Self::Sign { class_id, .. }
            | Self::TrafficLight { class_id, .. } => class_id,
        }
    }
}

// ───────────────────────── Road segments ────────────────────────────

/// A cleaned segmentation region with its fitted path.
///
/// Contour points are relative to the cropped segmentation frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoadSegment {
    /// Open road surface.
    Driveable { contour: Vec<Point>, path: Path },
    /// Lane boundary that may be crossed.
    Passable { contour: Vec<Point>, path: Path },
    /// Lane boundary that must not be crossed.
    Impassable { contour: Vec<Point>, path: Path },
}

impl RoadSegment {
    /// Contour points of the cleaned region.
    #[must_use]
    pub fn contour(&self) -> &[Point] {
        match self {
            Self::Driveable { contour, .. }
            | Self::Passable { contour, .. }
            | Self::Impassable { contour, .. } => contour,
        }
    }

    /// The path fitted through the region.
    #[must_use]
    pub const fn path(&self) -> &Path {
        match self {
            Self::Driveable { path, .. } | Self::Passable { path, .. } | Self::Impassable { path, .. } => {
                path
            }
        }
    }

    /// Returns `true` for lane boundaries (passable or impassable).
    #[must_use]
    pub const fn is_lane(&self) -> bool {
        matches!(self, Self::Passable { .. } | Self::Impassable { .. })
    }
}

// ───────────────────────── Ordered boxes ────────────────────────────

/// Append-only ordered collection. Insertion order is preserved.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct OrderedBox<T>(Vec<T>);

impl<T> OrderedBox<T> {
    /// Create an empty box.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Append an item.
    pub fn add(&mut self, item: T) {
        self.0.push(item);
    }

    /// Returns `true` if the box holds nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of items.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.0.iter()
    }

    /// Items as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.0
    }
}

impl<T> Default for OrderedBox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<T> for OrderedBox<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<T> IntoIterator for OrderedBox<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a OrderedBox<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Detected road objects.
pub type RoadObjectsBox = OrderedBox<RoadObject>;
/// Cleaned road segments.
pub type RoadSegmentsBox = OrderedBox<RoadSegment>;
/// Planned centerline paths.
pub type PathsBox = OrderedBox<Path>;

// ───────────────────────── Container ────────────────────────────────

/// All annotations produced for one image.
///
/// Every slot is either absent or holds a valid value. The container is
/// assembled once, after every contributing task has completed.
#[derive(Debug, Clone)]
pub struct AnnotationContainer {
    original: RgbImage,
    annotated: RgbImage,
    pub(crate) direction: Option<Direction>,
    pub(crate) speed: Option<Speed>,
    pub(crate) road_objects: Option<RoadObjectsBox>,
    pub(crate) road_segments: Option<RoadSegmentsBox>,
    pub(crate) paths: Option<PathsBox>,
}

impl AnnotationContainer {
    /// Empty container for `image`; the annotated copy starts as a clone.
    pub(crate) fn new(image: RgbImage) -> Self {
        Self {
            annotated: image.clone(),
            original: image,
            direction: None,
            speed: None,
            road_objects: None,
            road_segments: None,
            paths: None,
        }
    }

    /// The unmodified source image.
    #[must_use]
    pub const fn original_image(&self) -> &RgbImage {
        &self.original
    }

    /// The copy reserved for drawing annotations.
    #[must_use]
    pub const fn annotated_image(&self) -> &RgbImage {
        &self.annotated
    }

    /// Mutable access to the drawing copy.
    pub const fn annotated_image_mut(&mut self) -> &mut RgbImage {
        &mut self.annotated
    }

    #[must_use]
    pub const fn direction(&self) -> Option<Direction> {
        self.direction
    }

    #[must_use]
    pub const fn speed(&self) -> Option<Speed> {
        self.speed
    }

    #[must_use]
    pub const fn road_objects(&self) -> Option<&RoadObjectsBox> {
        self.road_objects.as_ref()
    }

    #[must_use]
    pub const fn road_segments(&self) -> Option<&RoadSegmentsBox> {
        self.road_segments.as_ref()
    }

    #[must_use]
    pub const fn paths(&self) -> Option<&PathsBox> {
        self.paths.as_ref()
    }

    /// Serializable view of the annotation slots (without pixel data).
    #[must_use]
    pub fn summary(&self) -> AnnotationSummary<'_> {
        AnnotationSummary {
            dimensions: Dimensions::of(&self.original),
            direction: self.direction,
            speed: self.speed,
            road_objects: self.road_objects.as_ref(),
            road_segments: self.road_segments.as_ref(),
            paths: self.paths.as_ref(),
        }
    }
}

/// Borrowed, serializable view of an [`AnnotationContainer`].
#[derive(Debug, Clone, Serialize)]
pub struct AnnotationSummary<'a> {
    pub dimensions: Dimensions,
    pub direction: Option<Direction>,
    pub speed: Option<Speed>,
    pub road_objects: Option<&'a RoadObjectsBox>,
    pub road_segments: Option<&'a RoadSegmentsBox>,
    pub paths: Option<&'a PathsBox>,
}

// ───────────────────────── Errors ───────────────────────────────────

/// Which family of class ids a lookup failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassFamily {
    RoadObject,
    RoadSegment,
}

impl fmt::Display for ClassFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoadObject => f.write_str("road object"),
            Self::RoadSegment => f.write_str("road segment"),
        }
    }
}

/// Errors raised inside a single extraction stage.
///
/// The orchestrator turns these into an absent slot, except
/// [`StageError::OutOfBounds`] which signals a broken contract.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// A collaborator (inference engine, OCR) failed.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// A model returned a class id outside the known set.
    #[error("unknown {family} class id: {class_id}")]
    UnknownClass { family: ClassFamily, class_id: u32 },

    /// A bounded scalar was built from an unchecked value.
    #[error(transparent)]
    OutOfBounds(#[from] BoundsError),
}

/// Errors that abort processing of an image.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The input image has zero width or height.
    #[error("input image is empty")]
    EmptyInput,

    /// Annotator configuration is invalid.
    #[error("invalid annotator configuration: {0}")]
    InvalidConfig(String),

    /// The worker pool could not be built or lost its tasks.
    #[error("worker pool failure: {0}")]
    WorkerPool(String),

    /// A stage panicked.
    #[error("{task} task panicked")]
    StagePanicked { task: Task },

    /// A stage violated a construction contract.
    #[error("{task} task violated a value contract: {source}")]
    ContractViolation { task: Task, source: BoundsError },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn speed_accepts_closed_range() {
        for n in [0, 1, 50, 99, 100] {
            let speed = Speed::try_from(n).unwrap();
            assert_eq!(i64::from(speed.value()), n);
        }
    }

    #[test]
    fn speed_rejects_out_of_range() {
        for n in [-1, 101, 255, 256, i64::MIN, i64::MAX] {
            assert_eq!(Speed::try_from(n), Err(BoundsError::Speed(n)));
        }
    }

    #[test]
    fn direction_accepts_ternary_values() {
        assert_eq!(Direction::try_from(-1), Ok(Direction::TurnLeft));
        assert_eq!(Direction::try_from(0), Ok(Direction::Straight));
        assert_eq!(Direction::try_from(1), Ok(Direction::TurnRight));
        assert_eq!(Direction::TurnLeft.value(), -1);
        assert_eq!(Direction::TurnRight.value(), 1);
    }

    #[test]
    fn direction_rejects_everything_else() {
        for d in [-2, 2, 40, -100] {
            assert_eq!(Direction::try_from(d), Err(BoundsError::Direction(d)));
        }
    }

    #[test]
    fn road_object_accessors() {
        let bbox = BoundingBox::new(1, 2, 3, 4);
        let obj = RoadObject::TrafficLight { bbox, class_id: 7 };
        assert_eq!(obj.bbox(), bbox);
        assert_eq!(obj.class_id(), 7);
    }

    #[test]
    fn ordered_box_preserves_insertion_order() {
        let mut b: OrderedBox<u32> = OrderedBox::new();
        assert!(b.is_empty());
        b.add(3);
        b.add(1);
        b.add(2);
        assert_eq!(b.len(), 3);
        assert_eq!(b.as_slice(), &[3, 1, 2]);
        let collected: Vec<u32> = b.into_iter().collect();
        assert_eq!(collected, vec![3, 1, 2]);
    }

    #[test]
    fn new_container_has_empty_slots_and_cloned_drawing_copy() {
        let img = RgbImage::from_pixel(4, 3, image::Rgb([9, 8, 7]));
        let container = AnnotationContainer::new(img);
        assert!(container.direction().is_none());
        assert!(container.speed().is_none());
        assert!(container.road_objects().is_none());
        assert!(container.road_segments().is_none());
        assert!(container.paths().is_none());
        assert_eq!(
            container.original_image().as_raw(),
            container.annotated_image().as_raw()
        );
        assert_eq!(
            container.summary().dimensions,
            Dimensions {
                width: 4,
                height: 3
            }
        );
    }

    #[test]
    fn stage_error_messages() {
        let err = StageError::UnknownClass {
            family: ClassFamily::RoadSegment,
            class_id: 9,
        };
        assert_eq!(err.to_string(), "unknown road segment class id: 9");
    }
}
