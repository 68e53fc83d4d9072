//! Road segmentation stage.
//!
//! Each polygon from the [`Segmenter`] is labelled by class, cleaned into
//! the contour of its dominant region and paired with a fitted path.
//! Polygons that clean to nothing, or whose fit never enters the frame,
//! are dropped.

use image::RgbImage;
use tracing::debug;

use crate::cleanse;
use crate::config::SegmentationConfig;
use crate::frame;
use crate::model::{SegmentPolygon, Segmenter};
use crate::path::{Path, PathExtractor};
use crate::preprocess::Preprocess;
use crate::types::{ClassFamily, Dimensions, Point, RoadSegment, RoadSegmentsBox, StageError};

/// Kind of a segmented region, from the segmenter's class id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    Driveable,
    Passable,
    Impassable,
}

impl SegmentKind {
    /// Map a segmenter class id: 0 driveable, 1 passable, 2 impassable.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::UnknownClass`] for any other id.
    pub fn from_class_id(class_id: u32) -> Result<Self, StageError> {
        match class_id {
            0 => Ok(Self::Driveable),
            1 => Ok(Self::Passable),
            2 => Ok(Self::Impassable),
            _ => Err(StageError::UnknownClass {
                family: ClassFamily::RoadSegment,
                class_id,
            }),
        }
    }

    #[must_use]
    pub fn segment(self, contour: Vec<Point>, path: Path) -> RoadSegment {
        match self {
            Self::Driveable => RoadSegment::Driveable { contour, path },
            Self::Passable => RoadSegment::Passable { contour, path },
            Self::Impassable => RoadSegment::Impassable { contour, path },
        }
    }
}

/// Run the segmentation stage on a source frame.
///
/// Contours are cleaned in the cropped working frame; paths are fitted
/// against the full frame's width and height. Returns `Ok(None)` when the
/// crop leaves no pixels.
///
/// # Errors
///
/// Returns [`StageError::Model`] if the segmenter fails and
/// [`StageError::UnknownClass`] if it reports a class outside the known
/// set.
pub fn extract(
    image: &RgbImage,
    preprocessor: Option<&dyn Preprocess>,
    segmenter: &dyn Segmenter,
    config: &SegmentationConfig,
    extractor: &PathExtractor,
) -> Result<Option<RoadSegmentsBox>, StageError> {
    let Some(cropped) = frame::crop_top(image, config.crop_top) else {
        debug!("segmentation crop is empty");
        return Ok(None);
    };
    let working = match preprocessor {
        Some(p) => p.preprocess(&cropped),
        None => cropped,
    };
    let working_frame = Dimensions::of(&working);

    let polygons = segmenter.predict(&working)?;
    let total = polygons.len();
    let mut segments = RoadSegmentsBox::new();
    for SegmentPolygon { polygon, class_id } in polygons {
        let kind = SegmentKind::from_class_id(class_id)?;
        let Some(contour) = cleanse::clean(&polygon, working_frame) else {
            continue;
        };
        let Some(path) = extractor.from_points(&contour, image.width(), image.height()) else {
            continue;
        };
        segments.add(kind.segment(contour, path));
    }

    debug!(polygons = total, segments = segments.len(), "segmented");
    Ok(Some(segments))
}
