//! Recorded model outputs that stand in for live inference.
//!
//! A [`RecordedOutputs`] value holds what the detector, classifier,
//! segmenter and text reader previously produced for one image and
//! answers every collaborator trait from that record. Share it through an
//! [`Arc`](std::sync::Arc) to fill all four roles at once.
//!
//! The classifier only ever sees a crop, so recorded classifications are
//! matched by the size of their bounding box. Boxes of equal size must
//! agree on their class or the lookup reports no prediction. A box that
//! overhangs the detection frame is cropped smaller than its corners say;
//! record `frame` so those sizes are clamped the same way. Without it,
//! overhanging boxes are matched by their raw size and usually miss.

use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

use crate::frame;
use crate::model::{Classifier, Detection, Detector, ModelError, SegmentPolygon, Segmenter, TextReader};
use crate::types::{BoundingBox, Dimensions};

/// Refined class for one detected box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedClassification {
    pub bbox: BoundingBox,
    pub class_id: u32,
}

impl RecordedClassification {
    /// Size of the crop the classifier receives for this box.
    fn crop_size(&self, bounds: Option<Dimensions>) -> (u32, u32) {
        match bounds {
            Some(bounds) => {
                let (_, _, width, height) = frame::clamp_box(self.bbox, bounds);
                (width, height)
            }
            None => (
                self.bbox.x1.abs_diff(self.bbox.x2),
                self.bbox.y1.abs_diff(self.bbox.y2),
            ),
        }
    }
}

/// Model outputs captured for a single image.
///
/// Every field defaults to empty, so a record only needs the outputs it
/// has.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordedOutputs {
    pub detections: Vec<Detection>,
    pub classifications: Vec<RecordedClassification>,
    pub segments: Vec<SegmentPolygon>,
    /// OCR fragments for the speedometer crop.
    pub text: Vec<String>,
    /// Detection working frame the boxes refer to.
    pub frame: Option<Dimensions>,
}

impl Detector for RecordedOutputs {
    fn predict(&self, _image: &RgbImage) -> Result<Vec<Detection>, ModelError> {
        Ok(self.detections.clone())
    }
}

impl Classifier for RecordedOutputs {
    fn predict(&self, crop: &RgbImage) -> Result<Option<u32>, ModelError> {
        let size = crop.dimensions();
        let mut matching = self
            .classifications
            .iter()
            .filter(|c| c.crop_size(self.frame) == size)
            .map(|c| c.class_id);
        let Some(first) = matching.next() else {
            return Ok(None);
        };
        if matching.all(|class_id| class_id == first) {
            Ok(Some(first))
        } else {
            Ok(None)
        }
    }
}

impl Segmenter for RecordedOutputs {
    fn predict(&self, _image: &RgbImage) -> Result<Vec<SegmentPolygon>, ModelError> {
        Ok(self.segments.clone())
    }
}

impl TextReader for RecordedOutputs {
    fn read(&self, _image: &GrayImage) -> Result<Vec<String>, ModelError> {
        Ok(self.text.clone())
    }
}
