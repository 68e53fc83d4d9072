//! Road-object stage, in two phases.
//!
//! [`detect`] runs the detector on the cropped, preprocessed working
//! frame and maps its class ids onto object kinds, yielding
//! [`ObjectDraft`]s. [`refine`] then runs the classifier on each sign and
//! traffic-light crop and finalises the drafts into [`RoadObject`]s.
//! Nothing is mutated in place between the two phases.

use image::RgbImage;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::DetectionConfig;
use crate::frame;
use crate::model::{Classifier, Detection, Detector};
use crate::preprocess::Preprocess;
use crate::types::{BoundingBox, ClassFamily, RoadObject, RoadObjectsBox, StageError};

/// Kind of a detected object, from the detector's class id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ObjectKind {
    Sign,
    TrafficLight,
    Vehicle,
}

impl ObjectKind {
    /// Map a detector class id: 0 sign, 1 traffic light, 2 vehicle.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::UnknownClass`] for any other id.
    pub fn from_class_id(class_id: u32) -> Result<Self, StageError> {
        match class_id {
            0 => Ok(Self::Sign),
            1 => Ok(Self::TrafficLight),
            2 => Ok(Self::Vehicle),
            _ => Err(StageError::UnknownClass {
                family: ClassFamily::RoadObject,
                class_id,
            }),
        }
    }

    /// Whether the classifier refines this kind's class id.
    #[must_use]
    pub const fn is_refinable(self) -> bool {
        matches!(self, Self::Sign | Self::TrafficLight)
    }
}

/// A detected object awaiting classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ObjectDraft {
    pub kind: ObjectKind,
    pub bbox: BoundingBox,
    /// Class id reported by the detector.
    pub class_id: u32,
}

impl ObjectDraft {
    /// Finalise with the given class id.
    #[must_use]
    pub const fn finish(self, class_id: u32) -> RoadObject {
        let bbox = self.bbox;
        match self.kind {
            ObjectKind::Sign => RoadObject::Sign { bbox, class_id },
            ObjectKind::TrafficLight => RoadObject::TrafficLight { bbox, class_id },
            ObjectKind::Vehicle => RoadObject::Vehicle { bbox, class_id },
        }
    }
}

/// Output of [`detect`]: the drafts and the working frame their boxes
/// refer to.
#[derive(Debug, Clone)]
pub struct Detections {
    frame: RgbImage,
    drafts: Vec<ObjectDraft>,
}

impl Detections {
    #[must_use]
    pub fn drafts(&self) -> &[ObjectDraft] {
        &self.drafts
    }

    /// The cropped, preprocessed frame the detector saw.
    #[must_use]
    pub const fn frame(&self) -> &RgbImage {
        &self.frame
    }
}

/// Detection phase.
///
/// Returns `Ok(None)` when the crop leaves no pixels.
///
/// # Errors
///
/// Returns [`StageError::Model`] if the detector fails and
/// [`StageError::UnknownClass`] if it reports a class outside the known
/// set.
pub fn detect(
    image: &RgbImage,
    preprocessor: Option<&dyn Preprocess>,
    detector: &dyn Detector,
    config: &DetectionConfig,
) -> Result<Option<Detections>, StageError> {
    let Some(cropped) = frame::crop_top(image, config.crop_top) else {
        debug!("detection crop is empty");
        return Ok(None);
    };
    let working = match preprocessor {
        Some(p) => p.preprocess(&cropped),
        None => cropped,
    };

    let drafts = detector
        .predict(&working)?
        .into_iter()
        .map(|Detection { bbox, class_id }| {
            Ok(ObjectDraft {
                kind: ObjectKind::from_class_id(class_id)?,
                bbox,
                class_id,
            })
        })
        .collect::<Result<Vec<_>, StageError>>()?;

    debug!(objects = drafts.len(), "detected");
    Ok(Some(Detections {
        frame: working,
        drafts,
    }))
}

/// Refinement phase.
///
/// Each sign and traffic-light box is cropped from the detection frame
/// and classified; a returned class replaces the detector's id. Empty
/// crops, absent predictions and classifier failures keep the detector's
/// id. Without a classifier every draft is finalised unchanged.
#[must_use]
pub fn refine(detections: Detections, classifier: Option<&dyn Classifier>) -> RoadObjectsBox {
    let Detections { frame, drafts } = detections;
    drafts
        .into_iter()
        .map(|draft| {
            let refined = classifier
                .filter(|_| draft.kind.is_refinable())
                .and_then(|c| classify(c, &frame, draft));
            draft.finish(refined.unwrap_or(draft.class_id))
        })
        .collect()
}

fn classify(classifier: &dyn Classifier, frame: &RgbImage, draft: ObjectDraft) -> Option<u32> {
    let crop = frame::crop_box(frame, draft.bbox)?;
    match classifier.predict(&crop) {
        Ok(class) => class,
        Err(err) => {
            warn!(%err, bbox = ?draft.bbox, "classification failed, keeping detector class");
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::ModelError;

    struct FixedDetector(Vec<Detection>);

    impl Detector for FixedDetector {
        fn predict(&self, _image: &RgbImage) -> Result<Vec<Detection>, ModelError> {
            Ok(self.0.clone())
        }
    }

    /// Detector that reports one vehicle covering the whole frame it saw.
    struct FrameSizeDetector;

    impl Detector for FrameSizeDetector {
        #[allow(clippy::cast_possible_wrap)]
        fn predict(&self, image: &RgbImage) -> Result<Vec<Detection>, ModelError> {
            let (w, h) = image.dimensions();
            Ok(vec![Detection {
                bbox: BoundingBox::new(0, 0, w as i32, h as i32),
                class_id: 2,
            }])
        }
    }

    /// Classifier keyed on the crop width.
    struct WidthClassifier;

    impl Classifier for WidthClassifier {
        fn predict(&self, crop: &RgbImage) -> Result<Option<u32>, ModelError> {
            match crop.width() {
                10 => Ok(Some(40)),
                20 => Ok(None),
                _ => Err(ModelError::new("unsupported crop")),
            }
        }
    }

    fn config() -> DetectionConfig {
        DetectionConfig { crop_top: 10 }
    }

    fn detection(x1: i32, x2: i32, class_id: u32) -> Detection {
        Detection {
            bbox: BoundingBox::new(x1, 0, x2, 10),
            class_id,
        }
    }

    #[test]
    fn class_ids_map_to_kinds() {
        assert_eq!(ObjectKind::from_class_id(0).unwrap(), ObjectKind::Sign);
        assert_eq!(ObjectKind::from_class_id(1).unwrap(), ObjectKind::TrafficLight);
        assert_eq!(ObjectKind::from_class_id(2).unwrap(), ObjectKind::Vehicle);
        assert!(matches!(
            ObjectKind::from_class_id(3),
            Err(StageError::UnknownClass { class_id: 3, .. })
        ));
    }

    #[test]
    fn detector_sees_cropped_frame() {
        let img = RgbImage::new(64, 48);
        let detections = detect(&img, None, &FrameSizeDetector, &config()).unwrap().unwrap();
        assert_eq!(detections.frame().dimensions(), (64, 38));
        assert_eq!(detections.drafts()[0].bbox, BoundingBox::new(0, 0, 64, 38));
    }

    #[test]
    fn preprocessor_runs_before_detection() {
        let img = RgbImage::new(64, 48);
        let halve = |img: &RgbImage| image::imageops::crop_imm(img, 0, 0, 32, 19).to_image();
        let detections = detect(&img, Some(&halve), &FrameSizeDetector, &config())
            .unwrap()
            .unwrap();
        assert_eq!(detections.drafts()[0].bbox, BoundingBox::new(0, 0, 32, 19));
    }

    #[test]
    fn unknown_class_fails_the_stage() {
        let img = RgbImage::new(64, 48);
        let detector = FixedDetector(vec![detection(0, 5, 0), detection(0, 5, 9)]);
        assert!(matches!(
            detect(&img, None, &detector, &config()),
            Err(StageError::UnknownClass { class_id: 9, .. })
        ));
    }

    #[test]
    fn crop_beyond_frame_is_absent() {
        let img = RgbImage::new(64, 8);
        let detector = FixedDetector(vec![detection(0, 5, 0)]);
        assert!(detect(&img, None, &detector, &config()).unwrap().is_none());
    }

    #[test]
    fn refinement_rewrites_signs_and_lights_only() {
        let img = RgbImage::new(64, 48);
        let detector = FixedDetector(vec![
            detection(0, 10, 0),  // sign, classifier says 40
            detection(10, 30, 1), // light, classifier has no opinion
            detection(30, 35, 0), // sign, classifier errors
            detection(0, 10, 2),  // vehicle, never classified
            detection(60, 60, 1), // light with an empty crop
        ]);
        let detections = detect(&img, None, &detector, &config()).unwrap().unwrap();
        let objects: Vec<RoadObject> = refine(detections, Some(&WidthClassifier))
            .into_iter()
            .collect();
        assert_eq!(
            objects,
            vec![
                RoadObject::Sign {
                    bbox: BoundingBox::new(0, 0, 10, 10),
                    class_id: 40
                },
                RoadObject::TrafficLight {
                    bbox: BoundingBox::new(10, 0, 30, 10),
                    class_id: 1
                },
                RoadObject::Sign {
                    bbox: BoundingBox::new(30, 0, 35, 10),
                    class_id: 0
                },
                RoadObject::Vehicle {
                    bbox: BoundingBox::new(0, 0, 10, 10),
                    class_id: 2
                },
                RoadObject::TrafficLight {
                    bbox: BoundingBox::new(60, 0, 60, 10),
                    class_id: 1
                },
            ]
        );
    }

    #[test]
    fn without_classifier_drafts_are_final() {
        let img = RgbImage::new(64, 48);
        let detector = FixedDetector(vec![detection(0, 10, 0), detection(0, 10, 2)]);
        let detections = detect(&img, None, &detector, &config()).unwrap().unwrap();
        let objects = refine(detections, None);
        assert_eq!(objects.len(), 2);
        assert_eq!(objects.as_slice()[0].class_id(), 0);
        assert_eq!(objects.as_slice()[1].class_id(), 2);
    }
}
