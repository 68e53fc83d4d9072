//! Contracts for the external inference collaborators.
//!
//! The pipeline never runs a model itself. Detection, classification,
//! segmentation and OCR engines plug in through these traits, so any
//! backend (ONNX runtime, remote service, recorded outputs) can drive
//! the annotator. Implementations must be shareable across the worker
//! pool.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::{BoundingBox, GrayImage, Point, RgbImage};

/// Failure reported by a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("model failure: {message}")]
pub struct ModelError {
    message: String,
}

impl ModelError {
    /// Create an error with a human-readable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// One detector output: a box and the predicted class id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub class_id: u32,
}

/// One segmentation output: a polygon outline and its class id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentPolygon {
    pub polygon: Vec<Point>,
    pub class_id: u32,
}

/// Object detector.
pub trait Detector: Send + Sync {
    /// Detect objects in `image`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if inference fails.
    fn predict(&self, image: &RgbImage) -> Result<Vec<Detection>, ModelError>;
}

/// Single-label classifier used to refine sign and traffic-light ids.
pub trait Classifier: Send + Sync {
    /// Most likely class of a cropped object, or `None` if the model
    /// produced no confident prediction.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if inference fails.
    fn predict(&self, crop: &RgbImage) -> Result<Option<u32>, ModelError>;
}

/// Road segmenter.
pub trait Segmenter: Send + Sync {
    /// Segment `image` into class-labelled polygons.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if inference fails.
    fn predict(&self, image: &RgbImage) -> Result<Vec<SegmentPolygon>, ModelError>;
}

/// Optical character reader used by the speed stage.
pub trait TextReader: Send + Sync {
    /// Read every text fragment in `image`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if the reader fails.
    fn read(&self, image: &GrayImage) -> Result<Vec<String>, ModelError>;
}

// Shared handles delegate, so one collaborator (e.g. a recorded-output
// store) can fill several roles.

impl<T: Detector + ?Sized> Detector for Arc<T> {
    fn predict(&self, image: &RgbImage) -> Result<Vec<Detection>, ModelError> {
        (**self).predict(image)
    }
}

impl<T: Classifier + ?Sized> Classifier for Arc<T> {
    fn predict(&self, crop: &RgbImage) -> Result<Option<u32>, ModelError> {
        (**self).predict(crop)
    }
}

impl<T: Segmenter + ?Sized> Segmenter for Arc<T> {
    fn predict(&self, image: &RgbImage) -> Result<Vec<SegmentPolygon>, ModelError> {
        (**self).predict(image)
    }
}

impl<T: TextReader + ?Sized> TextReader for Arc<T> {
    fn read(&self, image: &GrayImage) -> Result<Vec<String>, ModelError> {
        (**self).read(image)
    }
}
