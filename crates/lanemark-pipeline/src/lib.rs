//! lanemark-pipeline: concurrent annotation of driving-scene images (sans-IO).
//!
//! Turns a single frame into direction, speed, road objects, road
//! segments and planned centerline paths:
//!
//! ```text
//!            ┌── direction ──────────────┐
//!            ├── speed (OCR) ────────────┤
//! image ─────┼── detect ─► refine ───────┼──► AnnotationContainer
//!            └── segment ─► plan paths ──┘
//! ```
//!
//! The four independent stages run concurrently on the [`Annotator`]'s
//! worker pool; path planning waits only on segmentation. Inference
//! engines are external collaborators behind the traits in [`model`],
//! and recorded outputs can stand in for them via [`replay`].
//!
//! This crate has **no I/O dependencies**: frames arrive decoded and
//! results are returned as structured data.

pub mod annotator;
pub mod cleanse;
pub mod config;
pub mod diagnostics;
pub mod direction;
pub mod frame;
pub mod geometry;
pub mod model;
pub mod objects;
pub mod path;
pub mod planner;
pub mod preprocess;
pub mod replay;
pub mod segments;
pub mod sharpen;
pub mod speed;
pub mod types;

pub use annotator::{Annotator, AnnotatorBuilder};
pub use config::AnnotatorConfig;
pub use diagnostics::{RunDiagnostics, StageOutcome, Task, TaskDiagnostics};
pub use geometry::Polynomial;
pub use model::{Classifier, Detection, Detector, ModelError, SegmentPolygon, Segmenter, TextReader};
pub use path::{Path, PathExtractor};
pub use planner::PathPlanner;
pub use preprocess::{Preprocess, StandardPreprocessor};
pub use replay::{RecordedClassification, RecordedOutputs};
pub use types::{
    AnnotationContainer, AnnotationSummary, BoundingBox, BoundsError, Dimensions, Direction,
    GrayImage, PathsBox, PipelineError, Point, RgbImage, RoadObject, RoadObjectsBox, RoadSegment,
    RoadSegmentsBox, Speed, StageError,
};
