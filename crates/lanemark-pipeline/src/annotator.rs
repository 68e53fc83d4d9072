//! The annotation orchestrator.
//!
//! [`Annotator::process`] runs the four independent stages (direction,
//! speed, detect, segment) concurrently on a bounded worker pool and
//! consumes their completions in the order they finish. When
//! segmentation completes with at least one segment, a fifth task plans
//! paths from a shared handle to that result, so planning only ever
//! observes a finished segmentation. Once every spawned task has
//! reported, the slots are assigned into a fresh [`AnnotationContainer`].
//!
//! Each task body runs under `catch_unwind` and always reports exactly
//! once, so the join never waits on a task that died. A panic or a
//! value-contract violation aborts the image after all siblings finish;
//! every other stage error only empties that stage's slot.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::time::Duration;

use image::RgbImage;
use tracing::{debug, info, warn};
use web_time::Instant;

use crate::config::AnnotatorConfig;
use crate::diagnostics::{RunDiagnostics, StageOutcome, Task, TaskDiagnostics};
use crate::model::{Classifier, Detector, Segmenter, TextReader};
use crate::path::PathExtractor;
use crate::planner::PathPlanner;
use crate::preprocess::Preprocess;
use crate::types::{
    AnnotationContainer, Dimensions, Direction, PathsBox, PipelineError, RoadObjectsBox,
    RoadSegmentsBox, Speed, StageError,
};
use crate::{direction, objects, segments, speed};

/// Concurrent annotation pipeline with its collaborators and worker pool.
///
/// `process` takes `&self` and shares only read-only state, so one
/// annotator may serve several threads at once.
pub struct Annotator {
    config: AnnotatorConfig,
    pool: rayon::ThreadPool,
    extractor: PathExtractor,
    preprocessor: Option<Box<dyn Preprocess>>,
    detector: Option<Box<dyn Detector>>,
    classifier: Option<Box<dyn Classifier>>,
    segmenter: Option<Box<dyn Segmenter>>,
    text_reader: Option<Box<dyn TextReader>>,
}

impl std::fmt::Debug for Annotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Annotator")
            .field("config", &self.config)
            .field("preprocessor", &self.preprocessor.is_some())
            .field("detector", &self.detector.is_some())
            .field("classifier", &self.classifier.is_some())
            .field("segmenter", &self.segmenter.is_some())
            .field("text_reader", &self.text_reader.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Annotator`]. Every collaborator is optional; a stage
/// whose collaborator is missing is skipped.
pub struct AnnotatorBuilder {
    config: AnnotatorConfig,
    preprocessor: Option<Box<dyn Preprocess>>,
    detector: Option<Box<dyn Detector>>,
    classifier: Option<Box<dyn Classifier>>,
    segmenter: Option<Box<dyn Segmenter>>,
    text_reader: Option<Box<dyn TextReader>>,
}

impl AnnotatorBuilder {
    /// Enhancement applied to the detection and segmentation frames.
    #[must_use]
    pub fn preprocessor(mut self, preprocessor: impl Preprocess + 'static) -> Self {
        self.preprocessor = Some(Box::new(preprocessor));
        self
    }

    #[must_use]
    pub fn detector(mut self, detector: impl Detector + 'static) -> Self {
        self.detector = Some(Box::new(detector));
        self
    }

    /// Refines sign and traffic-light class ids after detection.
    #[must_use]
    pub fn classifier(mut self, classifier: impl Classifier + 'static) -> Self {
        self.classifier = Some(Box::new(classifier));
        self
    }

    #[must_use]
    pub fn segmenter(mut self, segmenter: impl Segmenter + 'static) -> Self {
        self.segmenter = Some(Box::new(segmenter));
        self
    }

    #[must_use]
    pub fn text_reader(mut self, text_reader: impl TextReader + 'static) -> Self {
        self.text_reader = Some(Box::new(text_reader));
        self
    }

    /// Validate the configuration and start the worker pool.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for an invalid
    /// configuration and [`PipelineError::WorkerPool`] if the pool cannot
    /// be created.
    pub fn build(self) -> Result<Annotator, PipelineError> {
        self.config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.worker_threads)
            .thread_name(|i| format!("lanemark-worker-{i}"))
            .build()
            .map_err(|e| PipelineError::WorkerPool(e.to_string()))?;

        Ok(Annotator {
            extractor: PathExtractor::new(self.config.paths.height_reduction_factor),
            config: self.config,
            pool,
            preprocessor: self.preprocessor,
            detector: self.detector,
            classifier: self.classifier,
            segmenter: self.segmenter,
            text_reader: self.text_reader,
        })
    }
}

/// What a finished task hands back to the orchestrator.
enum TaskOutput {
    Direction(Result<Option<Direction>, StageError>),
    Speed(Result<Option<Speed>, StageError>),
    Objects(Result<Option<RoadObjectsBox>, StageError>),
    Segments(Result<Option<RoadSegmentsBox>, StageError>),
    Paths(Option<PathsBox>),
}

struct Completion {
    task: Task,
    duration: Duration,
    output: std::thread::Result<TaskOutput>,
}

/// Slot values gathered on the orchestrator thread.
#[derive(Default)]
struct Slots {
    direction: Option<Direction>,
    speed: Option<Speed>,
    road_objects: Option<RoadObjectsBox>,
    road_segments: Option<Arc<RoadSegmentsBox>>,
    paths: Option<PathsBox>,
}

impl Annotator {
    /// Start building an annotator with `config`.
    #[must_use]
    pub fn builder(config: AnnotatorConfig) -> AnnotatorBuilder {
        AnnotatorBuilder {
            config,
            preprocessor: None,
            detector: None,
            classifier: None,
            segmenter: None,
            text_reader: None,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &AnnotatorConfig {
        &self.config
    }

    /// Annotate one image.
    ///
    /// # Errors
    ///
    /// See [`process_with_diagnostics`](Self::process_with_diagnostics).
    pub fn process(&self, image: RgbImage) -> Result<AnnotationContainer, PipelineError> {
        self.process_with_diagnostics(image)
            .map(|(container, _)| container)
    }

    /// Annotate one image and report per-task timing and outcomes.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyInput`] for a zero-sized image,
    /// [`PipelineError::StagePanicked`] if any task panicked,
    /// [`PipelineError::ContractViolation`] if a stage built an invalid
    /// bounded value, and [`PipelineError::WorkerPool`] if completions
    /// stop arriving. No partial container is returned.
    pub fn process_with_diagnostics(
        &self,
        image: RgbImage,
    ) -> Result<(AnnotationContainer, RunDiagnostics), PipelineError> {
        let started = Instant::now();
        let dimensions = Dimensions::of(&image);
        if dimensions.is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        let (slots, mut tasks) = self.run_tasks(&image, dimensions)?;

        for task in Task::ALL {
            if tasks.iter().all(|t| t.task != task) {
                tasks.push(TaskDiagnostics::skipped(task));
            }
        }

        let mut container = AnnotationContainer::new(image);
        container.direction = slots.direction;
        container.speed = slots.speed;
        container.road_objects = slots.road_objects;
        container.road_segments = slots
            .road_segments
            .map(|shared| Arc::try_unwrap(shared).unwrap_or_else(|shared| (*shared).clone()));
        container.paths = slots.paths;

        info!(
            width = dimensions.width,
            height = dimensions.height,
            direction = container.direction.is_some(),
            speed = container.speed.is_some(),
            road_objects = container.road_objects.as_ref().map(RoadObjectsBox::len),
            road_segments = container.road_segments.as_ref().map(RoadSegmentsBox::len),
            paths = container.paths.as_ref().map(PathsBox::len),
            "image annotated"
        );

        let diagnostics = RunDiagnostics {
            image_width: dimensions.width,
            image_height: dimensions.height,
            tasks,
            total_duration: started.elapsed(),
        };
        Ok((container, diagnostics))
    }

    /// Spawn the stages, join them, and settle their results.
    ///
    /// Returns executed tasks' diagnostics in completion order.
    fn run_tasks(
        &self,
        image: &RgbImage,
        dimensions: Dimensions,
    ) -> Result<(Slots, Vec<TaskDiagnostics>), PipelineError> {
        let (tx, rx) = mpsc::channel::<Completion>();
        let preprocessor = self.preprocessor.as_deref();
        let planner = PathPlanner::new(self.extractor);

        self.pool.in_place_scope(|scope| -> Result<_, PipelineError> {
            let mut pending = 0usize;

            spawn_task(scope, &tx, Task::Direction, move || {
                TaskOutput::Direction(direction::extract(image, &self.config.direction))
            });
            pending += 1;

            if let Some(reader) = self.text_reader.as_deref() {
                spawn_task(scope, &tx, Task::Speed, move || {
                    TaskOutput::Speed(speed::extract(image, reader, &self.config.speed))
                });
                pending += 1;
            }

            if let Some(detector) = self.detector.as_deref() {
                let classifier = self.classifier.as_deref();
                spawn_task(scope, &tx, Task::Detect, move || {
                    let detected =
                        objects::detect(image, preprocessor, detector, &self.config.detection);
                    TaskOutput::Objects(detected.map(|found| {
                        found.map(|detections| objects::refine(detections, classifier))
                    }))
                });
                pending += 1;
            }

            if let Some(segmenter) = self.segmenter.as_deref() {
                spawn_task(scope, &tx, Task::Segment, move || {
                    TaskOutput::Segments(segments::extract(
                        image,
                        preprocessor,
                        segmenter,
                        &self.config.segmentation,
                        &self.extractor,
                    ))
                });
                pending += 1;
            }

            let mut slots = Slots::default();
            let mut tasks = Vec::with_capacity(Task::ALL.len());
            let mut fatal: Option<PipelineError> = None;

            while pending > 0 {
                let completion = rx.recv().map_err(|_| {
                    PipelineError::WorkerPool("task completion channel disconnected".to_owned())
                })?;
                pending -= 1;
                debug!(task = %completion.task, duration = ?completion.duration, "task completed");

                let Completion {
                    task,
                    duration,
                    output,
                } = completion;
                let Ok(output) = output else {
                    warn!(%task, "task panicked");
                    fatal.get_or_insert(PipelineError::StagePanicked { task });
                    tasks.push(TaskDiagnostics {
                        task,
                        duration,
                        outcome: StageOutcome::Failed("panicked".to_owned()),
                        items: None,
                    });
                    continue;
                };

                let settled = match output {
                    TaskOutput::Direction(result) => {
                        settle(task, result, |_| None).map(|(value, outcome, items)| {
                            slots.direction = value;
                            (outcome, items)
                        })
                    }
                    TaskOutput::Speed(result) => {
                        settle(task, result, |_| None).map(|(value, outcome, items)| {
                            slots.speed = value;
                            (outcome, items)
                        })
                    }
                    TaskOutput::Objects(result) => {
                        settle(task, result, |objects| Some(objects.len())).map(
                            |(value, outcome, items)| {
                                slots.road_objects = value;
                                (outcome, items)
                            },
                        )
                    }
                    TaskOutput::Segments(result) => {
                        settle(task, result, |segments| Some(segments.len())).map(
                            |(value, outcome, items)| {
                                let shared = value.map(Arc::new);
                                if let Some(segments) = shared.as_ref().filter(|s| !s.is_empty()) {
                                    let segments = Arc::clone(segments);
                                    spawn_task(scope, &tx, Task::Path, move || {
                                        TaskOutput::Paths(planner.plan(
                                            &segments,
                                            dimensions.width,
                                            dimensions.height,
                                        ))
                                    });
                                    pending += 1;
                                }
                                slots.road_segments = shared;
                                (outcome, items)
                            },
                        )
                    }
                    TaskOutput::Paths(result) => {
                        settle(task, Ok(result), |paths| Some(paths.len())).map(
                            |(value, outcome, items)| {
                                slots.paths = value;
                                (outcome, items)
                            },
                        )
                    }
                };

                match settled {
                    Ok((outcome, items)) => tasks.push(TaskDiagnostics {
                        task,
                        duration,
                        outcome,
                        items,
                    }),
                    Err(err) => {
                        warn!(%task, %err, "task violated a value contract");
                        tasks.push(TaskDiagnostics {
                            task,
                            duration,
                            outcome: StageOutcome::Failed(err.to_string()),
                            items: None,
                        });
                        fatal.get_or_insert(err);
                    }
                }
            }

            match fatal {
                Some(err) => Err(err),
                None => Ok((slots, tasks)),
            }
        })
    }
}

/// Run `body` on the pool and report its output, or its panic, on `tx`.
fn spawn_task<'scope>(
    scope: &rayon::Scope<'scope>,
    tx: &Sender<Completion>,
    task: Task,
    body: impl FnOnce() -> TaskOutput + Send + 'scope,
) {
    let tx = tx.clone();
    scope.spawn(move |_| {
        let started = Instant::now();
        let output = panic::catch_unwind(AssertUnwindSafe(body));
        // The receiver outlives every task of the scope.
        let _ = tx.send(Completion {
            task,
            duration: started.elapsed(),
            output,
        });
    });
}

/// Convert a stage result into a slot value and its outcome.
///
/// Collaborator failures and unknown classes become absence; a bounds
/// error escapes as a contract violation.
fn settle<T>(
    task: Task,
    result: Result<Option<T>, StageError>,
    items: impl FnOnce(&T) -> Option<usize>,
) -> Result<(Option<T>, StageOutcome, Option<usize>), PipelineError> {
    match result {
        Ok(Some(value)) => {
            let count = items(&value);
            Ok((Some(value), StageOutcome::Produced, count))
        }
        Ok(None) => Ok((None, StageOutcome::Absent, None)),
        Err(StageError::OutOfBounds(source)) => Err(PipelineError::ContractViolation { task, source }),
        Err(err) => {
            warn!(%task, %err, "stage failed, slot left empty");
            Ok((None, StageOutcome::Failed(err.to_string()), None))
        }
    }
}
