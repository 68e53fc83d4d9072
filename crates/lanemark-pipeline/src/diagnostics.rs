//! Run diagnostics: per-task timing and outcome for one processed image.
//!
//! Every call to
//! [`Annotator::process_with_diagnostics`](crate::Annotator::process_with_diagnostics)
//! collects these alongside the annotation container. Task entries are
//! recorded in completion order, which is the order the orchestrator
//! observed, not the order tasks were submitted.
//!
//! Timestamps are captured via the `web-time` crate. Durations are
//! serialized as fractional seconds (`f64`) for JSON compatibility, since
//! `std::time::Duration` does not implement serde traits.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// The five units of work scheduled for one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    Direction,
    Speed,
    Detect,
    Segment,
    /// Depends on [`Task::Segment`].
    Path,
}

impl Task {
    /// All tasks in submission order.
    pub const ALL: [Self; 5] = [
        Self::Direction,
        Self::Speed,
        Self::Detect,
        Self::Segment,
        Self::Path,
    ];
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direction => f.write_str("direction"),
            Self::Speed => f.write_str("speed"),
            Self::Detect => f.write_str("detect"),
            Self::Segment => f.write_str("segment"),
            Self::Path => f.write_str("path"),
        }
    }
}

/// How a task ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    /// The slot holds a value.
    Produced,
    /// The task ran but found nothing confident to report.
    Absent,
    /// The task's error was converted into absence.
    Failed(String),
    /// The task was not run (missing collaborator or no input).
    Skipped,
}

/// Diagnostics for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDiagnostics {
    pub task: Task,
    /// Wall-clock duration of the task body (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    pub outcome: StageOutcome,
    /// Number of items produced, for tasks that produce collections.
    pub items: Option<usize>,
}

impl TaskDiagnostics {
    /// Entry for a task that was never run.
    #[must_use]
    pub const fn skipped(task: Task) -> Self {
        Self {
            task,
            duration: Duration::ZERO,
            outcome: StageOutcome::Skipped,
            items: None,
        }
    }
}

/// Diagnostics collected from a single annotator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDiagnostics {
    /// Source image width in pixels.
    pub image_width: u32,
    /// Source image height in pixels.
    pub image_height: u32,
    /// Executed tasks in completion order, then skipped tasks in
    /// submission order.
    pub tasks: Vec<TaskDiagnostics>,
    /// Total wall-clock duration of the run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
}

impl RunDiagnostics {
    /// Entry for `task`, if one was recorded.
    #[must_use]
    pub fn task(&self, task: Task) -> Option<&TaskDiagnostics> {
        self.tasks.iter().find(|t| t.task == task)
    }

    /// Tasks that actually ran, in the order they completed.
    #[must_use]
    pub fn completion_order(&self) -> Vec<Task> {
        self.tasks
            .iter()
            .filter(|t| t.outcome != StageOutcome::Skipped)
            .map(|t| t.task)
            .collect()
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Annotation Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!("Image: {}x{}", self.image_width, self.image_height));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<12} {:>10} {:>10}  {}",
            "Task", "Duration", "% Total", "Outcome"
        ));
        lines.push("-".repeat(60));

        let total_ms = duration_ms(self.total_duration);
        for entry in &self.tasks {
            let ms = duration_ms(entry.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let outcome = format_outcome(entry);
            lines.push(format!(
                "{:<12} {ms:>8.3}ms {pct:>9.1}%  {outcome}",
                entry.task.to_string(),
            ));
        }

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn format_outcome(entry: &TaskDiagnostics) -> String {
    match (&entry.outcome, entry.items) {
        (StageOutcome::Produced, Some(n)) => format!("produced ({n} items)"),
        (StageOutcome::Produced, None) => "produced".to_owned(),
        (StageOutcome::Absent, _) => "absent".to_owned(),
        (StageOutcome::Failed(reason), _) => format!("failed: {reason}"),
        (StageOutcome::Skipped, _) => "skipped".to_owned(),
    }
}
