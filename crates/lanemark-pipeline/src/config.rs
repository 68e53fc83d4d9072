//! Annotator configuration.
//!
//! One immutable [`AnnotatorConfig`] is threaded through the orchestrator
//! and every stage. All sections deserialize with defaults for missing
//! fields, so a partial JSON object is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::types::PipelineError;

/// Top-level configuration for an [`Annotator`](crate::Annotator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotatorConfig {
    /// Size of the worker pool running the extraction stages.
    pub worker_threads: usize,
    pub direction: DirectionConfig,
    pub speed: SpeedConfig,
    pub detection: DetectionConfig,
    pub segmentation: SegmentationConfig,
    pub paths: PathConfig,
    pub preprocessing: PreprocessConfig,
}

impl AnnotatorConfig {
    /// Four workers: one per independent stage.
    pub const DEFAULT_WORKER_THREADS: usize = 4;

    /// Check every section for values the stages cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first offending
    /// field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.worker_threads == 0 {
            return Err(invalid("worker_threads must be at least 1"));
        }
        self.direction.validate()?;
        self.speed.validate()?;
        self.paths.validate()?;
        self.preprocessing.validate()
    }
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            worker_threads: Self::DEFAULT_WORKER_THREADS,
            direction: DirectionConfig::default(),
            speed: SpeedConfig::default(),
            detection: DetectionConfig::default(),
            segmentation: SegmentationConfig::default(),
            paths: PathConfig::default(),
            preprocessing: PreprocessConfig::default(),
        }
    }
}

/// Pixel margins removed from each side of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Margins {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

impl Margins {
    #[must_use]
    pub const fn new(top: u32, bottom: u32, left: u32, right: u32) -> Self {
        Self {
            top,
            bottom,
            left,
            right,
        }
    }
}

/// Navigation-overlay direction stage.
///
/// The overlay marks the planned route in red; the stage measures how far
/// the route leans from the centre of the cropped overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionConfig {
    /// Region of the frame holding the navigation overlay.
    pub crop: Margins,
    /// Red channel must exceed this (and dominate green and blue).
    pub red_threshold: u8,
    /// Red regions smaller than this are ignored.
    pub contour_min_area: f64,
    /// Columns excluded on each side of the on-lane pillar.
    pub center_pillar_crop: u32,
    /// Bias magnitude (percent) that signals a turn.
    pub turn_bias: i64,
    /// Bias magnitude (percent) below which the route is straight.
    pub straight_bias: i64,
    /// Fraction of the pillar that must be red to count as on-lane.
    pub on_lane_ratio: f64,
}

impl DirectionConfig {
    pub const DEFAULT_CROP: Margins = Margins::new(28, 900, 810, 810);
    pub const DEFAULT_RED_THRESHOLD: u8 = 150;
    pub const DEFAULT_CONTOUR_MIN_AREA: f64 = 50.0;
    pub const DEFAULT_CENTER_PILLAR_CROP: u32 = 140;
    pub const DEFAULT_TURN_BIAS: i64 = 40;
    pub const DEFAULT_STRAIGHT_BIAS: i64 = 5;
    pub const DEFAULT_ON_LANE_RATIO: f64 = 0.5;

    fn validate(&self) -> Result<(), PipelineError> {
        if self.contour_min_area.is_nan() || self.contour_min_area < 0.0 {
            return Err(invalid("direction.contour_min_area must be non-negative"));
        }
        if !(0.0..=1.0).contains(&self.on_lane_ratio) {
            return Err(invalid("direction.on_lane_ratio must be in [0, 1]"));
        }
        if self.straight_bias < 0 || self.turn_bias < self.straight_bias {
            return Err(invalid(
                "direction biases must satisfy 0 <= straight_bias <= turn_bias",
            ));
        }
        Ok(())
    }
}

impl Default for DirectionConfig {
    fn default() -> Self {
        Self {
            crop: Self::DEFAULT_CROP,
            red_threshold: Self::DEFAULT_RED_THRESHOLD,
            contour_min_area: Self::DEFAULT_CONTOUR_MIN_AREA,
            center_pillar_crop: Self::DEFAULT_CENTER_PILLAR_CROP,
            turn_bias: Self::DEFAULT_TURN_BIAS,
            straight_bias: Self::DEFAULT_STRAIGHT_BIAS,
            on_lane_ratio: Self::DEFAULT_ON_LANE_RATIO,
        }
    }
}

/// Speedometer reading stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedConfig {
    /// Region of the frame holding the speedometer digits.
    pub crop: Margins,
    /// Gaussian sigma of the unsharp mask.
    pub sharpen_sigma: f32,
    /// Unsharp mask strength.
    pub sharpen_amount: f32,
    /// Pixels brighter than this become white, all others black.
    pub binary_threshold: u8,
}

impl SpeedConfig {
    pub const DEFAULT_CROP: Margins = Margins::new(990, 40, 900, 900);
    pub const DEFAULT_SHARPEN_SIGMA: f32 = 2.0;
    pub const DEFAULT_SHARPEN_AMOUNT: f32 = 1.0;
    pub const DEFAULT_BINARY_THRESHOLD: u8 = 200;

    fn validate(&self) -> Result<(), PipelineError> {
        validate_sharpen("speed", self.sharpen_sigma, self.sharpen_amount)
    }
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            crop: Self::DEFAULT_CROP,
            sharpen_sigma: Self::DEFAULT_SHARPEN_SIGMA,
            sharpen_amount: Self::DEFAULT_SHARPEN_AMOUNT,
            binary_threshold: Self::DEFAULT_BINARY_THRESHOLD,
        }
    }
}

/// Object detection stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Rows removed from the top of the frame (sky, dashboard overlay).
    pub crop_top: u32,
}

impl DetectionConfig {
    pub const DEFAULT_CROP_TOP: u32 = 160;
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            crop_top: Self::DEFAULT_CROP_TOP,
        }
    }
}

/// Road segmentation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Rows removed from the top of the frame before segmentation.
    pub crop_top: u32,
}

impl SegmentationConfig {
    pub const DEFAULT_CROP_TOP: u32 = 160;
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            crop_top: Self::DEFAULT_CROP_TOP,
        }
    }
}

/// Path sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Paths are sampled from `height / height_reduction_factor` down to
    /// the bottom edge; the far field above is discarded.
    pub height_reduction_factor: u32,
}

impl PathConfig {
    pub const DEFAULT_HEIGHT_REDUCTION_FACTOR: u32 = 2;

    fn validate(self) -> Result<(), PipelineError> {
        if self.height_reduction_factor == 0 {
            return Err(invalid("paths.height_reduction_factor must be at least 1"));
        }
        Ok(())
    }
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            height_reduction_factor: Self::DEFAULT_HEIGHT_REDUCTION_FACTOR,
        }
    }
}

/// Standard preprocessor: adaptive gamma followed by an unsharp mask.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Gamma applied to the darkest pixels; bright pixels get gamma 1.
    pub gamma_max: f32,
    pub sharpen_sigma: f32,
    pub sharpen_amount: f32,
}

impl PreprocessConfig {
    pub const DEFAULT_GAMMA_MAX: f32 = 1.8;
    pub const DEFAULT_SHARPEN_SIGMA: f32 = 2.0;
    pub const DEFAULT_SHARPEN_AMOUNT: f32 = 0.5;

    fn validate(self) -> Result<(), PipelineError> {
        if !self.gamma_max.is_finite() || self.gamma_max < 1.0 {
            return Err(invalid("preprocessing.gamma_max must be at least 1"));
        }
        validate_sharpen("preprocessing", self.sharpen_sigma, self.sharpen_amount)
    }
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            gamma_max: Self::DEFAULT_GAMMA_MAX,
            sharpen_sigma: Self::DEFAULT_SHARPEN_SIGMA,
            sharpen_amount: Self::DEFAULT_SHARPEN_AMOUNT,
        }
    }
}

fn validate_sharpen(section: &str, sigma: f32, amount: f32) -> Result<(), PipelineError> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(invalid(&format!("{section}.sharpen_sigma must be positive")));
    }
    if !amount.is_finite() || amount < 0.0 {
        return Err(invalid(&format!(
            "{section}.sharpen_amount must be non-negative"
        )));
    }
    Ok(())
}

fn invalid(message: &str) -> PipelineError {
    PipelineError::InvalidConfig(message.to_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(AnnotatorConfig::default().validate().is_ok());
    }

    #[test]
    fn defaults_match_constants() {
        let config = AnnotatorConfig::default();
        assert_eq!(config.worker_threads, 4);
        assert_eq!(config.direction.red_threshold, 150);
        assert_eq!(config.direction.turn_bias, 40);
        assert_eq!(config.speed.binary_threshold, 200);
        assert_eq!(config.detection.crop_top, 160);
        assert_eq!(config.segmentation.crop_top, 160);
        assert_eq!(config.paths.height_reduction_factor, 2);
    }

    #[test]
    fn zero_workers_rejected() {
        let config = AnnotatorConfig {
            worker_threads: 0,
            ..AnnotatorConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("worker_threads"), "{err}");
    }

    #[test]
    fn zero_height_reduction_factor_rejected() {
        let mut config = AnnotatorConfig::default();
        config.paths.height_reduction_factor = 0;
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn non_positive_sigmas_rejected() {
        for sigma in [0.0, -1.0, f32::NAN] {
            let mut config = AnnotatorConfig::default();
            config.speed.sharpen_sigma = sigma;
            assert!(config.validate().is_err(), "speed sigma {sigma}");

            let mut config = AnnotatorConfig::default();
            config.preprocessing.sharpen_sigma = sigma;
            assert!(config.validate().is_err(), "preprocessing sigma {sigma}");
        }
    }

    #[test]
    fn gamma_below_one_rejected() {
        let mut config = AnnotatorConfig::default();
        config.preprocessing.gamma_max = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_direction_biases_rejected() {
        let mut config = AnnotatorConfig::default();
        config.direction.turn_bias = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: AnnotatorConfig =
            serde_json::from_str(r#"{"worker_threads": 2, "paths": {}}"#).unwrap();
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.paths, PathConfig::default());
        assert_eq!(config.direction, DirectionConfig::default());
    }

    #[test]
    fn json_round_trip() {
        let mut config = AnnotatorConfig::default();
        config.direction.crop = Margins::new(1, 2, 3, 4);
        let json = serde_json::to_string(&config).unwrap();
        let back: AnnotatorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
