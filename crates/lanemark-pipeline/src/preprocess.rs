//! Pixel-level enhancement applied before detection and segmentation.
//!
//! [`Preprocess`] is implemented for any `Fn(&RgbImage) -> RgbImage`, so a
//! closure can stand in for a full preprocessor. [`StandardPreprocessor`]
//! brightens dark pixels with a brightness-adaptive gamma curve and then
//! sharpens with an unsharp mask.

use image::RgbImage;

use crate::config::PreprocessConfig;
use crate::sharpen;

/// Deterministic image enhancement with no side effects.
pub trait Preprocess: Send + Sync {
    /// Return an enhanced copy of `image` with the same dimensions.
    fn preprocess(&self, image: &RgbImage) -> RgbImage;
}

impl<F> Preprocess for F
where
    F: Fn(&RgbImage) -> RgbImage + Send + Sync,
{
    fn preprocess(&self, image: &RgbImage) -> RgbImage {
        self(image)
    }
}

/// Adaptive gamma correction followed by an unsharp mask.
#[derive(Debug, Clone)]
pub struct StandardPreprocessor {
    config: PreprocessConfig,
    lut: [u8; 256],
}

impl StandardPreprocessor {
    #[must_use]
    pub fn new(config: PreprocessConfig) -> Self {
        Self {
            lut: gamma_lut(config.gamma_max),
            config,
        }
    }
}

impl Default for StandardPreprocessor {
    fn default() -> Self {
        Self::new(PreprocessConfig::default())
    }
}

impl Preprocess for StandardPreprocessor {
    fn preprocess(&self, image: &RgbImage) -> RgbImage {
        let mut corrected = image.clone();
        for pixel in corrected.pixels_mut() {
            for channel in &mut pixel.0 {
                *channel = self.lut[usize::from(*channel)];
            }
        }
        sharpen::unsharp_mask_rgb(
            &corrected,
            self.config.sharpen_sigma,
            self.config.sharpen_amount,
        )
    }
}

/// Lookup table for `255 · (i/255)^(1/γ(i))` with
/// `γ(i) = 1 + (gamma_max − 1)(1 − i/255)`.
///
/// Dark intensities get the strongest correction; white is a fixed point.
#[must_use]
// Float-to-u8 casts are clamped to the u8 range first.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn gamma_lut(gamma_max: f32) -> [u8; 256] {
    std::array::from_fn(|i| {
        let normalized = i as f32 / 255.0;
        let gamma = (gamma_max - 1.0).mul_add(1.0 - normalized, 1.0);
        let corrected = normalized.powf(gamma.recip()) * 255.0;
        corrected.clamp(0.0, 255.0) as u8
    })
}
