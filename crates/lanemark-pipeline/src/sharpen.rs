//! Unsharp masking: `(1 + amount)·src − amount·blur(src, sigma)`.
//!
//! The blur is [`imageproc::filter::gaussian_blur_f32`], which only
//! accepts `GrayImage`, so [`unsharp_mask_rgb`] splits the colour image
//! into three channels, sharpens each, and reassembles. Results saturate
//! to `0..=255`.

use image::{GrayImage, Luma, Rgb, RgbImage};

/// Sharpen a grayscale image.
///
/// Non-positive or non-finite `sigma`, or a non-positive `amount`, return the
/// image unchanged, since `imageproc` panics on `sigma <= 0.0`.
#[must_use = "returns the sharpened image"]
pub fn unsharp_mask(image: &GrayImage, sigma: f32, amount: f32) -> GrayImage {
    if !is_effective(sigma, amount) {
        return image.clone();
    }

    let blurred = imageproc::filter::gaussian_blur_f32(image, sigma);
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([weigh(
            image.get_pixel(x, y).0[0],
            blurred.get_pixel(x, y).0[0],
            amount,
        )])
    })
}

/// Sharpen each channel of an RGB image independently.
#[must_use = "returns the sharpened image"]
pub fn unsharp_mask_rgb(image: &RgbImage, sigma: f32, amount: f32) -> RgbImage {
    if !is_effective(sigma, amount) {
        return image.clone();
    }

    let (w, h) = (image.width(), image.height());

    let channels: [GrayImage; 3] = std::array::from_fn(|c| {
        GrayImage::from_fn(w, h, |x, y| Luma([image.get_pixel(x, y).0[c]]))
    });

    let blurred: [GrayImage; 3] =
        std::array::from_fn(|c| imageproc::filter::gaussian_blur_f32(&channels[c], sigma));

    RgbImage::from_fn(w, h, |x, y| {
        let src = image.get_pixel(x, y).0;
        Rgb(std::array::from_fn(|c| {
            weigh(src[c], blurred[c].get_pixel(x, y).0[0], amount)
        }))
    })
}

fn is_effective(sigma: f32, amount: f32) -> bool {
    sigma.is_finite() && sigma > 0.0 && amount > 0.0
}

/// Weighted sum of source and blurred intensity, rounded and saturated.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn weigh(src: u8, blurred: u8, amount: f32) -> u8 {
    let value = (1.0 + amount).mul_add(f32::from(src), -amount * f32::from(blurred));
    // Clamped to the u8 range before the cast.
    value.round().clamp(0.0, 255.0) as u8
}
