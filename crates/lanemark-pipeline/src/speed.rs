//! Speed stage: read the speedometer digits with an OCR collaborator.
//!
//! The digits are isolated by cropping, converting to grayscale,
//! sharpening and binarising before the image is handed to the
//! [`TextReader`]. Only an unambiguous reading (exactly one fragment that
//! parses as an integer speed) is reported.

use image::{GrayImage, Luma, RgbImage};
use tracing::debug;

use crate::config::SpeedConfig;
use crate::frame;
use crate::model::TextReader;
use crate::sharpen;
use crate::types::{Speed, StageError};

/// Run the speed stage on a source frame.
///
/// # Errors
///
/// Returns [`StageError::Model`] if the reader fails.
pub fn extract(
    image: &RgbImage,
    reader: &dyn TextReader,
    config: &SpeedConfig,
) -> Result<Option<Speed>, StageError> {
    let Some(digits) = isolate_digits(image, config) else {
        debug!("speed crop is empty");
        return Ok(None);
    };
    let fragments = reader.read(&digits)?;
    let speed = parse_reading(&fragments);
    debug!(?fragments, ?speed, "speed");
    Ok(speed)
}

/// Crop, grayscale, sharpen and binarise the speedometer region.
#[must_use]
pub fn isolate_digits(image: &RgbImage, config: &SpeedConfig) -> Option<GrayImage> {
    let crop = frame::crop_margins(image, config.crop)?;
    let gray = frame::to_gray(&crop);
    let sharpened = sharpen::unsharp_mask(&gray, config.sharpen_sigma, config.sharpen_amount);
    Some(threshold(&sharpened, config.binary_threshold))
}

/// Pixels above `level` become 255, the rest 0.
#[must_use]
pub fn threshold(image: &GrayImage, level: u8) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        if image.get_pixel(x, y).0[0] > level {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// A speed from OCR fragments: exactly one fragment, an integer in
/// `0..=100` after trimming whitespace.
#[must_use]
pub fn parse_reading(fragments: &[String]) -> Option<Speed> {
    let [only] = fragments else {
        return None;
    };
    let value: i64 = only.trim().parse().ok()?;
    Speed::try_from(value).ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::Margins;
    use crate::model::ModelError;

    struct FixedReader(Result<Vec<String>, ModelError>);

    impl TextReader for FixedReader {
        fn read(&self, _image: &GrayImage) -> Result<Vec<String>, ModelError> {
            self.0.clone()
        }
    }

    /// Reader that reports how many white pixels it was shown.
    struct CountingReader;

    impl TextReader for CountingReader {
        fn read(&self, image: &GrayImage) -> Result<Vec<String>, ModelError> {
            let white = image.pixels().filter(|p| p.0[0] == 255).count();
            Ok(vec![white.to_string()])
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    fn config() -> SpeedConfig {
        SpeedConfig {
            crop: Margins::new(2, 2, 2, 2),
            ..SpeedConfig::default()
        }
    }

    #[test]
    fn single_integer_fragment_is_a_speed() {
        assert_eq!(parse_reading(&strings(&["87"])), Speed::try_from(87).ok());
        assert_eq!(parse_reading(&strings(&[" 0 "])), Speed::try_from(0).ok());
        assert_eq!(parse_reading(&strings(&["100"])), Speed::try_from(100).ok());
    }

    #[test]
    fn ambiguous_or_invalid_readings_are_absent() {
        assert_eq!(parse_reading(&[]), None);
        assert_eq!(parse_reading(&strings(&["50", "60"])), None);
        assert_eq!(parse_reading(&strings(&["5O"])), None);
        assert_eq!(parse_reading(&strings(&["101"])), None);
        assert_eq!(parse_reading(&strings(&["-3"])), None);
    }

    #[test]
    fn threshold_is_strict() {
        let img = GrayImage::from_fn(3, 1, |x, _| Luma([[199, 200, 201][x as usize]]));
        let out = threshold(&img, 200);
        assert_eq!(out.as_raw(), &vec![0, 0, 255]);
    }

    #[test]
    fn reader_sees_binarised_crop() {
        // 12×12 frame, bright 4×4 block in the middle of the 8×8 crop.
        let img = RgbImage::from_fn(12, 12, |x, y| {
            if (4..8).contains(&x) && (4..8).contains(&y) {
                image::Rgb([255, 255, 255])
            } else {
                image::Rgb([20, 20, 20])
            }
        });
        let cfg = SpeedConfig {
            sharpen_amount: 0.0,
            ..config()
        };
        let digits = isolate_digits(&img, &cfg).unwrap();
        assert_eq!(digits.dimensions(), (8, 8));
        assert!(digits.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
        assert_eq!(extract(&img, &CountingReader, &cfg).unwrap(), Speed::try_from(16).ok());
    }

    #[test]
    fn reader_failure_is_a_stage_error() {
        let img = RgbImage::new(12, 12);
        let reader = FixedReader(Err(ModelError::new("ocr offline")));
        assert!(matches!(
            extract(&img, &reader, &config()),
            Err(StageError::Model(_))
        ));
    }

    #[test]
    fn empty_crop_is_absent_without_reading() {
        let img = RgbImage::new(3, 3);
        let reader = FixedReader(Ok(strings(&["42"])));
        assert_eq!(extract(&img, &reader, &config()).unwrap(), None);
    }
}
