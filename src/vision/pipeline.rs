//! Detection-to-text orchestration
//!
//! One `PlateReader` is built at process start and reused for every request;
//! both model backends are injected so orchestration stays independent of
//! how detection and recognition actually run.

use image::DynamicImage;

use super::{PlateBox, PlateDetector, TextRecognizer, VisionError};

/// One recognized plate: the clamped region it came from and its
/// normalized text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlateReading {
    pub region: PlateBox,
    pub text: String,
}

/// The pipeline: detect plate regions, crop each, read text, normalize.
pub struct PlateReader {
    detector: Box<dyn PlateDetector>,
    recognizer: Box<dyn TextRecognizer>,
}

impl PlateReader {
    pub fn new(detector: Box<dyn PlateDetector>, recognizer: Box<dyn TextRecognizer>) -> Self {
        Self {
            detector,
            recognizer,
        }
    }

    /// Run the full pipeline and keep the region of each reading.
    ///
    /// Regions are visited sequentially in detector output order, and that
    /// order is preserved in the result. A region whose recognizer returns
    /// no fragments at all is skipped entirely; a region whose fragments
    /// normalize to an empty string still yields an empty reading. Backend
    /// faults propagate unchanged.
    pub fn scan(&mut self, image: &DynamicImage) -> Result<Vec<PlateReading>, VisionError> {
        let (width, height) = (image.width(), image.height());
        let detections = self.detector.detect(image)?;

        let mut readings = Vec::with_capacity(detections.len());
        for detection in detections {
            let Some(region) = detection.clamp_to(width, height) else {
                continue;
            };

            let crop = region.crop_from(image);
            let fragments = self.recognizer.read_text(&crop)?;
            if fragments.is_empty() {
                // No recognizable text in the region at all, as opposed to
                // text that normalizes away.
                continue;
            }

            let joined: String = fragments.iter().map(|f| f.text.as_str()).collect();
            readings.push(PlateReading {
                region,
                text: normalize_plate(&joined),
            });
        }

        Ok(readings)
    }

    /// Run the full pipeline and return normalized plate strings only.
    pub fn read_plates(&mut self, image: &DynamicImage) -> Result<Vec<String>, VisionError> {
        Ok(self.scan(image)?.into_iter().map(|r| r.text).collect())
    }
}

/// Normalize recognized text into a plate string: uppercase, with every
/// character outside `[A-Za-z0-9]` removed. Never filters on length or
/// format; idempotent.
pub fn normalize_plate(text: &str) -> String {
    text.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}
