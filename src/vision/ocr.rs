//! OCR engine
//!
//! Combines text detection and recognition into the recognizer the pipeline
//! consumes: find text regions inside a plate crop, recognize each region,
//! emit one fragment per region in reading order.

use image::DynamicImage;
use std::path::Path;
use tracing::info;

use super::preprocess::recognition_batch;
use super::text_det::TextRegionDetector;
use super::text_rec::TextLineRecognizer;
use super::{TextFragment, TextRecognizer, VisionError};

/// PaddleOCR-style engine: DBNet detection plus CRNN recognition.
pub struct OcrEngine {
    detector: TextRegionDetector,
    recognizer: TextLineRecognizer,
}

impl OcrEngine {
    pub fn new(det_path: &Path, rec_path: &Path, dict_path: &Path) -> Result<Self, VisionError> {
        let detector = TextRegionDetector::new(det_path)?;
        let recognizer = TextLineRecognizer::new(rec_path, dict_path)?;

        info!("OCR engine initialized");
        Ok(Self {
            detector,
            recognizer,
        })
    }
}

impl TextRecognizer for OcrEngine {
    fn read_text(&mut self, crop: &DynamicImage) -> Result<Vec<TextFragment>, VisionError> {
        let regions = self.detector.find_regions(crop)?;
        if regions.is_empty() {
            return Ok(Vec::new());
        }

        let lines: Vec<DynamicImage> = regions.iter().map(|r| r.crop_from(crop)).collect();
        let batch = recognition_batch(&lines);
        let decoded = self.recognizer.recognize_batch(batch)?;

        Ok(decoded
            .into_iter()
            .map(|line| TextFragment {
                text: line.text,
                confidence: line.confidence,
            })
            .collect())
    }
}
