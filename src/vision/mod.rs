//! Vision pipeline
//!
//! Plate detection, text recognition, and the orchestration that turns an
//! image into a list of normalized plate strings. The two pretrained models
//! sit behind capability traits so backends can be swapped (or mocked in
//! tests) without touching the orchestration.

pub mod geometry;
pub mod models;
pub mod ocr;
pub mod pipeline;
pub mod preprocess;
pub mod text_det;
pub mod text_rec;
pub mod yolo;

pub use geometry::{PlateBox, RawDetection};
pub use pipeline::{normalize_plate, PlateReader, PlateReading};

use image::DynamicImage;
use thiserror::Error;

use crate::config::ModelSettings;
use models::{ModelFile, ModelStore};
use ocr::OcrEngine;
use yolo::YoloDetector;

/// Errors from model loading and inference
#[derive(Error, Debug)]
pub enum VisionError {
    #[error("model load failed: {0}")]
    ModelLoad(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One recognized text span inside a cropped plate region. A crop may yield
/// several fragments; they are concatenated downstream in the order the
/// engine returned them.
#[derive(Debug, Clone, PartialEq)]
pub struct TextFragment {
    /// Recognized text
    pub text: String,
    /// Recognition confidence (0.0 - 1.0)
    pub confidence: f32,
}

/// Finds plate regions in a full image.
///
/// Implementations run one model invocation per image and return boxes in
/// the model's native output order, unclamped.
pub trait PlateDetector: Send {
    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<RawDetection>, VisionError>;
}

/// Reads text fragments out of a cropped plate region.
///
/// An empty fragment list means the crop contained no recognizable text at
/// all; that is not an error.
pub trait TextRecognizer: Send {
    fn read_text(&mut self, crop: &DynamicImage) -> Result<Vec<TextFragment>, VisionError>;
}

/// Assemble the full pipeline from configured model artifacts.
///
/// The plate detector weight must already exist on disk; the generic OCR
/// artifacts are fetched into the managed model store when missing (unless
/// auto-download is disabled).
pub fn build_reader(settings: &ModelSettings) -> Result<PlateReader, VisionError> {
    let detector = YoloDetector::load(&settings.detector_path)?
        .with_thresholds(settings.det_conf_threshold, settings.det_iou_threshold);

    let store = ModelStore::open()?;
    let det_path = resolve_artifact(&settings.ocr_det_path, ModelFile::TextDetection, &store, settings.auto_download)?;
    let rec_path = resolve_artifact(&settings.ocr_rec_path, ModelFile::TextRecognition, &store, settings.auto_download)?;
    let dict_path = resolve_artifact(&settings.ocr_dict_path, ModelFile::Dictionary, &store, settings.auto_download)?;

    let recognizer = OcrEngine::new(&det_path, &rec_path, &dict_path)?;

    Ok(PlateReader::new(Box::new(detector), Box::new(recognizer)))
}

fn resolve_artifact(
    custom: &Option<std::path::PathBuf>,
    file: ModelFile,
    store: &ModelStore,
    auto_download: bool,
) -> Result<std::path::PathBuf, VisionError> {
    match custom {
        Some(path) if path.exists() => Ok(path.clone()),
        Some(path) => Err(VisionError::ModelLoad(format!(
            "{} not found at {}",
            file.display_name(),
            path.display()
        ))),
        None if auto_download => store.ensure(file),
        None if store.is_available(file) => Ok(store.path(file)),
        None => Err(VisionError::ModelLoad(format!(
            "{} is missing and auto-download is disabled",
            file.display_name()
        ))),
    }
}
