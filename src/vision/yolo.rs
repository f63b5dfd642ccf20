//! Plate detector backend
//!
//! Runs a YOLO-family ONNX model and decodes its `[1, 4+nc, anchors]`
//! output. Confidence filtering and non-maximum suppression are part of the
//! model's own postprocessing contract; the pipeline above applies no
//! thresholds of its own.

use image::DynamicImage;
use ndarray::ArrayViewD;
use ort::session::Session;
use ort::value::Value;
use std::path::Path;
use tracing::debug;

use super::preprocess::{letterbox, LetterboxTransform};
use super::{models, PlateDetector, RawDetection, VisionError};

const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_CONF_THRESHOLD: f32 = 0.25;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

/// YOLO plate detector over an ONNX session
pub struct YoloDetector {
    session: Session,
    input_name: String,
    input_width: u32,
    input_height: u32,
    conf_threshold: f32,
    iou_threshold: f32,
}

impl YoloDetector {
    /// Load the detector from its weight file. The artifact is required;
    /// a missing or unloadable file is fatal.
    pub fn load(model_path: &Path) -> Result<Self, VisionError> {
        if !model_path.exists() {
            return Err(VisionError::ModelLoad(format!(
                "plate detector model not found: {}",
                model_path.display()
            )));
        }

        let session = models::build_session(model_path)?;

        let input_name = session
            .inputs()
            .first()
            .map(|input| input.name().to_string())
            .unwrap_or_else(|| "images".to_string());

        // Static input dims when the model declares them, 640x640 otherwise
        let (input_height, input_width) = session
            .inputs()
            .first()
            .and_then(|input| input.dtype().tensor_shape())
            .map(|shape| shape.iter().map(|&d| d).collect::<Vec<i64>>())
            .filter(|dims| dims.len() == 4 && dims[2] > 0 && dims[3] > 0)
            .map(|dims| (dims[2] as u32, dims[3] as u32))
            .unwrap_or((DEFAULT_INPUT_SIZE, DEFAULT_INPUT_SIZE));

        debug!(
            "Plate detector loaded: input '{}' {}x{}",
            input_name, input_width, input_height
        );

        Ok(Self {
            session,
            input_name,
            input_width,
            input_height,
            conf_threshold: DEFAULT_CONF_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        })
    }

    /// Override the model's confidence and NMS thresholds
    pub fn with_thresholds(mut self, conf: f32, iou: f32) -> Self {
        self.conf_threshold = conf.clamp(0.0, 1.0);
        self.iou_threshold = iou.clamp(0.0, 1.0);
        self
    }
}

impl PlateDetector for YoloDetector {
    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<RawDetection>, VisionError> {
        let (input, transform) = letterbox(image, self.input_width, self.input_height);

        let input_value =
            Value::from_array(input).map_err(|e| VisionError::Inference(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![&self.input_name => input_value])
            .map_err(|e| VisionError::Inference(format!("plate detection failed: {}", e)))?;

        let output = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| VisionError::Inference(e.to_string()))?
            .to_owned();
        drop(outputs);

        let candidates = decode_predictions(&output.view(), self.conf_threshold, &transform)?;
        let detections = non_max_suppression(candidates, self.iou_threshold);

        debug!("Plate detector: {} boxes", detections.len());
        Ok(detections)
    }
}

/// Decode raw model output into candidate boxes in source-image pixel
/// coordinates. Handles both `[1, features, anchors]` and
/// `[1, anchors, features]` layouts; anchors always outnumber features.
fn decode_predictions(
    output: &ArrayViewD<f32>,
    conf_threshold: f32,
    transform: &LetterboxTransform,
) -> Result<Vec<RawDetection>, VisionError> {
    let shape = output.shape();
    if shape.len() != 3 {
        return Err(VisionError::Inference(format!(
            "unexpected detector output shape: {:?}",
            shape
        )));
    }

    let (features, anchors, features_first) = if shape[1] <= shape[2] {
        (shape[1], shape[2], true)
    } else {
        (shape[2], shape[1], false)
    };

    if features < 5 {
        return Err(VisionError::Inference(format!(
            "detector output has {} features, expected at least 5",
            features
        )));
    }

    let mut candidates = Vec::new();

    for a in 0..anchors {
        let at = |f: usize| {
            if features_first {
                output[[0, f, a]]
            } else {
                output[[0, a, f]]
            }
        };

        // Best class score; plate models are single-class but the decode
        // stays generic
        let mut confidence = f32::NEG_INFINITY;
        for f in 4..features {
            confidence = confidence.max(at(f));
        }
        if !confidence.is_finite() || confidence < conf_threshold {
            continue;
        }

        let (cx, cy, w, h) = (at(0), at(1), at(2), at(3));
        if !cx.is_finite() || !cy.is_finite() || w <= 0.0 || h <= 0.0 {
            continue;
        }

        candidates.push(RawDetection {
            x_min: transform.unmap_x(cx - w / 2.0),
            y_min: transform.unmap_y(cy - h / 2.0),
            x_max: transform.unmap_x(cx + w / 2.0),
            y_max: transform.unmap_y(cy + h / 2.0),
            confidence,
        });
    }

    Ok(candidates)
}

/// Greedy non-maximum suppression, highest confidence first.
fn non_max_suppression(mut candidates: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    candidates.sort_unstable_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<RawDetection> = Vec::with_capacity(candidates.len().min(32));
    'candidates: for detection in candidates {
        for existing in &kept {
            if iou(existing, &detection) > iou_threshold {
                continue 'candidates;
            }
        }
        kept.push(detection);
    }

    kept
}

fn iou(a: &RawDetection, b: &RawDetection) -> f32 {
    let inter_w = (a.x_max.min(b.x_max) - a.x_min.max(b.x_min)).max(0.0);
    let inter_h = (a.y_max.min(b.y_max) - a.y_min.max(b.y_min)).max(0.0);
    let inter = inter_w * inter_h;

    let area_a = (a.x_max - a.x_min).max(0.0) * (a.y_max - a.y_min).max(0.0);
    let area_b = (b.x_max - b.x_min).max(0.0) * (b.y_max - b.y_min).max(0.0);
    let union = area_a + area_b - inter;

    if union <= f32::EPSILON {
        return 0.0;
    }
    inter / union
}
