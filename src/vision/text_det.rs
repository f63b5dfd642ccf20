//! OCR text detection
//!
//! DBNet-style detection of text regions inside a plate crop. The model
//! emits a per-pixel probability map; regions are recovered by binarizing
//! and growing connected components.

use image::DynamicImage;
use ndarray::ArrayViewD;
use ort::session::Session;
use ort::value::Value;
use std::path::Path;
use tracing::{debug, info};

use super::preprocess::text_detection_input;
use super::{models, VisionError};

/// Binarization threshold on the probability map
const BINARY_THRESH: f32 = 0.3;
/// Minimum mean probability for a region to survive
const REGION_SCORE_THRESH: f32 = 0.5;
/// Minimum region side in probability-map pixels
const MIN_REGION_SIDE: f32 = 3.0;
/// Region expansion factor; recovers the text the shrunken map cuts off
const UNCLIP_RATIO: f32 = 1.5;
/// Crop padding around a detected region
const CROP_PAD_RATIO: f32 = 0.04;

/// A text region inside a crop, in crop pixel coordinates.
#[derive(Debug, Clone, Copy)]
pub struct TextRegion {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
    pub score: f32,
}

impl TextRegion {
    /// Cut this region out of its source crop with a small pad, clamped to
    /// the crop bounds.
    pub fn crop_from(&self, image: &DynamicImage) -> DynamicImage {
        let width = (self.x_max - self.x_min).max(1.0);
        let height = (self.y_max - self.y_min).max(1.0);
        let pad_x = (width * CROP_PAD_RATIO).round();
        let pad_y = (height * CROP_PAD_RATIO).round();

        let img_w = image.width() as f32;
        let img_h = image.height() as f32;

        let x0 = (self.x_min - pad_x).max(0.0);
        let y0 = (self.y_min - pad_y).max(0.0);
        let x1 = (self.x_max + pad_x).min(img_w);
        let y1 = (self.y_max + pad_y).min(img_h);

        let crop_w = ((x1 - x0).max(1.0)) as u32;
        let crop_h = ((y1 - y0).max(1.0)) as u32;

        image.crop_imm(x0 as u32, y0 as u32, crop_w, crop_h)
    }
}

/// Text region detector over an ONNX session
pub struct TextRegionDetector {
    session: Session,
    input_name: String,
}

impl TextRegionDetector {
    pub fn new(model_path: &Path) -> Result<Self, VisionError> {
        if !model_path.exists() {
            return Err(VisionError::ModelLoad(format!(
                "OCR detection model not found: {}",
                model_path.display()
            )));
        }

        let session = models::build_session(model_path)?;
        let input_name = session
            .inputs()
            .first()
            .map(|input| input.name().to_string())
            .unwrap_or_else(|| "x".to_string());

        info!("OCR detection model loaded");
        Ok(Self {
            session,
            input_name,
        })
    }

    /// Find text regions inside a crop, in reading order (top to bottom,
    /// left to right).
    pub fn find_regions(&mut self, image: &DynamicImage) -> Result<Vec<TextRegion>, VisionError> {
        let (orig_w, orig_h) = (image.width(), image.height());
        let (input, scaled_w, scaled_h) = text_detection_input(image);

        let input_value =
            Value::from_array(input).map_err(|e| VisionError::Inference(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![&self.input_name => input_value])
            .map_err(|e| VisionError::Inference(format!("text detection failed: {}", e)))?;

        let output = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| VisionError::Inference(e.to_string()))?
            .to_owned();
        drop(outputs);

        let regions = extract_regions(&output.view(), scaled_w, scaled_h, orig_w, orig_h)?;
        debug!("Text detector: {} regions", regions.len());
        Ok(regions)
    }
}

/// Recover text regions from the probability map and rescale them to the
/// original crop size.
fn extract_regions(
    prob_map: &ArrayViewD<f32>,
    input_w: u32,
    input_h: u32,
    orig_w: u32,
    orig_h: u32,
) -> Result<Vec<TextRegion>, VisionError> {
    let shape = prob_map.shape();
    let (height, width) = match shape.len() {
        4 => (shape[2], shape[3]),
        3 => (shape[1], shape[2]),
        _ => {
            return Err(VisionError::Inference(format!(
                "unexpected text detection output shape: {:?}",
                shape
            )))
        }
    };

    let prob_at = |x: usize, y: usize| {
        if shape.len() == 4 {
            prob_map[[0, 0, y, x]]
        } else {
            prob_map[[0, y, x]]
        }
    };

    // The map usually matches the model input; rescale defensively anyway,
    // then once more out to the original crop.
    let map_to_input_x = input_w as f32 / width as f32;
    let map_to_input_y = input_h as f32 / height as f32;
    let input_to_orig_x = orig_w as f32 / input_w as f32;
    let input_to_orig_y = orig_h as f32 / input_h as f32;

    let mut visited = vec![false; width * height];
    let mut regions = Vec::new();

    for start_y in 0..height {
        for start_x in 0..width {
            if visited[start_y * width + start_x] || prob_at(start_x, start_y) <= BINARY_THRESH {
                continue;
            }

            // Grow the connected component with a 4-neighborhood
            let mut min_x = start_x;
            let mut max_x = start_x;
            let mut min_y = start_y;
            let mut max_y = start_y;
            let mut score_sum = 0.0f32;
            let mut count = 0usize;

            let mut stack = vec![(start_x, start_y)];
            visited[start_y * width + start_x] = true;

            while let Some((x, y)) = stack.pop() {
                min_x = min_x.min(x);
                max_x = max_x.max(x);
                min_y = min_y.min(y);
                max_y = max_y.max(y);
                score_sum += prob_at(x, y);
                count += 1;

                let mut push = |nx: usize, ny: usize, stack: &mut Vec<(usize, usize)>| {
                    if !visited[ny * width + nx] && prob_at(nx, ny) > BINARY_THRESH {
                        visited[ny * width + nx] = true;
                        stack.push((nx, ny));
                    }
                };

                if x > 0 {
                    push(x - 1, y, &mut stack);
                }
                if x + 1 < width {
                    push(x + 1, y, &mut stack);
                }
                if y > 0 {
                    push(x, y - 1, &mut stack);
                }
                if y + 1 < height {
                    push(x, y + 1, &mut stack);
                }
            }

            let region_w = (max_x - min_x) as f32;
            let region_h = (max_y - min_y) as f32;
            if region_w < MIN_REGION_SIDE || region_h < MIN_REGION_SIDE {
                continue;
            }

            let score = score_sum / count as f32;
            if score < REGION_SCORE_THRESH {
                continue;
            }

            let expand_x = region_w * (UNCLIP_RATIO - 1.0) / 2.0;
            let expand_y = region_h * (UNCLIP_RATIO - 1.0) / 2.0;
            let x0 = (min_x as f32 - expand_x).max(0.0);
            let y0 = (min_y as f32 - expand_y).max(0.0);
            let x1 = (max_x as f32 + expand_x).min(width as f32 - 1.0);
            let y1 = (max_y as f32 + expand_y).min(height as f32 - 1.0);

            regions.push(TextRegion {
                x_min: x0 * map_to_input_x * input_to_orig_x,
                y_min: y0 * map_to_input_y * input_to_orig_y,
                x_max: x1 * map_to_input_x * input_to_orig_x,
                y_max: y1 * map_to_input_y * input_to_orig_y,
                score,
            });
        }
    }

    // Reading order: top to bottom, then left to right
    regions.sort_by(|a, b| {
        a.y_min
            .partial_cmp(&b.y_min)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                a.x_min
                    .partial_cmp(&b.x_min)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
    });

    Ok(regions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    fn map_with_blob(
        width: usize,
        height: usize,
        x0: usize,
        y0: usize,
        x1: usize,
        y1: usize,
    ) -> Array4<f32> {
        let mut map = Array4::<f32>::zeros((1, 1, height, width));
        for y in y0..=y1 {
            for x in x0..=x1 {
                map[[0, 0, y, x]] = 0.9;
            }
        }
        map
    }

    #[test]
    fn test_blank_map_yields_no_regions() {
        let map = Array4::<f32>::zeros((1, 1, 32, 64));
        let regions = extract_regions(&map.view().into_dyn(), 64, 32, 64, 32).unwrap();
        assert!(regions.is_empty());
    }

    #[test]
    fn test_single_blob_becomes_one_region() {
        let map = map_with_blob(64, 32, 10, 8, 40, 20);
        let regions = extract_regions(&map.view().into_dyn(), 64, 32, 64, 32).unwrap();

        assert_eq!(regions.len(), 1);
        let r = &regions[0];
        // Expansion grows past the raw component but clamps to the map
        assert!(r.x_min <= 10.0 && r.x_max >= 40.0);
        assert!(r.y_min <= 8.0 && r.y_max >= 20.0);
        assert!(r.score > REGION_SCORE_THRESH);
    }

    #[test]
    fn test_two_blobs_sorted_in_reading_order() {
        let mut map = map_with_blob(96, 64, 50, 40, 80, 52);
        for y in 6..=18 {
            for x in 8..=38 {
                map[[0, 0, y, x]] = 0.9;
            }
        }
        let regions = extract_regions(&map.view().into_dyn(), 96, 64, 96, 64).unwrap();

        assert_eq!(regions.len(), 2);
        assert!(regions[0].y_min < regions[1].y_min);
    }

    #[test]
    fn test_tiny_speck_is_discarded() {
        let map = map_with_blob(64, 32, 5, 5, 6, 6);
        let regions = extract_regions(&map.view().into_dyn(), 64, 32, 64, 32).unwrap();
        assert!(regions.is_empty());
    }

    #[test]
    fn test_regions_rescaled_to_original() {
        // Map is 64x32 but the original crop was 128x64
        let map = map_with_blob(64, 32, 10, 8, 40, 20);
        let regions = extract_regions(&map.view().into_dyn(), 64, 32, 128, 64).unwrap();

        assert_eq!(regions.len(), 1);
        assert!(regions[0].x_max > 80.0, "region must scale up with the crop");
    }

    #[test]
    fn test_region_crop_stays_in_bounds() {
        let image = DynamicImage::new_rgb8(100, 40);
        let region = TextRegion {
            x_min: 90.0,
            y_min: 30.0,
            x_max: 120.0,
            y_max: 60.0,
            score: 0.8,
        };
        let crop = region.crop_from(&image);
        assert!(crop.width() >= 1);
        assert!(crop.height() >= 1);
        assert!(crop.width() <= 100);
        assert!(crop.height() <= 40);
    }
}
