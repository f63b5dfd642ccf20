//! Tensor preparation for the ONNX backends
//!
//! The plate detector takes a letterboxed square RGB input scaled to 0..1;
//! the PaddleOCR models take BGR inputs normalized with mean/std 0.5.

use image::{imageops, DynamicImage, ImageBuffer, Rgb, RgbImage};
use ndarray::{Array3, Array4, Axis};

/// Longest side fed to the OCR detection model
pub const TEXT_DET_LIMIT_SIDE: u32 = 960;
/// Shortest side fed to the OCR detection model; also the stride the input
/// dimensions are rounded to
pub const TEXT_DET_MIN_SIDE: u32 = 32;

/// Fixed input height of the recognition model
pub const REC_INPUT_HEIGHT: u32 = 48;
/// Fixed input width the recognition model is padded to
pub const REC_INPUT_WIDTH: u32 = 320;

/// PaddleOCR normalization: (x/255 - 0.5) / 0.5
const OCR_MEAN: f32 = 0.5;
const OCR_STD: f32 = 0.5;

/// Letterbox padding gray, matching the detector's training setup
const LETTERBOX_FILL: f32 = 114.0 / 255.0;

/// Maps detector-input coordinates back to source-image coordinates.
#[derive(Debug, Clone, Copy)]
pub struct LetterboxTransform {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl LetterboxTransform {
    pub fn unmap_x(&self, x: f32) -> f32 {
        (x - self.pad_x) / self.scale
    }

    pub fn unmap_y(&self, y: f32) -> f32 {
        (y - self.pad_y) / self.scale
    }
}

/// Resize with preserved aspect ratio onto a gray canvas of the detector's
/// input size, as an NCHW tensor scaled to 0..1.
pub fn letterbox(image: &DynamicImage, target_w: u32, target_h: u32) -> (Array4<f32>, LetterboxTransform) {
    let rgb = image.to_rgb8();
    let (orig_w, orig_h) = (rgb.width().max(1), rgb.height().max(1));

    let scale = (target_w as f32 / orig_w as f32).min(target_h as f32 / orig_h as f32);
    let new_w = ((orig_w as f32 * scale).round() as u32).clamp(1, target_w);
    let new_h = ((orig_h as f32 * scale).round() as u32).clamp(1, target_h);

    let resized = imageops::resize(&rgb, new_w, new_h, imageops::FilterType::Triangle);

    let pad_x = (target_w - new_w) as f32 / 2.0;
    let pad_y = (target_h - new_h) as f32 / 2.0;
    let offset_x = pad_x.floor() as usize;
    let offset_y = pad_y.floor() as usize;

    let mut canvas =
        Array3::<f32>::from_elem((3, target_h as usize, target_w as usize), LETTERBOX_FILL);

    for (x, y, pixel) in resized.enumerate_pixels() {
        let (cx, cy) = (offset_x + x as usize, offset_y + y as usize);
        canvas[[0, cy, cx]] = pixel[0] as f32 / 255.0;
        canvas[[1, cy, cx]] = pixel[1] as f32 / 255.0;
        canvas[[2, cy, cx]] = pixel[2] as f32 / 255.0;
    }

    let transform = LetterboxTransform { scale, pad_x, pad_y };
    (canvas.insert_axis(Axis(0)), transform)
}

/// Prepare a crop for the OCR detection model.
///
/// The image is scaled so its longest side stays within the limit and its
/// shortest side is at least the stride, then rounded to a multiple of the
/// stride. Returns the tensor and the scaled dimensions.
pub fn text_detection_input(image: &DynamicImage) -> (Array4<f32>, u32, u32) {
    let rgb = image.to_rgb8();
    let (orig_w, orig_h) = (rgb.width().max(1), rgb.height().max(1));

    let ratio = detection_ratio(orig_w, orig_h);
    let new_w = round_to_stride((orig_w as f32 * ratio) as u32);
    let new_h = round_to_stride((orig_h as f32 * ratio) as u32);

    let resized = imageops::resize(&rgb, new_w, new_h, imageops::FilterType::Lanczos3);
    let tensor = normalize_ocr(&resized).insert_axis(Axis(0));

    (tensor, new_w, new_h)
}

fn detection_ratio(w: u32, h: u32) -> f32 {
    let max_side = w.max(h) as f32;
    let min_side = w.min(h) as f32;

    let mut ratio = 1.0f32;
    if max_side > TEXT_DET_LIMIT_SIDE as f32 {
        ratio = TEXT_DET_LIMIT_SIDE as f32 / max_side;
    }
    if min_side * ratio < TEXT_DET_MIN_SIDE as f32 {
        ratio = TEXT_DET_MIN_SIDE as f32 / min_side;
    }

    ratio
}

fn round_to_stride(side: u32) -> u32 {
    (side / TEXT_DET_MIN_SIDE * TEXT_DET_MIN_SIDE).max(TEXT_DET_MIN_SIDE)
}

/// Prepare a batch of text-line crops for the recognition model.
///
/// Each line is scaled to the fixed height, laid onto a gray canvas of the
/// fixed width, and stacked into one `[N, 3, H, W]` tensor.
pub fn recognition_batch(lines: &[DynamicImage]) -> Array4<f32> {
    let mut batch = Array4::<f32>::zeros((
        lines.len(),
        3,
        REC_INPUT_HEIGHT as usize,
        REC_INPUT_WIDTH as usize,
    ));

    for (i, line) in lines.iter().enumerate() {
        let tensor = recognition_input(line);
        batch.index_axis_mut(Axis(0), i).assign(&tensor);
    }

    batch
}

fn recognition_input(line: &DynamicImage) -> Array3<f32> {
    let rgb = line.to_rgb8();
    let (w, h) = (rgb.width().max(1), rgb.height().max(1));

    let ratio = REC_INPUT_HEIGHT as f32 / h as f32;
    let new_w = ((w as f32 * ratio) as u32).clamp(1, REC_INPUT_WIDTH);

    let resized = imageops::resize(&rgb, new_w, REC_INPUT_HEIGHT, imageops::FilterType::Lanczos3);

    let mut padded: RgbImage =
        ImageBuffer::from_pixel(REC_INPUT_WIDTH, REC_INPUT_HEIGHT, Rgb([127, 127, 127]));
    imageops::overlay(&mut padded, &resized, 0, 0);

    normalize_ocr(&padded)
}

/// NCHW tensor in BGR channel order with PaddleOCR mean/std normalization.
fn normalize_ocr(img: &RgbImage) -> Array3<f32> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let mut tensor = Array3::<f32>::zeros((3, h, w));

    for (x, y, pixel) in img.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        tensor[[0, y, x]] = (pixel[2] as f32 / 255.0 - OCR_MEAN) / OCR_STD; // B
        tensor[[1, y, x]] = (pixel[1] as f32 / 255.0 - OCR_MEAN) / OCR_STD; // G
        tensor[[2, y, x]] = (pixel[0] as f32 / 255.0 - OCR_MEAN) / OCR_STD; // R
    }

    tensor
}
