//! OCR text recognition
//!
//! CRNN recognition model with greedy CTC decoding against a character
//! dictionary. Index 0 is the CTC blank; dictionary lines map to indices
//! starting at 1.

use ndarray::{Array4, ArrayViewD};
use ort::session::Session;
use ort::value::Value;
use std::path::Path;
use tracing::info;

use super::{models, VisionError};

/// One decoded text line
#[derive(Debug, Clone)]
pub struct DecodedLine {
    pub text: String,
    pub confidence: f32,
}

/// Text line recognizer over an ONNX session
pub struct TextLineRecognizer {
    session: Session,
    input_name: String,
    charset: Vec<String>,
}

impl TextLineRecognizer {
    pub fn new(model_path: &Path, dict_path: &Path) -> Result<Self, VisionError> {
        if !model_path.exists() {
            return Err(VisionError::ModelLoad(format!(
                "OCR recognition model not found: {}",
                model_path.display()
            )));
        }

        let session = models::build_session(model_path)?;
        let input_name = session
            .inputs()
            .first()
            .map(|input| input.name().to_string())
            .unwrap_or_else(|| "x".to_string());

        let charset = load_charset(dict_path)?;
        info!("OCR recognition model loaded, {} characters", charset.len());

        Ok(Self {
            session,
            input_name,
            charset,
        })
    }

    /// Recognize a batch of prepared text lines; one decoded line per batch
    /// row, in row order.
    pub fn recognize_batch(&mut self, input: Array4<f32>) -> Result<Vec<DecodedLine>, VisionError> {
        let batch_size = input.shape()[0];
        if batch_size == 0 {
            return Ok(Vec::new());
        }

        let input_value =
            Value::from_array(input).map_err(|e| VisionError::Inference(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![&self.input_name => input_value])
            .map_err(|e| VisionError::Inference(format!("text recognition failed: {}", e)))?;

        let output = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| VisionError::Inference(e.to_string()))?
            .to_owned();
        drop(outputs);

        let shape = output.shape();
        if shape.len() != 3 {
            return Err(VisionError::Inference(format!(
                "unexpected recognition output shape: {:?}",
                shape
            )));
        }
        let (seq_len, num_classes) = (shape[1], shape[2]);

        let mut lines = Vec::with_capacity(batch_size);
        for b in 0..batch_size.min(shape[0]) {
            lines.push(decode_ctc(
                &output.view(),
                b,
                seq_len,
                num_classes,
                &self.charset,
            ));
        }

        Ok(lines)
    }
}

/// Greedy CTC decode of one batch row: best class per timestep, repeats
/// collapsed, blanks dropped.
fn decode_ctc(
    output: &ArrayViewD<f32>,
    batch_idx: usize,
    seq_len: usize,
    num_classes: usize,
    charset: &[String],
) -> DecodedLine {
    const BLANK_IDX: usize = 0;

    let mut text = String::new();
    let mut confidence_sum = 0.0f32;
    let mut char_count = 0u32;
    let mut last_idx: Option<usize> = None;

    for t in 0..seq_len {
        let mut max_prob = f32::NEG_INFINITY;
        let mut max_idx = 0usize;
        for c in 0..num_classes {
            let prob = output[[batch_idx, t, c]];
            if prob > max_prob {
                max_prob = prob;
                max_idx = c;
            }
        }

        if max_idx != BLANK_IDX && Some(max_idx) != last_idx {
            let char_idx = max_idx - 1;
            if char_idx < charset.len() {
                text.push_str(&charset[char_idx]);
                confidence_sum += max_prob;
                char_count += 1;
            }
        }
        last_idx = Some(max_idx);
    }

    let avg = if char_count > 0 {
        confidence_sum / char_count as f32
    } else {
        0.0
    };
    // Some exports emit logits rather than softmax probabilities
    let confidence = if avg < 0.0 {
        1.0 / (1.0 + (-avg).exp())
    } else {
        avg.min(1.0)
    };

    DecodedLine { text, confidence }
}

fn load_charset(path: &Path) -> Result<Vec<String>, VisionError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        VisionError::ModelLoad(format!(
            "failed to read character dictionary {}: {}",
            path.display(),
            e
        ))
    })?;

    let charset: Vec<String> = content.lines().map(|line| line.to_string()).collect();
    if charset.is_empty() {
        return Err(VisionError::ModelLoad(
            "character dictionary is empty".to_string(),
        ));
    }

    Ok(charset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use std::io::Write;

    fn charset() -> Vec<String> {
        ["a", "b", "1", "2"].iter().map(|s| s.to_string()).collect()
    }

    /// Build a [1, T, 5] output where each timestep picks one class with
    /// high probability (class 0 is blank, 1..=4 map to the charset).
    fn output_for(steps: &[usize]) -> Array3<f32> {
        let mut output = Array3::<f32>::from_elem((1, steps.len(), 5), 0.01);
        for (t, &class) in steps.iter().enumerate() {
            output[[0, t, class]] = 0.97;
        }
        output
    }

    #[test]
    fn test_ctc_decodes_plain_sequence() {
        let output = output_for(&[1, 2, 3, 4]);
        let decoded = decode_ctc(&output.view().into_dyn(), 0, 4, 5, &charset());
        assert_eq!(decoded.text, "ab12");
        assert!(decoded.confidence > 0.9);
    }

    #[test]
    fn test_ctc_collapses_repeats() {
        let output = output_for(&[1, 1, 1, 2]);
        let decoded = decode_ctc(&output.view().into_dyn(), 0, 4, 5, &charset());
        assert_eq!(decoded.text, "ab");
    }

    #[test]
    fn test_ctc_blank_separates_repeats() {
        let output = output_for(&[1, 0, 1]);
        let decoded = decode_ctc(&output.view().into_dyn(), 0, 3, 5, &charset());
        assert_eq!(decoded.text, "aa");
    }

    #[test]
    fn test_ctc_all_blank_decodes_empty() {
        let output = output_for(&[0, 0, 0]);
        let decoded = decode_ctc(&output.view().into_dyn(), 0, 3, 5, &charset());
        assert_eq!(decoded.text, "");
        assert_eq!(decoded.confidence, 0.0);
    }

    #[test]
    fn test_ctc_ignores_out_of_charset_index() {
        // Class index 5 would map past the 4-entry charset
        let mut output = Array3::<f32>::from_elem((1, 2, 6), 0.01);
        output[[0, 0, 5]] = 0.97;
        output[[0, 1, 1]] = 0.97;
        let decoded = decode_ctc(&output.view().into_dyn(), 0, 2, 6, &charset());
        assert_eq!(decoded.text, "a");
    }

    #[test]
    fn test_load_charset_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "a\nb\nc").unwrap();

        let charset = load_charset(file.path()).unwrap();
        assert_eq!(charset, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_load_charset_rejects_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let result = load_charset(file.path());
        assert!(matches!(result, Err(VisionError::ModelLoad(_))));
    }
}
