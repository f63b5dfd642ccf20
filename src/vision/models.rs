//! Model artifact management
//!
//! Session construction for ONNX Runtime and a small store that downloads
//! and caches the generic OCR artifacts. The plate detector weight is a
//! custom artifact and is never downloaded.

use futures_util::StreamExt;
use ort::session::{builder::GraphOptimizationLevel, Session};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;
use tracing::{debug, info};

use super::VisionError;

const INTRA_THREADS: usize = 4;

/// Build an inference session for a model file.
///
/// With the `cuda` feature the CUDA execution provider is tried first and
/// CPU is used as a transparent fallback; without it the session runs on
/// CPU directly.
pub fn build_session(model_path: &Path) -> Result<Session, VisionError> {
    info!("Loading ONNX model from {}", model_path.display());

    #[cfg(feature = "cuda")]
    {
        use ort::execution_providers::CUDAExecutionProvider;

        let cuda_result = Session::builder()
            .and_then(|b| b.with_execution_providers([CUDAExecutionProvider::default().build()]))
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(INTRA_THREADS))
            .and_then(|b| b.commit_from_file(model_path));

        match cuda_result {
            Ok(session) => {
                info!("CUDA execution provider enabled");
                return Ok(session);
            }
            Err(e) => {
                tracing::warn!("CUDA unavailable, falling back to CPU: {}", e);
            }
        }
    }

    let session = Session::builder()
        .map_err(|e| VisionError::ModelLoad(e.to_string()))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| VisionError::ModelLoad(e.to_string()))?
        .with_intra_threads(INTRA_THREADS)
        .map_err(|e| VisionError::ModelLoad(e.to_string()))?
        .commit_from_file(model_path)
        .map_err(|e| {
            VisionError::ModelLoad(format!(
                "failed to load model from {}: {}",
                model_path.display(),
                e
            ))
        })?;

    Ok(session)
}

/// Generic OCR artifacts managed by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFile {
    /// Text detection model (DBNet)
    TextDetection,
    /// Text recognition model (CRNN)
    TextRecognition,
    /// Character dictionary for recognition
    Dictionary,
}

impl ModelFile {
    /// Filename inside the model store
    pub fn filename(&self) -> &'static str {
        match self {
            ModelFile::TextDetection => "det.onnx",
            ModelFile::TextRecognition => "rec.onnx",
            ModelFile::Dictionary => "dict.txt",
        }
    }

    /// Download URL (PaddleOCR ONNX exports on Hugging Face)
    pub fn download_url(&self) -> &'static str {
        match self {
            ModelFile::TextDetection => {
                "https://huggingface.co/monkt/paddleocr-onnx/resolve/main/detection/v3/det.onnx"
            }
            ModelFile::TextRecognition => {
                "https://huggingface.co/monkt/paddleocr-onnx/resolve/main/languages/english/rec.onnx"
            }
            ModelFile::Dictionary => {
                "https://huggingface.co/monkt/paddleocr-onnx/resolve/main/languages/english/dict.txt"
            }
        }
    }

    /// Plausible file size range, used as a corruption sanity check
    pub fn expected_size_range(&self) -> (u64, u64) {
        match self {
            ModelFile::TextDetection => (2_000_000, 5_000_000), // ~2.4 MB
            ModelFile::TextRecognition => (7_000_000, 16_000_000), // ~7.8 MB
            ModelFile::Dictionary => (100, 10_000),             // ~1.4 KB
        }
    }

    /// Display name for log messages
    pub fn display_name(&self) -> &'static str {
        match self {
            ModelFile::TextDetection => "OCR text detection model",
            ModelFile::TextRecognition => "OCR text recognition model",
            ModelFile::Dictionary => "OCR character dictionary",
        }
    }
}

/// Download cache for the generic OCR artifacts
pub struct ModelStore {
    models_dir: PathBuf,
}

impl ModelStore {
    /// Open the store under the platform data directory
    pub fn open() -> Result<Self, VisionError> {
        let data_dir = crate::storage::get_data_dir()
            .map_err(|e| VisionError::ModelLoad(e.to_string()))?;
        Self::with_dir(data_dir.join("models"))
    }

    /// Open a store rooted at a custom directory
    pub fn with_dir(models_dir: PathBuf) -> Result<Self, VisionError> {
        std::fs::create_dir_all(&models_dir)?;
        Ok(Self { models_dir })
    }

    /// Path of an artifact inside the store
    pub fn path(&self, file: ModelFile) -> PathBuf {
        self.models_dir.join(file.filename())
    }

    /// Whether an artifact exists with a plausible size
    pub fn is_available(&self, file: ModelFile) -> bool {
        let path = self.path(file);
        match std::fs::metadata(&path) {
            Ok(metadata) => {
                let (min, max) = file.expected_size_range();
                let size = metadata.len();
                size >= min && size <= max
            }
            Err(_) => false,
        }
    }

    /// Return the artifact path, downloading it first when missing
    pub fn ensure(&self, file: ModelFile) -> Result<PathBuf, VisionError> {
        let path = self.path(file);

        if self.is_available(file) {
            debug!("{} already available at {}", file.display_name(), path.display());
            return Ok(path);
        }

        if std::env::var("PLATE_SCOUT_OFFLINE").is_ok() {
            return Err(VisionError::ModelLoad(format!(
                "offline mode: {} missing; download it from {} and place it at {}",
                file.display_name(),
                file.download_url(),
                path.display()
            )));
        }

        info!("Downloading {} from {}", file.display_name(), file.download_url());

        let rt = Runtime::new().map_err(|e| VisionError::ModelLoad(e.to_string()))?;
        rt.block_on(self.fetch(file, &path))?;

        if !self.is_available(file) {
            return Err(VisionError::ModelLoad(format!(
                "download of {} completed but the file failed the size sanity check",
                file.display_name()
            )));
        }

        info!("Downloaded {}", file.display_name());
        Ok(path)
    }

    /// Streaming download to a temp file, then rename into place
    async fn fetch(&self, file: ModelFile, path: &Path) -> Result<(), VisionError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| VisionError::ModelLoad(e.to_string()))?;

        let response = client
            .get(file.download_url())
            .send()
            .await
            .map_err(|e| VisionError::ModelLoad(format!("download request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(VisionError::ModelLoad(format!(
                "download of {} failed with status {}",
                file.display_name(),
                response.status()
            )));
        }

        let temp_path = path.with_extension("tmp");
        let mut out = std::fs::File::create(&temp_path)?;

        let mut hasher = Sha256::new();
        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| VisionError::ModelLoad(format!("download stream error: {}", e)))?;
            out.write_all(&chunk)?;
            hasher.update(&chunk);
            downloaded += chunk.len() as u64;
        }

        out.flush()?;
        drop(out);

        debug!(
            "{}: {} bytes, sha256 {:x}",
            file.display_name(),
            downloaded,
            hasher.finalize()
        );

        std::fs::rename(&temp_path, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_file_filenames() {
        assert_eq!(ModelFile::TextDetection.filename(), "det.onnx");
        assert_eq!(ModelFile::TextRecognition.filename(), "rec.onnx");
        assert_eq!(ModelFile::Dictionary.filename(), "dict.txt");
    }

    #[test]
    fn test_store_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::with_dir(dir.path().to_path_buf()).unwrap();

        assert_eq!(store.path(ModelFile::Dictionary), dir.path().join("dict.txt"));
        assert!(!store.is_available(ModelFile::TextDetection));
    }

    #[test]
    fn test_availability_rejects_implausible_size() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::with_dir(dir.path().to_path_buf()).unwrap();

        // A truncated download is not "available"
        std::fs::write(store.path(ModelFile::TextDetection), b"stub").unwrap();
        assert!(!store.is_available(ModelFile::TextDetection));

        // The dictionary range is small enough to fake
        std::fs::write(store.path(ModelFile::Dictionary), vec![b'a'; 1_400]).unwrap();
        assert!(store.is_available(ModelFile::Dictionary));
    }
}
