//! Application Configuration
//!
//! User settings and preferences stored in TOML format.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model artifact settings
    pub models: ModelSettings,
    /// HTTP API settings
    pub server: ServerSettings,
    /// Visual demo settings
    pub demo: DemoSettings,
}

/// Model artifact settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Path to the plate detector ONNX weight. This artifact is custom and is
    /// never downloaded; startup fails if it is missing.
    pub detector_path: PathBuf,
    /// Detector confidence threshold (part of the detector backend, not the pipeline)
    pub det_conf_threshold: f32,
    /// Detector NMS IoU threshold
    pub det_iou_threshold: f32,
    /// Path to the OCR text-detection model, or empty to use the managed copy
    pub ocr_det_path: Option<PathBuf>,
    /// Path to the OCR text-recognition model, or empty to use the managed copy
    pub ocr_rec_path: Option<PathBuf>,
    /// Path to the OCR character dictionary, or empty to use the managed copy
    pub ocr_dict_path: Option<PathBuf>,
    /// Download missing OCR artifacts on startup
    pub auto_download: bool,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            detector_path: PathBuf::from("models/plate-detector.onnx"),
            det_conf_threshold: 0.25,
            det_iou_threshold: 0.45,
            ocr_det_path: None,
            ocr_rec_path: None,
            ocr_dict_path: None,
            auto_download: true,
        }
    }
}

/// HTTP API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Bind address
    pub bind_address: String,
    /// Listen port
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Visual demo settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoSettings {
    /// Directory holding the frame sequence (numbered image files)
    pub frames_dir: PathBuf,
    /// Run the pipeline on every Nth frame
    pub detection_interval: u32,
    /// Delay between displayed frames in milliseconds
    pub frame_delay_ms: u64,
    /// Directory where session logs are written
    pub output_dir: PathBuf,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            frames_dir: PathBuf::from("frames"),
            detection_interval: 10,
            frame_delay_ms: 33,
            output_dir: PathBuf::from("output"),
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_app_config() {
        let config = AppConfig::default();

        // Check model defaults
        assert_eq!(
            config.models.detector_path,
            PathBuf::from("models/plate-detector.onnx")
        );
        assert!((config.models.det_conf_threshold - 0.25).abs() < 0.001);
        assert!((config.models.det_iou_threshold - 0.45).abs() < 0.001);
        assert!(config.models.ocr_det_path.is_none());
        assert!(config.models.auto_download);

        // Check server defaults
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.server.port, 8000);

        // Check demo defaults
        assert_eq!(config.demo.detection_interval, 10);
        assert_eq!(config.demo.frame_delay_ms, 33);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = AppConfig::default();

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.models.detector_path, config.models.detector_path);
        assert_eq!(parsed.server.port, config.server.port);
        assert_eq!(parsed.demo.detection_interval, config.demo.detection_interval);
        assert_eq!(parsed.demo.frames_dir, config.demo.frames_dir);
    }

    #[test]
    fn test_config_with_custom_values() {
        let mut config = AppConfig::default();
        config.models.detector_path = PathBuf::from("/opt/models/best.onnx");
        config.models.ocr_dict_path = Some(PathBuf::from("/opt/models/en_dict.txt"));
        config.server.port = 9090;
        config.demo.detection_interval = 5;

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.models.detector_path, PathBuf::from("/opt/models/best.onnx"));
        assert_eq!(
            parsed.models.ocr_dict_path,
            Some(PathBuf::from("/opt/models/en_dict.txt"))
        );
        assert_eq!(parsed.server.port, 9090);
        assert_eq!(parsed.demo.detection_interval, 5);
    }

    #[test]
    fn test_save_and_load_config() {
        let config = AppConfig::default();
        let temp_file = NamedTempFile::new().unwrap();

        save_config(&config, temp_file.path()).unwrap();
        let loaded = load_config(temp_file.path()).unwrap();

        assert_eq!(loaded.server.port, config.server.port);
        assert_eq!(loaded.models.auto_download, config.models.auto_download);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        let result = load_config(temp_file.path());
        assert!(result.is_err());
    }
}
