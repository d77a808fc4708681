//! Application Configuration
//!
//! User settings stored in TOML format: backend endpoint, OCR engine
//! selection, region preprocessing, and the bounding-box layout used by
//! the capture session.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Inventory backend settings
    pub backend: BackendConfig,
    /// OCR engine settings
    pub ocr: OcrConfig,
    /// Capture session settings
    pub capture: CaptureConfig,
}

/// Inventory backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the inventory API
    pub base_url: String,
    /// Serve a local fixture dataset when read calls fail
    pub offline_fallback: bool,
    /// Operator name attached to submitted scans
    pub scanned_by: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            offline_fallback: true,
            scanned_by: None,
        }
    }
}

/// OCR engine selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrEngineKind {
    /// Server-side OCR via the backend's image-processing endpoint
    #[default]
    Remote,
    /// No recognition; fields are typed in by the operator
    Manual,
}

/// OCR engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Which recognition engine to use
    pub engine: OcrEngineKind,
    /// Per-region recognition timeout in seconds; a stalled call
    /// degrades to empty text instead of hanging the capture step
    pub timeout_secs: u64,
    /// Region preprocessing applied before recognition
    pub preprocess: PreprocessSettings,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            engine: OcrEngineKind::Remote,
            timeout_secs: 15,
            preprocess: PreprocessSettings::default(),
        }
    }
}

/// Preprocessing applied to cropped regions before OCR
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessSettings {
    /// Whether preprocessing is applied at all
    pub enabled: bool,
    /// Convert regions to grayscale
    pub grayscale: bool,
    /// Contrast factor (1.0 = unchanged)
    pub contrast: f32,
    /// Regions smaller than this in either dimension are upscaled;
    /// OCR engines need a minimum glyph height to be reliable
    pub min_dimension: u32,
}

impl Default for PreprocessSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            grayscale: true,
            contrast: 1.0,
            min_dimension: 80,
        }
    }
}

/// How bounding-box coordinates are expressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxUnits {
    /// Fixed display pixels
    #[default]
    Pixels,
    /// Fractions (0-1) of the display dimensions
    Fraction,
}

/// A named rectangle marking where a text field is expected on screen
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Region identifier
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Coordinate units for x/y/width/height
    #[serde(default)]
    pub units: BoxUnits,
}

/// One capture pass: the boxes read from a single frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Pass name, for logging
    pub name: String,
    /// Whether this pass may be skipped without acquiring a frame
    #[serde(default)]
    pub optional: bool,
    /// Boxes extracted from this pass's frame
    pub boxes: Vec<BoundingBox>,
}

/// Which box feeds which scan field. Source layouts disagree on this,
/// so it is explicit configuration rather than a positional convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMapping {
    /// Box id whose text becomes the part number
    pub part_number_box: String,
    /// Box id whose text becomes the VIN
    pub vin_box: String,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            part_number_box: "part_number".to_string(),
            vin_box: "vin".to_string(),
        }
    }
}

/// Capture session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// On-screen viewport width the boxes are laid out against
    pub display_width: u32,
    /// On-screen viewport height the boxes are laid out against
    pub display_height: u32,
    /// Capture passes run in order (single pass, or part-number then VIN)
    pub targets: Vec<TargetConfig>,
    /// Box-to-field assignment
    pub field_mapping: FieldMapping,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            display_width: 360,
            display_height: 640,
            targets: vec![TargetConfig {
                name: "label".to_string(),
                optional: false,
                boxes: vec![
                    BoundingBox {
                        id: "part_number".to_string(),
                        x: 200.0,
                        y: 200.0,
                        width: 100.0,
                        height: 40.0,
                        units: BoxUnits::Pixels,
                    },
                    BoundingBox {
                        id: "vin".to_string(),
                        x: 180.0,
                        y: 40.0,
                        width: 50.0,
                        height: 50.0,
                        units: BoxUnits::Pixels,
                    },
                ],
            }],
            field_mapping: FieldMapping::default(),
        }
    }
}

/// Default configuration directory for this tool
pub fn default_config_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "partscan", "partscan")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    let config_dir = proj_dirs.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
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

        assert_eq!(config.backend.base_url, "http://localhost:8000");
        assert!(config.backend.offline_fallback);
        assert!(config.backend.scanned_by.is_none());

        assert_eq!(config.ocr.engine, OcrEngineKind::Remote);
        assert_eq!(config.ocr.timeout_secs, 15);
        assert!(config.ocr.preprocess.enabled);

        // One pass, two boxes, fields mapped by name
        assert_eq!(config.capture.targets.len(), 1);
        let boxes = &config.capture.targets[0].boxes;
        assert_eq!(boxes.len(), 2);
        assert!(boxes.iter().any(|b| b.id == "part_number"));
        assert!(boxes.iter().any(|b| b.id == "vin"));
        assert_eq!(config.capture.field_mapping.part_number_box, "part_number");
        assert_eq!(config.capture.field_mapping.vin_box, "vin");
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = AppConfig::default();

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.backend.base_url, config.backend.base_url);
        assert_eq!(parsed.ocr.timeout_secs, config.ocr.timeout_secs);
        assert_eq!(parsed.capture.targets.len(), config.capture.targets.len());
        assert_eq!(
            parsed.capture.field_mapping.vin_box,
            config.capture.field_mapping.vin_box
        );
    }

    #[test]
    fn test_two_step_capture_config() {
        let mut config = AppConfig::default();
        config.capture.targets = vec![
            TargetConfig {
                name: "part-number".to_string(),
                optional: false,
                boxes: vec![BoundingBox {
                    id: "part_number".to_string(),
                    x: 0.25,
                    y: 0.4,
                    width: 0.5,
                    height: 0.1,
                    units: BoxUnits::Fraction,
                }],
            },
            TargetConfig {
                name: "vin".to_string(),
                optional: true,
                boxes: vec![BoundingBox {
                    id: "vin".to_string(),
                    x: 0.1,
                    y: 0.45,
                    width: 0.8,
                    height: 0.1,
                    units: BoxUnits::Fraction,
                }],
            },
        ];

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.capture.targets.len(), 2);
        assert!(!parsed.capture.targets[0].optional);
        assert!(parsed.capture.targets[1].optional);
        assert_eq!(parsed.capture.targets[1].boxes[0].units, BoxUnits::Fraction);
    }

    #[test]
    fn test_save_and_load_config() {
        let config = AppConfig::default();

        let temp_file = NamedTempFile::new().unwrap();
        save_config(&config, temp_file.path()).unwrap();
        let loaded = load_config(temp_file.path()).unwrap();

        assert_eq!(loaded.backend.base_url, config.backend.base_url);
        assert_eq!(loaded.capture.display_width, config.capture.display_width);
    }

    #[test]
    fn test_partial_config_fills_in_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [backend]
            base_url = "https://warehouse.example.ngrok.app"
            "#,
        )
        .unwrap();

        assert_eq!(config.backend.base_url, "https://warehouse.example.ngrok.app");
        assert!(config.backend.offline_fallback);
        assert_eq!(config.ocr.timeout_secs, 15);
        assert_eq!(config.capture.targets.len(), 1);
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
