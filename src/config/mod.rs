//! Application Configuration
//!
//! User settings stored in TOML format.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::capture::FacingMode;

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Camera and region of interest settings
    pub capture: CaptureSettings,
    /// Binarization settings
    pub preprocess: PreprocessSettings,
    /// OCR engine settings
    pub ocr: OcrSettings,
    /// Rate service settings
    pub conversion: ConversionSettings,
}

/// Camera and region of interest settings.
///
/// The region is given as fractions of the frame size.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Preferred camera
    pub facing: FacingMode,
    /// Left edge of the region of interest
    pub roi_left: f64,
    /// Top edge of the region of interest
    pub roi_top: f64,
    /// Width of the region of interest
    pub roi_width: f64,
    /// Height of the region of interest
    pub roi_height: f64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            facing: FacingMode::Environment,
            roi_left: 0.2,
            roi_top: 0.3,
            roi_width: 0.6,
            roi_height: 0.4,
        }
    }
}

/// Settings for the grayscale/contrast/threshold pass
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessSettings {
    /// Contrast level fed into the contrast correction formula
    pub contrast: f32,
    /// Pixels brighter than this after contrast become white
    pub threshold: f32,
}

impl Default for PreprocessSettings {
    fn default() -> Self {
        Self {
            contrast: 1.5,
            threshold: 128.0,
        }
    }
}

/// OCR engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    /// Tesseract language pack
    pub language: String,
    /// Directory holding tessdata, None for the system default
    pub tessdata_path: Option<PathBuf>,
    /// Characters the engine may emit
    pub whitelist: String,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            tessdata_path: None,
            whitelist: crate::vision::ocr::DEFAULT_WHITELIST.to_string(),
        }
    }
}

/// Rate service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionSettings {
    /// Endpoint taking `amount`, `from` and `to` query parameters
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Source currency when the detected price has no symbol
    pub default_from: String,
    /// Target currency offered by default
    pub default_to: String,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.frankfurter.app/latest".to_string(),
            timeout_secs: 10,
            default_from: "USD".to_string(),
            default_to: "EUR".to_string(),
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

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "pricelens", "PriceLens")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    Ok(proj_dirs.config_dir().to_path_buf())
}

/// Load configuration from `path`, or from the default location, falling
/// back to defaults when nothing usable is found
pub fn load_or_default(path: Option<&Path>) -> AppConfig {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match get_config_dir() {
            Ok(dir) => dir.join("config.toml"),
            Err(e) => {
                warn!("No config directory: {}", e);
                return AppConfig::default();
            }
        },
    };

    if !path.exists() {
        info!("Using default configuration");
        return AppConfig::default();
    }

    match load_config(&path) {
        Ok(config) => {
            info!("Loaded configuration from {:?}", path);
            config
        }
        Err(e) => {
            warn!("Ignoring invalid configuration {:?}: {}", path, e);
            AppConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_app_config() {
        let config = AppConfig::default();

        assert_eq!(config.capture.facing, FacingMode::Environment);
        assert!((config.capture.roi_left - 0.2).abs() < 1e-9);
        assert!((config.capture.roi_top - 0.3).abs() < 1e-9);
        assert!((config.capture.roi_width - 0.6).abs() < 1e-9);
        assert!((config.capture.roi_height - 0.4).abs() < 1e-9);

        assert!((config.preprocess.contrast - 1.5).abs() < 0.001);
        assert!((config.preprocess.threshold - 128.0).abs() < 0.001);

        assert_eq!(config.ocr.language, "eng");
        assert_eq!(config.ocr.whitelist, "0123456789.,₱$€£¥");

        assert_eq!(config.conversion.timeout_secs, 10);
        assert_eq!(config.conversion.default_from, "USD");
        assert_eq!(config.conversion.default_to, "EUR");
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = AppConfig::default();
        config.capture.facing = FacingMode::User;
        config.conversion.default_to = "PHP".to_string();

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.capture.facing, FacingMode::User);
        assert_eq!(parsed.conversion.default_to, "PHP");
        assert_eq!(parsed.ocr.whitelist, config.ocr.whitelist);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: AppConfig = toml::from_str(
            r#"
            [conversion]
            default_to = "GBP"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.conversion.default_to, "GBP");
        assert_eq!(parsed.conversion.default_from, "USD");
        assert!((parsed.preprocess.contrast - 1.5).abs() < 0.001);
    }

    #[test]
    fn test_save_and_load_config() {
        let config = AppConfig::default();
        let temp_file = NamedTempFile::new().unwrap();

        save_config(&config, temp_file.path()).unwrap();
        let loaded = load_config(temp_file.path()).unwrap();

        assert_eq!(config.conversion.base_url, loaded.conversion.base_url);
        assert_eq!(config.ocr.language, loaded.ocr.language);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_or_default_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        let config = load_or_default(Some(temp_file.path()));
        assert_eq!(config.conversion.default_to, "EUR");
    }
}
