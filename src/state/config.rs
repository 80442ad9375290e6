use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::{Error, Result};

/// Environment variable that overrides the backend base URL
pub const BACKEND_URL_ENV: &str = "PRODUCT_LENS_BACKEND_URL";

/// Client configuration.
///
/// The file lives in the user's config directory:
/// - Linux: ~/.config/product-lens/config.json
/// - macOS: ~/Library/Application Support/product-lens/config.json
/// - Windows: %APPDATA%\product-lens\config.json
///
/// Every field is optional in the file; missing ones take the defaults.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Base URL of the detection backend
    pub backend_url: String,
    /// Index of the camera opened in webcam mode
    pub camera_index: u32,
    /// Period of the continuous-mode capture timer
    pub capture_interval_ms: u64,
    /// Size of the image/video surface and its overlay canvas
    pub display_width: u32,
    pub display_height: u32,
    /// JPEG quality for webcam frames (1-100)
    pub jpeg_quality: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8000/".to_string(),
            camera_index: 0,
            capture_interval_ms: 500,
            display_width: 400,
            display_height: 300,
            jpeg_quality: 80,
        }
    }
}

impl Config {
    /// Load the configuration from the default location, then apply the
    /// environment override.
    pub fn load() -> Result<Self> {
        let mut config = match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };

        if let Ok(url) = std::env::var(BACKEND_URL_ENV) {
            config.backend_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    /// Get the path where the config file is expected
    pub fn default_path() -> Option<PathBuf> {
        let mut path = dirs::config_dir().or_else(dirs::home_dir)?;
        path.push("product-lens");
        path.push("config.json");
        Some(path)
    }

    /// Parse a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.capture_interval_ms == 0 {
            return Err(Error::Config("capture_interval_ms must be positive".to_string()));
        }
        if self.display_width == 0 || self.display_height == 0 {
            return Err(Error::Config("display size must be positive".to_string()));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(Error::Config("jpeg_quality must be within 1..=100".to_string()));
        }
        Endpoints::from_base(&self.backend_url)?;
        Ok(())
    }

    pub fn endpoints(&self) -> Result<Endpoints> {
        Endpoints::from_base(&self.backend_url)
    }
}

/// Backend URLs derived from the base URL
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoints {
    /// `POST /predict`
    pub predict: Url,
    /// `POST /add_to_database`
    pub add_to_database: Url,
    /// `ws(s)://…/ws/predict`
    pub stream: Url,
}

impl Endpoints {
    pub fn from_base(base: &str) -> Result<Self> {
        let mut base = Url::parse(base)?;

        // Url::join replaces the last segment unless the path ends with '/'
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let ws_scheme = match base.scheme() {
            "http" => "ws",
            "https" => "wss",
            other => {
                return Err(Error::Config(format!(
                    "unsupported backend scheme '{}'; expected http or https",
                    other
                )))
            }
        };

        let mut stream = base.join("ws/predict")?;
        stream
            .set_scheme(ws_scheme)
            .map_err(|_| Error::Config(format!("cannot use scheme {}", ws_scheme)))?;

        Ok(Self {
            predict: base.join("predict")?,
            add_to_database: base.join("add_to_database")?,
            stream,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoints() {
        let endpoints = Config::default().endpoints().unwrap();

        assert_eq!(endpoints.predict.as_str(), "http://localhost:8000/predict");
        assert_eq!(endpoints.add_to_database.as_str(), "http://localhost:8000/add_to_database");
        assert_eq!(endpoints.stream.as_str(), "ws://localhost:8000/ws/predict");
    }

    #[test]
    fn test_base_path_without_trailing_slash() {
        let endpoints = Endpoints::from_base("https://detect.example.com/api").unwrap();

        assert_eq!(endpoints.predict.as_str(), "https://detect.example.com/api/predict");
        assert_eq!(endpoints.stream.as_str(), "wss://detect.example.com/api/ws/predict");
    }

    #[test]
    fn test_rejects_unknown_scheme() {
        assert!(Endpoints::from_base("ftp://localhost/").is_err());
        assert!(Endpoints::from_base("not a url").is_err());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"backend_url":"http://10.0.0.5:9000/","camera_index":2}"#).unwrap();

        let config = Config::from_file(&path).unwrap();

        assert_eq!(config.backend_url, "http://10.0.0.5:9000/");
        assert_eq!(config.camera_index, 2);
        assert_eq!(config.capture_interval_ms, 500);
        assert_eq!((config.display_width, config.display_height), (400, 300));
    }

    #[test]
    fn test_invalid_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"capture_interval_ms":0}"#).unwrap();

        assert!(matches!(Config::from_file(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_file(Path::new("/nonexistent/config.json"));
        assert!(matches!(result, Err(Error::Io { .. })));
    }
}
