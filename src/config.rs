//! Configuration management for Redraft Server

use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub upload: UploadConfig,
    pub ocr: OcrConfig,
    pub layout: LayoutConfig,
    pub editor: EditorConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding the built client bundle
    pub public_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Where uploaded PDFs are spooled while a request is processed
    pub temp_dir: PathBuf,
    pub max_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
    pub provider: OcrBackend,
    pub language: String,
    pub timeout_secs: u64,
    pub tesseract_path: String,
    pub ollama_url: String,
    pub ollama_model: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrBackend {
    Tesseract,
    Ollama,
    None,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LayoutConfig {
    /// Fit envelope for reconstructed pages
    pub viewport_width: f32,
    pub viewport_height: f32,
    pub image_resolve_attempts: u32,
    pub image_resolve_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EditorConfig {
    pub page_height_budget: f32,
    pub debounce_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    pub timeout_secs: u64,
    pub retry_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                public_dir: PathBuf::from("public"),
            },
            upload: UploadConfig {
                temp_dir: env::temp_dir().join("redraft-uploads"),
                max_bytes: 10 * 1024 * 1024,
            },
            ocr: OcrConfig {
                provider: OcrBackend::Tesseract,
                language: "eng".to_string(),
                timeout_secs: 30,
                tesseract_path: "tesseract".to_string(),
                ollama_url: "http://localhost:11434".to_string(),
                ollama_model: "llava".to_string(),
            },
            layout: LayoutConfig {
                viewport_width: 800.0,
                viewport_height: 1100.0,
                image_resolve_attempts: 50,
                image_resolve_delay_ms: 150,
            },
            editor: EditorConfig {
                page_height_budget: 1123.0,
                debounce_ms: 100,
            },
            export: ExportConfig {
                timeout_secs: 60,
                retry_timeout_secs: 120,
            },
        }
    }
}

/// Error raised when an environment variable is present but malformed
#[derive(Debug, thiserror::Error)]
#[error("Invalid value for {key}: {value:?}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
}

fn parsed<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError { key, value }),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let provider = match env::var("OCR_PROVIDER")
            .unwrap_or_else(|_| "tesseract".to_string())
            .to_lowercase()
            .as_str()
        {
            "tesseract" => OcrBackend::Tesseract,
            "ollama" => OcrBackend::Ollama,
            "none" | "off" => OcrBackend::None,
            other => {
                return Err(ConfigError {
                    key: "OCR_PROVIDER",
                    value: other.to_string(),
                })
            }
        };

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parsed("SERVER_PORT", defaults.server.port)?,
                public_dir: env::var("PUBLIC_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.server.public_dir),
            },
            upload: UploadConfig {
                temp_dir: env::var("UPLOAD_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.upload.temp_dir),
                max_bytes: parsed("MAX_UPLOAD_BYTES", defaults.upload.max_bytes)?,
            },
            ocr: OcrConfig {
                provider,
                language: env::var("OCR_LANGUAGE").unwrap_or(defaults.ocr.language),
                timeout_secs: parsed("OCR_TIMEOUT_SECS", defaults.ocr.timeout_secs)?,
                tesseract_path: env::var("TESSERACT_PATH").unwrap_or(defaults.ocr.tesseract_path),
                ollama_url: env::var("OLLAMA_URL").unwrap_or(defaults.ocr.ollama_url),
                ollama_model: env::var("OLLAMA_MODEL").unwrap_or(defaults.ocr.ollama_model),
            },
            layout: LayoutConfig {
                viewport_width: parsed("VIEWPORT_WIDTH", defaults.layout.viewport_width)?,
                viewport_height: parsed("VIEWPORT_HEIGHT", defaults.layout.viewport_height)?,
                image_resolve_attempts: parsed(
                    "IMAGE_RESOLVE_ATTEMPTS",
                    defaults.layout.image_resolve_attempts,
                )?,
                image_resolve_delay_ms: parsed(
                    "IMAGE_RESOLVE_DELAY_MS",
                    defaults.layout.image_resolve_delay_ms,
                )?,
            },
            editor: EditorConfig {
                page_height_budget: parsed(
                    "PAGE_HEIGHT_BUDGET",
                    defaults.editor.page_height_budget,
                )?,
                debounce_ms: parsed("REPAGINATE_DEBOUNCE_MS", defaults.editor.debounce_ms)?,
            },
            export: ExportConfig {
                timeout_secs: parsed("EXPORT_TIMEOUT_SECS", defaults.export.timeout_secs)?,
                retry_timeout_secs: parsed(
                    "EXPORT_RETRY_TIMEOUT_SECS",
                    defaults.export.retry_timeout_secs,
                )?,
            },
        })
    }
}

impl OcrConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl LayoutConfig {
    pub fn resolve_delay(&self) -> Duration {
        Duration::from_millis(self.image_resolve_delay_ms)
    }
}

impl EditorConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
