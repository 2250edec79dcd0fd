//! OCR Providers
//!
//! Backends that turn an encoded page image into text. The engine owns the
//! ordering, timeout and fallback; a provider only recognizes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::types::{OcrError, OcrProvider, Recognition};

#[async_trait]
pub trait OcrProviderTrait: Send + Sync {
    fn provider_type(&self) -> OcrProvider;

    /// Cheap readiness probe, run once when the engine initializes
    async fn is_available(&self) -> bool;

    async fn recognize(&self, image: &[u8], language: Option<&str>)
        -> Result<Recognition, OcrError>;
}

/// Runs the `tesseract` CLI over a temporary PNG
#[cfg(feature = "ocr-tesseract")]
pub struct TesseractProvider {
    binary: String,
    language: String,
}

#[cfg(feature = "ocr-tesseract")]
impl TesseractProvider {
    pub fn new(binary: &str, language: &str) -> Self {
        Self {
            binary: binary.to_string(),
            language: language.to_string(),
        }
    }

    /// LSTM engine, automatic page segmentation, text on stdout
    fn arguments(input: &std::path::Path, language: &str) -> Vec<std::ffi::OsString> {
        let mut args = vec![input.as_os_str().to_os_string()];
        args.extend(
            ["stdout", "-l", language, "--oem", "3", "--psm", "3"]
                .iter()
                .map(std::ffi::OsString::from),
        );
        args
    }
}

#[cfg(feature = "ocr-tesseract")]
#[async_trait]
impl OcrProviderTrait for TesseractProvider {
    fn provider_type(&self) -> OcrProvider {
        OcrProvider::Tesseract
    }

    async fn is_available(&self) -> bool {
        match tokio::process::Command::new(&self.binary).arg("--version").output().await {
            Ok(output) => output.status.success(),
            Err(e) => {
                tracing::debug!("{} not runnable: {}", self.binary, e);
                false
            }
        }
    }

    async fn recognize(
        &self,
        image: &[u8],
        language: Option<&str>,
    ) -> Result<Recognition, OcrError> {
        let language = language.unwrap_or(&self.language);

        let input = tempfile::Builder::new()
            .prefix("redraft-ocr-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| OcrError::Failed(format!("temp file: {}", e)))?;
        tokio::fs::write(input.path(), image)
            .await
            .map_err(|e| OcrError::Failed(format!("temp file: {}", e)))?;

        let output = tokio::process::Command::new(&self.binary)
            .args(Self::arguments(input.path(), language))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| OcrError::Failed(format!("{}: {}", self.binary, e)))?;

        if !output.status.success() {
            return Err(OcrError::Failed(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(Recognition::new(OcrProvider::Tesseract, &String::from_utf8_lossy(&output.stdout)))
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    images: [String; 1],
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

/// Vision model served by Ollama
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    fn prompt(language: Option<&str>) -> String {
        let mut prompt = String::from("Transcribe all text in this page image exactly as written.");
        if let Some(language) = language {
            prompt.push_str(&format!(" The language is {}.", language));
        }
        prompt.push_str(" Reply with the transcription only.");
        prompt
    }

    /// `llava` matches `llava:latest`
    fn has_model(&self, tags: &TagsResponse) -> bool {
        tags.models.iter().any(|tag| {
            tag.name == self.model || tag.name.split(':').next() == Some(self.model.as_str())
        })
    }
}

#[async_trait]
impl OcrProviderTrait for OllamaProvider {
    fn provider_type(&self) -> OcrProvider {
        OcrProvider::Ollama
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        let tags = match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => response.json::<TagsResponse>().await,
            Ok(response) => {
                tracing::debug!("Ollama tags returned {}", response.status());
                return false;
            }
            Err(e) => {
                tracing::debug!("Ollama unreachable at {}: {}", self.base_url, e);
                return false;
            }
        };

        match tags {
            Ok(tags) if self.has_model(&tags) => true,
            Ok(_) => {
                tracing::warn!("Ollama is running but model {} is not pulled", self.model);
                false
            }
            Err(e) => {
                tracing::debug!("Unreadable Ollama tags: {}", e);
                false
            }
        }
    }

    async fn recognize(
        &self,
        image: &[u8],
        language: Option<&str>,
    ) -> Result<Recognition, OcrError> {
        use base64::Engine;

        let request = GenerateRequest {
            model: &self.model,
            prompt: Self::prompt(language),
            images: [base64::engine::general_purpose::STANDARD.encode(image)],
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| OcrError::Remote(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OcrError::Remote(format!("{}: {}", status, body)));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| OcrError::Remote(format!("unexpected response: {}", e)))?;
        Ok(Recognition::new(OcrProvider::Ollama, &generated.response))
    }
}

/// Scripted provider for tests
#[cfg(test)]
pub struct MockProvider {
    pub text: String,
    pub available: bool,
    /// Simulated recognition latency
    pub delay: Option<std::time::Duration>,
    pub calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockProvider {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            available: true,
            delay: None,
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl OcrProviderTrait for MockProvider {
    fn provider_type(&self) -> OcrProvider {
        OcrProvider::Tesseract
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    async fn recognize(
        &self,
        _image: &[u8],
        _language: Option<&str>,
    ) -> Result<Recognition, OcrError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(Recognition {
            text: self.text.clone(),
            provider: OcrProvider::Tesseract,
            confidence: Some(100.0),
        })
    }
}
