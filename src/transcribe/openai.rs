// OpenAI-compatible speech-to-text backend
// Posts the audio as multipart form data and asks for an SRT response.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::path::Path;
use tracing::{debug, info};

use super::TranscriptionBackend;
use crate::config::TranscriberConfig;
use crate::error::{BabelError, Result};

pub const RESPONSE_FORMAT: &str = "srt";

pub struct OpenAITranscriber {
    client: Client,
    config: TranscriberConfig,
    api_key: String,
}

impl OpenAITranscriber {
    pub fn new(config: TranscriberConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            BabelError::Config(format!(
                "transcription API key not set (environment variable {})",
                config.api_key_env
            ))
        })?;
        Ok(Self::with_api_key(config, api_key))
    }

    pub fn with_api_key(config: TranscriberConfig, api_key: String) -> Self {
        Self {
            client: Client::new(),
            config,
            api_key,
        }
    }

    fn url(&self) -> String {
        format!("{}/audio/transcriptions", self.config.endpoint.trim_end_matches('/'))
    }

    fn form(&self, file_name: String, audio: Vec<u8>) -> Form {
        let form = Form::new()
            .part("file", Part::bytes(audio).file_name(file_name))
            .text("model", self.config.model.clone())
            .text("response_format", RESPONSE_FORMAT);

        match &self.config.language_hint {
            Some(language) => form.text("language", language.clone()),
            None => form,
        }
    }
}

#[async_trait]
impl TranscriptionBackend for OpenAITranscriber {
    async fn transcribe(&self, audio_path: &Path) -> Result<String> {
        let audio = tokio::fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.mp3".to_string());

        info!("Sending {} ({} bytes) to {}", file_name, audio.len(), self.config.model);
        debug!("Transcription endpoint: {}", self.url());

        let response = self
            .client
            .post(self.url())
            .bearer_auth(&self.api_key)
            .multipart(self.form(file_name, audio))
            .send()
            .await
            .map_err(|e| BabelError::TranscriptionService(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(BabelError::TranscriptionService(format!(
                "API error {}: {}",
                status, error_text
            )));
        }

        response
            .text()
            .await
            .map_err(|e| BabelError::TranscriptionService(format!("Failed to read response: {}", e)))
    }
}
