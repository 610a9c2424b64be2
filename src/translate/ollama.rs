use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::TranslationBackend;
use crate::config::TranslateConfig;
use crate::error::{BabelError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model: String,
    pub system: String,
    pub prompt: String,
    pub stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub response: String,
    pub done: bool,
}

/// Local Ollama `/api/generate` backend
pub struct OllamaTranslator {
    client: Client,
    config: TranslateConfig,
}

impl OllamaTranslator {
    pub fn new(config: TranslateConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl TranslationBackend for OllamaTranslator {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model: self.config.model.clone(),
            system: system_prompt.to_string(),
            prompt: user_prompt.to_string(),
            stream: false,
        };

        let url = format!("{}/api/generate", self.config.endpoint.trim_end_matches('/'));
        debug!("Sending translation request to: {}", url);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| BabelError::TranslationService(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(BabelError::TranslationService(format!(
                "Ollama API error {}: {}",
                status, error_text
            )));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| BabelError::TranslationService(format!("Failed to parse response: {}", e)))?;

        Ok(generated.response)
    }

    /// Check that Ollama answers and has the configured model
    async fn check_availability(&self) -> Result<()> {
        let url = format!("{}/api/tags", self.config.endpoint.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| BabelError::TranslationService(format!("Ollama not reachable: {}", e)))?;

        let tags: serde_json::Value = response.json().await?;
        let available = tags["models"]
            .as_array()
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| m["name"].as_str())
                    .any(|name| name == self.config.model || name.starts_with(&format!("{}:", self.config.model)))
            })
            .unwrap_or(false);

        if available {
            Ok(())
        } else {
            Err(BabelError::TranslationService(format!(
                "Model {} is not available in Ollama",
                self.config.model
            )))
        }
    }
}
