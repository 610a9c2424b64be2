// Translation architecture
//
// - TranslationBackend: text-generation capability (SRT text + language name -> text)
// - openai / ollama: concrete backends selected by configuration
// - TranslationAdapter: prompt, response cleanup and structural verification

pub mod common;
pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use tracing::{info, warn};

pub use common::*;
use crate::config::{TranslateConfig, TranslationProvider};
use crate::error::{BabelError, Result};
use crate::external::CallGuard;
use crate::subtitle::SubtitleTrack;

/// Text-generation capability used for translation.
///
/// Keeping the SRT structure is requested in the prompt, never assumed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    /// Check that the service is reachable and ready to serve requests
    async fn check_availability(&self) -> Result<()> {
        Ok(())
    }
}

/// Factory for creating translation backends
pub struct TranslatorFactory;

impl TranslatorFactory {
    pub fn create_backend(config: &TranslateConfig) -> Result<Box<dyn TranslationBackend>> {
        match config.provider {
            TranslationProvider::OpenAI => Ok(Box::new(openai::OpenAITranslator::new(config.clone())?)),
            TranslationProvider::Ollama => Ok(Box::new(ollama::OllamaTranslator::new(config.clone()))),
        }
    }
}

/// Structure-preserving subtitle translation
pub struct TranslationAdapter {
    backend: Box<dyn TranslationBackend>,
    max_retries: u32,
}

impl TranslationAdapter {
    pub fn new(backend: Box<dyn TranslationBackend>, max_retries: u32) -> Self {
        Self {
            backend,
            max_retries,
        }
    }

    /// Translate `track` into the language named `target_language`.
    ///
    /// The result has the same cue count, indices and timestamps as `track`.
    /// A response that changes structure is retried up to `max_retries` times;
    /// service errors, timeouts and cancellation are returned immediately.
    /// `guard` bounds each service call on its own.
    pub async fn translate(
        &self,
        track: &SubtitleTrack,
        target_language: &str,
        guard: &CallGuard,
    ) -> Result<SubtitleTrack> {
        if track.is_empty() {
            return Ok(track.clone());
        }

        let prompt = build_translation_prompt(&track.to_srt(), target_language);
        let operation = format!("{} translation", target_language);
        let attempts = self.max_retries + 1;
        let mut last_error = None;

        for attempt in 1..=attempts {
            let response = guard
                .run(&operation, self.backend.complete(SYSTEM_PROMPT, &prompt))
                .await?;
            if response.trim().is_empty() {
                return Err(BabelError::TranslationService(
                    "Empty translation received".to_string(),
                ));
            }

            match verify_structure(track, &clean_translation_response(&response)) {
                Ok(translated) => {
                    info!(
                        "Translated {} cues to {} (attempt {}/{})",
                        translated.len(),
                        target_language,
                        attempt,
                        attempts
                    );
                    return Ok(translated);
                }
                Err(e) => {
                    warn!(
                        "Translation to {} rejected (attempt {}/{}): {}",
                        target_language, attempt, attempts, e
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            BabelError::TranslationService(format!("no translation to {} produced", target_language))
        }))
    }

    pub async fn check_availability(&self) -> Result<()> {
        self.backend.check_availability().await
    }
}
