// Transcription architecture
//
// - TranscriptionBackend: speech-to-text capability returning raw SRT text
// - openai: OpenAI-compatible `/audio/transcriptions` backend
// - TranscriptionAdapter: backend plus language classification of the result

pub mod openai;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::error::{BabelError, Result};
use crate::language::{LanguageClassifier, LanguageCode, LanguageLookup, WhatlangClassifier};
use crate::subtitle::extract_plain_text;

/// Speech-to-text capability
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    /// Transcribe an audio file into SRT-structured text, returned untouched
    async fn transcribe(&self, audio_path: &Path) -> Result<String>;
}

/// Factory for creating transcription backends
pub struct TranscriberFactory;

impl TranscriberFactory {
    pub fn create_default(config: &Config) -> Result<Box<dyn TranscriptionBackend>> {
        Ok(Box::new(openai::OpenAITranscriber::new(
            config.transcriber.clone(),
        )?))
    }

    pub fn create_classifier(config: &Config) -> Box<dyn LanguageClassifier> {
        Box::new(WhatlangClassifier::new(config.detection.min_confidence))
    }
}

/// Transcription and original-language detection for one job
pub struct TranscriptionAdapter {
    backend: Box<dyn TranscriptionBackend>,
    classifier: Box<dyn LanguageClassifier>,
    languages: Arc<dyn LanguageLookup>,
}

impl TranscriptionAdapter {
    pub fn new(
        backend: Box<dyn TranscriptionBackend>,
        classifier: Box<dyn LanguageClassifier>,
        languages: Arc<dyn LanguageLookup>,
    ) -> Self {
        Self {
            backend,
            classifier,
            languages,
        }
    }

    /// Raw SRT text from the speech-to-text service; no local retry
    pub async fn transcribe(&self, audio_path: &Path) -> Result<String> {
        if !audio_path.exists() {
            return Err(BabelError::FileNotFound(audio_path.display().to_string()));
        }
        info!("Transcribing {}", audio_path.display());
        let raw = self.backend.transcribe(audio_path).await?;
        info!("Transcription returned {} bytes", raw.len());
        Ok(raw)
    }

    /// Classify the transcript language on its plain text only.
    pub fn detect_language(&self, transcript: &str) -> Result<LanguageCode> {
        detect_transcript_language(self.classifier.as_ref(), self.languages.as_ref(), transcript)
    }
}

/// Language of a raw or plain transcript.
///
/// Index and timing lines are stripped before classification, and the
/// detected code must be known to `languages`.
pub fn detect_transcript_language(
    classifier: &dyn LanguageClassifier,
    languages: &dyn LanguageLookup,
    transcript: &str,
) -> Result<LanguageCode> {
    let plain = extract_plain_text(transcript);
    if plain.is_empty() {
        return Err(BabelError::LanguageDetection(
            "transcript contains no text".to_string(),
        ));
    }

    let code = classifier.classify(&plain)?;
    languages.ensure_supported(&code).map_err(|_| {
        BabelError::LanguageDetection(format!("detected language {} is not supported", code))
    })?;

    info!("Detected original language: {}", code);
    Ok(code)
}
