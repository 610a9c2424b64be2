use std::time::Duration;

use thiserror::Error;

use crate::job::Stage;

#[derive(Error, Debug)]
pub enum BabelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed subtitle (block {block}): {reason}")]
    MalformedSubtitle { block: usize, reason: String },

    #[error("External tool failed (exit status {}): {diagnostic}", status.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string()))]
    ExternalTool {
        status: Option<i32>,
        diagnostic: String,
    },

    #[error("Transcription service error: {0}")]
    TranscriptionService(String),

    #[error("Language detection error: {0}")]
    LanguageDetection(String),

    #[error("Translation service error: {0}")]
    TranslationService(String),

    #[error("Translation changed subtitle structure (expected {expected} cues, got {actual}): {detail}")]
    StructuralMismatch {
        expected: usize,
        actual: usize,
        detail: String,
    },

    #[error("{operation} timed out after {}s", limit.as_secs())]
    Timeout { operation: String, limit: Duration },

    #[error("Render error: {0}")]
    Render(String),

    #[error("Unknown language code: {0}")]
    UnknownLanguage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("{0} cancelled")]
    Cancelled(String),

    #[error("Invalid job transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Job failed during {stage}: {source}")]
    Job {
        stage: Stage,
        #[source]
        source: Box<BabelError>,
    },
}

impl BabelError {
    /// True for service failures and structural mismatches alike.
    pub fn is_translation_failure(&self) -> bool {
        matches!(
            self,
            Self::TranslationService(_) | Self::StructuralMismatch { .. }
        )
    }

    pub fn malformed<S: Into<String>>(block: usize, reason: S) -> Self {
        Self::MalformedSubtitle {
            block,
            reason: reason.into(),
        }
    }

    pub(crate) fn at_stage(self, stage: Stage) -> Self {
        match self {
            already @ Self::Job { .. } => already,
            other => Self::Job {
                stage,
                source: Box::new(other),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, BabelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_tool_message_carries_status_and_diagnostic() {
        let err = BabelError::ExternalTool {
            status: Some(1),
            diagnostic: "No such file".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "External tool failed (exit status 1): No such file"
        );
    }

    #[test]
    fn test_at_stage_wraps_once() {
        let err = BabelError::TranscriptionService("boom".to_string())
            .at_stage(Stage::Transcription)
            .at_stage(Stage::Burn);
        match err {
            BabelError::Job { stage, source } => {
                assert_eq!(stage, Stage::Transcription);
                assert!(matches!(*source, BabelError::TranscriptionService(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_structural_mismatch_is_translation_failure() {
        let err = BabelError::StructuralMismatch {
            expected: 2,
            actual: 1,
            detail: "cue count differs".to_string(),
        };
        assert!(err.is_translation_failure());
        assert!(!BabelError::Render("x".to_string()).is_translation_failure());
    }
}
