use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{BabelError, Result};

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_max_retries() -> u32 {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub transcriber: TranscriberConfig,
    pub translate: TranslateConfig,
    pub detection: DetectionConfig,
    pub media: MediaConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriberConfig {
    /// Base URL of an OpenAI-compatible API
    pub endpoint: String,
    /// Speech-to-text model
    pub model: String,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Source language hint passed to the service (auto-detect when absent)
    #[serde(default)]
    pub language_hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TranslationProvider {
    /// OpenAI-compatible chat completions
    OpenAI,
    /// Local Ollama server
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateConfig {
    pub provider: TranslationProvider,
    /// Service endpoint URL
    pub endpoint: String,
    /// LLM model to use for translation
    pub model: String,
    /// Environment variable holding the API key (OpenAI provider only)
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Extra attempts when a response does not keep the subtitle structure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Minimum classifier confidence (0.0 - 1.0) for the detected language
    pub min_confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub binary_path: String,
    /// Extension of the extracted audio file; selects the encoder
    pub audio_extension: String,
    /// Video encoder used when burning subtitles (ffmpeg default when absent)
    pub video_codec: Option<String>,
    /// Additional encoding options for subtitle burn-in
    /// Common options: ["-preset", "medium", "-crf", "23", "-pix_fmt", "yuv420p"]
    pub subtitle_options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory receiving audio, subtitle and video artifacts
    pub output_dir: PathBuf,
    /// Write each job's artifacts into `<output_dir>/<job id>/`
    pub isolate_jobs: bool,
    /// Maximum languages translated or rendered at the same time
    pub max_concurrent_languages: usize,
    /// Upper bound for each external call, in seconds
    pub external_timeout_secs: u64,
    /// Keep the extracted audio after transcription
    pub keep_audio: bool,
    /// Accepted video file extensions
    pub allowed_extensions: Vec<String>,
}

impl PipelineConfig {
    pub fn external_timeout(&self) -> Duration {
        Duration::from_secs(self.external_timeout_secs)
    }

    pub fn is_allowed_video<P: AsRef<Path>>(&self, path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.allowed_extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transcriber: TranscriberConfig {
                endpoint: "https://api.openai.com/v1".to_string(),
                model: "whisper-1".to_string(),
                api_key_env: default_api_key_env(),
                language_hint: None,
            },
            translate: TranslateConfig {
                provider: TranslationProvider::OpenAI,
                endpoint: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o-mini".to_string(),
                api_key_env: default_api_key_env(),
                max_retries: default_max_retries(),
            },
            detection: DetectionConfig {
                min_confidence: 0.0,
            },
            media: MediaConfig {
                binary_path: "ffmpeg".to_string(),
                audio_extension: "mp3".to_string(),
                video_codec: Some("libx264".to_string()),
                subtitle_options: vec![
                    // "-preset".to_string(), "medium".to_string(),  // Encoding speed
                    // "-crf".to_string(), "23".to_string(),         // Quality (0-51, lower = better quality)
                ],
            },
            pipeline: PipelineConfig {
                output_dir: PathBuf::from("uploads"),
                isolate_jobs: true,
                max_concurrent_languages: 3,
                external_timeout_secs: 900,
                keep_audio: false,
                allowed_extensions: vec!["mp4".to_string(), "avi".to_string(), "mov".to_string()],
            },
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BabelError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| BabelError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| BabelError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| BabelError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline.max_concurrent_languages == 0 {
            return Err(BabelError::Config(
                "pipeline.max_concurrent_languages must be at least 1".to_string(),
            ));
        }
        if self.pipeline.external_timeout_secs == 0 {
            return Err(BabelError::Config(
                "pipeline.external_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.media.binary_path.trim().is_empty() {
            return Err(BabelError::Config("media.binary_path is empty".to_string()));
        }
        if !(0.0..=1.0).contains(&self.detection.min_confidence) {
            return Err(BabelError::Config(
                "detection.min_confidence must be between 0.0 and 1.0".to_string(),
            ));
        }
        Ok(())
    }
}
