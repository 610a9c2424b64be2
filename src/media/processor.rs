use async_trait::async_trait;
use std::path::Path;
use tracing::info;

use super::{MediaCommandBuilder, MediaProcessorTrait};
use crate::config::MediaConfig;
use crate::error::{BabelError, Result};

/// Concrete implementation of media processor (FFmpeg-based)
pub struct MediaProcessorImpl {
    config: MediaConfig,
    command_builder: MediaCommandBuilder,
}

impl MediaProcessorImpl {
    pub fn new(config: MediaConfig) -> Self {
        let command_builder = MediaCommandBuilder::new(&config.binary_path);

        Self {
            config,
            command_builder,
        }
    }
}

#[async_trait]
impl MediaProcessorTrait for MediaProcessorImpl {
    async fn burn_subtitles(
        &self,
        video_path: &Path,
        subtitle_path: &Path,
        output_path: &Path,
    ) -> Result<()> {
        info!(
            "Burning subtitles from {} into {} -> {}",
            subtitle_path.display(),
            video_path.display(),
            output_path.display()
        );

        let command = self.command_builder.burn_subtitles(
            video_path,
            subtitle_path,
            output_path,
            self.config.video_codec.as_deref(),
            &self.config.subtitle_options,
        );
        command.execute().await?;

        info!("Subtitle burn-in completed");
        Ok(())
    }

    async fn extract_audio(&self, video_path: &Path, audio_path: &Path) -> Result<()> {
        info!("Extracting audio from {} to {}", video_path.display(), audio_path.display());

        let command = self.command_builder.extract_audio(video_path, audio_path);
        command.execute().await?;

        info!("Audio extraction completed");
        Ok(())
    }

    async fn check_availability(&self) -> Result<String> {
        let stdout = self
            .command_builder
            .version_check()
            .execute()
            .await
            .map_err(|e| BabelError::Config(format!("Media processor not available: {}", e)))?;

        let version = stdout.lines().next().unwrap_or("unknown version").to_string();
        info!("Media processor is available: {}", version);
        Ok(version)
    }
}
