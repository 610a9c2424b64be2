//! Audio extraction step: one deterministic audio file per source video.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::artifacts::{audio_path_for, remove_file_if_exists, same_file};
use crate::error::{BabelError, Result};
use crate::external::CallGuard;
use crate::media::MediaProcessorTrait;

pub struct AudioExtractor {
    media: Arc<dyn MediaProcessorTrait>,
    audio_extension: String,
}

impl AudioExtractor {
    pub fn new(media: Arc<dyn MediaProcessorTrait>, audio_extension: &str) -> Self {
        Self {
            media,
            audio_extension: audio_extension.to_string(),
        }
    }

    pub fn output_path(&self, video_path: &Path) -> PathBuf {
        audio_path_for(video_path, &self.audio_extension)
    }

    /// Extract the audio track of `video_path` next to it.
    pub async fn extract_audio(&self, video_path: &Path, guard: &CallGuard) -> Result<PathBuf> {
        self.extract_audio_to(video_path, self.output_path(video_path), guard)
            .await
    }

    /// Extract the audio track of `video_path` into `audio_path`.
    ///
    /// A previous file at `audio_path` is removed first. On failure no audio
    /// file is left behind.
    pub async fn extract_audio_to(
        &self,
        video_path: &Path,
        audio_path: PathBuf,
        guard: &CallGuard,
    ) -> Result<PathBuf> {
        if !video_path.exists() {
            return Err(BabelError::FileNotFound(video_path.display().to_string()));
        }

        if same_file(&audio_path, video_path).await {
            return Err(BabelError::UnsupportedFormat(format!(
                "{} would overwrite the source video",
                audio_path.display()
            )));
        }

        if remove_file_if_exists(&audio_path).await? {
            info!("Removed stale audio file {}", audio_path.display());
        }

        let outcome = guard
            .run(
                "audio extraction",
                self.media.extract_audio(video_path, &audio_path),
            )
            .await
            .and_then(|()| {
                if audio_path.exists() {
                    Ok(())
                } else {
                    Err(BabelError::ExternalTool {
                        status: Some(0),
                        diagnostic: format!("no audio written to {}", audio_path.display()),
                    })
                }
            });

        match outcome {
            Ok(()) => Ok(audio_path),
            Err(e) => {
                if let Err(cleanup) = remove_file_if_exists(&audio_path).await {
                    warn!("Could not remove partial audio {}: {}", audio_path.display(), cleanup);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MockMediaProcessorTrait;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn guard() -> CallGuard {
        CallGuard::new(Duration::from_secs(5), CancellationToken::new())
    }

    fn video_in(dir: &Path) -> PathBuf {
        let video = dir.join("talk.mp4");
        std::fs::write(&video, b"video").unwrap();
        video
    }

    #[tokio::test]
    async fn test_extracts_to_sibling_path_replacing_stale_audio() {
        let dir = tempfile::tempdir().unwrap();
        let video = video_in(dir.path());
        std::fs::write(dir.path().join("talk.mp3"), b"stale").unwrap();

        let mut media = MockMediaProcessorTrait::new();
        media
            .expect_extract_audio()
            .times(1)
            .returning(|_, audio| {
                assert!(!audio.exists(), "stale audio was not removed");
                std::fs::write(audio, b"fresh").unwrap();
                Ok(())
            });

        let extractor = AudioExtractor::new(Arc::new(media), "mp3");
        let audio = extractor.extract_audio(&video, &guard()).await.unwrap();
        assert_eq!(audio, dir.path().join("talk.mp3"));
        assert_eq!(std::fs::read(&audio).unwrap(), b"fresh");
    }

    #[tokio::test]
    async fn test_failure_leaves_no_partial_audio() {
        let dir = tempfile::tempdir().unwrap();
        let video = video_in(dir.path());

        let mut media = MockMediaProcessorTrait::new();
        media.expect_extract_audio().times(1).returning(|_, audio| {
            std::fs::write(audio, b"half").unwrap();
            Err(BabelError::ExternalTool {
                status: Some(1),
                diagnostic: "Invalid data found when processing input".to_string(),
            })
        });

        let extractor = AudioExtractor::new(Arc::new(media), "mp3");
        let err = extractor.extract_audio(&video, &guard()).await.unwrap_err();
        match err {
            BabelError::ExternalTool { diagnostic, .. } => {
                assert!(diagnostic.contains("Invalid data"))
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!dir.path().join("talk.mp3").exists());
    }

    #[tokio::test]
    async fn test_refuses_to_overwrite_source_video() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("talk.mp3");
        std::fs::write(&video, b"video").unwrap();

        let mut media = MockMediaProcessorTrait::new();
        media.expect_extract_audio().never();
        let extractor = AudioExtractor::new(Arc::new(media), "mp3");
        let err = extractor.extract_audio(&video, &guard()).await.unwrap_err();
        assert!(matches!(err, BabelError::UnsupportedFormat(_)));
        assert_eq!(std::fs::read(&video).unwrap(), b"video");
    }

    #[tokio::test]
    async fn test_missing_video_skips_media_tool() {
        let mut media = MockMediaProcessorTrait::new();
        media.expect_extract_audio().never();
        let extractor = AudioExtractor::new(Arc::new(media), "mp3");
        let err = extractor
            .extract_audio(Path::new("/nonexistent/talk.mp4"), &guard())
            .await
            .unwrap_err();
        assert!(matches!(err, BabelError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_silent_tool_without_output_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let video = video_in(dir.path());
        let mut media = MockMediaProcessorTrait::new();
        media.expect_extract_audio().returning(|_, _| Ok(()));

        let extractor = AudioExtractor::new(Arc::new(media), "mp3");
        assert!(matches!(
            extractor.extract_audio(&video, &guard()).await,
            Err(BabelError::ExternalTool { .. })
        ));
    }
}
