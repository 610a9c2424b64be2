//! Per-language subtitle burn-in.
//!
//! Each language is rendered independently: one renderer failure is recorded
//! for that language and never stops the others.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::artifacts::{remove_file_if_exists, JobLayout};
use crate::error::{BabelError, Result};
use crate::external::CallGuard;
use crate::language::LanguageCode;
use crate::media::MediaProcessorTrait;
use crate::subtitle::SubtitleTrack;

pub struct BurnOrchestrator {
    media: Arc<dyn MediaProcessorTrait>,
}

impl BurnOrchestrator {
    pub fn new(media: Arc<dyn MediaProcessorTrait>) -> Self {
        Self { media }
    }

    /// Write `<lang>_subtitle.srt` and render `subtitled_<lang>_<name>`.
    pub async fn burn_subtitles(
        &self,
        layout: &JobLayout,
        track: &SubtitleTrack,
        language: &LanguageCode,
        guard: &CallGuard,
    ) -> Result<PathBuf> {
        let subtitle_path = layout.subtitle_path(language);
        track.write_to(&subtitle_path).await?;

        let output_path = layout.video_path(language);
        remove_file_if_exists(&output_path).await?;

        let video_path = layout.staged_video();
        let operation = format!("{} subtitle burn-in", language);
        let outcome = guard
            .run(
                &operation,
                self.media
                    .burn_subtitles(&video_path, &subtitle_path, &output_path),
            )
            .await;

        match outcome {
            Ok(()) => {
                info!("Rendered {} subtitles: {}", language, output_path.display());
                Ok(output_path)
            }
            Err(e) => {
                if let Err(cleanup) = remove_file_if_exists(&output_path).await {
                    warn!("Could not remove partial video {}: {}", output_path.display(), cleanup);
                }
                Err(match e {
                    BabelError::ExternalTool { .. } => {
                        BabelError::Render(format!("{} subtitles: {}", language, e))
                    }
                    other => other,
                })
            }
        }
    }

    /// Render every track, at most `concurrency` at a time.
    ///
    /// Waits for all branches; the map holds a result for each language.
    pub async fn burn_all(
        &self,
        layout: &JobLayout,
        tracks: Vec<(LanguageCode, &SubtitleTrack)>,
        guard: &CallGuard,
        concurrency: usize,
    ) -> BTreeMap<LanguageCode, Result<PathBuf>> {
        stream::iter(tracks)
            .map(|(language, track)| async move {
                let result = self.burn_subtitles(layout, track, &language, guard).await;
                if let Err(e) = &result {
                    warn!("Burn-in for {} failed: {}", language, e);
                }
                (language, result)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await
    }
}
