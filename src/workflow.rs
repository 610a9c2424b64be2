use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use walkdir::WalkDir;

use crate::artifacts::{remove_file_if_exists, same_file, JobLayout};
use crate::audio::AudioExtractor;
use crate::burn::BurnOrchestrator;
use crate::config::{Config, PipelineConfig};
use crate::error::{BabelError, Result};
use crate::external::CallGuard;
use crate::job::{
    JobReport, JobState, LanguageArtifact, LanguageStatus, Stage, TranscriptionJob,
};
use crate::language::{LanguageCatalog, LanguageClassifier, LanguageCode, LanguageInfo, LanguageLookup};
use crate::media::{MediaProcessorFactory, MediaProcessorTrait};
use crate::subtitle::{self, SubtitleTrack};
use crate::transcribe::{
    detect_transcript_language, TranscriberFactory, TranscriptionAdapter, TranscriptionBackend,
};
use crate::translate::{TranslationAdapter, TranslationBackend, TranslatorFactory};

/// Receives every job state the coordinator enters.
pub type StateObserver = Arc<dyn Fn(&JobState) + Send + Sync>;

/// External capabilities handed to the coordinator at construction.
pub struct Capabilities {
    pub media: Arc<dyn MediaProcessorTrait>,
    pub transcriber: Box<dyn TranscriptionBackend>,
    pub translator: Box<dyn TranslationBackend>,
    pub classifier: Box<dyn LanguageClassifier>,
    pub languages: Arc<dyn LanguageLookup>,
}

impl Capabilities {
    /// Default backends: ffmpeg, OpenAI-compatible services, whatlang.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            media: MediaProcessorFactory::create_processor(config.media.clone()),
            transcriber: TranscriberFactory::create_default(config)?,
            translator: TranslatorFactory::create_backend(&config.translate)?,
            classifier: TranscriberFactory::create_classifier(config),
            languages: Arc::new(LanguageCatalog),
        })
    }
}

pub struct Workflow {
    config: Config,
    media: Arc<dyn MediaProcessorTrait>,
    languages: Arc<dyn LanguageLookup>,
    extractor: AudioExtractor,
    transcription: TranscriptionAdapter,
    translation: TranslationAdapter,
    burner: BurnOrchestrator,
    observer: Option<StateObserver>,
}

impl Workflow {
    pub fn new(config: Config) -> Result<Self> {
        let capabilities = Capabilities::from_config(&config)?;
        Ok(Self::with_capabilities(config, capabilities))
    }

    pub fn with_capabilities(config: Config, capabilities: Capabilities) -> Self {
        let Capabilities {
            media,
            transcriber,
            translator,
            classifier,
            languages,
        } = capabilities;

        Self {
            extractor: AudioExtractor::new(media.clone(), &config.media.audio_extension),
            transcription: TranscriptionAdapter::new(transcriber, classifier, languages.clone()),
            translation: TranslationAdapter::new(translator, config.translate.max_retries),
            burner: BurnOrchestrator::new(media.clone()),
            media,
            languages,
            observer: None,
            config,
        }
    }

    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&JobState) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Verify the media tool can be launched and the translation service is ready.
    pub async fn check_dependencies(&self) -> Result<String> {
        let version = self.media.check_availability().await?;
        self.translation.check_availability().await?;
        Ok(version)
    }

    /// Run the whole pipeline for one video.
    ///
    /// Errors before the per-language fan-out are job-fatal and returned as
    /// `BabelError::Job`. Per-language failures are recorded in the report.
    pub async fn process(
        &self,
        video_path: &Path,
        requested: &[LanguageCode],
        cancel: CancellationToken,
    ) -> Result<JobReport> {
        let mut job = TranscriptionJob::new(video_path, requested.to_vec());
        let guard = CallGuard::new(self.config.pipeline.external_timeout(), cancel);
        let span = info_span!("job", id = %job.id);

        async {
            info!(
                "Processing {} for languages [{}]",
                video_path.display(),
                requested
                    .iter()
                    .map(|code| code.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            self.notify(job.state());

            let result = self.run(&mut job, &guard).await;
            match &result {
                Ok(report) => info!(
                    "Job finished: {} artifacts, {} failed languages",
                    report.artifacts.len(),
                    report.failures.len()
                ),
                Err(e) => error!("Job aborted: {}", e),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run(&self, job: &mut TranscriptionJob, guard: &CallGuard) -> Result<JobReport> {
        // Received -> AudioExtracted
        let layout = self
            .prepare(job)
            .await
            .map_err(|e| self.abort(job, Stage::Intake, e))?;
        let audio_path = self
            .extractor
            .extract_audio_to(&layout.staged_video(), layout.audio_path(), guard)
            .await
            .map_err(|e| self.abort(job, Stage::AudioExtraction, e))?;
        job.audio = Some(audio_path.clone());
        self.advance(job, JobState::AudioExtracted)?;

        // AudioExtracted -> Transcribed
        let transcribed = self.transcribe(&audio_path, guard).await;
        if !self.config.pipeline.keep_audio {
            if let Err(e) = remove_file_if_exists(&audio_path).await {
                warn!("Could not remove audio {}: {}", audio_path.display(), e);
            }
            job.audio = None;
        }
        let (raw_transcript, original_track) =
            transcribed.map_err(|e| self.abort(job, Stage::Transcription, e))?;
        job.raw_transcript = Some(raw_transcript.clone());
        job.original_track = Some(original_track.clone());
        self.advance(job, JobState::Transcribed)?;

        // Transcribed -> LanguageDetected
        let original = self
            .transcription
            .detect_language(&raw_transcript)
            .map_err(|e| self.abort(job, Stage::LanguageDetection, e))?;
        job.original_language = Some(original.clone());
        self.advance(job, JobState::LanguageDetected)?;

        // LanguageDetected -> Translated
        self.translate_all(job, &original, &original_track, guard)
            .await
            .map_err(|e| self.abort(job, Stage::Translation, e))?;
        self.advance(job, JobState::Translated)?;

        // Translated -> Burned
        self.burn_all(job, &layout, &original, &original_track, guard)
            .await
            .map_err(|e| self.abort(job, Stage::Burn, e))?;
        self.advance(job, JobState::Burned)?;

        self.advance(job, JobState::Complete)?;
        self.report(job, &original, &raw_transcript, &original_track)
    }

    /// Validate the request and stage the upload in the job directory.
    async fn prepare(&self, job: &TranscriptionJob) -> Result<JobLayout> {
        for code in &job.requested {
            self.languages.ensure_supported(code)?;
        }
        if !job.source_video.exists() {
            return Err(BabelError::FileNotFound(job.source_video.display().to_string()));
        }

        let layout = JobLayout::new(
            job.id,
            &job.source_video,
            &self.config.pipeline,
            &self.config.media.audio_extension,
        )?;
        stage_video(&layout).await?;
        Ok(layout)
    }

    async fn transcribe(
        &self,
        audio_path: &Path,
        guard: &CallGuard,
    ) -> Result<(String, SubtitleTrack)> {
        let raw = guard
            .run("transcription", self.transcription.transcribe(audio_path))
            .await?;
        let track = subtitle::parse(&raw)?;
        info!("Transcript has {} cues", track.len());
        Ok((raw, track))
    }

    /// Translate into every requested language except the original.
    ///
    /// Only cancellation is returned as an error; everything else is
    /// recorded per language.
    async fn translate_all(
        &self,
        job: &mut TranscriptionJob,
        original: &LanguageCode,
        track: &SubtitleTrack,
        guard: &CallGuard,
    ) -> Result<()> {
        job.set_language(original, LanguageStatus::Translated);

        let requested = job.requested.clone();
        let mut targets = Vec::new();
        for code in requested.iter().filter(|code| *code != original) {
            if job.languages.contains_key(code) {
                continue;
            }
            let name = self.languages.display_name(code)?;
            job.set_language(code, LanguageStatus::Pending);
            targets.push((code.clone(), name));
        }

        let outcomes: Vec<(LanguageCode, Result<SubtitleTrack>)> = stream::iter(targets)
            .map(|(code, name)| async move {
                let result = self.translation.translate(track, name, guard).await;
                (code, result)
            })
            .buffer_unordered(self.config.pipeline.max_concurrent_languages.max(1))
            .collect()
            .await;

        for (code, result) in outcomes {
            match result {
                Ok(translated) => {
                    job.translations.insert(code.clone(), translated);
                    job.set_language(&code, LanguageStatus::Translated);
                }
                Err(e) => {
                    warn!("Translation to {} failed: {}", code, e);
                    job.set_language(
                        &code,
                        LanguageStatus::Failed {
                            stage: Stage::Translation,
                            reason: e.to_string(),
                        },
                    );
                }
            }
        }

        if guard.is_cancelled() {
            return Err(BabelError::Cancelled("translation".to_string()));
        }
        Ok(())
    }

    /// Burn the original and every successful translation.
    async fn burn_all(
        &self,
        job: &mut TranscriptionJob,
        layout: &JobLayout,
        original: &LanguageCode,
        original_track: &SubtitleTrack,
        guard: &CallGuard,
    ) -> Result<()> {
        let mut tracks = vec![(original.clone(), original_track)];
        tracks.extend(
            job.translations
                .iter()
                .map(|(code, track)| (code.clone(), track)),
        );

        let results = self
            .burner
            .burn_all(
                layout,
                tracks,
                guard,
                self.config.pipeline.max_concurrent_languages,
            )
            .await;

        for (code, result) in results {
            let status = match result {
                Ok(video) => LanguageStatus::Burned(video),
                Err(e) => LanguageStatus::Failed {
                    stage: Stage::Burn,
                    reason: e.to_string(),
                },
            };
            job.set_language(&code, status);
        }

        if guard.is_cancelled() {
            return Err(BabelError::Cancelled("subtitle burn-in".to_string()));
        }
        Ok(())
    }

    fn report(
        &self,
        job: &TranscriptionJob,
        original: &LanguageCode,
        raw_transcript: &str,
        original_track: &SubtitleTrack,
    ) -> Result<JobReport> {
        let original_info = self.languages.info(original)?;
        let output_dir = &self.config.pipeline.output_dir;

        let mut artifacts = BTreeMap::new();
        for (code, video) in job.artifacts() {
            let info = self.languages.info(&code)?;
            let track = if &code == original {
                original_track
            } else {
                match job.translations.get(&code) {
                    Some(track) => track,
                    None => continue,
                }
            };
            let video = pathdiff::diff_paths(&video, output_dir).unwrap_or(video);
            artifacts.insert(
                code,
                LanguageArtifact {
                    name: info.name.to_string(),
                    flag: info.flag.to_string(),
                    subtitle_srt: track.to_srt(),
                    subtitle_text: track.plain_text(),
                    video,
                },
            );
        }

        Ok(JobReport {
            job_id: job.id,
            source_video: job.source_video.clone(),
            original_language: original.clone(),
            original_language_name: original_info.name.to_string(),
            original_language_flag: original_info.flag.to_string(),
            transcript_srt: raw_transcript.to_string(),
            transcript_text: subtitle::extract_plain_text(raw_transcript),
            artifacts,
            failures: job.failures(),
            state: job.state().clone(),
            started_at: job.started_at,
            finished_at: Utc::now(),
        })
    }

    fn advance(&self, job: &mut TranscriptionJob, next: JobState) -> Result<()> {
        job.transition(next)?;
        info!("Job state: {}", job.state());
        self.notify(job.state());
        Ok(())
    }

    /// Move the job to `Failed` and tag the error with its stage.
    fn abort(&self, job: &mut TranscriptionJob, stage: Stage, error: BabelError) -> BabelError {
        job.fail(stage, &error);
        self.notify(job.state());
        error.at_stage(stage)
    }

    fn notify(&self, state: &JobState) {
        if let Some(observer) = &self.observer {
            observer(state);
        }
    }

    /// Process every allowed video under `input_dir`, one job at a time.
    ///
    /// A failing file is logged and does not stop the batch; cancellation does.
    pub async fn process_directory(
        &self,
        input_dir: &Path,
        requested: &[LanguageCode],
        cancel: CancellationToken,
    ) -> Result<Vec<(PathBuf, Result<JobReport>)>> {
        if !input_dir.is_dir() {
            return Err(BabelError::Config(format!(
                "{} is not a directory",
                input_dir.display()
            )));
        }

        let videos = find_videos(input_dir, &self.config.pipeline);
        info!("Found {} video files to process", videos.len());

        let mut results = Vec::with_capacity(videos.len());
        for video in videos {
            if cancel.is_cancelled() {
                warn!("Batch cancelled before {}", video.display());
                break;
            }
            let result = self.process(&video, requested, cancel.clone()).await;
            match &result {
                Ok(_) => info!("Successfully processed: {}", video.display()),
                Err(e) => warn!("Failed to process {}: {}", video.display(), e),
            }
            results.push((video, result));
        }
        Ok(results)
    }

    pub fn languages(&self) -> Vec<LanguageInfo> {
        self.languages.all()
    }
}

/// Copy the upload into the job directory unless it is already there.
pub async fn stage_video(layout: &JobLayout) -> Result<PathBuf> {
    fs::create_dir_all(layout.work_dir()).await?;
    let staged = layout.staged_video();
    if !same_file(layout.source_video(), &staged).await {
        fs::copy(layout.source_video(), &staged).await?;
    }
    Ok(staged)
}

fn find_videos(input_dir: &Path, pipeline: &PipelineConfig) -> Vec<PathBuf> {
    let mut videos: Vec<PathBuf> = WalkDir::new(input_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|entry| entry.file_type().is_file() && pipeline.is_allowed_video(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    videos.sort();
    videos
}

// Single-stage operations. Each builds only the capability it needs.

fn guard_for(config: &Config, cancel: CancellationToken) -> CallGuard {
    CallGuard::new(config.pipeline.external_timeout(), cancel)
}

/// Extract audio next to `video_path`, optionally moving it to `output`.
pub async fn extract_audio(
    config: &Config,
    video_path: &Path,
    output: Option<&Path>,
    cancel: CancellationToken,
) -> Result<PathBuf> {
    let media = MediaProcessorFactory::create_processor(config.media.clone());
    let extractor = AudioExtractor::new(media, &config.media.audio_extension);
    let audio = extractor
        .extract_audio(video_path, &guard_for(config, cancel))
        .await?;

    match output {
        Some(target) if !same_file(target, &audio).await => {
            fs::copy(&audio, target).await?;
            remove_file_if_exists(&audio).await?;
            Ok(target.to_path_buf())
        }
        _ => Ok(audio),
    }
}

/// Transcribe `audio_path` and write the raw SRT to `output`.
pub async fn transcribe_file(
    config: &Config,
    audio_path: &Path,
    output: &Path,
    cancel: CancellationToken,
) -> Result<SubtitleTrack> {
    let backend = TranscriberFactory::create_default(config)?;
    let adapter = TranscriptionAdapter::new(
        backend,
        TranscriberFactory::create_classifier(config),
        Arc::new(LanguageCatalog),
    );
    let raw = guard_for(config, cancel)
        .run("transcription", adapter.transcribe(audio_path))
        .await?;
    let track = subtitle::parse(&raw)?;
    fs::write(output, &raw).await?;
    Ok(track)
}

/// Detect the language of an SRT or plain-text file.
pub async fn detect_file_language(config: &Config, path: &Path) -> Result<LanguageInfo> {
    if !path.exists() {
        return Err(BabelError::FileNotFound(path.display().to_string()));
    }
    let text = fs::read_to_string(path).await?;
    let catalog = LanguageCatalog;
    let classifier = TranscriberFactory::create_classifier(config);
    let code = detect_transcript_language(classifier.as_ref(), &catalog, &text)?;
    catalog.info(&code)
}

/// Translate an SRT file into `target` and write the result to `output`.
pub async fn translate_file(
    config: &Config,
    input: &Path,
    output: &Path,
    target: &LanguageCode,
    cancel: CancellationToken,
) -> Result<SubtitleTrack> {
    let name = LanguageCatalog.display_name(target)?;
    let track = SubtitleTrack::read_from(input).await?;
    let adapter = TranslationAdapter::new(
        TranslatorFactory::create_backend(&config.translate)?,
        config.translate.max_retries,
    );
    let translated = adapter
        .translate(&track, name, &guard_for(config, cancel))
        .await?;
    translated.write_to(output).await?;
    Ok(translated)
}

/// Burn an existing SRT file into a video for `language`.
pub async fn burn_subtitle_file(
    config: &Config,
    video_path: &Path,
    subtitle_path: &Path,
    language: &LanguageCode,
    output_dir: &Path,
    cancel: CancellationToken,
) -> Result<PathBuf> {
    LanguageCatalog.ensure_supported(language)?;
    if !video_path.exists() {
        return Err(BabelError::FileNotFound(video_path.display().to_string()));
    }
    let track = SubtitleTrack::read_from(subtitle_path).await?;

    let pipeline = PipelineConfig {
        output_dir: output_dir.to_path_buf(),
        isolate_jobs: false,
        ..config.pipeline.clone()
    };
    let layout = JobLayout::new(
        uuid::Uuid::new_v4(),
        video_path,
        &pipeline,
        &config.media.audio_extension,
    )?;
    stage_video(&layout).await?;

    let burner = BurnOrchestrator::new(MediaProcessorFactory::create_processor(config.media.clone()));
    burner
        .burn_subtitles(&layout, &track, language, &guard_for(config, cancel))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_videos_filters_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        for name in ["b.mp4", "a.MOV", "notes.txt", "nested/c.avi", "d.mkv"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let videos = find_videos(dir.path(), &Config::default().pipeline);
        let names: Vec<_> = videos
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("a.MOV"),
                PathBuf::from("b.mp4"),
                PathBuf::from("nested/c.avi"),
            ]
        );
    }

    #[tokio::test]
    async fn test_stage_video_copies_into_job_directory() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let video = input.path().join("talk.mp4");
        std::fs::write(&video, b"video").unwrap();

        let mut pipeline = Config::default().pipeline;
        pipeline.output_dir = output.path().to_path_buf();
        let layout = JobLayout::new(uuid::Uuid::new_v4(), &video, &pipeline, "mp3").unwrap();

        let staged = stage_video(&layout).await.unwrap();
        assert!(staged.starts_with(output.path()));
        assert_eq!(std::fs::read(&staged).unwrap(), b"video");
    }

    #[tokio::test]
    async fn test_stage_video_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("talk.mp4");
        std::fs::write(&video, b"video").unwrap();

        let mut pipeline = Config::default().pipeline;
        pipeline.output_dir = dir.path().to_path_buf();
        pipeline.isolate_jobs = false;
        let layout = JobLayout::new(uuid::Uuid::new_v4(), &video, &pipeline, "mp3").unwrap();

        assert_eq!(stage_video(&layout).await.unwrap(), video);
    }

    #[tokio::test]
    async fn test_stage_video_keeps_upload_reached_by_another_path() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = dir.path().join("uploads");
        std::fs::create_dir_all(uploads.join("nested")).unwrap();
        let video = uploads.join("talk.mp4");
        std::fs::write(&video, b"twenty bytes of film").unwrap();

        let mut pipeline = Config::default().pipeline;
        pipeline.output_dir = uploads.join("nested").join("..");
        pipeline.isolate_jobs = false;
        let layout = JobLayout::new(uuid::Uuid::new_v4(), &video, &pipeline, "mp3").unwrap();
        assert_ne!(layout.staged_video(), video);

        let staged = stage_video(&layout).await.unwrap();
        assert_eq!(std::fs::read(&staged).unwrap(), b"twenty bytes of film");
        assert_eq!(std::fs::read(&video).unwrap(), b"twenty bytes of film");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stage_video_through_symlinked_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = dir.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();
        let video = uploads.join("talk.mp4");
        std::fs::write(&video, b"video").unwrap();
        let link = dir.path().join("out");
        std::os::unix::fs::symlink(&uploads, &link).unwrap();

        let mut pipeline = Config::default().pipeline;
        pipeline.output_dir = link;
        pipeline.isolate_jobs = false;
        let layout = JobLayout::new(uuid::Uuid::new_v4(), &video, &pipeline, "mp3").unwrap();

        stage_video(&layout).await.unwrap();
        assert_eq!(std::fs::read(&video).unwrap(), b"video");
    }
}
