//! Artifact naming and per-job directory layout.
//!
//! File names are kept compatible with existing consumers:
//! - audio: sibling of the source video with the audio extension
//! - subtitles: `<lang>_subtitle.srt`
//! - videos: `subtitled_<lang>_<original file name>`

use std::path::{Path, PathBuf};

use tracing::debug;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::{BabelError, Result};
use crate::language::LanguageCode;

pub const SUBTITLE_EXTENSION: &str = "srt";

/// Audio path derived from the video path: same base name, audio extension.
pub fn audio_path_for<P: AsRef<Path>>(video_path: P, audio_extension: &str) -> PathBuf {
    video_path.as_ref().with_extension(audio_extension)
}

pub fn subtitle_file_name(language: &LanguageCode) -> String {
    format!("{}_subtitle.{}", language, SUBTITLE_EXTENSION)
}

pub fn subtitled_video_name(language: &LanguageCode, original_filename: &str) -> String {
    format!("subtitled_{}_{}", language, original_filename)
}

/// Reduce an uploaded file name to ASCII letters, digits, `.`, `-` and `_`.
///
/// Whitespace becomes `_`, anything else is dropped, and leading dots are
/// stripped so the result can never name a hidden file or a parent directory.
pub fn sanitize_filename(name: &str) -> Result<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    let cleaned = cleaned.trim_start_matches(['.', '_']).to_string();

    if cleaned.is_empty() || !cleaned.contains(|c: char| c.is_ascii_alphanumeric()) {
        return Err(BabelError::UnsupportedFormat(format!(
            "file name '{}' has no usable characters",
            name
        )));
    }
    Ok(cleaned)
}

/// Remove `path` if present. Returns whether a file was removed.
pub async fn remove_file_if_exists(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!("Removed {}", path.display());
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Whether `a` and `b` name the same existing file, however they are spelled.
pub async fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (tokio::fs::canonicalize(a).await, tokio::fs::canonicalize(b).await) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Where one job reads its source and writes its artifacts.
#[derive(Debug, Clone)]
pub struct JobLayout {
    source_video: PathBuf,
    work_dir: PathBuf,
    original_filename: String,
    audio_extension: String,
}

impl JobLayout {
    pub fn new(
        job_id: Uuid,
        source_video: &Path,
        pipeline: &PipelineConfig,
        audio_extension: &str,
    ) -> Result<Self> {
        let raw_name = source_video
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| BabelError::UnsupportedFormat(source_video.display().to_string()))?;
        let original_filename = sanitize_filename(raw_name)?;

        if !pipeline.is_allowed_video(&original_filename) {
            return Err(BabelError::UnsupportedFormat(format!(
                "{} (allowed: {})",
                raw_name,
                pipeline.allowed_extensions.join(", ")
            )));
        }

        let work_dir = if pipeline.isolate_jobs {
            pipeline.output_dir.join(job_id.to_string())
        } else {
            pipeline.output_dir.clone()
        };

        Ok(Self {
            source_video: source_video.to_path_buf(),
            work_dir,
            original_filename,
            audio_extension: audio_extension.to_string(),
        })
    }

    pub fn source_video(&self) -> &Path {
        &self.source_video
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Working copy of the upload inside the job directory.
    pub fn staged_video(&self) -> PathBuf {
        self.work_dir.join(&self.original_filename)
    }

    pub fn audio_path(&self) -> PathBuf {
        audio_path_for(self.staged_video(), &self.audio_extension)
    }

    pub fn subtitle_path(&self, language: &LanguageCode) -> PathBuf {
        self.work_dir.join(subtitle_file_name(language))
    }

    pub fn video_path(&self, language: &LanguageCode) -> PathBuf {
        self.work_dir
            .join(subtitled_video_name(language, &self.original_filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn lang(code: &str) -> LanguageCode {
        LanguageCode::new(code).unwrap()
    }

    #[test]
    fn test_naming_convention() {
        assert_eq!(
            audio_path_for("uploads/talk.mp4", "mp3"),
            PathBuf::from("uploads/talk.mp3")
        );
        assert_eq!(subtitle_file_name(&lang("fr")), "fr_subtitle.srt");
        assert_eq!(
            subtitled_video_name(&lang("fr"), "talk.mp4"),
            "subtitled_fr_talk.mp4"
        );
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("my talk.mp4").unwrap(), "my_talk.mp4");
        assert_eq!(sanitize_filename("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(sanitize_filename("C:\\videos\\a'b:c.mov").unwrap(), "abc.mov");
        assert_eq!(sanitize_filename(".hidden.mp4").unwrap(), "hidden.mp4");
        assert!(sanitize_filename("...").is_err());
    }

    #[test]
    fn test_isolated_layout() {
        let mut pipeline = Config::default().pipeline;
        pipeline.output_dir = PathBuf::from("/srv/out");
        let id = Uuid::new_v4();
        let layout = JobLayout::new(id, Path::new("/tmp/in/my clip.mp4"), &pipeline, "mp3").unwrap();

        let job_dir = PathBuf::from("/srv/out").join(id.to_string());
        assert_eq!(layout.work_dir(), job_dir.as_path());
        assert_eq!(layout.staged_video(), job_dir.join("my_clip.mp4"));
        assert_eq!(layout.audio_path(), job_dir.join("my_clip.mp3"));
        assert_eq!(layout.subtitle_path(&lang("de")), job_dir.join("de_subtitle.srt"));
        assert_eq!(layout.video_path(&lang("de")), job_dir.join("subtitled_de_my_clip.mp4"));
    }

    #[test]
    fn test_shared_layout_and_extension_check() {
        let mut pipeline = Config::default().pipeline;
        pipeline.isolate_jobs = false;
        pipeline.output_dir = PathBuf::from("uploads");
        let layout = JobLayout::new(Uuid::new_v4(), Path::new("clip.avi"), &pipeline, "mp3").unwrap();
        assert_eq!(layout.work_dir(), Path::new("uploads"));

        let err = JobLayout::new(Uuid::new_v4(), Path::new("clip.mkv"), &pipeline, "mp3").unwrap_err();
        assert!(matches!(err, BabelError::UnsupportedFormat(_)));
    }

    #[tokio::test]
    async fn test_remove_file_if_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stale.mp3");
        std::fs::write(&path, b"old").unwrap();

        assert!(remove_file_if_exists(&path).await.unwrap());
        assert!(!path.exists());
        assert!(!remove_file_if_exists(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_same_file_ignores_spelling() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        let video = dir.path().join("talk.mp4");
        std::fs::write(&video, b"video").unwrap();

        let detour = dir.path().join("nested").join("..").join("talk.mp4");
        assert!(same_file(&video, &detour).await);
        assert!(!same_file(&video, &dir.path().join("other.mp4")).await);
    }
}
