//! Job state machine and the result handed back to callers.
//!
//! Job level: `Received -> AudioExtracted -> Transcribed -> LanguageDetected
//! -> Translated -> Burned -> Complete`, with `Failed` reachable from any
//! non-terminal state. Each language also tracks its own progress so that one
//! failing language never hides the others.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BabelError, Result};
use crate::language::{LanguageCode, LanguageInfo};
use crate::subtitle::SubtitleTrack;

/// Pipeline stage, used to attribute failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Intake,
    AudioExtraction,
    Transcription,
    LanguageDetection,
    Translation,
    Burn,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Intake => "intake",
            Stage::AudioExtraction => "audio extraction",
            Stage::Transcription => "transcription",
            Stage::LanguageDetection => "language detection",
            Stage::Translation => "translation",
            Stage::Burn => "subtitle burn-in",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Received,
    AudioExtracted,
    Transcribed,
    LanguageDetected,
    Translated,
    Burned,
    Complete,
    Failed { stage: Stage, reason: String },
}

impl JobState {
    fn rank(&self) -> Option<u8> {
        match self {
            JobState::Received => Some(0),
            JobState::AudioExtracted => Some(1),
            JobState::Transcribed => Some(2),
            JobState::LanguageDetected => Some(3),
            JobState::Translated => Some(4),
            JobState::Burned => Some(5),
            JobState::Complete => Some(6),
            JobState::Failed { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Complete | JobState::Failed { .. })
    }

    /// Next state, allowed only one step forward or into `Failed`.
    pub fn advance(&self, next: JobState) -> Result<JobState> {
        let allowed = match (self.rank(), next.rank()) {
            (Some(6), _) | (None, _) => false,
            (Some(_), None) => true,
            (Some(from), Some(to)) => to == from + 1,
        };
        if allowed {
            Ok(next)
        } else {
            Err(BabelError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Received => f.write_str("received"),
            JobState::AudioExtracted => f.write_str("audio extracted"),
            JobState::Transcribed => f.write_str("transcribed"),
            JobState::LanguageDetected => f.write_str("language detected"),
            JobState::Translated => f.write_str("translated"),
            JobState::Burned => f.write_str("burned"),
            JobState::Complete => f.write_str("complete"),
            JobState::Failed { stage, reason } => write!(f, "failed during {}: {}", stage, reason),
        }
    }
}

/// Progress of one language branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LanguageStatus {
    Pending,
    Translated,
    Burned(PathBuf),
    Failed { stage: Stage, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageFailure {
    pub stage: Stage,
    pub reason: String,
}

/// The unit of work for one uploaded video. Owned by the coordinator.
#[derive(Debug)]
pub struct TranscriptionJob {
    pub id: Uuid,
    pub source_video: PathBuf,
    pub requested: Vec<LanguageCode>,
    pub audio: Option<PathBuf>,
    pub raw_transcript: Option<String>,
    pub original_track: Option<SubtitleTrack>,
    pub original_language: Option<LanguageCode>,
    pub translations: BTreeMap<LanguageCode, SubtitleTrack>,
    pub languages: BTreeMap<LanguageCode, LanguageStatus>,
    state: JobState,
    pub started_at: DateTime<Utc>,
}

impl TranscriptionJob {
    pub fn new(source_video: &Path, requested: Vec<LanguageCode>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_video: source_video.to_path_buf(),
            requested,
            audio: None,
            raw_transcript: None,
            original_track: None,
            original_language: None,
            translations: BTreeMap::new(),
            languages: BTreeMap::new(),
            state: JobState::Received,
            started_at: Utc::now(),
        }
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn transition(&mut self, next: JobState) -> Result<()> {
        self.state = self.state.advance(next)?;
        Ok(())
    }

    pub fn fail(&mut self, stage: Stage, error: &BabelError) {
        if let Ok(next) = self.state.advance(JobState::Failed {
            stage,
            reason: error.to_string(),
        }) {
            self.state = next;
        }
    }

    pub fn set_language(&mut self, language: &LanguageCode, status: LanguageStatus) {
        self.languages.insert(language.clone(), status);
    }

    /// Languages whose subtitled video exists.
    pub fn artifacts(&self) -> BTreeMap<LanguageCode, PathBuf> {
        self.languages
            .iter()
            .filter_map(|(code, status)| match status {
                LanguageStatus::Burned(path) => Some((code.clone(), path.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn failures(&self) -> BTreeMap<LanguageCode, LanguageFailure> {
        self.languages
            .iter()
            .filter_map(|(code, status)| match status {
                LanguageStatus::Failed { stage, reason } => Some((
                    code.clone(),
                    LanguageFailure {
                        stage: *stage,
                        reason: reason.clone(),
                    },
                )),
                _ => None,
            })
            .collect()
    }
}

/// Output for one language in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageArtifact {
    pub name: String,
    pub flag: String,
    pub subtitle_srt: String,
    pub subtitle_text: String,
    /// Subtitled video, relative to the output directory when possible
    pub video: PathBuf,
}

/// What the caller gets back from a job that did not fail as a whole.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: Uuid,
    pub source_video: PathBuf,
    pub original_language: LanguageCode,
    pub original_language_name: String,
    pub original_language_flag: String,
    pub transcript_srt: String,
    pub transcript_text: String,
    pub artifacts: BTreeMap<LanguageCode, LanguageArtifact>,
    pub failures: BTreeMap<LanguageCode, LanguageFailure>,
    pub state: JobState,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobReport {
    /// Every requested language and the original were produced.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn original_video(&self) -> Option<&Path> {
        self.artifacts
            .get(&self.original_language)
            .map(|artifact| artifact.video.as_path())
    }

    pub fn describe_language(info: &LanguageInfo) -> String {
        format!("{} {}", info.flag, info.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lang(code: &str) -> LanguageCode {
        LanguageCode::new(code).unwrap()
    }

    #[test]
    fn test_forward_transitions() {
        let mut state = JobState::Received;
        for next in [
            JobState::AudioExtracted,
            JobState::Transcribed,
            JobState::LanguageDetected,
            JobState::Translated,
            JobState::Burned,
            JobState::Complete,
        ] {
            state = state.advance(next).unwrap();
        }
        assert!(state.is_terminal());
    }

    #[test]
    fn test_no_skipping_or_reentry() {
        assert!(JobState::Received.advance(JobState::Transcribed).is_err());
        assert!(JobState::Transcribed.advance(JobState::Transcribed).is_err());
        assert!(JobState::Burned.advance(JobState::Translated).is_err());
    }

    #[test]
    fn test_failed_is_terminal_and_reachable_from_any_active_state() {
        let failed = JobState::Failed {
            stage: Stage::Transcription,
            reason: "boom".to_string(),
        };
        assert!(JobState::Transcribed.advance(failed.clone()).is_ok());
        assert!(failed.advance(JobState::Complete).is_err());
        assert!(failed.advance(failed.clone()).is_err());
        assert!(JobState::Complete.advance(failed).is_err());
    }

    #[test]
    fn test_job_fail_records_stage() {
        let mut job = TranscriptionJob::new(Path::new("clip.mp4"), vec![lang("fr")]);
        job.transition(JobState::AudioExtracted).unwrap();
        job.fail(
            Stage::Transcription,
            &BabelError::TranscriptionService("503".to_string()),
        );
        assert!(matches!(
            job.state(),
            JobState::Failed { stage: Stage::Transcription, .. }
        ));
    }

    #[test]
    fn test_artifacts_and_failures_are_split_by_status() {
        let mut job = TranscriptionJob::new(Path::new("clip.mp4"), vec![lang("fr"), lang("de")]);
        job.set_language(&lang("en"), LanguageStatus::Burned(PathBuf::from("subtitled_en_clip.mp4")));
        job.set_language(&lang("fr"), LanguageStatus::Burned(PathBuf::from("subtitled_fr_clip.mp4")));
        job.set_language(
            &lang("de"),
            LanguageStatus::Failed {
                stage: Stage::Translation,
                reason: "mismatch".to_string(),
            },
        );

        let artifacts = job.artifacts();
        assert_eq!(artifacts.len(), 2);
        assert!(artifacts.contains_key(&lang("en")));
        let failures = job.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[&lang("de")].stage, Stage::Translation);
    }

    #[test]
    fn test_state_serializes_with_tag() {
        let json = serde_json::to_string(&JobState::Failed {
            stage: Stage::Burn,
            reason: "exit 1".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"state":"failed","stage":"burn","reason":"exit 1"}"#);
    }
}
