use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{BabelError, Result};
use crate::subtitle::{self, SubtitleTrack};

pub const SYSTEM_PROMPT: &str =
    "You are a very helpful and talented translator who can translate all languages and srt files.";

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)\r?\n?```$").unwrap());

static TRANSCRIPTION_TAGS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^<Transcription>(.*)</Transcription>$").unwrap());

/// User prompt asking for a structure-preserving translation of an SRT document.
pub fn build_translation_prompt(srt: &str, target_language: &str) -> String {
    format!(
        "Could you please translate the .srt text below to {}? Do not add any comments of yours only the translation. \
         Please do not change the timestamps and structure of the file.\n<Transcription>{}</Transcription>",
        target_language, srt
    )
}

/// Strip wrappers models like to add around the SRT payload.
pub fn clean_translation_response(response: &str) -> String {
    let mut text = response.trim().to_string();
    loop {
        let unwrapped = if let Some(caps) = CODE_FENCE.captures(&text) {
            caps[1].trim().to_string()
        } else if let Some(caps) = TRANSCRIPTION_TAGS.captures(&text) {
            caps[1].trim().to_string()
        } else {
            break;
        };
        text = unwrapped;
    }
    text
}

/// Parse a translated SRT and check it against its source cue by cue.
///
/// Count, indices and timestamps must match exactly; only text may differ.
pub fn verify_structure(source: &SubtitleTrack, translated_raw: &str) -> Result<SubtitleTrack> {
    let translated = subtitle::parse(translated_raw).map_err(|e| BabelError::StructuralMismatch {
        expected: source.len(),
        actual: 0,
        detail: format!("response is not valid SRT: {}", e),
    })?;

    if translated.len() != source.len() {
        return Err(BabelError::StructuralMismatch {
            expected: source.len(),
            actual: translated.len(),
            detail: "cue count differs".to_string(),
        });
    }

    for (original, candidate) in source.cues().iter().zip(translated.cues()) {
        if original.index != candidate.index || !original.same_timing(candidate) {
            return Err(BabelError::StructuralMismatch {
                expected: source.len(),
                actual: translated.len(),
                detail: format!(
                    "cue {} moved: {} --> {} became #{} {} --> {}",
                    original.index,
                    original.start,
                    original.end,
                    candidate.index,
                    candidate.start,
                    candidate.end
                ),
            });
        }
    }

    source.with_texts(translated.cues().iter().map(|cue| cue.text.as_str()))
}
