//! SRT codec: parsing, serialization and plain-text extraction.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::error::{BabelError, Result};

static INDEX_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());

static TIMING_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{2}):(\d{2}):(\d{2}),(\d{3}) --> (\d{2}):(\d{2}):(\d{2}),(\d{3})$").unwrap()
});

/// Subtitle timestamp with millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Largest value representable as `HH:MM:SS,mmm`.
    pub const MAX: Timestamp = Timestamp(99 * 3_600_000 + 59 * 60_000 + 59 * 1_000 + 999);

    /// Saturates at [`Timestamp::MAX`].
    pub fn from_millis(millis: u64) -> Self {
        Self(millis.min(Self::MAX.0))
    }

    /// `None` unless every field fits `HH:MM:SS,mmm`.
    pub fn from_parts(hours: u64, minutes: u64, seconds: u64, millis: u64) -> Option<Self> {
        if hours > 99 || minutes > 59 || seconds > 59 || millis > 999 {
            return None;
        }
        Some(Self(hours * 3_600_000 + minutes * 60_000 + seconds * 1_000 + millis))
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hours = self.0 / 3_600_000;
        let minutes = (self.0 % 3_600_000) / 60_000;
        let secs = (self.0 % 60_000) / 1_000;
        let millis = self.0 % 1_000;
        write!(f, "{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
    }
}

impl FromStr for Timestamp {
    type Err = BabelError;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || BabelError::malformed(0, format!("invalid timestamp '{}'", s));
        let (hms, millis) = s.trim().split_once(',').ok_or_else(bad)?;
        let parts: Vec<&str> = hms.split(':').collect();
        if parts.len() != 3 || millis.len() != 3 {
            return Err(bad());
        }
        let mut values = [0u64; 4];
        for (slot, raw) in values.iter_mut().zip(parts.iter().copied().chain([millis])) {
            *slot = raw.parse().map_err(|_| bad())?;
        }
        Self::from_parts(values[0], values[1], values[2], values[3]).ok_or_else(bad)
    }
}

/// One timed caption entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cue {
    pub index: u32,
    pub start: Timestamp,
    pub end: Timestamp,
    /// One or more lines, joined with `\n`.
    pub text: String,
}

impl Cue {
    /// Builds a cue, dropping blank lines and trailing whitespace from `text`.
    pub fn new<S: AsRef<str>>(index: u32, start: Timestamp, end: Timestamp, text: S) -> Self {
        let text = text
            .as_ref()
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            index,
            start,
            end,
            text,
        }
    }

    pub fn same_timing(&self, other: &Cue) -> bool {
        self.start == other.start && self.end == other.end
    }
}

/// Ordered, timestamp-consistent sequence of cues.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleTrack {
    cues: Vec<Cue>,
}

impl SubtitleTrack {
    /// Validates indices, timing and text before accepting the cues.
    ///
    /// Cue text is normalized the way [`Cue::new`] does it, so every accepted
    /// track serializes to SRT that parses back to the same track.
    pub fn new(cues: Vec<Cue>) -> Result<Self> {
        let cues: Vec<Cue> = cues
            .into_iter()
            .map(|cue| Cue::new(cue.index, cue.start, cue.end, cue.text))
            .collect();
        let mut previous: Option<&Cue> = None;
        for (position, cue) in cues.iter().enumerate() {
            let block = position + 1;
            if cue.index as usize != block {
                return Err(BabelError::malformed(
                    block,
                    format!("expected index {}, found {}", block, cue.index),
                ));
            }
            if cue.start >= cue.end {
                return Err(BabelError::malformed(
                    block,
                    format!("start {} is not before end {}", cue.start, cue.end),
                ));
            }
            if cue.text.trim().is_empty() {
                return Err(BabelError::malformed(block, "cue has no text lines"));
            }
            if let Some(prev) = previous {
                if prev.end > cue.start {
                    return Err(BabelError::malformed(
                        block,
                        format!("starts at {} before previous cue ends at {}", cue.start, prev.end),
                    ));
                }
            }
            previous = Some(cue);
        }
        Ok(Self { cues })
    }

    pub fn cues(&self) -> &[Cue] {
        &self.cues
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    /// Copy of this track with each cue's text replaced, timing untouched.
    pub fn with_texts<I, S>(&self, texts: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let texts: Vec<S> = texts.into_iter().collect();
        if texts.len() != self.cues.len() {
            return Err(BabelError::StructuralMismatch {
                expected: self.cues.len(),
                actual: texts.len(),
                detail: "replacement text count differs from cue count".to_string(),
            });
        }
        let cues = self
            .cues
            .iter()
            .zip(texts)
            .map(|(cue, text)| Cue::new(cue.index, cue.start, cue.end, text))
            .collect();
        Self::new(cues)
    }

    pub fn to_srt(&self) -> String {
        serialize(self)
    }

    pub fn plain_text(&self) -> String {
        extract_plain_text(&serialize(self))
    }

    pub async fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        debug!("Writing {} cues to {}", self.cues.len(), path.display());
        fs::write(path, serialize(self)).await?;
        Ok(())
    }

    pub async fn read_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(BabelError::FileNotFound(path.display().to_string()));
        }
        let raw = fs::read_to_string(path).await?;
        parse(&raw)
    }
}

impl FromStr for SubtitleTrack {
    type Err = BabelError;

    fn from_str(s: &str) -> Result<Self> {
        parse(s)
    }
}

/// Parse blank-line separated SRT blocks.
pub fn parse(raw: &str) -> Result<SubtitleTrack> {
    let raw = raw.trim_start_matches('\u{feff}');
    let mut cues = Vec::new();
    let mut block: Vec<&str> = Vec::new();

    for line in raw.lines().map(|l| l.trim_end_matches('\r')) {
        if line.trim().is_empty() {
            if !block.is_empty() {
                cues.push(parse_block(cues.len() + 1, &block)?);
                block.clear();
            }
        } else {
            block.push(line);
        }
    }
    if !block.is_empty() {
        cues.push(parse_block(cues.len() + 1, &block)?);
    }

    SubtitleTrack::new(cues)
}

fn parse_block(block_no: usize, lines: &[&str]) -> Result<Cue> {
    let index_line = lines[0].trim();
    if !INDEX_LINE.is_match(index_line) {
        return Err(BabelError::malformed(
            block_no,
            format!("index line '{}' is not numeric", index_line),
        ));
    }
    let index: u32 = index_line
        .parse()
        .map_err(|_| BabelError::malformed(block_no, format!("index '{}' out of range", index_line)))?;

    let timing_line = lines
        .get(1)
        .map(|l| l.trim())
        .ok_or_else(|| BabelError::malformed(block_no, "missing timestamp line"))?;
    let (start, end) = parse_timing(timing_line)
        .ok_or_else(|| BabelError::malformed(block_no, format!("bad timestamp line '{}'", timing_line)))?;

    let text = &lines[2..];
    if text.is_empty() {
        return Err(BabelError::malformed(block_no, "cue has no text lines"));
    }

    Ok(Cue::new(index, start, end, text.join("\n")))
}

fn parse_timing(line: &str) -> Option<(Timestamp, Timestamp)> {
    let caps = TIMING_LINE.captures(line)?;
    let field = |i: usize| caps[i].parse::<u64>().ok();
    let start = Timestamp::from_parts(field(1)?, field(2)?, field(3)?, field(4)?)?;
    let end = Timestamp::from_parts(field(5)?, field(6)?, field(7)?, field(8)?)?;
    Some((start, end))
}

/// Inverse of [`parse`].
pub fn serialize(track: &SubtitleTrack) -> String {
    let mut srt = String::new();
    for cue in &track.cues {
        srt.push_str(&format!("{}\n{} --> {}\n{}\n\n", cue.index, cue.start, cue.end, cue.text));
    }
    srt
}

/// Strips cue headers and joins the remaining non-empty lines with single spaces.
///
/// Every timing line is dropped, and so is a numeric line directly followed by
/// one. Lines are matched one by one, so this accepts raw, partially broken,
/// or already plain text.
pub fn extract_plain_text(raw: &str) -> String {
    let lines: Vec<&str> = raw.trim().lines().map(str::trim).collect();
    let mut text_lines = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let is_header = INDEX_LINE.is_match(line)
            && lines.get(i + 1).is_some_and(|next| TIMING_LINE.is_match(next));
        if is_header {
            i += 2;
            continue;
        }
        if !line.is_empty() && !TIMING_LINE.is_match(line) {
            text_lines.push(line);
        }
        i += 1;
    }

    text_lines.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_CUES: &str = "1\n00:00:00,000 --> 00:00:01,000\nHello\n\n2\n00:00:01,000 --> 00:00:02,000\nWorld\n";

    #[test]
    fn test_timestamp_display() {
        assert_eq!(Timestamp::from_millis(0).to_string(), "00:00:00,000");
        assert_eq!(Timestamp::from_millis(65_123).to_string(), "00:01:05,123");
        assert_eq!(Timestamp::from_millis(3_661_500).to_string(), "01:01:01,500");
    }

    #[test]
    fn test_timestamp_from_str() {
        let ts: Timestamp = "01:01:01,500".parse().unwrap();
        assert_eq!(ts.as_millis(), 3_661_500);
        assert!("1:01:01,500".parse::<Timestamp>().is_err());
        assert!("00:61:00,000".parse::<Timestamp>().is_err());
        assert_eq!(Timestamp::from_parts(0, 0, 75, 0), None);
        assert_eq!(Timestamp::from_millis(u64::MAX), Timestamp::MAX);
    }

    #[test]
    fn test_parse_rejects_out_of_range_timestamp_fields() {
        let seconds = parse("1\n00:00:75,000 --> 00:01:20,000\nHello\n").unwrap_err();
        assert!(matches!(seconds, BabelError::MalformedSubtitle { block: 1, .. }));
        let minutes = parse("1\n00:00:01,000 --> 00:60:00,000\nHello\n").unwrap_err();
        assert!(matches!(minutes, BabelError::MalformedSubtitle { block: 1, .. }));
    }

    #[test]
    fn test_parse_two_cues() {
        let track = parse(TWO_CUES).unwrap();
        assert_eq!(track.len(), 2);
        assert_eq!(track.cues()[0].text, "Hello");
        assert_eq!(track.cues()[1].start.as_millis(), 1_000);
        assert_eq!(track.cues()[1].end.as_millis(), 2_000);
    }

    #[test]
    fn test_parse_tolerates_crlf_bom_and_extra_blank_lines() {
        let raw = "\u{feff}1\r\n00:00:00,000 --> 00:00:01,500\r\nline one\r\nline two\r\n\r\n\r\n\r\n2\r\n00:00:02,000 --> 00:00:03,000\r\nnext\r\n";
        let track = parse(raw).unwrap();
        assert_eq!(track.len(), 2);
        assert_eq!(track.cues()[0].text, "line one\nline two");
    }

    #[test]
    fn test_parse_empty_input_is_empty_track() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("\n\n  \n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_non_numeric_index() {
        let err = parse("one\n00:00:00,000 --> 00:00:01,000\nHello\n").unwrap_err();
        assert!(matches!(err, BabelError::MalformedSubtitle { block: 1, .. }));
    }

    #[test]
    fn test_parse_rejects_bad_timestamp_line() {
        let err = parse("1\n00:00:00.000 --> 00:00:01.000\nHello\n").unwrap_err();
        assert!(matches!(err, BabelError::MalformedSubtitle { .. }));
    }

    #[test]
    fn test_parse_rejects_block_without_text() {
        let err = parse("1\n00:00:00,000 --> 00:00:01,000\n\n2\n00:00:01,000 --> 00:00:02,000\nx\n")
            .unwrap_err();
        assert!(matches!(err, BabelError::MalformedSubtitle { block: 1, .. }));
    }

    #[test]
    fn test_parse_rejects_overlap_and_inverted_timing() {
        let overlap = "1\n00:00:00,000 --> 00:00:02,000\na\n\n2\n00:00:01,000 --> 00:00:03,000\nb\n";
        assert!(parse(overlap).is_err());
        let inverted = "1\n00:00:02,000 --> 00:00:01,000\na\n";
        assert!(parse(inverted).is_err());
    }

    #[test]
    fn test_parse_rejects_non_contiguous_index() {
        let raw = "1\n00:00:00,000 --> 00:00:01,000\na\n\n3\n00:00:01,000 --> 00:00:02,000\nb\n";
        assert!(matches!(
            parse(raw).unwrap_err(),
            BabelError::MalformedSubtitle { block: 2, .. }
        ));
    }

    #[test]
    fn test_parsed_timing_is_monotonic() {
        let raw = "1\n00:00:00,000 --> 00:00:01,000\na\n\n2\n00:00:01,000 --> 00:00:04,250\nb\n\n3\n00:00:05,000 --> 00:00:06,000\nc\n";
        let track = parse(raw).unwrap();
        for cue in track.cues() {
            assert!(cue.start < cue.end);
        }
        for pair in track.cues().windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
    }

    #[test]
    fn test_round_trip() {
        let raw = "1\n00:00:00,000 --> 00:00:01,000\nHello\nthere\n\n2\n00:59:59,999 --> 01:00:00,000\n42\n";
        let track = parse(raw).unwrap();
        assert_eq!(parse(&serialize(&track)).unwrap(), track);
        assert_eq!(serialize(&track), format!("{}\n", raw));
    }

    #[test]
    fn test_extract_plain_text() {
        assert_eq!(extract_plain_text(TWO_CUES), "Hello World");
    }

    #[test]
    fn test_extract_plain_text_drops_stray_timing_lines() {
        let raw = "00:00:00,000 --> 00:00:01,000\nHello\n\n00:00:01,000 --> 00:00:02,000\nWorld\n";
        assert_eq!(extract_plain_text(raw), "Hello World");
    }

    #[test]
    fn test_constructed_track_round_trips() {
        let cue = |index, start, end, text: &str| Cue {
            index,
            start: Timestamp::from_millis(start),
            end: Timestamp::from_millis(end),
            text: text.to_string(),
        };
        let track = SubtitleTrack::new(vec![
            cue(1, 0, 1_000, "Hello\n\nWorld"),
            cue(2, 1_000, 2_000, "Hello\n"),
            cue(3, 2_000, 3_000, "  indented  \n \nsecond line"),
        ])
        .unwrap();

        assert_eq!(track.cues()[0].text, "Hello\nWorld");
        assert_eq!(track.cues()[1].text, "Hello");
        assert_eq!(parse(&serialize(&track)).unwrap(), track);
    }

    #[test]
    fn test_extract_plain_text_matches_for_raw_and_track() {
        let raw = "1\n00:00:00,000 --> 00:00:01,000\n  Hello  \nagain\n\n2\n00:00:01,000 --> 00:00:02,000\nWorld\n";
        let track = parse(raw).unwrap();
        assert_eq!(track.plain_text(), extract_plain_text(raw));
    }

    #[test]
    fn test_extract_plain_text_is_idempotent() {
        let inputs = [
            TWO_CUES,
            "1\n00:00:00,000 --> 00:00:01,000\n42\n",
            "1\n00:00:00,000 --> 00:00:01,000\n00:00:05,000 --> 00:00:06,000\n",
            "already plain text",
            "7",
            "",
            "  spaced   out  \n\n second  ",
        ];
        for input in inputs {
            let once = extract_plain_text(input);
            assert_eq!(extract_plain_text(&once), once, "input: {:?}", input);
        }
    }

    #[test]
    fn test_with_texts_keeps_timing() {
        let track = parse(TWO_CUES).unwrap();
        let translated = track.with_texts(["Bonjour", "Monde"]).unwrap();
        assert_eq!(translated.len(), 2);
        for (a, b) in track.cues().iter().zip(translated.cues()) {
            assert!(a.same_timing(b));
            assert_eq!(a.index, b.index);
        }
        assert!(track.with_texts(["only one"]).is_err());
    }

    #[tokio::test]
    async fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fr_subtitle.srt");
        let track = parse(TWO_CUES).unwrap();
        track.write_to(&path).await.unwrap();
        assert_eq!(SubtitleTrack::read_from(&path).await.unwrap(), track);
    }
}
