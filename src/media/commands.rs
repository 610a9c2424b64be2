use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::error::{BabelError, Result};

/// Abstract media processing command representation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
}

impl MediaCommand {
    /// Create a new media processing command
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    pub fn video_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:v").arg(codec)
    }

    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    /// Copy audio stream
    pub fn copy_audio(self) -> Self {
        self.audio_codec("copy")
    }

    /// Disable video
    pub fn no_video(self) -> Self {
        self.arg("-vn")
    }

    /// Add video filter
    pub fn video_filter<S: Into<String>>(self, filter: S) -> Self {
        self.arg("-vf").arg(filter)
    }

    /// Run the command, turning a nonzero exit into `ExternalTool` with stderr attached.
    ///
    /// The child is killed if the returned future is dropped before it exits.
    pub async fn execute(&self) -> Result<String> {
        debug!("Executing media processing command: {} {:?}", self.binary_path, self.args);
        debug!("Description: {}", self.description);

        let output = Command::new(&self.binary_path)
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| BabelError::ExternalTool {
                status: None,
                diagnostic: format!("{}: failed to execute {}: {}", self.description, self.binary_path, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BabelError::ExternalTool {
                status: output.status.code(),
                diagnostic: format!("{} failed: {}", self.description, last_lines(&stderr, 20)),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// ffmpeg prints its banner first; the cause is at the end.
fn last_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    lines[lines.len().saturating_sub(count)..].join("\n")
}

/// Escape a path for use as the `subtitles` filter argument.
pub fn escape_filter_path(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let mut escaped = String::with_capacity(raw.len() + 2);
    escaped.push('\'');
    for ch in raw.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            ':' => escaped.push_str("\\:"),
            '\'' => escaped.push_str("'\\''"),
            other => escaped.push(other),
        }
    }
    escaped.push('\'');
    escaped
}

/// Builder for common media processing operations
pub struct MediaCommandBuilder {
    binary_path: String,
}

impl MediaCommandBuilder {
    pub fn new<S: Into<String>>(binary_path: S) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    /// Burn-in: re-encode video with the subtitle overlay, copy audio unchanged.
    pub fn burn_subtitles<P: AsRef<Path>>(
        &self,
        video_path: P,
        subtitle_path: P,
        output_path: P,
        video_codec: Option<&str>,
        additional_options: &[String],
    ) -> MediaCommand {
        let mut cmd = MediaCommand::new(&self.binary_path, "Subtitle burn-in")
            .overwrite()
            .input(&video_path)
            .video_filter(format!("subtitles={}", escape_filter_path(subtitle_path.as_ref())));

        if let Some(codec) = video_codec {
            cmd = cmd.video_codec(codec);
        }

        cmd.copy_audio()
            .args(additional_options.iter().cloned())
            .output(output_path)
    }

    /// Audio extraction; the output extension selects the encoder.
    pub fn extract_audio<P: AsRef<Path>>(&self, video_path: P, audio_path: P) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Audio extraction")
            .overwrite()
            .input(video_path)
            .no_video()
            .output(audio_path)
    }

    pub fn version_check(&self) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Version check").arg("-version")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_burn_command_arguments() {
        let builder = MediaCommandBuilder::new("ffmpeg");
        let cmd = builder.burn_subtitles(
            PathBuf::from("/up/clip.mp4"),
            PathBuf::from("/up/fr_subtitle.srt"),
            PathBuf::from("/up/subtitled_fr_clip.mp4"),
            Some("libx264"),
            &["-crf".to_string(), "23".to_string()],
        );
        assert_eq!(cmd.binary_path, "ffmpeg");
        assert_eq!(
            cmd.args,
            vec![
                "-y",
                "-i",
                "/up/clip.mp4",
                "-vf",
                "subtitles='/up/fr_subtitle.srt'",
                "-c:v",
                "libx264",
                "-c:a",
                "copy",
                "-crf",
                "23",
                "/up/subtitled_fr_clip.mp4",
            ]
        );
    }

    #[test]
    fn test_extract_command_arguments() {
        let cmd = MediaCommandBuilder::new("ffmpeg")
            .extract_audio(PathBuf::from("a.mp4"), PathBuf::from("a.mp3"));
        assert_eq!(cmd.args, vec!["-y", "-i", "a.mp4", "-vn", "a.mp3"]);
    }

    #[test]
    fn test_escape_filter_path() {
        assert_eq!(escape_filter_path(Path::new("/tmp/a.srt")), "'/tmp/a.srt'");
        assert_eq!(escape_filter_path(Path::new("C:\\a b.srt")), "'C\\:\\\\a b.srt'");
    }

    #[test]
    fn test_last_lines_keeps_tail() {
        assert_eq!(last_lines("a\nb\nc\n", 2), "b\nc");
        assert_eq!(last_lines("only", 5), "only");
    }

    #[tokio::test]
    async fn test_execute_reports_exit_status() {
        let err = MediaCommand::new("false", "Failing tool")
            .execute()
            .await
            .unwrap_err();
        assert!(matches!(err, BabelError::ExternalTool { status: Some(1), .. }));
    }

    #[tokio::test]
    async fn test_execute_missing_binary() {
        let err = MediaCommand::new("definitely-not-a-real-binary-xyz", "Missing tool")
            .execute()
            .await
            .unwrap_err();
        assert!(matches!(err, BabelError::ExternalTool { status: None, .. }));
    }
}
