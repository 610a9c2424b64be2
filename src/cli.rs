use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Transcribe, translate and burn subtitles for a single video
    Process {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,

        /// Target languages for translation (comma-separated codes)
        #[arg(short, long, default_value = "")]
        target_langs: String,

        /// Output directory for processed files
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Write the job report as JSON to this file
        #[arg(short, long)]
        report: Option<PathBuf>,
    },

    /// Process all video files in a directory
    Batch {
        /// Input directory containing video files
        #[arg(short, long)]
        input_dir: PathBuf,

        /// Target languages for translation (comma-separated codes)
        #[arg(short, long, default_value = "")]
        target_langs: String,

        /// Output directory for processed files
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Extract audio from video file
    Extract {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,

        /// Output audio file (defaults to a sibling of the video)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Transcribe audio to an SRT file
    Transcribe {
        /// Input audio file
        #[arg(short, long)]
        input: PathBuf,

        /// Output SRT file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Detect the language of a subtitle or text file
    Detect {
        /// Input SRT or plain-text file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Translate an SRT file, keeping its timing
    Translate {
        /// Input SRT file
        #[arg(short, long)]
        input: PathBuf,

        /// Output translated SRT file
        #[arg(short, long)]
        output: PathBuf,

        /// Target language code
        #[arg(short, long)]
        target_lang: String,
    },

    /// Burn an SRT file into a video
    Burn {
        /// Input video file
        #[arg(short, long)]
        video: PathBuf,

        /// Subtitle file
        #[arg(short, long)]
        subtitles: PathBuf,

        /// Language code of the subtitles
        #[arg(short, long)]
        language: String,

        /// Output directory (defaults to the configured output directory)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// List supported languages
    Languages,

    /// Write the default configuration file
    InitConfig {
        /// Destination file
        #[arg(short, long, default_value = "babelsub.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_arguments() {
        let args = Args::parse_from([
            "babelsub",
            "--verbose",
            "process",
            "--input",
            "talk.mp4",
            "--target-langs",
            "fr,de",
            "--report",
            "report.json",
        ]);
        assert!(args.verbose);
        match args.command {
            Commands::Process {
                input,
                target_langs,
                output_dir,
                report,
            } => {
                assert_eq!(input, PathBuf::from("talk.mp4"));
                assert_eq!(target_langs, "fr,de");
                assert!(output_dir.is_none());
                assert_eq!(report, Some(PathBuf::from("report.json")));
            }
            _ => panic!("expected process command"),
        }
    }

    #[test]
    fn test_translate_requires_target() {
        assert!(Args::try_parse_from(["babelsub", "translate", "-i", "a.srt", "-o", "b.srt"]).is_err());
    }
}
