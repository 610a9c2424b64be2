//! babelsub - multilingual burned-in subtitles
//!
//! Turns an uploaded video into one subtitled video per language: the audio is
//! extracted with ffmpeg, transcribed by a speech-to-text service, the spoken
//! language is detected, the subtitles are translated by an LLM and finally
//! burned into the image stream.

pub mod artifacts;
pub mod audio;
pub mod burn;
pub mod cli;
pub mod config;
pub mod error;
pub mod external;
pub mod job;
pub mod language;
pub mod media;
pub mod subtitle;
pub mod transcribe;
pub mod translate;
pub mod workflow;
