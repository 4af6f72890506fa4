//! FLV splitting with ffmpeg
//!
//! Demuxes the downloaded FLV into an Annex-B H.264 elementary stream, the
//! video timestamps and an ADTS AAC stream, which is what the merger expects
//! next to the subtitle.

use super::{EpisodeTempFiles, StreamSplitter, TempArtifact};
use crate::BoxError;
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::{FfmpegEvent, LogLevel};
use std::path::PathBuf;
use tracing::debug;

/// Stream splitter running ffmpeg through `ffmpeg-sidecar`
#[derive(Debug, Clone, Default)]
pub struct FfmpegSplitter {
    /// Explicit ffmpeg binary, `None` uses the one found by ffmpeg-sidecar
    binary: Option<PathBuf>,
}

impl FfmpegSplitter {
    /// Uses the ffmpeg binary ffmpeg-sidecar resolves by default
    pub fn new() -> Self {
        Self { binary: None }
    }

    /// Uses an explicit ffmpeg binary
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: Some(binary.into()),
        }
    }

    /// Arguments that demux the source into the video, timecode and audio artifacts
    fn split_args(files: &EpisodeTempFiles) -> Vec<String> {
        let path = |artifact| files.path(artifact).to_string_lossy().into_owned();
        vec![
            "-i".to_string(),
            path(TempArtifact::Source),
            "-map".to_string(),
            "0:v:0".to_string(),
            "-c:v".to_string(),
            "copy".to_string(),
            "-bsf:v".to_string(),
            "h264_mp4toannexb".to_string(),
            "-f".to_string(),
            "h264".to_string(),
            path(TempArtifact::Video),
            "-map".to_string(),
            "0:v:0".to_string(),
            "-c:v".to_string(),
            "copy".to_string(),
            "-f".to_string(),
            "mkvtimestamp_v2".to_string(),
            path(TempArtifact::Timecodes),
            "-map".to_string(),
            "0:a:0".to_string(),
            "-c:a".to_string(),
            "copy".to_string(),
            "-f".to_string(),
            "adts".to_string(),
            path(TempArtifact::Audio),
        ]
    }
}

/// Collects the error and fatal lines ffmpeg reported
fn error_lines(events: impl IntoIterator<Item = FfmpegEvent>) -> Vec<String> {
    events
        .into_iter()
        .filter_map(|event| match event {
            FfmpegEvent::Error(message)
            | FfmpegEvent::Log(LogLevel::Error | LogLevel::Fatal, message) => Some(message),
            _ => None,
        })
        .collect()
}

impl StreamSplitter for FfmpegSplitter {
    fn split(&self, files: &EpisodeTempFiles) -> Result<(), BoxError> {
        let source = files.path(TempArtifact::Source);
        if !source.is_file() {
            return Err(format!("raw stream not found: {}", source.display()).into());
        }

        let mut command = match &self.binary {
            Some(binary) => FfmpegCommand::new_with_path(binary),
            None => FfmpegCommand::new(),
        };
        let args = Self::split_args(files);
        debug!(args = ?args, "Running ffmpeg");

        // Level prefixes let the event parser tell errors from other output
        let mut child = command
            .hide_banner()
            .overwrite()
            .args(["-loglevel", "level+warning", "-nostats"])
            .args(&args)
            .spawn()?;
        let errors = error_lines(child.iter()?);
        let status = child.wait()?;

        for line in &errors {
            debug!(line = %line, "ffmpeg reported an error");
        }

        if !status.success() {
            if errors.is_empty() {
                return Err(format!("ffmpeg exited with {status}").into());
            }
            return Err(format!("ffmpeg exited with {status}: {}", errors.join("; ")).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_split_args() {
        let files = EpisodeTempFiles::new("temp", "Show - S01E02 - Desc");
        let args = FfmpegSplitter::split_args(&files);

        let source = Path::new("temp").join("Show - S01E02 - Desc.flv");
        let video = Path::new("temp").join("Show - S01E02 - Desc.264");
        let timecodes = Path::new("temp").join("Show - S01E02 - Desc.txt");
        let audio = Path::new("temp").join("Show - S01E02 - Desc.aac");

        assert_eq!(args[0], "-i");
        assert_eq!(args[1], source.to_string_lossy());
        assert_eq!(args[10], video.to_string_lossy());
        assert_eq!(
            args[11..19],
            [
                "-map".to_string(),
                "0:v:0".to_string(),
                "-c:v".to_string(),
                "copy".to_string(),
                "-f".to_string(),
                "mkvtimestamp_v2".to_string(),
                timecodes.to_string_lossy().into_owned(),
                "-map".to_string(),
            ][..]
        );
        assert_eq!(args.last().unwrap(), &audio.to_string_lossy());
        assert!(args.windows(2).any(|w| w == ["-bsf:v", "h264_mp4toannexb"]));
    }

    #[test]
    fn test_error_lines() {
        let events = vec![
            FfmpegEvent::Log(LogLevel::Info, "Input #0, flv".to_string()),
            FfmpegEvent::Log(LogLevel::Warning, "non monotonic DTS".to_string()),
            FfmpegEvent::Log(LogLevel::Error, "Invalid data found".to_string()),
            FfmpegEvent::Error("Conversion failed!".to_string()),
            FfmpegEvent::Log(LogLevel::Fatal, "Out of memory".to_string()),
            FfmpegEvent::LogEOF,
            FfmpegEvent::Done,
        ];

        assert_eq!(
            error_lines(events),
            vec!["Invalid data found", "Conversion failed!", "Out of memory"]
        );
        assert!(error_lines(Vec::new()).is_empty());
    }

    #[test]
    fn test_split_requires_source() {
        let files = EpisodeTempFiles::new("/nonexistent/crunchyroll_dl", "episode");

        let err = FfmpegSplitter::new().split(&files).unwrap_err();
        assert!(err.to_string().starts_with("raw stream not found"));
    }
}
