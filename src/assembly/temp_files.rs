//! Temporary per-episode files
//!
//! Every intermediate artifact of an episode lives at
//! `<temp dir>/<episode file name>.<ext>`. Removal is advisory: all five
//! candidates are attempted whether or not they were ever produced.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// An intermediate artifact produced while assembling an episode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempArtifact {
    /// ASS subtitle script
    Subtitle,
    /// H.264 elementary video stream
    Video,
    /// Video timecodes / stream info
    Timecodes,
    /// AAC audio stream
    Audio,
    /// Raw combined FLV stream as downloaded
    Source,
}

impl TempArtifact {
    /// All artifacts in cleanup order
    pub const ALL: [TempArtifact; 5] = [
        TempArtifact::Subtitle,
        TempArtifact::Video,
        TempArtifact::Timecodes,
        TempArtifact::Audio,
        TempArtifact::Source,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            TempArtifact::Subtitle => "ass",
            TempArtifact::Video => "264",
            TempArtifact::Timecodes => "txt",
            TempArtifact::Audio => "aac",
            TempArtifact::Source => "flv",
        }
    }
}

/// Outcome of the advisory cleanup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Every path a removal was attempted for, in order
    pub attempted: Vec<PathBuf>,
    /// Number of files that were actually removed
    pub removed: usize,
}

/// Paths of the temporary files belonging to one episode
#[derive(Debug, Clone)]
pub struct EpisodeTempFiles {
    dir: PathBuf,
    file_name: String,
}

impl EpisodeTempFiles {
    pub fn new(dir: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            file_name: file_name.into(),
        }
    }

    /// The episode file name all artifacts are named after
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the given artifact
    ///
    /// The extension is appended rather than substituted, so episode names
    /// containing dots are kept intact.
    pub fn path(&self, artifact: TempArtifact) -> PathBuf {
        self.dir
            .join(format!("{}.{}", self.file_name, artifact.extension()))
    }

    /// Removes every artifact, ignoring individual failures
    pub fn cleanup(&self) -> CleanupReport {
        let mut report = CleanupReport::default();

        for artifact in TempArtifact::ALL {
            let path = self.path(artifact);
            match fs::remove_file(&path) {
                Ok(()) => report.removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Could not remove temporary file");
                }
            }
            report.attempted.push(path);
        }

        report
    }
}
