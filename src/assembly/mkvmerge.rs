//! MKV merging with mkvmerge

use super::{ContainerMerger, EpisodeTempFiles, TempArtifact};
use crate::BoxError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// Container merger running the external `mkvmerge` binary
///
/// # Examples
///
/// ```no_run
/// use crunchyroll_dl::MkvMerger;
/// use std::path::PathBuf;
///
/// // Create with explicit path
/// let merger = MkvMerger::new(PathBuf::from("/usr/bin/mkvmerge"));
///
/// // Or auto-discover from PATH
/// let merger = MkvMerger::from_path().expect("mkvmerge not found in PATH");
/// ```
#[derive(Debug, Clone)]
pub struct MkvMerger {
    binary_path: PathBuf,
}

impl MkvMerger {
    /// Create a merger with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Attempt to find mkvmerge in PATH
    pub fn from_path() -> Option<Self> {
        which::which("mkvmerge").ok().map(Self::new)
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Builds the mkvmerge command line
    ///
    /// The subtitle track and the timecodes are only passed when the
    /// corresponding files exist; video and audio are always required.
    fn merge_args(files: &EpisodeTempFiles, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-o".into(), output.into()];

        let subtitle = files.path(TempArtifact::Subtitle);
        if subtitle.is_file() {
            args.push("--language".into());
            args.push("0:eng".into());
            args.push(subtitle.into());
        }

        let timecodes = files.path(TempArtifact::Timecodes);
        if timecodes.is_file() {
            let mut spec = OsString::from("0:");
            spec.push(&timecodes);
            args.push("--timestamps".into());
            args.push(spec);
        }

        args.push(files.path(TempArtifact::Video).into());
        args.push(files.path(TempArtifact::Audio).into());
        args
    }
}

impl ContainerMerger for MkvMerger {
    fn merge(&self, files: &EpisodeTempFiles, output: &Path) -> Result<(), BoxError> {
        let args = Self::merge_args(files, output);
        debug!(binary = %self.binary_path.display(), args = ?args, "Running mkvmerge");

        let result = Command::new(&self.binary_path)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| format!("Failed to execute mkvmerge: {e}"))?;

        // Exit code 1 means the file was written with warnings
        match result.status.code() {
            Some(0) | Some(1) => Ok(()),
            code => {
                // mkvmerge reports its errors on stdout
                let stdout = String::from_utf8_lossy(&result.stdout);
                Err(format!("mkvmerge failed with exit code {code:?}: {}", stdout.trim()).into())
            }
        }
    }
}
