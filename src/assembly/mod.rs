//! Media assembly pipeline
//!
//! Turns the raw FLV stream of an episode into a finished MKV container:
//! split the stream into its tracks, merge the tracks, then remove the
//! intermediates. Each stage only runs when the previous one succeeded.

mod ffmpeg;
mod mkvmerge;
mod temp_files;

pub use ffmpeg::FfmpegSplitter;
pub use mkvmerge::MkvMerger;
pub use temp_files::{CleanupReport, EpisodeTempFiles, TempArtifact};

use crate::xml_api::Episode;
use crate::{BoxError, CrError, ErrorStage};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Splits a combined FLV stream into its component tracks
pub trait StreamSplitter {
    /// Reads [`TempArtifact::Source`] and writes the track artifacts next to it
    fn split(&self, files: &EpisodeTempFiles) -> Result<(), BoxError>;
}

/// Merges split tracks into a single container
pub trait ContainerMerger {
    /// Writes the container to `output`
    fn merge(&self, files: &EpisodeTempFiles, output: &Path) -> Result<(), BoxError>;
}

/// Pipeline stage, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyStage {
    Split,
    Merge,
    Cleanup,
}

impl fmt::Display for AssemblyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssemblyStage::Split => f.write_str("split"),
            AssemblyStage::Merge => f.write_str("merge"),
            AssemblyStage::Cleanup => f.write_str("cleanup"),
        }
    }
}

/// Progress event emitted while assembling an episode
#[derive(Debug, Clone, PartialEq)]
pub enum AssemblyEvent {
    /// A stage is about to run
    StageStarted(AssemblyStage),
    /// All stages completed
    Finished { output: PathBuf },
}

/// A finished episode
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledEpisode {
    /// Path of the merged container
    pub output: PathBuf,
    /// What the advisory cleanup did
    pub cleanup: CleanupReport,
}

/// Sequences split, merge and cleanup for one episode at a time
pub struct MediaAssembler<S, M> {
    splitter: S,
    merger: M,
    temp_dir: PathBuf,
    output_dir: PathBuf,
}

impl<S, M> MediaAssembler<S, M>
where
    S: StreamSplitter,
    M: ContainerMerger,
{
    /// Creates an assembler
    ///
    /// # Arguments
    ///
    /// * `splitter` - Demuxes the raw FLV into elementary streams
    /// * `merger` - Muxes the streams and subtitle into the final container
    /// * `temp_dir` - Directory holding the per-episode temporary artifacts
    /// * `output_dir` - Directory the finished `.mkv` files are written to
    pub fn new(
        splitter: S,
        merger: M,
        temp_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            splitter,
            merger,
            temp_dir: temp_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Temporary files for an episode named `file_name`
    pub fn temp_files(&self, file_name: &str) -> EpisodeTempFiles {
        EpisodeTempFiles::new(&self.temp_dir, file_name)
    }

    /// Path of the container produced for `file_name`
    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(format!("{file_name}.mkv"))
    }

    /// Splits, merges and cleans up one episode
    ///
    /// The first failing stage ends the run and its error is returned; split
    /// artifacts are left on disk when merging fails. `cancel` is checked
    /// before splitting and before merging. Cleanup always runs after a
    /// successful merge and never fails the operation.
    ///
    /// # Arguments
    ///
    /// * `file_name` - Base name shared by the temporary artifacts and the output
    /// * `episode` - The episode being assembled, used for logging
    /// * `cancel` - Token stopping the run before its next stage
    /// * `progress_callback` - Receives an event when a stage starts and when the run finishes
    ///
    /// # Returns
    ///
    /// The output path and the cleanup report, or the error of the first
    /// failing stage tagged `Split`, `Merge` or `Cancelled`
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use crunchyroll_dl::{Episode, FfmpegSplitter, MediaAssembler, MkvMerger};
    /// use tokio_util::sync::CancellationToken;
    ///
    /// let assembler = MediaAssembler::new(
    ///     FfmpegSplitter::new(),
    ///     MkvMerger::from_path().unwrap(),
    ///     "temp",
    ///     ".",
    /// );
    /// let episode = Episode::default();
    /// let assembled = assembler
    ///     .assemble_episode("Show - S01E02 - Desc", &episode, &CancellationToken::new(), |_| {})
    ///     .unwrap();
    /// println!("{}", assembled.output.display());
    /// ```
    pub fn assemble_episode<F>(
        &self,
        file_name: &str,
        episode: &Episode,
        cancel: &CancellationToken,
        mut progress_callback: F,
    ) -> Result<AssembledEpisode, CrError>
    where
        F: FnMut(AssemblyEvent),
    {
        let files = self.temp_files(file_name);
        let output = self.output_path(file_name);

        if cancel.is_cancelled() {
            return Err(CrError::bare(ErrorStage::Cancelled));
        }
        progress_callback(AssemblyEvent::StageStarted(AssemblyStage::Split));
        info!(media_id = episode.id, file = file_name, "Splitting FLV");
        self.splitter
            .split(&files)
            .map_err(|e| CrError::new(ErrorStage::Split, e))?;

        if cancel.is_cancelled() {
            return Err(CrError::bare(ErrorStage::Cancelled));
        }
        progress_callback(AssemblyEvent::StageStarted(AssemblyStage::Merge));
        info!(media_id = episode.id, output = %output.display(), "Merging MKV");
        self.merger
            .merge(&files, &output)
            .map_err(|e| CrError::new(ErrorStage::Merge, e))?;

        progress_callback(AssemblyEvent::StageStarted(AssemblyStage::Cleanup));
        let cleanup = files.cleanup();
        info!(
            media_id = episode.id,
            removed = cleanup.removed,
            "Removed temporary files"
        );

        progress_callback(AssemblyEvent::Finished {
            output: output.clone(),
        });

        Ok(AssembledEpisode { output, cleanup })
    }
}
