//! crunchyroll_dl - Fetch episode descriptors and assemble episodes
//!
//! This library talks to the legacy Crunchyroll XML API on behalf of an
//! authenticated session and turns the downloaded raw FLV stream of an
//! episode into a finished MKV container.

pub mod assembly;
mod cache;
pub mod config;
mod naming;
mod prompt;
pub mod session;
pub mod xml_api;

use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

pub use assembly::{
    AssembledEpisode, AssemblyEvent, AssemblyStage, CleanupReport, ContainerMerger,
    EpisodeTempFiles, FfmpegSplitter, MediaAssembler, MkvMerger, StreamSplitter, TempArtifact,
};
pub use cache::{CacheError, CacheStorage};
pub use config::AppConfig;
pub use naming::{clean_file_name, episode_file_name};
pub use prompt::prompt;
pub use session::{AccountStatus, SessionContext, SessionCookie, SessionStore};
pub use xml_api::{
    CachedDescriptorSource, DescriptorResponse, DescriptorSource, Episode, RequestKind, Subtitle,
    XmlApiClient,
};

/// Boxed error used for causes coming from external collaborators
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// The stage at which an operation failed
///
/// Every failure in the crate carries exactly one of these labels, so the
/// top-level caller can tell which network call or pipeline stage broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStage {
    /// The XML API request could not be constructed
    BuildRequest,
    /// The XML API request could not be executed (transport, DNS, timeout)
    SendRequest,
    /// The XML API response body could not be read
    ReadResponse,
    /// The raw FLV stream could not be split into its tracks
    Split,
    /// The split tracks could not be merged into a container
    Merge,
    /// The operation was cancelled before the stage started
    Cancelled,
    /// Reading console input failed
    Prompt,
    /// Loading or storing the session failed
    Session,
    /// Loading the configuration failed
    Config,
}

impl ErrorStage {
    /// Human readable description of the failing stage
    pub fn description(self) -> &'static str {
        match self {
            ErrorStage::BuildRequest => "There was an error creating the XML API request",
            ErrorStage::SendRequest => "There was an error executing the XML API request",
            ErrorStage::ReadResponse => "There was an error reading the XML API response",
            ErrorStage::Split => "There was an error while trying to split the FLV",
            ErrorStage::Merge => "There was an issue while trying to merge the MKV",
            ErrorStage::Cancelled => "The operation was cancelled",
            ErrorStage::Prompt => "There was an error getting standard user input",
            ErrorStage::Session => "There was an error accessing the stored session",
            ErrorStage::Config => "There was an error loading the configuration",
        }
    }
}

impl fmt::Display for ErrorStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Stage-labelled error wrapping an optional underlying cause
///
/// Created where the failure happens and handed to the caller unchanged.
#[derive(Debug, Error)]
#[error("{}", render(.stage, .source))]
pub struct CrError {
    stage: ErrorStage,
    #[source]
    source: Option<BoxError>,
}

impl CrError {
    /// Wraps `cause` with the given stage label
    pub fn new(stage: ErrorStage, cause: impl Into<BoxError>) -> Self {
        Self {
            stage,
            source: Some(cause.into()),
        }
    }

    /// Creates an error that has no underlying cause
    pub fn bare(stage: ErrorStage) -> Self {
        Self {
            stage,
            source: None,
        }
    }

    /// The stage this error originated from
    pub fn stage(&self) -> ErrorStage {
        self.stage
    }
}

fn render(stage: &ErrorStage, source: &Option<BoxError>) -> String {
    match source {
        Some(cause) => format!("{stage}: {cause}"),
        None => format!("{stage}."),
    }
}

/// Convenience alias for `Result<T, CrError>`
pub type Result<T> = std::result::Result<T, CrError>;
