//! Request construction for the legacy Crunchyroll XML API.
//!
//! This module maps a logical request kind onto the query parameters the
//! site expects, and defines the trait implemented by everything that can
//! produce a raw XML descriptor for an episode.

mod cached;
mod client;
mod headers;

pub use cached::CachedDescriptorSource;
pub use client::{DEFAULT_ENDPOINT, XmlApiClient};
pub use headers::{FLASH_PLAYER_HEADERS, FLASH_PLAYER_VERSION};

use crate::{CrError, SessionContext};
use serde::{Deserialize, Serialize};
use std::fmt;

/// `req` value of the subtitle script request
pub const SUBTITLE_REQUEST: &str = "RpcApiSubtitle_GetXml";
/// `req` value of the standard video player configuration request
pub const STANDARD_CONFIG_REQUEST: &str = "RpcApiVideoPlayer_GetStandardConfig";
/// `req` value used for the stream info request, the default transcode request
pub const STREAM_INFO_REQUEST: &str = "RpcApiVideoEncode_GetStreamInfo";

const VIDEO_FORMAT: &str = "108";
const VIDEO_QUALITY: &str = "80";
const AFFILIATE: &str = "crunchyroll-website";

/// The subtitle track attached to an episode
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtitle {
    /// Subtitle script identifier
    pub id: u64,
}

/// An episode as seen by the request layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    /// Media identifier
    pub id: u64,
    /// Page the request claims to originate from
    pub url: String,
    /// Only meaningful for subtitle requests
    pub subtitle: Subtitle,
}

/// The kind of descriptor to request from the XML API
///
/// `Transcode` is the fallback shape: any request name that is not one of
/// the two known ones is sent with the generic transcode parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Subtitle script for `Episode::subtitle`
    SubtitleDescriptor,
    /// Standard video player configuration
    StandardPlayerConfig,
    /// Generic transcode configuration, sent with the given `req` name
    Transcode(String),
}

impl RequestKind {
    /// Maps a raw `req` name onto a request kind
    pub fn from_name(name: &str) -> Self {
        match name {
            SUBTITLE_REQUEST => RequestKind::SubtitleDescriptor,
            STANDARD_CONFIG_REQUEST => RequestKind::StandardPlayerConfig,
            other => RequestKind::Transcode(other.to_string()),
        }
    }

    /// The `req` value sent for this kind
    pub fn request_name(&self) -> &str {
        match self {
            RequestKind::SubtitleDescriptor => SUBTITLE_REQUEST,
            RequestKind::StandardPlayerConfig => STANDARD_CONFIG_REQUEST,
            RequestKind::Transcode(name) => name.as_str(),
        }
    }
}

impl Default for RequestKind {
    fn default() -> Self {
        RequestKind::Transcode(STREAM_INFO_REQUEST.to_string())
    }
}

impl From<&str> for RequestKind {
    fn from(name: &str) -> Self {
        RequestKind::from_name(name)
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.request_name())
    }
}

/// Builds the query parameters for a request
///
/// This is a pure function of the request kind and the episode.
pub fn query_params(kind: &RequestKind, episode: &Episode) -> Vec<(&'static str, String)> {
    match kind {
        RequestKind::SubtitleDescriptor => vec![
            ("req", SUBTITLE_REQUEST.to_string()),
            ("subtitle_script_id", episode.subtitle.id.to_string()),
        ],
        RequestKind::StandardPlayerConfig => vec![
            ("req", STANDARD_CONFIG_REQUEST.to_string()),
            ("media_id", episode.id.to_string()),
            ("video_format", VIDEO_FORMAT.to_string()),
            ("video_quality", VIDEO_QUALITY.to_string()),
            ("auto_play", "1".to_string()),
            ("aff", AFFILIATE.to_string()),
            ("show_pop_out_controls", "1".to_string()),
            ("pop_out_disable_message", String::new()),
            ("click_through", "0".to_string()),
        ],
        RequestKind::Transcode(name) => vec![
            ("req", name.clone()),
            ("media_id", episode.id.to_string()),
            ("video_format", VIDEO_FORMAT.to_string()),
            ("video_encode_quality", VIDEO_QUALITY.to_string()),
        ],
    }
}

/// A descriptor response as received, status included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorResponse {
    /// HTTP status code
    pub status: u16,
    /// Unparsed response body
    pub body: String,
}

impl DescriptorResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Whether the response carries a real descriptor
    ///
    /// The API reports failures either through a non-2xx status or through a
    /// 2xx response whose document is an `<error>` element. Neither may be
    /// stored in a cache.
    pub fn is_cacheable(&self) -> bool {
        (200..300).contains(&self.status) && !self.body.trim_start().starts_with("<error")
    }
}

/// Anything that can produce the raw XML descriptor for an episode
pub trait DescriptorSource {
    /// Fetches one descriptor, keeping the status next to the raw body
    fn fetch_response(
        &self,
        kind: &RequestKind,
        episode: &Episode,
        session: &SessionContext,
    ) -> Result<DescriptorResponse, CrError>;

    /// Fetches one descriptor and returns the unparsed response body
    ///
    /// The body is returned whatever the status was.
    fn fetch_descriptor(
        &self,
        kind: &RequestKind,
        episode: &Episode,
        session: &SessionContext,
    ) -> Result<String, CrError> {
        self.fetch_response(kind, episode, session)
            .map(|response| response.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episode() -> Episode {
        Episode {
            id: 645_123,
            url: "/show/episode-1-645123".to_string(),
            subtitle: Subtitle { id: 77 },
        }
    }

    fn keys(params: &[(&'static str, String)]) -> Vec<&'static str> {
        params.iter().map(|(k, _)| *k).collect()
    }

    #[test]
    fn test_subtitle_params() {
        let params = query_params(&RequestKind::SubtitleDescriptor, &episode());

        assert_eq!(
            params,
            vec![
                ("req", "RpcApiSubtitle_GetXml".to_string()),
                ("subtitle_script_id", "77".to_string()),
            ]
        );
    }

    #[test]
    fn test_standard_config_params() {
        let params = query_params(&RequestKind::StandardPlayerConfig, &episode());

        assert_eq!(
            keys(&params),
            vec![
                "req",
                "media_id",
                "video_format",
                "video_quality",
                "auto_play",
                "aff",
                "show_pop_out_controls",
                "pop_out_disable_message",
                "click_through",
            ]
        );
        assert!(params.contains(&("req", "RpcApiVideoPlayer_GetStandardConfig".to_string())));
        assert!(params.contains(&("media_id", "645123".to_string())));
        assert!(params.contains(&("video_format", "108".to_string())));
        assert!(params.contains(&("video_quality", "80".to_string())));
        assert!(params.contains(&("auto_play", "1".to_string())));
        assert!(params.contains(&("aff", "crunchyroll-website".to_string())));
        assert!(params.contains(&("pop_out_disable_message", String::new())));
    }

    #[test]
    fn test_unknown_name_falls_back_to_transcode_shape() {
        let kind = RequestKind::from_name("RpcApiVideoEncode_GetStreamInfo");
        assert_eq!(kind, RequestKind::default());

        let kind = RequestKind::from_name("SomethingElse");
        let params = query_params(&kind, &episode());

        assert_eq!(
            params,
            vec![
                ("req", "SomethingElse".to_string()),
                ("media_id", "645123".to_string()),
                ("video_format", "108".to_string()),
                ("video_encode_quality", "80".to_string()),
            ]
        );
    }

    #[test]
    fn test_response_cacheability() {
        assert!(DescriptorResponse::new(200, "<subtitle id=\"77\"/>").is_cacheable());
        assert!(DescriptorResponse::new(204, "").is_cacheable());
        assert!(!DescriptorResponse::new(503, "<error>maintenance</error>").is_cacheable());
        assert!(!DescriptorResponse::new(404, "<subtitle/>").is_cacheable());
        assert!(!DescriptorResponse::new(200, "  \n<error><code>bad_session</code></error>").is_cacheable());
        assert!(!DescriptorResponse::new(200, "<error/>").is_cacheable());
    }

    #[test]
    fn test_known_names_round_trip() {
        for kind in [RequestKind::SubtitleDescriptor, RequestKind::StandardPlayerConfig] {
            assert_eq!(RequestKind::from(kind.request_name()), kind);
        }
    }
}
