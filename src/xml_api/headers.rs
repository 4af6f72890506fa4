//! Spoofed request headers
//!
//! The XML API only answers requests that look like they come from the
//! site's Flash video player. Changing the emulated client is a single edit
//! to this table.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// Flash player version the header table emulates
pub const FLASH_PLAYER_VERSION: &str = "19.0.0.245";

/// Headers attached to every XML API request, names in lowercase
pub const FLASH_PLAYER_HEADERS: &[(&str, &str)] = &[
    ("host", "www.crunchyroll.com"),
    ("origin", "http://static.ak.crunchyroll.com"),
    ("content-type", "application/x-www-form-urlencoded"),
    (
        "referer",
        "http://static.ak.crunchyroll.com/versioned_assets/StandardVideoPlayer.fb2c7182.swf",
    ),
    (
        "user-agent",
        "Mozilla/5.0 (Windows NT 10.0; WOW64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/46.0.2490.86 Safari/537.36",
    ),
    ("x-requested-with", "ShockwaveFlash/19.0.0.245"),
];

/// Builds a header map from [`FLASH_PLAYER_HEADERS`]
pub(crate) fn flash_player_headers() -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(FLASH_PLAYER_HEADERS.len());
    for (name, value) in FLASH_PLAYER_HEADERS {
        headers.insert(
            HeaderName::from_static(*name),
            HeaderValue::from_static(*value),
        );
    }
    headers
}
