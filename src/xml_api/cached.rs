//! Cached descriptor source
//!
//! Subtitle scripts never change once published, so their descriptors are
//! kept in a local cache. Player and transcode configurations embed
//! session-bound stream tokens and always go to the wrapped source.
//! Only successful responses are cached: a non-2xx status or an `<error>`
//! document is passed through and fetched again next time.

use super::{DescriptorResponse, DescriptorSource, Episode, RequestKind};
use crate::cache::CacheStorage;
use crate::{CrError, SessionContext};
use tracing::debug;

/// A caching wrapper for descriptor sources
pub struct CachedDescriptorSource<S>
where
    S: DescriptorSource,
{
    /// The underlying descriptor source
    source: S,
    /// Cache storage for raw descriptor bodies
    cache: CacheStorage<String>,
}

impl<S> CachedDescriptorSource<S>
where
    S: DescriptorSource,
{
    /// Creates a new cached source wrapping the given source
    ///
    /// # Arguments
    ///
    /// * `source` - The source asked on a cache miss
    /// * `cache` - Storage for subtitle descriptor bodies, its TTL decides
    ///   how long an entry is served
    ///
    /// # Returns
    ///
    /// A source that behaves like `source` apart from served cache hits
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let client = XmlApiClient::new()?;
    /// let cache = CacheStorage::open("descriptors", Some(Duration::from_secs(86400)))?;
    /// let cached = CachedDescriptorSource::new(client, cache);
    /// ```
    pub fn new(source: S, cache: CacheStorage<String>) -> Self {
        Self { source, cache }
    }

    /// Cache key for a request, `None` for kinds that are never cached
    fn cache_key(kind: &RequestKind, episode: &Episode) -> Option<String> {
        match kind {
            RequestKind::SubtitleDescriptor => Some(format!("subtitle_{}", episode.subtitle.id)),
            RequestKind::StandardPlayerConfig | RequestKind::Transcode(_) => None,
        }
    }
}

impl<S> DescriptorSource for CachedDescriptorSource<S>
where
    S: DescriptorSource,
{
    fn fetch_response(
        &self,
        kind: &RequestKind,
        episode: &Episode,
        session: &SessionContext,
    ) -> Result<DescriptorResponse, CrError> {
        let Some(cache_key) = Self::cache_key(kind, episode) else {
            return self.source.fetch_response(kind, episode, session);
        };

        match self.cache.load(&cache_key) {
            Ok(Some(body)) => {
                debug!(key = %cache_key, "Descriptor served from cache");
                return Ok(DescriptorResponse::new(200, body));
            }
            Ok(None) => {}
            Err(e) => {
                // A broken cache entry must not prevent the fetch
                debug!(key = %cache_key, error = %e, "Ignoring unreadable cache entry");
            }
        }

        let response = self.source.fetch_response(kind, episode, session)?;

        if !response.is_cacheable() {
            debug!(key = %cache_key, status = response.status, "Not caching failed descriptor");
        } else if let Err(e) = self.cache.store(&cache_key, &response.body) {
            debug!(key = %cache_key, error = %e, "Failed to cache descriptor");
        }

        Ok(response)
    }
}
