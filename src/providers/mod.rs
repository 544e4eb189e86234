// Catalog provider contracts and clients
//
// Every catalog (AniList, TMDB, Kitsu, Jikan, MangaDex) implements
// MetadataProvider. Clients translate HTTP and decode failures into the
// engine's failure taxonomy and do no retrying or pacing of their own;
// resilience policy lives in the retry executor and rate limiter so it is
// applied uniformly.

pub mod anilist;
pub mod jikan;
pub mod kitsu;
pub mod mangadex;
pub mod tmdb;

pub use anilist::AniListProvider;
pub use jikan::JikanProvider;
pub use kitsu::KitsuProvider;
pub use mangadex::MangaDexProvider;
pub use tmdb::TmdbProvider;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ProviderFailure;
use crate::models::{
    ChapterFragment, EpisodeFragment, MediaDetailFragment, MediaKind, MediaSummary, ProviderId,
    ProviderPage,
};

/// Uniform async interface over one external catalog.
///
/// Implementations are shared across tasks behind an `Arc`. Search results
/// carry no confidence score; scoring a candidate against the source title
/// is the identity matcher's job.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Short lowercase identifier ("anilist", "tmdb", ...).
    fn name(&self) -> &'static str;

    fn id(&self) -> ProviderId {
        ProviderId::from(self.name())
    }

    /// Whether the provider is configured and ready (e.g. has an API key).
    fn is_available(&self) -> bool {
        true
    }

    /// Search the catalog for titles matching `query`.
    async fn search(
        &self,
        query: &str,
        kind: MediaKind,
        page: u32,
        per_page: u32,
    ) -> Result<ProviderPage<MediaSummary>, ProviderFailure>;

    /// Fetch the full detail fragment for one title.
    async fn fetch_details(
        &self,
        media_id: &str,
        kind: MediaKind,
    ) -> Result<MediaDetailFragment, ProviderFailure>;

    /// Episode list for one title. Catalogs without episode-level data
    /// return an empty list.
    async fn fetch_episodes(&self, _media_id: &str) -> Result<Vec<EpisodeFragment>, ProviderFailure> {
        Ok(Vec::new())
    }

    /// Chapter list for one title. Catalogs without chapter-level data
    /// return an empty list.
    async fn fetch_chapters(&self, _media_id: &str) -> Result<Vec<ChapterFragment>, ProviderFailure> {
        Ok(Vec::new())
    }
}

/// Shared HTTP client for the catalog APIs.
pub fn default_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_default()
}

/// Reject non-success responses, extracting the `Retry-After` hint from a
/// 429 so the rate limiter can honor the provider's wait request.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderFailure> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs);

    Err(ProviderFailure::from_status(status.as_u16(), retry_after))
}
