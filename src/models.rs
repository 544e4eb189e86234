// Shared value types for the aggregation engine
//
// All of these are immutable value records produced fresh per aggregation
// pass; the only persisted entity is CrossReferenceEntry.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque name of a catalog provider ("anilist", "tmdb", ...).
///
/// Deliberately not an enum: new providers must be addable without touching
/// merge logic signatures, so provider-keyed data lives in
/// `HashMap<ProviderId, T>` and absence is always an explicit case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// What kind of title a lookup is about. Decides whether the engine fans
/// out episode fetches (anime, movies) or chapter fetches (manga).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Anime,
    Manga,
    Movie,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Anime => write!(f, "anime"),
            MediaKind::Manga => write!(f, "manga"),
            MediaKind::Movie => write!(f, "movie"),
        }
    }
}

/// One search hit as returned by a provider. Carries no confidence; scoring
/// against the source title is the Identity Matcher's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaSummary {
    /// Provider-native identifier for this title
    pub id: String,
    /// Primary display title
    pub title: String,
    /// Alternative titles (romaji, native, synonyms) when the provider has them
    #[serde(default)]
    pub alt_titles: Vec<String>,
    pub year: Option<i32>,
    pub cover_image: Option<String>,
}

/// One page of search results.
#[derive(Debug, Clone)]
pub struct ProviderPage<T> {
    pub items: Vec<T>,
    pub total_count: Option<i64>,
    pub has_next_page: bool,
}

impl<T> ProviderPage<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total_count: Some(0),
            has_next_page: false,
        }
    }
}

/// Cover/banner art from a single provider.
///
/// An empty string means the same thing as a missing value; use
/// [`ImageFragment::normalized`] before merging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFragment {
    pub cover_image: Option<String>,
    pub banner_image: Option<String>,
    pub source_provider: ProviderId,
}

impl ImageFragment {
    pub fn new(provider: ProviderId) -> Self {
        Self {
            cover_image: None,
            banner_image: None,
            source_provider: provider,
        }
    }

    /// Collapse empty strings into `None` so merge code only has one
    /// "absent" case to handle.
    pub fn normalized(mut self) -> Self {
        self.cover_image = self.cover_image.filter(|s| !s.is_empty());
        self.banner_image = self.banner_image.filter(|s| !s.is_empty());
        self
    }
}

/// A character or staff member supplied by one provider. The originating
/// provider is implied by the list the fragment arrived in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonFragment {
    pub id: String,
    pub name: String,
    pub native_name: Option<String>,
    pub image: Option<String>,
    pub role: String,
}

/// A related-title recommendation supplied by one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationFragment {
    pub id: String,
    pub title: String,
    pub cover_image: Option<String>,
    pub rating: i32,
}

/// Episode-level metadata from one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeFragment {
    pub number: i32,
    pub title: Option<String>,
    pub overview: Option<String>,
    pub air_date: Option<String>,
    pub thumbnail: Option<String>,
    pub runtime_minutes: Option<i32>,
}

/// Chapter-level metadata from one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterFragment {
    pub id: String,
    pub number: Option<f64>,
    pub title: Option<String>,
    pub volume: Option<String>,
    pub language: Option<String>,
    pub pages: Option<i32>,
    pub published_at: Option<String>,
}

/// Full detail payload for one title from one provider. Every field is
/// optional because no single catalog supplies everything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaDetailFragment {
    pub id: String,
    pub title: Option<String>,
    pub native_title: Option<String>,
    pub description: Option<String>,
    pub year: Option<i32>,
    pub premiere_date: Option<String>,
    pub rating: Option<f64>,
    pub episode_count: Option<i32>,
    #[serde(default)]
    pub genres: Vec<String>,
    pub studio: Option<String>,
    pub images: ImageFragment,
    #[serde(default)]
    pub characters: Vec<PersonFragment>,
    #[serde(default)]
    pub staff: Vec<PersonFragment>,
    #[serde(default)]
    pub recommendations: Vec<RecommendationFragment>,
}

impl MediaDetailFragment {
    pub fn new(provider: ProviderId, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            native_title: None,
            description: None,
            year: None,
            premiere_date: None,
            rating: None,
            episode_count: None,
            genres: Vec::new(),
            studio: None,
            images: ImageFragment::new(provider),
            characters: Vec::new(),
            staff: Vec::new(),
            recommendations: Vec::new(),
        }
    }
}

/// A scored identity candidate: "this provider's `media_id` refers to the
/// same title as the primary lookup, with this confidence".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub provider: ProviderId,
    pub media_id: String,
    /// Identity confidence in [0, 1]
    pub confidence: f64,
}

/// Persisted cross-reference: which id every other provider uses for the
/// title the primary provider knows as `primary_media_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossReferenceEntry {
    pub primary_provider: ProviderId,
    pub primary_media_id: String,
    /// Never contains `primary_provider` itself
    pub mappings: HashMap<ProviderId, String>,
    pub cached_at: DateTime<Utc>,
}

impl CrossReferenceEntry {
    /// Identity key under which the entry is persisted.
    pub fn cache_key(primary_provider: &ProviderId, primary_media_id: &str) -> String {
        format!("{}_{}", primary_provider, primary_media_id)
    }
}

/// The unified output of one aggregation pass: merged base fields plus
/// field-level provenance, the set of providers that contributed anything,
/// and the identity confidence per provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttributedRecord {
    pub title: Option<String>,
    pub native_title: Option<String>,
    pub description: Option<String>,
    pub year: Option<i32>,
    pub rating: Option<f64>,
    pub cover_image: Option<String>,
    pub banner_image: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    pub studio: Option<String>,
    pub episode_count: Option<i32>,
    #[serde(default)]
    pub episodes: Vec<EpisodeFragment>,
    #[serde(default)]
    pub chapters: Vec<ChapterFragment>,
    #[serde(default)]
    pub characters: Vec<PersonFragment>,
    #[serde(default)]
    pub staff: Vec<PersonFragment>,
    #[serde(default)]
    pub recommendations: Vec<RecommendationFragment>,
    /// Which provider's value won for each merged field
    #[serde(default)]
    pub data_source_attribution: HashMap<String, ProviderId>,
    /// Every provider that supplied any accepted data, primary first
    #[serde(default)]
    pub contributing_providers: Vec<ProviderId>,
    /// Identity confidence per accepted provider
    #[serde(default)]
    pub match_confidences: HashMap<ProviderId, f64>,
}
