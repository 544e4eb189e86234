// TMDB catalog client
// API documentation: https://developer.themoviedb.org/reference/intro/getting-started
// Leads the priority table for artwork and episode stills. Requires an API
// key; without one the provider reports itself unavailable.

use reqwest::Client;
use serde::Deserialize;

use super::{check_status, MetadataProvider};
use crate::error::ProviderFailure;
use crate::models::{
    EpisodeFragment, ImageFragment, MediaDetailFragment, MediaKind, MediaSummary, PersonFragment,
    ProviderId, ProviderPage,
};

const TMDB_API_BASE: &str = "https://api.themoviedb.org/3";
const TMDB_IMAGE_BASE: &str = "https://image.tmdb.org/t/p";

pub struct TmdbProvider {
    client: Client,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct TvSearchResults {
    results: Vec<TvSearchResult>,
    total_results: Option<i64>,
    total_pages: Option<i64>,
    page: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TvSearchResult {
    id: i64,
    name: String,
    original_name: Option<String>,
    first_air_date: Option<String>,
    poster_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MovieSearchResults {
    results: Vec<MovieSearchResult>,
    total_results: Option<i64>,
    total_pages: Option<i64>,
    page: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct MovieSearchResult {
    id: i64,
    title: String,
    original_title: Option<String>,
    release_date: Option<String>,
    poster_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TvDetails {
    id: i64,
    name: String,
    original_name: Option<String>,
    overview: Option<String>,
    first_air_date: Option<String>,
    poster_path: Option<String>,
    backdrop_path: Option<String>,
    vote_average: Option<f64>,
    number_of_episodes: Option<i32>,
    genres: Option<Vec<Genre>>,
    credits: Option<Credits>,
}

#[derive(Debug, Deserialize)]
struct MovieDetails {
    id: i64,
    title: String,
    original_title: Option<String>,
    overview: Option<String>,
    release_date: Option<String>,
    poster_path: Option<String>,
    backdrop_path: Option<String>,
    vote_average: Option<f64>,
    genres: Option<Vec<Genre>>,
    credits: Option<Credits>,
}

#[derive(Debug, Deserialize)]
struct SeasonDetails {
    episodes: Option<Vec<EpisodeInfo>>,
}

#[derive(Debug, Deserialize)]
struct EpisodeInfo {
    name: Option<String>,
    overview: Option<String>,
    episode_number: i32,
    air_date: Option<String>,
    still_path: Option<String>,
    runtime: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct Genre {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Credits {
    cast: Option<Vec<CastMember>>,
    crew: Option<Vec<CrewMember>>,
}

#[derive(Debug, Deserialize)]
struct CastMember {
    id: i64,
    name: String,
    character: Option<String>,
    profile_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrewMember {
    id: i64,
    name: String,
    job: Option<String>,
    profile_path: Option<String>,
}

fn poster_url(path: &str) -> String {
    format!("{}/w500{}", TMDB_IMAGE_BASE, path)
}

fn backdrop_url(path: &str) -> String {
    format!("{}/w1280{}", TMDB_IMAGE_BASE, path)
}

fn still_url(path: &str) -> String {
    format!("{}/w300{}", TMDB_IMAGE_BASE, path)
}

fn profile_url(path: &str) -> String {
    format!("{}/w185{}", TMDB_IMAGE_BASE, path)
}

fn parse_year(date: Option<&str>) -> Option<i32> {
    date.and_then(|d| d.split('-').next()).and_then(|y| y.parse().ok())
}

/// Actors plus key crew (director, writer), capped like the item detail
/// screens expect.
fn extract_staff(credits: &Option<Credits>, limit: usize) -> Vec<PersonFragment> {
    let Some(credits) = credits else {
        return Vec::new();
    };

    let mut result = Vec::new();

    if let Some(cast) = &credits.cast {
        for member in cast.iter().take(limit) {
            result.push(PersonFragment {
                id: format!("tmdb-person-{}", member.id),
                name: member.name.clone(),
                native_name: None,
                image: member.profile_path.as_deref().map(profile_url),
                role: member
                    .character
                    .clone()
                    .unwrap_or_else(|| "Actor".to_string()),
            });
        }
    }

    if result.len() < limit {
        if let Some(crew) = &credits.crew {
            let remaining = limit - result.len();
            for member in crew
                .iter()
                .filter(|c| {
                    matches!(
                        c.job.as_deref(),
                        Some("Director") | Some("Writer") | Some("Screenplay")
                    )
                })
                .take(remaining)
            {
                result.push(PersonFragment {
                    id: format!("tmdb-person-{}", member.id),
                    name: member.name.clone(),
                    native_name: None,
                    image: member.profile_path.as_deref().map(profile_url),
                    role: member.job.clone().unwrap_or_else(|| "Crew".to_string()),
                });
            }
        }
    }

    result
}

impl TmdbProvider {
    pub fn new(client: Client, api_key: String) -> Self {
        Self { client, api_key }
    }

    /// Create from the TMDB_API_KEY environment variable
    pub fn from_env(client: Client) -> Option<Self> {
        std::env::var("TMDB_API_KEY")
            .ok()
            .filter(|key| !key.is_empty())
            .map(|key| Self::new(client, key))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, ProviderFailure> {
        let response = self.client.get(url).send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    fn tv_details_to_fragment(&self, details: TvDetails) -> MediaDetailFragment {
        MediaDetailFragment {
            id: details.id.to_string(),
            title: Some(details.name),
            native_title: details.original_name,
            description: details.overview,
            year: parse_year(details.first_air_date.as_deref()),
            premiere_date: details.first_air_date,
            rating: details.vote_average,
            episode_count: details.number_of_episodes,
            genres: details
                .genres
                .map(|g| g.into_iter().map(|genre| genre.name).collect())
                .unwrap_or_default(),
            studio: None,
            images: ImageFragment {
                cover_image: details.poster_path.as_deref().map(poster_url),
                banner_image: details.backdrop_path.as_deref().map(backdrop_url),
                source_provider: ProviderId::from("tmdb"),
            },
            characters: Vec::new(),
            staff: extract_staff(&details.credits, 20),
            recommendations: Vec::new(),
        }
    }

    fn movie_details_to_fragment(&self, details: MovieDetails) -> MediaDetailFragment {
        MediaDetailFragment {
            id: details.id.to_string(),
            title: Some(details.title),
            native_title: details.original_title,
            description: details.overview,
            year: parse_year(details.release_date.as_deref()),
            premiere_date: details.release_date,
            rating: details.vote_average,
            episode_count: None,
            genres: details
                .genres
                .map(|g| g.into_iter().map(|genre| genre.name).collect())
                .unwrap_or_default(),
            studio: None,
            images: ImageFragment {
                cover_image: details.poster_path.as_deref().map(poster_url),
                banner_image: details.backdrop_path.as_deref().map(backdrop_url),
                source_provider: ProviderId::from("tmdb"),
            },
            characters: Vec::new(),
            staff: extract_staff(&details.credits, 20),
            recommendations: Vec::new(),
        }
    }
}

#[async_trait::async_trait]
impl MetadataProvider for TmdbProvider {
    fn name(&self) -> &'static str {
        "tmdb"
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn search(
        &self,
        query: &str,
        kind: MediaKind,
        page: u32,
        _per_page: u32,
    ) -> Result<ProviderPage<MediaSummary>, ProviderFailure> {
        // TMDB has no manga catalog.
        if kind == MediaKind::Manga {
            return Ok(ProviderPage::empty());
        }

        tracing::debug!("TMDB search: {} ({})", query, kind);

        if kind == MediaKind::Movie {
            let url = format!(
                "{}/search/movie?api_key={}&query={}&include_adult=false&page={}",
                TMDB_API_BASE,
                self.api_key,
                urlencoding::encode(query),
                page
            );
            let response: MovieSearchResults = self.get_json(&url).await?;
            let items = response
                .results
                .into_iter()
                .map(|r| MediaSummary {
                    id: r.id.to_string(),
                    title: r.title,
                    alt_titles: r.original_title.into_iter().collect(),
                    year: parse_year(r.release_date.as_deref()),
                    cover_image: r.poster_path.as_deref().map(poster_url),
                })
                .collect();
            return Ok(ProviderPage {
                items,
                total_count: response.total_results,
                has_next_page: match (response.page, response.total_pages) {
                    (Some(page), Some(total)) => page < total,
                    _ => false,
                },
            });
        }

        // Anime series live in the TV catalog.
        let url = format!(
            "{}/search/tv?api_key={}&query={}&include_adult=false&page={}",
            TMDB_API_BASE,
            self.api_key,
            urlencoding::encode(query),
            page
        );
        let response: TvSearchResults = self.get_json(&url).await?;
        let items = response
            .results
            .into_iter()
            .map(|r| MediaSummary {
                id: r.id.to_string(),
                title: r.name,
                alt_titles: r.original_name.into_iter().collect(),
                year: parse_year(r.first_air_date.as_deref()),
                cover_image: r.poster_path.as_deref().map(poster_url),
            })
            .collect();
        Ok(ProviderPage {
            items,
            total_count: response.total_results,
            has_next_page: match (response.page, response.total_pages) {
                (Some(page), Some(total)) => page < total,
                _ => false,
            },
        })
    }

    async fn fetch_details(
        &self,
        media_id: &str,
        kind: MediaKind,
    ) -> Result<MediaDetailFragment, ProviderFailure> {
        tracing::debug!("TMDB details: {} ({})", media_id, kind);

        if kind == MediaKind::Movie {
            let url = format!(
                "{}/movie/{}?api_key={}&append_to_response=credits",
                TMDB_API_BASE, media_id, self.api_key
            );
            let details: MovieDetails = self.get_json(&url).await?;
            return Ok(self.movie_details_to_fragment(details));
        }

        let url = format!(
            "{}/tv/{}?api_key={}&append_to_response=credits",
            TMDB_API_BASE, media_id, self.api_key
        );
        let details: TvDetails = self.get_json(&url).await?;
        Ok(self.tv_details_to_fragment(details))
    }

    async fn fetch_episodes(
        &self,
        media_id: &str,
    ) -> Result<Vec<EpisodeFragment>, ProviderFailure> {
        // Season 1 covers the common single-cour mapping; absolute-numbered
        // long-runners are out of scope for now.
        let url = format!(
            "{}/tv/{}/season/1?api_key={}",
            TMDB_API_BASE, media_id, self.api_key
        );

        tracing::debug!("TMDB season episodes: {}", media_id);

        let season: SeasonDetails = self.get_json(&url).await?;
        Ok(season
            .episodes
            .unwrap_or_default()
            .into_iter()
            .map(|e| EpisodeFragment {
                number: e.episode_number,
                title: e.name,
                overview: e.overview,
                air_date: e.air_date,
                thumbnail: e.still_path.as_deref().map(still_url),
                runtime_minutes: e.runtime,
            })
            .collect())
    }
}
