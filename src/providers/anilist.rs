// AniList catalog client (GraphQL)
// API documentation: https://docs.anilist.co/
// No API key needed. The anime/manga catalog of record for this engine.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{check_status, MetadataProvider};
use crate::error::ProviderFailure;
use crate::models::{
    EpisodeFragment, ImageFragment, MediaDetailFragment, MediaKind, MediaSummary, PersonFragment,
    ProviderPage, RecommendationFragment,
};

const ANILIST_API_URL: &str = "https://graphql.anilist.co";

pub struct AniListProvider {
    client: Client,
}

/// GraphQL request wrapper
#[derive(Debug, Serialize)]
struct GraphQLRequest {
    query: String,
    variables: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GraphQLResponse {
    data: Option<ResponseData>,
    errors: Option<Vec<GraphQLError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQLError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResponseData {
    #[serde(rename = "Page")]
    page: Option<PageData>,
    #[serde(rename = "Media")]
    media: Option<MediaData>,
}

#[derive(Debug, Deserialize)]
struct PageData {
    #[serde(rename = "pageInfo")]
    page_info: Option<PageInfo>,
    media: Option<Vec<MediaData>>,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    total: Option<i64>,
    #[serde(rename = "hasNextPage")]
    has_next_page: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
struct MediaData {
    id: i64,
    title: Option<TitleData>,
    synonyms: Option<Vec<String>>,
    description: Option<String>,
    #[serde(rename = "startDate")]
    start_date: Option<FuzzyDate>,
    #[serde(rename = "coverImage")]
    cover_image: Option<CoverImage>,
    #[serde(rename = "bannerImage")]
    banner_image: Option<String>,
    #[serde(rename = "averageScore")]
    average_score: Option<i32>,
    episodes: Option<i32>,
    genres: Option<Vec<String>>,
    studios: Option<StudioConnection>,
    characters: Option<CharacterConnection>,
    staff: Option<StaffConnection>,
    recommendations: Option<RecommendationConnection>,
    #[serde(rename = "streamingEpisodes")]
    streaming_episodes: Option<Vec<StreamingEpisode>>,
    #[serde(rename = "seasonYear")]
    season_year: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
struct TitleData {
    romaji: Option<String>,
    english: Option<String>,
    native: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct FuzzyDate {
    year: Option<i32>,
    month: Option<i32>,
    day: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
struct CoverImage {
    #[serde(rename = "extraLarge")]
    extra_large: Option<String>,
    large: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct StudioConnection {
    nodes: Option<Vec<Studio>>,
}

#[derive(Debug, Clone, Deserialize)]
struct Studio {
    name: String,
    #[serde(rename = "isAnimationStudio")]
    is_animation_studio: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct CharacterConnection {
    edges: Option<Vec<CharacterEdge>>,
}

#[derive(Debug, Clone, Deserialize)]
struct CharacterEdge {
    node: Option<PersonNode>,
    role: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct StaffConnection {
    edges: Option<Vec<StaffEdge>>,
}

#[derive(Debug, Clone, Deserialize)]
struct StaffEdge {
    node: Option<PersonNode>,
    role: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct PersonNode {
    id: i64,
    name: Option<PersonName>,
    image: Option<PersonImage>,
}

#[derive(Debug, Clone, Deserialize)]
struct PersonName {
    full: Option<String>,
    native: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct PersonImage {
    large: Option<String>,
    medium: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RecommendationConnection {
    nodes: Option<Vec<RecommendationNode>>,
}

#[derive(Debug, Clone, Deserialize)]
struct RecommendationNode {
    rating: Option<i32>,
    #[serde(rename = "mediaRecommendation")]
    media: Option<RecommendedMedia>,
}

#[derive(Debug, Clone, Deserialize)]
struct RecommendedMedia {
    id: i64,
    title: Option<TitleData>,
    #[serde(rename = "coverImage")]
    cover_image: Option<CoverImage>,
}

#[derive(Debug, Clone, Deserialize)]
struct StreamingEpisode {
    title: Option<String>,
    thumbnail: Option<String>,
}

const SEARCH_QUERY: &str = r#"
    query ($search: String, $type: MediaType, $page: Int, $perPage: Int) {
        Page(page: $page, perPage: $perPage) {
            pageInfo {
                total
                hasNextPage
            }
            media(search: $search, type: $type, sort: SEARCH_MATCH) {
                id
                title {
                    romaji
                    english
                    native
                }
                synonyms
                startDate {
                    year
                    month
                    day
                }
                coverImage {
                    extraLarge
                    large
                }
                seasonYear
            }
        }
    }
"#;

const DETAILS_QUERY: &str = r#"
    query ($id: Int, $type: MediaType) {
        Media(id: $id, type: $type) {
            id
            title {
                romaji
                english
                native
            }
            synonyms
            description(asHtml: false)
            startDate {
                year
                month
                day
            }
            coverImage {
                extraLarge
                large
            }
            bannerImage
            averageScore
            episodes
            genres
            studios(isMain: true) {
                nodes {
                    name
                    isAnimationStudio
                }
            }
            characters(sort: ROLE, perPage: 25) {
                edges {
                    node {
                        id
                        name {
                            full
                            native
                        }
                        image {
                            large
                            medium
                        }
                    }
                    role
                }
            }
            staff(perPage: 15) {
                edges {
                    node {
                        id
                        name {
                            full
                            native
                        }
                        image {
                            large
                            medium
                        }
                    }
                    role
                }
            }
            recommendations(perPage: 10, sort: RATING_DESC) {
                nodes {
                    rating
                    mediaRecommendation {
                        id
                        title {
                            romaji
                            english
                        }
                        coverImage {
                            large
                        }
                    }
                }
            }
            seasonYear
        }
    }
"#;

const EPISODES_QUERY: &str = r#"
    query ($id: Int) {
        Media(id: $id, type: ANIME) {
            id
            streamingEpisodes {
                title
                thumbnail
            }
        }
    }
"#;

impl AniListProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn query(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<ResponseData, ProviderFailure> {
        let request = GraphQLRequest {
            query: query.to_string(),
            variables,
        };

        let response = self
            .client
            .post(ANILIST_API_URL)
            .json(&request)
            .send()
            .await?;
        let response = check_status(response).await?;

        let body: GraphQLResponse = response.json().await?;
        if let Some(errors) = body.errors {
            let message = errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ProviderFailure::Validation { message });
        }

        body.data.ok_or_else(|| ProviderFailure::Validation {
            message: "AniList response had no data".to_string(),
        })
    }

    fn media_type(kind: MediaKind) -> &'static str {
        match kind {
            MediaKind::Manga => "MANGA",
            // AniList files anime movies under ANIME
            MediaKind::Anime | MediaKind::Movie => "ANIME",
        }
    }
}

/// Prefer the English title, fall back to romaji then native.
fn display_title(title: &Option<TitleData>) -> Option<String> {
    let title = title.as_ref()?;
    title
        .english
        .clone()
        .or_else(|| title.romaji.clone())
        .or_else(|| title.native.clone())
}

fn alt_titles(title: &Option<TitleData>, synonyms: &Option<Vec<String>>) -> Vec<String> {
    let mut titles = Vec::new();
    if let Some(t) = title {
        titles.extend(t.romaji.clone());
        titles.extend(t.english.clone());
        titles.extend(t.native.clone());
    }
    titles.extend(synonyms.clone().unwrap_or_default());
    titles
}

/// Strip HTML that slips through `description(asHtml: false)`.
fn clean_description(description: &str) -> String {
    let re = regex::Regex::new(r"<[^>]+>").unwrap();
    re.replace_all(description, "").trim().to_string()
}

fn premiere_date(date: &Option<FuzzyDate>) -> Option<String> {
    let date = date.as_ref()?;
    date.year.map(|year| {
        format!(
            "{:04}-{:02}-{:02}",
            year,
            date.month.unwrap_or(1),
            date.day.unwrap_or(1)
        )
    })
}

/// Extract the episode number from a streaming episode title like
/// "Episode 5 - The Hidden Leaf". Unparseable titles get no number.
fn episode_number(title: &str) -> Option<i32> {
    let digits: String = title
        .trim_start_matches(|c: char| !c.is_ascii_digit())
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

fn to_summary(media: &MediaData) -> MediaSummary {
    MediaSummary {
        id: media.id.to_string(),
        title: display_title(&media.title).unwrap_or_default(),
        alt_titles: alt_titles(&media.title, &media.synonyms),
        year: media
            .season_year
            .or_else(|| media.start_date.as_ref().and_then(|d| d.year)),
        cover_image: media
            .cover_image
            .as_ref()
            .and_then(|c| c.extra_large.clone().or_else(|| c.large.clone())),
    }
}

fn person_from_edge(node: &Option<PersonNode>, role: &Option<String>) -> Option<PersonFragment> {
    let node = node.as_ref()?;
    let name = node.name.as_ref().and_then(|n| n.full.clone())?;
    Some(PersonFragment {
        id: format!("anilist-{}", node.id),
        name,
        native_name: node.name.as_ref().and_then(|n| n.native.clone()),
        image: node
            .image
            .as_ref()
            .and_then(|i| i.large.clone().or_else(|| i.medium.clone())),
        role: role.clone().unwrap_or_else(|| "Unknown".to_string()),
    })
}

fn to_details(media: &MediaData) -> MediaDetailFragment {
    let provider = crate::models::ProviderId::from("anilist");

    let characters = media
        .characters
        .as_ref()
        .and_then(|c| c.edges.as_ref())
        .map(|edges| {
            edges
                .iter()
                .filter_map(|e| person_from_edge(&e.node, &e.role))
                .collect()
        })
        .unwrap_or_default();

    let staff = media
        .staff
        .as_ref()
        .and_then(|s| s.edges.as_ref())
        .map(|edges| {
            edges
                .iter()
                .filter_map(|e| person_from_edge(&e.node, &e.role))
                .collect()
        })
        .unwrap_or_default();

    let recommendations = media
        .recommendations
        .as_ref()
        .and_then(|r| r.nodes.as_ref())
        .map(|nodes| {
            nodes
                .iter()
                .filter_map(|node| {
                    let rec = node.media.as_ref()?;
                    Some(RecommendationFragment {
                        id: rec.id.to_string(),
                        title: display_title(&rec.title)?,
                        cover_image: rec.cover_image.as_ref().and_then(|c| c.large.clone()),
                        rating: node.rating.unwrap_or(0),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    // Prefer the main animation studio, like the catalog UI does.
    let studio = media
        .studios
        .as_ref()
        .and_then(|s| s.nodes.as_ref())
        .and_then(|nodes| {
            nodes
                .iter()
                .find(|s| s.is_animation_studio)
                .or_else(|| nodes.first())
                .map(|s| s.name.clone())
        });

    MediaDetailFragment {
        id: media.id.to_string(),
        title: display_title(&media.title),
        native_title: media.title.as_ref().and_then(|t| t.native.clone()),
        description: media.description.as_deref().map(clean_description),
        year: media
            .season_year
            .or_else(|| media.start_date.as_ref().and_then(|d| d.year)),
        premiere_date: premiere_date(&media.start_date),
        // AniList scores are 0-100
        rating: media.average_score.map(|s| s as f64 / 10.0),
        episode_count: media.episodes,
        genres: media.genres.clone().unwrap_or_default(),
        studio,
        images: ImageFragment {
            cover_image: media
                .cover_image
                .as_ref()
                .and_then(|c| c.extra_large.clone().or_else(|| c.large.clone())),
            banner_image: media.banner_image.clone(),
            source_provider: provider,
        },
        characters,
        staff,
        recommendations,
    }
}

#[async_trait::async_trait]
impl MetadataProvider for AniListProvider {
    fn name(&self) -> &'static str {
        "anilist"
    }

    async fn search(
        &self,
        query: &str,
        kind: MediaKind,
        page: u32,
        per_page: u32,
    ) -> Result<ProviderPage<MediaSummary>, ProviderFailure> {
        tracing::debug!("AniList search: {} ({})", query, kind);

        let variables = serde_json::json!({
            "search": query,
            "type": Self::media_type(kind),
            "page": page,
            "perPage": per_page,
        });

        let data = self.query(SEARCH_QUERY, variables).await?;
        let page_data = data.page.ok_or_else(|| ProviderFailure::Validation {
            message: "AniList search response had no page".to_string(),
        })?;

        let items = page_data
            .media
            .unwrap_or_default()
            .iter()
            .map(to_summary)
            .collect();

        Ok(ProviderPage {
            items,
            total_count: page_data.page_info.as_ref().and_then(|p| p.total),
            has_next_page: page_data
                .page_info
                .and_then(|p| p.has_next_page)
                .unwrap_or(false),
        })
    }

    async fn fetch_details(
        &self,
        media_id: &str,
        kind: MediaKind,
    ) -> Result<MediaDetailFragment, ProviderFailure> {
        let id: i64 = media_id
            .parse()
            .map_err(|_| ProviderFailure::Validation {
                message: format!("invalid AniList id: {}", media_id),
            })?;

        tracing::debug!("AniList details: {}", id);

        let variables = serde_json::json!({
            "id": id,
            "type": Self::media_type(kind),
        });

        let data = self.query(DETAILS_QUERY, variables).await?;
        let media = data.media.ok_or_else(|| ProviderFailure::Validation {
            message: format!("AniList media {} not found", media_id),
        })?;

        Ok(to_details(&media))
    }

    async fn fetch_episodes(
        &self,
        media_id: &str,
    ) -> Result<Vec<EpisodeFragment>, ProviderFailure> {
        let id: i64 = media_id
            .parse()
            .map_err(|_| ProviderFailure::Validation {
                message: format!("invalid AniList id: {}", media_id),
            })?;

        tracing::debug!("AniList episodes: {}", id);

        let data = self
            .query(EPISODES_QUERY, serde_json::json!({ "id": id }))
            .await?;
        let episodes = data
            .media
            .and_then(|m| m.streaming_episodes)
            .unwrap_or_default();

        Ok(episodes
            .iter()
            .enumerate()
            .map(|(index, episode)| {
                let title = episode.title.clone();
                let number = title
                    .as_deref()
                    .and_then(episode_number)
                    .unwrap_or(index as i32 + 1);
                EpisodeFragment {
                    number,
                    title,
                    overview: None,
                    air_date: None,
                    thumbnail: episode.thumbnail.clone(),
                    runtime_minutes: None,
                }
            })
            .collect())
    }
}
