// Jikan catalog client - unofficial MyAnimeList API
// API documentation: https://docs.api.jikan.moe/
// Rate limit: 3 requests/second, 60 requests/minute - enforced upstream by
// the engine's rate limiter reacting to 429s, not in this client.

use reqwest::Client;
use serde::Deserialize;

use super::{check_status, MetadataProvider};
use crate::error::ProviderFailure;
use crate::models::{
    ImageFragment, MediaDetailFragment, MediaKind, MediaSummary, PersonFragment, ProviderId,
    ProviderPage, RecommendationFragment,
};

const JIKAN_API_BASE: &str = "https://api.jikan.moe/v4";

pub struct JikanProvider {
    client: Client,
}

#[derive(Debug, Deserialize)]
struct JikanResponse<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct JikanListResponse<T> {
    data: Vec<T>,
    pagination: Option<JikanPagination>,
}

#[derive(Debug, Deserialize)]
struct JikanPagination {
    has_next_page: Option<bool>,
    items: Option<JikanPaginationItems>,
}

#[derive(Debug, Deserialize)]
struct JikanPaginationItems {
    total: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
struct JikanMedia {
    mal_id: i64,
    images: Option<JikanImages>,
    title: String,
    title_english: Option<String>,
    title_japanese: Option<String>,
    title_synonyms: Option<Vec<String>>,
    episodes: Option<i32>,
    chapters: Option<i32>,
    aired: Option<JikanDateRange>,
    published: Option<JikanDateRange>,
    score: Option<f64>,
    synopsis: Option<String>,
    year: Option<i32>,
    studios: Option<Vec<JikanNamed>>,
    genres: Option<Vec<JikanNamed>>,
    themes: Option<Vec<JikanNamed>>,
}

#[derive(Debug, Clone, Deserialize)]
struct JikanImages {
    jpg: Option<JikanImageSet>,
    webp: Option<JikanImageSet>,
}

#[derive(Debug, Clone, Deserialize)]
struct JikanImageSet {
    image_url: Option<String>,
    large_image_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct JikanDateRange {
    from: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct JikanNamed {
    name: String,
}

#[derive(Debug, Deserialize)]
struct JikanCharacterEntry {
    character: JikanCharacter,
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JikanCharacter {
    mal_id: i64,
    name: String,
    images: Option<JikanImages>,
}

#[derive(Debug, Deserialize)]
struct JikanRecommendationEntry {
    entry: JikanRecommendedMedia,
    votes: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct JikanRecommendedMedia {
    mal_id: i64,
    title: String,
    images: Option<JikanImages>,
}

fn best_image(images: &Option<JikanImages>) -> Option<String> {
    images.as_ref().and_then(|images| {
        images
            .jpg
            .as_ref()
            .and_then(|jpg| jpg.large_image_url.clone().or_else(|| jpg.image_url.clone()))
            .or_else(|| {
                images.webp.as_ref().and_then(|webp| {
                    webp.large_image_url
                        .clone()
                        .or_else(|| webp.image_url.clone())
                })
            })
    })
}

/// "2002-10-03T00:00:00+00:00" -> "2002-10-03"
fn date_only(date: Option<&str>) -> Option<String> {
    date.map(|d| d.split('T').next().unwrap_or(d).to_string())
}

fn endpoint(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Manga => "manga",
        MediaKind::Anime | MediaKind::Movie => "anime",
    }
}

fn to_summary(media: &JikanMedia) -> MediaSummary {
    let mut alt_titles = Vec::new();
    alt_titles.extend(media.title_english.clone());
    alt_titles.extend(media.title_japanese.clone());
    alt_titles.extend(media.title_synonyms.clone().unwrap_or_default());

    let premiere = media
        .aired
        .as_ref()
        .or(media.published.as_ref())
        .and_then(|range| date_only(range.from.as_deref()));

    MediaSummary {
        id: media.mal_id.to_string(),
        title: media.title.clone(),
        alt_titles,
        year: media.year.or_else(|| {
            premiere
                .as_deref()
                .and_then(|d| d.split('-').next())
                .and_then(|y| y.parse().ok())
        }),
        cover_image: best_image(&media.images),
    }
}

fn to_details(media: &JikanMedia) -> MediaDetailFragment {
    let premiere = media
        .aired
        .as_ref()
        .or(media.published.as_ref())
        .and_then(|range| date_only(range.from.as_deref()));
    let year = media.year.or_else(|| {
        premiere
            .as_deref()
            .and_then(|d| d.split('-').next())
            .and_then(|y| y.parse().ok())
    });

    let genres: Vec<String> = media
        .genres
        .iter()
        .flatten()
        .chain(media.themes.iter().flatten())
        .map(|g| g.name.clone())
        .collect();

    MediaDetailFragment {
        id: media.mal_id.to_string(),
        title: Some(media.title.clone()),
        native_title: media.title_japanese.clone(),
        description: media.synopsis.clone(),
        year,
        premiere_date: premiere,
        rating: media.score,
        episode_count: media.episodes.or(media.chapters),
        genres,
        studio: media
            .studios
            .as_ref()
            .and_then(|s| s.first())
            .map(|s| s.name.clone()),
        images: ImageFragment {
            cover_image: best_image(&media.images),
            // MAL has no banner art
            banner_image: None,
            source_provider: ProviderId::from("jikan"),
        },
        characters: Vec::new(),
        staff: Vec::new(),
        recommendations: Vec::new(),
    }
}

impl JikanProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, ProviderFailure> {
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn fetch_characters(
        &self,
        media_id: &str,
    ) -> Result<Vec<PersonFragment>, ProviderFailure> {
        let url = format!("{}/anime/{}/characters", JIKAN_API_BASE, media_id);
        let response: JikanResponse<Vec<JikanCharacterEntry>> = self.get_json(&url).await?;

        Ok(response
            .data
            .into_iter()
            .map(|entry| PersonFragment {
                id: format!("mal-{}", entry.character.mal_id),
                name: entry.character.name,
                native_name: None,
                image: best_image(&entry.character.images),
                role: entry.role.unwrap_or_else(|| "Unknown".to_string()),
            })
            .collect())
    }

    async fn fetch_recommendations(
        &self,
        media_id: &str,
        kind: MediaKind,
    ) -> Result<Vec<RecommendationFragment>, ProviderFailure> {
        let url = format!(
            "{}/{}/{}/recommendations",
            JIKAN_API_BASE,
            endpoint(kind),
            media_id
        );
        let response: JikanResponse<Vec<JikanRecommendationEntry>> = self.get_json(&url).await?;

        Ok(response
            .data
            .into_iter()
            .map(|entry| RecommendationFragment {
                id: entry.entry.mal_id.to_string(),
                title: entry.entry.title,
                cover_image: best_image(&entry.entry.images),
                rating: entry.votes.unwrap_or(0),
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl MetadataProvider for JikanProvider {
    fn name(&self) -> &'static str {
        "jikan"
    }

    async fn search(
        &self,
        query: &str,
        kind: MediaKind,
        page: u32,
        per_page: u32,
    ) -> Result<ProviderPage<MediaSummary>, ProviderFailure> {
        let url = format!(
            "{}/{}?q={}&sfw=true&limit={}&page={}",
            JIKAN_API_BASE,
            endpoint(kind),
            urlencoding::encode(query),
            per_page,
            page
        );

        tracing::debug!("Jikan search: {} ({})", query, kind);

        let response: JikanListResponse<JikanMedia> = self.get_json(&url).await?;
        Ok(ProviderPage {
            items: response.data.iter().map(to_summary).collect(),
            total_count: response
                .pagination
                .as_ref()
                .and_then(|p| p.items.as_ref())
                .and_then(|i| i.total),
            has_next_page: response
                .pagination
                .and_then(|p| p.has_next_page)
                .unwrap_or(false),
        })
    }

    async fn fetch_details(
        &self,
        media_id: &str,
        kind: MediaKind,
    ) -> Result<MediaDetailFragment, ProviderFailure> {
        let url = format!("{}/{}/{}", JIKAN_API_BASE, endpoint(kind), media_id);

        tracing::debug!("Jikan details: {} ({})", media_id, kind);

        let response: JikanResponse<JikanMedia> = self.get_json(&url).await?;
        let mut details = to_details(&response.data);

        // Characters and recommendations are separate endpoints; their
        // failure should not cost us the base record.
        if kind != MediaKind::Manga {
            match self.fetch_characters(media_id).await {
                Ok(characters) => details.characters = characters,
                Err(e) => tracing::debug!("Jikan characters fetch failed: {}", e),
            }
        }
        match self.fetch_recommendations(media_id, kind).await {
            Ok(recommendations) => details.recommendations = recommendations,
            Err(e) => tracing::debug!("Jikan recommendations fetch failed: {}", e),
        }

        Ok(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_media() -> JikanMedia {
        JikanMedia {
            mal_id: 20,
            images: Some(JikanImages {
                jpg: Some(JikanImageSet {
                    image_url: Some("https://example.com/small.jpg".to_string()),
                    large_image_url: Some("https://example.com/large.jpg".to_string()),
                }),
                webp: None,
            }),
            title: "Naruto".to_string(),
            title_english: Some("Naruto".to_string()),
            title_japanese: Some("ナルト".to_string()),
            title_synonyms: Some(vec!["NARUTO".to_string()]),
            episodes: Some(220),
            chapters: None,
            aired: Some(JikanDateRange {
                from: Some("2002-10-03T00:00:00+00:00".to_string()),
            }),
            published: None,
            score: Some(7.99),
            synopsis: Some("A young ninja.".to_string()),
            year: Some(2002),
            studios: Some(vec![JikanNamed {
                name: "Pierrot".to_string(),
            }]),
            genres: Some(vec![JikanNamed {
                name: "Action".to_string(),
            }]),
            themes: Some(vec![JikanNamed {
                name: "Martial Arts".to_string(),
            }]),
        }
    }

    #[test]
    fn test_details_mapping() {
        let details = to_details(&sample_media());
        assert_eq!(details.id, "20");
        assert_eq!(details.title.as_deref(), Some("Naruto"));
        assert_eq!(details.premiere_date.as_deref(), Some("2002-10-03"));
        assert_eq!(details.rating, Some(7.99));
        assert_eq!(details.studio.as_deref(), Some("Pierrot"));
        assert_eq!(details.genres, vec!["Action", "Martial Arts"]);
        assert_eq!(
            details.images.cover_image.as_deref(),
            Some("https://example.com/large.jpg")
        );
        assert_eq!(details.images.banner_image, None);
    }

    #[test]
    fn test_summary_year_falls_back_to_aired() {
        let mut media = sample_media();
        media.year = None;
        let summary = to_summary(&media);
        assert_eq!(summary.year, Some(2002));
    }

    #[test]
    fn test_best_image_prefers_large_jpg() {
        let media = sample_media();
        assert_eq!(
            best_image(&media.images),
            Some("https://example.com/large.jpg".to_string())
        );
        assert_eq!(best_image(&None), None);
    }

    #[test]
    fn test_date_only() {
        assert_eq!(
            date_only(Some("2002-10-03T00:00:00+00:00")),
            Some("2002-10-03".to_string())
        );
        assert_eq!(date_only(Some("2002-10-03")), Some("2002-10-03".to_string()));
        assert_eq!(date_only(None), None);
    }
}
