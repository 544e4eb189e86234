// Kitsu catalog client (JSON:API)
// API documentation: https://kitsu.docs.apiary.io/
// Supplementary anime/manga catalog; useful for episode thumbnails and
// alternate artwork. No API key needed.

use reqwest::Client;
use serde::Deserialize;

use super::{check_status, MetadataProvider};
use crate::error::ProviderFailure;
use crate::models::{
    EpisodeFragment, ImageFragment, MediaDetailFragment, MediaKind, MediaSummary, ProviderId,
    ProviderPage,
};

const KITSU_API_BASE: &str = "https://kitsu.io/api/edge";

pub struct KitsuProvider {
    client: Client,
}

#[derive(Debug, Deserialize)]
struct CollectionResponse<T> {
    data: Vec<Resource<T>>,
    meta: Option<CollectionMeta>,
    links: Option<CollectionLinks>,
}

#[derive(Debug, Deserialize)]
struct SingleResponse<T> {
    data: Resource<T>,
}

#[derive(Debug, Deserialize)]
struct Resource<T> {
    id: String,
    attributes: T,
}

#[derive(Debug, Deserialize)]
struct CollectionMeta {
    count: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct CollectionLinks {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MediaAttributes {
    #[serde(rename = "canonicalTitle")]
    canonical_title: Option<String>,
    titles: Option<Titles>,
    #[serde(rename = "abbreviatedTitles")]
    abbreviated_titles: Option<Vec<String>>,
    synopsis: Option<String>,
    #[serde(rename = "averageRating")]
    average_rating: Option<String>,
    #[serde(rename = "startDate")]
    start_date: Option<String>,
    #[serde(rename = "posterImage")]
    poster_image: Option<Image>,
    #[serde(rename = "coverImage")]
    cover_image: Option<Image>,
    #[serde(rename = "episodeCount")]
    episode_count: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct Titles {
    en: Option<String>,
    en_jp: Option<String>,
    ja_jp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Image {
    original: Option<String>,
    large: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EpisodeAttributes {
    #[serde(rename = "canonicalTitle")]
    canonical_title: Option<String>,
    synopsis: Option<String>,
    number: Option<i32>,
    airdate: Option<String>,
    length: Option<i32>,
    thumbnail: Option<Image>,
}

fn image_url(image: &Option<Image>) -> Option<String> {
    image
        .as_ref()
        .and_then(|i| i.original.clone().or_else(|| i.large.clone()))
}

/// Kitsu ratings are strings on a 0-100 scale ("82.25").
fn parse_rating(rating: Option<&str>) -> Option<f64> {
    rating.and_then(|r| r.parse::<f64>().ok()).map(|r| r / 10.0)
}

fn parse_year(date: Option<&str>) -> Option<i32> {
    date.and_then(|d| d.split('-').next()).and_then(|y| y.parse().ok())
}

fn endpoint(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Manga => "manga",
        // Kitsu files anime movies under anime
        MediaKind::Anime | MediaKind::Movie => "anime",
    }
}

fn to_summary(resource: &Resource<MediaAttributes>) -> MediaSummary {
    let attrs = &resource.attributes;
    let mut alt_titles = Vec::new();
    if let Some(titles) = &attrs.titles {
        alt_titles.extend(titles.en.clone());
        alt_titles.extend(titles.en_jp.clone());
        alt_titles.extend(titles.ja_jp.clone());
    }
    alt_titles.extend(attrs.abbreviated_titles.clone().unwrap_or_default());

    MediaSummary {
        id: resource.id.clone(),
        title: attrs.canonical_title.clone().unwrap_or_default(),
        alt_titles,
        year: parse_year(attrs.start_date.as_deref()),
        cover_image: image_url(&attrs.poster_image),
    }
}

fn to_details(resource: &Resource<MediaAttributes>) -> MediaDetailFragment {
    let attrs = &resource.attributes;
    MediaDetailFragment {
        id: resource.id.clone(),
        title: attrs.canonical_title.clone(),
        native_title: attrs.titles.as_ref().and_then(|t| t.ja_jp.clone()),
        description: attrs.synopsis.clone(),
        year: parse_year(attrs.start_date.as_deref()),
        premiere_date: attrs.start_date.clone(),
        rating: parse_rating(attrs.average_rating.as_deref()),
        episode_count: attrs.episode_count,
        genres: Vec::new(),
        studio: None,
        images: ImageFragment {
            cover_image: image_url(&attrs.poster_image),
            // Kitsu's "cover" is the wide header art, i.e. our banner.
            banner_image: image_url(&attrs.cover_image),
            source_provider: ProviderId::from("kitsu"),
        },
        characters: Vec::new(),
        staff: Vec::new(),
        recommendations: Vec::new(),
    }
}

impl KitsuProvider {
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
            .header("Accept", "application/vnd.api+json")
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}

#[async_trait::async_trait]
impl MetadataProvider for KitsuProvider {
    fn name(&self) -> &'static str {
        "kitsu"
    }

    async fn search(
        &self,
        query: &str,
        kind: MediaKind,
        page: u32,
        per_page: u32,
    ) -> Result<ProviderPage<MediaSummary>, ProviderFailure> {
        let offset = page.saturating_sub(1) * per_page;
        let url = format!(
            "{}/{}?filter[text]={}&page[limit]={}&page[offset]={}",
            KITSU_API_BASE,
            endpoint(kind),
            urlencoding::encode(query),
            per_page,
            offset
        );

        tracing::debug!("Kitsu search: {} ({})", query, kind);

        let response: CollectionResponse<MediaAttributes> = self.get_json(&url).await?;
        Ok(ProviderPage {
            items: response.data.iter().map(to_summary).collect(),
            total_count: response.meta.and_then(|m| m.count),
            has_next_page: response
                .links
                .map(|l| l.next.is_some())
                .unwrap_or(false),
        })
    }

    async fn fetch_details(
        &self,
        media_id: &str,
        kind: MediaKind,
    ) -> Result<MediaDetailFragment, ProviderFailure> {
        let url = format!("{}/{}/{}", KITSU_API_BASE, endpoint(kind), media_id);

        tracing::debug!("Kitsu details: {}", media_id);

        let response: SingleResponse<MediaAttributes> = self.get_json(&url).await?;
        Ok(to_details(&response.data))
    }

    async fn fetch_episodes(
        &self,
        media_id: &str,
    ) -> Result<Vec<EpisodeFragment>, ProviderFailure> {
        let url = format!(
            "{}/anime/{}/episodes?page[limit]=20&sort=number",
            KITSU_API_BASE, media_id
        );

        tracing::debug!("Kitsu episodes: {}", media_id);

        let response: CollectionResponse<EpisodeAttributes> = self.get_json(&url).await?;
        Ok(response
            .data
            .into_iter()
            .filter_map(|resource| {
                let attrs = resource.attributes;
                Some(EpisodeFragment {
                    number: attrs.number?,
                    title: attrs.canonical_title,
                    overview: attrs.synopsis,
                    air_date: attrs.airdate,
                    thumbnail: image_url(&attrs.thumbnail),
                    runtime_minutes: attrs.length,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_resource() -> Resource<MediaAttributes> {
        Resource {
            id: "11".to_string(),
            attributes: MediaAttributes {
                canonical_title: Some("Naruto".to_string()),
                titles: Some(Titles {
                    en: Some("Naruto".to_string()),
                    en_jp: Some("Naruto".to_string()),
                    ja_jp: Some("ナルト".to_string()),
                }),
                abbreviated_titles: None,
                synopsis: Some("A young ninja strives for recognition.".to_string()),
                average_rating: Some("79.52".to_string()),
                start_date: Some("2002-10-03".to_string()),
                poster_image: Some(Image {
                    original: Some("https://example.com/poster.jpg".to_string()),
                    large: None,
                }),
                cover_image: Some(Image {
                    original: None,
                    large: Some("https://example.com/cover.jpg".to_string()),
                }),
                episode_count: Some(220),
            },
        }
    }

    #[test]
    fn test_details_mapping() {
        let details = to_details(&sample_resource());
        assert_eq!(details.id, "11");
        assert_eq!(details.title.as_deref(), Some("Naruto"));
        assert_eq!(details.native_title.as_deref(), Some("ナルト"));
        assert_eq!(details.year, Some(2002));
        assert_eq!(details.rating, Some(7.952));
        assert_eq!(
            details.images.cover_image.as_deref(),
            Some("https://example.com/poster.jpg")
        );
        // Kitsu's wide "cover" maps to the banner slot.
        assert_eq!(
            details.images.banner_image.as_deref(),
            Some("https://example.com/cover.jpg")
        );
    }

    #[test]
    fn test_rating_parsing() {
        assert_eq!(parse_rating(Some("82.25")), Some(8.225));
        assert_eq!(parse_rating(Some("not-a-number")), None);
        assert_eq!(parse_rating(None), None);
    }

    #[test]
    fn test_summary_alt_titles() {
        let summary = to_summary(&sample_resource());
        assert!(summary.alt_titles.contains(&"ナルト".to_string()));
        assert_eq!(summary.year, Some(2002));
    }
}
