// MangaDex catalog client
// API documentation: https://api.mangadex.org/docs/
// The manga specialist: leads the priority table for chapter lists. No API
// key needed.

use std::collections::HashMap;

use reqwest::Client;
use serde::Deserialize;

use super::{check_status, MetadataProvider};
use crate::error::ProviderFailure;
use crate::models::{
    ChapterFragment, ImageFragment, MediaDetailFragment, MediaKind, MediaSummary, ProviderId,
    ProviderPage,
};

const MANGADEX_API_BASE: &str = "https://api.mangadex.org";
const MANGADEX_COVER_BASE: &str = "https://uploads.mangadex.org/covers";

pub struct MangaDexProvider {
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    data: Vec<T>,
    total: Option<i64>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SingleResponse<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct MangaResource {
    id: String,
    attributes: MangaAttributes,
    #[serde(default)]
    relationships: Vec<Relationship>,
}

#[derive(Debug, Deserialize)]
struct MangaAttributes {
    title: HashMap<String, String>,
    #[serde(rename = "altTitles", default)]
    alt_titles: Vec<HashMap<String, String>>,
    description: Option<HashMap<String, String>>,
    year: Option<i32>,
    tags: Option<Vec<Tag>>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    attributes: Option<TagAttributes>,
}

#[derive(Debug, Deserialize)]
struct TagAttributes {
    name: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct Relationship {
    #[serde(rename = "type")]
    kind: String,
    attributes: Option<RelationshipAttributes>,
}

#[derive(Debug, Deserialize)]
struct RelationshipAttributes {
    #[serde(rename = "fileName")]
    file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChapterResource {
    id: String,
    attributes: ChapterAttributes,
}

#[derive(Debug, Deserialize)]
struct ChapterAttributes {
    chapter: Option<String>,
    title: Option<String>,
    volume: Option<String>,
    pages: Option<i32>,
    #[serde(rename = "translatedLanguage")]
    translated_language: Option<String>,
    #[serde(rename = "publishAt")]
    publish_at: Option<String>,
}

/// Localized-string maps prefer English, then Japanese romanization, then
/// whatever is present.
fn localized(map: &HashMap<String, String>) -> Option<String> {
    map.get("en")
        .or_else(|| map.get("ja-ro"))
        .or_else(|| map.values().next())
        .cloned()
}

fn cover_url(manga_id: &str, relationships: &[Relationship]) -> Option<String> {
    relationships
        .iter()
        .find(|r| r.kind == "cover_art")
        .and_then(|r| r.attributes.as_ref())
        .and_then(|a| a.file_name.as_ref())
        .map(|file| format!("{}/{}/{}.512.jpg", MANGADEX_COVER_BASE, manga_id, file))
}

fn to_summary(manga: &MangaResource) -> MediaSummary {
    let alt_titles = manga
        .attributes
        .alt_titles
        .iter()
        .filter_map(localized)
        .collect();

    MediaSummary {
        id: manga.id.clone(),
        title: localized(&manga.attributes.title).unwrap_or_default(),
        alt_titles,
        year: manga.attributes.year,
        cover_image: cover_url(&manga.id, &manga.relationships),
    }
}

fn to_details(manga: &MangaResource) -> MediaDetailFragment {
    let genres = manga
        .attributes
        .tags
        .iter()
        .flatten()
        .filter_map(|tag| tag.attributes.as_ref())
        .filter_map(|attrs| localized(&attrs.name))
        .collect();

    MediaDetailFragment {
        id: manga.id.clone(),
        title: localized(&manga.attributes.title),
        native_title: manga.attributes.title.get("ja").cloned(),
        description: manga
            .attributes
            .description
            .as_ref()
            .and_then(localized),
        year: manga.attributes.year,
        premiere_date: None,
        rating: None,
        episode_count: None,
        genres,
        studio: None,
        images: ImageFragment {
            cover_image: cover_url(&manga.id, &manga.relationships),
            banner_image: None,
            source_provider: ProviderId::from("mangadex"),
        },
        characters: Vec::new(),
        staff: Vec::new(),
        recommendations: Vec::new(),
    }
}

impl MangaDexProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, ProviderFailure> {
        let response = self.client.get(url).send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}

#[async_trait::async_trait]
impl MetadataProvider for MangaDexProvider {
    fn name(&self) -> &'static str {
        "mangadex"
    }

    async fn search(
        &self,
        query: &str,
        kind: MediaKind,
        page: u32,
        per_page: u32,
    ) -> Result<ProviderPage<MediaSummary>, ProviderFailure> {
        // Manga only.
        if kind != MediaKind::Manga {
            return Ok(ProviderPage::empty());
        }

        let offset = page.saturating_sub(1) * per_page;
        let url = format!(
            "{}/manga?title={}&limit={}&offset={}&includes[]=cover_art",
            MANGADEX_API_BASE,
            urlencoding::encode(query),
            per_page,
            offset
        );

        tracing::debug!("MangaDex search: {}", query);

        let response: ListResponse<MangaResource> = self.get_json(&url).await?;
        let has_next_page = match (response.total, response.limit, response.offset) {
            (Some(total), Some(limit), Some(offset)) => offset + limit < total,
            _ => false,
        };

        Ok(ProviderPage {
            items: response.data.iter().map(to_summary).collect(),
            total_count: response.total,
            has_next_page,
        })
    }

    async fn fetch_details(
        &self,
        media_id: &str,
        kind: MediaKind,
    ) -> Result<MediaDetailFragment, ProviderFailure> {
        if kind != MediaKind::Manga {
            return Err(ProviderFailure::Validation {
                message: format!("MangaDex has no {} catalog", kind),
            });
        }

        let url = format!(
            "{}/manga/{}?includes[]=cover_art",
            MANGADEX_API_BASE, media_id
        );

        tracing::debug!("MangaDex details: {}", media_id);

        let response: SingleResponse<MangaResource> = self.get_json(&url).await?;
        Ok(to_details(&response.data))
    }

    async fn fetch_chapters(
        &self,
        media_id: &str,
    ) -> Result<Vec<ChapterFragment>, ProviderFailure> {
        let url = format!(
            "{}/manga/{}/feed?translatedLanguage[]=en&order[chapter]=asc&limit=100",
            MANGADEX_API_BASE, media_id
        );

        tracing::debug!("MangaDex chapters: {}", media_id);

        let response: ListResponse<ChapterResource> = self.get_json(&url).await?;
        Ok(response
            .data
            .into_iter()
            .map(|chapter| ChapterFragment {
                id: chapter.id,
                number: chapter
                    .attributes
                    .chapter
                    .as_deref()
                    .and_then(|c| c.parse().ok()),
                title: chapter.attributes.title.filter(|t| !t.is_empty()),
                volume: chapter.attributes.volume,
                language: chapter.attributes.translated_language,
                pages: chapter.attributes.pages,
                published_at: chapter.attributes.publish_at,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_manga() -> MangaResource {
        let mut title = HashMap::new();
        title.insert("en".to_string(), "Berserk".to_string());
        title.insert("ja".to_string(), "ベルセルク".to_string());

        let mut alt = HashMap::new();
        alt.insert("ja-ro".to_string(), "Beruseruku".to_string());

        let mut description = HashMap::new();
        description.insert("en".to_string(), "A dark fantasy.".to_string());

        MangaResource {
            id: "801513ba-a712-498c-8f57-cae55b38cc92".to_string(),
            attributes: MangaAttributes {
                title,
                alt_titles: vec![alt],
                description: Some(description),
                year: Some(1989),
                tags: None,
            },
            relationships: vec![Relationship {
                kind: "cover_art".to_string(),
                attributes: Some(RelationshipAttributes {
                    file_name: Some("cover.jpg".to_string()),
                }),
            }],
        }
    }

    #[test]
    fn test_details_mapping() {
        let details = to_details(&sample_manga());
        assert_eq!(details.title.as_deref(), Some("Berserk"));
        assert_eq!(details.native_title.as_deref(), Some("ベルセルク"));
        assert_eq!(details.description.as_deref(), Some("A dark fantasy."));
        assert_eq!(details.year, Some(1989));
        assert_eq!(
            details.images.cover_image.as_deref(),
            Some(
                "https://uploads.mangadex.org/covers/801513ba-a712-498c-8f57-cae55b38cc92/cover.jpg.512.jpg"
            )
        );
    }

    #[test]
    fn test_summary_alt_titles() {
        let summary = to_summary(&sample_manga());
        assert_eq!(summary.title, "Berserk");
        assert_eq!(summary.alt_titles, vec!["Beruseruku".to_string()]);
    }

    #[test]
    fn test_localized_fallback_order() {
        let mut map = HashMap::new();
        map.insert("fr".to_string(), "Français".to_string());
        assert_eq!(localized(&map), Some("Français".to_string()));

        map.insert("en".to_string(), "English".to_string());
        assert_eq!(localized(&map), Some("English".to_string()));
    }

    #[test]
    fn test_chapter_number_parsing() {
        let attrs = ChapterAttributes {
            chapter: Some("12.5".to_string()),
            title: Some(String::new()),
            volume: Some("3".to_string()),
            pages: Some(20),
            translated_language: Some("en".to_string()),
            publish_at: None,
        };
        assert_eq!(attrs.chapter.as_deref().and_then(|c| c.parse::<f64>().ok()), Some(12.5));
        // Empty titles are dropped at mapping time.
        assert!(attrs.title.filter(|t| !t.is_empty()).is_none());
    }
}
