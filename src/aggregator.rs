// Data aggregator: pure merge functions over provider-tagged fragments
//
// No network, no cache, no suspension points. Malformed or missing fields
// are treated as absent; an empty input yields an empty result, never an
// error. First-seen order is preserved through every dedup.

use std::collections::HashMap;

use crate::models::{
    ChapterFragment, EpisodeFragment, ImageFragment, PersonFragment, ProviderId,
    RecommendationFragment,
};
use crate::priority::{DataKind, PriorityTable};

/// `merge_images` with per-field provenance, for attribution bookkeeping.
#[derive(Debug, Clone)]
pub struct ImageMerge {
    pub cover_image: Option<String>,
    pub banner_image: Option<String>,
    pub cover_source: Option<ProviderId>,
    pub banner_source: Option<ProviderId>,
}

/// Resolve cover and banner independently: the primary's value wins when
/// present, otherwise the first non-empty alternative in `imageQuality`
/// priority order. A field nobody supplies stays absent.
pub fn merge_images_attributed(
    primary: &ImageFragment,
    alternatives: &[ImageFragment],
    priority: &PriorityTable,
) -> ImageMerge {
    let primary = primary.clone().normalized();

    let mut cover = primary
        .cover_image
        .map(|url| (url, primary.source_provider.clone()));
    let mut banner = primary
        .banner_image
        .map(|url| (url, primary.source_provider.clone()));

    let ordered = priority.sort_by_priority(
        alternatives.to_vec(),
        DataKind::ImageQuality,
        |fragment| &fragment.source_provider,
    );

    for alternative in ordered {
        if cover.is_some() && banner.is_some() {
            break;
        }
        let alternative = alternative.normalized();
        if cover.is_none() {
            if let Some(url) = alternative.cover_image {
                cover = Some((url, alternative.source_provider.clone()));
            }
        }
        if banner.is_none() {
            if let Some(url) = alternative.banner_image {
                banner = Some((url, alternative.source_provider.clone()));
            }
        }
    }

    let (cover_image, cover_source) = match cover {
        Some((url, source)) => (Some(url), Some(source)),
        None => (None, None),
    };
    let (banner_image, banner_source) = match banner {
        Some((url, source)) => (Some(url), Some(source)),
        None => (None, None),
    };

    ImageMerge {
        cover_image,
        banner_image,
        cover_source,
        banner_source,
    }
}

/// Spec'd image merge: one fragment whose `source_provider` reflects the
/// provider of the cover when present, otherwise the primary's provider.
pub fn merge_images(
    primary: &ImageFragment,
    alternatives: &[ImageFragment],
    priority: &PriorityTable,
) -> ImageFragment {
    let merged = merge_images_attributed(primary, alternatives, priority);
    ImageFragment {
        source_provider: merged
            .cover_source
            .unwrap_or_else(|| primary.source_provider.clone()),
        cover_image: merged.cover_image,
        banner_image: merged.banner_image,
    }
}

/// Case-insensitive, whitespace-collapsed identity key for dedup.
fn dedup_key(name: &str) -> String {
    name.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Flatten character lists from several providers, deduplicating by
/// normalized name. Colliding entries combine their populated optional
/// fields (a populated image or native name is never discarded in favor of
/// an absent one); everything else keeps the first-seen entry's values.
pub fn merge_characters(lists: &[Vec<PersonFragment>]) -> Vec<PersonFragment> {
    merge_people(lists)
}

/// Same rule as [`merge_characters`], for staff/crew lists.
pub fn merge_staff(lists: &[Vec<PersonFragment>]) -> Vec<PersonFragment> {
    merge_people(lists)
}

fn merge_people(lists: &[Vec<PersonFragment>]) -> Vec<PersonFragment> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<PersonFragment> = Vec::new();

    for person in lists.iter().flatten() {
        let key = dedup_key(&person.name);
        if key.is_empty() {
            continue;
        }

        match seen.get(&key) {
            Some(&idx) => {
                let kept = &mut merged[idx];
                if kept.native_name.is_none() {
                    kept.native_name = person.native_name.clone();
                }
                if kept.image.is_none() {
                    kept.image = person.image.clone();
                }
            }
            None => {
                seen.insert(key, merged.len());
                merged.push(person.clone());
            }
        }
    }

    merged
}

/// Flatten recommendation lists, deduplicating by normalized title. On
/// collision the higher-rated entry wins; ties keep the first seen. Output
/// order is first-seen order of the retained keys.
pub fn merge_recommendations(
    lists: &[Vec<RecommendationFragment>],
) -> Vec<RecommendationFragment> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<RecommendationFragment> = Vec::new();

    for rec in lists.iter().flatten() {
        let key = dedup_key(&rec.title);
        if key.is_empty() {
            continue;
        }

        match seen.get(&key) {
            Some(&idx) => {
                if rec.rating > merged[idx].rating {
                    merged[idx] = rec.clone();
                }
            }
            None => {
                seen.insert(key, merged.len());
                merged.push(rec.clone());
            }
        }
    }

    merged
}

/// Merge per-provider episode lists.
///
/// The base list comes from the first provider in `animeMetadata` priority
/// order that has one; per episode, the thumbnail is taken from the first
/// provider in `episodeThumbnail` priority order with a thumbnail for that
/// episode number, and a missing title/overview is filled from any provider
/// that has the episode. Returns the merged list and the base provider.
pub fn merge_episodes(
    lists: &[(ProviderId, Vec<EpisodeFragment>)],
    priority: &PriorityTable,
) -> (Vec<EpisodeFragment>, Option<ProviderId>) {
    let by_metadata = priority.sort_by_priority(lists.to_vec(), DataKind::AnimeMetadata, |(p, _)| p);
    let Some((base_provider, base)) = by_metadata
        .iter()
        .find(|(_, episodes)| !episodes.is_empty())
        .cloned()
    else {
        return (Vec::new(), None);
    };

    let by_thumbnail =
        priority.sort_by_priority(lists.to_vec(), DataKind::EpisodeThumbnail, |(p, _)| p);

    let mut episodes = base;
    for episode in &mut episodes {
        // Thumbnails follow their own priority order, so a provider with
        // better stills can override the base list's art.
        if let Some(thumbnail) = by_thumbnail.iter().find_map(|(_, list)| {
            list.iter()
                .find(|e| e.number == episode.number)
                .and_then(|e| e.thumbnail.clone())
        }) {
            episode.thumbnail = Some(thumbnail);
        }

        for (_, list) in &by_metadata {
            let Some(other) = list.iter().find(|e| e.number == episode.number) else {
                continue;
            };
            if episode.title.is_none() {
                episode.title = other.title.clone();
            }
            if episode.overview.is_none() {
                episode.overview = other.overview.clone();
            }
            if episode.air_date.is_none() {
                episode.air_date = other.air_date.clone();
            }
        }
    }

    (episodes, Some(base_provider))
}

/// Pick the chapter list from the first provider in `mangaChapter` priority
/// order that has one. Chapter lists are not cross-merged; different
/// catalogs paginate and number scanlations too differently to union.
pub fn merge_chapters(
    lists: &[(ProviderId, Vec<ChapterFragment>)],
    priority: &PriorityTable,
) -> (Vec<ChapterFragment>, Option<ProviderId>) {
    let ordered = priority.sort_by_priority(lists.to_vec(), DataKind::MangaChapter, |(p, _)| p);
    match ordered.into_iter().find(|(_, chapters)| !chapters.is_empty()) {
        Some((provider, chapters)) => (chapters, Some(provider)),
        None => (Vec::new(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(provider: &str, cover: Option<&str>, banner: Option<&str>) -> ImageFragment {
        ImageFragment {
            cover_image: cover.map(str::to_string),
            banner_image: banner.map(str::to_string),
            source_provider: ProviderId::from(provider),
        }
    }

    fn person(name: &str, role: &str) -> PersonFragment {
        PersonFragment {
            id: format!("id-{}", name),
            name: name.to_string(),
            native_name: None,
            image: None,
            role: role.to_string(),
        }
    }

    fn rec(title: &str, rating: i32) -> RecommendationFragment {
        RecommendationFragment {
            id: format!("id-{}", title),
            title: title.to_string(),
            cover_image: None,
            rating,
        }
    }

    #[test]
    fn test_image_fallback_chain() {
        let table = PriorityTable::default();
        let primary = fragment("anilist", None, None);
        let alternatives = vec![
            fragment("tmdb", None, None),
            fragment("kitsu", Some("K"), None),
        ];

        let merged = merge_images(&primary, &alternatives, &table);
        assert_eq!(merged.cover_image.as_deref(), Some("K"));
        assert_eq!(merged.banner_image, None);
        assert_eq!(merged.source_provider, ProviderId::from("kitsu"));
    }

    #[test]
    fn test_image_primary_wins_when_present() {
        let table = PriorityTable::default();
        let primary = fragment("anilist", Some("A"), Some("B"));
        let alternatives = vec![fragment("tmdb", Some("T"), Some("U"))];

        let merged = merge_images(&primary, &alternatives, &table);
        assert_eq!(merged.cover_image.as_deref(), Some("A"));
        assert_eq!(merged.banner_image.as_deref(), Some("B"));
        assert_eq!(merged.source_provider, ProviderId::from("anilist"));
    }

    #[test]
    fn test_image_fields_resolved_independently() {
        let table = PriorityTable::default();
        // Primary has a banner but no cover; cover falls through to tmdb.
        let primary = fragment("anilist", None, Some("banner-a"));
        let alternatives = vec![fragment("tmdb", Some("cover-t"), Some("banner-t"))];

        let merged = merge_images_attributed(&primary, &alternatives, &table);
        assert_eq!(merged.cover_image.as_deref(), Some("cover-t"));
        assert_eq!(merged.cover_source, Some(ProviderId::from("tmdb")));
        assert_eq!(merged.banner_image.as_deref(), Some("banner-a"));
        assert_eq!(merged.banner_source, Some(ProviderId::from("anilist")));
    }

    #[test]
    fn test_image_alternatives_follow_priority_order() {
        let table = PriorityTable::default();
        let primary = fragment("anilist", None, None);
        // kitsu listed first here, but tmdb outranks it for imageQuality.
        let alternatives = vec![
            fragment("kitsu", Some("K"), None),
            fragment("tmdb", Some("T"), None),
        ];

        let merged = merge_images(&primary, &alternatives, &table);
        assert_eq!(merged.cover_image.as_deref(), Some("T"));
    }

    #[test]
    fn test_empty_string_treated_as_absent() {
        let table = PriorityTable::default();
        let primary = fragment("anilist", Some(""), Some("X"));
        let alternatives = vec![fragment("tmdb", Some("T"), None)];

        let merged = merge_images(&primary, &alternatives, &table);
        assert_eq!(merged.cover_image.as_deref(), Some("T"));
        assert_eq!(merged.banner_image.as_deref(), Some("X"));
    }

    #[test]
    fn test_image_merge_with_nothing_is_absent_not_error() {
        let table = PriorityTable::default();
        let merged = merge_images(&fragment("anilist", None, None), &[], &table);
        assert_eq!(merged.cover_image, None);
        assert_eq!(merged.banner_image, None);
        assert_eq!(merged.source_provider, ProviderId::from("anilist"));
    }

    #[test]
    fn test_person_dedup_keeps_most_complete_record() {
        let sparse = person("Naruto Uzumaki", "Main");
        let complete = PersonFragment {
            id: "c-17".to_string(),
            name: "naruto uzumaki".to_string(),
            native_name: Some("うずまきナルト".to_string()),
            image: Some("img.jpg".to_string()),
            role: "Main".to_string(),
        };

        let merged = merge_characters(&[vec![sparse], vec![complete]]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].name, "Naruto Uzumaki");
        assert_eq!(merged[0].image.as_deref(), Some("img.jpg"));
        assert_eq!(merged[0].native_name.as_deref(), Some("うずまきナルト"));
    }

    #[test]
    fn test_person_dedup_collapses_whitespace() {
        let merged = merge_characters(&[
            vec![person("Monkey  D.   Luffy", "Main")],
            vec![person("monkey d. luffy", "Main")],
        ]);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_person_dedup_preserves_first_seen_order() {
        let merged = merge_characters(&[
            vec![person("Alpha", "Main"), person("Beta", "Supporting")],
            vec![person("beta", "Main"), person("Gamma", "Main")],
        ]);
        let names: Vec<&str> = merged.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Beta", "Gamma"]);
    }

    #[test]
    fn test_person_populated_field_never_lost_to_absent() {
        let with_image = PersonFragment {
            image: Some("first.jpg".to_string()),
            ..person("Ichigo", "Main")
        };
        let without = person("ichigo", "Main");

        let merged = merge_staff(&[vec![with_image], vec![without]]);
        assert_eq!(merged[0].image.as_deref(), Some("first.jpg"));
    }

    #[test]
    fn test_empty_person_lists_yield_empty_result() {
        assert!(merge_characters(&[]).is_empty());
        assert!(merge_characters(&[vec![], vec![]]).is_empty());
    }

    #[test]
    fn test_recommendation_dedup_keeps_higher_rating() {
        let merged = merge_recommendations(&[vec![rec("Bleach", 85)], vec![rec("bleach", 90)]]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].rating, 90);
    }

    #[test]
    fn test_recommendation_tie_keeps_first_seen() {
        let first = rec("Bleach", 85);
        let merged = merge_recommendations(&[vec![first.clone()], vec![rec("bleach", 85)]]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, first.id);
    }

    fn episode(number: i32, title: Option<&str>, thumbnail: Option<&str>) -> EpisodeFragment {
        EpisodeFragment {
            number,
            title: title.map(str::to_string),
            overview: None,
            air_date: None,
            thumbnail: thumbnail.map(str::to_string),
            runtime_minutes: None,
        }
    }

    #[test]
    fn test_episode_merge_prefers_thumbnail_priority() {
        let table = PriorityTable::default();
        let lists = vec![
            (
                ProviderId::from("anilist"),
                vec![episode(1, Some("The Beginning"), Some("anilist-1.jpg"))],
            ),
            (
                ProviderId::from("tmdb"),
                vec![episode(1, None, Some("tmdb-1.jpg"))],
            ),
        ];

        let (episodes, base) = merge_episodes(&lists, &table);
        assert_eq!(base, Some(ProviderId::from("anilist")));
        assert_eq!(episodes.len(), 1);
        // tmdb outranks anilist for episode thumbnails.
        assert_eq!(episodes[0].thumbnail.as_deref(), Some("tmdb-1.jpg"));
        assert_eq!(episodes[0].title.as_deref(), Some("The Beginning"));
    }

    #[test]
    fn test_episode_merge_fills_missing_titles() {
        let table = PriorityTable::default();
        let lists = vec![
            (ProviderId::from("anilist"), vec![episode(1, None, None)]),
            (
                ProviderId::from("tmdb"),
                vec![episode(1, Some("Homecoming"), None)],
            ),
        ];

        let (episodes, _) = merge_episodes(&lists, &table);
        assert_eq!(episodes[0].title.as_deref(), Some("Homecoming"));
    }

    #[test]
    fn test_episode_merge_empty_input() {
        let table = PriorityTable::default();
        let (episodes, base) = merge_episodes(&[], &table);
        assert!(episodes.is_empty());
        assert_eq!(base, None);
    }

    #[test]
    fn test_chapter_merge_prefers_manga_specialist() {
        let table = PriorityTable::default();
        let chapter = |id: &str| ChapterFragment {
            id: id.to_string(),
            number: Some(1.0),
            title: None,
            volume: None,
            language: Some("en".to_string()),
            pages: None,
            published_at: None,
        };
        let lists = vec![
            (ProviderId::from("anilist"), vec![chapter("a1")]),
            (ProviderId::from("mangadex"), vec![chapter("m1")]),
        ];

        let (chapters, source) = merge_chapters(&lists, &table);
        assert_eq!(source, Some(ProviderId::from("mangadex")));
        assert_eq!(chapters[0].id, "m1");
    }
}
