// Priority table: per data-kind provider orderings for conflict resolution
//
// What used to be hardcoded provider fallback chains is data here: when
// several providers supply a value for the same field, the ordering for
// that field's data kind breaks the tie.

use std::collections::HashMap;

use crate::models::ProviderId;

/// The data kinds that carry their own provider ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    EpisodeThumbnail,
    ImageQuality,
    AnimeMetadata,
    MangaChapter,
    Character,
}

impl DataKind {
    /// Parse a configuration key. Returns `None` for unknown keys so config
    /// loading can warn instead of silently overriding the wrong ordering.
    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "episodeThumbnail" => Some(DataKind::EpisodeThumbnail),
            "imageQuality" => Some(DataKind::ImageQuality),
            "animeMetadata" => Some(DataKind::AnimeMetadata),
            "mangaChapter" => Some(DataKind::MangaChapter),
            "character" => Some(DataKind::Character),
            _ => None,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            DataKind::EpisodeThumbnail => "episodeThumbnail",
            DataKind::ImageQuality => "imageQuality",
            DataKind::AnimeMetadata => "animeMetadata",
            DataKind::MangaChapter => "mangaChapter",
            DataKind::Character => "character",
        }
    }
}

/// Static, per-data-kind provider orderings plus the global confidence
/// threshold for identity matching.
#[derive(Debug, Clone)]
pub struct PriorityTable {
    orderings: HashMap<DataKind, Vec<ProviderId>>,
    min_confidence_threshold: f64,
}

fn providers(names: &[&str]) -> Vec<ProviderId> {
    names.iter().map(|n| ProviderId::from(*n)).collect()
}

impl Default for PriorityTable {
    fn default() -> Self {
        let mut orderings = HashMap::new();
        // TMDB leads for artwork; AniList is the anime catalog of record for
        // metadata and characters; MangaDex is the manga specialist.
        orderings.insert(
            DataKind::EpisodeThumbnail,
            providers(&["tmdb", "anilist", "kitsu"]),
        );
        orderings.insert(
            DataKind::ImageQuality,
            providers(&["tmdb", "anilist", "kitsu", "jikan"]),
        );
        orderings.insert(
            DataKind::AnimeMetadata,
            providers(&["anilist", "jikan", "kitsu", "tmdb"]),
        );
        orderings.insert(
            DataKind::MangaChapter,
            providers(&["mangadex", "anilist", "jikan"]),
        );
        orderings.insert(DataKind::Character, providers(&["anilist", "jikan", "tmdb"]));

        Self {
            orderings,
            min_confidence_threshold: 0.8,
        }
    }
}

impl PriorityTable {
    /// Default orderings with a custom confidence threshold. The threshold
    /// is clamped into [0, 1].
    pub fn new(min_confidence_threshold: f64) -> Self {
        Self {
            min_confidence_threshold: min_confidence_threshold.clamp(0.0, 1.0),
            ..Self::default()
        }
    }

    /// Replace the ordering for one data kind (operator override).
    pub fn with_override(mut self, kind: DataKind, order: Vec<ProviderId>) -> Self {
        self.orderings.insert(kind, order);
        self
    }

    pub fn min_confidence_threshold(&self) -> f64 {
        self.min_confidence_threshold
    }

    /// The provider ordering for `kind`.
    pub fn priority_for(&self, kind: DataKind) -> &[ProviderId] {
        self.orderings
            .get(&kind)
            .or_else(|| self.orderings.get(&DataKind::AnimeMetadata))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// String-keyed lookup; unknown data kinds fall back to the
    /// `animeMetadata` ordering.
    pub fn priority_for_key(&self, key: &str) -> &[ProviderId] {
        self.priority_for(DataKind::parse(key).unwrap_or(DataKind::AnimeMetadata))
    }

    /// Stable-partition `items`: entries whose provider appears in the
    /// ordering for `kind` come first, in that ordering, followed by the
    /// remaining entries in their original order.
    pub fn sort_by_priority<T, F>(&self, items: Vec<T>, kind: DataKind, provider_of: F) -> Vec<T>
    where
        F: Fn(&T) -> &ProviderId,
    {
        let order = self.priority_for(kind);
        let mut indexed: Vec<(usize, T)> = items
            .into_iter()
            .map(|item| {
                let rank = order
                    .iter()
                    .position(|p| p == provider_of(&item))
                    .unwrap_or(usize::MAX);
                (rank, item)
            })
            .collect();
        // sort_by_key is stable, so unlisted entries keep their input order.
        indexed.sort_by_key(|(rank, _)| *rank);
        indexed.into_iter().map(|(_, item)| item).collect()
    }

    pub fn meets_confidence_threshold(&self, score: f64) -> bool {
        score >= self.min_confidence_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let table = PriorityTable::default();
        assert_eq!(
            table.priority_for(DataKind::ImageQuality)[0],
            ProviderId::from("tmdb")
        );
        assert_eq!(
            table.priority_for(DataKind::AnimeMetadata)[0],
            ProviderId::from("anilist")
        );
        assert_eq!(
            table.priority_for(DataKind::MangaChapter)[0],
            ProviderId::from("mangadex")
        );
        assert!((table.min_confidence_threshold() - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unknown_key_falls_back_to_anime_metadata() {
        let table = PriorityTable::default();
        assert_eq!(
            table.priority_for_key("somethingElse"),
            table.priority_for(DataKind::AnimeMetadata)
        );
    }

    #[test]
    fn test_threshold_clamped() {
        assert!((PriorityTable::new(1.7).min_confidence_threshold() - 1.0).abs() < f64::EPSILON);
        assert!((PriorityTable::new(-0.3).min_confidence_threshold()).abs() < f64::EPSILON);
    }

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        let table = PriorityTable::default();
        assert!(table.meets_confidence_threshold(0.8));
        assert!(!table.meets_confidence_threshold(0.799));
    }

    #[test]
    fn test_sort_by_priority_stable_partition() {
        let table = PriorityTable::default();
        let items = vec![
            ProviderId::from("unknown-b"),
            ProviderId::from("kitsu"),
            ProviderId::from("unknown-a"),
            ProviderId::from("tmdb"),
        ];

        let sorted = table.sort_by_priority(items, DataKind::ImageQuality, |p| p);

        // Listed providers in list order, then unlisted in input order.
        assert_eq!(
            sorted,
            vec![
                ProviderId::from("tmdb"),
                ProviderId::from("kitsu"),
                ProviderId::from("unknown-b"),
                ProviderId::from("unknown-a"),
            ]
        );
    }

    #[test]
    fn test_override_replaces_ordering() {
        let table = PriorityTable::default()
            .with_override(DataKind::ImageQuality, providers(&["kitsu", "tmdb"]));
        assert_eq!(
            table.priority_for(DataKind::ImageQuality),
            providers(&["kitsu", "tmdb"]).as_slice()
        );
    }

    #[test]
    fn test_data_kind_parse() {
        assert_eq!(
            DataKind::parse("episodeThumbnail"),
            Some(DataKind::EpisodeThumbnail)
        );
        assert_eq!(DataKind::parse("character"), Some(DataKind::Character));
        assert_eq!(DataKind::parse("bogus"), None);
    }
}
