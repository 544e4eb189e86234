// Aggregation engine: one pass from a resolved title to an attributed record
//
// Identity-match the title across every configured provider, fan out one
// detail/episode/chapter fetch per accepted provider, and merge the
// fragments. Per-provider failures degrade the result; the pass only fails
// when nobody contributed anything.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::time::Duration;

use crate::aggregator;
use crate::cache::CrossReferenceCache;
use crate::error::AggregateError;
use crate::matcher::{self, IdentityMatcher};
use crate::models::{
    AttributedRecord, ChapterFragment, EpisodeFragment, ImageFragment, MatchCandidate,
    MediaDetailFragment, MediaKind, PersonFragment, ProviderId,
};
use crate::priority::{DataKind, PriorityTable};
use crate::providers::MetadataProvider;
use crate::retry::RetryExecutor;

/// Call-site timeout for a single provider attempt.
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct AggregationRequest {
    pub title: String,
    pub kind: MediaKind,
    pub primary_provider: ProviderId,
    pub primary_media_id: String,
}

/// What one provider's fan-out fetch produced.
#[derive(Default)]
struct FetchedFragments {
    details: Option<MediaDetailFragment>,
    episodes: Vec<EpisodeFragment>,
    chapters: Vec<ChapterFragment>,
}

impl FetchedFragments {
    fn contributed(&self) -> bool {
        self.details.is_some() || !self.episodes.is_empty() || !self.chapters.is_empty()
    }
}

pub struct AggregationEngine {
    providers: HashMap<ProviderId, Arc<dyn MetadataProvider>>,
    matcher: IdentityMatcher,
    retry: Arc<RetryExecutor>,
    priority: Arc<PriorityTable>,
    fetch_timeout: Duration,
}

impl AggregationEngine {
    /// All collaborators are constructor-passed; the engine holds no global
    /// state.
    pub fn new(
        providers: Vec<Arc<dyn MetadataProvider>>,
        retry: Arc<RetryExecutor>,
        priority: Arc<PriorityTable>,
        cache: Arc<CrossReferenceCache>,
    ) -> Self {
        let providers: HashMap<ProviderId, Arc<dyn MetadataProvider>> =
            providers.into_iter().map(|p| (p.id(), p)).collect();
        let matcher = IdentityMatcher::new(
            providers.clone(),
            retry.clone(),
            priority.clone(),
            cache,
        )
        .with_search_timeout(DEFAULT_FETCH_TIMEOUT);

        Self {
            providers,
            matcher,
            retry,
            priority,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Resolve `title` on the primary provider first (best search hit), then
    /// run the full aggregation pass for it.
    pub async fn aggregate_by_title(
        &self,
        title: &str,
        kind: MediaKind,
        primary_provider: &ProviderId,
    ) -> Result<AttributedRecord, AggregateError> {
        let Some(client) = self.providers.get(primary_provider).cloned() else {
            tracing::error!("Primary provider {} is not configured", primary_provider);
            return Err(AggregateError::AllProvidersFailed {
                title: title.to_string(),
            });
        };

        let page = self
            .retry
            .execute(primary_provider, "search", self.fetch_timeout, || {
                let client = client.clone();
                async move { client.search(title, kind, 1, 10).await }
            })
            .await
            .map_err(|e| {
                tracing::error!("Primary search on {} failed: {}", primary_provider, e);
                AggregateError::AllProvidersFailed {
                    title: title.to_string(),
                }
            })?;

        let best = page
            .items
            .iter()
            .map(|item| (matcher::candidate_confidence(title, item), item))
            .max_by(|(a, _), (b, _)| a.partial_cmp(b).unwrap_or(Ordering::Equal));

        let Some((confidence, item)) = best else {
            tracing::warn!("{} returned no results for '{}'", primary_provider, title);
            return Err(AggregateError::AllProvidersFailed {
                title: title.to_string(),
            });
        };

        tracing::info!(
            "Resolved '{}' on {} -> {} (score {:.2})",
            title,
            primary_provider,
            item.id,
            confidence
        );

        self.aggregate(&AggregationRequest {
            title: title.to_string(),
            kind,
            primary_provider: primary_provider.clone(),
            primary_media_id: item.id.clone(),
        })
        .await
    }

    /// Run one aggregation pass for an already-resolved primary id.
    pub async fn aggregate(
        &self,
        request: &AggregationRequest,
    ) -> Result<AttributedRecord, AggregateError> {
        let targets: Vec<ProviderId> = self
            .providers
            .keys()
            .filter(|p| **p != request.primary_provider)
            .cloned()
            .collect();

        let matches = self
            .matcher
            .match_title(
                &request.title,
                request.kind,
                &request.primary_provider,
                &request.primary_media_id,
                &targets,
            )
            .await;

        // One fetch per accepted provider, plus the primary itself.
        let mut fetch_plan: Vec<(ProviderId, String)> = vec![(
            request.primary_provider.clone(),
            request.primary_media_id.clone(),
        )];
        for candidate in matches.values() {
            fetch_plan.push((candidate.provider.clone(), candidate.media_id.clone()));
        }

        let fetches = fetch_plan.iter().map(|(provider, media_id)| {
            let provider = provider.clone();
            let media_id = media_id.clone();
            async move {
                let fragments = self
                    .fetch_provider(&provider, &media_id, request.kind)
                    .await;
                (provider, fragments)
            }
        });

        let mut details: Vec<(ProviderId, MediaDetailFragment)> = Vec::new();
        let mut episode_lists: Vec<(ProviderId, Vec<EpisodeFragment>)> = Vec::new();
        let mut chapter_lists: Vec<(ProviderId, Vec<ChapterFragment>)> = Vec::new();
        let mut contributing: Vec<ProviderId> = Vec::new();

        for (provider, fragments) in join_all(fetches).await {
            if !fragments.contributed() {
                continue;
            }
            contributing.push(provider.clone());
            if let Some(detail) = fragments.details {
                details.push((provider.clone(), detail));
            }
            if !fragments.episodes.is_empty() {
                episode_lists.push((provider.clone(), fragments.episodes));
            }
            if !fragments.chapters.is_empty() {
                chapter_lists.push((provider, fragments.chapters));
            }
        }

        if contributing.is_empty() {
            tracing::error!("Every provider failed for '{}'", request.title);
            return Err(AggregateError::AllProvidersFailed {
                title: request.title.clone(),
            });
        }

        Ok(self.build_record(request, details, episode_lists, chapter_lists, contributing, &matches))
    }

    /// Fetch everything one provider has for one title. Failures are logged
    /// here, at the provider boundary, and never propagate.
    async fn fetch_provider(
        &self,
        provider: &ProviderId,
        media_id: &str,
        kind: MediaKind,
    ) -> FetchedFragments {
        let Some(client) = self.providers.get(provider).cloned() else {
            return FetchedFragments::default();
        };

        let details = {
            let client = client.clone();
            match self
                .retry
                .execute(provider, "details", self.fetch_timeout, || {
                    let client = client.clone();
                    let media_id = media_id.to_string();
                    async move { client.fetch_details(&media_id, kind).await }
                })
                .await
            {
                Ok(detail) => Some(detail),
                Err(e) => {
                    tracing::warn!("{} details fetch failed: {}", provider, e);
                    None
                }
            }
        };

        let episodes = if kind == MediaKind::Manga {
            Vec::new()
        } else {
            let client = client.clone();
            match self
                .retry
                .execute(provider, "episodes", self.fetch_timeout, || {
                    let client = client.clone();
                    let media_id = media_id.to_string();
                    async move { client.fetch_episodes(&media_id).await }
                })
                .await
            {
                Ok(episodes) => episodes,
                Err(e) => {
                    tracing::warn!("{} episode fetch failed: {}", provider, e);
                    Vec::new()
                }
            }
        };

        let chapters = if kind != MediaKind::Manga {
            Vec::new()
        } else {
            match self
                .retry
                .execute(provider, "chapters", self.fetch_timeout, || {
                    let client = client.clone();
                    let media_id = media_id.to_string();
                    async move { client.fetch_chapters(&media_id).await }
                })
                .await
            {
                Ok(chapters) => chapters,
                Err(e) => {
                    tracing::warn!("{} chapter fetch failed: {}", provider, e);
                    Vec::new()
                }
            }
        };

        FetchedFragments {
            details,
            episodes,
            chapters,
        }
    }

    fn build_record(
        &self,
        request: &AggregationRequest,
        details: Vec<(ProviderId, MediaDetailFragment)>,
        episode_lists: Vec<(ProviderId, Vec<EpisodeFragment>)>,
        chapter_lists: Vec<(ProviderId, Vec<ChapterFragment>)>,
        contributing: Vec<ProviderId>,
        matches: &HashMap<ProviderId, MatchCandidate>,
    ) -> AttributedRecord {
        let mut record = AttributedRecord::default();
        let mut attribution: HashMap<String, ProviderId> = HashMap::new();

        // Base fields: first provider (in animeMetadata priority order) with
        // a value wins, and gets the attribution for that field.
        let by_metadata =
            self.priority
                .sort_by_priority(details, DataKind::AnimeMetadata, |(p, _)| p);

        for (provider, detail) in &by_metadata {
            if record.title.is_none() && detail.title.is_some() {
                record.title = detail.title.clone();
                attribution.insert("title".to_string(), provider.clone());
            }
            if record.native_title.is_none() && detail.native_title.is_some() {
                record.native_title = detail.native_title.clone();
                attribution.insert("native_title".to_string(), provider.clone());
            }
            if record.description.is_none() && detail.description.is_some() {
                record.description = detail.description.clone();
                attribution.insert("description".to_string(), provider.clone());
            }
            if record.year.is_none() && detail.year.is_some() {
                record.year = detail.year;
                attribution.insert("year".to_string(), provider.clone());
            }
            if record.rating.is_none() && detail.rating.is_some() {
                record.rating = detail.rating;
                attribution.insert("rating".to_string(), provider.clone());
            }
            if record.studio.is_none() && detail.studio.is_some() {
                record.studio = detail.studio.clone();
                attribution.insert("studio".to_string(), provider.clone());
            }
            if record.episode_count.is_none() && detail.episode_count.is_some() {
                record.episode_count = detail.episode_count;
                attribution.insert("episode_count".to_string(), provider.clone());
            }
            if record.genres.is_empty() && !detail.genres.is_empty() {
                record.genres = detail.genres.clone();
                attribution.insert("genres".to_string(), provider.clone());
            }
        }

        // Images: primary first, then imageQuality priority.
        let primary_images = by_metadata
            .iter()
            .find(|(p, _)| *p == request.primary_provider)
            .map(|(_, d)| d.images.clone())
            .unwrap_or_else(|| ImageFragment::new(request.primary_provider.clone()));
        let alternatives: Vec<ImageFragment> = by_metadata
            .iter()
            .filter(|(p, _)| *p != request.primary_provider)
            .map(|(_, d)| d.images.clone())
            .collect();

        let images =
            aggregator::merge_images_attributed(&primary_images, &alternatives, &self.priority);
        record.cover_image = images.cover_image;
        record.banner_image = images.banner_image;
        if let Some(provider) = images.cover_source {
            attribution.insert("cover_image".to_string(), provider);
        }
        if let Some(provider) = images.banner_source {
            attribution.insert("banner_image".to_string(), provider);
        }

        // Characters and staff merge across every provider, ordered by the
        // character priority so the catalog of record leads.
        let by_character = self.priority.sort_by_priority(
            by_metadata.clone(),
            DataKind::Character,
            |(p, _)| p,
        );
        let character_lists: Vec<Vec<PersonFragment>> = by_character
            .iter()
            .map(|(_, d)| d.characters.clone())
            .collect();
        record.characters = aggregator::merge_characters(&character_lists);
        if let Some((provider, _)) = by_character.iter().find(|(_, d)| !d.characters.is_empty()) {
            attribution.insert("characters".to_string(), provider.clone());
        }

        let staff_lists: Vec<Vec<PersonFragment>> =
            by_character.iter().map(|(_, d)| d.staff.clone()).collect();
        record.staff = aggregator::merge_staff(&staff_lists);
        if let Some((provider, _)) = by_character.iter().find(|(_, d)| !d.staff.is_empty()) {
            attribution.insert("staff".to_string(), provider.clone());
        }

        let recommendation_lists: Vec<Vec<_>> = by_metadata
            .iter()
            .map(|(_, d)| d.recommendations.clone())
            .collect();
        record.recommendations = aggregator::merge_recommendations(&recommendation_lists);
        if let Some((provider, _)) = by_metadata
            .iter()
            .find(|(_, d)| !d.recommendations.is_empty())
        {
            attribution.insert("recommendations".to_string(), provider.clone());
        }

        let (episodes, episode_source) =
            aggregator::merge_episodes(&episode_lists, &self.priority);
        record.episodes = episodes;
        if let Some(provider) = episode_source {
            attribution.insert("episodes".to_string(), provider);
        }

        let (chapters, chapter_source) =
            aggregator::merge_chapters(&chapter_lists, &self.priority);
        record.chapters = chapters;
        if let Some(provider) = chapter_source {
            attribution.insert("chapters".to_string(), provider);
        }

        // The primary's identity is a given; accepted matches carry their
        // scored confidence.
        let mut confidences: HashMap<ProviderId, f64> = matches
            .values()
            .map(|c| (c.provider.clone(), c.confidence))
            .collect();
        confidences.insert(request.primary_provider.clone(), 1.0);
        record.match_confidences = confidences;

        // Contributing providers: primary first, the rest in priority order.
        let mut ordered_contributing: Vec<ProviderId> = Vec::new();
        if contributing.contains(&request.primary_provider) {
            ordered_contributing.push(request.primary_provider.clone());
        }
        for provider in
            self.priority
                .sort_by_priority(contributing, DataKind::AnimeMetadata, |p| p)
        {
            if !ordered_contributing.contains(&provider) {
                ordered_contributing.push(provider);
            }
        }
        record.contributing_providers = ordered_contributing;
        record.data_source_attribution = attribution;

        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderFailure;
    use crate::models::{MediaSummary, ProviderPage, RecommendationFragment};
    use crate::ratelimit::RateLimiter;
    use crate::retry::RetryConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

    /// Configurable stub provider for end-to-end engine tests.
    struct StubProvider {
        provider_name: &'static str,
        search_items: Vec<MediaSummary>,
        /// How many search calls fail with a network error before success
        search_failures: u32,
        details: Option<MediaDetailFragment>,
        episodes: Vec<EpisodeFragment>,
        search_calls: AtomicU32,
    }

    impl StubProvider {
        fn new(name: &'static str) -> Self {
            Self {
                provider_name: name,
                search_items: Vec::new(),
                search_failures: 0,
                details: None,
                episodes: Vec::new(),
                search_calls: AtomicU32::new(0),
            }
        }

        fn searching(mut self, items: Vec<MediaSummary>) -> Self {
            self.search_items = items;
            self
        }

        fn failing_searches(mut self, failures: u32) -> Self {
            self.search_failures = failures;
            self
        }

        fn with_details(mut self, details: MediaDetailFragment) -> Self {
            self.details = Some(details);
            self
        }

        fn with_episodes(mut self, episodes: Vec<EpisodeFragment>) -> Self {
            self.episodes = episodes;
            self
        }
    }

    #[async_trait]
    impl MetadataProvider for StubProvider {
        fn name(&self) -> &'static str {
            self.provider_name
        }

        async fn search(
            &self,
            _query: &str,
            _kind: MediaKind,
            _page: u32,
            _per_page: u32,
        ) -> Result<ProviderPage<MediaSummary>, ProviderFailure> {
            let call = self.search_calls.fetch_add(1, AtomicOrdering::SeqCst);
            if call < self.search_failures {
                return Err(ProviderFailure::Network {
                    message: "search timed out".to_string(),
                });
            }
            Ok(ProviderPage {
                items: self.search_items.clone(),
                total_count: Some(self.search_items.len() as i64),
                has_next_page: false,
            })
        }

        async fn fetch_details(
            &self,
            _media_id: &str,
            _kind: MediaKind,
        ) -> Result<MediaDetailFragment, ProviderFailure> {
            match &self.details {
                Some(details) => Ok(details.clone()),
                None => Err(ProviderFailure::Server { status: 500 }),
            }
        }

        async fn fetch_episodes(
            &self,
            _media_id: &str,
        ) -> Result<Vec<EpisodeFragment>, ProviderFailure> {
            Ok(self.episodes.clone())
        }
    }

    fn summary(id: &str, title: &str) -> MediaSummary {
        MediaSummary {
            id: id.to_string(),
            title: title.to_string(),
            alt_titles: Vec::new(),
            year: None,
            cover_image: None,
        }
    }

    fn detail(provider: &str, id: &str, title: &str) -> MediaDetailFragment {
        let mut d = MediaDetailFragment::new(ProviderId::from(provider), id);
        d.title = Some(title.to_string());
        d
    }

    // Initialize the sqlite cache while keeping the scheduler busy with a
    // self-waking yield loop. Under `start_paused` a bare `init().await`
    // parks the runtime waiting on sqlite's worker thread, letting tokio
    // auto-advance the virtual clock past the pool acquire timeout and fail
    // with `PoolTimedOut`. The spin keeps a task always ready, so the clock
    // never advances until the real connection completes.
    async fn init_cache(cache: &CrossReferenceCache) {
        let init = cache.init();
        tokio::pin!(init);
        loop {
            tokio::select! {
                biased;
                r = &mut init => { r.unwrap(); break; }
                _ = tokio::task::yield_now() => {}
            }
        }
    }

    async fn engine_with(providers: Vec<Arc<dyn MetadataProvider>>) -> AggregationEngine {
        let cache = Arc::new(CrossReferenceCache::new("sqlite::memory:"));
        init_cache(&cache).await;
        let retry = Arc::new(RetryExecutor::new(
            RetryConfig::default(),
            Arc::new(RateLimiter::new()),
        ));
        AggregationEngine::new(providers, retry, Arc::new(PriorityTable::default()), cache)
    }

    fn naruto_request() -> AggregationRequest {
        AggregationRequest {
            title: "Naruto".to_string(),
            kind: MediaKind::Anime,
            primary_provider: ProviderId::from("anilist"),
            primary_media_id: "20".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_partial_success() {
        // Primary resolves; tmdb times out twice then matches; kitsu's best
        // candidate is unrelated and falls below the threshold.
        let mut anilist_detail = detail("anilist", "20", "Naruto");
        anilist_detail.images.cover_image = Some("anilist-cover.jpg".to_string());

        let mut tmdb_detail = detail("tmdb", "1429", "Naruto");
        tmdb_detail.images.banner_image = Some("tmdb-banner.jpg".to_string());

        let engine = engine_with(vec![
            Arc::new(StubProvider::new("anilist").with_details(anilist_detail)),
            Arc::new(
                StubProvider::new("tmdb")
                    .searching(vec![summary("1429", "Naruto")])
                    .failing_searches(2)
                    .with_details(tmdb_detail),
            ),
            Arc::new(StubProvider::new("kitsu").searching(vec![summary("11", "Bleach")])),
        ])
        .await;

        let record = engine.aggregate(&naruto_request()).await.unwrap();

        assert_eq!(
            record.contributing_providers,
            vec![ProviderId::from("anilist"), ProviderId::from("tmdb")]
        );
        assert!(!record
            .contributing_providers
            .contains(&ProviderId::from("kitsu")));
        assert!(record.match_confidences[&ProviderId::from("tmdb")] >= 0.8);
        assert!(
            (record.match_confidences[&ProviderId::from("anilist")] - 1.0).abs() < f64::EPSILON
        );
        assert!(!record.match_confidences.contains_key(&ProviderId::from("kitsu")));

        assert_eq!(record.title.as_deref(), Some("Naruto"));
        assert_eq!(record.cover_image.as_deref(), Some("anilist-cover.jpg"));
        assert_eq!(record.banner_image.as_deref(), Some("tmdb-banner.jpg"));
        assert_eq!(
            record.data_source_attribution.get("cover_image"),
            Some(&ProviderId::from("anilist"))
        );
        assert_eq!(
            record.data_source_attribution.get("banner_image"),
            Some(&ProviderId::from("tmdb"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_providers_failing_is_an_error() {
        // No details anywhere and no search hits: nothing to merge.
        let engine = engine_with(vec![
            Arc::new(StubProvider::new("anilist")),
            Arc::new(StubProvider::new("tmdb")),
        ])
        .await;

        let err = engine.aggregate(&naruto_request()).await.unwrap_err();
        assert!(matches!(
            err,
            AggregateError::AllProvidersFailed { title } if title == "Naruto"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_primary_failure_degrades_not_aborts() {
        // The primary's detail fetch dies, but tmdb still matches and
        // contributes; the pass succeeds without the primary.
        let engine = engine_with(vec![
            Arc::new(StubProvider::new("anilist")),
            Arc::new(
                StubProvider::new("tmdb")
                    .searching(vec![summary("1429", "Naruto")])
                    .with_details(detail("tmdb", "1429", "Naruto")),
            ),
        ])
        .await;

        let record = engine.aggregate(&naruto_request()).await.unwrap();
        assert_eq!(
            record.contributing_providers,
            vec![ProviderId::from("tmdb")]
        );
        assert_eq!(
            record.data_source_attribution.get("title"),
            Some(&ProviderId::from("tmdb"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_base_fields_follow_priority_order() {
        // jikan outranks tmdb for animeMetadata, so its description wins
        // even though both supplied one.
        let mut jikan_detail = detail("jikan", "1", "Naruto");
        jikan_detail.description = Some("jikan synopsis".to_string());
        let mut tmdb_detail = detail("tmdb", "1429", "Naruto");
        tmdb_detail.description = Some("tmdb overview".to_string());

        let engine = engine_with(vec![
            Arc::new(
                StubProvider::new("jikan")
                    .searching(vec![summary("1", "Naruto")])
                    .with_details(jikan_detail),
            ),
            Arc::new(
                StubProvider::new("tmdb")
                    .searching(vec![summary("1429", "Naruto")])
                    .with_details(tmdb_detail),
            ),
            Arc::new(
                StubProvider::new("anilist").with_details(detail("anilist", "20", "Naruto")),
            ),
        ])
        .await;

        let record = engine.aggregate(&naruto_request()).await.unwrap();
        assert_eq!(record.description.as_deref(), Some("jikan synopsis"));
        assert_eq!(
            record.data_source_attribution.get("description"),
            Some(&ProviderId::from("jikan"))
        );
        // anilist leads the metadata ordering, so the title stays its.
        assert_eq!(
            record.data_source_attribution.get("title"),
            Some(&ProviderId::from("anilist"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_episode_thumbnails_merge_across_providers() {
        let episode = |n: i32, thumb: Option<&str>| EpisodeFragment {
            number: n,
            title: Some(format!("Episode {}", n)),
            overview: None,
            air_date: None,
            thumbnail: thumb.map(str::to_string),
            runtime_minutes: None,
        };

        let engine = engine_with(vec![
            Arc::new(
                StubProvider::new("anilist")
                    .with_details(detail("anilist", "20", "Naruto"))
                    .with_episodes(vec![episode(1, None), episode(2, None)]),
            ),
            Arc::new(
                StubProvider::new("tmdb")
                    .searching(vec![summary("1429", "Naruto")])
                    .with_details(detail("tmdb", "1429", "Naruto"))
                    .with_episodes(vec![episode(1, Some("still-1.jpg"))]),
            ),
        ])
        .await;

        let record = engine.aggregate(&naruto_request()).await.unwrap();
        assert_eq!(record.episodes.len(), 2);
        assert_eq!(record.episodes[0].thumbnail.as_deref(), Some("still-1.jpg"));
        assert_eq!(record.episodes[1].thumbnail, None);
        assert_eq!(
            record.data_source_attribution.get("episodes"),
            Some(&ProviderId::from("anilist"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_recommendations_dedup_across_providers() {
        let rec = |title: &str, rating: i32| RecommendationFragment {
            id: format!("{}-{}", title, rating),
            title: title.to_string(),
            cover_image: None,
            rating,
        };

        let mut anilist_detail = detail("anilist", "20", "Naruto");
        anilist_detail.recommendations = vec![rec("Bleach", 85), rec("One Piece", 80)];
        let mut jikan_detail = detail("jikan", "1", "Naruto");
        jikan_detail.recommendations = vec![rec("bleach", 90)];

        let engine = engine_with(vec![
            Arc::new(StubProvider::new("anilist").with_details(anilist_detail)),
            Arc::new(
                StubProvider::new("jikan")
                    .searching(vec![summary("1", "Naruto")])
                    .with_details(jikan_detail),
            ),
        ])
        .await;

        let record = engine.aggregate(&naruto_request()).await.unwrap();
        assert_eq!(record.recommendations.len(), 2);
        let bleach = record
            .recommendations
            .iter()
            .find(|r| r.title.eq_ignore_ascii_case("bleach"))
            .unwrap();
        assert_eq!(bleach.rating, 90);
    }

    #[tokio::test(start_paused = true)]
    async fn test_aggregate_by_title_resolves_primary() {
        let engine = engine_with(vec![Arc::new(
            StubProvider::new("anilist")
                .searching(vec![
                    summary("20", "Naruto"),
                    summary("1735", "Naruto Shippuden"),
                ])
                .with_details(detail("anilist", "20", "Naruto")),
        )])
        .await;

        let record = engine
            .aggregate_by_title("Naruto", MediaKind::Anime, &ProviderId::from("anilist"))
            .await
            .unwrap();
        assert_eq!(record.title.as_deref(), Some("Naruto"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_aggregate_by_title_with_no_results_fails() {
        let engine = engine_with(vec![Arc::new(StubProvider::new("anilist"))]).await;

        let err = engine
            .aggregate_by_title("Naruto", MediaKind::Anime, &ProviderId::from("anilist"))
            .await
            .unwrap_err();
        assert!(matches!(err, AggregateError::AllProvidersFailed { .. }));
    }
}
