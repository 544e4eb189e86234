// Identity matcher: resolve one title across every configured provider
//
// Cache hits are accepted outright (a hit records a previously accepted
// match); the rest of the target providers are searched concurrently and
// their best candidates confidence-scored against the source title. A
// provider that fails or scores below the threshold is simply absent from
// the result; it never aborts the match.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use tokio::time::Duration;

use crate::cache::CrossReferenceCache;
use crate::models::{MatchCandidate, MediaKind, MediaSummary, ProviderId};
use crate::priority::PriorityTable;
use crate::providers::MetadataProvider;
use crate::retry::RetryExecutor;

const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(10);

pub struct IdentityMatcher {
    providers: HashMap<ProviderId, Arc<dyn MetadataProvider>>,
    retry: Arc<RetryExecutor>,
    priority: Arc<PriorityTable>,
    cache: Arc<CrossReferenceCache>,
    search_timeout: Duration,
}

impl IdentityMatcher {
    pub fn new(
        providers: HashMap<ProviderId, Arc<dyn MetadataProvider>>,
        retry: Arc<RetryExecutor>,
        priority: Arc<PriorityTable>,
        cache: Arc<CrossReferenceCache>,
    ) -> Self {
        Self {
            providers,
            retry,
            priority,
            cache,
            search_timeout: DEFAULT_SEARCH_TIMEOUT,
        }
    }

    pub fn with_search_timeout(mut self, timeout: Duration) -> Self {
        self.search_timeout = timeout;
        self
    }

    /// Resolve `title` (already resolved as `primary_media_id` on the
    /// primary provider) on every target provider. Returns only accepted
    /// matches; newly accepted mappings are persisted back into the
    /// cross-reference cache before returning.
    pub async fn match_title(
        &self,
        title: &str,
        kind: MediaKind,
        primary_provider: &ProviderId,
        primary_media_id: &str,
        target_providers: &[ProviderId],
    ) -> HashMap<ProviderId, MatchCandidate> {
        let mut accepted: HashMap<ProviderId, MatchCandidate> = HashMap::new();

        // Cache first. A read failure degrades to "no cached mapping".
        match self
            .cache
            .lookup_entry(primary_provider, primary_media_id)
            .await
        {
            Ok(Some(entry)) if !self.cache.is_expired(entry.cached_at) => {
                for (provider, media_id) in entry.mappings {
                    if target_providers.contains(&provider) {
                        accepted.insert(
                            provider.clone(),
                            MatchCandidate {
                                provider,
                                media_id,
                                confidence: 1.0,
                            },
                        );
                    }
                }
                if !accepted.is_empty() {
                    tracing::debug!(
                        "Cross-reference cache hit for {}_{}: {} provider(s)",
                        primary_provider,
                        primary_media_id,
                        accepted.len()
                    );
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    "Cross-reference lookup failed for {}_{}: {} (assuming no cached mapping)",
                    primary_provider,
                    primary_media_id,
                    e
                );
            }
        }

        // Live search for every target without a cache hit, concurrently.
        let pending: Vec<ProviderId> = target_providers
            .iter()
            .filter(|p| *p != primary_provider && !accepted.contains_key(*p))
            .cloned()
            .collect();

        let searches = pending.iter().map(|provider| {
            let provider = provider.clone();
            async move {
                let candidate = self.search_candidate(&provider, title, kind).await;
                (provider, candidate)
            }
        });

        let mut fresh: HashMap<ProviderId, String> = HashMap::new();
        for (provider, candidate) in join_all(searches).await {
            if let Some(candidate) = candidate {
                fresh.insert(provider, candidate.media_id.clone());
                accepted.insert(candidate.provider.clone(), candidate);
            }
        }

        // Persist what this pass learned (merge-on-write). Losing this write
        // only costs a future re-search.
        if !fresh.is_empty() {
            if let Err(e) = self
                .cache
                .store(primary_provider, primary_media_id, &fresh)
                .await
            {
                tracing::warn!(
                    "Failed to persist cross-references for {}_{}: {}",
                    primary_provider,
                    primary_media_id,
                    e
                );
            }
        }

        accepted
    }

    /// Search one provider and return its best accepted candidate, if any.
    async fn search_candidate(
        &self,
        provider: &ProviderId,
        title: &str,
        kind: MediaKind,
    ) -> Option<MatchCandidate> {
        let client = match self.providers.get(provider) {
            Some(client) if client.is_available() => client.clone(),
            Some(_) => {
                tracing::debug!("{} is not available, skipping identity search", provider);
                return None;
            }
            None => {
                tracing::debug!("No client configured for {}, skipping", provider);
                return None;
            }
        };

        let result = self
            .retry
            .execute(provider, "search", self.search_timeout, || {
                let client = client.clone();
                async move { client.search(title, kind, 1, 10).await }
            })
            .await;

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!("Identity search on {} failed: {}", provider, e);
                return None;
            }
        };

        let (confidence, best) = page
            .items
            .iter()
            .map(|item| (candidate_confidence(title, item), item))
            .max_by(|(a, _), (b, _)| a.partial_cmp(b).unwrap_or(Ordering::Equal))?;

        if !self.priority.meets_confidence_threshold(confidence) {
            tracing::debug!(
                "{} best candidate '{}' for '{}' scored {:.2}, below threshold {:.2}",
                provider,
                best.title,
                title,
                confidence,
                self.priority.min_confidence_threshold()
            );
            return None;
        }

        tracing::info!(
            "{} matched '{}' -> {} (confidence {:.2})",
            provider,
            title,
            best.id,
            confidence
        );
        Some(MatchCandidate {
            provider: provider.clone(),
            media_id: best.id.clone(),
            confidence,
        })
    }
}

/// Best similarity between the query and any of a candidate's titles.
pub(crate) fn candidate_confidence(query: &str, item: &MediaSummary) -> f64 {
    std::iter::once(item.title.as_str())
        .chain(item.alt_titles.iter().map(|s| s.as_str()))
        .map(|t| title_similarity(query, t))
        .fold(0.0, f64::max)
}

/// Normalize a title for comparison: lowercase, punctuation becomes a
/// separator, runs of whitespace collapse to one space.
pub(crate) fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Deterministic title similarity in [0, 1].
///
/// Tiered: exact normalized equality, then prefix and containment scaled by
/// length ratio, then word-set overlap, with a Levenshtein-ratio floor for
/// near-misses. The exact formula is an internal tunable detail; only
/// determinism, the [0, 1] range, and ordering behavior are relied upon.
pub(crate) fn title_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_title(a);
    let b = normalize_title(b);

    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let (shorter, longer) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    let ratio = shorter.len() as f64 / longer.len() as f64;

    let mut score: f64 = 0.0;
    if longer.starts_with(shorter.as_str()) {
        score = 0.70 + 0.25 * ratio;
    } else if longer.contains(shorter.as_str()) {
        score = 0.55 + 0.30 * ratio;
    }

    let a_words: HashSet<&str> = a.split(' ').collect();
    let b_words: HashSet<&str> = b.split(' ').collect();
    let common = a_words.intersection(&b_words).count();
    if common > 0 {
        let overlap = common as f64 / a_words.len().max(b_words.len()) as f64;
        score = score.max(0.85 * overlap);
    }

    if shorter.chars().count() < 50 {
        let distance = edit_distance(shorter, longer);
        let max_len = longer.chars().count().max(1) as f64;
        score = score.max((1.0 - distance as f64 / max_len) * 0.95);
    }

    score.clamp(0.0, 1.0)
}

/// Levenshtein distance over chars, two-row rolling table.
fn edit_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let m = a_chars.len();
    let n = b_chars.len();

    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr: Vec<usize> = vec![0; n + 1];

    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = if a_chars[i - 1] == b_chars[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}
