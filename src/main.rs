use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use animerge::cache::CrossReferenceCache;
use animerge::config::AppConfig;
use animerge::engine::AggregationEngine;
use animerge::models::{MediaKind, ProviderId};
use animerge::providers::{
    self, AniListProvider, JikanProvider, KitsuProvider, MangaDexProvider, MetadataProvider,
    TmdbProvider,
};
use animerge::ratelimit::RateLimiter;
use animerge::retry::RetryExecutor;

fn usage() -> ! {
    eprintln!("Usage: animerge <title> [anime|manga|movie]");
    eprintln!();
    eprintln!("Resolves the title on the primary provider, cross-references it on");
    eprintln!("every other configured catalog and prints the aggregated record.");
    std::process::exit(2);
}

fn parse_kind(kind: &str) -> Option<MediaKind> {
    match kind {
        "anime" => Some(MediaKind::Anime),
        "manga" => Some(MediaKind::Manga),
        "movie" => Some(MediaKind::Movie),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "animerge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load .env file if present
    dotenvy::dotenv().ok();

    let mut args = std::env::args().skip(1);
    let Some(title) = args.next() else {
        usage();
    };
    let kind = match args.next() {
        Some(kind) => parse_kind(&kind).unwrap_or_else(|| usage()),
        None => MediaKind::Anime,
    };

    let config = AppConfig::load();
    config.paths.ensure_dirs().await?;
    config.log_config();

    let cache = Arc::new(
        CrossReferenceCache::new(config.database_url()).with_ttl_days(config.cache_ttl_days),
    );
    cache
        .init()
        .await
        .context("Failed to open cross-reference cache")?;

    // Evict anything past the TTL before this pass adds fresh entries.
    if let Err(e) = cache.clear_expired().await {
        tracing::warn!("Expired-entry sweep failed: {}", e);
    }

    let rate_limiter = Arc::new(RateLimiter::new());
    let retry = Arc::new(RetryExecutor::new(config.retry_config(), rate_limiter));
    let priority = Arc::new(config.priority_table());

    let http = providers::default_http_client();
    let mut catalog: Vec<Arc<dyn MetadataProvider>> = vec![
        Arc::new(AniListProvider::new(http.clone())),
        Arc::new(KitsuProvider::new(http.clone())),
        Arc::new(JikanProvider::new(http.clone())),
        Arc::new(MangaDexProvider::new(http.clone())),
    ];
    if let Some(key) = config.tmdb_api_key.clone() {
        catalog.push(Arc::new(TmdbProvider::new(http, key)));
    }
    catalog.retain(|provider| config.provider_enabled(provider.name()));

    let engine = AggregationEngine::new(catalog, retry, priority, cache);

    let primary = ProviderId::from(config.primary_provider.as_str());
    let record = engine
        .aggregate_by_title(&title, kind, &primary)
        .await
        .with_context(|| format!("Aggregation failed for '{}'", title))?;

    tracing::info!(
        "Aggregated '{}' from {} provider(s)",
        title,
        record.contributing_providers.len()
    );

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
