// Configuration module for animerge
// Handles XDG-compliant directory paths and the TOML configuration file

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::cache;
use crate::models::ProviderId;
use crate::priority::{DataKind, PriorityTable};
use crate::retry::RetryConfig;

const APP_NAME: &str = "animerge";
const CONFIG_FILENAME: &str = "config.toml";

/// TOML configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Directory paths (overrides XDG defaults)
    pub paths: PathsConfig,

    /// Identity matching configuration
    pub matching: MatchingConfig,

    /// Retry profile selection
    pub retry: RetryFileConfig,

    /// Cross-reference cache configuration
    pub cache: CacheConfig,

    /// Metadata provider configuration
    pub metadata: MetadataConfig,

    /// Per-data-kind priority list overrides, keyed by data kind name
    /// (e.g. "imageQuality" = ["tmdb", "anilist"])
    pub priorities: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Override data directory (cross-reference database location)
    pub data_dir: Option<PathBuf>,

    /// Override cache directory
    pub cache_dir: Option<PathBuf>,

    /// Override config directory
    pub config_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Minimum identity confidence for accepting a cross-provider match
    pub min_confidence_threshold: f64,

    /// Provider that initiates lookups
    pub primary_provider: String,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            min_confidence_threshold: 0.8,
            primary_provider: "anilist".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryFileConfig {
    /// "default", "aggressive" or "conservative"
    pub profile: String,
}

impl Default for RetryFileConfig {
    fn default() -> Self {
        Self {
            profile: "default".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Days before a cached cross-reference is considered stale
    pub ttl_days: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_days: cache::DEFAULT_TTL_DAYS,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// TMDB API key (optional, enables the TMDB provider)
    pub tmdb_api_key: Option<String>,

    /// Providers to leave out of aggregation passes
    pub disabled_providers: Vec<String>,
}

/// Application paths following XDG Base Directory Specification on Unix
/// On other platforms, falls back to platform-specific locations
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for configuration files (config.toml)
    pub config_dir: PathBuf,

    /// Directory for persistent data (cross-reference database)
    pub data_dir: PathBuf,

    /// Directory for cache files
    pub cache_dir: PathBuf,
}

impl AppPaths {
    /// Create application paths using XDG directories (or fallbacks)
    ///
    /// Priority order:
    /// 1. Environment variables (ANIMERGE_CONFIG_DIR, ANIMERGE_DATA_DIR, ANIMERGE_CACHE_DIR)
    /// 2. Config file overrides
    /// 3. XDG/platform directories
    /// 4. Current directory fallback
    pub fn new(config_overrides: &PathsConfig) -> Self {
        Self {
            config_dir: Self::resolve_dir(
                "ANIMERGE_CONFIG_DIR",
                &config_overrides.config_dir,
                dirs::config_dir(),
            ),
            data_dir: Self::resolve_dir(
                "ANIMERGE_DATA_DIR",
                &config_overrides.data_dir,
                dirs::data_dir(),
            ),
            cache_dir: Self::resolve_dir(
                "ANIMERGE_CACHE_DIR",
                &config_overrides.cache_dir,
                dirs::cache_dir(),
            ),
        }
    }

    /// Create application paths using the current directory (portable mode)
    pub fn current_dir() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            config_dir: cwd.clone(),
            data_dir: cwd.clone(),
            cache_dir: cwd.join("cache"),
        }
    }

    fn resolve_dir(
        env_var: &str,
        config_override: &Option<PathBuf>,
        platform_dir: Option<PathBuf>,
    ) -> PathBuf {
        if let Ok(path) = std::env::var(env_var) {
            return PathBuf::from(path);
        }
        if let Some(path) = config_override {
            return path.clone();
        }
        if let Some(dir) = platform_dir {
            return dir.join(APP_NAME);
        }
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }

    /// Get the cross-reference database file path
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("animerge.db")
    }

    /// Get the database URL for SQLite
    pub fn database_url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.database_path().display())
    }

    /// Get the config file path
    pub fn config_file_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILENAME)
    }

    /// Ensure all directories exist
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.config_dir).await?;
        tokio::fs::create_dir_all(&self.data_dir).await?;
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        Ok(())
    }

    /// Log the configured paths
    pub fn log_paths(&self) {
        tracing::info!("Configuration directory: {}", self.config_dir.display());
        tracing::info!("Data directory: {}", self.data_dir.display());
        tracing::debug!("Database path: {}", self.database_path().display());
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new(&PathsConfig::default())
    }
}

/// Application configuration - combines TOML file with environment overrides
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Application paths
    pub paths: AppPaths,

    /// Retry profile name
    pub retry_profile: String,

    /// Minimum identity confidence for cross-provider matches
    pub min_confidence_threshold: f64,

    /// Cross-reference cache TTL in days
    pub cache_ttl_days: i64,

    /// Provider that initiates lookups
    pub primary_provider: String,

    /// TMDB API key (optional)
    pub tmdb_api_key: Option<String>,

    /// Providers excluded from aggregation
    pub disabled_providers: Vec<String>,

    /// Per-data-kind priority overrides
    pub priority_overrides: HashMap<String, Vec<String>>,
}

impl AppConfig {
    /// Load configuration from TOML file and environment
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. TOML config file
    /// 3. Default values
    pub fn load() -> Self {
        let portable_mode = std::env::var("ANIMERGE_PORTABLE")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        if portable_mode {
            tracing::info!("Running in portable mode (using current directory)");
            let config_file = Self::load_config_file(&AppPaths::current_dir().config_dir);
            return Self::build(config_file, Some(AppPaths::current_dir()));
        }

        let config_dir = Self::find_config_dir();
        let config_file = Self::load_config_file(&config_dir);
        Self::build(config_file, None)
    }

    /// Find the config directory (for locating config.toml)
    fn find_config_dir() -> PathBuf {
        if let Ok(path) = std::env::var("ANIMERGE_CONFIG_DIR") {
            return PathBuf::from(path);
        }
        if let Some(dir) = dirs::config_dir() {
            return dir.join(APP_NAME);
        }
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }

    /// Load and parse the TOML config file
    fn load_config_file(config_dir: &std::path::Path) -> ConfigFile {
        let config_path = config_dir.join(CONFIG_FILENAME);

        if !config_path.exists() {
            tracing::debug!(
                "No config file found at {}, using defaults",
                config_path.display()
            );
            return ConfigFile::default();
        }

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded configuration from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse config file {}: {}. Using defaults.",
                        config_path.display(),
                        e
                    );
                    ConfigFile::default()
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read config file {}: {}. Using defaults.",
                    config_path.display(),
                    e
                );
                ConfigFile::default()
            }
        }
    }

    /// Build configuration from config file with environment overrides
    fn build(config_file: ConfigFile, paths: Option<AppPaths>) -> Self {
        let paths = paths.unwrap_or_else(|| AppPaths::new(&config_file.paths));

        let retry_profile = std::env::var("ANIMERGE_RETRY_PROFILE")
            .unwrap_or(config_file.retry.profile);

        let min_confidence_threshold = std::env::var("ANIMERGE_MIN_CONFIDENCE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(config_file.matching.min_confidence_threshold)
            .clamp(0.0, 1.0);

        let cache_ttl_days = std::env::var("ANIMERGE_CACHE_TTL_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(config_file.cache.ttl_days);

        let primary_provider = std::env::var("ANIMERGE_PRIMARY_PROVIDER")
            .unwrap_or(config_file.matching.primary_provider);

        let tmdb_api_key = std::env::var("TMDB_API_KEY")
            .ok()
            .or(config_file.metadata.tmdb_api_key)
            .filter(|key| !key.is_empty());

        // Comma-separated env list beats the config file wholesale.
        let disabled_providers = match std::env::var("ANIMERGE_DISABLED_PROVIDERS") {
            Ok(list) => list
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(_) => config_file.metadata.disabled_providers,
        };

        Self {
            paths,
            retry_profile,
            min_confidence_threshold,
            cache_ttl_days,
            primary_provider,
            tmdb_api_key,
            disabled_providers,
            priority_overrides: config_file.priorities,
        }
    }

    /// Get the database URL, with override from DATABASE_URL env var
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| self.paths.database_url())
    }

    /// The retry configuration for the selected profile
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::profile(&self.retry_profile)
    }

    /// Build the priority table: defaults, threshold, then overrides.
    /// Unknown data-kind keys are warned about and ignored.
    pub fn priority_table(&self) -> PriorityTable {
        let mut table = PriorityTable::new(self.min_confidence_threshold);
        for (key, providers) in &self.priority_overrides {
            match DataKind::parse(key) {
                Some(kind) => {
                    let order = providers.iter().map(|p| ProviderId::from(p.as_str())).collect();
                    table = table.with_override(kind, order);
                }
                None => {
                    tracing::warn!("Unknown priority data kind '{}' in config, ignoring", key);
                }
            }
        }
        table
    }

    pub fn provider_enabled(&self, name: &str) -> bool {
        !self.disabled_providers.iter().any(|p| p == name)
    }

    /// Log configuration status
    pub fn log_config(&self) {
        self.paths.log_paths();
        tracing::info!(
            "Primary provider: {} (threshold {:.2}, retry profile '{}', cache TTL {}d)",
            self.primary_provider,
            self.min_confidence_threshold,
            self.retry_profile,
            self.cache_ttl_days
        );

        if self.tmdb_api_key.is_some() {
            tracing::info!("TMDB provider: ENABLED");
        } else {
            tracing::info!("TMDB provider: disabled");
            tracing::info!("Hint: Add tmdb_api_key to config.toml or set TMDB_API_KEY env var");
        }

        if !self.disabled_providers.is_empty() {
            tracing::info!("Disabled providers: {}", self.disabled_providers.join(", "));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_dir_paths() {
        let paths = AppPaths::current_dir();
        assert!(paths.config_dir.is_absolute() || paths.config_dir == PathBuf::from("."));
        assert!(paths.cache_dir.ends_with("cache"));
    }

    #[test]
    fn test_database_url_format() {
        let paths = AppPaths::current_dir();
        let url = paths.database_url();
        assert!(url.starts_with("sqlite:"));
        assert!(url.ends_with("?mode=rwc"));
    }

    #[test]
    fn test_default_config_file() {
        let config = ConfigFile::default();
        assert!((config.matching.min_confidence_threshold - 0.8).abs() < f64::EPSILON);
        assert_eq!(config.matching.primary_provider, "anilist");
        assert_eq!(config.retry.profile, "default");
        assert_eq!(config.cache.ttl_days, 7);
        assert!(config.metadata.tmdb_api_key.is_none());
        assert!(config.priorities.is_empty());
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
[matching]
min_confidence_threshold = 0.75
primary_provider = "kitsu"

[retry]
profile = "aggressive"

[cache]
ttl_days = 14

[metadata]
tmdb_api_key = "test_key"
disabled_providers = ["mangadex"]

[paths]
data_dir = "/custom/data"

[priorities]
imageQuality = ["kitsu", "tmdb"]
"#;
        let config: ConfigFile = toml::from_str(toml_str).unwrap();
        assert!((config.matching.min_confidence_threshold - 0.75).abs() < f64::EPSILON);
        assert_eq!(config.matching.primary_provider, "kitsu");
        assert_eq!(config.retry.profile, "aggressive");
        assert_eq!(config.cache.ttl_days, 14);
        assert_eq!(config.metadata.tmdb_api_key, Some("test_key".to_string()));
        assert_eq!(config.metadata.disabled_providers, vec!["mangadex"]);
        assert_eq!(config.paths.data_dir, Some(PathBuf::from("/custom/data")));
        assert_eq!(
            config.priorities.get("imageQuality"),
            Some(&vec!["kitsu".to_string(), "tmdb".to_string()])
        );
    }

    #[test]
    fn test_partial_config_toml() {
        // Partial configs work (only specify what you need)
        let toml_str = r#"
[cache]
ttl_days = 3
"#;
        let config: ConfigFile = toml::from_str(toml_str).unwrap();
        assert_eq!(config.cache.ttl_days, 3);
        assert_eq!(config.retry.profile, "default"); // default
    }

    #[test]
    fn test_priority_table_applies_overrides() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "imageQuality".to_string(),
            vec!["kitsu".to_string(), "tmdb".to_string()],
        );
        overrides.insert("notAKind".to_string(), vec!["tmdb".to_string()]);

        let config = AppConfig {
            paths: AppPaths::current_dir(),
            retry_profile: "default".to_string(),
            min_confidence_threshold: 0.9,
            cache_ttl_days: 7,
            primary_provider: "anilist".to_string(),
            tmdb_api_key: None,
            disabled_providers: Vec::new(),
            priority_overrides: overrides,
        };

        let table = config.priority_table();
        assert_eq!(
            table.priority_for(DataKind::ImageQuality),
            &[ProviderId::from("kitsu"), ProviderId::from("tmdb")]
        );
        // The bogus key changed nothing; animeMetadata still leads with anilist.
        assert_eq!(
            table.priority_for(DataKind::AnimeMetadata)[0],
            ProviderId::from("anilist")
        );
        assert!((table.min_confidence_threshold() - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_provider_enabled() {
        let config = AppConfig {
            paths: AppPaths::current_dir(),
            retry_profile: "default".to_string(),
            min_confidence_threshold: 0.8,
            cache_ttl_days: 7,
            primary_provider: "anilist".to_string(),
            tmdb_api_key: None,
            disabled_providers: vec!["mangadex".to_string()],
            priority_overrides: HashMap::new(),
        };
        assert!(config.provider_enabled("anilist"));
        assert!(!config.provider_enabled("mangadex"));
    }
}
