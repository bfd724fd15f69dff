use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

const ENV_PREFIX: &str = "GREENSLEEVES_";

/// Remote cover artwork sources, in priority order. Some CDNs block
/// hotlinking, so more than one mirror is tried.
const DEFAULT_ARTWORK_URLS: [&str; 2] = [
    "https://images.discogs.com/1QwQvQwQvQwQvQwQvQwQvQwQvQw=/fit-in/600x600/filters:strip_icc():format(jpeg):mode_rgb():quality(90)/discogs-images/R-7549711-1463402822-5637.jpeg.jpg",
    "https://img.discogs.com/SW1hZ2U6MjAzNjgwMzI=/fit-in/600x600/filters:strip_icc():format(jpeg):mode_rgb():quality(90)/discogs-images/R-7549711-1463402822-5637.jpeg.jpg",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

/// Process-wide configuration, built once in `main` and carried in `AppState`
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database_path: String,
    pub static_dir: PathBuf,
    pub artwork: ArtworkConfig,
}

/// Artwork proxy configuration
#[derive(Debug, Clone)]
pub struct ArtworkConfig {
    pub candidates: Vec<String>,
    pub timeout: Duration,
    /// Buffer successful fetches into `cache_file` instead of streaming them through
    pub cache_fetched_images: bool,
    pub cache_file: PathBuf,
    pub fallback_file: PathBuf,
}

impl ArtworkConfig {
    /// Default layout under a static root: `cache/` for fetched images and
    /// `images/` for bundled fallbacks
    pub fn under(static_dir: &std::path::Path) -> Self {
        Self {
            candidates: DEFAULT_ARTWORK_URLS.iter().map(|u| u.to_string()).collect(),
            timeout: Duration::from_secs(6),
            cache_fetched_images: true,
            cache_file: static_dir.join("cache").join("greensleeves.jpg"),
            fallback_file: static_dir.join("images").join("greensleeves.svg"),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let static_dir = PathBuf::from("static");
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_path: "greensleeves.db".to_string(),
            artwork: ArtworkConfig::under(&static_dir),
            static_dir,
        }
    }
}

impl AppConfig {
    /// Build the configuration from `GREENSLEEVES_*` environment variables,
    /// falling back to defaults for anything unset
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            let key = format!("{}{}", ENV_PREFIX, name);
            let value = lookup(&key);
            if value.is_none() {
                info!("{} not set, using default", key);
            }
            value.map(|v| (key, v))
        };

        let mut config = AppConfig::default();

        if let Some((key, value)) = get("BIND_ADDR") {
            config.bind_addr = parse(&key, &value)?;
        }
        if let Some((_, value)) = get("DATABASE_PATH") {
            config.database_path = value;
        }
        if let Some((_, value)) = get("STATIC_DIR") {
            config.static_dir = PathBuf::from(value);
            config.artwork = ArtworkConfig::under(&config.static_dir);
        }
        if let Some((key, value)) = get("ARTWORK_URLS") {
            let urls: Vec<String> = value
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(String::from)
                .collect();
            for url in &urls {
                reqwest::Url::parse(url).map_err(|e| ConfigError::Invalid {
                    key: key.clone(),
                    message: format!("{}: {}", url, e),
                })?;
            }
            config.artwork.candidates = urls;
        }
        if let Some((key, value)) = get("ARTWORK_TIMEOUT_SECS") {
            let secs: u64 = parse(&key, &value)?;
            // A zero timeout would fail every candidate before it is sent
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    message: "timeout must be at least one second".to_string(),
                });
            }
            config.artwork.timeout = Duration::from_secs(secs);
        }
        if let Some((key, value)) = get("CACHE_FETCHED_IMAGES") {
            config.artwork.cache_fetched_images = parse(&key, &value)?;
        }

        Ok(config)
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key: key.to_string(),
        message: e.to_string(),
    })
}
