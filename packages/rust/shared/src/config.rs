//! Application configuration for pokecache.
//!
//! User config lives at `~/.pokecache/pokecache.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{PokeCacheError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "pokecache.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".pokecache";

// ---------------------------------------------------------------------------
// Config structs (matching pokecache.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote catalog settings.
    #[serde(default)]
    pub pokeapi: PokeApiConfig,

    /// Where fetched and cached records live.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Refresh pipeline sizing.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Defaults for `pokecache fetch`.
    #[serde(default)]
    pub fetch: FetchDefaults,
}

/// `[pokeapi]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PokeApiConfig {
    /// API root; detail and ability paths are joined onto it.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PokeApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://pokeapi.co/api/v2/".into()
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// CSV file written by `fetch` and streamed by `refresh`.
    #[serde(default = "default_csv_path")]
    pub csv_path: String,

    /// libSQL cache database filled by `refresh`.
    #[serde(default = "default_cache_db")]
    pub cache_db: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            csv_path: default_csv_path(),
            cache_db: default_cache_db(),
        }
    }
}

fn default_csv_path() -> String {
    "resources/pokemons.csv".into()
}
fn default_cache_db() -> String {
    "~/.pokecache/cache.db".into()
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of enrichment workers sharing the input stream.
    #[serde(default = "default_enrich_workers")]
    pub enrich_workers: usize,

    /// Records a single worker enriches concurrently.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight_per_worker: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enrich_workers: default_enrich_workers(),
            max_in_flight_per_worker: default_max_in_flight(),
        }
    }
}

fn default_enrich_workers() -> usize {
    3
}
fn default_max_in_flight() -> usize {
    8
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchDefaults {
    #[serde(default = "default_from")]
    pub default_from: u32,
    #[serde(default = "default_to")]
    pub default_to: u32,
}

impl Default for FetchDefaults {
    fn default() -> Self {
        Self {
            default_from: default_from(),
            default_to: default_to(),
        }
    }
}

fn default_from() -> u32 {
    1
}
fn default_to() -> u32 {
    10
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.pokecache/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PokeCacheError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.pokecache/pokecache.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PokeCacheError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        PokeCacheError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PokeCacheError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PokeCacheError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PokeCacheError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject settings the pipeline cannot run with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    Url::parse(&config.pokeapi.base_url).map_err(|e| {
        PokeCacheError::config(format!(
            "invalid pokeapi.base_url '{}': {e}",
            config.pokeapi.base_url
        ))
    })?;

    validate_pipeline(&config.pipeline)
}

/// Reject a worker pool that could not make progress.
pub fn validate_pipeline(pipeline: &PipelineConfig) -> Result<()> {
    if pipeline.enrich_workers == 0 {
        return Err(PokeCacheError::config(
            "pipeline.enrich_workers must be at least 1",
        ));
    }
    if pipeline.max_in_flight_per_worker == 0 {
        return Err(PokeCacheError::config(
            "pipeline.max_in_flight_per_worker must be at least 1",
        ));
    }
    Ok(())
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}
