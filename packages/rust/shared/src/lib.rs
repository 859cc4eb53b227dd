//! Shared types, error model, and configuration for pokecache.
//!
//! This crate is the foundation depended on by all other pokecache crates.
//! It provides:
//! - [`PokeCacheError`]: the unified error type
//! - Domain types ([`Pokemon`], [`Ability`], [`PokemonResult`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, FetchDefaults, PipelineConfig, PokeApiConfig, StorageConfig, config_dir,
    config_file_path, expand_home, init_config, load_config, load_config_from, validate_config,
    validate_pipeline,
};
pub use error::{PokeCacheError, Result};
pub use types::{
    ABILITY_URL_SEPARATOR, Ability, AbilitySlot, EffectEntry, NamedResource, Pokemon,
    PokemonResult,
};
