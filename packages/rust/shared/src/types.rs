//! Core domain types for pokecache.
//!
//! Field names follow the PokeAPI JSON payloads so the same structs decode
//! remote responses and round-trip through the cache.

use serde::{Deserialize, Serialize};

use crate::error::PokeCacheError;

/// Separator used when flattening ability locators into a single string.
pub const ABILITY_URL_SEPARATOR: &str = "|";

// ---------------------------------------------------------------------------
// Pokemon
// ---------------------------------------------------------------------------

/// A catalog record flowing through fetch and refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pokemon {
    /// Catalog identifier, unique within a batch.
    pub id: u32,
    /// Species name.
    pub name: String,
    /// Height in decimetres.
    pub height: u32,
    /// Weight in hectograms.
    pub weight: u32,
    /// Raw nested ability references from the detail payload.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub abilities: Vec<AbilitySlot>,
    /// Ability locators joined by [`ABILITY_URL_SEPARATOR`].
    #[serde(default)]
    pub flat_ability_urls: String,
    /// Effect descriptions collected during enrichment.
    #[serde(default)]
    pub effect_entries: Vec<String>,
}

impl Pokemon {
    /// Flatten the nested ability references into [`Pokemon::flat_ability_urls`].
    pub fn flatten_abilities(&mut self) {
        self.flat_ability_urls = self
            .abilities
            .iter()
            .map(|slot| slot.ability.url.as_str())
            .collect::<Vec<_>>()
            .join(ABILITY_URL_SEPARATOR);
    }

    /// Iterate the flattened ability locators, skipping empty segments.
    pub fn ability_urls(&self) -> impl Iterator<Item = &str> {
        self.flat_ability_urls
            .split(ABILITY_URL_SEPARATOR)
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

/// Outcome of a single detail lookup: a record or the error that replaced it.
pub type PokemonResult = std::result::Result<Pokemon, PokeCacheError>;

/// One entry of a Pokémon's `abilities` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilitySlot {
    pub ability: NamedResource,
    #[serde(default)]
    pub is_hidden: bool,
    #[serde(default)]
    pub slot: u32,
}

/// A `{ name, url }` reference as used throughout PokeAPI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedResource {
    pub name: String,
    pub url: String,
}

// ---------------------------------------------------------------------------
// Ability
// ---------------------------------------------------------------------------

/// Ability detail returned by an ability lookup. Never persisted on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ability {
    #[serde(default)]
    pub id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub effect_entries: Vec<EffectEntry>,
}

/// A localized effect description of an ability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectEntry {
    pub effect: String,
    #[serde(default)]
    pub short_effect: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<NamedResource>,
}
