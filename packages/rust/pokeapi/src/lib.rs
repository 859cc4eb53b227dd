//! PokeAPI HTTP client.
//!
//! Two lookups back the whole system: a Pokémon detail lookup by numeric id,
//! and an ability lookup by locator (the ability URL carried in the detail
//! payload). Each call is independent and the client holds no per-call state,
//! so one [`PokeApiClient`] is shared across every concurrent task.

use std::time::Duration;

use pokecache_shared::{Ability, PokeApiConfig, PokeCacheError, Pokemon, Result};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

/// Maximum number of redirects to follow per lookup.
const MAX_REDIRECTS: usize = 3;

/// User-Agent string for catalog requests.
const USER_AGENT: &str = concat!("pokecache/", env!("CARGO_PKG_VERSION"));

/// Client for the PokeAPI catalog service.
#[derive(Debug, Clone)]
pub struct PokeApiClient {
    client: Client,
    base_url: Url,
}

impl PokeApiClient {
    /// Build a client from the `[pokeapi]` config section.
    pub fn new(config: &PokeApiConfig) -> Result<Self> {
        let base_url = parse_base_url(&config.base_url)?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PokeCacheError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, base_url })
    }

    /// The API root every relative locator is resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Fetch one Pokémon's detail record by id.
    #[instrument(skip(self))]
    pub async fn fetch_pokemon(&self, id: u32) -> Result<Pokemon> {
        let url = self.resolve(&format!("pokemon/{id}/"))?;
        self.get_json(url).await
    }

    /// Fetch ability detail by locator.
    ///
    /// The locator is normally the absolute URL found in a detail payload;
    /// relative locators (`ability/65/`) are resolved against the base URL.
    #[instrument(skip(self))]
    pub async fn fetch_ability(&self, locator: &str) -> Result<Ability> {
        let url = self.resolve(locator)?;
        self.get_json(url).await
    }

    fn resolve(&self, locator: &str) -> Result<Url> {
        self.base_url.join(locator).map_err(|e| {
            PokeCacheError::validation(format!("invalid locator '{locator}': {e}"))
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!(%url, "requesting");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| PokeCacheError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(PokeCacheError::not_found(url.path().trim_matches('/')));
        }
        if !status.is_success() {
            return Err(PokeCacheError::Network(format!("{url}: HTTP {status}")));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| PokeCacheError::decode(format!("{url}: {e}")))
    }
}

/// Parse the configured API root, forcing a trailing slash so `join` appends
/// rather than replaces the last path segment.
fn parse_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw)
        .map_err(|e| PokeCacheError::config(format!("invalid base URL '{raw}': {e}")))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
