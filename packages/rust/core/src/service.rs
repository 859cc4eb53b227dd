//! `PokeCache`: the three operations exposed to callers, wired to their
//! collaborators.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use pokecache_pokeapi::PokeApiClient;
use pokecache_shared::{AppConfig, Pokemon, Result, expand_home, validate_config};
use pokecache_storage::{CsvStore, Storage};

use crate::capabilities::CacheReader;
use crate::fetcher::{FetchSummary, Fetcher};
use crate::refresher::Refresher;

/// Facade over the fetch and refresh pipelines and the cache accessor.
pub struct PokeCache {
    fetcher: Fetcher,
    refresher: Refresher,
    cache: Arc<dyn CacheReader>,
}

impl PokeCache {
    pub fn new(fetcher: Fetcher, refresher: Refresher, cache: Arc<dyn CacheReader>) -> Self {
        Self {
            fetcher,
            refresher,
            cache,
        }
    }

    /// Build the service from config: one PokeAPI client shared by both
    /// pipelines, the CSV repository and the libSQL cache.
    pub async fn open(config: &AppConfig) -> Result<Self> {
        validate_config(config)?;

        let api = Arc::new(PokeApiClient::new(&config.pokeapi)?);
        let csv_path = expand_home(&config.storage.csv_path);
        let db_path = expand_home(&config.storage.cache_db);
        debug!(csv = %csv_path.display(), db = %db_path.display(), "opening stores");

        let csv = Arc::new(CsvStore::new(csv_path));
        let storage = Arc::new(Storage::open(&db_path).await?);

        let fetcher = Fetcher::new(api.clone(), csv.clone());
        let refresher = Refresher::new(csv, storage.clone(), api, config.pipeline.clone())?;

        info!(base_url = %config.pokeapi.base_url, "pokecache ready");
        Ok(Self::new(fetcher, refresher, storage))
    }

    /// Fetch ids `from..=to` and overwrite the CSV repository with them.
    pub async fn fetch(
        &self,
        cancel: &CancellationToken,
        from: u32,
        to: u32,
    ) -> Result<FetchSummary> {
        self.fetcher.fetch(cancel, from, to).await
    }

    /// Enrich every stored record and save it to the cache.
    pub async fn refresh(&self, cancel: &CancellationToken) -> Result<()> {
        self.refresher.refresh(cancel).await
    }

    /// Everything currently cached, ordered by id.
    pub async fn list_pokemons(&self) -> Result<Vec<Pokemon>> {
        self.cache.list_pokemons().await
    }
}
