//! Capability implementations for the concrete collaborators.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use pokecache_pokeapi::PokeApiClient;
use pokecache_shared::{Ability, PokeCacheError, Pokemon, Result};
use pokecache_storage::{CsvStore, Storage};

use crate::capabilities::{
    AbilitySource, BulkWriter, CacheReader, DetailSource, PokemonStream, RecordReader,
    RecordSaver,
};

#[async_trait]
impl DetailSource for PokeApiClient {
    async fn fetch_pokemon(&self, id: u32) -> Result<Pokemon> {
        PokeApiClient::fetch_pokemon(self, id).await
    }
}

#[async_trait]
impl AbilitySource for PokeApiClient {
    async fn fetch_ability(&self, locator: &str) -> Result<Ability> {
        PokeApiClient::fetch_ability(self, locator).await
    }
}

#[async_trait]
impl BulkWriter for CsvStore {
    async fn write_all(&self, pokemons: &[Pokemon]) -> Result<()> {
        // File IO stays off the async workers.
        let store = self.clone();
        let batch = pokemons.to_vec();
        tokio::task::spawn_blocking(move || store.write_all(&batch))
            .await
            .map_err(|e| PokeCacheError::Task(format!("csv writer: {e}")))?
    }
}

#[async_trait]
impl RecordReader for CsvStore {
    async fn read(&self, cancel: CancellationToken) -> Result<PokemonStream> {
        let (records, errors) = CsvStore::read(self, cancel)?;
        Ok(PokemonStream { records, errors })
    }
}

#[async_trait]
impl RecordSaver for Storage {
    async fn save(&self, cancel: &CancellationToken, pokemon: &Pokemon) -> Result<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PokeCacheError::Cancelled),
            result = self.save_pokemon(pokemon) => result,
        }
    }
}

#[async_trait]
impl CacheReader for Storage {
    async fn list_pokemons(&self) -> Result<Vec<Pokemon>> {
        Storage::list_pokemons(self).await
    }
}
