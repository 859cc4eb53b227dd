//! Collaborator contracts.
//!
//! One trait per capability so each can be substituted on its own: the
//! pipelines hold them as `Arc<dyn ...>` and share them across tasks.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use pokecache_shared::{Ability, PokeCacheError, Pokemon, Result};

/// Remote detail lookup by identifier.
#[async_trait]
pub trait DetailSource: Send + Sync {
    async fn fetch_pokemon(&self, id: u32) -> Result<Pokemon>;
}

/// Remote ability lookup by locator.
#[async_trait]
pub trait AbilitySource: Send + Sync {
    async fn fetch_ability(&self, locator: &str) -> Result<Ability>;
}

/// Persists a whole batch in a single call.
#[async_trait]
pub trait BulkWriter: Send + Sync {
    async fn write_all(&self, pokemons: &[Pokemon]) -> Result<()>;
}

/// A lazily produced record sequence plus its independent error signal.
///
/// Both receivers close when the producer finishes; at most one error is
/// ever delivered.
#[derive(Debug)]
pub struct PokemonStream {
    pub records: mpsc::Receiver<Pokemon>,
    pub errors: mpsc::Receiver<PokeCacheError>,
}

/// Opens a persisted collection as a stream.
#[async_trait]
pub trait RecordReader: Send + Sync {
    /// Fails immediately if the collection cannot be opened.
    async fn read(&self, cancel: CancellationToken) -> Result<PokemonStream>;
}

/// Persists one record.
#[async_trait]
pub trait RecordSaver: Send + Sync {
    async fn save(&self, cancel: &CancellationToken, pokemon: &Pokemon) -> Result<()>;
}

/// Returns the currently cached collection.
#[async_trait]
pub trait CacheReader: Send + Sync {
    async fn list_pokemons(&self) -> Result<Vec<Pokemon>>;
}
