//! Concurrent fetch and enrichment pipelines for pokecache.
//!
//! - [`fetcher`]: bulk fetch of a closed id range into the CSV repository
//! - [`refresher`]: streaming enrichment of the CSV repository into the cache
//! - [`fanin`]: generic stream merge and the first-error-wins pipeline barrier
//! - [`capabilities`]: the collaborator contracts both pipelines run against
//! - [`service`]: wiring of the concrete collaborators behind one facade

pub mod adapters;
pub mod capabilities;
pub mod fanin;
pub mod fetcher;
pub mod refresher;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use capabilities::{
    AbilitySource, BulkWriter, CacheReader, DetailSource, PokemonStream, RecordReader,
    RecordSaver,
};
pub use fetcher::{FetchSummary, Fetcher};
pub use refresher::Refresher;
pub use service::PokeCache;
