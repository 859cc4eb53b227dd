//! Bulk fetch: id range → detail lookups → one bulk write.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use pokecache_shared::{PokeCacheError, PokemonResult, Result};

use crate::capabilities::{BulkWriter, DetailSource};
use crate::fanin::CHANNEL_CAPACITY;

/// Summary of a completed fetch.
#[derive(Debug, Clone)]
pub struct FetchSummary {
    /// Records handed to the bulk writer.
    pub written: usize,
    /// Wall time of the whole operation.
    pub elapsed: Duration,
}

/// Fetches a closed id range concurrently and persists it in one write.
pub struct Fetcher {
    api: Arc<dyn DetailSource>,
    storage: Arc<dyn BulkWriter>,
}

impl Fetcher {
    pub fn new(api: Arc<dyn DetailSource>, storage: Arc<dyn BulkWriter>) -> Self {
        Self { api, storage }
    }

    /// Look up every id in `from..=to` and write the batch.
    ///
    /// All-or-nothing: the first failed lookup cancels the remaining ones and
    /// is returned without touching the writer. The batch is sorted by id
    /// before it is written.
    #[instrument(skip(self, cancel))]
    pub async fn fetch(
        &self,
        cancel: &CancellationToken,
        from: u32,
        to: u32,
    ) -> Result<FetchSummary> {
        if from > to {
            return Err(PokeCacheError::validation(format!(
                "from ({from}) is greater than to ({to})"
            )));
        }

        let start = Instant::now();
        let expected = (to - from) as usize + 1;
        let cancel = cancel.child_token();

        info!(expected, "starting fetch");

        let mut results = self.spawn_lookups(&cancel, from, to);
        let mut pokemons = Vec::with_capacity(expected);

        while let Some(result) = results.recv().await {
            match result {
                Ok(pokemon) => {
                    debug!(id = pokemon.id, name = %pokemon.name, "fetched");
                    pokemons.push(pokemon);
                }
                Err(e) => {
                    warn!(error = %e, "lookup failed, cancelling fetch");
                    cancel.cancel();
                    return Err(e);
                }
            }
        }

        if pokemons.len() != expected {
            // Lookups exit silently once cancelled, and a panicked task never
            // reports; either way the batch is incomplete and must not be written.
            if cancel.is_cancelled() {
                return Err(PokeCacheError::Cancelled);
            }
            return Err(PokeCacheError::Task(format!(
                "{} of {expected} lookups never reported",
                expected - pokemons.len()
            )));
        }

        pokemons.sort_by_key(|p| p.id);
        self.storage.write_all(&pokemons).await?;

        let summary = FetchSummary {
            written: pokemons.len(),
            elapsed: start.elapsed(),
        };
        info!(
            written = summary.written,
            duration_ms = summary.elapsed.as_millis(),
            "fetch completed"
        );
        Ok(summary)
    }

    /// Spawn one lookup task per id; the returned receiver closes once every
    /// task has finished.
    fn spawn_lookups(
        &self,
        cancel: &CancellationToken,
        from: u32,
        to: u32,
    ) -> mpsc::Receiver<PokemonResult> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        for id in from..=to {
            let api = Arc::clone(&self.api);
            let tx = tx.clone();
            let cancel = cancel.clone();

            tokio::spawn(async move {
                let result = tokio::select! {
                    _ = cancel.cancelled() => return,
                    result = api.fetch_pokemon(id) => result,
                };

                let result = result.map(|mut pokemon| {
                    pokemon.flatten_abilities();
                    pokemon
                });

                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tx.send(result) => {}
                }
            });
        }

        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDetails, RecordingWriter, pokemon};

    fn fetcher(details: &Arc<FakeDetails>, writer: &Arc<RecordingWriter>) -> Fetcher {
        Fetcher::new(details.clone(), writer.clone())
    }

    fn catalog(ids: impl IntoIterator<Item = u32>) -> FakeDetails {
        FakeDetails::new(ids.into_iter().map(|id| pokemon(id, &[])))
    }

    #[tokio::test]
    async fn full_range_issues_one_lookup_per_id_and_one_write() {
        let details = Arc::new(catalog(5..=24));
        let writer = Arc::new(RecordingWriter::default());

        let summary = fetcher(&details, &writer)
            .fetch(&CancellationToken::new(), 5, 24)
            .await
            .unwrap();

        assert_eq!(summary.written, 20);
        assert_eq!(details.calls(), 20);
        let batches = writer.batches();
        assert_eq!(batches.len(), 1);
        let ids: Vec<u32> = batches[0].iter().map(|p| p.id).collect();
        assert_eq!(ids, (5..=24).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn three_records_with_mixed_locators() {
        let details = Arc::new(FakeDetails::new([
            pokemon(1, &["a"]),
            pokemon(2, &["b", "c"]),
            pokemon(3, &[]),
        ]));
        let writer = Arc::new(RecordingWriter::default());

        fetcher(&details, &writer)
            .fetch(&CancellationToken::new(), 1, 3)
            .await
            .unwrap();

        let batches = writer.batches();
        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].flat_ability_urls, "a");
        assert_eq!(batch[1].flat_ability_urls, "b|c");
        assert_eq!(batch[2].flat_ability_urls, "");
        assert_eq!(batch[2].ability_urls().count(), 0);
    }

    #[tokio::test]
    async fn single_id_range() {
        let details = Arc::new(catalog([7]));
        let writer = Arc::new(RecordingWriter::default());

        let summary = fetcher(&details, &writer)
            .fetch(&CancellationToken::new(), 7, 7)
            .await
            .unwrap();

        assert_eq!(summary.written, 1);
        assert_eq!(details.calls(), 1);
        assert_eq!(writer.batches().len(), 1);
    }

    #[tokio::test]
    async fn failed_lookup_returns_error_and_skips_write() {
        let details = Arc::new(catalog(1..=3).failing(2));
        let writer = Arc::new(RecordingWriter::default());

        let err = fetcher(&details, &writer)
            .fetch(&CancellationToken::new(), 1, 3)
            .await
            .unwrap_err();

        assert!(matches!(err, PokeCacheError::NotFound { .. }));
        assert!(writer.batches().is_empty());
    }

    #[tokio::test]
    async fn failure_in_large_range_does_not_hang() {
        // Slow lookups keep most tasks pending when the failure lands.
        let details = Arc::new(
            catalog(1..=200)
                .failing(1)
                .with_delay(Duration::from_millis(5)),
        );
        let writer = Arc::new(RecordingWriter::default());

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            fetcher(&details, &writer).fetch(&CancellationToken::new(), 1, 200),
        )
        .await
        .expect("fetch returned");

        assert!(result.is_err());
        assert!(writer.batches().is_empty());
    }

    #[tokio::test]
    async fn reversed_range_is_rejected() {
        let details = Arc::new(catalog(1..=3));
        let writer = Arc::new(RecordingWriter::default());

        let err = fetcher(&details, &writer)
            .fetch(&CancellationToken::new(), 3, 1)
            .await
            .unwrap_err();

        assert!(matches!(err, PokeCacheError::Validation { .. }));
        assert_eq!(details.calls(), 0);
        assert!(writer.batches().is_empty());
    }

    #[tokio::test]
    async fn caller_cancellation_never_writes_partial_batch() {
        let details = Arc::new(catalog(1..=10).with_delay(Duration::from_millis(200)));
        let writer = Arc::new(RecordingWriter::default());
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = fetcher(&details, &writer)
            .fetch(&cancel, 1, 10)
            .await
            .unwrap_err();

        assert!(matches!(err, PokeCacheError::Cancelled));
        assert!(writer.batches().is_empty());
    }

    #[tokio::test]
    async fn writer_error_propagates() {
        let details = Arc::new(catalog(1..=2));
        let writer = Arc::new(RecordingWriter {
            fail: true,
            ..RecordingWriter::default()
        });

        let err = fetcher(&details, &writer)
            .fetch(&CancellationToken::new(), 1, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, PokeCacheError::Storage(_)));
    }

    #[tokio::test]
    async fn repeated_fetch_writes_identical_batches() {
        let details = Arc::new(FakeDetails::new(
            (1..=30).map(|id| pokemon(id, &["x", "y"])),
        ));
        let writer = Arc::new(RecordingWriter::default());
        let fetcher = fetcher(&details, &writer);

        fetcher.fetch(&CancellationToken::new(), 1, 30).await.unwrap();
        fetcher.fetch(&CancellationToken::new(), 1, 30).await.unwrap();

        let batches = writer.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0], batches[1]);
    }
}
