//! Refresh: CSV stream → enrichment workers → fan-in → per-record cache saves.
//!
//! ```text
//!              ┌─ worker 0 ─┐
//! source ──────┼─ worker 1 ─┼── fan_in ── sink
//!  (errors)    └─ worker 2 ─┘   (errors)   (errors)
//!      └──────────────┴──────────────────────┴──► wait_for_pipeline
//! ```
//!
//! Workers share one input receiver, so each record is enriched exactly once.
//! Every stage reports failures on its own channel and the coordinator returns
//! the first one. Cancellation is only released when `refresh` returns; until
//! then stages wind down by channel closure. A refresh interrupted by its
//! caller reports `Cancelled` even though earlier saves are kept.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use pokecache_shared::{PipelineConfig, PokeCacheError, Pokemon, Result, validate_pipeline};

use crate::capabilities::{AbilitySource, RecordReader, RecordSaver};
use crate::fanin::{CHANNEL_CAPACITY, fan_in, wait_for_pipeline};

/// Input receiver shared by every worker of the pool.
type SharedInput = Arc<Mutex<mpsc::Receiver<Pokemon>>>;

/// Output and error receivers of one stage.
type StageOutput = (mpsc::Receiver<Pokemon>, mpsc::Receiver<PokeCacheError>);

/// Enriches the persisted collection and saves each record to the cache.
pub struct Refresher {
    reader: Arc<dyn RecordReader>,
    saver: Arc<dyn RecordSaver>,
    abilities: Arc<dyn AbilitySource>,
    config: PipelineConfig,
}

impl Refresher {
    /// Fails with `Config` if the pool has no workers or no permits per worker.
    pub fn new(
        reader: Arc<dyn RecordReader>,
        saver: Arc<dyn RecordSaver>,
        abilities: Arc<dyn AbilitySource>,
        config: PipelineConfig,
    ) -> Result<Self> {
        validate_pipeline(&config)?;
        Ok(Self {
            reader,
            saver,
            abilities,
            config,
        })
    }

    /// Run the whole pipeline once.
    ///
    /// Returns the first error reported by any stage, or `Ok` once every
    /// stage has drained. If `caller` is cancelled before that, returns
    /// `Cancelled`. Saves already made before a failure are kept.
    #[instrument(skip_all, fields(workers = self.config.enrich_workers))]
    pub async fn refresh(&self, caller: &CancellationToken) -> Result<()> {
        let start = Instant::now();
        let cancel = caller.child_token();
        let _release = cancel.clone().drop_guard();

        let stream = self.reader.read(cancel.clone()).await?;
        let mut errors = vec![stream.errors];

        let (enriched, enrich_errors) = self.enrich(&cancel, stream.records);
        errors.push(enrich_errors);

        errors.push(self.spawn_sink(&cancel, enriched));

        // Stages stop quietly once cancelled, so a clean drain is not success.
        let result = match wait_for_pipeline(errors).await {
            Ok(()) | Err(PokeCacheError::Cancelled) if caller.is_cancelled() => {
                Err(PokeCacheError::Cancelled)
            }
            result => result,
        };
        match &result {
            Ok(()) => info!(
                duration_ms = start.elapsed().as_millis(),
                "refresh completed"
            ),
            Err(e) => warn!(error = %e, "refresh failed"),
        }
        result
    }

    /// Start the worker pool over `input` and merge its outputs and errors.
    fn enrich(&self, cancel: &CancellationToken, input: mpsc::Receiver<Pokemon>) -> StageOutput {
        let input: SharedInput = Arc::new(Mutex::new(input));

        let (outputs, errors): (Vec<_>, Vec<_>) = (0..self.config.enrich_workers)
            .map(|worker| self.spawn_worker(cancel, worker, Arc::clone(&input)))
            .unzip();

        (fan_in(outputs), fan_in(errors))
    }

    /// Spawn one enrichment worker.
    ///
    /// The worker pulls records from the shared input and enriches each in its
    /// own task, at most `max_in_flight_per_worker` at a time. The first failed
    /// lookup is reported on the worker's error channel and stops it from
    /// pulling more input. Both channels close once every in-flight task is done.
    fn spawn_worker(
        &self,
        cancel: &CancellationToken,
        worker: usize,
        input: SharedInput,
    ) -> StageOutput {
        let (out_tx, out_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (err_tx, err_rx) = mpsc::channel(1);

        let abilities = Arc::clone(&self.abilities);
        let permits = Arc::new(Semaphore::new(self.config.max_in_flight_per_worker));
        let cancel = cancel.clone();
        let halt = cancel.child_token();

        tokio::spawn(async move {
            let mut in_flight = JoinSet::new();
            let mut pulled = 0usize;

            loop {
                let permit = tokio::select! {
                    _ = halt.cancelled() => break,
                    permit = Arc::clone(&permits).acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };

                let next = tokio::select! {
                    _ = halt.cancelled() => None,
                    next = next_record(&input) => next,
                };
                let Some(mut pokemon) = next else { break };
                pulled += 1;

                let task_abilities = Arc::clone(&abilities);
                let task_out_tx = out_tx.clone();
                let task_err_tx = err_tx.clone();
                let task_cancel = cancel.clone();
                let task_halt = halt.clone();

                in_flight.spawn(async move {
                    let _permit = permit;
                    match enrich_pokemon(task_abilities.as_ref(), &mut pokemon).await {
                        Ok(()) => {
                            debug!(worker, id = pokemon.id, effects = pokemon.effect_entries.len(), "enriched");
                            tokio::select! {
                                _ = task_cancel.cancelled() => {}
                                _ = task_out_tx.send(pokemon) => {}
                            }
                        }
                        Err(e) => {
                            warn!(worker, id = pokemon.id, error = %e, "ability lookup failed");
                            let _ = task_err_tx.try_send(e);
                            task_halt.cancel();
                        }
                    }
                });

                while let Some(joined) = in_flight.try_join_next() {
                    report_panic(joined, &err_tx, &halt);
                }
            }

            while let Some(joined) = in_flight.join_next().await {
                report_panic(joined, &err_tx, &halt);
            }
            debug!(worker, pulled, "enrichment worker finished");
        });

        (out_rx, err_rx)
    }

    /// Save each enriched record as it arrives; stop at the first failure.
    fn spawn_sink(
        &self,
        cancel: &CancellationToken,
        mut input: mpsc::Receiver<Pokemon>,
    ) -> mpsc::Receiver<PokeCacheError> {
        let (err_tx, err_rx) = mpsc::channel(1);
        let saver = Arc::clone(&self.saver);
        let cancel = cancel.clone();

        tokio::spawn(async move {
            let mut saved = 0usize;
            while let Some(pokemon) = input.recv().await {
                if let Err(e) = saver.save(&cancel, &pokemon).await {
                    warn!(id = pokemon.id, saved, error = %e, "save failed");
                    let _ = err_tx.try_send(e);
                    return;
                }
                saved += 1;
            }
            info!(saved, "sink drained");
        });

        err_rx
    }
}

async fn next_record(input: &SharedInput) -> Option<Pokemon> {
    input.lock().await.recv().await
}

/// Look up every ability locator of `pokemon` and append all effect texts.
async fn enrich_pokemon(abilities: &dyn AbilitySource, pokemon: &mut Pokemon) -> Result<()> {
    let mut effects = Vec::new();
    for locator in pokemon.ability_urls() {
        let ability = abilities.fetch_ability(locator).await?;
        effects.extend(ability.effect_entries.into_iter().map(|entry| entry.effect));
    }
    pokemon.effect_entries.extend(effects);
    Ok(())
}

fn report_panic(
    joined: std::result::Result<(), tokio::task::JoinError>,
    err_tx: &mpsc::Sender<PokeCacheError>,
    halt: &CancellationToken,
) {
    if let Err(e) = joined {
        if e.is_panic() {
            let _ = err_tx.try_send(PokeCacheError::Task(format!("enrichment task panicked: {e}")));
            halt.cancel();
        }
    }
}
