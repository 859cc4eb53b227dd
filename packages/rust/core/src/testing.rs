//! In-memory capability doubles shared by the pipeline tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use pokecache_shared::{
    Ability, AbilitySlot, EffectEntry, NamedResource, PokeCacheError, Pokemon, Result,
};

use crate::capabilities::{
    AbilitySource, BulkWriter, DetailSource, PokemonStream, RecordReader, RecordSaver,
};
use crate::fanin::CHANNEL_CAPACITY;

pub(crate) fn pokemon(id: u32, locators: &[&str]) -> Pokemon {
    Pokemon {
        id,
        name: format!("pokemon-{id}"),
        height: id,
        weight: id * 10,
        abilities: locators
            .iter()
            .enumerate()
            .map(|(slot, url)| AbilitySlot {
                ability: NamedResource {
                    name: format!("ability-{slot}"),
                    url: url.to_string(),
                },
                is_hidden: false,
                slot: slot as u32 + 1,
            })
            .collect(),
        flat_ability_urls: String::new(),
        effect_entries: Vec::new(),
    }
}

/// Detail source answering from a fixed table; ids in `failing` return `NotFound`.
pub(crate) struct FakeDetails {
    pub table: HashMap<u32, Pokemon>,
    pub failing: HashSet<u32>,
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl FakeDetails {
    pub fn new(table: impl IntoIterator<Item = Pokemon>) -> Self {
        Self {
            table: table.into_iter().map(|p| (p.id, p)).collect(),
            failing: HashSet::new(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(mut self, id: u32) -> Self {
        self.failing.insert(id);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DetailSource for FakeDetails {
    async fn fetch_pokemon(&self, id: u32) -> Result<Pokemon> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.contains(&id) {
            return Err(PokeCacheError::not_found(format!("pokemon/{id}")));
        }
        self.table
            .get(&id)
            .cloned()
            .ok_or_else(|| PokeCacheError::not_found(format!("pokemon/{id}")))
    }
}

/// Bulk writer recording every batch it receives.
#[derive(Default)]
pub(crate) struct RecordingWriter {
    pub batches: Mutex<Vec<Vec<Pokemon>>>,
    pub fail: bool,
}

impl RecordingWriter {
    pub fn batches(&self) -> Vec<Vec<Pokemon>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl BulkWriter for RecordingWriter {
    async fn write_all(&self, pokemons: &[Pokemon]) -> Result<()> {
        if self.fail {
            return Err(PokeCacheError::Storage("disk full".into()));
        }
        self.batches.lock().unwrap().push(pokemons.to_vec());
        Ok(())
    }
}

/// Ability source returning `effect:<locator>:<n>` entries; locators in
/// `failing` return `NotFound`. Tracks the peak number of concurrent lookups.
#[derive(Default)]
pub(crate) struct FakeAbilities {
    pub effects_per_ability: usize,
    pub failing: HashSet<String>,
    pub delay: Duration,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeAbilities {
    pub fn new(effects_per_ability: usize) -> Self {
        Self {
            effects_per_ability,
            ..Self::default()
        }
    }

    pub fn failing(mut self, locator: &str) -> Self {
        self.failing.insert(locator.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn effects_for(&self, locator: &str) -> Vec<String> {
        (0..self.effects_per_ability)
            .map(|n| format!("effect:{locator}:{n}"))
            .collect()
    }
}

#[async_trait]
impl AbilitySource for FakeAbilities {
    async fn fetch_ability(&self, locator: &str) -> Result<Ability> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.failing.contains(locator) {
            return Err(PokeCacheError::not_found(locator));
        }
        Ok(Ability {
            id: 0,
            name: locator.to_string(),
            effect_entries: self
                .effects_for(locator)
                .into_iter()
                .map(|effect| EffectEntry {
                    effect,
                    short_effect: String::new(),
                    language: None,
                })
                .collect(),
        })
    }
}

/// Reader streaming a fixed list, optionally ending with a decode error.
pub(crate) struct VecReader {
    pub records: Vec<Pokemon>,
    pub trailing_error: Option<String>,
    pub open_error: bool,
}

impl VecReader {
    pub fn new(records: Vec<Pokemon>) -> Self {
        Self {
            records,
            trailing_error: None,
            open_error: false,
        }
    }
}

#[async_trait]
impl RecordReader for VecReader {
    async fn read(&self, cancel: CancellationToken) -> Result<PokemonStream> {
        if self.open_error {
            return Err(PokeCacheError::io(
                "resources/pokemons.csv",
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            ));
        }

        let (records_tx, records_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (errors_tx, errors_rx) = mpsc::channel(1);
        let records = self.records.clone();
        let trailing_error = self.trailing_error.clone();

        tokio::spawn(async move {
            for pokemon in records {
                if cancel.is_cancelled() || records_tx.send(pokemon).await.is_err() {
                    return;
                }
            }
            if let Some(message) = trailing_error {
                let _ = errors_tx.send(PokeCacheError::decode(message)).await;
            }
        });

        Ok(PokemonStream {
            records: records_rx,
            errors: errors_rx,
        })
    }
}

/// Saver recording every record; fails on the configured id.
#[derive(Default)]
pub(crate) struct RecordingSaver {
    pub saved: Mutex<Vec<Pokemon>>,
    pub fail_on: Option<u32>,
}

impl RecordingSaver {
    pub fn saved(&self) -> Vec<Pokemon> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordSaver for RecordingSaver {
    async fn save(&self, _cancel: &CancellationToken, pokemon: &Pokemon) -> Result<()> {
        if self.fail_on == Some(pokemon.id) {
            return Err(PokeCacheError::Storage(format!("cannot save {}", pokemon.id)));
        }
        self.saved.lock().unwrap().push(pokemon.clone());
        Ok(())
    }
}
