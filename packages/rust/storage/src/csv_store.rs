//! CSV file repository.
//!
//! Columns: `id,name,height,weight,flat_abilities`, header row first.
//! Only the fields needed to resume enrichment are persisted; nested ability
//! references travel as the flattened locator string.

use std::fs::File;
use std::path::{Path, PathBuf};

use pokecache_shared::{PokeCacheError, Pokemon, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const HEADERS: [&str; 5] = ["id", "name", "height", "weight", "flat_abilities"];

/// Record channel capacity for the streaming reader.
const READ_BUFFER: usize = 1;

/// Flat-file repository for fetched records.
#[derive(Debug, Clone)]
pub struct CsvStore {
    path: PathBuf,
}

impl CsvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the file contents with `pokemons`, in the given order.
    pub fn write_all(&self, pokemons: &[Pokemon]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| PokeCacheError::io(parent, e))?;
        }

        let mut writer = csv::Writer::from_path(&self.path).map_err(|e| self.storage_error(e))?;
        writer
            .write_record(HEADERS)
            .map_err(|e| self.storage_error(e))?;

        for pokemon in pokemons {
            writer
                .write_record([
                    pokemon.id.to_string(),
                    pokemon.name.clone(),
                    pokemon.height.to_string(),
                    pokemon.weight.to_string(),
                    pokemon.flat_ability_urls.clone(),
                ])
                .map_err(|e| self.storage_error(e))?;
        }

        writer
            .flush()
            .map_err(|e| PokeCacheError::io(&self.path, e))?;
        debug!(path = %self.path.display(), records = pokemons.len(), "csv written");
        Ok(())
    }

    /// Open the file and stream its rows.
    ///
    /// Fails immediately if the file cannot be opened. Otherwise returns a
    /// record receiver and an error receiver fed by a blocking reader task.
    /// The first malformed row is reported on the error receiver and ends the
    /// stream. Cancellation is checked before each emission and stops the
    /// stream without an error; so does dropping the record receiver.
    pub fn read(
        &self,
        cancel: CancellationToken,
    ) -> Result<(mpsc::Receiver<Pokemon>, mpsc::Receiver<PokeCacheError>)> {
        let file = File::open(&self.path).map_err(|e| PokeCacheError::io(&self.path, e))?;

        let (records_tx, records_rx) = mpsc::channel(READ_BUFFER);
        let (errors_tx, errors_rx) = mpsc::channel(1);
        let path = self.path.clone();

        // The task owns the file; it is closed when the task returns.
        tokio::task::spawn_blocking(move || {
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(true)
                .from_reader(file);

            let mut emitted = 0usize;
            for row in reader.records() {
                let pokemon = match row
                    .map_err(|e| PokeCacheError::decode(format!("{}: {e}", path.display())))
                    .and_then(|record| parse_row(&record))
                {
                    Ok(pokemon) => pokemon,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "malformed row, stopping stream");
                        let _ = errors_tx.blocking_send(e);
                        return;
                    }
                };

                if cancel.is_cancelled() {
                    debug!(emitted, "csv stream cancelled");
                    return;
                }
                if records_tx.blocking_send(pokemon).is_err() {
                    debug!(emitted, "csv stream receiver dropped");
                    return;
                }
                emitted += 1;
            }
            debug!(path = %path.display(), emitted, "csv stream exhausted");
        });

        Ok((records_rx, errors_rx))
    }

    fn storage_error(&self, e: csv::Error) -> PokeCacheError {
        PokeCacheError::Storage(format!("{}: {e}", self.path.display()))
    }
}

/// Decode one CSV row into a [`Pokemon`].
fn parse_row(record: &csv::StringRecord) -> Result<Pokemon> {
    let field = |index: usize| {
        record.get(index).ok_or_else(|| {
            PokeCacheError::decode(format!(
                "row {:?}: missing column '{}'",
                record.position().map(|p| p.line()),
                HEADERS[index]
            ))
        })
    };
    let number = |index: usize| -> Result<u32> {
        let raw = field(index)?;
        raw.trim().parse::<u32>().map_err(|e| {
            PokeCacheError::decode(format!("column '{}' = '{raw}': {e}", HEADERS[index]))
        })
    };

    Ok(Pokemon {
        id: number(0)?,
        name: field(1)?.to_string(),
        height: number(2)?,
        weight: number(3)?,
        abilities: Vec::new(),
        flat_ability_urls: field(4)?.to_string(),
        effect_entries: Vec::new(),
    })
}
