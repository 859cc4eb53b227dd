//! Persistence for pokecache.
//!
//! Two stores live here:
//! - [`CsvStore`]: the flat file `fetch` writes in one shot and `refresh`
//!   streams back record by record.
//! - [`Storage`]: an embedded libSQL database holding the enriched records
//!   `refresh` saves one at a time, and the accessor `list` reads from.

mod csv_store;
mod migrations;

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, params};
use pokecache_shared::{PokeCacheError, Pokemon, Result};

pub use csv_store::CsvStore;

/// Cache handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PokeCacheError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| PokeCacheError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| PokeCacheError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        PokeCacheError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Pokemon operations
    // -----------------------------------------------------------------------

    /// Insert or replace the cached copy of a Pokémon, keyed by id.
    pub async fn save_pokemon(&self, pokemon: &Pokemon) -> Result<()> {
        let payload = serde_json::to_string(pokemon)
            .map_err(|e| PokeCacheError::Storage(format!("failed to encode {}: {e}", pokemon.id)))?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO pokemons (id, name, payload_json, cached_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                   name = excluded.name,
                   payload_json = excluded.payload_json,
                   cached_at = excluded.cached_at",
                params![
                    i64::from(pokemon.id),
                    pokemon.name.as_str(),
                    payload.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(|e| PokeCacheError::Storage(e.to_string()))?;
        Ok(())
    }

    /// List every cached Pokémon, ordered by id.
    pub async fn list_pokemons(&self) -> Result<Vec<Pokemon>> {
        let mut rows = self
            .conn
            .query(
                "SELECT payload_json FROM pokemons ORDER BY id",
                params![],
            )
            .await
            .map_err(|e| PokeCacheError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => results.push(row_to_pokemon(&row)?),
                Ok(None) => break,
                Err(e) => return Err(PokeCacheError::Storage(e.to_string())),
            }
        }
        Ok(results)
    }
}

/// Decode the JSON payload column of a `pokemons` row.
fn row_to_pokemon(row: &libsql::Row) -> Result<Pokemon> {
    let payload: String = row
        .get(0)
        .map_err(|e| PokeCacheError::Storage(e.to_string()))?;
    serde_json::from_str(&payload)
        .map_err(|e| PokeCacheError::decode(format!("cached payload: {e}")))
}
