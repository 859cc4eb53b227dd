//! SQL migration definitions for the pokecache cache database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: pokemons cache",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Enriched records, one row per Pokémon id
CREATE TABLE IF NOT EXISTS pokemons (
    id           INTEGER PRIMARY KEY,
    name         TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    cached_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pokemons_name ON pokemons(name);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
