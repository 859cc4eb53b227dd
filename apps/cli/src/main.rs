//! pokecache CLI: fetch Pokémon from PokeAPI into a CSV file, enrich their
//! abilities concurrently, and cache the result in libSQL.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
