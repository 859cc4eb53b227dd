//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use pokecache_core::PokeCache;
use pokecache_shared::{AppConfig, Pokemon, init_config, load_config, load_config_from};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// pokecache: fetch Pokémon from PokeAPI, enrich their abilities, cache them.
#[derive(Parser)]
#[command(
    name = "pokecache",
    version,
    about = "Fetch Pokémon from PokeAPI into a CSV file and enrich them into a local cache.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file to use instead of ~/.pokecache/pokecache.toml.
    #[arg(long, global = true, env = "POKECACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Fetch an id range from PokeAPI and overwrite the CSV file with it.
    Fetch {
        /// First id (inclusive). Defaults to `fetch.default_from`.
        #[arg(long)]
        from: Option<u32>,

        /// Last id (inclusive). Defaults to `fetch.default_to`.
        #[arg(long)]
        to: Option<u32>,
    },

    /// Enrich every record in the CSV file and save it to the cache.
    Refresh,

    /// List cached Pokémon.
    List {
        /// Print the records as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "pokecache=info",
        1 => "pokecache=debug",
        _ => "pokecache=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Fetch { from, to } => {
            let config = resolve_config(cli.config.as_deref())?;
            let from = from.unwrap_or(config.fetch.default_from);
            let to = to.unwrap_or(config.fetch.default_to);
            cmd_fetch(&config, from, to).await
        }
        Command::Refresh => cmd_refresh(&resolve_config(cli.config.as_deref())?).await,
        Command::List { json } => cmd_list(&resolve_config(cli.config.as_deref())?, json).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(cli.config.as_deref()),
        },
    }
}

fn resolve_config(path: Option<&std::path::Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

/// Token cancelled on Ctrl-C so in-flight pipelines wind down.
fn interrupt_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling");
            on_signal.cancel();
        }
    });
    cancel
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_fetch(config: &AppConfig, from: u32, to: u32) -> Result<()> {
    let service = PokeCache::open(config).await?;
    let cancel = interrupt_token();

    info!(from, to, "fetching pokemon");
    let spinner = spinner(format!("Fetching ids {from}..={to}"));
    let result = service.fetch(&cancel, from, to).await;
    spinner.finish_and_clear();
    let summary = result?;

    println!();
    println!("  Fetch complete!");
    println!("  Written: {}", summary.written);
    println!("  File:    {}", config.storage.csv_path);
    println!("  Time:    {:.1}s", summary.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_refresh(config: &AppConfig) -> Result<()> {
    let service = PokeCache::open(config).await?;
    let cancel = interrupt_token();

    info!(
        workers = config.pipeline.enrich_workers,
        in_flight = config.pipeline.max_in_flight_per_worker,
        "refreshing cache"
    );
    let started = std::time::Instant::now();
    let spinner = spinner("Enriching abilities".to_string());
    let result = service.refresh(&cancel).await;
    spinner.finish_and_clear();
    result?;

    let cached = service.list_pokemons().await?;

    println!();
    println!("  Refresh complete!");
    println!("  Cached: {}", cached.len());
    println!("  Cache:  {}", config.storage.cache_db);
    println!("  Time:   {:.1}s", started.elapsed().as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_list(config: &AppConfig, json: bool) -> Result<()> {
    let service = PokeCache::open(config).await?;
    let pokemons = service.list_pokemons().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&pokemons)?);
        return Ok(());
    }

    if pokemons.is_empty() {
        println!("No cached Pokémon. Run `pokecache fetch` then `pokecache refresh`.");
        return Ok(());
    }

    for pokemon in &pokemons {
        println!("{}", list_line(pokemon));
    }
    Ok(())
}

fn list_line(pokemon: &Pokemon) -> String {
    format!(
        "{:>5}  {:<16} h={:<4} w={:<5} abilities={} effects={}",
        pokemon.id,
        pokemon.name,
        pokemon.height,
        pokemon.weight,
        pokemon.ability_urls().count(),
        pokemon.effect_entries.len()
    )
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&std::path::Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

fn spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        spinner.set_style(
            style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
    }
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_range_flags_parse() {
        let cli = Cli::try_parse_from(["pokecache", "fetch", "--from", "4", "--to", "9"]).unwrap();
        match cli.command {
            Command::Fetch { from, to } => {
                assert_eq!(from, Some(4));
                assert_eq!(to, Some(9));
            }
            _ => panic!("expected fetch"),
        }
    }

    #[test]
    fn fetch_range_defaults_to_config() {
        let cli = Cli::try_parse_from(["pokecache", "fetch"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Fetch {
                from: None,
                to: None
            }
        ));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "pokecache",
            "list",
            "--json",
            "--log-format",
            "json",
            "-vv",
            "--config",
            "/tmp/pokecache.toml",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::List { json: true }));
        assert!(matches!(cli.log_format, LogFormat::Json));
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/pokecache.toml")));
    }

    #[test]
    fn unknown_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["pokecache", "serve"]).is_err());
    }

    #[test]
    fn config_override_is_loaded() {
        let path = std::env::temp_dir().join(format!(
            "pokecache-cli-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "[pipeline]\nenrich_workers = 5\n").unwrap();

        let config = resolve_config(Some(&path)).unwrap();
        assert_eq!(config.pipeline.enrich_workers, 5);
        assert_eq!(config.fetch.default_to, 10);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn list_line_counts_locators_and_effects() {
        let pokemon = Pokemon {
            id: 25,
            name: "pikachu".into(),
            height: 4,
            weight: 60,
            abilities: Vec::new(),
            flat_ability_urls: "a|b".into(),
            effect_entries: vec!["x".into(), "y".into(), "z".into()],
        };
        let line = list_line(&pokemon);
        assert!(line.contains("pikachu"));
        assert!(line.contains("abilities=2"));
        assert!(line.contains("effects=3"));
    }
}
