//! lazydb CLI - inspect and maintain a lazydb database

use clap::{Parser, Subcommand};
use lazydb::config::{self, EngineConfig};
use lazydb::storage::Engine;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "lazydb")]
#[command(version)]
#[command(about = "Lightweight object persistence over SQLite")]
#[command(long_about = r#"
lazydb stores plain objects in an embedded SQLite database. Object types are
described in lazydb.toml ([[descriptors]] tables).

Example usage:
  lazydb init --location ./data
  lazydb schema
  lazydb count Test
  lazydb clear Test
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init {
        /// Directory for the database file
        #[arg(short, long)]
        location: Option<PathBuf>,

        /// Database file name prefix
        #[arg(short, long)]
        prefix: Option<String>,

        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Show registered object types and their tables
    Schema,

    /// Count live rows of an object type
    Count {
        /// Object type name
        type_name: String,
    },

    /// Delete every row of an object type, cascading to linked rows
    Clear {
        /// Object type name
        type_name: String,
    },

    /// Delete the database file
    Destroy,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);

    match cli.command {
        Commands::Init { location, prefix, force } => {
            let mut cfg = EngineConfig::default();
            if let Some(location) = location {
                cfg.storage_location = location;
            }
            cfg.name_prefix = prefix;
            config::write_config(&config_path, &cfg, force)?;
            emit(cli.json, serde_json::json!({ "config": config_path, "database": cfg.database_path() }), || {
                println!("✅ Wrote {}", config_path.display());
                println!("🗄️  Database: {}", cfg.database_path().display());
            })?;
        }

        Commands::Schema => {
            let engine = open_engine(&config_path)?;
            let descriptors = engine.descriptors();
            if cli.json {
                let list: Vec<_> = descriptors.iter().map(|d| d.as_ref()).collect();
                println!("{}", serde_json::to_string_pretty(&list)?);
            } else if descriptors.is_empty() {
                println!("∅ No object types registered.");
            } else {
                println!("{}", lazydb::ui::schema_table(descriptors.iter().map(|d| d.as_ref())));
            }
        }

        Commands::Count { type_name } => {
            let engine = open_engine(&config_path)?;
            let count = engine.count_type(&type_name)?;
            emit(cli.json, serde_json::json!({ "type": type_name, "count": count }), || {
                let value = count.to_string();
                println!("{}", lazydb::ui::stats_table(&[(type_name.as_str(), value.as_str())]));
            })?;
        }

        Commands::Clear { type_name } => {
            let engine = open_engine(&config_path)?;
            engine.clear_type(&type_name)?;
            let remaining = engine.count_type(&type_name)?;
            emit(cli.json, serde_json::json!({ "type": type_name, "count": remaining }), || {
                println!("🧹 Cleared {}", type_name);
            })?;
        }

        Commands::Destroy => {
            let cfg = load(&config_path)?;
            let existed = Engine::destroy_with_config(&cfg)?;
            emit(cli.json, serde_json::json!({ "database": cfg.database_path(), "deleted": existed }), || {
                if existed {
                    println!("🗑️  Deleted {}", cfg.database_path().display());
                } else {
                    println!("∅ No database at {}", cfg.database_path().display());
                }
            })?;
        }
    }

    Ok(())
}

fn load(config_path: &std::path::Path) -> anyhow::Result<EngineConfig> {
    match config::load_config(Some(config_path))? {
        Some(cfg) => Ok(cfg),
        None => anyhow::bail!("no config at {} (run `lazydb init`)", config_path.display()),
    }
}

fn open_engine(config_path: &std::path::Path) -> anyhow::Result<Engine> {
    let cfg = load(config_path)?;
    tracing::debug!("Opening {:?}", cfg.database_path());
    Ok(Engine::with_config(&cfg)?)
}

fn emit(json: bool, data: serde_json::Value, human: impl FnOnce()) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        human();
    }
    Ok(())
}
