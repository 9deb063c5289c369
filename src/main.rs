use anyhow::Result;
use clap::{Parser, Subcommand};
use nba_embeddings::commands::{
    RunOptions, init_store, plan_pipeline, run_pipeline, show_status,
};
use nba_embeddings::config::{Config, show_config};
use nba_embeddings::documents::EntityType;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nba-embeddings")]
#[command(about = "Incremental vector embeddings for NBA stats")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed new and changed documents
    Run {
        /// Entity types to process (default: all, in dependency order)
        #[arg(long = "entity", value_enum)]
        entities: Vec<EntityType>,
        /// Do not check the embedding service before starting
        #[arg(long)]
        skip_health_check: bool,
        /// Report change counts without embedding or writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Create the vector extension, table and indexes
    Init,
    /// Show connectivity and stored document counts
    Status,
    /// Print the effective configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

impl Commands {
    fn run_options(entities: Vec<EntityType>, skip_health_check: bool, dry_run: bool) -> RunOptions {
        // Keep dependency order regardless of how the flags were given
        let mut entities = if entities.is_empty() {
            EntityType::ALL.to_vec()
        } else {
            entities
        };
        entities.sort();
        entities.dedup();

        RunOptions {
            entities,
            skip_health_check,
            dry_run,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            entities,
            skip_health_check,
            dry_run,
        } => {
            let options = Commands::run_options(entities, skip_health_check, dry_run);
            if options.dry_run {
                plan_pipeline(&config, &options.entities).await?;
            } else {
                let report = run_pipeline(&config, &options).await?;
                if !report.is_success() {
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Commands::Init => {
            init_store(&config).await?;
        }
        Commands::Status => {
            show_status(&config).await?;
        }
        Commands::Config { show } => {
            if show {
                show_config(&config);
            } else {
                match cli.config.as_deref() {
                    Some(path) => println!("Config file: {}", path.display()),
                    None => println!("Config file: {}", Config::config_file_path()?.display()),
                }
                println!("Use --show to print the effective configuration");
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
