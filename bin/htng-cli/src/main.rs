//! Administrative CLI (spec §6): `validate-config` and `cache-config`.
//! Everything else the spec calls scaffolding (setup wizards, BDD
//! runners, migration generators) stays out of the core.

mod cache_config;
mod validate_config;

use clap::{Parser, Subcommand};

use cache_config::CacheAction;

#[derive(Parser, Debug)]
#[command(name = "htng-cli", version, about = "HTNG 2011B integration core administrative CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database URL backing the property mapping store.
    #[arg(long, global = true, env = "DATABASE_URL", default_value = "sqlite://htng.db")]
    database_url: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate property mapping configuration.
    ValidateConfig {
        /// Validate only this property id. Conflicts with --all.
        #[arg(long)]
        property: Option<i64>,

        /// Validate every configured property.
        #[arg(long)]
        all: bool,

        /// Disable mappings found invalid instead of only reporting them.
        #[arg(long)]
        fix: bool,

        /// Print one line per mapping, valid or not.
        #[arg(long)]
        verbose: bool,
    },

    /// Manage the in-process schema cache.
    CacheConfig {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    htng_common::logging::init_logging("htng-cli");
    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::ValidateConfig { property, all, fix, verbose } => {
            if property.is_some() && all {
                eprintln!("--property and --all are mutually exclusive");
                2
            } else if property.is_none() && !all {
                eprintln!("specify either --property ID or --all");
                2
            } else {
                validate_config::run(&cli.database_url, property, fix, verbose).await?
            }
        }
        Commands::CacheConfig { action } => cache_config::run(action).await,
    };

    std::process::exit(exit_code);
}
