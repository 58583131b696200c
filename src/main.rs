use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use coincache::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for coincache::AppCommand {
    fn from(cmd: Commands) -> coincache::AppCommand {
        match cmd {
            Commands::Get { id, currencies } => coincache::AppCommand::Get { id, currencies },
            Commands::List { currencies } => coincache::AppCommand::List { currencies },
            Commands::Watch { currencies } => coincache::AppCommand::Watch { currencies },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Show rates for one asset, refreshing the cache if needed
    Get {
        /// Provider asset id, e.g. "bitcoin"
        id: String,
        /// Comma-joined currency codes, e.g. "usd,eur"
        #[arg(long)]
        currencies: Option<String>,
    },
    /// Show rates for every cached asset
    List {
        /// Comma-joined currency codes, e.g. "usd,eur"
        #[arg(long)]
        currencies: Option<String>,
    },
    /// Keep refreshing every cached asset on the configured interval
    Watch {
        /// Comma-joined currency codes, e.g. "usd,eur"
        #[arg(long)]
        currencies: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => setup(),
        Some(cmd) => coincache::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

fn setup() -> anyhow::Result<()> {
    use anyhow::Context;

    let path = coincache::config::AppConfig::default_config_path()?;

    if path.exists() {
        anyhow::bail!("Configuration file already exists at {}", path.display());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let default_config = r#"---
providers:
  coingecko:
    base_url: "https://api.coingecko.com/api/v3"
    # api_key: "CG-..."

cache_ttl_secs: 60
refresh_interval_secs: 900
currency: "usd"
"#;

    std::fs::write(&path, default_config)
        .with_context(|| format!("Failed to write config file to {}", path.display()))?;

    tracing::info!("Created default configuration at {}", path.display());
    Ok(())
}
