mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "captur")]
#[command(about = "Explore the map hex by hex: location sync, grid overlay and road reports")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Send every queued location to the backend once.
    Sync,
    /// Run a JSON-lines file of raw fixes through an exploration session.
    Replay {
        /// One `{"latitude": .., "longitude": .., "speed": .., "timestamp": ..}` per line.
        file: PathBuf,
    },
    /// Print the GeoJSON overlay of a freshly generated grid.
    Overlay {
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long)]
        radius_km: Option<f64>,
    },
    /// Force every fix to be queued instead of sent.
    Offline {
        #[arg(value_enum)]
        mode: Toggle,
    },
    /// Sync the queue on a fixed interval until interrupted.
    Daemon,
    /// Print active road reports as GeoJSON.
    Reports,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Commands::Overlay {
        lng,
        lat,
        radius_km,
    } = cli.command
    {
        init_tracing("info")?;
        return commands::print_overlay(lng, lat, radius_km);
    }

    let config = captur_core::load_app_config()?;
    init_tracing(&config.log_level)?;

    match cli.command {
        Commands::Sync => commands::run_sync(&config).await,
        Commands::Replay { file } => commands::run_replay(&config, &file).await,
        Commands::Offline { mode } => commands::set_offline(&config, mode == Toggle::On).await,
        Commands::Daemon => commands::run_daemon(&config).await,
        Commands::Reports => commands::print_reports(&config).await,
        Commands::Overlay { .. } => Ok(()),
    }
}

/// `RUST_LOG` wins; otherwise the configured level.
fn init_tracing(default_level: &str) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}
