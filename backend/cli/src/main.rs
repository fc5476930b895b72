mod config;
mod status_cmd;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use boxinstall_config::Settings;
use boxinstall_gateway::{start_server, GatewayState};
use boxinstall_logging::{init_logger, LogOptions};
use boxinstall_system::BlockDev;

use config::CliOverrides;

#[derive(Parser)]
#[command(name = "boxinstall")]
#[command(about = "boxinstall — web front end for the Arch Linux guided installer")]
#[command(version)]
struct Cli {
    /// TOML settings file (or `BOXINSTALL_CONFIG`)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the installer web server
    Serve {
        /// Port to bind the HTTP server to
        #[arg(short, long)]
        port: Option<u16>,
        /// Address to bind the HTTP server to
        #[arg(short, long)]
        bind: Option<String>,
        /// Directory holding Install.html and its assets
        #[arg(long)]
        web_root: Option<PathBuf>,
        /// Installer program to launch
        #[arg(long)]
        installer: Option<String>,
    },
    /// Show server health and the current installation run
    Status {
        /// Server URL; defaults to the configured local address
        #[arg(long)]
        url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings_file = cli
        .config
        .or_else(|| std::env::var_os("BOXINSTALL_CONFIG").map(PathBuf::from));
    let settings = Settings::load(settings_file.as_deref())?;

    match cli.command {
        Commands::Serve {
            port,
            bind,
            web_root,
            installer,
        } => {
            let settings = CliOverrides {
                port,
                bind,
                web_root,
                installer,
            }
            .apply(settings);
            run_server(settings).await?;
        }
        Commands::Status { url } => {
            let url = url.unwrap_or_else(|| format!("http://localhost:{}", settings.port));
            status_cmd::run(url.trim_end_matches('/')).await?;
        }
    }

    Ok(())
}

async fn run_server(settings: Settings) -> Result<()> {
    init_logger(&LogOptions {
        level: settings.log_level.clone(),
        dir: settings.log_dir.clone(),
        json: settings.log_json,
    })?;

    info!(
        addr = %settings.bind_addr(),
        web_root = %settings.web_root.display(),
        installer = %settings.installer.program,
        "Starting boxinstall"
    );

    let state = GatewayState::new(settings, Arc::new(BlockDev));
    start_server(state, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
