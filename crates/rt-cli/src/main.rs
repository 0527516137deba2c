//! relayterm CLI
//!
//! Interactive terminals, one-shot commands, downloads and session
//! listings against a relay.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rt_cli::commands::{self, Context};
use rt_core::config::{self, ClientConfig};

#[derive(Parser)]
#[command(name = "relayterm")]
#[command(author, version, about = "Remote terminal sessions through a relay")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Relay address (overrides config)
    #[arg(long, global = true, env = "RELAYTERM_RELAY")]
    relay: Option<String>,

    /// API key (overrides config)
    #[arg(long, global = true, env = "RELAYTERM_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open an interactive terminal in a new session (Ctrl+] detaches)
    Connect {
        /// Attach to this existing session instead
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Attach to an existing session
    Attach {
        /// Session ID to attach to
        session: String,
    },

    /// Run one command and exit with its exit code
    Exec {
        /// Command line to run on the remote shell
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
        /// Seconds to wait for the command to finish
        #[arg(short, long)]
        timeout: Option<u64>,
        /// Machine hostname (partial match)
        #[arg(long)]
        host: Option<String>,
        /// Session ID
        #[arg(short, long, conflicts_with = "host")]
        session: Option<String>,
    },

    /// Copy a remote file, or a URL fetched by the remote host, to local disk
    Download {
        /// Remote path or http(s) URL
        remote: String,
        /// Local destination
        local: PathBuf,
        /// Machine hostname (partial match)
        #[arg(long)]
        host: Option<String>,
        /// Session ID
        #[arg(short, long, conflicts_with = "host")]
        session: Option<String>,
    },

    /// List sessions known to the relay
    Sessions {
        /// Only sessions of this machine
        #[arg(long)]
        host: Option<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => ClientConfig::load_or_default(&config::default_config_path())
            .context("Failed to load default config")?,
    };

    if let Some(relay) = &cli.relay {
        config.relay.address = relay.clone();
    }
    if let Some(api_key) = &cli.api_key {
        config.relay.api_key = Some(api_key.clone());
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = load_config(&cli)?;
    tracing::debug!(relay = %config.relay.address, "Configuration loaded");
    let ctx = Context::new(config);

    let code = match cli.command {
        Commands::Connect { session } => commands::connect_command(&ctx, session.as_deref()).await?,

        Commands::Attach { session } => commands::connect_command(&ctx, Some(&session)).await?,

        Commands::Exec {
            command,
            timeout,
            host,
            session,
        } => {
            commands::exec_command(
                &ctx,
                &command.join(" "),
                timeout.map(Duration::from_secs),
                host.as_deref(),
                session.as_deref(),
            )
            .await?
        }

        Commands::Download {
            remote,
            local,
            host,
            session,
        } => {
            commands::download_command(&ctx, &remote, &local, host.as_deref(), session.as_deref())
                .await?
        }

        Commands::Sessions { host, json } => {
            commands::sessions_command(&ctx, host.as_deref(), json).await?
        }
    };

    Ok(ExitCode::from(code))
}
