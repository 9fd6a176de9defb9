//! dockline CLI
//!
//! Lists and inspects composition projects on the local container engine or
//! on remote engines reached through SSH-forwarded sockets.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dl_connection::ConnectionPool;
use dockline::commands;
use dockline::context::{load_config, CliContext};
use dockline::output::print_error;

#[derive(Parser)]
#[command(name = "dockline")]
#[command(author, version, about = "Discover compose projects on local and remote container engines")]
#[command(propagate_version = true)]
struct Cli {
    /// Profile to use (defaults to the configured default, else the local engine)
    #[arg(short, long, global = true, env = "DOCKLINE_PROFILE")]
    profile: Option<String>,

    /// Path to a profile file (overrides DOCKLINE_PROFILES)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Leave the SSH tunnel running on exit for reuse by the next invocation
    #[arg(long, global = true)]
    keep_tunnel: bool,

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
    /// List every compose project on the engine
    /// Alias: ls
    #[command(alias = "ls")]
    List {
        /// Directory holding projects without a working-dir label
        #[arg(short, long)]
        base_path: Option<String>,
    },

    /// Show one project, reconciled with its manifest when readable
    Inspect {
        /// Compose project name
        project: String,
        /// Directory holding projects without a working-dir label
        #[arg(short, long)]
        base_path: Option<String>,
    },

    /// Connect to the engine and check that it answers
    Ping,

    /// Show configured profiles
    Profiles,
}

#[tokio::main]
async fn main() {
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

    if let Err(e) = run(cli).await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let ctx = CliContext::new(ConnectionPool::new(config), cli.profile, cli.json);

    let result = match &cli.command {
        Commands::List { base_path } => commands::list_command(&ctx, base_path.as_deref()).await,
        Commands::Inspect { project, base_path } => {
            commands::inspect_command(&ctx, project, base_path.as_deref()).await
        }
        Commands::Ping => commands::ping_command(&ctx).await,
        Commands::Profiles => commands::profiles_command(&ctx),
    };

    if cli.keep_tunnel {
        tracing::debug!("Leaving {} connection(s) open", ctx.pool.len());
    } else {
        ctx.pool.clear();
    }

    result
}
