//! twinlsp CLI - language server split across two execution contexts
//!
//! Usage:
//!   twinlsp serve [--config <twinlsp.toml>]
//!   twinlsp check-config [--config <twinlsp.toml>]
//!
//! The root context plays the foreground role and serves LSP over stdio;
//! the background context is started from the same entry script during
//! `initialize`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use twinlsp::analysis::BaseEngine;
use twinlsp::config::Settings;
use twinlsp::entry::Role;
use twinlsp::lsp;

#[derive(Parser)]
#[command(name = "twinlsp")]
#[command(about = "twinlsp - A language server running as a foreground and a background context")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve LSP over stdio
    Serve {
        /// Path to the config file (searched for if not specified)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the resolved configuration
    CheckConfig {
        /// Path to the config file (searched for if not specified)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => cmd_serve(config),
        Commands::CheckConfig { config } => cmd_check_config(config),
    }
}

fn load_settings(config: Option<PathBuf>) -> Option<Settings> {
    match Settings::load_from(config.as_deref()) {
        Ok(settings) => Some(settings),
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            None
        }
    }
}

fn init_tracing(settings: &Settings) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| settings.log.filter.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn cmd_serve(config: Option<PathBuf>) -> ExitCode {
    let Some(settings) = load_settings(config) else {
        return ExitCode::FAILURE;
    };
    init_tracing(&settings);

    if Role::current(&settings.worker.background_name) != Role::Foreground {
        eprintln!("The root context cannot play the background role");
        return ExitCode::FAILURE;
    }

    // Current-thread runtime: background messages are dispatched on the
    // same loop that serves LSP, in arrival order.
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error starting runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting twinlsp");
    runtime.block_on(lsp::run_stdio(&settings.worker, BaseEngine::factory()));
    ExitCode::SUCCESS
}

fn cmd_check_config(config: Option<PathBuf>) -> ExitCode {
    let Some(settings) = load_settings(config) else {
        return ExitCode::FAILURE;
    };

    if let Err(e) = settings.worker.resolved_root_path() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    match settings.to_toml() {
        Ok(rendered) => {
            print!("{}", rendered);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error rendering configuration: {}", e);
            ExitCode::FAILURE
        }
    }
}
