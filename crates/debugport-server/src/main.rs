// ============================================
// File: crates/debugport-server/src/main.rs
// ============================================
//! # Debugport Server Entry Point
//!
//! ## Creation Reason
//! Standalone binary for running the debug server outside an
//! embedding application. Handles CLI parsing, logging setup, and
//! lifecycle wiring.
//!
//! ## Main Functionality
//! - CLI argument parsing with clap
//! - Logging initialization with tracing
//! - Configuration loading and validation
//! - Token generation for operators
//!
//! ## Usage
//! ```bash
//! # Start with a config file
//! debugport-server start --config /etc/debugport/server.toml
//!
//! # Validate a config file
//! debugport-server validate --config /etc/debugport/server.toml
//!
//! # Generate a token to put in the config
//! debugport-server gen-token
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! The auto-generated auth token is printed to stdout exactly once at
//! startup, never to the log stream. Keep it that way: log files
//! outlive tokens.
//!
//! ## Last Modified
//! v0.1.0 - Initial CLI implementation

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use debugport_common::AuthToken;
use debugport_server::{Server, ServerConfig};

// ============================================
// CLI Definition
// ============================================

/// Debugport remote debug server
#[derive(Parser, Debug)]
#[command(name = "debugport-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the server
    Start {
        /// Path to configuration file
        #[arg(short, long, default_value = "/etc/debugport/server.toml")]
        config: PathBuf,
    },

    /// Validate configuration file
    Validate {
        /// Path to configuration file
        #[arg(short, long, default_value = "/etc/debugport/server.toml")]
        config: PathBuf,
    },

    /// Generate a high-entropy auth token for the config file
    GenToken,
}

// ============================================
// Main
// ============================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // `start` installs the subscriber itself, after reading the
    // configured level. Installing one here would pin the level to
    // "info" for the rest of the run.
    let result = match cli.command {
        Commands::Start { config } => cmd_start(config).await,
        Commands::Validate { config } => {
            init_logging("info");
            cmd_validate(config).await
        }
        Commands::GenToken => {
            init_logging("info");
            cmd_gen_token()
        }
    };

    if let Err(e) = result {
        // No-op when a subscriber is already installed.
        init_logging("info");
        error!("{}", e);
        std::process::exit(1);
    }
}

// ============================================
// Commands
// ============================================

/// Starts the server and runs it until Ctrl-C.
async fn cmd_start(config_path: PathBuf) -> anyhow::Result<()> {
    // Load the config before logging is set up: the subscriber can
    // only be installed once, so the configured level must be known
    // first.
    let (config, used_defaults) = if config_path.exists() {
        (ServerConfig::load(&config_path).await?, false)
    } else {
        (ServerConfig::default(), true)
    };

    init_logging(&config.logging.level);

    if used_defaults {
        info!("Config file not found, using defaults");
    }

    let server = Server::new(config);

    if server.auth_token_generated() {
        // Stdout, not the log stream: operators need this once,
        // log files should never contain it.
        println!("════════════════════════════════════════");
        println!("  Auth token (generated for this run):");
        println!("  {}", server.auth_token().expose());
        println!("════════════════════════════════════════");
    }

    server.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    server.stop().await;

    Ok(())
}

/// Validates configuration file.
async fn cmd_validate(config_path: PathBuf) -> anyhow::Result<()> {
    if !config_path.exists() {
        println!("⚠️  Config file not found: {}", config_path.display());
        println!("   Server will use default values.");
        return Ok(());
    }

    let config = ServerConfig::load(&config_path).await?;

    println!("✅ Configuration is valid");
    println!();
    println!("Network:");
    println!("   Listen:     {}", config.bind_addr());
    println!("   TLS:        {}", if config.tls.enabled { "enabled" } else { "disabled" });
    println!();
    println!("Auth:");
    println!("   Required:   {}", config.auth.required);
    println!(
        "   Token:      {}",
        if config.auth.token.is_some() { "configured" } else { "generated per run" }
    );
    println!();
    println!("Limits:");
    println!("   Max Clients:    {}", config.limits.max_clients);
    println!("   Idle Timeout:   {}s", config.limits.idle_timeout_secs);
    println!();
    println!("Dispatch:");
    println!("   Workers:        {}", config.dispatch.worker_pool_size);
    println!("   Cache TTL:      {}s", config.dispatch.cache_ttl_secs);
    println!();

    Ok(())
}

/// Prints a fresh token for pasting into `auth.token`.
fn cmd_gen_token() -> anyhow::Result<()> {
    let token = AuthToken::generate();
    println!("{}", token.expose());
    Ok(())
}

// ============================================
// Helper Functions
// ============================================

/// Initializes the tracing subscriber.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .ok();
}
