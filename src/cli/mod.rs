//! CLI Module
//!
//! Command-line interface for wa-pairbridge using Clap v4.

mod commands;

use crate::config::Config;
use anyhow::Result;
use clap::{Parser, Subcommand};

/// wa-pairbridge - WhatsApp Cloud API webhook and device pairing bridge
#[derive(Parser, Debug)]
#[command(name = "wa-pairbridge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve {
        /// Override the listen port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Write a default configuration file
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show configuration
    Config {
        /// Show full configuration including secrets
        #[arg(short, long)]
        show_secrets: bool,
    },
}

/// Main CLI entry point
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match cli.config.as_deref() {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    let _log_guard = crate::logging::init(&config.logging, cli.debug)?;
    if cli.debug {
        tracing::info!("Debug mode enabled");
    }

    match cli.command {
        None => commands::cmd_serve(&config).await,
        Some(Commands::Serve { port }) => {
            if let Some(port) = port {
                config.server.port = port;
            }
            commands::cmd_serve(&config).await
        }
        Some(Commands::Init { force }) => commands::cmd_init(force),
        Some(Commands::Config { show_secrets }) => commands::cmd_config(&config, show_secrets),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_command_is_none() {
        let cli = Cli::try_parse_from(["wa-pairbridge", "--debug"]).unwrap();
        assert!(cli.debug);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_serve_port_override() {
        let cli = Cli::try_parse_from(["wa-pairbridge", "serve", "--port", "8080"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Serve { port: Some(8080) })));
    }
}
