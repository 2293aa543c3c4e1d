//! CLI entry point for the voice-dialogue server.
//!
//! Grounded on the teacher's `clap` derive dispatch pattern
//! (`Cli`/`Commands`/`match`), trimmed to the two concerns this
//! server actually has: starting the device WebSocket server and
//! inspecting/seeding its configuration.

use clap::{Parser, Subcommand};
use anyhow::Result;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "my-agent")]
#[command(about = "Xiaozhi voice-dialogue server", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the device WebSocket server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on
        #[arg(short, long, default_value = "8000")]
        port: u16,
    },
    /// Inspect or initialize the on-disk configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the active configuration
    Show,
    /// Print the path of the on-disk config file
    Path,
    /// Write out the default configuration, creating it if missing
    Init,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { host, port }) => {
            crate::server::start(&host, port).await?;
        }
        Some(Commands::Config { command }) => match command {
            ConfigCommands::Show => {
                crate::config::show_config()?;
            }
            ConfigCommands::Path => {
                println!("{}", crate::config::config_path()?.display());
            }
            ConfigCommands::Init => {
                let config = Config::load()?;
                config.save()?;
                println!("wrote default configuration to {}", crate::config::config_path()?.display());
            }
        },
        None => {
            // No subcommand: start the server with default bind address,
            // the common case for a container/systemd entry point.
            crate::server::start("0.0.0.0", 8000).await?;
        }
    }

    Ok(())
}
