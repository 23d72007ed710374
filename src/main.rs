//! # RS-485 Monitor
//!
//! Joins the bus as a node and logs every packet it is allowed to see.

use anyhow::{Context, Result};
use tracing::{info, warn};

use rs485_link::config::Config;
use rs485_link::monitor::Monitor;
use rs485_link::{Rs485Error, Rs485Link};

/// Configuration file used when none is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Main entry point for the bus monitor
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Set up logging with tracing subscriber
///    - Load configuration (first argument, or `config/default.toml`)
///    - Open the serial port and start the link
///
/// 2. **Main Loop**
///    - Wait for packets matching the configured commands
///    - Log each one and append it to the record file when enabled
///    - Handle Ctrl+C for graceful shutdown
///
/// # Errors
///
/// Returns error if the configuration is invalid or the port cannot be opened
///
/// # Examples
///
/// ```bash
/// cargo run --release -- config/default.toml
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("RS-485 monitor v{} starting...", env!("CARGO_PKG_VERSION"));

    let config_path = config_path(std::env::args().nth(1));
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path))?;

    let link = Rs485Link::open(&config)
        .with_context(|| format!("failed to open {}", config.serial.port))?;
    info!("Listening on {} at {} baud", config.serial.port, config.serial.baud_rate);

    let mut monitor = Monitor::from_config(link, &config.monitor)?;
    info!("Press Ctrl+C to exit");

    loop {
        tokio::select! {
            received = monitor.next() => {
                match received {
                    Ok(_) => {}
                    Err(Rs485Error::LinkClosed) => {
                        warn!("Link closed, stopping monitor");
                        break;
                    }
                    Err(e) => warn!("Monitor error: {}", e),
                }
            }

            // Handle Ctrl+C for graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    info!("Total packets seen: {}", monitor.seen());
    info!("Link counters: {:?}", monitor.link().stats());

    Ok(())
}

fn config_path(arg: Option<String>) -> String {
    arg.unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
}
