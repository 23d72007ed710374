//! # Serial Communication Module
//!
//! Opens the RS-485 adapter and splits it between the receiver task and
//! the transmitter.
//!
//! This module handles:
//! - Opening the serial port (8N1, no flow control)
//! - Auto-detecting the adapter among common device paths
//! - Sharing one port between the read side, the write side and the modem
//!   control lines used for transceiver direction and termination

mod port;

pub use port::{split, PortLines, PortReader, PortWriter, RtsDirection};

use crate::error::{Result, Rs485Error};
use tracing::{debug, info, warn};

/// Default bus baud rate
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Port name that selects the first adapter found at a default path
pub const AUTO_DETECT: &str = "auto";

/// Default RS-485 adapter paths to try (in order of preference)
const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyUSB0", // USB-to-RS485 adapters
    "/dev/ttyAMA0", // On-board UART wired to a transceiver
];

/// Open the first RS-485 adapter found at a default path
///
/// # Errors
///
/// Returns `SerialPortNotFound` if no default path can be opened
///
/// # Examples
///
/// ```no_run
/// use rs485_link::serial::{open, DEFAULT_BAUD_RATE};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let (port, path) = open(DEFAULT_BAUD_RATE)?;
///     println!("Connected to: {}", path);
///     Ok(())
/// }
/// ```
pub fn open(baud_rate: u32) -> Result<(tokio_serial::SerialStream, String)> {
    open_with_paths(DEFAULT_DEVICE_PATHS, baud_rate)
}

/// Open the first path in `paths` that succeeds
///
/// # Arguments
///
/// * `paths` - Device paths to try (e.g., &["/dev/ttyUSB0"])
/// * `baud_rate` - Line speed
///
/// # Returns
///
/// * `Result<(SerialStream, String)>` - Opened port and the path it was found at
pub fn open_with_paths(
    paths: &[&str],
    baud_rate: u32,
) -> Result<(tokio_serial::SerialStream, String)> {
    for path in paths {
        debug!("Trying to open serial port: {}", path);

        match open_port(path, baud_rate) {
            Ok(port) => {
                info!("Opened RS-485 adapter at {}", path);
                return Ok((port, path.to_string()));
            }
            Err(e) => {
                warn!("Failed to open {}: {}", path, e);
                continue;
            }
        }
    }

    Err(Rs485Error::SerialPortNotFound(paths.join(", ")))
}

/// Open a specific serial port with bus settings
///
/// Must be called from within a Tokio runtime.
///
/// # Arguments
///
/// * `path` - Device path (e.g., "/dev/ttyUSB0")
/// * `baud_rate` - Line speed
pub fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
    use tokio_serial::SerialPortBuilderExt;

    let port = tokio_serial::new(path, baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| Rs485Error::Serial(format!("Failed to open {}: {}", path, e)))?;

    Ok(port)
}
