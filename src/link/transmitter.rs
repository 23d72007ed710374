//! # Frame Transmitter
//!
//! Serializes every write on this node behind one async mutex, and drives
//! the transceiver direction around each frame:
//!
//! 1. assert drive-enable
//! 2. write the whole frame and flush it
//! 3. hold the line for the settle interval so the last byte leaves the wire
//! 4. release drive-enable
//!
//! There is no acknowledgement on the bus. A frame lost to a collision is
//! simply never reconstructed by any receiver.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{trace, warn};

use crate::error::Result;
use crate::frame::encoder::encode_frame;

/// Bus transceiver control lines
#[cfg_attr(test, mockall::automock)]
pub trait Transceiver {
    /// Enable (transmit) or disable (receive) the line driver
    fn set_driver_enabled(&mut self, enabled: bool) -> io::Result<()>;

    /// Connect or disconnect the bus termination resistor
    fn set_termination(&mut self, enabled: bool) -> io::Result<()>;
}

/// Transceiver with automatic direction control, nothing to drive
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoDirection;

impl Transceiver for AutoDirection {
    fn set_driver_enabled(&mut self, _enabled: bool) -> io::Result<()> {
        Ok(())
    }

    fn set_termination(&mut self, _enabled: bool) -> io::Result<()> {
        Ok(())
    }
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
type BoxedTransceiver = Box<dyn Transceiver + Send>;

struct TxLine {
    writer: BoxedWriter,
    transceiver: BoxedTransceiver,
}

/// Drive-enable held for the duration of one frame
///
/// Released on drop too, so a cancelled write never leaves the driver on.
struct DriveGuard<'a> {
    transceiver: &'a mut (dyn Transceiver + Send),
    asserted: bool,
}

impl<'a> DriveGuard<'a> {
    fn assert(transceiver: &'a mut (dyn Transceiver + Send)) -> io::Result<Self> {
        transceiver.set_driver_enabled(true)?;
        Ok(Self {
            transceiver,
            asserted: true,
        })
    }

    fn release(mut self) -> io::Result<()> {
        self.asserted = false;
        self.transceiver.set_driver_enabled(false)
    }
}

impl Drop for DriveGuard<'_> {
    fn drop(&mut self) {
        if self.asserted {
            if let Err(e) = self.transceiver.set_driver_enabled(false) {
                warn!("Failed to release RS-485 driver: {}", e);
            }
        }
    }
}

/// Write half of the link
pub struct Transmitter {
    line: Mutex<TxLine>,
    line_settle: Duration,
}

impl std::fmt::Debug for Transmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transmitter")
            .field("line_settle", &self.line_settle)
            .finish_non_exhaustive()
    }
}

impl Transmitter {
    pub fn new<W, T>(writer: W, transceiver: T, line_settle: Duration) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
        T: Transceiver + Send + 'static,
    {
        Self {
            line: Mutex::new(TxLine {
                writer: Box::new(writer),
                transceiver: Box::new(transceiver),
            }),
            line_settle,
        }
    }

    /// Send one frame on the bus
    ///
    /// # Arguments
    ///
    /// * `slave` - Destination board address
    /// * `command` - Command id (0-31)
    /// * `payload` - Payload bytes (0-255)
    ///
    /// # Errors
    ///
    /// Returns error if the frame cannot be encoded, or if the line or the
    /// transceiver fails. Delivery itself is never confirmed.
    pub async fn write(&self, slave: u8, command: u8, payload: &[u8]) -> Result<()> {
        let frame = encode_frame(slave, command, payload)?;

        let mut line = self.line.lock().await;
        let TxLine {
            writer,
            transceiver,
        } = &mut *line;

        let drive = DriveGuard::assert(transceiver.as_mut())?;
        let sent = send_frame(writer, &frame).await;
        if sent.is_ok() {
            tokio::time::sleep(self.line_settle).await;
        }
        let released = drive.release();

        sent?;
        released?;

        trace!(
            "Sent frame to slave {} (cmd {}, {} bytes)",
            slave,
            command,
            frame.len()
        );
        Ok(())
    }
}

/// Write every byte of `frame`, retrying only when the line is not ready
async fn send_frame(writer: &mut BoxedWriter, frame: &[u8]) -> io::Result<()> {
    let mut sent = 0;
    while sent < frame.len() {
        match writer.write(&frame[sent..]).await {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "serial line accepted no bytes",
                ))
            }
            Ok(n) => sent += n,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
                tokio::task::yield_now().await;
            }
            Err(e) => return Err(e),
        }
    }
    writer.flush().await
}
