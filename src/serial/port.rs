//! Shared serial port split into read, write and modem-line handles.
//!
//! `tokio::io::split` would hide the port behind halves that can no longer
//! reach RTS/DTR, so the port lives behind a mutex that each handle locks
//! only for the duration of a single poll.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_serial::{SerialPort, SerialStream};

use crate::link::transmitter::Transceiver;

type SharedPort = Arc<Mutex<SerialStream>>;

fn lock(port: &SharedPort) -> MutexGuard<'_, SerialStream> {
    port.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Receive side of a shared port
pub struct PortReader {
    port: SharedPort,
}

/// Transmit side of a shared port
pub struct PortWriter {
    port: SharedPort,
}

/// Modem control lines of a shared port
pub struct PortLines {
    port: SharedPort,
}

/// Split an open port into its three handles
pub fn split(port: SerialStream) -> (PortReader, PortWriter, PortLines) {
    let port = Arc::new(Mutex::new(port));
    (
        PortReader {
            port: Arc::clone(&port),
        },
        PortWriter {
            port: Arc::clone(&port),
        },
        PortLines { port },
    )
}

impl AsyncRead for PortReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut port = lock(&self.port);
        Pin::new(&mut *port).poll_read(cx, buf)
    }
}

impl AsyncWrite for PortWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut port = lock(&self.port);
        Pin::new(&mut *port).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut port = lock(&self.port);
        Pin::new(&mut *port).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut port = lock(&self.port);
        Pin::new(&mut *port).poll_shutdown(cx)
    }
}

impl PortLines {
    /// Drive the RTS output
    pub fn set_rts(&mut self, level: bool) -> io::Result<()> {
        lock(&self.port)
            .write_request_to_send(level)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    /// Drive the DTR output
    pub fn set_dtr(&mut self, level: bool) -> io::Result<()> {
        lock(&self.port)
            .write_data_terminal_ready(level)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

/// Transceiver wired to the adapter's modem lines: RTS drives DE/RE, DTR
/// switches the termination resistor
pub struct RtsDirection {
    lines: PortLines,
}

impl RtsDirection {
    pub fn new(lines: PortLines) -> Self {
        Self { lines }
    }
}

impl Transceiver for RtsDirection {
    fn set_driver_enabled(&mut self, enabled: bool) -> io::Result<()> {
        self.lines.set_rts(enabled)
    }

    fn set_termination(&mut self, enabled: bool) -> io::Result<()> {
        self.lines.set_dtr(enabled)
    }
}
