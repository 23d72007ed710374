//! # Frame Receiver
//!
//! Streaming frame parser and the receiver task that feeds it.
//!
//! The parser walks `SeekStart → ReadHeader → ReadPayload → ReadChecksum →
//! Validate` one byte at a time. A rejected frame is dropped whole and the
//! parser goes back to hunting for a start byte; bytes already consumed are
//! never replayed, so a start byte inside a corrupt frame's payload can make
//! the parser lock onto garbage until the next real frame boundary.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;
use tracing::{debug, info, trace};

use crate::error::Result;
use crate::frame::decoder::{FrameFault, RawFrame};
use crate::frame::protocol::{NodeAddress, Packet, MAX_PAYLOAD_SIZE, START_BYTE};

use super::buffer::Dispatcher;
use super::stats::LinkStats;

/// Parser states, in wire order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxState {
    /// Discarding bytes until a start byte
    SeekStart,
    /// Reading slave, command and length
    ReadHeader,
    /// Reading `length` payload bytes
    ReadPayload,
    /// Reading the big-endian checksum
    ReadChecksum,
    /// Waiting for the end byte, then validating
    Validate,
}

/// Why a complete candidate frame was not admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Delimiter, command range or checksum failure
    Fault(FrameFault),
    /// Valid frame addressed to another board
    NotForUs(u8),
}

/// Byte-at-a-time frame parser
#[derive(Debug)]
pub struct FrameParser {
    address: NodeAddress,
    state: RxState,
    header: [u8; 3],
    header_len: usize,
    payload: [u8; MAX_PAYLOAD_SIZE],
    payload_len: usize,
    checksum: [u8; 2],
    checksum_len: usize,
}

impl FrameParser {
    pub fn new(address: NodeAddress) -> Self {
        Self {
            address,
            state: RxState::SeekStart,
            header: [0; 3],
            header_len: 0,
            payload: [0; MAX_PAYLOAD_SIZE],
            payload_len: 0,
            checksum: [0; 2],
            checksum_len: 0,
        }
    }

    /// Current parser state
    pub fn state(&self) -> RxState {
        self.state
    }

    fn length(&self) -> usize {
        usize::from(self.header[2])
    }

    fn restart(&mut self) {
        self.state = RxState::SeekStart;
        self.header_len = 0;
        self.payload_len = 0;
        self.checksum_len = 0;
    }

    /// Feed one byte from the line
    ///
    /// # Returns
    ///
    /// * `None` - frame still incomplete (or no frame started)
    /// * `Some(Ok(packet))` - a frame for this node passed validation
    /// * `Some(Err(rejection))` - a complete candidate frame was discarded
    pub fn push(&mut self, byte: u8) -> Option<std::result::Result<Packet, Rejection>> {
        match self.state {
            RxState::SeekStart => {
                if byte == START_BYTE {
                    self.state = RxState::ReadHeader;
                }
                None
            }
            RxState::ReadHeader => {
                self.header[self.header_len] = byte;
                self.header_len += 1;
                if self.header_len == self.header.len() {
                    self.state = if self.length() == 0 {
                        RxState::ReadChecksum
                    } else {
                        RxState::ReadPayload
                    };
                }
                None
            }
            RxState::ReadPayload => {
                self.payload[self.payload_len] = byte;
                self.payload_len += 1;
                if self.payload_len == self.length() {
                    self.state = RxState::ReadChecksum;
                }
                None
            }
            RxState::ReadChecksum => {
                self.checksum[self.checksum_len] = byte;
                self.checksum_len += 1;
                if self.checksum_len == self.checksum.len() {
                    self.state = RxState::Validate;
                }
                None
            }
            RxState::Validate => {
                let raw = RawFrame {
                    slave: self.header[0],
                    command: self.header[1],
                    payload: &self.payload[..self.payload_len],
                    checksum: u16::from_be_bytes(self.checksum),
                    end: byte,
                };
                let outcome = match raw.validate() {
                    Err(fault) => Err(Rejection::Fault(fault)),
                    Ok(()) if !self.address.accepts(raw.slave) => {
                        Err(Rejection::NotForUs(raw.slave))
                    }
                    Ok(()) => Ok(Packet {
                        source_address: raw.slave,
                        command: raw.command,
                        payload: raw.payload.to_vec(),
                    }),
                };
                self.restart();
                Some(outcome)
            }
        }
    }
}

/// Receiver task state
///
/// Owns the read side of the line for the lifetime of the link.
pub struct Receiver<R> {
    reader: R,
    parser: FrameParser,
    idle_interval: Duration,
    dispatcher: Arc<Dispatcher>,
    stats: Arc<LinkStats>,
}

impl<R: AsyncRead + Unpin> Receiver<R> {
    pub fn new(
        reader: R,
        address: NodeAddress,
        idle_interval: Duration,
        dispatcher: Arc<Dispatcher>,
        stats: Arc<LinkStats>,
    ) -> Self {
        Self {
            reader,
            parser: FrameParser::new(address),
            idle_interval,
            dispatcher,
            stats,
        }
    }

    /// Run until the line fails or reaches end of stream
    ///
    /// Packets still buffered when the line ends stay readable after the
    /// dispatcher is closed.
    pub async fn run(mut self) -> Result<()> {
        info!(
            "RS-485 receiver started (address {}, batch capacity {})",
            self.parser.address,
            self.dispatcher.capacity()
        );

        let result = self.receive_loop().await;
        self.dispatcher.close();
        result
    }

    async fn receive_loop(&mut self) -> Result<()> {
        loop {
            let byte = self.next_byte().await?;
            let Some(outcome) = self.parser.push(byte) else {
                continue;
            };

            match outcome {
                Ok(packet) => {
                    trace!(
                        "Accepted packet from {} (cmd {}, {} bytes)",
                        packet.source_address,
                        packet.command,
                        packet.payload.len()
                    );
                    self.stats.record_accepted();
                    if self.dispatcher.push(packet) {
                        self.dispatcher.publish().await;
                    }
                }
                Err(Rejection::NotForUs(slave)) => {
                    trace!("Ignoring frame for slave {}", slave);
                    self.stats.record_filtered();
                }
                Err(Rejection::Fault(fault)) => {
                    debug!("Discarding frame: {}", fault);
                    self.stats.record_corrupt();
                }
            }
        }
    }

    /// Read one byte, publishing the pending batch whenever the line goes
    /// quiet for `idle_interval`
    async fn next_byte(&mut self) -> Result<u8> {
        loop {
            if self.dispatcher.is_empty() {
                return Ok(self.reader.read_u8().await?);
            }

            match timeout(self.idle_interval, self.reader.read_u8()).await {
                Ok(byte) => return Ok(byte?),
                Err(_) => {
                    trace!("Line idle, publishing {} packet(s)", self.dispatcher.len());
                    self.dispatcher.publish().await;
                }
            }
        }
    }
}
