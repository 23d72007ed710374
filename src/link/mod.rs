//! # RS-485 Link Module
//!
//! The node-side link layer.
//!
//! This module handles:
//! - Receiving frames on a dedicated task and validating them
//! - Buffering accepted packets and publishing them to waiting readers
//! - Serializing frame transmission and transceiver direction control
//! - Exposing `read`/`write` to the drivers running on this node

pub mod buffer;
pub mod receiver;
pub mod stats;
pub mod transmitter;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Result, Rs485Error};
use crate::frame::protocol::{NodeAddress, Packet};
use crate::serial::{self, RtsDirection};

use buffer::Dispatcher;
use receiver::Receiver;
use stats::{LinkStats, StatsSnapshot};
use transmitter::{Transceiver, Transmitter};

/// Default batch capacity
pub const DEFAULT_BUFFER_CAPACITY: usize = 5;

/// Default quiet time after which pending packets are published
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_millis(20);

/// Default time the driver stays enabled after the last byte
pub const DEFAULT_LINE_SETTLE: Duration = Duration::from_millis(20);

/// Runtime parameters of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    /// Address filter of this node
    pub address: NodeAddress,
    /// Quiet time after which pending packets are published
    ///
    /// The timer restarts on every byte on the line, including bytes of
    /// frames addressed to other boards. On a busy bus whose gaps stay
    /// shorter than this, a packet for this node waits until the batch fills.
    pub idle_interval: Duration,
    /// Packets per batch
    pub buffer_capacity: usize,
    /// Time the driver stays enabled after the last byte
    pub line_settle: Duration,
    /// Whether this node terminates the bus
    pub termination_enabled: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            address: NodeAddress::Addressed(0),
            idle_interval: DEFAULT_IDLE_INTERVAL,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            line_settle: DEFAULT_LINE_SETTLE,
            termination_enabled: true,
        }
    }
}

struct LinkInner {
    address: NodeAddress,
    dispatcher: Arc<Dispatcher>,
    transmitter: Transmitter,
    stats: Arc<LinkStats>,
    receiver: JoinHandle<()>,
}

impl Drop for LinkInner {
    fn drop(&mut self) {
        self.receiver.abort();
    }
}

/// Handle to a running RS-485 link
///
/// Cloning is cheap; all clones share the same receiver task, packet buffer
/// and write mutex. The receiver task stops when the last clone is dropped.
#[derive(Clone)]
pub struct Rs485Link {
    inner: Arc<LinkInner>,
}

impl std::fmt::Debug for Rs485Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rs485Link")
            .field("address", &self.inner.address)
            .field("capacity", &self.inner.dispatcher.capacity())
            .finish_non_exhaustive()
    }
}

impl Rs485Link {
    /// Start a link over an arbitrary byte stream
    ///
    /// Spawns the receiver task, so this must be called from within a Tokio
    /// runtime.
    ///
    /// # Arguments
    ///
    /// * `config` - Link parameters
    /// * `reader` - Receive side of the line
    /// * `writer` - Transmit side of the line
    /// * `transceiver` - Direction and termination control
    ///
    /// # Errors
    ///
    /// Returns error if the transceiver cannot be put in its idle state
    pub fn start<R, W, T>(config: LinkConfig, reader: R, writer: W, mut transceiver: T) -> Result<Self>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
        T: Transceiver + Send + 'static,
    {
        transceiver.set_termination(config.termination_enabled)?;
        transceiver.set_driver_enabled(false)?;

        let stats = Arc::new(LinkStats::default());
        let dispatcher = Arc::new(Dispatcher::new(config.buffer_capacity, Arc::clone(&stats)));

        let receiver = Receiver::new(
            reader,
            config.address,
            config.idle_interval,
            Arc::clone(&dispatcher),
            Arc::clone(&stats),
        );
        let receiver = tokio::spawn(async move {
            if let Err(e) = receiver.run().await {
                warn!("RS-485 receiver stopped: {}", e);
            }
        });

        info!(
            "RS-485 link started (address {}, termination {})",
            config.address,
            if config.termination_enabled { "on" } else { "off" }
        );

        Ok(Self {
            inner: Arc::new(LinkInner {
                address: config.address,
                dispatcher,
                transmitter: Transmitter::new(writer, transceiver, config.line_settle),
                stats,
                receiver,
            }),
        })
    }

    /// Open the configured serial port and start a link on it
    ///
    /// A port named `auto` is searched for among the default adapter paths.
    /// The driver-enable line is the port's RTS signal and the termination
    /// resistor is switched by DTR.
    ///
    /// # Errors
    ///
    /// Returns error if the port cannot be opened or its modem lines set
    pub fn open(config: &Config) -> Result<Self> {
        let port = if config.serial.port == serial::AUTO_DETECT {
            serial::open(config.serial.baud_rate)?.0
        } else {
            serial::open_port(&config.serial.port, config.serial.baud_rate)?
        };
        let (reader, writer, lines) = serial::split(port);
        Self::start(
            config.node.link_config(),
            reader,
            writer,
            RtsDirection::new(lines),
        )
    }

    /// Send a frame to `slave`
    ///
    /// Best effort: returns once the frame has left this node.
    ///
    /// # Errors
    ///
    /// Returns error if the command id is above 31, the payload exceeds 255
    /// bytes, or the line fails
    pub async fn write(&self, slave: u8, command: u8, payload: &[u8]) -> Result<()> {
        self.inner.transmitter.write(slave, command, payload).await
    }

    /// Wait for the newest packet matching one of `commands`
    ///
    /// Concurrent readers subscribed to the same command compete for each
    /// packet: only one of them is woken with it. Once any reader has asked
    /// for a command, a published packet carrying it holds the receiver
    /// until some `read` takes it.
    ///
    /// # Errors
    ///
    /// Returns error if `commands` is empty or out of range, or if the link
    /// closed before a matching packet arrived
    pub async fn read(&self, commands: &[u8]) -> Result<Packet> {
        self.inner.dispatcher.read(commands).await
    }

    /// Like [`read`](Self::read), copying the payload into `out`
    ///
    /// # Returns
    ///
    /// * `(length, source_address)` - bytes written to `out` and the frame's address field
    ///
    /// # Errors
    ///
    /// Same as [`read`](Self::read), plus `PayloadTooLarge` when `out` is
    /// shorter than the payload. The packet is consumed either way; a
    /// 255-byte buffer always fits.
    pub async fn read_into(&self, commands: &[u8], out: &mut [u8]) -> Result<(usize, u8)> {
        let packet = self.read(commands).await?;
        let length = packet.payload.len();
        if out.len() < length {
            return Err(Rs485Error::PayloadTooLarge(length));
        }
        out[..length].copy_from_slice(&packet.payload);
        Ok((length, packet.source_address))
    }

    /// Address filter this node was started with
    pub fn board_address(&self) -> NodeAddress {
        self.inner.address
    }

    /// Current link counters
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Whether the receiver task is still running
    pub fn is_receiving(&self) -> bool {
        !self.inner.receiver.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encoder::encode_frame;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::time::{sleep, timeout};
    use transmitter::AutoDirection;

    /// Link whose bus is an in-memory pipe: bytes written to the returned
    /// stream reach the receiver, frames sent by the link come out of it.
    fn test_link(config: LinkConfig) -> (Rs485Link, DuplexStream, DuplexStream) {
        let (bus_in, link_rx) = tokio::io::duplex(4096);
        let (link_tx, bus_out) = tokio::io::duplex(4096);
        let link = Rs485Link::start(config, link_rx, link_tx, AutoDirection).unwrap();
        (link, bus_in, bus_out)
    }

    fn fast_config(address: NodeAddress, capacity: usize) -> LinkConfig {
        LinkConfig {
            address,
            idle_interval: Duration::from_millis(10),
            buffer_capacity: capacity,
            line_settle: Duration::from_millis(1),
            termination_enabled: false,
        }
    }

    async fn settle() {
        sleep(Duration::from_millis(30)).await;
    }

    #[tokio::test]
    async fn test_write_puts_frame_on_bus() {
        let (link, _bus_in, mut bus_out) = test_link(fast_config(NodeAddress::Addressed(1), 5));

        link.write(3, 1, &[0x2A]).await.unwrap();

        let mut frame = [0u8; 8];
        bus_out.read_exact(&mut frame).await.unwrap();
        assert_eq!(frame, [0x3A, 0x03, 0x01, 0x01, 0x2A, 0x00, 0x76, 0x0D]);
    }

    #[tokio::test]
    async fn test_read_into_copies_payload_and_source() {
        let (link, mut bus_in, _bus_out) = test_link(fast_config(NodeAddress::Promiscuous, 5));

        let reader = {
            let link = link.clone();
            tokio::spawn(async move {
                let mut out = [0u8; 255];
                let (length, source) = link.read_into(&[4], &mut out).await.unwrap();
                (out[..length].to_vec(), source)
            })
        };
        settle().await;

        bus_in.write_all(&encode_frame(7, 4, &[1, 2, 3]).unwrap()).await.unwrap();

        let (payload, source) = timeout(Duration::from_secs(1), reader).await.unwrap().unwrap();
        assert_eq!(payload, vec![1, 2, 3]);
        assert_eq!(source, 7);
    }

    #[tokio::test]
    async fn test_read_into_rejects_short_buffer() {
        let (link, mut bus_in, _bus_out) = test_link(fast_config(NodeAddress::Addressed(1), 5));

        let reader = {
            let link = link.clone();
            tokio::spawn(async move {
                let mut out = [0u8; 2];
                link.read_into(&[4], &mut out).await
            })
        };
        settle().await;

        bus_in.write_all(&encode_frame(1, 4, &[1, 2, 3]).unwrap()).await.unwrap();

        let result = timeout(Duration::from_secs(1), reader).await.unwrap().unwrap();
        assert!(matches!(result, Err(Rs485Error::PayloadTooLarge(3))));
    }

    #[tokio::test]
    async fn test_read_returns_newest_of_batch() {
        let (link, mut bus_in, _bus_out) = test_link(fast_config(NodeAddress::Addressed(0), 5));

        let reader = {
            let link = link.clone();
            tokio::spawn(async move { link.read(&[0]).await })
        };
        settle().await;

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&encode_frame(0, 0, &[10]).unwrap());
        bytes.extend_from_slice(&encode_frame(0, 0, &[11]).unwrap());
        bytes.extend_from_slice(&encode_frame(0, 0, &[12]).unwrap());
        bus_in.write_all(&bytes).await.unwrap();

        let packet = timeout(Duration::from_secs(1), reader).await.unwrap().unwrap().unwrap();
        assert_eq!(packet.payload, vec![12]);
    }

    #[tokio::test]
    async fn test_addressed_node_ignores_other_slaves() {
        let (link, mut bus_in, _bus_out) = test_link(fast_config(NodeAddress::Addressed(2), 5));

        let reader = {
            let link = link.clone();
            tokio::spawn(async move { link.read(&[1]).await })
        };
        settle().await;

        bus_in.write_all(&encode_frame(5, 1, &[0xEE]).unwrap()).await.unwrap();
        settle().await;
        assert!(!reader.is_finished());

        bus_in.write_all(&encode_frame(2, 1, &[0x22]).unwrap()).await.unwrap();
        let packet = timeout(Duration::from_secs(1), reader).await.unwrap().unwrap().unwrap();
        assert_eq!(packet.payload, vec![0x22]);
        assert_eq!(link.stats().frames_filtered, 1);
    }

    #[tokio::test]
    async fn test_full_batch_publishes_before_next_frame() {
        // Capacity 2: commands 1 and 2 fill the first batch, 3 lands in the next one
        let (link, mut bus_in, _bus_out) = test_link(LinkConfig {
            idle_interval: Duration::from_millis(200),
            ..fast_config(NodeAddress::Addressed(1), 2)
        });

        let reader = {
            let link = link.clone();
            tokio::spawn(async move { link.read(&[3]).await })
        };
        settle().await;

        bus_in.write_all(&encode_frame(1, 1, &[1]).unwrap()).await.unwrap();
        bus_in.write_all(&encode_frame(1, 2, &[2]).unwrap()).await.unwrap();
        settle().await;

        // First batch published on capacity, command 3 not yet seen
        assert_eq!(link.stats().batches_published, 1);
        assert!(!reader.is_finished());

        bus_in.write_all(&encode_frame(1, 3, &[3]).unwrap()).await.unwrap();
        let packet = timeout(Duration::from_secs(1), reader).await.unwrap().unwrap().unwrap();
        assert_eq!(packet.command, 3);
        settle().await;
        assert_eq!(link.stats().batches_published, 2);
    }

    #[tokio::test]
    async fn test_packet_waits_for_busy_reader() {
        let (link, mut bus_in, _bus_out) = test_link(fast_config(NodeAddress::Addressed(1), 5));

        let consumer = {
            let link = link.clone();
            tokio::spawn(async move {
                let first = link.read(&[1]).await?;
                // Handling the first packet takes longer than the idle interval
                sleep(Duration::from_millis(100)).await;
                let second = link.read(&[1]).await?;
                Ok::<_, Rs485Error>((first, second))
            })
        };
        settle().await;

        bus_in.write_all(&encode_frame(1, 1, &[0xA1]).unwrap()).await.unwrap();
        sleep(Duration::from_millis(40)).await;
        bus_in.write_all(&encode_frame(1, 1, &[0xA2]).unwrap()).await.unwrap();

        let (first, second) = timeout(Duration::from_secs(1), consumer)
            .await
            .expect("second packet must still be readable after the idle publish")
            .unwrap()
            .unwrap();
        assert_eq!(first.payload, vec![0xA1]);
        assert_eq!(second.payload, vec![0xA2]);

        settle().await;
        let stats = link.stats();
        assert_eq!(stats.frames_accepted, 2);
        assert_eq!(stats.batches_published, 2);
    }

    #[tokio::test]
    async fn test_overlapping_readers_compete_for_one_packet() {
        let (link, mut bus_in, _bus_out) = test_link(fast_config(NodeAddress::Addressed(1), 5));

        let first = {
            let link = link.clone();
            tokio::spawn(async move { link.read(&[1, 2]).await })
        };
        let second = {
            let link = link.clone();
            tokio::spawn(async move { link.read(&[1, 2]).await })
        };
        settle().await;

        bus_in.write_all(&encode_frame(1, 1, &[0x01]).unwrap()).await.unwrap();
        sleep(Duration::from_millis(200)).await;

        assert!(
            first.is_finished() ^ second.is_finished(),
            "exactly one reader should receive the packet"
        );
        assert_eq!(link.stats().batches_published, 1);

        first.abort();
        second.abort();
    }

    #[tokio::test]
    async fn test_read_fails_once_line_closes() {
        let (link, bus_in, _bus_out) = test_link(fast_config(NodeAddress::Addressed(1), 5));
        drop(bus_in);

        let result = timeout(Duration::from_secs(1), link.read(&[1])).await.unwrap();
        assert!(matches!(result, Err(Rs485Error::LinkClosed)));
        settle().await;
        assert!(!link.is_receiving());
    }

    #[tokio::test]
    async fn test_board_address() {
        let (link, _bus_in, _bus_out) = test_link(fast_config(NodeAddress::Addressed(7), 5));
        assert_eq!(link.board_address(), NodeAddress::Addressed(7));

        let (link, _bus_in, _bus_out) = test_link(fast_config(NodeAddress::Promiscuous, 5));
        assert_eq!(link.board_address(), NodeAddress::Promiscuous);
    }

    #[tokio::test]
    async fn test_start_initializes_transceiver() {
        let mut transceiver = transmitter::MockTransceiver::new();
        transceiver
            .expect_set_termination()
            .withf(|enabled| *enabled)
            .times(1)
            .returning(|_| Ok(()));
        transceiver
            .expect_set_driver_enabled()
            .withf(|enabled| !*enabled)
            .times(1)
            .returning(|_| Ok(()));

        let (_bus_in, link_rx) = tokio::io::duplex(64);
        let (link_tx, _bus_out) = tokio::io::duplex(64);
        let config = LinkConfig::default();
        assert!(Rs485Link::start(config, link_rx, link_tx, transceiver).is_ok());
    }

    #[test]
    fn test_default_link_config() {
        let config = LinkConfig::default();
        assert_eq!(config.buffer_capacity, 5);
        assert_eq!(config.idle_interval, Duration::from_millis(20));
        assert_eq!(config.address, NodeAddress::Addressed(0));
        assert!(config.termination_enabled);
    }
}
