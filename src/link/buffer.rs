//! # Packet Buffer and Dispatcher
//!
//! Bounded batch of decoded packets plus a 32-bit event signal, one bit per
//! command id. The receiver fills a batch, then publishes it: the accumulated
//! bits become visible to readers and the receiver waits until every
//! published bit has been consumed. Only then is the batch cleared and a new
//! one started, so a reader never sees a slot being overwritten and a reader
//! busy between two `read` calls still finds its packet.
//!
//! Bits for commands no reader of this link has ever subscribed to are
//! dropped from the signal at publish time; nobody would ever consume them.
//!
//! Readers consume by clearing the bits of their whole subscription. Two
//! readers subscribed to the same command therefore compete for one packet:
//! the first to wake takes it and the other keeps waiting for the next batch.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::{trace, warn};

use crate::error::{Result, Rs485Error};
use crate::frame::protocol::{command_bit, command_mask, Packet};

use super::stats::LinkStats;

#[derive(Debug)]
struct BufferState {
    /// Packets of the current batch, in arrival order
    packets: Vec<Packet>,
    /// Bits of buffered packets not yet published
    pending: u32,
    /// Published bits not yet consumed
    signal: u32,
    /// Every bit any reader has subscribed to, never cleared
    known: u32,
    /// Receiver has stopped
    closed: bool,
}

impl BufferState {
    fn newest_match(&self, mask: u32) -> Option<&Packet> {
        self.packets
            .iter()
            .rev()
            .find(|packet| mask & command_bit(packet.command) != 0)
    }
}

/// Shared packet buffer between the receiver task and reader calls
#[derive(Debug)]
pub struct Dispatcher {
    state: Mutex<BufferState>,
    changed: Notify,
    capacity: usize,
    stats: Arc<LinkStats>,
}

impl Dispatcher {
    /// Create an empty buffer holding at most `capacity` packets per batch
    pub fn new(capacity: usize, stats: Arc<LinkStats>) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(BufferState {
                packets: Vec::with_capacity(capacity),
                pending: 0,
                signal: 0,
                known: 0,
                closed: false,
            }),
            changed: Notify::new(),
            capacity,
            stats,
        }
    }

    fn state(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Batch capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of packets in the current batch
    pub fn len(&self) -> usize {
        self.state().packets.len()
    }

    /// Whether the current batch is empty
    pub fn is_empty(&self) -> bool {
        self.state().packets.is_empty()
    }

    /// Append a validated packet to the current batch
    ///
    /// # Returns
    ///
    /// * `bool` - `true` once the batch has reached capacity and must be published
    pub fn push(&self, packet: Packet) -> bool {
        let mut state = self.state();

        if state.packets.len() >= self.capacity {
            warn!(
                "Packet buffer full, dropping packet (cmd {}) until next publish",
                packet.command
            );
            self.stats.record_dropped();
            return true;
        }

        state.pending |= command_bit(packet.command);
        state.packets.push(packet);
        state.packets.len() >= self.capacity
    }

    /// Publish the current batch and wait until readers drained it
    ///
    /// Does nothing on an empty batch. Blocks while any published bit that
    /// some reader has subscribed to is still unconsumed, even if that
    /// reader is not inside `read` right now. On return the batch and the
    /// event signal are both cleared.
    pub async fn publish(&self) {
        {
            let mut state = self.state();
            if state.packets.is_empty() {
                return;
            }
            state.signal = state.pending & state.known;
            trace!(
                "Publishing {} packet(s), event mask 0x{:08X} (unclaimed 0x{:08X})",
                state.packets.len(),
                state.signal,
                state.pending & !state.known
            );
        }
        self.changed.notify_waiters();

        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state();
                if state.signal == 0 {
                    state.packets.clear();
                    state.pending = 0;
                    state.signal = 0;
                    self.stats.record_published();
                    return;
                }
            }

            notified.await;
        }
    }

    /// Wait for the newest published packet matching one of `commands`
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - `commands` is empty or holds an id above 31
    /// - the receiver stopped and no matching packet is published
    pub async fn read(&self, commands: &[u8]) -> Result<Packet> {
        let mask = command_mask(commands)?;
        if mask == 0 {
            return Err(Rs485Error::EmptySubscription);
        }

        self.state().known |= mask;

        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state();
                let found = if state.signal & mask != 0 {
                    state.newest_match(mask).cloned()
                } else {
                    None
                };
                if let Some(packet) = found {
                    state.signal &= !mask;
                    drop(state);
                    self.changed.notify_waiters();
                    return Ok(packet);
                }
                if state.closed {
                    return Err(Rs485Error::LinkClosed);
                }
            }

            notified.await;
        }
    }

    /// Mark the receiver as stopped and wake every reader
    ///
    /// Packets still buffered are made visible without waiting for them to
    /// be read; once they are consumed, reads fail with `LinkClosed`.
    pub fn close(&self) {
        {
            let mut state = self.state();
            if !state.packets.is_empty() {
                state.signal |= state.pending & state.known;
            }
            state.closed = true;
        }
        self.changed.notify_waiters();
    }
}
