//! Link counters, updated by the receiver task and the dispatcher.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared between the receiver task and the link handle
#[derive(Debug, Default)]
pub struct LinkStats {
    frames_accepted: AtomicU64,
    frames_filtered: AtomicU64,
    frames_corrupt: AtomicU64,
    packets_dropped: AtomicU64,
    batches_published: AtomicU64,
}

/// Point-in-time copy of [`LinkStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Frames that passed validation and entered the packet buffer
    pub frames_accepted: u64,
    /// Well-formed frames addressed to another board
    pub frames_filtered: u64,
    /// Frames discarded for a bad end byte, checksum or command id
    pub frames_corrupt: u64,
    /// Valid frames that found the packet buffer full
    pub packets_dropped: u64,
    /// Batches made visible to readers
    pub batches_published: u64,
}

impl LinkStats {
    pub(crate) fn record_accepted(&self) {
        self.frames_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_filtered(&self) {
        self.frames_filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_corrupt(&self) {
        self.frames_corrupt.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.packets_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_published(&self) {
        self.batches_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_accepted: self.frames_accepted.load(Ordering::Relaxed),
            frames_filtered: self.frames_filtered.load(Ordering::Relaxed),
            frames_corrupt: self.frames_corrupt.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            batches_published: self.batches_published.load(Ordering::Relaxed),
        }
    }
}
