//! # RS-485 Link Library
//!
//! Half-duplex multi-drop link layer for boards sharing one RS-485 bus.
//!
//! This library provides framing with an additive checksum, an address
//! filtering receiver that batches packets and publishes them to waiting
//! readers, and a transmitter that serializes frames and drives the
//! transceiver direction.

pub mod config;
pub mod error;
pub mod frame;
pub mod link;
pub mod monitor;
pub mod serial;

pub use error::{Result, Rs485Error};
pub use frame::protocol::{NodeAddress, Packet};
pub use link::{LinkConfig, Rs485Link};
