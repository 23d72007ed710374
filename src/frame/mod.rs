//! # RS-485 Frame Module
//!
//! Wire format of the multi-drop bus link.
//!
//! This module handles:
//! - Frame constants, node addressing and the decoded packet type
//! - 16-bit additive checksum calculation
//! - Frame encoding for the transmitter
//! - Whole-buffer frame decoding and validation
//! - Well-known board addresses and command ids used on the bus

pub mod protocol;
pub mod checksum;
pub mod encoder;
pub mod decoder;
pub mod definitions;
