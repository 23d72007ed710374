//! # Frame Protocol Constants and Types
//!
//! Core definitions for the RS-485 link frame:
//!
//! ```text
//! start(0x3A) | slave | cmd | length | data[length] | checksum(BE u16) | end(0x0D)
//! ```

use crate::error::{Result, Rs485Error};

/// Frame start byte (ASCII ':')
pub const START_BYTE: u8 = 0x3A;

/// Frame end byte (ASCII carriage return)
pub const END_BYTE: u8 = 0x0D;

/// Maximum payload size, bounded by the one-byte length field
pub const MAX_PAYLOAD_SIZE: usize = 255;

/// Bytes surrounding the payload: start + slave + cmd + length + checksum(2) + end
pub const FRAME_OVERHEAD: usize = 7;

/// Highest command id; command ids double as bit indices in a 32-bit event mask
pub const MAX_COMMAND: u8 = 31;

/// Maximum complete frame size
pub const MAX_FRAME_SIZE: usize = FRAME_OVERHEAD + MAX_PAYLOAD_SIZE;

/// Address filter of a node on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeAddress {
    /// Only frames whose slave field equals this address are admitted
    Addressed(u8),

    /// Every well-formed frame is admitted, whatever its slave field
    Promiscuous,
}

impl NodeAddress {
    /// Whether a frame targeting `slave` is admitted by this node
    pub fn accepts(&self, slave: u8) -> bool {
        match self {
            NodeAddress::Addressed(address) => *address == slave,
            NodeAddress::Promiscuous => true,
        }
    }
}

impl std::fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeAddress::Addressed(address) => write!(f, "{}", address),
            NodeAddress::Promiscuous => write!(f, "promiscuous"),
        }
    }
}

/// Check that a command id fits in the event mask
///
/// # Errors
///
/// Returns `InvalidCommand` if `command` is above [`MAX_COMMAND`]
pub fn validate_command(command: u8) -> Result<u8> {
    if command > MAX_COMMAND {
        return Err(Rs485Error::InvalidCommand(command));
    }
    Ok(command)
}

/// Event mask bit for a command id (`command` must be ≤ 31)
pub fn command_bit(command: u8) -> u32 {
    1u32 << command
}

/// Build an event mask from a set of command ids
///
/// # Errors
///
/// Returns `InvalidCommand` for the first id above [`MAX_COMMAND`]
pub fn command_mask(commands: &[u8]) -> Result<u32> {
    commands.iter().try_fold(0u32, |mask, &command| {
        Ok(mask | command_bit(validate_command(command)?))
    })
}

/// A decoded, validated frame as held in the packet buffer
///
/// Only [`Packet::new`] and the decoders build one, so the payload always
/// fits the one-byte length field:
///
/// ```compile_fail
/// use rs485_link::Packet;
///
/// let packet = Packet { source_address: 1, command: 1, payload: vec![0; 300] };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Address field carried by the frame
    pub(crate) source_address: u8,

    /// Command id (0-31)
    pub(crate) command: u8,

    /// Payload data (at most 255 bytes)
    pub(crate) payload: Vec<u8>,
}

impl Packet {
    /// Create a new packet
    ///
    /// # Errors
    ///
    /// Returns error if the command id is above 31 or the payload exceeds 255 bytes
    pub fn new(source_address: u8, command: u8, payload: Vec<u8>) -> Result<Self> {
        validate_command(command)?;
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(Rs485Error::PayloadTooLarge(payload.len()));
        }

        Ok(Self {
            source_address,
            command,
            payload,
        })
    }

    /// Address field carried by the frame
    pub fn source_address(&self) -> u8 {
        self.source_address
    }

    /// Command id (0-31)
    pub fn command(&self) -> u8 {
        self.command
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Payload length as carried in the frame's length field
    pub fn length(&self) -> u8 {
        // Packet::new caps the payload at MAX_PAYLOAD_SIZE
        self.payload.len() as u8
    }
}
