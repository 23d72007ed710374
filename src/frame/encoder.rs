//! # Frame Encoder
//!
//! Builds the exact byte sequence put on the bus by the transmitter.

use bytes::{BufMut, Bytes, BytesMut};

use super::checksum::checksum;
use super::protocol::*;
use crate::error::{Result, Rs485Error};

/// Encode a complete frame
///
/// # Arguments
///
/// * `slave` - Destination board address
/// * `command` - Command id (0-31)
/// * `payload` - Payload bytes (0-255)
///
/// # Returns
///
/// * `Result<Bytes>` - Complete frame (`7 + payload.len()` bytes)
///
/// # Errors
///
/// Returns error if the command id is above 31 or the payload exceeds 255 bytes
///
/// # Examples
///
/// ```
/// use rs485_link::frame::encoder::encode_frame;
///
/// let frame = encode_frame(3, 1, &[0x2A]).unwrap();
/// assert_eq!(&frame[..], &[0x3A, 0x03, 0x01, 0x01, 0x2A, 0x00, 0x76, 0x0D]);
/// ```
pub fn encode_frame(slave: u8, command: u8, payload: &[u8]) -> Result<Bytes> {
    validate_command(command)?;
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(Rs485Error::PayloadTooLarge(payload.len()));
    }

    let length = payload.len() as u8;
    let sum = checksum(slave, command, length, payload);

    let mut frame = BytesMut::with_capacity(FRAME_OVERHEAD + payload.len());
    frame.put_u8(START_BYTE);
    frame.put_u8(slave);
    frame.put_u8(command);
    frame.put_u8(length);
    frame.put_slice(payload);
    frame.put_u16(sum); // big-endian
    frame.put_u8(END_BYTE);

    Ok(frame.freeze())
}

/// Encode a packet as a frame addressed with its `source_address` field
pub fn encode_packet(packet: &Packet) -> Result<Bytes> {
    encode_frame(packet.source_address, packet.command, &packet.payload)
}
