//! # Frame Checksum
//!
//! 16-bit wrapping additive checksum over the frame header, the end byte
//! and every payload byte. The start and end delimiters are part of the sum
//! even though they are constants.

use super::protocol::{END_BYTE, START_BYTE};

/// Calculate the frame checksum
///
/// # Arguments
///
/// * `slave` - Destination address field
/// * `command` - Command id field
/// * `length` - Payload length field
/// * `payload` - Payload bytes (only the first `length` bytes are summed)
///
/// # Returns
///
/// * `u16` - `(0x3A + slave + cmd + length + 0x0D + Σpayload) mod 65536`
///
/// # Examples
///
/// ```
/// use rs485_link::frame::checksum::checksum;
///
/// assert_eq!(checksum(3, 1, 1, &[0x2A]), 0x76);
/// ```
pub fn checksum(slave: u8, command: u8, length: u8, payload: &[u8]) -> u16 {
    let header = u16::from(START_BYTE)
        .wrapping_add(u16::from(slave))
        .wrapping_add(u16::from(command))
        .wrapping_add(u16::from(length))
        .wrapping_add(u16::from(END_BYTE));

    payload
        .iter()
        .take(usize::from(length))
        .fold(header, |sum, &byte| sum.wrapping_add(u16::from(byte)))
}
