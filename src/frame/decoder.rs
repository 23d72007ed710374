//! # Frame Decoder
//!
//! Validation of received frame fields, shared by the streaming receiver and
//! by [`decode_frame`] for complete frames held in memory.

use super::checksum::checksum;
use super::protocol::*;
use crate::error::{Result, Rs485Error};

/// Reason a candidate frame was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFault {
    /// Terminating byte was not 0x0D
    BadEndByte(u8),

    /// Command id above 31
    InvalidCommand(u8),

    /// Received checksum differs from the computed one
    ChecksumMismatch { expected: u16, received: u16 },

    /// Payload longer than the length field can carry
    PayloadTooLong(usize),
}

impl std::fmt::Display for FrameFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameFault::BadEndByte(byte) => write!(f, "invalid end byte: 0x{:02X}", byte),
            FrameFault::InvalidCommand(command) => write!(f, "invalid command id: {}", command),
            FrameFault::ChecksumMismatch { expected, received } => write!(
                f,
                "checksum mismatch: expected 0x{:04X}, got 0x{:04X}",
                expected, received
            ),
            FrameFault::PayloadTooLong(length) => {
                write!(f, "payload of {} bytes exceeds {}", length, MAX_PAYLOAD_SIZE)
            }
        }
    }
}

/// Raw fields of a frame as read off the wire
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    pub(crate) slave: u8,
    pub(crate) command: u8,
    pub(crate) payload: &'a [u8],
    pub(crate) checksum: u16,
    pub(crate) end: u8,
}

impl RawFrame<'_> {
    /// Check delimiter, payload size, checksum and command range
    ///
    /// Address filtering is left to the caller since it depends on the node.
    pub fn validate(&self) -> std::result::Result<(), FrameFault> {
        if self.end != END_BYTE {
            return Err(FrameFault::BadEndByte(self.end));
        }

        let length = u8::try_from(self.payload.len())
            .map_err(|_| FrameFault::PayloadTooLong(self.payload.len()))?;

        let expected = checksum(self.slave, self.command, length, self.payload);
        if expected != self.checksum {
            return Err(FrameFault::ChecksumMismatch {
                expected,
                received: self.checksum,
            });
        }

        if self.command > MAX_COMMAND {
            return Err(FrameFault::InvalidCommand(self.command));
        }

        Ok(())
    }

    /// Validate and copy into an owned packet
    pub fn into_packet(self) -> std::result::Result<Packet, FrameFault> {
        self.validate()?;
        Ok(Packet {
            source_address: self.slave,
            command: self.command,
            payload: self.payload.to_vec(),
        })
    }
}

/// Decode a complete frame
///
/// # Arguments
///
/// * `frame` - Exactly one frame (start byte through end byte)
///
/// # Returns
///
/// * `Result<Packet>` - Decoded packet, or error if invalid
///
/// # Errors
///
/// Returns error if:
/// - Frame is too short or its size disagrees with the length field
/// - Start or end byte is incorrect
/// - Checksum check fails
/// - Command id is above 31
pub fn decode_frame(frame: &[u8]) -> Result<Packet> {
    if frame.len() < FRAME_OVERHEAD {
        return Err(Rs485Error::Protocol("Frame too short".to_string()));
    }

    if frame[0] != START_BYTE {
        return Err(Rs485Error::Protocol(format!(
            "Invalid start byte: 0x{:02X}",
            frame[0]
        )));
    }

    let length = usize::from(frame[3]);
    if frame.len() != FRAME_OVERHEAD + length {
        return Err(Rs485Error::Protocol(format!(
            "Frame size mismatch: expected {} bytes, got {}",
            FRAME_OVERHEAD + length,
            frame.len()
        )));
    }

    let raw = RawFrame {
        slave: frame[1],
        command: frame[2],
        payload: &frame[4..4 + length],
        checksum: u16::from_be_bytes([frame[4 + length], frame[5 + length]]),
        end: frame[6 + length],
    };

    raw.into_packet()
        .map_err(|fault| Rs485Error::Protocol(fault.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encoder::encode_frame;
    use proptest::prelude::*;

    #[test]
    fn test_decode_known_frame() {
        let frame = [0x3A, 0x03, 0x01, 0x01, 0x2A, 0x00, 0x76, 0x0D];
        let packet = decode_frame(&frame).unwrap();

        assert_eq!(packet.source_address, 3);
        assert_eq!(packet.command, 1);
        assert_eq!(packet.payload, vec![0x2A]);
    }

    #[test]
    fn test_decode_frame_too_short() {
        let result = decode_frame(&[START_BYTE, 0x01, 0x01]);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_frame_invalid_start() {
        let mut frame = encode_frame(3, 1, &[0x2A]).unwrap().to_vec();
        frame[0] = 0x3B;
        assert!(decode_frame(&frame).is_err());
    }

    #[test]
    fn test_decode_frame_bad_end_byte() {
        let mut frame = encode_frame(3, 1, &[0x2A]).unwrap().to_vec();
        let last = frame.len() - 1;
        frame[last] = 0x0E;

        match decode_frame(&frame) {
            Err(Rs485Error::Protocol(msg)) => assert!(msg.contains("end byte")),
            other => panic!("Expected protocol error, got: {:?}", other),
        }
    }

    #[test]
    fn test_decode_frame_size_mismatch() {
        let mut frame = encode_frame(3, 1, &[1, 2, 3]).unwrap().to_vec();
        frame.push(0x00);
        assert!(decode_frame(&frame).is_err());
    }

    #[test]
    fn test_decode_frame_checksum_error() {
        let mut frame = encode_frame(3, 1, &[1, 2, 3]).unwrap().to_vec();
        frame[5] ^= 0x01;

        match decode_frame(&frame) {
            Err(Rs485Error::Protocol(msg)) => assert!(msg.contains("checksum mismatch")),
            other => panic!("Expected protocol error, got: {:?}", other),
        }
    }

    #[test]
    fn test_raw_frame_rejects_command_out_of_range() {
        let payload = [0u8; 2];
        let raw = RawFrame {
            slave: 1,
            command: 40,
            payload: &payload,
            checksum: checksum(1, 40, 2, &payload),
            end: END_BYTE,
        };
        assert_eq!(raw.validate(), Err(FrameFault::InvalidCommand(40)));
    }

    #[test]
    fn test_raw_frame_rejects_oversized_payload() {
        let payload = [0u8; 256];
        let raw = RawFrame {
            slave: 1,
            command: 1,
            payload: &payload,
            // what a truncated length byte would have summed to
            checksum: checksum(1, 1, 0, &payload),
            end: END_BYTE,
        };
        assert_eq!(raw.validate(), Err(FrameFault::PayloadTooLong(256)));
        assert_eq!(raw.into_packet(), Err(FrameFault::PayloadTooLong(256)));
    }

    #[test]
    fn test_frame_fault_display() {
        let fault = FrameFault::ChecksumMismatch {
            expected: 0x0076,
            received: 0x0077,
        };
        assert_eq!(
            fault.to_string(),
            "checksum mismatch: expected 0x0076, got 0x0077"
        );
    }

    proptest! {
        #[test]
        fn prop_decode_recovers_encoded_fields(
            slave in any::<u8>(),
            command in 0u8..=MAX_COMMAND,
            payload in proptest::collection::vec(any::<u8>(), 0..=MAX_PAYLOAD_SIZE),
        ) {
            let frame = encode_frame(slave, command, &payload).unwrap();
            let packet = decode_frame(&frame).unwrap();

            prop_assert_eq!(packet.source_address, slave);
            prop_assert_eq!(packet.command, command);
            prop_assert_eq!(packet.payload, payload);
        }

        #[test]
        fn prop_single_byte_corruption_is_rejected(
            slave in any::<u8>(),
            command in 0u8..=MAX_COMMAND,
            payload in proptest::collection::vec(any::<u8>(), 0..64),
            position in any::<prop::sample::Index>(),
            flip in 1u8..=255,
        ) {
            let mut frame = encode_frame(slave, command, &payload).unwrap().to_vec();
            // Corrupt one of slave, cmd, length or payload
            let index = 1 + position.index(3 + payload.len());
            frame[index] ^= flip;

            prop_assert!(decode_frame(&frame).is_err());
        }
    }
}
