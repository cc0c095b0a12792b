//! LoRa Home wire frame.
//!
//! ```text
//! offset  field          width
//! 0       emitter_id     1
//! 1       recipient_id   1
//! 2       message_type   1
//! 3       network_id     2  (little-endian)
//! 5       counter        2  (little-endian)
//! 7       payload_len    1
//! 8       payload        payload_len
//! 8+len   crc16          2  (little-endian, over every preceding byte)
//! ```
use super::checksum::crc16_ccitt;
use crate::NodeId;

/// Trait to calculate size on frame for every component on frame.
pub trait FrameSize {
    /// Calculate component size on frame (meaning encoded) in bytes.
    fn size(&self) -> usize;
}

pub const FRAME_HEADER_SIZE: usize = 8;
/// Only the CRC for now. The reserved room for an IV/MAC is not on the wire.
pub const FRAME_FOOTER_SIZE: usize = 2;
pub const MAX_PAYLOAD_SIZE: usize = 128;
pub const MIN_FRAME_SIZE: usize = FRAME_HEADER_SIZE + FRAME_FOOTER_SIZE;
pub const ACK_FRAME_SIZE: usize = FRAME_HEADER_SIZE + FRAME_FOOTER_SIZE;
pub const MAX_FRAME_SIZE: usize = FRAME_HEADER_SIZE + FRAME_FOOTER_SIZE + MAX_PAYLOAD_SIZE;

const INDEX_EMITTER: usize = 0;
const INDEX_RECIPIENT: usize = 1;
const INDEX_MESSAGE_TYPE: usize = 2;
const INDEX_NETWORK_ID: usize = 3;
const INDEX_COUNTER: usize = 5;
const INDEX_PAYLOAD_SIZE: usize = 7;
const INDEX_PAYLOAD: usize = 8;

pub const GATEWAY_NODE_ID: NodeId = 0x00;
/// Reserved, but never treated specially by the receive filter.
pub const BROADCAST_NODE_ID: NodeId = 0xFF;

/// Kind of a frame, carried in the third header byte.
///
/// Value `5` is unassigned and rejected on decode.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum MessageType {
    NodeMsgNoAck = 0,
    NodeMsgAckReq = 1,
    GwMsgNoAck = 2,
    GwMsgAck = 3,
    NodeAck = 4,
    GwAck = 6,
}

impl MessageType {
    /// Whether the emitter of such a frame waits for an acknowledgment.
    pub fn requests_ack(&self) -> bool {
        matches!(self, MessageType::NodeMsgAckReq | MessageType::GwMsgAck)
    }

    pub fn is_ack(&self) -> bool {
        matches!(self, MessageType::NodeAck | MessageType::GwAck)
    }
}

impl TryFrom<u8> for MessageType {
    type Error = FrameError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(MessageType::NodeMsgNoAck),
            1 => Ok(MessageType::NodeMsgAckReq),
            2 => Ok(MessageType::GwMsgNoAck),
            3 => Ok(MessageType::GwMsgAck),
            4 => Ok(MessageType::NodeAck),
            6 => Ok(MessageType::GwAck),
            n => Err(FrameError::UnknownMessageType(n)),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(mt: MessageType) -> u8 {
        mt as u8
    }
}

/// One complete protocol message. The checksum only exists in the encoded form.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Frame {
    pub network_id: u16,
    pub emitter_id: NodeId,
    pub recipient_id: NodeId,
    pub message_type: MessageType,
    /// Emitter sequence number, used to correlate acknowledgments.
    pub counter: u16,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Builds a frame without payload.
    pub fn new(
        network_id: u16,
        emitter_id: NodeId,
        recipient_id: NodeId,
        message_type: MessageType,
        counter: u16,
    ) -> Self {
        Frame {
            network_id,
            emitter_id,
            recipient_id,
            message_type,
            counter,
            payload: Vec::new(),
        }
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Acknowledgment frame for message `counter` of `recipient_id`.
    pub fn ack(
        network_id: u16,
        emitter_id: NodeId,
        recipient_id: NodeId,
        message_type: MessageType,
        counter: u16,
    ) -> Self {
        debug_assert!(message_type.is_ack());
        Frame::new(network_id, emitter_id, recipient_id, message_type, counter)
    }

    /// True if this frame is the gateway acknowledgment of message `counter` sent by `node_id`.
    pub fn acknowledges(&self, node_id: NodeId, counter: u16) -> bool {
        self.emitter_id == GATEWAY_NODE_ID
            && self.recipient_id == node_id
            && self.message_type == MessageType::GwAck
            && self.counter == counter
    }

    /// Encodes the frame, checksum included.
    ///
    /// Unlike the firmware nodes, which silently truncate, an oversized payload is refused.
    pub fn to_bytes(&self) -> Result<Vec<u8>, FrameError> {
        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(FrameError::PayloadTooLarge {
                size: self.payload.len(),
            });
        }
        let mut bytes = Vec::with_capacity(self.size());
        bytes.push(self.emitter_id);
        bytes.push(self.recipient_id);
        bytes.push(self.message_type.into());
        bytes.extend_from_slice(&self.network_id.to_le_bytes());
        bytes.extend_from_slice(&self.counter.to_le_bytes());
        bytes.push(self.payload.len() as u8);
        bytes.extend_from_slice(&self.payload);
        let crc = crc16_ccitt(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());
        Ok(bytes)
    }

    /// Decodes a frame.
    ///
    /// With `check_crc`, the length must lie in `[MIN_FRAME_SIZE, MAX_FRAME_SIZE]` and the trailing
    /// two bytes must match the checksum of everything before them. Decoding never reads past
    /// `bytes`.
    pub fn try_from_bytes(bytes: &[u8], check_crc: bool) -> Result<Self, FrameError> {
        let body_len = if check_crc {
            verify_crc(bytes)?;
            bytes.len() - FRAME_FOOTER_SIZE
        } else {
            if bytes.len() < FRAME_HEADER_SIZE {
                return Err(FrameError::FrameTooSmall { size: bytes.len() });
            }
            bytes.len()
        };

        let payload_len = bytes[INDEX_PAYLOAD_SIZE] as usize;
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(FrameError::PayloadTooLarge { size: payload_len });
        }
        if INDEX_PAYLOAD + payload_len > body_len {
            return Err(FrameError::Truncated {
                declared: payload_len,
                available: body_len - INDEX_PAYLOAD,
            });
        }
        let message_type = MessageType::try_from(bytes[INDEX_MESSAGE_TYPE])?;

        let mut network_raw = [0u8; 2];
        network_raw.copy_from_slice(&bytes[INDEX_NETWORK_ID..INDEX_NETWORK_ID + 2]);
        let mut counter_raw = [0u8; 2];
        counter_raw.copy_from_slice(&bytes[INDEX_COUNTER..INDEX_COUNTER + 2]);

        Ok(Frame {
            network_id: u16::from_le_bytes(network_raw),
            emitter_id: bytes[INDEX_EMITTER],
            recipient_id: bytes[INDEX_RECIPIENT],
            message_type,
            counter: u16::from_le_bytes(counter_raw),
            payload: bytes[INDEX_PAYLOAD..INDEX_PAYLOAD + payload_len].to_vec(),
        })
    }
}

/// Checks size bounds and the trailing checksum of a raw frame.
pub fn verify_crc(bytes: &[u8]) -> Result<(), FrameError> {
    if bytes.len() < MIN_FRAME_SIZE {
        return Err(FrameError::FrameTooSmall { size: bytes.len() });
    }
    if bytes.len() > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge { size: bytes.len() });
    }
    let (body, footer) = bytes.split_at(bytes.len() - FRAME_FOOTER_SIZE);
    let expected = u16::from_le_bytes([footer[0], footer[1]]);
    let computed = crc16_ccitt(body);
    if expected != computed {
        return Err(FrameError::ChecksumMismatch { expected, computed });
    }
    Ok(())
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame is too small (is: {}B, min: {}B)!", .size, MIN_FRAME_SIZE)]
    FrameTooSmall { size: usize },

    #[error("Frame is too big (is: {}B, max: {}B)!", .size, MAX_FRAME_SIZE)]
    FrameTooLarge { size: usize },

    #[error("Checksum mismatch (carried: {:#06x}, computed: {:#06x}).", .expected, .computed)]
    ChecksumMismatch { expected: u16, computed: u16 },

    #[error("Payload is too big (is: {}B, max: {}B)!", .size, MAX_PAYLOAD_SIZE)]
    PayloadTooLarge { size: usize },

    #[error("Declared payload of {}B but only {}B available.", .declared, .available)]
    Truncated { declared: usize, available: usize },

    #[error("Unknown message type {}.", .0)]
    UnknownMessageType(u8),
}

impl FrameSize for Frame {
    fn size(&self) -> usize {
        FRAME_HEADER_SIZE + self.payload.len() + FRAME_FOOTER_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_a() -> Frame {
        Frame::new(0xACDC, 30, GATEWAY_NODE_ID, MessageType::NodeMsgAckReq, 7)
            .with_payload(&b"{\"tx\":5}"[..])
    }

    #[test]
    fn layout_is_little_endian_with_fixed_offsets() {
        let bytes = scenario_a().to_bytes().unwrap();
        assert_eq!(bytes.len(), 18);
        assert_eq!(&bytes[..8], &[30, 0, 1, 0xDC, 0xAC, 7, 0, 8]);
        assert_eq!(&bytes[8..16], b"{\"tx\":5}");
        let crc = crc16_ccitt(&bytes[..16]);
        assert_eq!(&bytes[16..], &crc.to_le_bytes());
    }

    #[test]
    fn scenario_a_round_trip() {
        let frame = scenario_a();
        let bytes = frame.to_bytes().unwrap();
        assert_eq!(frame.size(), bytes.len());
        assert_eq!(Frame::try_from_bytes(&bytes, true).unwrap(), frame);
    }

    #[test]
    fn round_trip_every_payload_length_and_type() {
        let types = [
            MessageType::NodeMsgNoAck,
            MessageType::NodeMsgAckReq,
            MessageType::GwMsgNoAck,
            MessageType::GwMsgAck,
            MessageType::NodeAck,
            MessageType::GwAck,
        ];
        for len in 0..=MAX_PAYLOAD_SIZE {
            let mt = types[len % types.len()];
            let frame = Frame::new(0x1234, 3, 200, mt, (len as u16).wrapping_mul(517))
                .with_payload((0..len).map(|i| i as u8).collect::<Vec<u8>>());
            let bytes = frame.to_bytes().unwrap();
            assert_eq!(bytes.len(), MIN_FRAME_SIZE + len);
            assert_eq!(Frame::try_from_bytes(&bytes, true).unwrap(), frame);
        }
    }

    #[test]
    fn encode_refuses_oversized_payload() {
        let frame = scenario_a().with_payload(vec![b'a'; MAX_PAYLOAD_SIZE + 1]);
        assert_eq!(
            frame.to_bytes(),
            Err(FrameError::PayloadTooLarge { size: MAX_PAYLOAD_SIZE + 1 })
        );
    }

    #[test]
    fn nine_bytes_is_too_small() {
        let bytes = scenario_a().to_bytes().unwrap();
        assert_eq!(
            Frame::try_from_bytes(&bytes[..9], true),
            Err(FrameError::FrameTooSmall { size: 9 })
        );
    }

    #[test]
    fn over_max_is_too_large() {
        let bytes = vec![0u8; MAX_FRAME_SIZE + 1];
        assert_eq!(
            Frame::try_from_bytes(&bytes, true),
            Err(FrameError::FrameTooLarge { size: MAX_FRAME_SIZE + 1 })
        );
    }

    #[test]
    fn any_single_bit_flip_is_detected() {
        let bytes = scenario_a().to_bytes().unwrap();
        for byte in 0..bytes.len() - FRAME_FOOTER_SIZE {
            for bit in 0..8 {
                let mut corrupted = bytes.clone();
                corrupted[byte] ^= 1 << bit;
                assert!(
                    matches!(
                        Frame::try_from_bytes(&corrupted, true),
                        Err(FrameError::ChecksumMismatch { .. })
                    ),
                    "flip of bit {} in byte {} went unnoticed",
                    bit,
                    byte
                );
            }
        }
    }

    #[test]
    fn declared_payload_over_max_is_rejected() {
        let mut bytes = vec![30, 0, 1, 0xDC, 0xAC, 7, 0, 129];
        bytes.extend_from_slice(&[b'x'; 129]);
        let crc = crc16_ccitt(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());
        assert_eq!(bytes.len(), MAX_FRAME_SIZE + 1);
        // Too long for a checked decode, so exercise the declared length on its own.
        assert_eq!(
            Frame::try_from_bytes(&bytes, false),
            Err(FrameError::PayloadTooLarge { size: 129 })
        );

        let mut short = vec![30, 0, 1, 0xDC, 0xAC, 7, 0, 200];
        let crc = crc16_ccitt(&short);
        short.extend_from_slice(&crc.to_le_bytes());
        assert_eq!(
            Frame::try_from_bytes(&short, true),
            Err(FrameError::PayloadTooLarge { size: 200 })
        );
    }

    #[test]
    fn declared_payload_past_input_is_truncated() {
        let mut bytes = vec![30, 0, 1, 0xDC, 0xAC, 7, 0, 4, b'a', b'b'];
        assert_eq!(
            Frame::try_from_bytes(&bytes, false),
            Err(FrameError::Truncated { declared: 4, available: 2 })
        );
        let crc = crc16_ccitt(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());
        assert_eq!(
            Frame::try_from_bytes(&bytes, true),
            Err(FrameError::Truncated { declared: 4, available: 2 })
        );
    }

    #[test]
    fn unchecked_decode_ignores_checksum() {
        let mut bytes = scenario_a().to_bytes().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(Frame::try_from_bytes(&bytes, true).is_err());
        assert_eq!(Frame::try_from_bytes(&bytes, false).unwrap(), scenario_a());
        assert_eq!(
            Frame::try_from_bytes(&bytes[..7], false),
            Err(FrameError::FrameTooSmall { size: 7 })
        );
    }

    #[test]
    fn reserved_message_type_is_rejected() {
        let mut bytes = vec![0, 30, 5, 0xDC, 0xAC, 7, 0, 0];
        let crc = crc16_ccitt(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());
        assert_eq!(
            Frame::try_from_bytes(&bytes, true),
            Err(FrameError::UnknownMessageType(5))
        );
    }

    #[test]
    fn ack_matching() {
        let ack = Frame::ack(0xACDC, GATEWAY_NODE_ID, 30, MessageType::GwAck, 4);
        assert_eq!(ack.to_bytes().unwrap().len(), ACK_FRAME_SIZE);
        assert!(ack.acknowledges(30, 4));
        assert!(!ack.acknowledges(30, 5));
        assert!(!ack.acknowledges(31, 4));

        let mut foreign = ack.clone();
        foreign.emitter_id = 12;
        assert!(!foreign.acknowledges(30, 4));

        let node_ack = Frame::ack(0xACDC, GATEWAY_NODE_ID, 30, MessageType::NodeAck, 4);
        assert!(!node_ack.acknowledges(30, 4));
    }

    #[test]
    fn ack_requests() {
        assert!(MessageType::NodeMsgAckReq.requests_ack());
        assert!(MessageType::GwMsgAck.requests_ack());
        assert!(!MessageType::GwMsgNoAck.requests_ack());
        assert!(!MessageType::NodeMsgNoAck.requests_ack());
        assert!(!MessageType::GwAck.requests_ack());
    }
}
