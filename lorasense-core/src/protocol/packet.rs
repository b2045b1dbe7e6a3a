use super::{DecodeError, HEADER_SIZE, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE, PayloadError};
use crate::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    JoinRequest = 0x00,
    JoinAck = 0x01,
    SensorResponse = 0x02,
    SensorRequest = 0x03,
}

impl TryFrom<u8> for MessageType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(MessageType::JoinRequest),
            0x01 => Ok(MessageType::JoinAck),
            0x02 => Ok(MessageType::SensorResponse),
            0x03 => Ok(MessageType::SensorRequest),
            _ => Err(DecodeError::UnknownMessageType(value)),
        }
    }
}

/// One frame on the air.
///
/// The payload is opaque at this level: its length is whatever the frame
/// carried after the header. Use [`super::Message`] for payload validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    source: NodeId,
    dest: NodeId,
    message_type: MessageType,
    payload: Vec<u8>,
}

impl Packet {
    pub fn new(
        source: NodeId,
        dest: NodeId,
        message_type: MessageType,
        payload: impl Into<Vec<u8>>,
    ) -> Result<Self, PayloadError> {
        let payload = payload.into();

        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(PayloadError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        Ok(Self {
            source,
            dest,
            message_type,
            payload,
        })
    }

    // For payloads built by `Message`, which never approach the limit.
    pub(super) fn from_parts(
        source: NodeId,
        dest: NodeId,
        message_type: MessageType,
        payload: Vec<u8>,
    ) -> Self {
        debug_assert!(payload.len() <= MAX_PAYLOAD_SIZE);
        Self {
            source,
            dest,
            message_type,
            payload,
        }
    }

    pub fn source(&self) -> NodeId {
        self.source
    }

    pub fn dest(&self) -> NodeId {
        self.dest
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// True when this packet went from `source` to `dest` as a `message_type`.
    pub fn is(&self, message_type: MessageType, source: NodeId, dest: NodeId) -> bool {
        self.message_type == message_type && self.source == source && self.dest == dest
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE + self.payload.len());

        bytes.push(self.source);
        bytes.push(self.dest);
        bytes.push(self.message_type as u8);
        bytes.extend_from_slice(&self.payload);

        bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < HEADER_SIZE {
            return Err(DecodeError::TooShort { len: bytes.len() });
        }

        if bytes.len() > MAX_FRAME_SIZE {
            return Err(DecodeError::FrameTooLarge { len: bytes.len() });
        }

        Ok(Self {
            source: bytes[0],
            dest: bytes[1],
            message_type: MessageType::try_from(bytes[2])?,
            payload: bytes[HEADER_SIZE..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_TYPES: [MessageType; 4] = [
        MessageType::JoinRequest,
        MessageType::JoinAck,
        MessageType::SensorResponse,
        MessageType::SensorRequest,
    ];

    #[test]
    fn round_trips_boundary_payloads() {
        for message_type in ALL_TYPES {
            for len in [0, 1, MAX_PAYLOAD_SIZE] {
                let payload: Vec<u8> = (0..len).map(|i| i as u8).collect();
                let packet = Packet::new(7, 0, message_type, payload).unwrap();

                let bytes = packet.encode();
                assert_eq!(bytes.len(), HEADER_SIZE + len);
                assert_eq!(Packet::decode(&bytes), Ok(packet));
            }
        }
    }

    #[test]
    fn header_layout_is_src_dst_type() {
        let packet = Packet::new(0, 1, MessageType::JoinAck, []).unwrap();
        assert_eq!(packet.encode(), vec![0, 1, 1]);
    }

    #[test]
    fn short_frames_are_rejected() {
        for len in 0..HEADER_SIZE {
            let bytes = vec![0u8; len];
            assert_eq!(Packet::decode(&bytes), Err(DecodeError::TooShort { len }));
        }
    }

    #[test]
    fn unknown_message_types_are_rejected() {
        for value in 4..=u8::MAX {
            assert_eq!(
                Packet::decode(&[1, 0, value, 9, 9]),
                Err(DecodeError::UnknownMessageType(value))
            );
        }
    }

    #[test]
    fn oversized_payloads_are_refused() {
        let err = Packet::new(1, 0, MessageType::SensorResponse, vec![0; MAX_PAYLOAD_SIZE + 1])
            .unwrap_err();
        assert_eq!(
            err,
            PayloadError::PayloadTooLarge {
                size: MAX_PAYLOAD_SIZE + 1,
                max: MAX_PAYLOAD_SIZE,
            }
        );

        let frame = vec![0u8; MAX_FRAME_SIZE + 1];
        assert_eq!(
            Packet::decode(&frame),
            Err(DecodeError::FrameTooLarge {
                len: MAX_FRAME_SIZE + 1
            })
        );
    }
}
