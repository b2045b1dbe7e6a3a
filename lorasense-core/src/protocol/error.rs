use super::{HEADER_SIZE, MAX_FRAME_SIZE, MessageType};

/// A frame that cannot be read as a packet at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("frame of {len} bytes is shorter than the {} byte header", HEADER_SIZE)]
    TooShort { len: usize },
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),
    #[error("frame of {len} bytes exceeds the {} byte MTU", MAX_FRAME_SIZE)]
    FrameTooLarge { len: usize },
}

/// A packet whose payload does not match what its message type requires.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("payload of {size} bytes exceeds maximum of {max}")]
    PayloadTooLarge { size: usize, max: usize },
    #[error("{message_type:?} payload must be {expected} bytes, got {actual}")]
    InvalidLength {
        message_type: MessageType,
        expected: usize,
        actual: usize,
    },
    #[error("unknown sensor kind {0}")]
    InvalidSensorKind(u8),
    #[error("capability flag {index} must be 0 or 1, got {value}")]
    InvalidCapabilityFlag { index: usize, value: u8 },
    #[error("byte {0} is not a decimal digit")]
    InvalidDigit(u8),
    #[error("hundredths byte {0} is out of range")]
    InvalidFraction(u8),
    #[error("coordinate bytes {0:?} are out of range")]
    InvalidCoordinate([u8; 4]),
    #[error("expected a {expected:?} packet, got {actual:?}")]
    UnexpectedMessageType {
        expected: MessageType,
        actual: MessageType,
    },
}
