mod error;
mod message;
mod packet;
mod reading;
mod sensor;

pub use error::{DecodeError, PayloadError};
pub use message::Message;
pub use packet::{MessageType, Packet};
pub use reading::{decode_reading, encode_reading, reading_payload_len};
pub use sensor::{CAPABILITY_BITMAP_LEN, decode_capabilities, encode_capabilities};

// frame structure : src(1) + dst(1) + type(1) + payload

/// Largest frame the radio delivers in one piece.
pub const MAX_FRAME_SIZE: usize = 256;
pub const HEADER_SIZE: usize = 3;
pub const MAX_PAYLOAD_SIZE: usize = MAX_FRAME_SIZE - HEADER_SIZE;
