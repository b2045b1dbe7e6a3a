mod ether;
pub use ether::*;
mod link;
pub use link::*;
mod udp;
pub use udp::*;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("radio i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("radio channel closed")]
    Closed,
    #[error("frame of {size} bytes exceeds the {max} byte MTU")]
    FrameTooLarge { size: usize, max: usize },
}

/// A half-duplex, frame-preserving radio.
///
/// One `send` puts exactly one frame on the air; one `receive` returns
/// exactly one frame heard from another station. Delivery is best effort.
#[async_trait]
pub trait Radio: Send + 'static {
    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Waits for the next frame. Must be cancel safe: dropping the future
    /// before it completes loses no frame that was not yet returned.
    async fn receive(&mut self) -> Result<Vec<u8>, TransportError>;
}
