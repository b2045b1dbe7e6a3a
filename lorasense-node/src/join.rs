use std::time::Duration;

use lorasense_core::protocol::{Message, MessageType, Packet};
use lorasense_core::{BASESTATION_ID, Capabilities, NodeId};
use lorasense_radio::{Link, Radio, TransportError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinPolicy {
    /// How long to wait for an acknowledgement after each request.
    pub ack_timeout: Duration,
    pub max_attempts: u32,
}

impl Default for JoinPolicy {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    #[error("no join acknowledgement after {attempts} attempts")]
    Exhausted { attempts: u32 },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("join cancelled")]
    Cancelled,
}

fn is_ack_for(node: NodeId) -> impl Fn(&Packet) -> bool {
    move |packet| {
        packet.is(MessageType::JoinAck, BASESTATION_ID, node) && packet.payload().is_empty()
    }
}

/// Announces `node` to the basestation until it is acknowledged.
///
/// Returns the attempt number that succeeded, starting from 1.
#[instrument(skip(link, policy, cancel))]
pub async fn join<R: Radio>(
    link: &mut Link<R>,
    node: NodeId,
    capabilities: Capabilities,
    policy: &JoinPolicy,
    cancel: &CancellationToken,
) -> Result<u32, JoinError> {
    let request = Message::JoinRequest { node, capabilities };

    for attempt in 1..=policy.max_attempts {
        info!(attempt, "sending join request");
        link.send_message(&request).await?;

        let deadline = Instant::now() + policy.ack_timeout;
        let acked = tokio::select! {
            _ = cancel.cancelled() => return Err(JoinError::Cancelled),
            received = link.recv_until(deadline, is_ack_for(node)) => received?,
        };

        if acked.is_some() {
            info!(attempt, "joined");
            return Ok(attempt);
        }

        warn!(attempt, "no join acknowledgement");
    }

    Err(JoinError::Exhausted {
        attempts: policy.max_attempts,
    })
}
