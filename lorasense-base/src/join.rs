use std::time::Duration;

use lorasense_core::BASESTATION_ID;
use lorasense_core::protocol::{Message, MessageType, Packet, PayloadError};
use lorasense_radio::{Link, Radio, TransportError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::registry::{NodeRegistry, RegistryError};

#[derive(Debug, thiserror::Error)]
pub enum JoinRejection {
    #[error("not a join request addressed to the basestation")]
    NotAJoinRequest,
    #[error("malformed join request: {0}")]
    Malformed(#[from] PayloadError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

fn is_join_request(packet: &Packet) -> bool {
    packet.message_type() == MessageType::JoinRequest && packet.dest() == BASESTATION_ID
}

/// Validates a join request and registers its sender.
///
/// Returns the acknowledgement to send back. Nothing is registered when the
/// request is rejected.
pub async fn admit(registry: &NodeRegistry, packet: &Packet) -> Result<Message, JoinRejection> {
    if !is_join_request(packet) {
        return Err(JoinRejection::NotAJoinRequest);
    }

    let Message::JoinRequest { node, capabilities } = Message::from_packet(packet)? else {
        return Err(JoinRejection::NotAJoinRequest);
    };

    registry.register(node, capabilities).await?;

    Ok(Message::JoinAck { node })
}

/// Accepts join requests until `window` has elapsed.
///
/// Returns how many nodes were admitted. Frames other than join requests are
/// ignored, as are join requests once the window has closed.
#[instrument(skip_all, fields(window_secs = window.as_secs()))]
pub async fn run_discovery<R: Radio>(
    link: &mut Link<R>,
    registry: &NodeRegistry,
    window: Duration,
    cancel: &CancellationToken,
) -> Result<usize, TransportError> {
    let deadline = Instant::now() + window;
    let mut admitted = 0;

    info!("discovery window open");

    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            received = link.recv_until(deadline, is_join_request) => received?,
        };

        let Some(packet) = received else {
            break;
        };

        match admit(registry, &packet).await {
            Ok(ack) => {
                link.send_message(&ack).await?;
                admitted += 1;
                info!(node = ack.node(), "node admitted");
            }
            Err(e) => warn!(src = packet.source(), error = %e, "join rejected"),
        }
    }

    info!(admitted, "discovery window closed");
    Ok(admitted)
}
