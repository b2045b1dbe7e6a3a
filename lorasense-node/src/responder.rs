use std::sync::Arc;

use lorasense_core::protocol::{Message, MessageType, Packet, PayloadError};
use lorasense_core::{BASESTATION_ID, Capabilities, NodeId, SensorKind};
use lorasense_radio::{Link, Radio, TransportError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::cache::ReadingCache;
use crate::gps::GpsSource;

/// Why a request got no reply.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Dropped {
    #[error("not a sensor request for this node")]
    NotForUs,
    #[error("malformed request: {0}")]
    Malformed(PayloadError),
    #[error("{0} was not announced at join")]
    CapabilityMismatch(SensorKind),
    #[error("no {0} reading yet")]
    SensorUnavailable(SensorKind),
    #[error("no position for the {0} reading")]
    PositionUnavailable(SensorKind),
}

/// Answers the basestation's sensor requests from the reading cache.
pub struct Responder {
    node: NodeId,
    capabilities: Capabilities,
    cache: ReadingCache,
    gps: Option<Arc<dyn GpsSource>>,
}

impl Responder {
    /// `gps` is `None` for nodes without a position source; their responses
    /// carry the no-fix encoding. Nodes with a source never answer without a
    /// position.
    pub fn new(
        node: NodeId,
        capabilities: Capabilities,
        cache: ReadingCache,
        gps: Option<Arc<dyn GpsSource>>,
    ) -> Self {
        Self {
            node,
            capabilities,
            cache,
            gps,
        }
    }

    pub fn respond(&self, packet: &Packet) -> Result<Message, Dropped> {
        if !packet.is(MessageType::SensorRequest, BASESTATION_ID, self.node) {
            return Err(Dropped::NotForUs);
        }

        let Message::SensorRequest { kind, .. } =
            Message::from_packet(packet).map_err(Dropped::Malformed)?
        else {
            return Err(Dropped::NotForUs);
        };

        if !self.capabilities.contains(kind) {
            return Err(Dropped::CapabilityMismatch(kind));
        }

        let mut reading = self
            .cache
            .latest(kind)
            .ok_or(Dropped::SensorUnavailable(kind))?;

        if let Some(gps) = &self.gps {
            reading.position = reading.position.or_else(|| gps.current_fix());
            if reading.position.is_none() {
                return Err(Dropped::PositionUnavailable(kind));
            }
        }

        Ok(Message::response(self.node, &reading))
    }
}

/// Replies to sensor requests until cancelled or the radio fails.
#[instrument(skip_all, fields(node = responder.node))]
pub async fn serve<R: Radio>(
    link: &mut Link<R>,
    responder: &Responder,
    cancel: &CancellationToken,
) -> Result<(), TransportError> {
    info!("serving sensor requests");

    loop {
        let packet = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            packet = link.recv() => packet?,
        };

        match responder.respond(&packet) {
            Ok(response) => {
                link.send_message(&response).await?;
                debug!(message_type = ?response.message_type(), "response sent");
            }
            Err(Dropped::NotForUs) => {}
            Err(reason) => info!(%reason, "request dropped"),
        }
    }
}
