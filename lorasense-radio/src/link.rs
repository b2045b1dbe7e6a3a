use std::time::Duration;

use lorasense_core::protocol::{Message, Packet};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::{Radio, TransportError};

/// Packet-level view of a [`Radio`].
///
/// Malformed frames never surface from a `Link`: they are logged and the
/// read continues. Every bounded receive gives up at its deadline and
/// returns `Ok(None)`.
pub struct Link<R> {
    radio: R,
}

impl<R: Radio> Link<R> {
    pub fn new(radio: R) -> Self {
        Self { radio }
    }

    pub async fn send(&mut self, packet: &Packet) -> Result<(), TransportError> {
        trace!(
            src = packet.source(),
            dst = packet.dest(),
            message_type = ?packet.message_type(),
            len = packet.payload().len(),
            "sending packet"
        );
        self.radio.send(&packet.encode()).await
    }

    pub async fn send_message(&mut self, message: &Message) -> Result<(), TransportError> {
        self.send(&message.to_packet()).await
    }

    /// Waits for the next well-formed packet.
    pub async fn recv(&mut self) -> Result<Packet, TransportError> {
        loop {
            let frame = self.radio.receive().await?;

            match Packet::decode(&frame) {
                Ok(packet) => return Ok(packet),
                Err(e) => debug!(error = %e, len = frame.len(), "discarding malformed frame"),
            }
        }
    }

    /// Waits up to `timeout` for any packet.
    pub async fn try_receive(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Packet>, TransportError> {
        self.recv_until(Instant::now() + timeout, |_| true).await
    }

    /// Waits until `deadline` for a packet accepted by `filter`, discarding
    /// every other packet heard in the meantime.
    pub async fn recv_until<F>(
        &mut self,
        deadline: Instant,
        mut filter: F,
    ) -> Result<Option<Packet>, TransportError>
    where
        F: FnMut(&Packet) -> bool,
    {
        loop {
            let packet = match tokio::time::timeout_at(deadline, self.recv()).await {
                Ok(received) => received?,
                Err(_) => return Ok(None),
            };

            if filter(&packet) {
                return Ok(Some(packet));
            }

            trace!(
                src = packet.source(),
                dst = packet.dest(),
                message_type = ?packet.message_type(),
                "discarding unrelated packet"
            );
        }
    }
}
