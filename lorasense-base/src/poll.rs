use std::time::Duration;

use lorasense_core::protocol::{Message, MessageType, PayloadError};
use lorasense_core::{BASESTATION_ID, NodeId, SensorKind, SensorReading};
use lorasense_radio::{Link, Radio, TransportError};
use lorasense_store::StoredReading;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::registry::NodeRegistry;
use crate::state::BaseState;

/// Result of one request/response exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Reading(SensorReading),
    /// No matching response before the deadline.
    Timeout,
    /// A response for this request arrived but failed validation.
    Malformed(PayloadError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub responses: usize,
    pub timeouts: usize,
    pub malformed: usize,
}

impl CycleReport {
    fn add(&mut self, outcome: &PollOutcome) {
        match outcome {
            PollOutcome::Reading(_) => self.responses += 1,
            PollOutcome::Timeout => self.timeouts += 1,
            PollOutcome::Malformed(_) => self.malformed += 1,
        }
    }
}

/// Drives the data collection sweep over every registered node.
pub struct Poller {
    registry: NodeRegistry,
    state: BaseState,
    response_timeout: Duration,
    sink: Option<mpsc::Sender<StoredReading>>,
}

impl Poller {
    pub fn new(registry: NodeRegistry, state: BaseState, response_timeout: Duration) -> Self {
        Self {
            registry,
            state,
            response_timeout,
            sink: None,
        }
    }

    /// Every reading received is also forwarded to `sink`.
    pub fn with_sink(mut self, sink: mpsc::Sender<StoredReading>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Requests one reading of `kind` from `node`.
    ///
    /// Returns within the response timeout whatever the node does. Frames
    /// that are not this node's response for this kind are discarded.
    #[instrument(skip(self, link), fields(%kind))]
    pub async fn poll<R: Radio>(
        &self,
        link: &mut Link<R>,
        node: NodeId,
        kind: SensorKind,
    ) -> Result<PollOutcome, TransportError> {
        link.send_message(&Message::SensorRequest { node, kind })
            .await?;

        let deadline = Instant::now() + self.response_timeout;
        let response = link
            .recv_until(deadline, |packet| {
                packet.is(MessageType::SensorResponse, node, BASESTATION_ID)
                    && packet.payload().first() == Some(&(kind as u8))
            })
            .await?;

        let Some(packet) = response else {
            warn!("no response before timeout");
            self.state.record_timeout(node).await;
            return Ok(PollOutcome::Timeout);
        };

        let reading = match Message::from_packet(&packet) {
            Ok(Message::SensorResponse {
                value, position, ..
            }) => SensorReading {
                value,
                position,
                observed_at: jiff::Timestamp::now(),
            },
            Ok(other) => {
                debug!(?other, "unexpected message");
                self.state.record_malformed(node).await;
                return Ok(PollOutcome::Malformed(PayloadError::UnexpectedMessageType {
                    expected: MessageType::SensorResponse,
                    actual: other.message_type(),
                }));
            }
            Err(e) => {
                warn!(error = %e, "malformed response");
                self.state.record_malformed(node).await;
                return Ok(PollOutcome::Malformed(e));
            }
        };

        match reading.position {
            Some(fix) => info!(value = %reading.value, position = %fix, "reading received"),
            None => info!(value = %reading.value, "reading received without position"),
        }

        self.registry.touch(node).await;
        self.state.record_reading(node, reading).await;

        if let Some(sink) = &self.sink {
            if sink.send(StoredReading { node, reading }).await.is_err() {
                warn!("reading sink closed");
            }
        }

        Ok(PollOutcome::Reading(reading))
    }

    /// One sweep: every kind in fixed order, every capable node in ascending
    /// id order, one attempt each.
    pub async fn run_cycle<R: Radio>(
        &self,
        link: &mut Link<R>,
        cancel: &CancellationToken,
    ) -> Result<CycleReport, TransportError> {
        let mut report = CycleReport::default();

        for kind in SensorKind::ALL {
            for node in self.registry.capable_of(kind).await {
                let outcome = tokio::select! {
                    _ = cancel.cancelled() => return Ok(report),
                    outcome = self.poll(link, node, kind) => outcome?,
                };
                report.add(&outcome);
            }
        }

        self.state.cycle_completed().await;
        Ok(report)
    }

    /// Repeats poll cycles with `pause` between them until cancelled.
    pub async fn run<R: Radio>(
        &self,
        link: &mut Link<R>,
        pause: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), TransportError> {
        let mut cycle = 0u64;

        loop {
            let report = self.run_cycle(link, cancel).await?;

            if cancel.is_cancelled() {
                info!("poller shutting down");
                return Ok(());
            }

            cycle += 1;
            info!(
                cycle,
                responses = report.responses,
                timeouts = report.timeouts,
                malformed = report.malformed,
                "poll cycle complete"
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("poller shutting down");
                    return Ok(());
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }
}
