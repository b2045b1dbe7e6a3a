use std::sync::Arc;
use std::time::Duration;

use lorasense_core::{Capabilities, NodeId};
use lorasense_radio::{Link, Radio, TransportError};
use lorasense_store::ReadingStore;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::cache::ReadingCache;
use crate::gps::GpsSource;
use crate::ingest::Ingestor;
use crate::join::{JoinError, JoinPolicy, join};
use crate::responder::{Responder, serve};
use crate::sensor::SensorSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    DiscoveringSensorSource,
    Unjoined,
    Joined,
    Stopped,
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Join(#[from] JoinError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub id: NodeId,
    pub capabilities: Capabilities,
    pub join: JoinPolicy,
    /// Pause between attempts to reach the sensor source.
    pub reconnect: Duration,
}

/// One sensor node: keeps its readings fresh, joins the network, then
/// answers sensor requests until cancelled.
pub struct NodeAgent<R, S, St> {
    config: AgentConfig,
    link: Link<R>,
    source: S,
    store: St,
    gps: Option<Arc<dyn GpsSource>>,
    cache: ReadingCache,
    state: watch::Sender<AgentState>,
}

impl<R, S, St> NodeAgent<R, S, St>
where
    R: Radio,
    S: SensorSource,
    St: ReadingStore,
{
    pub fn new(config: AgentConfig, radio: R, source: S, store: St) -> Self {
        Self {
            config,
            link: Link::new(radio),
            source,
            store,
            gps: None,
            cache: ReadingCache::new(),
            state: watch::channel(AgentState::DiscoveringSensorSource).0,
        }
    }

    pub fn with_gps(mut self, gps: Arc<dyn GpsSource>) -> Self {
        self.gps = Some(gps);
        self
    }

    pub fn cache(&self) -> ReadingCache {
        self.cache.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AgentState> {
        self.state.subscribe()
    }

    /// Runs until cancelled, the join gives up, or the radio fails.
    ///
    /// Sensor ingestion keeps running while the node waits for the source
    /// and while it joins; it stops together with the agent.
    #[instrument(name = "node", skip_all, fields(id = self.config.id))]
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), AgentError> {
        let (connected, connected_rx) = watch::channel(false);
        let ingest_cancel = cancel.child_token();

        let ingestor = Ingestor {
            node: self.config.id,
            kinds: self.config.capabilities,
            source: self.source,
            store: self.store,
            cache: self.cache.clone(),
            gps: self.gps.clone(),
            reconnect: self.config.reconnect,
            connected,
        };
        let ingest_handle = tokio::spawn(ingestor.run(ingest_cancel.clone()));

        let result = drive(
            &mut self.link,
            &self.config,
            &self.cache,
            self.gps.clone(),
            &self.state,
            connected_rx,
            &cancel,
        )
        .await;

        ingest_cancel.cancel();
        if let Err(e) = ingest_handle.await {
            warn!(error = %e, "ingestion task failed");
        }

        announce(&self.state, AgentState::Stopped);
        result
    }
}

fn announce(state: &watch::Sender<AgentState>, next: AgentState) {
    info!(state = ?next, "node state");
    state.send_replace(next);
}

async fn drive<R: Radio>(
    link: &mut Link<R>,
    config: &AgentConfig,
    cache: &ReadingCache,
    gps: Option<Arc<dyn GpsSource>>,
    state: &watch::Sender<AgentState>,
    mut connected: watch::Receiver<bool>,
    cancel: &CancellationToken,
) -> Result<(), AgentError> {
    announce(state, AgentState::DiscoveringSensorSource);

    let ready = tokio::select! {
        _ = cancel.cancelled() => false,
        ready = connected.wait_for(|c| *c) => ready.is_ok(),
    };
    if !ready {
        return Ok(());
    }

    announce(state, AgentState::Unjoined);

    match join(link, config.id, config.capabilities, &config.join, cancel).await {
        Ok(_) => {}
        Err(JoinError::Cancelled) => return Ok(()),
        Err(e) => return Err(e.into()),
    }

    announce(state, AgentState::Joined);

    let responder = Responder::new(config.id, config.capabilities, cache.clone(), gps);
    serve(link, &responder, cancel).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use lorasense_core::{GpsFix, SensorKind};
    use lorasense_radio::Ether;
    use lorasense_store::MemoryStore;

    use super::*;
    use crate::gps::SharedFix;
    use crate::sensor::SimulatedThingy;

    fn config() -> AgentConfig {
        AgentConfig {
            id: 5,
            capabilities: [SensorKind::Humidity].into_iter().collect(),
            join: JoinPolicy {
                ack_timeout: Duration::from_secs(2),
                max_attempts: 2,
            },
            reconnect: Duration::from_secs(1),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn agent_joins_then_answers() {
        let ether = Ether::default();
        let mut base = ether.attach();
        let fix = GpsFix::from_degrees(1.0, 2.0).unwrap();
        let agent = NodeAgent::new(
            config(),
            ether.attach(),
            SimulatedThingy::new(Duration::from_millis(200)).with_failed_connects(1),
            MemoryStore::default(),
        )
        .with_gps(Arc::new(SharedFix::fixed(fix)));
        let mut state = agent.subscribe();
        let cache = agent.cache();

        let cancel = CancellationToken::new();
        let started = tokio::time::Instant::now();
        let handle = tokio::spawn(agent.run(cancel.clone()));

        // Nothing goes on air until the sensor source is up.
        assert_eq!(base.receive().await.unwrap(), vec![5, 0, 0, 0, 1, 0, 0]);
        assert!(started.elapsed() >= Duration::from_secs(1));
        assert_eq!(*state.borrow(), AgentState::Unjoined);

        base.send(&[0, 5, 1]).await.unwrap();
        state.wait_for(|s| *s == AgentState::Joined).await.unwrap();

        let mut humidity = cache.subscribe(SensorKind::Humidity);
        humidity.wait_for(|r| r.is_some()).await.unwrap();

        base.send(&[0, 5, 3, 1]).await.unwrap();
        let frame = base.receive().await.unwrap();
        assert_eq!(&frame[..4], &[5, 0, 2, 1]);
        assert_eq!(frame.len(), 3 + 11);

        cancel.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(*state.borrow(), AgentState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn agent_fails_when_join_is_never_acknowledged() {
        let ether = Ether::default();
        let agent = NodeAgent::new(
            config(),
            ether.attach(),
            SimulatedThingy::new(Duration::from_millis(200)),
            MemoryStore::default(),
        );
        let state = agent.subscribe();

        let result = agent.run(CancellationToken::new()).await;

        assert!(matches!(
            result,
            Err(AgentError::Join(JoinError::Exhausted { attempts: 2 }))
        ));
        assert_eq!(*state.borrow(), AgentState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_while_discovering_stops_cleanly() {
        let ether = Ether::default();
        let agent = NodeAgent::new(
            config(),
            ether.attach(),
            SimulatedThingy::new(Duration::from_millis(200)).with_failed_connects(u32::MAX),
            MemoryStore::default(),
        );
        let mut state = agent.subscribe();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(agent.run(cancel.clone()));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(*state.borrow_and_update(), AgentState::DiscoveringSensorSource);

        cancel.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(*state.borrow(), AgentState::Stopped);
    }
}
