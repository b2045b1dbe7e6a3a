use lorasense_radio::{Link, Radio, TransportError};
use lorasense_store::StoredReading;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::config::BasestationConfig;
use crate::join::run_discovery;
use crate::poll::Poller;
use crate::registry::NodeRegistry;
use crate::state::BaseState;

/// The basestation's radio side: one discovery window, then polling forever.
pub struct Basestation<R> {
    link: Link<R>,
    registry: NodeRegistry,
    state: BaseState,
    config: BasestationConfig,
    sink: Option<mpsc::Sender<StoredReading>>,
}

impl<R: Radio> Basestation<R> {
    pub fn new(radio: R, config: BasestationConfig) -> Self {
        Self {
            link: Link::new(radio),
            registry: NodeRegistry::new(),
            state: BaseState::new(),
            config,
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: mpsc::Sender<StoredReading>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn registry(&self) -> NodeRegistry {
        self.registry.clone()
    }

    pub fn state(&self) -> BaseState {
        self.state.clone()
    }

    /// Runs until cancelled or the radio fails.
    #[instrument(name = "basestation", skip_all)]
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), TransportError> {
        run_discovery(
            &mut self.link,
            &self.registry,
            self.config.discovery_window(),
            &cancel,
        )
        .await?;

        if cancel.is_cancelled() {
            return Ok(());
        }

        let mut poller = Poller::new(
            self.registry.clone(),
            self.state.clone(),
            self.config.response_timeout(),
        );
        if let Some(sink) = self.sink.take() {
            poller = poller.with_sink(sink);
        }

        let nodes = self.registry.len().await;
        info!(nodes, "starting poll cycles");

        poller
            .run(&mut self.link, self.config.cycle_pause(), &cancel)
            .await
    }
}
