use axum::{Json, Router, extract::State, routing::get};
use lorasense_core::SensorReading;
use serde::Serialize;

use crate::registry::{NodeRegistry, NodeRecord};
use crate::state::{BaseState, StatusSnapshot};

#[derive(Clone)]
pub struct AppState {
    pub registry: NodeRegistry,
    pub state: BaseState,
}

#[derive(Debug, Serialize)]
pub struct NodeView {
    #[serde(flatten)]
    pub record: NodeRecord,
    pub responses: u64,
    pub timeouts: u64,
    pub latest: Vec<SensorReading>,
}

#[derive(Debug, Serialize)]
pub struct StatusView {
    pub nodes: usize,
    #[serde(flatten)]
    pub status: StatusSnapshot,
}

pub fn router(app: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/nodes", get(nodes))
        .route("/status", get(status))
        .with_state(app)
}

pub async fn health() -> &'static str {
    "OK"
}

/// GET /nodes
pub async fn nodes(State(app): State<AppState>) -> Json<Vec<NodeView>> {
    let mut views = Vec::new();

    for record in app.registry.list().await {
        let stats = app.state.node_stats(record.id).await;
        views.push(NodeView {
            record,
            responses: stats.responses,
            timeouts: stats.timeouts,
            latest: stats.latest.into_values().collect(),
        });
    }

    Json(views)
}

/// GET /status
pub async fn status(State(app): State<AppState>) -> Json<StatusView> {
    Json(StatusView {
        nodes: app.registry.len().await,
        status: app.state.snapshot().await,
    })
}
