pub mod adapters;
pub mod config;
pub mod domain;
pub mod infra;
pub mod services;
pub mod transport;

use {
    domain::store::StatusStore,
    services::{orchestrator::Orchestrator, reconciler::WebhookReconciler},
    std::sync::Arc,
};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub reconciler: Arc<WebhookReconciler>,
    pub store: Arc<dyn StatusStore>,
    pub webhook_secret: Option<Arc<str>>,
}
