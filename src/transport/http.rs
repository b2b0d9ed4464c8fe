pub mod errors;
pub mod webhook;
pub mod workflows;

use {
    crate::AppState,
    axum::{
        Router,
        extract::DefaultBodyLimit,
        routing::{get, post},
    },
    std::time::Duration,
    tower_http::{timeout::TimeoutLayer, trace::TraceLayer},
};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

pub fn router(state: AppState) -> Router {
    // The result route waits on the workflow and stays outside the
    // per-request timeout; the execution timeout bounds it instead.
    let commands = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/workflows/payments", post(workflows::start_payment_handler))
        .route(
            "/workflows/{workflow_id}/status",
            get(workflows::workflow_status_handler),
        )
        .route(
            "/workflows/{workflow_id}/cancel",
            post(workflows::cancel_workflow_handler),
        )
        .route("/webhooks/gateway", post(webhook::gateway_callback_handler))
        .layer(TimeoutLayer::new(COMMAND_TIMEOUT));

    Router::new()
        .route(
            "/workflows/{workflow_id}/result",
            get(workflows::workflow_result_handler),
        )
        .merge(commands)
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
