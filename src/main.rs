use {
    payment_saga::{
        AppState,
        adapters::{gateway::SimulatedGateway, notifier::LoggingNotifier},
        config::AppConfig,
        domain::{history::HistoryStore, store::StatusStore},
        infra::{
            memory::{InMemoryHistoryStore, InMemoryStatusStore},
            postgres::{history_repo::PgHistoryStore, payment_repo::PgStatusStore},
        },
        services::{
            activities::PaymentActivities,
            executor::ActivityExecutor,
            orchestrator::{Orchestrator, WorkflowTimeouts},
            reconciler::WebhookReconciler,
        },
        transport,
    },
    sqlx::postgres::PgPoolOptions,
    std::{sync::Arc, time::Duration},
    tokio::signal,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    dotenvy::dotenv().ok();
    let config = AppConfig::from_env().expect("invalid configuration");

    let (store, history): (Arc<dyn StatusStore>, Arc<dyn HistoryStore>) =
        match &config.database_url {
            Some(database_url) => {
                let pool = PgPoolOptions::new()
                    .max_connections(20)
                    .acquire_timeout(Duration::from_secs(3))
                    .connect(database_url)
                    .await
                    .expect("failed to connect to database");
                sqlx::migrate!("./migrations")
                    .run(&pool)
                    .await
                    .expect("failed to run migrations");
                tracing::info!("using postgres stores");
                (
                    Arc::new(PgStatusStore::new(pool.clone())),
                    Arc::new(PgHistoryStore::new(pool)),
                )
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory stores");
                (
                    Arc::new(InMemoryStatusStore::new()),
                    Arc::new(InMemoryHistoryStore::new()),
                )
            }
        };

    let activities = Arc::new(PaymentActivities::new(
        store.clone(),
        Arc::new(SimulatedGateway::new(
            config.gateway_latency,
            config.gateway_failure_rate,
        )),
        Arc::new(LoggingNotifier::new(Duration::from_millis(100))),
        config.max_payment_amount,
    ));
    let orchestrator = Arc::new(Orchestrator::new(
        activities,
        history,
        ActivityExecutor::default(),
        WorkflowTimeouts::default(),
    ));

    let resumed = orchestrator
        .recover()
        .await
        .expect("failed to recover open workflows");
    tracing::info!(resumed, "workflow recovery complete");

    if config.webhook_secret.is_none() {
        tracing::warn!("GATEWAY_WEBHOOK_SECRET not set, signed callbacks will be rejected");
    }

    let state = AppState {
        orchestrator: orchestrator.clone(),
        reconciler: Arc::new(WebhookReconciler::new(
            store.clone(),
            config.allow_terminal_overwrite,
        )),
        store,
        webhook_secret: config.webhook_secret.map(Into::into),
    };

    let app = transport::http::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind listener");
    tracing::info!("listening on {}", config.bind_addr);
    // Runs are suspended before connections drain so that result waiters
    // are released instead of holding the server open.
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            orchestrator.shutdown().await;
        })
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl+c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
