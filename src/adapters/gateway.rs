use {
    crate::domain::{
        BoxFuture,
        error::PaymentError,
        gateway::GatewayAdapter,
        workflow::{PaymentWorkflowInput, ProcessingResult},
    },
    rand::Rng,
    std::{collections::HashMap, sync::Arc, time::Duration},
    tokio::sync::Mutex,
    uuid::Uuid,
};

/// Stand-in for the external authorization network.
///
/// Sleeps for up to `max_latency` and fails a `failure_rate` fraction of calls
/// with a transport-level error, which the executor treats as retryable.
/// Authorizations are keyed by payment id the way a real gateway honours an
/// idempotency key: asking again for a payment that holds a live
/// authorization returns that authorization.
#[derive(Debug, Clone)]
pub struct SimulatedGateway {
    max_latency: Duration,
    failure_rate: f64,
    /// payment id -> live transaction id
    authorizations: Arc<Mutex<HashMap<String, String>>>,
}

impl SimulatedGateway {
    pub fn new(max_latency: Duration, failure_rate: f64) -> Self {
        Self {
            max_latency,
            failure_rate: failure_rate.clamp(0.0, 1.0),
            authorizations: Arc::default(),
        }
    }

    fn latency(&self) -> Duration {
        let max_ms = self.max_latency.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(max_ms / 2..=max_ms))
    }

    fn should_fail(&self) -> bool {
        self.failure_rate > 0.0 && rand::thread_rng().gen_bool(self.failure_rate)
    }

    async fn authorize_inner(
        &self,
        input: &PaymentWorkflowInput,
    ) -> Result<ProcessingResult, PaymentError> {
        let latency = self.latency();
        let fail = self.should_fail();
        tokio::time::sleep(latency).await;

        if fail {
            tracing::warn!(payment_id = %input.payment_id, "simulated gateway timeout");
            return Err(PaymentError::Gateway("gateway did not respond".into()));
        }

        let mut authorizations = self.authorizations.lock().await;
        if let Some(existing) = authorizations.get(&input.payment_id) {
            tracing::info!(
                payment_id = %input.payment_id,
                transaction_id = %existing,
                "authorization already granted, returning it"
            );
            return Ok(ProcessingResult::approved(existing.clone()));
        }

        let transaction_id = format!("txn_{}", Uuid::now_v7().simple());
        authorizations.insert(input.payment_id.clone(), transaction_id.clone());
        tracing::info!(
            payment_id = %input.payment_id,
            transaction_id = %transaction_id,
            latency_ms = latency.as_millis() as u64,
            "authorization approved"
        );
        Ok(ProcessingResult::approved(transaction_id))
    }
}

impl GatewayAdapter for SimulatedGateway {
    fn authorize<'a>(
        &'a self,
        input: &'a PaymentWorkflowInput,
    ) -> BoxFuture<'a, Result<ProcessingResult, PaymentError>> {
        Box::pin(self.authorize_inner(input))
    }

    fn reverse<'a>(&'a self, transaction_id: &'a str) -> BoxFuture<'a, Result<(), PaymentError>> {
        Box::pin(async move {
            tokio::time::sleep(self.latency()).await;
            self.authorizations
                .lock()
                .await
                .retain(|_, live| live != transaction_id);
            tracing::info!(transaction_id, "authorization reversed");
            Ok(())
        })
    }
}
