use {
    crate::domain::{
        error::PaymentError,
        payment::{PaymentStatus, StatusUpdate},
        store::StatusStore,
    },
    std::sync::Arc,
};

pub const GATEWAY_ACTOR: &str = "webhook:gateway";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileResult {
    Applied { from: PaymentStatus },
    /// The record already carries the reported status. Replays land here.
    AlreadyApplied,
    /// The reported status is not reachable from the current one.
    Rejected { current: PaymentStatus },
    /// Another writer changed the status between our read and our write.
    Superseded { current: PaymentStatus },
}

impl ReconcileResult {
    pub fn applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Applies asynchronous gateway callbacks to the status store.
///
/// Shares the store with the orchestrator and races it through the same
/// compare-and-swap, so at most one writer wins each transition.
pub struct WebhookReconciler {
    store: Arc<dyn StatusStore>,
    allow_terminal_overwrite: bool,
}

impl WebhookReconciler {
    pub fn new(store: Arc<dyn StatusStore>, allow_terminal_overwrite: bool) -> Self {
        Self {
            store,
            allow_terminal_overwrite,
        }
    }

    pub async fn reconcile(
        &self,
        reference: &str,
        reported: PaymentStatus,
        gateway_reference: Option<String>,
        failure_reason: Option<String>,
    ) -> Result<ReconcileResult, PaymentError> {
        let record = self
            .store
            .find_by_reference(reference)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("payment reference {reference}")))?;
        let current = record.status;

        if current == reported {
            tracing::info!(reference, status = %reported, "callback already applied");
            return Ok(ReconcileResult::AlreadyApplied);
        }

        let overwrite = self.allow_terminal_overwrite && current.is_terminal() && reported.is_terminal();
        if !current.can_transition_to(&reported) && !overwrite {
            tracing::warn!(
                reference,
                current = %current,
                reported = %reported,
                "callback rejected: illegal transition"
            );
            return Ok(ReconcileResult::Rejected { current });
        }
        if overwrite && !current.can_transition_to(&reported) {
            tracing::warn!(reference, current = %current, reported = %reported, "overwriting terminal status");
        }

        let update = StatusUpdate::by(GATEWAY_ACTOR)
            .with_gateway_reference(gateway_reference)
            .with_failure_reason(failure_reason);
        if self
            .store
            .update_status(&record.id, current, reported, &update)
            .await?
        {
            tracing::info!(
                reference,
                payment_id = %record.id,
                from = %current,
                to = %reported,
                "callback applied"
            );
            return Ok(ReconcileResult::Applied { from: current });
        }

        let latest = self
            .store
            .find_by_id(&record.id)
            .await?
            .map(|r| r.status)
            .unwrap_or(current);
        tracing::info!(reference, current = %latest, "callback lost race to another writer");
        Ok(ReconcileResult::Superseded { current: latest })
    }
}
