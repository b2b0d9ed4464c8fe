use {
    crate::domain::{
        error::{ActivityError, PaymentError},
        gateway::GatewayAdapter,
        money::{Amount, Currency},
        notifier::MerchantNotifier,
        payment::{PaymentRecord, PaymentStatus, StatusUpdate},
        store::StatusStore,
        workflow::{PaymentWorkflowInput, ProcessingResult, ValidationResult},
    },
    rust_decimal::Decimal,
    serde::{Deserialize, Serialize},
    std::sync::Arc,
};

pub const ORCHESTRATOR_ACTOR: &str = "workflow:payment";

/// Result of a compare-and-swap status write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PersistOutcome {
    Updated,
    /// The stored status was not the expected one: another writer got there
    /// first. Carries the record as it was found.
    Superseded { current: PaymentRecord },
}

/// The side-effecting steps of the payment workflow.
///
/// Every method is safe to re-run with the same input: reads are pure, status
/// writes are compare-and-swap, and the gateway call is keyed by payment id.
pub struct PaymentActivities {
    store: Arc<dyn StatusStore>,
    gateway: Arc<dyn GatewayAdapter>,
    notifier: Arc<dyn MerchantNotifier>,
    amount_ceiling: Decimal,
}

impl PaymentActivities {
    pub fn new(
        store: Arc<dyn StatusStore>,
        gateway: Arc<dyn GatewayAdapter>,
        notifier: Arc<dyn MerchantNotifier>,
        amount_ceiling: Decimal,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            amount_ceiling,
        }
    }

    pub async fn validate(
        &self,
        input: &PaymentWorkflowInput,
    ) -> Result<ValidationResult, ActivityError> {
        let required = [
            ("paymentId", &input.payment_id),
            ("reference", &input.reference),
            ("currency", &input.currency),
            ("merchantId", &input.merchant_id),
            ("paymentMethodId", &input.payment_method_id),
        ];
        if let Some((field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Ok(ValidationResult::invalid(format!("missing required field: {field}")));
        }

        if let Err(e) = Amount::new(input.amount, self.amount_ceiling) {
            return Ok(ValidationResult::invalid(strip_kind(e)));
        }
        if let Err(e) = Currency::try_from(input.currency.as_str()) {
            return Ok(ValidationResult::invalid(strip_kind(e)));
        }

        let record = self
            .store
            .find_by_id(&input.payment_id)
            .await
            .map_err(ActivityError::from)?;
        match record {
            None => Ok(ValidationResult::invalid(format!(
                "payment record not found: {}",
                input.payment_id
            ))),
            Some(record) if record.reference != input.reference => {
                Ok(ValidationResult::invalid(format!(
                    "reference mismatch: record has {}, command has {}",
                    record.reference, input.reference
                )))
            }
            Some(_) => Ok(ValidationResult::valid()),
        }
    }

    pub async fn authorize(
        &self,
        input: &PaymentWorkflowInput,
    ) -> Result<ProcessingResult, ActivityError> {
        self.gateway
            .authorize(input)
            .await
            .map_err(ActivityError::from)
    }

    pub async fn reverse_authorization(&self, transaction_id: &str) -> Result<(), ActivityError> {
        self.gateway
            .reverse(transaction_id)
            .await
            .map_err(ActivityError::from)
    }

    /// CAS `expected -> new`. On a lost race the current record is returned
    /// rather than an error.
    pub async fn persist_status(
        &self,
        payment_id: &str,
        expected: PaymentStatus,
        new: PaymentStatus,
        update: &StatusUpdate,
    ) -> Result<PersistOutcome, ActivityError> {
        let updated = self
            .store
            .update_status(payment_id, expected, new, update)
            .await
            .map_err(ActivityError::from)?;
        if updated {
            tracing::info!(payment_id, from = %expected, to = %new, "payment status updated");
            return Ok(PersistOutcome::Updated);
        }

        let current = self.load_record(payment_id).await?;
        tracing::info!(
            payment_id,
            expected = %expected,
            current = %current.status,
            "status already changed by another writer"
        );
        Ok(PersistOutcome::Superseded { current })
    }

    pub async fn load_record(&self, payment_id: &str) -> Result<PaymentRecord, ActivityError> {
        self.store
            .find_by_id(payment_id)
            .await
            .map_err(ActivityError::from)?
            .ok_or_else(|| {
                ActivityError::NonRetryable(format!("payment record not found: {payment_id}"))
            })
    }

    pub async fn notify_merchant(
        &self,
        input: &PaymentWorkflowInput,
        transaction_id: &str,
    ) -> Result<(), ActivityError> {
        self.notifier
            .notify(input, transaction_id)
            .await
            .map_err(ActivityError::from)
    }
}

fn strip_kind(err: PaymentError) -> String {
    match err {
        PaymentError::Validation(msg) => msg,
        other => other.to_string(),
    }
}
