use {
    serde::{Deserialize, Serialize},
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("webhook signature: {0}")]
    WebhookSignature(String),

    #[error("gateway: {0}")]
    Gateway(String),

    #[error("store: {0}")]
    Store(String),

    #[error("workflow start: {0}")]
    Start(String),

    #[error("workflow: {0}")]
    Workflow(String),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure of a single side-effecting step, as seen by the activity executor.
///
/// Serializable because failed attempts are recorded in workflow history and
/// must replay to the same error.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ActivityError {
    #[error("retryable: {0}")]
    Retryable(String),

    #[error("non-retryable: {0}")]
    NonRetryable(String),

    #[error("attempt timed out after {0}s")]
    Timeout(u64),

    #[error("{activity} exhausted after {attempts} attempts: {last_error}")]
    Exhausted {
        activity: String,
        attempts: u32,
        last_error: String,
    },
}

impl ActivityError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_) | Self::Timeout(_))
    }
}

impl From<PaymentError> for ActivityError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Validation(_)
            | PaymentError::NotFound(_)
            | PaymentError::WebhookSignature(_)
            | PaymentError::Serialization(_) => Self::NonRetryable(err.to_string()),
            PaymentError::Gateway(_)
            | PaymentError::Store(_)
            | PaymentError::Start(_)
            | PaymentError::Workflow(_)
            | PaymentError::Database(_) => Self::Retryable(err.to_string()),
        }
    }
}
