use {
    super::{id::RunId, id::WorkflowId, payment::PaymentStatus},
    rust_decimal::Decimal,
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// Start command payload. Immutable once created.
///
/// String fields default to empty so that a command with missing fields still
/// reaches the validation step and fails there with a reason, instead of being
/// dropped at the decoding boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentWorkflowInput {
    #[serde(default)]
    pub payment_id: String,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub amount: Decimal,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub merchant_id: String,
    #[serde(default)]
    pub payment_method_id: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Orchestrator-internal progress marker. Distinct from `PaymentStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowExecutionState {
    Initiated,
    Validating,
    Processing,
    SendingWebhook,
    Completed,
    Failed,
    Cancelled,
    Error,
}

impl WorkflowExecutionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::Validating => "validating",
            Self::Processing => "processing",
            Self::SendingWebhook => "sending_webhook",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Legal forward edges of the orchestrator. `Error` is reachable from any
    /// non-terminal state and leads to `Failed`, or to whatever outcome
    /// another writer already persisted.
    pub fn can_advance_to(&self, next: &WorkflowExecutionState) -> bool {
        use WorkflowExecutionState::*;
        match (self, next) {
            (Initiated, Validating)
            | (Validating, Processing)
            | (Processing, SendingWebhook)
            | (SendingWebhook, Completed)
            | (Error, Failed | Cancelled) => true,
            (from, Failed | Cancelled | Error) => !from.is_terminal() && *from != Error,
            // A run that finds the payment already finalized by another
            // writer adopts that outcome directly, even mid-compensation.
            (Initiated | Validating | Processing | Error, Completed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for WorkflowExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            reason: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ProcessingResult {
    pub fn approved(transaction_id: impl Into<String>) -> Self {
        Self {
            success: true,
            transaction_id: Some(transaction_id.into()),
            error_message: None,
        }
    }

    pub fn declined(message: impl Into<String>) -> Self {
        Self {
            success: false,
            transaction_id: None,
            error_message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookDeliveryResult {
    pub success: bool,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentWorkflowResult {
    pub success: bool,
    pub payment_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub webhook_delivered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowHandle {
    pub workflow_id: WorkflowId,
    pub run_id: RunId,
}
