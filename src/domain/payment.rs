use {
    super::audit::NewAuditEntry,
    super::error::PaymentError,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 6] = [
        Self::Pending,
        Self::Processing,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
        Self::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }

    /// Completed is terminal for the payment lifecycle but still admits a
    /// refund, so it is the only terminal status with an outgoing edge.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Processing)
    }

    pub fn can_transition_to(&self, next: &PaymentStatus) -> bool {
        matches!(
            (self, next),
            (
                Self::Pending,
                Self::Processing | Self::Completed | Self::Failed | Self::Cancelled
            ) | (
                Self::Processing,
                Self::Completed | Self::Failed | Self::Cancelled
            ) | (Self::Completed, Self::Refunded)
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for PaymentStatus {
    type Error = PaymentError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            "refunded" => Ok(Self::Refunded),
            _ => Err(PaymentError::Validation(format!(
                "unknown payment status: {s}"
            ))),
        }
    }
}

/// Persisted payment row, owned by the status store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: String,
    pub reference: String,
    pub status: PaymentStatus,
    pub gateway_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub initiated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// For INSERT by the initiating collaborator. Always lands in `Pending`.
#[derive(Debug, Clone)]
pub struct NewPaymentRecord {
    pub id: String,
    pub reference: String,
    pub amount: rust_decimal::Decimal,
    pub currency: String,
    pub merchant_id: String,
    pub payment_method_id: String,
}

/// Extra columns written alongside a successful compare-and-swap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusUpdate {
    pub gateway_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub actor: String,
}

impl StatusUpdate {
    pub fn by(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            ..Self::default()
        }
    }

    pub fn with_gateway_reference(mut self, reference: Option<String>) -> Self {
        self.gateway_reference = reference;
        self
    }

    pub fn with_failure_reason(mut self, reason: Option<String>) -> Self {
        self.failure_reason = reason;
        self
    }

    pub fn audit_entry(
        &self,
        payment_id: &str,
        old_status: PaymentStatus,
        new_status: PaymentStatus,
    ) -> NewAuditEntry {
        NewAuditEntry {
            id: Uuid::now_v7(),
            entity_type: "payment".to_string(),
            entity_id: payment_id.to_string(),
            action: "status_changed".to_string(),
            actor: self.actor.clone(),
            detail: serde_json::json!({
                "old_status": old_status.as_str(),
                "new_status": new_status.as_str(),
                "gateway_reference": self.gateway_reference,
                "failure_reason": self.failure_reason,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_edges() {
        use PaymentStatus::*;
        assert!(Pending.can_transition_to(&Processing));
        assert!(Processing.can_transition_to(&Completed));
        assert!(Completed.can_transition_to(&Refunded));
    }

    #[test]
    fn terminal_to_terminal_is_rejected() {
        use PaymentStatus::*;
        assert!(!Completed.can_transition_to(&Failed));
        assert!(!Failed.can_transition_to(&Completed));
        assert!(!Cancelled.can_transition_to(&Completed));
    }

    #[test]
    fn parses_callback_spellings() {
        assert_eq!(
            PaymentStatus::try_from("Completed").unwrap(),
            PaymentStatus::Completed
        );
        assert_eq!(
            PaymentStatus::try_from("canceled").unwrap(),
            PaymentStatus::Cancelled
        );
        assert!(PaymentStatus::try_from("settled").is_err());
    }
}
