use {
    derive_more::Display,
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

/// Orchestrator instance identifier: `payment-{payment_id}-{run_number}`.
///
/// Derived only from the payment id and the run ordinal, so a retried start
/// command maps onto a predictable, distinguishable id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(String);

impl WorkflowId {
    pub fn for_payment(payment_id: &str, run_number: u32) -> Self {
        Self(format!("payment-{payment_id}-{run_number}"))
    }

    /// Wraps an id received from a caller (HTTP path, history row).
    pub fn parse(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One physical execution of a workflow. Generated outside the workflow body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for RunId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_id_is_derived_from_payment_and_run() {
        assert_eq!(WorkflowId::for_payment("p1", 1).as_str(), "payment-p1-1");
        assert_ne!(WorkflowId::for_payment("p1", 1), WorkflowId::for_payment("p1", 2));
    }
}
