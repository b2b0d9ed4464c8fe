use {
    super::{
        BoxFuture,
        error::{ActivityError, PaymentError},
        id::WorkflowId,
        workflow::{PaymentWorkflowInput, PaymentWorkflowResult, WorkflowHandle},
    },
    serde::{Deserialize, Serialize},
};

/// One entry of a workflow's append-only event log.
///
/// Activity outcomes are stored as JSON so that a resumed run can hand the
/// recorded value back to the workflow body instead of re-running the effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryEvent {
    WorkflowStarted {
        handle: WorkflowHandle,
        input: PaymentWorkflowInput,
    },
    ActivityCompleted {
        seq: u32,
        activity: String,
        attempts: u32,
        output: serde_json::Value,
    },
    ActivityFailed {
        seq: u32,
        activity: String,
        attempts: u32,
        error: ActivityError,
    },
    CancellationChecked {
        seq: u32,
        requested: bool,
    },
    WorkflowCompleted {
        result: PaymentWorkflowResult,
    },
}

impl HistoryEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::WorkflowStarted { .. } => "workflow_started",
            Self::ActivityCompleted { .. } => "activity_completed",
            Self::ActivityFailed { .. } => "activity_failed",
            Self::CancellationChecked { .. } => "cancellation_checked",
            Self::WorkflowCompleted { .. } => "workflow_completed",
        }
    }

    /// Sequence number of the decision this event records, if any.
    pub fn seq(&self) -> Option<u32> {
        match self {
            Self::ActivityCompleted { seq, .. }
            | Self::ActivityFailed { seq, .. }
            | Self::CancellationChecked { seq, .. } => Some(*seq),
            Self::WorkflowStarted { .. } | Self::WorkflowCompleted { .. } => None,
        }
    }
}

/// A workflow that has a `WorkflowStarted` event but no `WorkflowCompleted`.
#[derive(Debug, Clone)]
pub struct OpenWorkflow {
    pub handle: WorkflowHandle,
    pub input: PaymentWorkflowInput,
}

pub trait HistoryStore: Send + Sync {
    fn append<'a>(
        &'a self,
        workflow_id: &'a WorkflowId,
        event: &'a HistoryEvent,
    ) -> BoxFuture<'a, Result<(), PaymentError>>;

    fn load<'a>(
        &'a self,
        workflow_id: &'a WorkflowId,
    ) -> BoxFuture<'a, Result<Vec<HistoryEvent>, PaymentError>>;

    fn open_workflows(&self) -> BoxFuture<'_, Result<Vec<OpenWorkflow>, PaymentError>>;

    /// Number of workflows ever started for a payment.
    fn run_count<'a>(&'a self, payment_id: &'a str) -> BoxFuture<'a, Result<u32, PaymentError>>;
}
