//! The payment saga.
//!
//! The body in this module decides *what* happens next; it never reads the
//! clock, draws random numbers, or talks to the outside world directly. All of
//! that goes through [`WorkflowContext::activity`], which records each outcome
//! in the history log. A resumed run replays recorded outcomes by sequence
//! number instead of re-invoking the effect, so the body reaches the same
//! decisions it reached before the crash.

use {
    super::{
        activities::{ORCHESTRATOR_ACTOR, PaymentActivities, PersistOutcome},
        executor::{ActivityExecutor, ActivityRun},
    },
    crate::domain::{
        error::ActivityError,
        history::{HistoryEvent, HistoryStore},
        id::WorkflowId,
        payment::{PaymentRecord, PaymentStatus, StatusUpdate},
        workflow::{
            PaymentWorkflowInput, PaymentWorkflowResult, ProcessingResult,
            WebhookDeliveryResult, WorkflowExecutionState,
        },
    },
    serde::{Serialize, de::DeserializeOwned},
    std::{collections::HashMap, future::Future, sync::Arc, time::Duration},
    thiserror::Error,
    tokio::sync::watch,
};

#[derive(Debug, Error)]
pub enum WorkflowFault {
    #[error("nondeterministic replay at step {seq}: expected {expected}, history has {found}")]
    Nondeterminism {
        seq: u32,
        expected: String,
        found: String,
    },

    #[error("history: {0}")]
    History(String),

    #[error("recording a decision took longer than {0:?}")]
    TaskTimeout(Duration),

    #[error("run exceeded {0:?}")]
    RunTimeout(Duration),

    #[error("execution exceeded {0:?}")]
    ExecutionTimeout(Duration),

    #[error("decode recorded output: {0}")]
    Decode(String),

    #[error(transparent)]
    Activity(#[from] ActivityError),
}

/// What compensation needs to know about effects already taken.
#[derive(Debug, Clone)]
struct SagaProgress {
    record_status: PaymentStatus,
    transaction_id: Option<String>,
    authorization_released: bool,
}

impl Default for SagaProgress {
    fn default() -> Self {
        Self {
            record_status: PaymentStatus::Pending,
            transaction_id: None,
            authorization_released: false,
        }
    }
}

pub struct WorkflowContext {
    workflow_id: WorkflowId,
    history: Arc<dyn HistoryStore>,
    executor: Arc<ActivityExecutor>,
    recorded: HashMap<u32, HistoryEvent>,
    seq: u32,
    cancel: watch::Receiver<bool>,
    state: watch::Sender<WorkflowExecutionState>,
    task_timeout: Duration,
    progress: SagaProgress,
}

impl WorkflowContext {
    /// `recorded` is the workflow's history so far; empty for a fresh run.
    pub fn new(
        workflow_id: WorkflowId,
        history: Arc<dyn HistoryStore>,
        executor: Arc<ActivityExecutor>,
        recorded: Vec<HistoryEvent>,
        cancel: watch::Receiver<bool>,
        state: watch::Sender<WorkflowExecutionState>,
        task_timeout: Duration,
    ) -> Self {
        let recorded = recorded
            .into_iter()
            .filter_map(|event| event.seq().map(|seq| (seq, event)))
            .collect();
        Self {
            workflow_id,
            history,
            executor,
            recorded,
            seq: 0,
            cancel,
            state,
            task_timeout,
            progress: SagaProgress::default(),
        }
    }

    pub fn workflow_id(&self) -> &WorkflowId {
        &self.workflow_id
    }

    pub fn state(&self) -> WorkflowExecutionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: WorkflowExecutionState) {
        let current = self.state();
        if current == next {
            return;
        }
        if !current.can_advance_to(&next) {
            tracing::error!(
                workflow_id = %self.workflow_id,
                from = %current,
                to = %next,
                "illegal workflow state transition ignored"
            );
            return;
        }
        tracing::debug!(workflow_id = %self.workflow_id, from = %current, to = %next, "workflow state");
        self.state.send_replace(next);
    }

    fn next_seq(&mut self) -> u32 {
        self.seq += 1;
        self.seq
    }

    async fn record(&self, event: HistoryEvent) -> Result<(), WorkflowFault> {
        match tokio::time::timeout(
            self.task_timeout,
            self.history.append(&self.workflow_id, &event),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(WorkflowFault::History(e.to_string())),
            Err(_) => Err(WorkflowFault::TaskTimeout(self.task_timeout)),
        }
    }

    /// Run one side-effecting step through the executor, or hand back its
    /// recorded outcome when replaying.
    pub async fn activity<T, F, Fut>(
        &mut self,
        name: &str,
        op: F,
    ) -> Result<ActivityRun<T>, WorkflowFault>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ActivityError>>,
    {
        let seq = self.next_seq();

        if let Some(event) = self.recorded.remove(&seq) {
            return match event {
                HistoryEvent::ActivityCompleted {
                    activity,
                    attempts,
                    output,
                    ..
                } if activity == name => {
                    tracing::debug!(workflow_id = %self.workflow_id, seq, activity = name, "replayed");
                    let value = serde_json::from_value(output)
                        .map_err(|e| WorkflowFault::Decode(e.to_string()))?;
                    Ok(ActivityRun {
                        attempts,
                        result: Ok(value),
                    })
                }
                HistoryEvent::ActivityFailed {
                    activity,
                    attempts,
                    error,
                    ..
                } if activity == name => Ok(ActivityRun {
                    attempts,
                    result: Err(error),
                }),
                other => Err(WorkflowFault::Nondeterminism {
                    seq,
                    expected: name.to_string(),
                    found: describe(&other),
                }),
            };
        }

        let run = self.executor.execute(name, op).await;
        let event = match &run.result {
            Ok(value) => HistoryEvent::ActivityCompleted {
                seq,
                activity: name.to_string(),
                attempts: run.attempts,
                output: serde_json::to_value(value)
                    .map_err(|e| WorkflowFault::Decode(e.to_string()))?,
            },
            Err(error) => HistoryEvent::ActivityFailed {
                seq,
                activity: name.to_string(),
                attempts: run.attempts,
                error: error.clone(),
            },
        };
        self.record(event).await?;
        Ok(run)
    }

    /// Checkpoint: has a cancel signal arrived? The answer is recorded so a
    /// replay takes the same branch even if the signal timing differs.
    pub async fn cancellation_requested(&mut self) -> Result<bool, WorkflowFault> {
        let seq = self.next_seq();

        if let Some(event) = self.recorded.remove(&seq) {
            return match event {
                HistoryEvent::CancellationChecked { requested, .. } => Ok(requested),
                other => Err(WorkflowFault::Nondeterminism {
                    seq,
                    expected: "cancellation_check".to_string(),
                    found: describe(&other),
                }),
            };
        }

        let requested = *self.cancel.borrow();
        self.record(HistoryEvent::CancellationChecked { seq, requested })
            .await?;
        Ok(requested)
    }
}

fn describe(event: &HistoryEvent) -> String {
    match event {
        HistoryEvent::ActivityCompleted { activity, .. }
        | HistoryEvent::ActivityFailed { activity, .. } => {
            format!("{} ({activity})", event.kind())
        }
        other => other.kind().to_string(),
    }
}

/// Drive one payment to a terminal outcome. Never returns an error: faults
/// route through compensation to a `Failed` result.
pub async fn run_payment_workflow(
    ctx: &mut WorkflowContext,
    input: &PaymentWorkflowInput,
    activities: &PaymentActivities,
) -> PaymentWorkflowResult {
    match drive(ctx, input, activities).await {
        Ok(result) => result,
        Err(fault) => handle_fault(ctx, input, activities, fault).await,
    }
}

/// `Error -> (best-effort compensation) -> Failed`, unless another writer
/// already finalized the payment, in which case its outcome is reported.
pub async fn handle_fault(
    ctx: &mut WorkflowContext,
    input: &PaymentWorkflowInput,
    activities: &PaymentActivities,
    fault: WorkflowFault,
) -> PaymentWorkflowResult {
    tracing::error!(
        workflow_id = %ctx.workflow_id,
        payment_id = %input.payment_id,
        error = %fault,
        "workflow fault"
    );
    // Past a recorded completion the payment outcome is settled; only the
    // notification can still be affected.
    if ctx.progress.record_status == PaymentStatus::Completed {
        ctx.set_state(WorkflowExecutionState::Completed);
        return PaymentWorkflowResult {
            success: true,
            payment_id: input.payment_id.clone(),
            transaction_id: ctx.progress.transaction_id.clone(),
            status: PaymentStatus::Completed,
            error_message: None,
            webhook_delivered: false,
        };
    }

    ctx.set_state(WorkflowExecutionState::Error);
    let reason = fault.to_string();
    if let Some(current) = compensate(ctx, input, activities, &reason).await {
        return adopt(ctx, input, current);
    }
    ctx.set_state(WorkflowExecutionState::Failed);
    failed(input, ctx.progress.transaction_id.clone(), reason)
}

async fn drive(
    ctx: &mut WorkflowContext,
    input: &PaymentWorkflowInput,
    acts: &PaymentActivities,
) -> Result<PaymentWorkflowResult, WorkflowFault> {
    use {PaymentStatus as S, WorkflowExecutionState as W};

    let payment_id = input.payment_id.as_str();

    if ctx.cancellation_requested().await? {
        return cancel(ctx, input, acts).await;
    }

    ctx.set_state(W::Validating);
    let validation = ctx
        .activity("validate", move |_| acts.validate(input))
        .await?
        .result?;
    if !validation.is_valid {
        let reason = format!(
            "validation failed: {}",
            validation.reason.unwrap_or_default()
        );
        return fail_payment(ctx, input, acts, reason).await;
    }

    if ctx.cancellation_requested().await? {
        return cancel(ctx, input, acts).await;
    }

    ctx.set_state(W::Processing);
    let update = StatusUpdate::by(ORCHESTRATOR_ACTOR);
    let update = &update;
    let outcome = ctx
        .activity("mark_processing", move |_| {
            acts.persist_status(payment_id, S::Pending, S::Processing, update)
        })
        .await?
        .result?;
    match outcome {
        PersistOutcome::Updated => ctx.progress.record_status = S::Processing,
        // Runs for a payment are exclusive, so a record already in Processing
        // was moved there by this run before a crash cut off the recording.
        PersistOutcome::Superseded { current } if current.status == S::Processing => {
            ctx.progress.record_status = S::Processing;
        }
        PersistOutcome::Superseded { current } => return Ok(adopt(ctx, input, current)),
    }

    if ctx.cancellation_requested().await? {
        return cancel(ctx, input, acts).await;
    }

    let authorization = ctx
        .activity("authorize", move |_| acts.authorize(input))
        .await?
        .result;
    let transaction_id = match authorization {
        Ok(ProcessingResult {
            success: true,
            transaction_id: Some(transaction_id),
            ..
        }) => transaction_id,
        Ok(ProcessingResult { success: true, .. }) => {
            let reason = "gateway approved without a transaction id".to_string();
            return fail_payment(ctx, input, acts, reason).await;
        }
        Ok(ProcessingResult { error_message, .. }) => {
            let reason = format!(
                "payment declined: {}",
                error_message.unwrap_or_else(|| "no reason given".into())
            );
            return fail_payment(ctx, input, acts, reason).await;
        }
        Err(err) => {
            let reason = format!("authorization failed: {err}");
            return fail_payment(ctx, input, acts, reason).await;
        }
    };
    ctx.progress.transaction_id = Some(transaction_id.clone());

    // No cancellation checkpoint past a successful authorization.
    let completion =
        StatusUpdate::by(ORCHESTRATOR_ACTOR).with_gateway_reference(Some(transaction_id.clone()));
    let completion = &completion;
    let outcome = ctx
        .activity("mark_completed", move |_| {
            acts.persist_status(payment_id, S::Processing, S::Completed, completion)
        })
        .await?
        .result?;
    match outcome {
        PersistOutcome::Updated => ctx.progress.record_status = S::Completed,
        PersistOutcome::Superseded { current } if current.status == S::Completed => {
            tracing::info!(payment_id, "completion already recorded by gateway callback");
            ctx.progress.record_status = S::Completed;
        }
        PersistOutcome::Superseded { current } => {
            if !settled(current.status) {
                release_authorization(ctx, acts).await;
            }
            return Ok(adopt(ctx, input, current));
        }
    }

    ctx.set_state(W::SendingWebhook);
    let delivery = deliver_webhook(ctx, input, acts, &transaction_id).await;
    ctx.set_state(W::Completed);

    Ok(PaymentWorkflowResult {
        success: true,
        payment_id: input.payment_id.clone(),
        transaction_id: Some(transaction_id),
        status: S::Completed,
        error_message: None,
        webhook_delivered: delivery.success,
    })
}

/// Post-completion notification. Failure here never changes the outcome.
async fn deliver_webhook(
    ctx: &mut WorkflowContext,
    input: &PaymentWorkflowInput,
    acts: &PaymentActivities,
    transaction_id: &str,
) -> WebhookDeliveryResult {
    let payment_id = input.payment_id.as_str();
    let run = ctx
        .activity("notify_merchant", move |_| {
            acts.notify_merchant(input, transaction_id)
        })
        .await;

    match run {
        Ok(ActivityRun {
            attempts,
            result: Ok(()),
        }) => {
            tracing::info!(payment_id, attempts, "webhook_delivered");
            WebhookDeliveryResult {
                success: true,
                attempts,
                last_error: None,
            }
        }
        Ok(ActivityRun {
            attempts,
            result: Err(err),
        }) => {
            tracing::warn!(payment_id, attempts, error = %err, "webhook_failed");
            WebhookDeliveryResult {
                success: false,
                attempts,
                last_error: Some(err.to_string()),
            }
        }
        Err(fault) => {
            tracing::error!(payment_id, error = %fault, "webhook_error");
            WebhookDeliveryResult {
                success: false,
                attempts: 0,
                last_error: Some(fault.to_string()),
            }
        }
    }
}

async fn fail_payment(
    ctx: &mut WorkflowContext,
    input: &PaymentWorkflowInput,
    acts: &PaymentActivities,
    reason: String,
) -> Result<PaymentWorkflowResult, WorkflowFault> {
    tracing::warn!(payment_id = %input.payment_id, reason = %reason, "payment failed, compensating");
    if let Some(current) = compensate(ctx, input, acts, &reason).await
        && current.status != PaymentStatus::Failed
    {
        return Ok(adopt(ctx, input, current));
    }
    ctx.set_state(WorkflowExecutionState::Failed);
    Ok(failed(input, ctx.progress.transaction_id.clone(), reason))
}

/// Best-effort reversal of whatever this run already did. Returns the current
/// record if another writer finalized the payment first; an authorization
/// backing a payment that writer settled is left in place.
async fn compensate(
    ctx: &mut WorkflowContext,
    input: &PaymentWorkflowInput,
    acts: &PaymentActivities,
    reason: &str,
) -> Option<PaymentRecord> {
    let expected = ctx.progress.record_status;
    if expected.is_terminal() {
        return None;
    }

    let superseded = mark_failed(ctx, input, acts, expected, reason).await;
    if !superseded.as_ref().is_some_and(|current| settled(current.status)) {
        release_authorization(ctx, acts).await;
    }
    superseded
}

/// The payment went through; its authorization must stand.
fn settled(status: PaymentStatus) -> bool {
    matches!(status, PaymentStatus::Completed | PaymentStatus::Refunded)
}

async fn mark_failed(
    ctx: &mut WorkflowContext,
    input: &PaymentWorkflowInput,
    acts: &PaymentActivities,
    expected: PaymentStatus,
    reason: &str,
) -> Option<PaymentRecord> {
    let payment_id = input.payment_id.as_str();
    let update = StatusUpdate::by(ORCHESTRATOR_ACTOR).with_failure_reason(Some(reason.to_string()));
    let update = &update;
    let run = ctx
        .activity("mark_failed", move |_| {
            acts.persist_status(payment_id, expected, PaymentStatus::Failed, update)
        })
        .await;

    match run {
        Ok(ActivityRun {
            result: Ok(PersistOutcome::Updated),
            ..
        }) => {
            ctx.progress.record_status = PaymentStatus::Failed;
            None
        }
        Ok(ActivityRun {
            result: Ok(PersistOutcome::Superseded { current }),
            ..
        }) => Some(current),
        Ok(ActivityRun { result: Err(err), .. }) => {
            tracing::error!(payment_id, error = %err, "compensation failed");
            None
        }
        Err(fault) => {
            tracing::error!(payment_id, error = %fault, "compensation failed");
            None
        }
    }
}

async fn release_authorization(ctx: &mut WorkflowContext, acts: &PaymentActivities) {
    if ctx.progress.authorization_released {
        return;
    }
    let Some(transaction_id) = ctx.progress.transaction_id.clone() else {
        return;
    };
    ctx.progress.authorization_released = true;

    let txn = transaction_id.as_str();
    let run = ctx
        .activity("reverse_authorization", move |_| {
            acts.reverse_authorization(txn)
        })
        .await;
    match run {
        Ok(ActivityRun { result: Ok(()), .. }) => {
            tracing::info!(transaction_id = %transaction_id, "authorization released");
        }
        Ok(ActivityRun { result: Err(err), .. }) => {
            tracing::error!(transaction_id = %transaction_id, error = %err, "authorization release failed");
        }
        Err(fault) => {
            tracing::error!(transaction_id = %transaction_id, error = %fault, "authorization release failed");
        }
    }
}

async fn cancel(
    ctx: &mut WorkflowContext,
    input: &PaymentWorkflowInput,
    acts: &PaymentActivities,
) -> Result<PaymentWorkflowResult, WorkflowFault> {
    let payment_id = input.payment_id.as_str();
    let expected = ctx.progress.record_status;
    tracing::info!(payment_id, at = %ctx.state(), "cancellation requested");

    let update =
        StatusUpdate::by(ORCHESTRATOR_ACTOR).with_failure_reason(Some("cancelled by request".into()));
    let update = &update;
    let outcome = ctx
        .activity("mark_cancelled", move |_| {
            acts.persist_status(payment_id, expected, PaymentStatus::Cancelled, update)
        })
        .await?
        .result?;
    if let PersistOutcome::Superseded { current } = outcome {
        return Ok(adopt(ctx, input, current));
    }

    ctx.progress.record_status = PaymentStatus::Cancelled;
    ctx.set_state(WorkflowExecutionState::Cancelled);
    Ok(PaymentWorkflowResult {
        success: false,
        payment_id: input.payment_id.clone(),
        transaction_id: None,
        status: PaymentStatus::Cancelled,
        error_message: Some("payment cancelled".to_string()),
        webhook_delivered: false,
    })
}

/// Another writer finalized the payment: stop and report what it wrote.
fn adopt(
    ctx: &mut WorkflowContext,
    input: &PaymentWorkflowInput,
    current: PaymentRecord,
) -> PaymentWorkflowResult {
    use {PaymentStatus as S, WorkflowExecutionState as W};

    tracing::info!(
        payment_id = %input.payment_id,
        status = %current.status,
        "payment finalized by another writer, adopting outcome"
    );
    ctx.progress.record_status = current.status;
    ctx.set_state(match current.status {
        S::Completed | S::Refunded => W::Completed,
        S::Cancelled => W::Cancelled,
        S::Failed | S::Pending | S::Processing => W::Failed,
    });

    let error_message = match current.status {
        S::Completed => None,
        S::Pending | S::Processing => Some("payment is owned by another workflow run".to_string()),
        other => Some(
            current
                .failure_reason
                .clone()
                .unwrap_or_else(|| format!("payment already {other}")),
        ),
    };

    PaymentWorkflowResult {
        success: current.status == S::Completed,
        payment_id: input.payment_id.clone(),
        transaction_id: current.gateway_reference,
        status: current.status,
        error_message,
        webhook_delivered: false,
    }
}

fn failed(
    input: &PaymentWorkflowInput,
    transaction_id: Option<String>,
    reason: String,
) -> PaymentWorkflowResult {
    PaymentWorkflowResult {
        success: false,
        payment_id: input.payment_id.clone(),
        transaction_id,
        status: PaymentStatus::Failed,
        error_message: Some(reason),
        webhook_delivered: false,
    }
}
