use {
    super::{
        activities::PaymentActivities,
        executor::ActivityExecutor,
        workflow::{WorkflowContext, WorkflowFault, handle_fault, run_payment_workflow},
    },
    crate::domain::{
        error::PaymentError,
        history::{HistoryEvent, HistoryStore},
        id::{RunId, WorkflowId},
        payment::PaymentStatus,
        workflow::{
            PaymentWorkflowInput, PaymentWorkflowResult, WorkflowExecutionState, WorkflowHandle,
        },
    },
    std::{collections::HashMap, sync::Arc, time::Duration},
    tokio::{
        sync::{Mutex, RwLock, watch},
        task::JoinSet,
        time::timeout,
    },
};

/// Wall-clock ceilings for a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowTimeouts {
    /// Whole execution, compensation included.
    pub execution: Duration,
    /// The workflow body of one run.
    pub run: Duration,
    /// Recording a single decision in history.
    pub task: Duration,
}

impl Default for WorkflowTimeouts {
    fn default() -> Self {
        Self {
            execution: Duration::from_secs(10 * 60),
            run: Duration::from_secs(5 * 60),
            task: Duration::from_secs(60),
        }
    }
}

struct Instance {
    state: watch::Receiver<WorkflowExecutionState>,
    cancel: watch::Sender<bool>,
    result: watch::Receiver<Option<PaymentWorkflowResult>>,
}

#[derive(Default)]
struct Registry {
    instances: HashMap<WorkflowId, Instance>,
    /// Payments with a run in flight, and the handle of that run.
    active_by_payment: HashMap<String, WorkflowHandle>,
}

/// Starts, tracks, signals and recovers payment workflows.
///
/// Each run is a spawned task. The run owns its `WorkflowContext`; callers
/// only see it through watch channels kept in the registry, so status queries
/// never contend with the run itself.
pub struct Orchestrator {
    activities: Arc<PaymentActivities>,
    executor: Arc<ActivityExecutor>,
    history: Arc<dyn HistoryStore>,
    timeouts: WorkflowTimeouts,
    registry: Arc<RwLock<Registry>>,
    /// Serializes `start` and `recover` so two commands for one payment
    /// cannot both decide that no run is active.
    start_lock: Mutex<()>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<JoinSet<()>>,
}

impl Orchestrator {
    pub fn new(
        activities: Arc<PaymentActivities>,
        history: Arc<dyn HistoryStore>,
        executor: ActivityExecutor,
        timeouts: WorkflowTimeouts,
    ) -> Self {
        Self {
            activities,
            executor: Arc::new(executor),
            history,
            timeouts,
            registry: Arc::new(RwLock::new(Registry::default())),
            start_lock: Mutex::new(()),
            shutdown: watch::Sender::new(false),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Launch a workflow for `input`. While a run for the same payment is in
    /// flight, returns that run's handle instead of starting another.
    pub async fn start(&self, input: PaymentWorkflowInput) -> Result<WorkflowHandle, PaymentError> {
        if *self.shutdown.borrow() {
            return Err(PaymentError::Start("orchestrator is shutting down".into()));
        }

        let _guard = self.start_lock.lock().await;

        if !input.payment_id.is_empty()
            && let Some(handle) = self
                .registry
                .read()
                .await
                .active_by_payment
                .get(&input.payment_id)
        {
            tracing::info!(
                payment_id = %input.payment_id,
                workflow_id = %handle.workflow_id,
                "workflow already running for payment"
            );
            return Ok(handle.clone());
        }

        let run_number = self
            .history
            .run_count(&input.payment_id)
            .await
            .map_err(|e| PaymentError::Start(e.to_string()))?
            + 1;
        let handle = WorkflowHandle {
            workflow_id: WorkflowId::for_payment(&input.payment_id, run_number),
            run_id: RunId::new(),
        };

        self.history
            .append(
                &handle.workflow_id,
                &HistoryEvent::WorkflowStarted {
                    handle: handle.clone(),
                    input: input.clone(),
                },
            )
            .await
            .map_err(|e| PaymentError::Start(e.to_string()))?;

        tracing::info!(
            workflow_id = %handle.workflow_id,
            run_id = %handle.run_id,
            payment_id = %input.payment_id,
            "workflow started"
        );
        self.launch(handle.clone(), input, Vec::new()).await;
        Ok(handle)
    }

    pub async fn query_status(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<WorkflowExecutionState, PaymentError> {
        if let Some(instance) = self.registry.read().await.instances.get(workflow_id) {
            return Ok(*instance.state.borrow());
        }

        let events = self.history.load(workflow_id).await?;
        if events.is_empty() {
            return Err(PaymentError::NotFound(format!("workflow {workflow_id}")));
        }
        Ok(completed_result(&events)
            .map(|result| state_for(result.status))
            .unwrap_or(WorkflowExecutionState::Initiated))
    }

    /// Request cancellation. Observed only at the workflow's checkpoints, so
    /// a run past authorization ignores it. Signals to finished runs are
    /// accepted and have no effect.
    pub async fn signal_cancel(&self, workflow_id: &WorkflowId) -> Result<(), PaymentError> {
        if let Some(instance) = self.registry.read().await.instances.get(workflow_id) {
            instance.cancel.send_replace(true);
            tracing::info!(workflow_id = %workflow_id, "cancel signal delivered");
            return Ok(());
        }

        if self.history.load(workflow_id).await?.is_empty() {
            return Err(PaymentError::NotFound(format!("workflow {workflow_id}")));
        }
        tracing::info!(workflow_id = %workflow_id, "cancel signal for inactive workflow ignored");
        Ok(())
    }

    /// Wait for the workflow's terminal result.
    pub async fn await_result(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<PaymentWorkflowResult, PaymentError> {
        let receiver = self
            .registry
            .read()
            .await
            .instances
            .get(workflow_id)
            .map(|instance| instance.result.clone());

        if let Some(mut receiver) = receiver {
            let result = receiver
                .wait_for(Option::is_some)
                .await
                .map(|result| result.clone())
                .map_err(|_| {
                    PaymentError::Workflow(format!(
                        "workflow {workflow_id} was suspended before completing"
                    ))
                })?;
            return result.ok_or_else(|| {
                PaymentError::Workflow(format!("workflow {workflow_id} has no result"))
            });
        }

        let events = self.history.load(workflow_id).await?;
        if events.is_empty() {
            return Err(PaymentError::NotFound(format!("workflow {workflow_id}")));
        }
        completed_result(&events).cloned().ok_or_else(|| {
            PaymentError::Workflow(format!("workflow {workflow_id} is not running"))
        })
    }

    /// Resume every workflow whose history has no completion event. Recorded
    /// steps are replayed, not re-executed. Returns the number resumed.
    pub async fn recover(&self) -> Result<usize, PaymentError> {
        let _guard = self.start_lock.lock().await;
        let open = self.history.open_workflows().await?;

        let mut resumed = 0;
        for workflow in open {
            let workflow_id = workflow.handle.workflow_id.clone();
            if self.registry.read().await.instances.contains_key(&workflow_id) {
                continue;
            }
            let events = self.history.load(&workflow_id).await?;
            tracing::info!(
                workflow_id = %workflow_id,
                recorded = events.len(),
                "resuming workflow from history"
            );
            self.launch(workflow.handle, workflow.input, events).await;
            resumed += 1;
        }
        Ok(resumed)
    }

    /// Stop accepting starts and suspend in-flight runs. Their history stays
    /// open, so `recover` on the next boot picks them up.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let mut tasks = self.tasks.lock().await;
        while tasks.join_next().await.is_some() {}
        let suspended = self.running_workflows().await;
        tracing::info!(suspended, "orchestrator stopped");
    }

    /// Runs this process still tracks: in flight, suspended, or finished
    /// without a recorded completion.
    pub async fn running_workflows(&self) -> usize {
        self.registry.read().await.instances.len()
    }

    async fn launch(
        &self,
        handle: WorkflowHandle,
        input: PaymentWorkflowInput,
        recorded: Vec<HistoryEvent>,
    ) {
        let (state_tx, state_rx) = watch::channel(WorkflowExecutionState::Initiated);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (result_tx, result_rx) = watch::channel(None);

        {
            let mut registry = self.registry.write().await;
            registry.instances.insert(
                handle.workflow_id.clone(),
                Instance {
                    state: state_rx,
                    cancel: cancel_tx,
                    result: result_rx,
                },
            );
            if !input.payment_id.is_empty() {
                registry
                    .active_by_payment
                    .insert(input.payment_id.clone(), handle.clone());
            }
        }

        let ctx = WorkflowContext::new(
            handle.workflow_id.clone(),
            self.history.clone(),
            self.executor.clone(),
            recorded,
            cancel_rx,
            state_tx,
            self.timeouts.task,
        );
        let run = WorkflowRun {
            ctx,
            handle,
            input,
            activities: self.activities.clone(),
            history: self.history.clone(),
            registry: self.registry.clone(),
            timeouts: self.timeouts,
            result: result_tx,
        };
        let stop = self.shutdown.subscribe();

        let mut tasks = self.tasks.lock().await;
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            let workflow_id = run.handle.workflow_id.clone();
            tokio::select! {
                _ = run.execute() => {}
                _ = stopped(stop) => {
                    tracing::info!(workflow_id = %workflow_id, "workflow suspended for shutdown");
                }
            }
        });
    }
}

async fn stopped(mut stop: watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopping| *stopping).await;
}

fn completed_result(events: &[HistoryEvent]) -> Option<&PaymentWorkflowResult> {
    events.iter().rev().find_map(|event| match event {
        HistoryEvent::WorkflowCompleted { result } => Some(result),
        _ => None,
    })
}

fn state_for(status: PaymentStatus) -> WorkflowExecutionState {
    match status {
        PaymentStatus::Completed | PaymentStatus::Refunded => WorkflowExecutionState::Completed,
        PaymentStatus::Cancelled => WorkflowExecutionState::Cancelled,
        PaymentStatus::Pending | PaymentStatus::Processing | PaymentStatus::Failed => {
            WorkflowExecutionState::Failed
        }
    }
}

/// Everything one spawned run owns.
struct WorkflowRun {
    ctx: WorkflowContext,
    handle: WorkflowHandle,
    input: PaymentWorkflowInput,
    activities: Arc<PaymentActivities>,
    history: Arc<dyn HistoryStore>,
    registry: Arc<RwLock<Registry>>,
    timeouts: WorkflowTimeouts,
    result: watch::Sender<Option<PaymentWorkflowResult>>,
}

impl WorkflowRun {
    async fn execute(mut self) {
        let execution = self.timeouts.execution;
        let outcome = timeout(execution, self.body()).await;
        let result = match outcome {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(
                    workflow_id = %self.handle.workflow_id,
                    timeout_secs = execution.as_secs(),
                    "workflow execution timed out"
                );
                self.final_compensation(execution).await
            }
        };
        self.publish(result).await;
    }

    /// Past the execution ceiling the run gets one more task-sized window to
    /// move the record out of `Processing`. If even that stalls, the record
    /// stays as it is and the run reports `Failed`.
    async fn final_compensation(&mut self, execution: Duration) -> PaymentWorkflowResult {
        let fault = WorkflowFault::ExecutionTimeout(execution);
        let reason = fault.to_string();
        let outcome = timeout(
            self.timeouts.task,
            handle_fault(&mut self.ctx, &self.input, &self.activities, fault),
        )
        .await;
        match outcome {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(
                    workflow_id = %self.handle.workflow_id,
                    payment_id = %self.input.payment_id,
                    "final compensation timed out, record left unchanged"
                );
                PaymentWorkflowResult {
                    success: false,
                    payment_id: self.input.payment_id.clone(),
                    transaction_id: None,
                    status: PaymentStatus::Failed,
                    error_message: Some(reason),
                    webhook_delivered: false,
                }
            }
        }
    }

    /// The workflow body under the run timeout; on expiry the run
    /// compensates from wherever it stopped.
    async fn body(&mut self) -> PaymentWorkflowResult {
        let run_timeout = self.timeouts.run;
        let outcome = timeout(
            run_timeout,
            run_payment_workflow(&mut self.ctx, &self.input, &self.activities),
        )
        .await;
        match outcome {
            Ok(result) => result,
            Err(_) => {
                handle_fault(
                    &mut self.ctx,
                    &self.input,
                    &self.activities,
                    WorkflowFault::RunTimeout(run_timeout),
                )
                .await
            }
        }
    }

    async fn publish(self, result: PaymentWorkflowResult) {
        let workflow_id = &self.handle.workflow_id;
        tracing::info!(
            workflow_id = %workflow_id,
            payment_id = %result.payment_id,
            status = %result.status,
            success = result.success,
            "workflow finished"
        );

        let completed = HistoryEvent::WorkflowCompleted {
            result: result.clone(),
        };
        let recorded = match self.history.append(workflow_id, &completed).await {
            Ok(()) => true,
            Err(e) => {
                // The run stays open in history and will be replayed on recovery.
                tracing::error!(workflow_id = %workflow_id, error = %e, "failed to record workflow completion");
                false
            }
        };

        // Release the payment before waking waiters, so a start issued after
        // the result is observed begins a new run. Once history holds the
        // result, queries are answered from there; waiters already holding a
        // receiver still see the value sent below.
        let mut registry = self.registry.write().await;
        let owns_payment = registry
            .active_by_payment
            .get(&self.input.payment_id)
            .is_some_and(|active| active.workflow_id == *workflow_id);
        if owns_payment {
            registry.active_by_payment.remove(&self.input.payment_id);
        }
        if recorded {
            registry.instances.remove(workflow_id);
        }
        self.result.send_replace(Some(result));
    }
}
