use {
    crate::domain::{
        BoxFuture,
        audit::NewAuditEntry,
        error::PaymentError,
        history::{HistoryEvent, HistoryStore, OpenWorkflow},
        id::WorkflowId,
        payment::{NewPaymentRecord, PaymentRecord, PaymentStatus, StatusUpdate},
        store::StatusStore,
    },
    chrono::Utc,
    std::{collections::HashMap, sync::Arc},
    tokio::sync::Mutex,
};

#[derive(Default)]
struct PaymentTable {
    by_id: HashMap<String, PaymentRecord>,
    id_by_reference: HashMap<String, String>,
    audit: Vec<NewAuditEntry>,
}

/// Process-local payment store.
///
/// A single mutex guards the table, so the status comparison and the write in
/// `update_status` happen atomically, matching the row-level CAS of the
/// Postgres store.
#[derive(Default, Clone)]
pub struct InMemoryStatusStore {
    table: Arc<Mutex<PaymentTable>>,
}

impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(action, actor, new_status)` for every audit row written for `id`.
    pub async fn audit_trail(&self, id: &str) -> Vec<(String, String, String)> {
        let table = self.table.lock().await;
        table
            .audit
            .iter()
            .filter(|entry| entry.entity_id == id)
            .map(|entry| {
                (
                    entry.action.clone(),
                    entry.actor.clone(),
                    entry.detail["new_status"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string(),
                )
            })
            .collect()
    }
}

impl StatusStore for InMemoryStatusStore {
    fn create_pending<'a>(
        &'a self,
        record: &'a NewPaymentRecord,
    ) -> BoxFuture<'a, Result<bool, PaymentError>> {
        Box::pin(async move {
            let mut table = self.table.lock().await;
            if table.by_id.contains_key(&record.id) {
                return Ok(false);
            }
            if table.id_by_reference.contains_key(&record.reference) {
                return Err(PaymentError::Validation(format!(
                    "reference already in use: {}",
                    record.reference
                )));
            }
            table
                .id_by_reference
                .insert(record.reference.clone(), record.id.clone());
            table.by_id.insert(
                record.id.clone(),
                PaymentRecord {
                    id: record.id.clone(),
                    reference: record.reference.clone(),
                    status: PaymentStatus::Pending,
                    gateway_reference: None,
                    failure_reason: None,
                    initiated_at: Utc::now(),
                    completed_at: None,
                },
            );
            Ok(true)
        })
    }

    fn find_by_id<'a>(
        &'a self,
        id: &'a str,
    ) -> BoxFuture<'a, Result<Option<PaymentRecord>, PaymentError>> {
        Box::pin(async move { Ok(self.table.lock().await.by_id.get(id).cloned()) })
    }

    fn find_by_reference<'a>(
        &'a self,
        reference: &'a str,
    ) -> BoxFuture<'a, Result<Option<PaymentRecord>, PaymentError>> {
        Box::pin(async move {
            let table = self.table.lock().await;
            Ok(table
                .id_by_reference
                .get(reference)
                .and_then(|id| table.by_id.get(id))
                .cloned())
        })
    }

    fn update_status<'a>(
        &'a self,
        id: &'a str,
        expected: PaymentStatus,
        new: PaymentStatus,
        update: &'a StatusUpdate,
    ) -> BoxFuture<'a, Result<bool, PaymentError>> {
        Box::pin(async move {
            let mut table = self.table.lock().await;
            let Some(record) = table.by_id.get_mut(id) else {
                return Ok(false);
            };
            if record.status != expected {
                return Ok(false);
            }

            record.status = new;
            if update.gateway_reference.is_some() {
                record.gateway_reference = update.gateway_reference.clone();
            }
            if update.failure_reason.is_some() {
                record.failure_reason = update.failure_reason.clone();
            }
            if new.is_terminal() && record.completed_at.is_none() {
                record.completed_at = Some(Utc::now());
            }

            let audit = update.audit_entry(id, expected, new);
            table.audit.push(audit);
            Ok(true)
        })
    }
}

#[derive(Default)]
struct HistoryTable {
    events: HashMap<WorkflowId, Vec<HistoryEvent>>,
    started: Vec<WorkflowId>,
}

/// Process-local workflow history. Lost on restart, so it only gives replay
/// semantics within one process; production wiring uses the Postgres log.
#[derive(Default, Clone)]
pub struct InMemoryHistoryStore {
    table: Arc<Mutex<HistoryTable>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn append<'a>(
        &'a self,
        workflow_id: &'a WorkflowId,
        event: &'a HistoryEvent,
    ) -> BoxFuture<'a, Result<(), PaymentError>> {
        Box::pin(async move {
            let mut table = self.table.lock().await;
            if matches!(event, HistoryEvent::WorkflowStarted { .. }) {
                if table.events.contains_key(workflow_id) {
                    return Err(PaymentError::Start(format!(
                        "workflow already exists: {workflow_id}"
                    )));
                }
                table.started.push(workflow_id.clone());
            }
            table
                .events
                .entry(workflow_id.clone())
                .or_default()
                .push(event.clone());
            Ok(())
        })
    }

    fn load<'a>(
        &'a self,
        workflow_id: &'a WorkflowId,
    ) -> BoxFuture<'a, Result<Vec<HistoryEvent>, PaymentError>> {
        Box::pin(async move {
            let table = self.table.lock().await;
            Ok(table.events.get(workflow_id).cloned().unwrap_or_default())
        })
    }

    fn open_workflows(&self) -> BoxFuture<'_, Result<Vec<OpenWorkflow>, PaymentError>> {
        Box::pin(async move {
            let table = self.table.lock().await;
            let open = table
                .started
                .iter()
                .filter_map(|id| table.events.get(id))
                .filter(|events| {
                    !events
                        .iter()
                        .any(|e| matches!(e, HistoryEvent::WorkflowCompleted { .. }))
                })
                .filter_map(|events| match events.first() {
                    Some(HistoryEvent::WorkflowStarted { handle, input }) => Some(OpenWorkflow {
                        handle: handle.clone(),
                        input: input.clone(),
                    }),
                    _ => None,
                })
                .collect();
            Ok(open)
        })
    }

    fn run_count<'a>(&'a self, payment_id: &'a str) -> BoxFuture<'a, Result<u32, PaymentError>> {
        Box::pin(async move {
            let table = self.table.lock().await;
            let count = table
                .events
                .values()
                .filter(|events| {
                    matches!(
                        events.first(),
                        Some(HistoryEvent::WorkflowStarted { input, .. }) if input.payment_id == payment_id
                    )
                })
                .count();
            Ok(count as u32)
        })
    }
}
