use {
    crate::domain::{
        BoxFuture,
        error::PaymentError,
        history::{HistoryEvent, HistoryStore, OpenWorkflow},
        id::WorkflowId,
    },
    sqlx::PgPool,
};

/// Append-only workflow event log in `workflow_history`.
#[derive(Clone)]
pub struct PgHistoryStore {
    pool: PgPool,
}

impl PgHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn append_inner(
        &self,
        workflow_id: &WorkflowId,
        event: &HistoryEvent,
    ) -> Result<(), PaymentError> {
        let payment_id = match event {
            HistoryEvent::WorkflowStarted { input, .. } => Some(input.payment_id.as_str()),
            _ => None,
        };
        let payload = serde_json::to_value(event)?;

        sqlx::query(
            r#"
            INSERT INTO workflow_history (workflow_id, payment_id, event_type, payload)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(workflow_id.as_str())
        .bind(payment_id)
        .bind(event.kind())
        .bind(&payload)
        .execute(&self.pool)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => {
                PaymentError::Start(format!("workflow already exists: {workflow_id}"))
            }
            _ => PaymentError::Database(e),
        })?;

        Ok(())
    }

    async fn load_inner(&self, workflow_id: &WorkflowId) -> Result<Vec<HistoryEvent>, PaymentError> {
        let rows: Vec<serde_json::Value> = sqlx::query_scalar(
            "SELECT payload FROM workflow_history WHERE workflow_id = $1 ORDER BY id",
        )
        .bind(workflow_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|payload| serde_json::from_value(payload).map_err(PaymentError::from))
            .collect()
    }

    async fn open_workflows_inner(&self) -> Result<Vec<OpenWorkflow>, PaymentError> {
        let rows: Vec<serde_json::Value> = sqlx::query_scalar(
            r#"
            SELECT s.payload FROM workflow_history s
            WHERE s.event_type = 'workflow_started'
              AND NOT EXISTS (
                  SELECT 1 FROM workflow_history c
                  WHERE c.workflow_id = s.workflow_id AND c.event_type = 'workflow_completed'
              )
            ORDER BY s.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut open = Vec::with_capacity(rows.len());
        for payload in rows {
            if let HistoryEvent::WorkflowStarted { handle, input } = serde_json::from_value(payload)? {
                open.push(OpenWorkflow { handle, input });
            }
        }
        Ok(open)
    }

    async fn run_count_inner(&self, payment_id: &str) -> Result<u32, PaymentError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM workflow_history WHERE event_type = 'workflow_started' AND payment_id = $1",
        )
        .bind(payment_id)
        .fetch_one(&self.pool)
        .await?;

        u32::try_from(count).map_err(|_| PaymentError::Store(format!("run count overflow: {count}")))
    }
}

impl HistoryStore for PgHistoryStore {
    fn append<'a>(
        &'a self,
        workflow_id: &'a WorkflowId,
        event: &'a HistoryEvent,
    ) -> BoxFuture<'a, Result<(), PaymentError>> {
        Box::pin(self.append_inner(workflow_id, event))
    }

    fn load<'a>(
        &'a self,
        workflow_id: &'a WorkflowId,
    ) -> BoxFuture<'a, Result<Vec<HistoryEvent>, PaymentError>> {
        Box::pin(self.load_inner(workflow_id))
    }

    fn open_workflows(&self) -> BoxFuture<'_, Result<Vec<OpenWorkflow>, PaymentError>> {
        Box::pin(self.open_workflows_inner())
    }

    fn run_count<'a>(&'a self, payment_id: &'a str) -> BoxFuture<'a, Result<u32, PaymentError>> {
        Box::pin(self.run_count_inner(payment_id))
    }
}
