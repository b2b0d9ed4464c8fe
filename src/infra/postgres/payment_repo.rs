use {
    super::audit_repo::insert_audit_entry,
    crate::domain::{
        BoxFuture,
        error::PaymentError,
        payment::{NewPaymentRecord, PaymentRecord, PaymentStatus, StatusUpdate},
        store::StatusStore,
    },
    chrono::{DateTime, Utc},
    sqlx::PgPool,
};

type PaymentRow = (
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
);

const SELECT_PAYMENT: &str = "SELECT id, reference, status, gateway_reference, failure_reason, initiated_at, completed_at FROM payments";

fn record_from_row(row: PaymentRow) -> Result<PaymentRecord, PaymentError> {
    let (id, reference, status, gateway_reference, failure_reason, initiated_at, completed_at) =
        row;
    Ok(PaymentRecord {
        id,
        reference,
        status: PaymentStatus::try_from(status.as_str())?,
        gateway_reference,
        failure_reason,
        initiated_at,
        completed_at,
    })
}

#[derive(Clone)]
pub struct PgStatusStore {
    pool: PgPool,
}

impl PgStatusStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn create_pending_inner(&self, record: &NewPaymentRecord) -> Result<bool, PaymentError> {
        let inserted: Option<bool> = sqlx::query_scalar(
            r#"
            INSERT INTO payments (id, reference, amount, currency, merchant_id, payment_method_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            RETURNING true
            "#,
        )
        .bind(&record.id)
        .bind(&record.reference)
        .bind(record.amount)
        .bind(&record.currency)
        .bind(&record.merchant_id)
        .bind(&record.payment_method_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => PaymentError::Validation(format!(
                "reference already in use: {}",
                record.reference
            )),
            _ => PaymentError::Database(e),
        })?;

        Ok(inserted.is_some())
    }

    async fn find_one(
        &self,
        column: &str,
        value: &str,
    ) -> Result<Option<PaymentRecord>, PaymentError> {
        let sql = format!("{SELECT_PAYMENT} WHERE {column} = $1");
        sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?
            .map(record_from_row)
            .transpose()
    }

    /// Compare-and-swap on `status`. The audit row is written in the same
    /// transaction, so it exists iff the status actually changed.
    async fn update_status_inner(
        &self,
        id: &str,
        expected: PaymentStatus,
        new: PaymentStatus,
        update: &StatusUpdate,
    ) -> Result<bool, PaymentError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $3,
                gateway_reference = COALESCE($4, gateway_reference),
                failure_reason = COALESCE($5, failure_reason),
                completed_at = CASE WHEN $6 THEN COALESCE(completed_at, now()) ELSE completed_at END,
                updated_at = now()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(expected.as_str())
        .bind(new.as_str())
        .bind(update.gateway_reference.as_deref())
        .bind(update.failure_reason.as_deref())
        .bind(new.is_terminal())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.commit().await?;
            return Ok(false);
        }

        let audit = update.audit_entry(id, expected, new);
        insert_audit_entry(&mut tx, &audit).await?;
        tx.commit().await?;
        Ok(true)
    }
}

impl StatusStore for PgStatusStore {
    fn create_pending<'a>(
        &'a self,
        record: &'a NewPaymentRecord,
    ) -> BoxFuture<'a, Result<bool, PaymentError>> {
        Box::pin(self.create_pending_inner(record))
    }

    fn find_by_id<'a>(
        &'a self,
        id: &'a str,
    ) -> BoxFuture<'a, Result<Option<PaymentRecord>, PaymentError>> {
        Box::pin(self.find_one("id", id))
    }

    fn find_by_reference<'a>(
        &'a self,
        reference: &'a str,
    ) -> BoxFuture<'a, Result<Option<PaymentRecord>, PaymentError>> {
        Box::pin(self.find_one("reference", reference))
    }

    fn update_status<'a>(
        &'a self,
        id: &'a str,
        expected: PaymentStatus,
        new: PaymentStatus,
        update: &'a StatusUpdate,
    ) -> BoxFuture<'a, Result<bool, PaymentError>> {
        Box::pin(self.update_status_inner(id, expected, new, update))
    }
}
