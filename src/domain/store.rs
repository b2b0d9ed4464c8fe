use super::{
    BoxFuture,
    error::PaymentError,
    payment::{NewPaymentRecord, PaymentRecord, PaymentStatus, StatusUpdate},
};

/// Accessor over the persisted payment record.
///
/// `update_status` is the only mutation after creation and is a
/// compare-and-swap: it writes iff the stored status equals `expected`, and
/// reports `false` (not an error) otherwise. Orchestrator and reconciler both
/// go through it, which is what keeps their concurrent writes safe.
pub trait StatusStore: Send + Sync {
    /// Insert a `Pending` record. Returns `false` if the id already exists.
    /// A different id reusing an existing reference is a validation error.
    fn create_pending<'a>(
        &'a self,
        record: &'a NewPaymentRecord,
    ) -> BoxFuture<'a, Result<bool, PaymentError>>;

    fn find_by_id<'a>(
        &'a self,
        id: &'a str,
    ) -> BoxFuture<'a, Result<Option<PaymentRecord>, PaymentError>>;

    fn find_by_reference<'a>(
        &'a self,
        reference: &'a str,
    ) -> BoxFuture<'a, Result<Option<PaymentRecord>, PaymentError>>;

    fn update_status<'a>(
        &'a self,
        id: &'a str,
        expected: PaymentStatus,
        new: PaymentStatus,
        update: &'a StatusUpdate,
    ) -> BoxFuture<'a, Result<bool, PaymentError>>;
}
