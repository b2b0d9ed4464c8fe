use super::{
    BoxFuture,
    error::PaymentError,
    workflow::{PaymentWorkflowInput, ProcessingResult},
};

/// External authorization boundary.
///
/// Transport-level problems are returned as `Err` and are retried by the
/// activity executor. A definitive decline is `Ok` with `success: false`.
pub trait GatewayAdapter: Send + Sync {
    /// `payment_id` is the idempotency key: a repeat call for a payment that
    /// already holds a live authorization returns that authorization.
    fn authorize<'a>(
        &'a self,
        input: &'a PaymentWorkflowInput,
    ) -> BoxFuture<'a, Result<ProcessingResult, PaymentError>>;

    /// Release a previously granted authorization. Used only for compensation.
    fn reverse<'a>(&'a self, transaction_id: &'a str) -> BoxFuture<'a, Result<(), PaymentError>>;
}
