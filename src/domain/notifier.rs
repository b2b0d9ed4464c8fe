use super::{BoxFuture, error::PaymentError, workflow::PaymentWorkflowInput};

/// Outbound "payment completed" notification to the merchant.
pub trait MerchantNotifier: Send + Sync {
    fn notify<'a>(
        &'a self,
        input: &'a PaymentWorkflowInput,
        transaction_id: &'a str,
    ) -> BoxFuture<'a, Result<(), PaymentError>>;
}
