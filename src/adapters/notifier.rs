use {
    crate::domain::{
        BoxFuture, error::PaymentError, notifier::MerchantNotifier, workflow::PaymentWorkflowInput,
    },
    std::time::Duration,
};

/// Simulated merchant notification: waits `latency`, then logs the payload
/// that would be posted to the merchant's endpoint.
#[derive(Debug, Clone)]
pub struct LoggingNotifier {
    latency: Duration,
}

impl LoggingNotifier {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl MerchantNotifier for LoggingNotifier {
    fn notify<'a>(
        &'a self,
        input: &'a PaymentWorkflowInput,
        transaction_id: &'a str,
    ) -> BoxFuture<'a, Result<(), PaymentError>> {
        Box::pin(async move {
            tokio::time::sleep(self.latency).await;
            let payload = serde_json::json!({
                "event": "payment.completed",
                "paymentId": input.payment_id,
                "reference": input.reference,
                "amount": input.amount,
                "currency": input.currency,
                "transactionId": transaction_id,
                "metadata": input.metadata,
            });
            tracing::info!(
                merchant_id = %input.merchant_id,
                payload = %payload,
                "merchant notified"
            );
            Ok(())
        })
    }
}
