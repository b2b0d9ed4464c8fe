use {
    super::errors::ApiError,
    crate::{
        AppState,
        adapters::signature::verify_signature,
        domain::{error::PaymentError, payment::PaymentStatus},
        services::reconciler::ReconcileResult,
    },
    axum::{Json, extract::State, http::HeaderMap},
    serde::Deserialize,
};

pub const SIGNATURE_HEADER: &str = "X-Gateway-Signature";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GatewayCallback {
    reference: String,
    status: String,
    #[serde(default)]
    gateway_reference: Option<String>,
    #[serde(default)]
    failure_reason: Option<String>,
}

/// Gateway outcome callback. The signature header is optional; when present
/// it must verify against the configured secret before the body is trusted.
#[tracing::instrument(
    name = "gateway_callback",
    skip_all,
    fields(reference = tracing::field::Empty, status = tracing::field::Empty)
)]
pub async fn gateway_callback_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<serde_json::Value>, ApiError> {
    if let Some(signature) = headers.get(SIGNATURE_HEADER) {
        let signature = signature
            .to_str()
            .map_err(|_| PaymentError::WebhookSignature("header is not ascii".into()))?;
        let secret = state.webhook_secret.as_deref().ok_or_else(|| {
            PaymentError::WebhookSignature("signed callback but no secret configured".into())
        })?;
        verify_signature(body.as_bytes(), signature, secret)?;
    }

    let callback: GatewayCallback = serde_json::from_str(&body).map_err(PaymentError::from)?;
    if callback.reference.trim().is_empty() {
        return Err(PaymentError::Validation("reference is required".into()).into());
    }
    let status = PaymentStatus::try_from(callback.status.as_str())?;

    tracing::Span::current()
        .record("reference", tracing::field::display(&callback.reference))
        .record("status", tracing::field::display(status));

    let outcome = state
        .reconciler
        .reconcile(
            &callback.reference,
            status,
            callback.gateway_reference,
            callback.failure_reason,
        )
        .await?;

    let (success, message) = match outcome {
        ReconcileResult::Applied { from } => (true, format!("status updated from {from} to {status}")),
        ReconcileResult::AlreadyApplied => (true, format!("status already {status}")),
        ReconcileResult::Rejected { current } => (
            false,
            format!("transition from {current} to {status} not allowed"),
        ),
        ReconcileResult::Superseded { current } => {
            (false, format!("payment already moved to {current}"))
        }
    };

    Ok(Json(serde_json::json!({
        "success": success,
        "message": message,
    })))
}
