use {
    crate::domain::error::PaymentError,
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
};

/// HTTP face of `PaymentError`.
pub struct ApiError(pub PaymentError);

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            PaymentError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            PaymentError::WebhookSignature(msg) => {
                tracing::warn!("rejected callback signature: {msg}");
                (StatusCode::BAD_REQUEST, "invalid webhook signature".to_string())
            }
            PaymentError::Serialization(err) => {
                (StatusCode::BAD_REQUEST, format!("malformed payload: {err}"))
            }
            PaymentError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{what} not found")),
            PaymentError::Start(msg) => {
                tracing::error!("workflow start failed: {msg}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "workflow could not be started".to_string(),
                )
            }
            other => {
                tracing::error!("internal error: {other}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "success": false,
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}
