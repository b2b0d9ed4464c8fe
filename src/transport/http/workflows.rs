use {
    super::errors::ApiError,
    crate::{
        AppState,
        domain::{
            error::PaymentError, id::WorkflowId, payment::NewPaymentRecord,
            workflow::{PaymentWorkflowInput, PaymentWorkflowResult},
        },
    },
    axum::{
        Json,
        extract::{Path, State},
        http::StatusCode,
    },
};

/// Start command. The Pending record is created here, ahead of the workflow,
/// so a redelivered command finds its record and joins the running workflow.
#[tracing::instrument(name = "start_payment", skip_all, fields(payment_id = tracing::field::Empty))]
pub async fn start_payment_handler(
    State(state): State<AppState>,
    body: String,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let input: PaymentWorkflowInput = serde_json::from_str(&body).map_err(PaymentError::from)?;
    tracing::Span::current().record("payment_id", tracing::field::display(&input.payment_id));

    // Incomplete commands skip the insert and fail in the validation step.
    if !input.payment_id.trim().is_empty() && !input.reference.trim().is_empty() {
        let created = state
            .store
            .create_pending(&NewPaymentRecord {
                id: input.payment_id.clone(),
                reference: input.reference.clone(),
                amount: input.amount,
                currency: input.currency.clone(),
                merchant_id: input.merchant_id.clone(),
                payment_method_id: input.payment_method_id.clone(),
            })
            .await?;
        if !created {
            tracing::debug!("payment record already exists");
        }
    }

    let handle = state.orchestrator.start(input).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "workflowId": handle.workflow_id,
            "runId": handle.run_id,
        })),
    ))
}

pub async fn workflow_status_handler(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let workflow_id = WorkflowId::parse(workflow_id);
    let status = state.orchestrator.query_status(&workflow_id).await?;
    Ok(Json(serde_json::json!({
        "workflowId": workflow_id,
        "status": status,
    })))
}

pub async fn cancel_workflow_handler(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let workflow_id = WorkflowId::parse(workflow_id);
    state.orchestrator.signal_cancel(&workflow_id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "success": true })),
    ))
}

/// Blocks until the workflow reaches a terminal result.
pub async fn workflow_result_handler(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
) -> Result<Json<PaymentWorkflowResult>, ApiError> {
    let workflow_id = WorkflowId::parse(workflow_id);
    let result = state.orchestrator.await_result(&workflow_id).await?;
    Ok(Json(result))
}
