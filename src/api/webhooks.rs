use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use super::AppState;
use crate::error::AppError;
use crate::gateway::signature::SIGNATURE_HEADER;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub received: bool,
    pub event_id: String,
    pub status: &'static str,
}

/// Gateway callback. The body is taken raw; the signature covers its exact bytes.
///
/// Anything that verified is acknowledged with 200, including deliveries that
/// ended up in the reconciliation queue. Non-2xx makes the gateway redeliver.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let ack = state
        .coordinator
        .handle_payment_webhook(&body, signature)
        .await?;

    Ok(Json(WebhookResponse {
        received: true,
        event_id: ack.event_id,
        status: ack.status.as_str(),
    }))
}
