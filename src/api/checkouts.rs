use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use super::AppState;
use crate::domain::{Caller, SessionId};
use crate::error::AppError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmResponse {
    pub session_id: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raffle_id: Option<String>,
}

/// Success-redirect target: settles the session if the webhook has not yet.
pub async fn confirm_checkout(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<ConfirmResponse>, AppError> {
    let confirmation = state
        .coordinator
        .confirm_checkout(&caller, &SessionId::new(session_id))
        .await?;

    Ok(Json(ConfirmResponse {
        session_id: confirmation.session_id.0,
        status: confirmation.status.as_str(),
        raffle_id: confirmation.raffle_id.map(|id| id.0),
    }))
}
