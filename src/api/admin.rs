use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::domain::{Caller, Reconciliation};
use crate::error::AppError;

const DEFAULT_LIMIT: u32 = 100;
const MAX_LIMIT: u32 = 1000;

#[derive(Debug, Deserialize)]
pub struct ReconciliationQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ReconciliationResponse {
    pub reconciliations: Vec<Reconciliation>,
}

/// Settlement anomalies awaiting manual follow-up, newest first.
pub async fn list_reconciliations(
    Query(params): Query<ReconciliationQuery>,
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<ReconciliationResponse>, AppError> {
    if !caller.is_admin() {
        return Err(AppError::Forbidden("admin role required".into()));
    }
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let reconciliations = state.repo.list_reconciliations(limit).await?;
    Ok(Json(ReconciliationResponse { reconciliations }))
}
