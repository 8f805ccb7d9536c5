use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::AppState;
use crate::db::BuyerTicket;
use crate::domain::Caller;
use crate::error::AppError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveCountResponse {
    pub active_raffle_count: u32,
}

pub async fn active_raffle_count(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<ActiveCountResponse>, AppError> {
    let active_raffle_count = state.raffles.active_raffle_count(&caller.user_id).await?;
    Ok(Json(ActiveCountResponse {
        active_raffle_count,
    }))
}

#[derive(Debug, Serialize)]
pub struct TicketsResponse {
    pub tickets: Vec<BuyerTicket>,
}

pub async fn my_tickets(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<TicketsResponse>, AppError> {
    let tickets = state.raffles.tickets_for_buyer(&caller.user_id).await?;
    Ok(Json(TicketsResponse { tickets }))
}
