use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::db::RaffleSummary;
use crate::domain::{Caller, Raffle, RaffleDraft, RaffleId, RaffleStatus, UserId, WinnerSelectionMethod};
use crate::engine::{Availability, PriceQuote};
use crate::error::AppError;
use crate::orchestration::CreationOutcome;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRaffleResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raffle_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
    pub quote: PriceQuote,
}

pub async fn create_raffle(
    State(state): State<AppState>,
    caller: Caller,
    Json(draft): Json<RaffleDraft>,
) -> Result<(StatusCode, Json<CreateRaffleResponse>), AppError> {
    let outcome = state
        .coordinator
        .request_raffle_creation(&caller, draft)
        .await?;

    let (status, body) = match outcome {
        CreationOutcome::Created { raffle_id, quote } => (
            StatusCode::CREATED,
            CreateRaffleResponse {
                status: "created",
                raffle_id: Some(raffle_id.0),
                session_id: None,
                checkout_url: None,
                quote,
            },
        ),
        CreationOutcome::CheckoutRequired {
            session_id,
            checkout_url,
            quote,
        } => (
            StatusCode::OK,
            CreateRaffleResponse {
                status: "checkout_required",
                raffle_id: None,
                session_id: Some(session_id.0),
                checkout_url: Some(checkout_url),
                quote,
            },
        ),
    };
    Ok((status, Json(body)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub creator: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RaffleSummaryDto {
    pub id: String,
    pub creator: String,
    pub title: String,
    pub ticket_price: String,
    pub total_tickets: u32,
    pub sold_count: u32,
    pub status: RaffleStatus,
    pub is_promoted: bool,
    pub winner_selection_method: WinnerSelectionMethod,
    pub created_at: i64,
}

impl From<RaffleSummary> for RaffleSummaryDto {
    fn from(s: RaffleSummary) -> Self {
        let r = s.raffle;
        RaffleSummaryDto {
            id: r.id.0,
            creator: r.creator.0,
            title: r.title,
            ticket_price: r.ticket_price.to_canonical_string(),
            total_tickets: r.total_tickets,
            sold_count: s.sold_count,
            status: r.status,
            is_promoted: r.is_promoted,
            winner_selection_method: r.winner_selection_method,
            created_at: r.created_at.as_ms(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub raffles: Vec<RaffleSummaryDto>,
}

pub async fn list_raffles(
    Query(params): Query<ListQuery>,
    State(state): State<AppState>,
) -> Result<Json<ListResponse>, AppError> {
    let creator = match params.creator.as_deref() {
        Some("") | None => None,
        Some(c) => Some(UserId::new(c)),
    };
    let status = match params.status.as_deref() {
        Some("") | None => None,
        Some(s) => Some(s.parse::<RaffleStatus>().map_err(AppError::BadRequest)?),
    };

    let raffles = state
        .raffles
        .list_raffles(creator.as_ref(), status)
        .await?
        .into_iter()
        .map(RaffleSummaryDto::from)
        .collect();
    Ok(Json(ListResponse { raffles }))
}

pub async fn get_raffle(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Raffle>, AppError> {
    let raffle = state.raffles.get_raffle_status(&RaffleId::new(id)).await?;
    Ok(Json(raffle))
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub numbers: String,
}

pub async fn check_availability(
    Path(id): Path<String>,
    Query(params): Query<AvailabilityQuery>,
    State(state): State<AppState>,
) -> Result<Json<Availability>, AppError> {
    let numbers = parse_numbers(&params.numbers)?;
    let reservation = state
        .ledger
        .reserve_and_attempt(&RaffleId::new(id), &numbers)
        .await?;
    Ok(Json(reservation.availability))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub ticket_numbers: Vec<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseResponse {
    pub session_id: String,
    pub checkout_url: String,
    pub amount: String,
}

pub async fn purchase_tickets(
    Path(id): Path<String>,
    State(state): State<AppState>,
    caller: Caller,
    Json(body): Json<PurchaseRequest>,
) -> Result<Json<PurchaseResponse>, AppError> {
    let checkout = state
        .coordinator
        .request_ticket_purchase(&caller, &RaffleId::new(id), &body.ticket_numbers)
        .await?;
    Ok(Json(PurchaseResponse {
        session_id: checkout.session_id.0,
        checkout_url: checkout.checkout_url,
        amount: checkout.amount.to_canonical_string(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinnerRequest {
    pub method: WinnerSelectionMethod,
    pub ticket_number: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WinnerResponse {
    pub raffle_id: String,
    pub method: WinnerSelectionMethod,
    pub winning_ticket_number: u32,
    pub winner: String,
    pub seed: String,
}

pub async fn select_winner(
    Path(id): Path<String>,
    State(state): State<AppState>,
    caller: Caller,
    Json(body): Json<WinnerRequest>,
) -> Result<Json<WinnerResponse>, AppError> {
    let selection = state
        .selector
        .select_winner(&RaffleId::new(id), &caller, body.method, body.ticket_number)
        .await?;
    Ok(Json(WinnerResponse {
        raffle_id: selection.raffle_id.0,
        method: selection.method,
        winning_ticket_number: selection.ticket.number,
        winner: selection.ticket.buyer.0,
        seed: selection.seed,
    }))
}

pub async fn delete_raffle(
    Path(id): Path<String>,
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<serde_json::Value>, AppError> {
    let raffle_id = RaffleId::new(id);
    state.raffles.delete_raffle(&raffle_id, &caller).await?;
    Ok(Json(serde_json::json!({ "id": raffle_id, "status": "deleted" })))
}

fn parse_numbers(raw: &str) -> Result<Vec<u32>, AppError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u32>()
                .map_err(|_| AppError::BadRequest(format!("Invalid ticket number: {}", s)))
        })
        .collect()
}
