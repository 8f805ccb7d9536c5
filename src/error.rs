use crate::engine::{LifecycleError, PricingError, WinnerError};
use crate::gateway::GatewayError;
use crate::orchestration::{LedgerError, RaffleError, SelectionError, SettlementError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Tickets unavailable: {0:?}")]
    TicketsUnavailable(Vec<u32>),
    #[error("Payment gateway error: {0}")]
    BadGateway(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<PricingError> for AppError {
    fn from(err: PricingError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        AppError::Conflict(err.to_string())
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound(_) => AppError::NotFound(err.to_string()),
            other => AppError::BadGateway(other.to_string()),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::RaffleNotFound(_) => AppError::NotFound(err.to_string()),
            LedgerError::RaffleNotActive(_) => AppError::Conflict(err.to_string()),
            LedgerError::TicketUnavailable { numbers } => AppError::TicketsUnavailable(numbers),
            LedgerError::EmptyRequest => AppError::BadRequest(err.to_string()),
            LedgerError::Db(e) => e.into(),
        }
    }
}

impl From<SettlementError> for AppError {
    fn from(err: SettlementError) -> Self {
        match err {
            SettlementError::Draft(e) => AppError::BadRequest(e.to_string()),
            SettlementError::Pricing(e) => e.into(),
            SettlementError::Amount(e) => AppError::BadRequest(e.to_string()),
            SettlementError::Ledger(e) => e.into(),
            SettlementError::Metadata(e) => AppError::BadRequest(e.to_string()),
            SettlementError::Gateway(e) => e.into(),
            SettlementError::Signature(e) => AppError::BadRequest(e.to_string()),
            SettlementError::Forbidden(msg) => AppError::Forbidden(msg),
            e @ SettlementError::Persistence { .. } => AppError::Internal(e.to_string()),
            SettlementError::Db(e) => e.into(),
        }
    }
}

impl From<SelectionError> for AppError {
    fn from(err: SelectionError) -> Self {
        match err {
            SelectionError::RaffleNotFound(_) => AppError::NotFound(err.to_string()),
            SelectionError::NotCreator => AppError::Forbidden(err.to_string()),
            SelectionError::MethodMismatch { .. }
            | SelectionError::MissingManualTicket
            | SelectionError::MissingDrawNumber => AppError::BadRequest(err.to_string()),
            SelectionError::Lifecycle(e) => e.into(),
            SelectionError::Winner(e @ WinnerError::TicketNotFound(_)) => {
                AppError::NotFound(e.to_string())
            }
            SelectionError::Winner(e) => AppError::Conflict(e.to_string()),
            SelectionError::SnapshotContended => AppError::Conflict(err.to_string()),
            SelectionError::Db(e) => e.into(),
        }
    }
}

impl From<RaffleError> for AppError {
    fn from(err: RaffleError) -> Self {
        match err {
            RaffleError::NotFound(_) => AppError::NotFound(err.to_string()),
            RaffleError::Forbidden => AppError::Forbidden(err.to_string()),
            RaffleError::Lifecycle(e) => e.into(),
            RaffleError::Db(e) => e.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": msg })),
            AppError::Internal(msg) => {
                tracing::error!("Request failed: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": msg }))
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": msg })),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg })),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            AppError::TicketsUnavailable(numbers) => (
                StatusCode::CONFLICT,
                json!({
                    "error": "Some tickets are no longer available",
                    "rejected": numbers,
                }),
            ),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, json!({ "error": msg })),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RaffleId, RaffleStatus};

    #[tokio::test]
    async fn test_unavailable_tickets_body() {
        let err: AppError = LedgerError::TicketUnavailable { numbers: vec![4] }.into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["rejected"], json!([4]));
    }

    #[test]
    fn test_status_mapping() {
        let cases: Vec<(AppError, StatusCode)> = vec![
            (
                LedgerError::RaffleNotFound(RaffleId::new("x")).into(),
                StatusCode::NOT_FOUND,
            ),
            (
                LedgerError::RaffleNotActive(RaffleStatus::Completed).into(),
                StatusCode::CONFLICT,
            ),
            (SelectionError::NotCreator.into(), StatusCode::FORBIDDEN),
            (
                GatewayError::NotFound("cs_1".into()).into(),
                StatusCode::NOT_FOUND,
            ),
            (GatewayError::RateLimited.into(), StatusCode::BAD_GATEWAY),
            (
                SettlementError::Signature(crate::gateway::SignatureError::MissingHeader).into(),
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
