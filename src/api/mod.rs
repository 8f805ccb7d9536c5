pub mod admin;
pub mod caller;
pub mod checkouts;
pub mod health;
pub mod quotes;
pub mod raffles;
pub mod users;
pub mod webhooks;

use crate::config::Config;
use crate::db::Repository;
use crate::gateway::PaymentGateway;
use crate::orchestration::{RaffleService, SettlementCoordinator, TicketLedger, WinnerSelector};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Config,
    pub ledger: TicketLedger,
    pub coordinator: Arc<SettlementCoordinator>,
    pub selector: Arc<WinnerSelector>,
    pub raffles: Arc<RaffleService>,
}

impl AppState {
    pub fn new(repo: Arc<Repository>, gateway: Arc<dyn PaymentGateway>, config: Config) -> Self {
        let coordinator = SettlementCoordinator::new(repo.clone(), gateway, config.clone());
        Self {
            ledger: TicketLedger::new(repo.clone()),
            coordinator: Arc::new(coordinator),
            selector: Arc::new(WinnerSelector::new(repo.clone())),
            raffles: Arc::new(RaffleService::new(repo.clone())),
            repo,
            config,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/quote", get(quotes::get_quote))
        .route(
            "/v1/raffles",
            get(raffles::list_raffles).post(raffles::create_raffle),
        )
        .route("/v1/raffles/:id", get(raffles::get_raffle))
        .route(
            "/v1/raffles/:id/availability",
            get(raffles::check_availability),
        )
        .route("/v1/raffles/:id/tickets", post(raffles::purchase_tickets))
        .route("/v1/raffles/:id/winner", post(raffles::select_winner))
        .route("/v1/raffles/:id/delete", post(raffles::delete_raffle))
        .route("/v1/webhooks/payment", post(webhooks::payment_webhook))
        .route(
            "/v1/checkouts/:session_id/confirm",
            get(checkouts::confirm_checkout),
        )
        .route(
            "/v1/users/me/active-raffle-count",
            get(users::active_raffle_count),
        )
        .route("/v1/users/me/tickets", get(users::my_tickets))
        .route(
            "/v1/admin/reconciliations",
            get(admin::list_reconciliations),
        )
        .layer(cors)
        .with_state(state)
}
