pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod orchestration;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    Caller, Money, Raffle, RaffleDraft, RaffleId, RaffleStatus, SessionId, SoldTicket, TimeMs,
    UserId, UserRole, WinnerSelectionMethod,
};
pub use error::AppError;
pub use gateway::{MockGateway, PaymentGateway, StripeGateway};
