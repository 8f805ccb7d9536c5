//! Domain types for the raffle marketplace core.
//!
//! This module provides:
//! - Lossless MXN amounts via the Money wrapper
//! - Identifiers and time primitives
//! - Raffle, SoldTicket and the creation draft
//! - Versioned checkout metadata and pending checkouts
//! - Settlement outcomes and reconciliation records

pub mod checkout;
pub mod money;
pub mod primitives;
pub mod raffle;
pub mod settlement;

pub use checkout::{
    CheckoutIntent, CheckoutKind, CheckoutMetadata, MetadataError, PendingCheckout,
};
pub use money::{Money, MoneyError};
pub use primitives::{Caller, RaffleId, SessionId, TimeMs, UserId, UserRole};
pub use raffle::{
    DraftError, LotteryDetails, Raffle, RaffleDraft, RaffleImage, RaffleStatus, SoldTicket,
    WinnerSelectionMethod,
};
pub use settlement::{Reconciliation, ReconciliationReason, SettlementOutcome};
