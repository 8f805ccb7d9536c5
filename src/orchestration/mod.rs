//! Services that combine the pure engine with persistence and the gateway.

pub mod ledger;
pub mod raffles;
pub mod settlement;
pub mod sweeper;
pub mod winner;

pub use ledger::{LedgerError, Reservation, TicketLedger};
pub use raffles::{RaffleError, RaffleService};
pub use settlement::{
    Confirmation, CreationOutcome, PurchaseCheckout, SettlementCoordinator, SettlementError,
    SettlementStatus, WebhookAck,
};
pub use sweeper::CheckoutSweeper;
pub use winner::{SelectionError, WinnerSelection, WinnerSelector};
