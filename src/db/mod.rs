//! Database module for SQLite operations.
//!
//! This module provides:
//! - Database initialization and migrations
//! - SQLite pragma configuration
//! - Repository layer with the conditional writes the ledger and settlement rely on

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::{
    BuyerTicket, RaffleSummary, Repository, SettleResult, SettlementRecord, TicketRejection,
};
