//! Raffle lifecycle state machine.
//!
//! ```text
//! active --select winner--> completed
//! active --delete (no sold tickets)--> deleted
//! ```
//! `completed` and `deleted` are terminal.

use crate::domain::RaffleStatus;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    SelectWinner,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("raffle already completed")]
    AlreadyCompleted,
    #[error("raffle was deleted")]
    Deleted,
    #[error("raffle has {0} sold tickets and cannot be deleted")]
    HasSoldTickets(usize),
    #[error("raffle has no sold tickets")]
    NoSoldTickets,
}

/// Fails unless the raffle is still `active`.
pub fn ensure_active(status: RaffleStatus) -> Result<(), LifecycleError> {
    match status {
        RaffleStatus::Active => Ok(()),
        RaffleStatus::Completed => Err(LifecycleError::AlreadyCompleted),
        RaffleStatus::Deleted => Err(LifecycleError::Deleted),
    }
}

/// Next status for `event`, given the current status and sold-ticket count.
pub fn transition(
    status: RaffleStatus,
    event: LifecycleEvent,
    sold_count: usize,
) -> Result<RaffleStatus, LifecycleError> {
    ensure_active(status)?;
    match event {
        LifecycleEvent::SelectWinner if sold_count == 0 => Err(LifecycleError::NoSoldTickets),
        LifecycleEvent::SelectWinner => Ok(RaffleStatus::Completed),
        LifecycleEvent::Delete if sold_count > 0 => {
            Err(LifecycleError::HasSoldTickets(sold_count))
        }
        LifecycleEvent::Delete => Ok(RaffleStatus::Deleted),
    }
}
