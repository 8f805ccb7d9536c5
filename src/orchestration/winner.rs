use crate::db::Repository;
use crate::domain::{Caller, RaffleId, SoldTicket, TimeMs, WinnerSelectionMethod};
use crate::engine::{draw, transition, LifecycleError, LifecycleEvent, WinnerError, WinnerPolicy};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Redraws allowed when the sold set changes between snapshot and commit.
const MAX_DRAW_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct WinnerSelector {
    repo: Arc<Repository>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WinnerSelection {
    pub raffle_id: RaffleId,
    pub method: WinnerSelectionMethod,
    pub ticket: SoldTicket,
    /// How the winning index was derived, as persisted on the raffle.
    pub seed: String,
}

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("raffle {0} not found")]
    RaffleNotFound(RaffleId),
    #[error("only the raffle creator can select the winner")]
    NotCreator,
    #[error("raffle uses {configured} selection, not {requested}")]
    MethodMismatch {
        configured: WinnerSelectionMethod,
        requested: WinnerSelectionMethod,
    },
    #[error("manual selection requires a ticket number")]
    MissingManualTicket,
    #[error("lottery selection requires a draw number")]
    MissingDrawNumber,
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Winner(#[from] WinnerError),
    #[error("sold tickets kept changing during selection")]
    SnapshotContended,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl WinnerSelector {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    /// Draw the winner of an active raffle and complete it.
    ///
    /// The completion is conditioned on the raffle still being active with the
    /// same number of sold tickets the draw saw; otherwise the draw is redone
    /// against a fresh snapshot.
    pub async fn select_winner(
        &self,
        raffle_id: &RaffleId,
        caller: &Caller,
        method: WinnerSelectionMethod,
        manual_ticket_number: Option<u32>,
    ) -> Result<WinnerSelection, SelectionError> {
        for attempt in 1..=MAX_DRAW_ATTEMPTS {
            let raffle = self
                .repo
                .get_raffle(raffle_id)
                .await?
                .ok_or_else(|| SelectionError::RaffleNotFound(raffle_id.clone()))?;

            if raffle.creator != caller.user_id {
                return Err(SelectionError::NotCreator);
            }
            transition(
                raffle.status,
                LifecycleEvent::SelectWinner,
                raffle.sold_count(),
            )?;
            if raffle.winner_selection_method != method {
                return Err(SelectionError::MethodMismatch {
                    configured: raffle.winner_selection_method,
                    requested: method,
                });
            }

            let policy = match method {
                WinnerSelectionMethod::Random => WinnerPolicy::Random,
                WinnerSelectionMethod::Lottery => WinnerPolicy::Lottery {
                    draw_number: raffle
                        .lottery_details
                        .as_ref()
                        .map(|d| d.draw_number.as_str())
                        .filter(|d| !d.trim().is_empty())
                        .ok_or(SelectionError::MissingDrawNumber)?,
                },
                WinnerSelectionMethod::Manual => WinnerPolicy::Manual {
                    ticket_number: manual_ticket_number
                        .ok_or(SelectionError::MissingManualTicket)?,
                },
            };

            let drawn = {
                let mut rng = rand::rng();
                draw(&raffle.sold_tickets, &policy, &mut rng, TimeMs::now())?
            };
            if drawn.seed.is_wall_clock() {
                warn!(
                    "Raffle {} lottery draw number is not numeric; winner seeded from {}",
                    raffle.id, drawn.seed
                );
            }

            let ticket = raffle.sold_tickets[drawn.index].clone();
            let seed = drawn.seed.to_string();
            let completed = self
                .repo
                .complete_raffle(
                    &raffle.id,
                    &ticket.buyer,
                    ticket.number,
                    &seed,
                    raffle.sold_count(),
                )
                .await?;

            if completed {
                info!(
                    "Raffle {} completed: ticket {} won by {} ({})",
                    raffle.id, ticket.number, ticket.buyer, seed
                );
                return Ok(WinnerSelection {
                    raffle_id: raffle.id,
                    method,
                    ticket,
                    seed,
                });
            }

            warn!(
                "Raffle {} changed during selection (attempt {}), redrawing",
                raffle.id, attempt
            );
        }

        Err(SelectionError::SnapshotContended)
    }
}
