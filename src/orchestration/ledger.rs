use crate::db::{Repository, TicketRejection};
use crate::domain::{Raffle, RaffleId, RaffleStatus, SoldTicket, UserId};
use crate::engine::{ensure_active, partition_requested, Availability};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

/// Availability checks and the atomic ticket commit.
#[derive(Debug, Clone)]
pub struct TicketLedger {
    repo: Arc<Repository>,
}

/// Raffle snapshot together with the verdict on the requested numbers.
#[derive(Debug, Clone)]
pub struct Reservation {
    pub raffle: Raffle,
    pub availability: Availability,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("raffle {0} not found")]
    RaffleNotFound(RaffleId),
    #[error("raffle is {0}, not active")]
    RaffleNotActive(RaffleStatus),
    #[error("tickets unavailable: {numbers:?}")]
    TicketUnavailable { numbers: Vec<u32> },
    #[error("no ticket numbers requested")]
    EmptyRequest,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl LedgerError {
    pub(crate) fn from_rejection(raffle_id: &RaffleId, rejection: TicketRejection) -> Self {
        match rejection {
            TicketRejection::RaffleMissing => LedgerError::RaffleNotFound(raffle_id.clone()),
            TicketRejection::RaffleNotActive(status) => LedgerError::RaffleNotActive(status),
            TicketRejection::Unavailable(numbers) => LedgerError::TicketUnavailable { numbers },
        }
    }
}

impl TicketLedger {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    /// Check `requested` against the current snapshot. Reserves nothing; the
    /// commit re-checks at write time.
    pub async fn reserve_and_attempt(
        &self,
        raffle_id: &RaffleId,
        requested: &[u32],
    ) -> Result<Reservation, LedgerError> {
        if requested.is_empty() {
            return Err(LedgerError::EmptyRequest);
        }

        let raffle = self
            .repo
            .get_raffle(raffle_id)
            .await?
            .ok_or_else(|| LedgerError::RaffleNotFound(raffle_id.clone()))?;
        ensure_active(raffle.status).map_err(|_| LedgerError::RaffleNotActive(raffle.status))?;

        let sold: HashSet<u32> = raffle.sold_tickets.iter().map(|t| t.number).collect();
        let availability = partition_requested(raffle.total_tickets, &sold, requested);

        Ok(Reservation {
            raffle,
            availability,
        })
    }

    /// Like `reserve_and_attempt`, but fails unless every number is available.
    pub async fn require_available(
        &self,
        raffle_id: &RaffleId,
        requested: &[u32],
    ) -> Result<Raffle, LedgerError> {
        let reservation = self.reserve_and_attempt(raffle_id, requested).await?;
        if !reservation.availability.rejected.is_empty() {
            return Err(LedgerError::TicketUnavailable {
                numbers: reservation.availability.rejected,
            });
        }
        Ok(reservation.raffle)
    }

    /// Sell `numbers` to `buyer`: all of them, or none.
    pub async fn commit(
        &self,
        raffle_id: &RaffleId,
        numbers: &[u32],
        buyer: &UserId,
        transaction_id: Option<&str>,
    ) -> Result<Vec<SoldTicket>, LedgerError> {
        if numbers.is_empty() {
            return Err(LedgerError::EmptyRequest);
        }

        self.repo
            .commit_tickets(raffle_id, buyer, numbers, transaction_id)
            .await?
            .map_err(|rejection| LedgerError::from_rejection(raffle_id, rejection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::test_support::{seed_raffle, setup};

    #[tokio::test]
    async fn test_reserve_partitions() {
        let (repo, _dir) = setup().await;
        let repo = Arc::new(repo);
        let raffle = seed_raffle(&repo, "ana", 10).await;
        let ledger = TicketLedger::new(repo.clone());

        ledger
            .commit(&raffle.id, &[4], &UserId::new("a"), None)
            .await
            .unwrap();

        let r = ledger
            .reserve_and_attempt(&raffle.id, &[3, 4, 11])
            .await
            .unwrap();
        assert_eq!(r.availability.accepted, vec![3]);
        assert_eq!(r.availability.rejected, vec![4, 11]);

        match ledger.require_available(&raffle.id, &[4]).await {
            Err(LedgerError::TicketUnavailable { numbers }) => assert_eq!(numbers, vec![4]),
            other => panic!("expected TicketUnavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_raffle_and_empty_request() {
        let (repo, _dir) = setup().await;
        let ledger = TicketLedger::new(Arc::new(repo));
        assert!(matches!(
            ledger
                .reserve_and_attempt(&RaffleId::new("ghost"), &[1])
                .await,
            Err(LedgerError::RaffleNotFound(_))
        ));
        assert!(matches!(
            ledger.reserve_and_attempt(&RaffleId::new("ghost"), &[]).await,
            Err(LedgerError::EmptyRequest)
        ));
        assert!(matches!(
            ledger
                .commit(&RaffleId::new("ghost"), &[1], &UserId::new("a"), None)
                .await,
            Err(LedgerError::RaffleNotFound(id)) if id.as_str() == "ghost"
        ));
    }

    #[tokio::test]
    async fn test_completed_raffle_rejects_commit() {
        let (repo, _dir) = setup().await;
        let repo = Arc::new(repo);
        let raffle = seed_raffle(&repo, "ana", 10).await;
        let ledger = TicketLedger::new(repo.clone());
        let buyer = UserId::new("a");

        ledger.commit(&raffle.id, &[1], &buyer, None).await.unwrap();
        repo.complete_raffle(&raffle.id, &buyer, 1, "random", 1)
            .await
            .unwrap();

        assert!(matches!(
            ledger.commit(&raffle.id, &[2], &buyer, None).await,
            Err(LedgerError::RaffleNotActive(RaffleStatus::Completed))
        ));
        assert!(matches!(
            ledger.reserve_and_attempt(&raffle.id, &[2]).await,
            Err(LedgerError::RaffleNotActive(RaffleStatus::Completed))
        ));
        assert_eq!(repo.sold_tickets(&raffle.id).await.unwrap().len(), 1);
    }
}
