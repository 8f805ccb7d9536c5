use crate::db::{BuyerTicket, RaffleSummary, Repository};
use crate::domain::{Caller, Raffle, RaffleId, RaffleStatus, UserId};
use crate::engine::{transition, LifecycleError, LifecycleEvent};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Read access to raffles plus the delete transition.
#[derive(Debug, Clone)]
pub struct RaffleService {
    repo: Arc<Repository>,
}

#[derive(Debug, Error)]
pub enum RaffleError {
    #[error("raffle {0} not found")]
    NotFound(RaffleId),
    #[error("only the creator or an admin can delete a raffle")]
    Forbidden,
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl RaffleService {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    /// Current snapshot, sold tickets in insertion order.
    pub async fn get_raffle_status(&self, raffle_id: &RaffleId) -> Result<Raffle, RaffleError> {
        self.repo
            .get_raffle(raffle_id)
            .await?
            .ok_or_else(|| RaffleError::NotFound(raffle_id.clone()))
    }

    pub async fn list_raffles(
        &self,
        creator: Option<&UserId>,
        status: Option<RaffleStatus>,
    ) -> Result<Vec<RaffleSummary>, RaffleError> {
        Ok(self.repo.list_raffles(creator, status).await?)
    }

    pub async fn active_raffle_count(&self, user: &UserId) -> Result<u32, RaffleError> {
        Ok(self.repo.count_active_raffles(user).await?)
    }

    pub async fn tickets_for_buyer(&self, user: &UserId) -> Result<Vec<BuyerTicket>, RaffleError> {
        Ok(self.repo.tickets_for_buyer(user).await?)
    }

    /// Delete an active raffle that has not sold any ticket.
    pub async fn delete_raffle(
        &self,
        raffle_id: &RaffleId,
        caller: &Caller,
    ) -> Result<(), RaffleError> {
        let raffle = self.get_raffle_status(raffle_id).await?;
        if raffle.creator != caller.user_id && !caller.is_admin() {
            return Err(RaffleError::Forbidden);
        }
        transition(raffle.status, LifecycleEvent::Delete, raffle.sold_count())?;

        if self.repo.delete_raffle_if_unsold(raffle_id).await? {
            info!("Raffle {} deleted by {}", raffle_id, caller.user_id);
            return Ok(());
        }

        // lost a race with a sale or a completion; report the state that won
        let current = self.get_raffle_status(raffle_id).await?;
        transition(current.status, LifecycleEvent::Delete, current.sold_count())?;
        Err(LifecycleError::HasSoldTickets(current.sold_count()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::test_support::{seed_raffle, setup};
    use crate::domain::UserRole;

    fn caller(id: &str, role: UserRole) -> Caller {
        Caller {
            user_id: UserId::new(id),
            email: None,
            role,
        }
    }

    #[tokio::test]
    async fn test_delete_rules() {
        let (repo, _dir) = setup().await;
        let repo = Arc::new(repo);
        let service = RaffleService::new(repo.clone());
        let raffle = seed_raffle(&repo, "ana", 10).await;

        assert!(matches!(
            service
                .delete_raffle(&raffle.id, &caller("beto", UserRole::User))
                .await,
            Err(RaffleError::Forbidden)
        ));

        repo.commit_tickets(&raffle.id, &UserId::new("b"), &[1], None)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            service
                .delete_raffle(&raffle.id, &caller("ana", UserRole::User))
                .await,
            Err(RaffleError::Lifecycle(LifecycleError::HasSoldTickets(1)))
        ));

        let unsold = seed_raffle(&repo, "ana", 10).await;
        service
            .delete_raffle(&unsold.id, &caller("root", UserRole::Admin))
            .await
            .unwrap();
        assert_eq!(
            service.get_raffle_status(&unsold.id).await.unwrap().status,
            RaffleStatus::Deleted
        );
        assert!(matches!(
            service
                .delete_raffle(&unsold.id, &caller("ana", UserRole::User))
                .await,
            Err(RaffleError::Lifecycle(LifecycleError::Deleted))
        ));
    }

    #[tokio::test]
    async fn test_counts_and_not_found() {
        let (repo, _dir) = setup().await;
        let repo = Arc::new(repo);
        let service = RaffleService::new(repo.clone());
        seed_raffle(&repo, "ana", 10).await;

        assert_eq!(
            service
                .active_raffle_count(&UserId::new("ana"))
                .await
                .unwrap(),
            1
        );
        assert!(matches!(
            service.get_raffle_status(&RaffleId::new("ghost")).await,
            Err(RaffleError::NotFound(_))
        ));
    }
}
