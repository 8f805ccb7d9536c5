use crate::db::Repository;
use crate::domain::TimeMs;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Periodically drops pending checkouts older than the checkout TTL.
///
/// Pending checkouts never hold ticket numbers, so expiring them only
/// removes bookkeeping. A late payment still settles from its metadata.
#[derive(Debug, Clone)]
pub struct CheckoutSweeper {
    repo: Arc<Repository>,
    ttl_ms: i64,
    interval: Duration,
}

impl CheckoutSweeper {
    pub fn new(repo: Arc<Repository>, ttl_ms: i64, interval: Duration) -> Self {
        Self {
            repo,
            ttl_ms,
            interval,
        }
    }

    pub async fn sweep_once(&self, now: TimeMs) -> Result<u64, sqlx::Error> {
        let removed = self
            .repo
            .purge_pending_before(now.saturating_sub_ms(self.ttl_ms))
            .await?;
        if removed > 0 {
            info!("Expired {} stale pending checkouts", removed);
        }
        Ok(removed)
    }

    /// Run until the task is dropped.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.sweep_once(TimeMs::now()).await {
                warn!("Pending checkout sweep failed: {}", e);
            }
        }
    }
}
