//! Checkout opening and payment settlement.
//!
//! Both purchase and creation flows open a gateway checkout whose metadata
//! carries the full intent, then settle exactly once per session when the
//! payment is confirmed by webhook or by the success redirect.

use crate::config::Config;
use crate::db::{Repository, SettleResult, TicketRejection};
use crate::domain::{
    Caller, CheckoutIntent, CheckoutKind, CheckoutMetadata, DraftError, MetadataError, Money,
    MoneyError, PendingCheckout, Raffle, RaffleDraft, RaffleId, Reconciliation, ReconciliationReason,
    SessionId, SettlementOutcome, TimeMs, UserId,
};
use crate::engine::{quote, PriceQuote, PricingError};
use crate::gateway::{
    construct_event, CheckoutRequest, GatewayError, LineItem, PaymentGateway, PaymentStatus,
    SessionDetails, SignatureError,
};
use crate::orchestration::ledger::{LedgerError, TicketLedger};
use backoff::future::retry;
use backoff::ExponentialBackoff;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub const EVENT_SESSION_COMPLETED: &str = "checkout.session.completed";
pub const EVENT_ASYNC_PAYMENT_SUCCEEDED: &str = "checkout.session.async_payment_succeeded";
pub const EVENT_ASYNC_PAYMENT_FAILED: &str = "checkout.session.async_payment_failed";
pub const EVENT_SESSION_EXPIRED: &str = "checkout.session.expired";

/// An opened ticket-purchase checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseCheckout {
    pub session_id: SessionId,
    pub checkout_url: String,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreationOutcome {
    /// Free path: the raffle exists now.
    Created { raffle_id: RaffleId, quote: PriceQuote },
    CheckoutRequired {
        session_id: SessionId,
        checkout_url: String,
        quote: PriceQuote,
    },
}

/// What processing a session or event amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementStatus {
    Settled(SettlementOutcome),
    /// Settled by an earlier delivery; nothing was written.
    Duplicate,
    /// Paid but not deliverable; queued for manual reconciliation.
    Anomaly(ReconciliationReason),
    AwaitingPayment,
    Expired,
    Ignored,
}

impl SettlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementStatus::Settled(outcome) => outcome.as_str(),
            SettlementStatus::Duplicate => "duplicate",
            SettlementStatus::Anomaly(_) => "anomaly",
            SettlementStatus::AwaitingPayment => "awaiting_payment",
            SettlementStatus::Expired => "expired",
            SettlementStatus::Ignored => "ignored",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookAck {
    pub event_id: String,
    pub session_id: Option<SessionId>,
    pub status: SettlementStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub session_id: SessionId,
    pub status: SettlementStatus,
    pub raffle_id: Option<RaffleId>,
}

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error(transparent)]
    Draft(#[from] DraftError),
    #[error(transparent)]
    Pricing(#[from] PricingError),
    #[error(transparent)]
    Amount(#[from] MoneyError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error("payment gateway error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("webhook rejected: {0}")]
    Signature(#[from] SignatureError),
    #[error("{0}")]
    Forbidden(String),
    #[error("failed to persist settlement for session {session_id}: {source}")]
    Persistence {
        session_id: SessionId,
        source: sqlx::Error,
    },
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// SQLite errors worth retrying: busy, locked, stale snapshot, pool exhaustion.
fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db) => {
            matches!(db.code().as_deref(), Some("5") | Some("6") | Some("517"))
        }
        _ => false,
    }
}

fn join_numbers(numbers: &[u32]) -> String {
    numbers
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone)]
pub struct SettlementCoordinator {
    repo: Arc<Repository>,
    gateway: Arc<dyn PaymentGateway>,
    ledger: TicketLedger,
    config: Config,
}

impl SettlementCoordinator {
    pub fn new(repo: Arc<Repository>, gateway: Arc<dyn PaymentGateway>, config: Config) -> Self {
        Self {
            ledger: TicketLedger::new(repo.clone()),
            repo,
            gateway,
            config,
        }
    }

    fn success_url(&self) -> String {
        format!(
            "{}/checkout/success?session_id={{CHECKOUT_SESSION_ID}}",
            self.config.public_base_url
        )
    }

    // =========================================================================
    // Opening checkouts
    // =========================================================================

    /// Validate the numbers, then open a checkout for them. Nothing is reserved.
    pub async fn request_ticket_purchase(
        &self,
        caller: &Caller,
        raffle_id: &RaffleId,
        numbers: &[u32],
    ) -> Result<PurchaseCheckout, SettlementError> {
        let raffle = self.ledger.require_available(raffle_id, numbers).await?;
        let amount = raffle.ticket_price.times(numbers.len() as u64)?;

        let intent = CheckoutIntent::TicketPurchase {
            raffle_id: raffle.id.clone(),
            buyer_id: caller.user_id.clone(),
            ticket_numbers: numbers.to_vec(),
        };
        let metadata = CheckoutMetadata::new(intent.clone()).to_gateway_metadata()?;

        let request = CheckoutRequest {
            line_items: vec![LineItem {
                name: format!("Boletos: {}", raffle.title),
                description: format!("Números {}", join_numbers(numbers)),
                unit_amount: raffle.ticket_price,
                quantity: numbers.len() as u32,
            }],
            metadata,
            success_url: self.success_url(),
            cancel_url: format!("{}/raffles/{}", self.config.public_base_url, raffle.id),
        };

        let session = self.gateway.open_checkout(request).await?;
        self.record_pending(&session.session_id, intent, amount).await;

        info!(
            "Opened ticket checkout {} for raffle {}: buyer={}, numbers=[{}], amount={}",
            session.session_id,
            raffle.id,
            caller.user_id,
            join_numbers(numbers),
            amount
        );

        Ok(PurchaseCheckout {
            session_id: session.session_id,
            checkout_url: session.url,
            amount,
        })
    }

    /// Create the raffle directly when it is free, otherwise open a checkout
    /// that carries the whole draft.
    pub async fn request_raffle_creation(
        &self,
        caller: &Caller,
        draft: RaffleDraft,
    ) -> Result<CreationOutcome, SettlementError> {
        draft.validate()?;

        let prior = self.repo.count_active_raffles(&caller.user_id).await?;
        let price = quote(
            draft.total_tickets,
            draft.is_promoted,
            draft.billed_promotion_months(),
            prior,
        )?;

        if price.is_free_raffle {
            let raffle = Raffle::from_draft(
                RaffleId::generate(),
                caller.user_id.clone(),
                draft.clone(),
                TimeMs::now(),
                false,
            );
            if self.repo.insert_first_raffle(&raffle).await? {
                info!(
                    "Created free raffle {} for {} ({} tickets)",
                    raffle.id, caller.user_id, raffle.total_tickets
                );
                return Ok(CreationOutcome::Created {
                    raffle_id: raffle.id,
                    quote: price,
                });
            }
            // another creation by the same user won the free slot
            debug!("Free slot taken for {}, re-quoting", caller.user_id);
            let prior = self.repo.count_active_raffles(&caller.user_id).await?;
            let price = quote(
                draft.total_tickets,
                draft.is_promoted,
                draft.billed_promotion_months(),
                prior.max(1),
            )?;
            return self.open_creation_checkout(caller, draft, price).await;
        }

        self.open_creation_checkout(caller, draft, price).await
    }

    async fn open_creation_checkout(
        &self,
        caller: &Caller,
        draft: RaffleDraft,
        price: PriceQuote,
    ) -> Result<CreationOutcome, SettlementError> {
        let mut line_items = Vec::new();
        if price.fixed_fee.is_positive() {
            line_items.push(LineItem {
                name: "Tarifa de publicación".to_string(),
                description: String::new(),
                unit_amount: price.fixed_fee,
                quantity: 1,
            });
        }
        if price.tiered_commission.is_positive() {
            line_items.push(LineItem {
                name: "Comisión por boletos".to_string(),
                description: format!("{} boletos", draft.total_tickets),
                unit_amount: price.tiered_commission,
                quantity: 1,
            });
        }
        if price.promotion_fee.is_positive() {
            line_items.push(LineItem {
                name: "Promoción".to_string(),
                description: format!("{} mes(es)", draft.billed_promotion_months()),
                unit_amount: price.promotion_fee,
                quantity: 1,
            });
        }

        let title = draft.title.clone();
        let intent = CheckoutIntent::RaffleCreation {
            creator_id: caller.user_id.clone(),
            draft,
        };
        let metadata = CheckoutMetadata::new(intent.clone()).to_gateway_metadata()?;

        let request = CheckoutRequest {
            line_items,
            metadata,
            success_url: self.success_url(),
            cancel_url: format!("{}/raffles/new", self.config.public_base_url),
        };

        let session = self.gateway.open_checkout(request).await?;
        self.record_pending(&session.session_id, intent, price.total)
            .await;

        info!(
            "Opened creation checkout {} for {}: title={:?}, total={}",
            session.session_id, caller.user_id, title, price.total
        );

        Ok(CreationOutcome::CheckoutRequired {
            session_id: session.session_id,
            checkout_url: session.url,
            quote: price,
        })
    }

    /// The checkout is already open at this point, and its metadata is enough
    /// to settle it, so a failure here is logged rather than returned.
    async fn record_pending(&self, session_id: &SessionId, intent: CheckoutIntent, amount: Money) {
        let pending = PendingCheckout {
            session_id: session_id.clone(),
            intent,
            amount,
            created_at: TimeMs::now(),
        };
        if let Err(e) = self.repo.insert_pending_checkout(&pending).await {
            warn!(
                "Failed to record pending checkout {}: {}; settlement will rely on metadata",
                session_id, e
            );
        }
    }

    // =========================================================================
    // Settlement
    // =========================================================================

    /// Verify and process one gateway event. Only a bad signature or an
    /// exhausted persistence retry is an error; everything else is acknowledged.
    pub async fn handle_payment_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookAck, SettlementError> {
        let event = construct_event(
            payload,
            signature,
            &self.config.payment_webhook_secret,
            self.config.webhook_tolerance_secs,
            TimeMs::now().as_secs(),
        )
        .map_err(|e| {
            warn!("Rejected webhook delivery: {}", e);
            e
        })?;

        debug!("Webhook event {} ({})", event.id, event.event_type);

        let status = match (event.event_type.as_str(), &event.session) {
            (EVENT_SESSION_COMPLETED | EVENT_ASYNC_PAYMENT_SUCCEEDED, Some(session)) => {
                self.settle(session).await?
            }
            (EVENT_SESSION_EXPIRED | EVENT_ASYNC_PAYMENT_FAILED, Some(session)) => {
                let removed = self
                    .repo
                    .delete_pending_checkout(&session.session_id)
                    .await?;
                info!(
                    "Checkout {} closed by {} (pending removed: {})",
                    session.session_id, event.event_type, removed
                );
                SettlementStatus::Expired
            }
            _ => SettlementStatus::Ignored,
        };

        Ok(WebhookAck {
            event_id: event.id,
            session_id: event.session.map(|s| s.session_id),
            status,
        })
    }

    /// Settle a session from the success redirect, without waiting for the webhook.
    pub async fn confirm_checkout(
        &self,
        caller: &Caller,
        session_id: &SessionId,
    ) -> Result<Confirmation, SettlementError> {
        let details = self.gateway.retrieve_session(session_id).await?;

        let owner = match self.repo.get_pending_checkout(session_id).await? {
            Some(pending) => Some(pending.intent.owner().clone()),
            None => CheckoutMetadata::from_gateway_metadata(&details.metadata)
                .ok()
                .map(|m| m.intent.owner().clone()),
        };
        if let Some(owner) = owner {
            if owner != caller.user_id && !caller.is_admin() {
                return Err(SettlementError::Forbidden(
                    "checkout belongs to another user".to_string(),
                ));
            }
        }

        let status = self.settle(&details).await?;
        let raffle_id = self
            .repo
            .get_settlement(session_id)
            .await?
            .and_then(|s| s.raffle_id);

        Ok(Confirmation {
            session_id: session_id.clone(),
            status,
            raffle_id,
        })
    }

    async fn settle(&self, details: &SessionDetails) -> Result<SettlementStatus, SettlementError> {
        let session_id = &details.session_id;
        if !matches!(
            details.payment_status,
            PaymentStatus::Paid | PaymentStatus::NoPaymentRequired
        ) {
            debug!("Session {} not paid yet", session_id);
            return Ok(SettlementStatus::AwaitingPayment);
        }

        if self
            .persist(session_id, "settlement lookup", || {
                self.repo.get_settlement(session_id)
            })
            .await?
            .is_some()
        {
            info!("Session {} already settled", session_id);
            return Ok(SettlementStatus::Duplicate);
        }

        let pending = self
            .persist(session_id, "pending checkout lookup", || {
                self.repo.get_pending_checkout(session_id)
            })
            .await?;
        if let Some(p) = &pending {
            if p.is_expired(TimeMs::now(), self.config.checkout_ttl_ms) {
                warn!(
                    "Session {} paid after its checkout expired (opened at {})",
                    session_id,
                    p.created_at.as_ms()
                );
            }
        }

        // The pending row is the server-side record; metadata covers sessions
        // whose row was swept or never written.
        let intent = match (&pending, CheckoutMetadata::from_gateway_metadata(&details.metadata)) {
            (Some(p), _) => p.intent.clone(),
            (None, Ok(metadata)) => metadata.intent,
            (None, Err(e)) => {
                warn!("Paid session {} has unusable metadata: {}", session_id, e);
                let record = Reconciliation::new(
                    session_id.clone(),
                    ReconciliationReason::InvalidMetadata,
                    e.to_string(),
                    None,
                );
                return self
                    .close_as_anomaly(details, None, None, vec![record])
                    .await;
            }
        };

        let mut flags = Vec::new();
        if let (Some(pending), Some(charged)) = (&pending, details.amount_total) {
            if pending.amount.to_minor_units() != Some(charged) {
                let charged = Money::from_minor_units(charged);
                warn!(
                    "Session {} charged {}, expected {}",
                    session_id, charged, pending.amount
                );
                flags.push(Reconciliation::new(
                    session_id.clone(),
                    ReconciliationReason::AmountMismatch,
                    format!("charged {}, expected {}", charged, pending.amount),
                    None,
                ));
            }
        }

        match intent {
            CheckoutIntent::TicketPurchase {
                raffle_id,
                buyer_id,
                ticket_numbers,
            } => {
                self.settle_tickets(details, raffle_id, buyer_id, ticket_numbers, flags)
                    .await
            }
            CheckoutIntent::RaffleCreation { creator_id, draft } => {
                self.settle_creation(details, creator_id, draft, flags).await
            }
        }
    }

    async fn settle_tickets(
        &self,
        details: &SessionDetails,
        raffle_id: RaffleId,
        buyer_id: UserId,
        numbers: Vec<u32>,
        mut flags: Vec<Reconciliation>,
    ) -> Result<SettlementStatus, SettlementError> {
        let session_id = &details.session_id;
        for flag in flags.iter_mut() {
            flag.raffle_id = Some(raffle_id.clone());
        }
        let buyer = self
            .resolve_owner(session_id, &buyer_id, Some(&raffle_id), &mut flags)
            .await?;

        let result = self
            .persist(session_id, "ticket settlement", || {
                self.repo.settle_ticket_purchase(
                    session_id,
                    &raffle_id,
                    &buyer,
                    &numbers,
                    details.amount_total,
                    &flags,
                )
            })
            .await?;

        match result {
            SettleResult::Applied => {
                info!(
                    "Settled session {}: raffle {} numbers [{}] sold to {}",
                    session_id,
                    raffle_id,
                    join_numbers(&numbers),
                    buyer
                );
                Ok(SettlementStatus::Settled(SettlementOutcome::TicketsCommitted))
            }
            SettleResult::AlreadySettled => {
                info!("Session {} already settled", session_id);
                Ok(SettlementStatus::Duplicate)
            }
            SettleResult::Rejected(rejection) => {
                let (reason, detail) = match rejection {
                    TicketRejection::RaffleMissing => (
                        ReconciliationReason::RaffleMissing,
                        format!("raffle {} no longer exists", raffle_id),
                    ),
                    TicketRejection::RaffleNotActive(status) => (
                        ReconciliationReason::RaffleNotActive,
                        format!("raffle {} is {}", raffle_id, status),
                    ),
                    TicketRejection::Unavailable(taken) => (
                        ReconciliationReason::TicketsUnavailable,
                        format!(
                            "buyer {} paid for [{}] but [{}] were sold first",
                            buyer_id,
                            join_numbers(&numbers),
                            join_numbers(&taken)
                        ),
                    ),
                };
                warn!("Paid session {} not deliverable: {}", session_id, detail);

                let mut records = vec![Reconciliation::new(
                    session_id.clone(),
                    reason,
                    detail,
                    Some(raffle_id.clone()),
                )];
                records.extend(flags);
                self.close_as_anomaly(
                    details,
                    Some(CheckoutKind::TicketPurchase),
                    Some(&raffle_id),
                    records,
                )
                .await
            }
        }
    }

    async fn settle_creation(
        &self,
        details: &SessionDetails,
        creator_id: UserId,
        draft: RaffleDraft,
        mut flags: Vec<Reconciliation>,
    ) -> Result<SettlementStatus, SettlementError> {
        let session_id = &details.session_id;
        let raffle_id = RaffleId::generate();
        for flag in flags.iter_mut() {
            flag.raffle_id = Some(raffle_id.clone());
        }
        let creator = self
            .resolve_owner(session_id, &creator_id, Some(&raffle_id), &mut flags)
            .await?;

        let mut raffle = Raffle::from_draft(raffle_id, creator, draft, TimeMs::now(), true);
        raffle.source_session_id = Some(session_id.clone());
        raffle.needs_reconciliation = !flags.is_empty();

        let created = self
            .persist(session_id, "raffle creation", || {
                self.repo
                    .settle_raffle_creation(session_id, &raffle, details.amount_total, &flags)
            })
            .await?;

        if created {
            info!(
                "Settled session {}: created raffle {} for {}",
                session_id, raffle.id, raffle.creator
            );
            Ok(SettlementStatus::Settled(SettlementOutcome::RaffleCreated))
        } else {
            info!("Session {} already settled", session_id);
            Ok(SettlementStatus::Duplicate)
        }
    }

    /// The owner if they still exist, otherwise the placeholder user plus a flag.
    async fn resolve_owner(
        &self,
        session_id: &SessionId,
        owner: &UserId,
        raffle_id: Option<&RaffleId>,
        flags: &mut Vec<Reconciliation>,
    ) -> Result<UserId, SettlementError> {
        let exists = self
            .persist(session_id, "user lookup", || self.repo.user_exists(owner))
            .await?;
        if exists {
            return Ok(owner.clone());
        }

        let placeholder = self.config.placeholder_user_id.clone();
        warn!(
            "User {} for paid session {} not found; settling to placeholder {}",
            owner, session_id, placeholder
        );
        flags.push(Reconciliation::new(
            session_id.clone(),
            ReconciliationReason::UnknownUser,
            format!("user {} not found; settled to {}", owner, placeholder),
            raffle_id.cloned(),
        ));
        Ok(placeholder)
    }

    async fn close_as_anomaly(
        &self,
        details: &SessionDetails,
        kind: Option<CheckoutKind>,
        raffle_id: Option<&RaffleId>,
        records: Vec<Reconciliation>,
    ) -> Result<SettlementStatus, SettlementError> {
        let session_id = &details.session_id;
        let reason = records
            .first()
            .map(|r| r.reason)
            .unwrap_or(ReconciliationReason::InvalidMetadata);

        let recorded = self
            .persist(session_id, "settlement anomaly", || {
                self.repo.record_anomaly(
                    session_id,
                    kind,
                    raffle_id,
                    details.amount_total,
                    &records,
                )
            })
            .await?;

        if recorded {
            warn!(
                "Session {} queued for reconciliation: {}",
                session_id, reason
            );
            Ok(SettlementStatus::Anomaly(reason))
        } else {
            Ok(SettlementStatus::Duplicate)
        }
    }

    /// Retry a settlement write on transient database errors. Exhaustion means a
    /// paid session has no durable effect, which is raised as an alert.
    async fn persist<T, F, Fut>(
        &self,
        session_id: &SessionId,
        what: &str,
        mut op: F,
    ) -> Result<T, SettlementError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(50),
            max_interval: Duration::from_secs(2),
            max_elapsed_time: Some(Duration::from_millis(self.config.settlement_retry_ms)),
            ..Default::default()
        };

        retry(backoff, || {
            let attempt = op();
            async move {
                attempt.await.map_err(|e| {
                    if is_transient(&e) {
                        warn!("Transient error during {} for {}: {}", what, session_id, e);
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        })
        .await
        .map_err(|source| {
            error!(
                alert = true,
                session_id = %session_id,
                "Failed to persist {} for paid session: {}",
                what,
                source
            );
            SettlementError::Persistence {
                session_id: session_id.clone(),
                source,
            }
        })
    }
}
