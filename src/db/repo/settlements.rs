//! Settlement and reconciliation operations for the repository.
//!
//! Each settlement transaction opens by claiming its session id in
//! `settlements`. A redelivered event finds the claim taken and writes nothing.

use crate::domain::{
    CheckoutKind, Raffle, RaffleId, Reconciliation, ReconciliationReason, SessionId,
    SettlementOutcome, TimeMs, UserId,
};
use sqlx::sqlite::SqliteConnection;
use sqlx::Row;

use super::checkouts::delete_pending_row;
use super::tickets::{insert_tickets_all_or_nothing, TicketRejection};
use super::{decode_err, insert_raffle_row, Repository};

/// Result of one settlement attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleResult {
    Applied,
    /// The session was settled before; nothing was written.
    AlreadySettled,
    /// The tickets could not be committed; nothing was written.
    Rejected(TicketRejection),
}

/// A settled session as recorded in the idempotency table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementRecord {
    pub session_id: SessionId,
    /// None when the session's intent could not be decoded.
    pub kind: Option<CheckoutKind>,
    pub outcome: SettlementOutcome,
    pub raffle_id: Option<RaffleId>,
    pub amount_total: Option<i64>,
    pub settled_at: TimeMs,
}

async fn claim_session(
    conn: &mut SqliteConnection,
    session_id: &SessionId,
    kind: Option<CheckoutKind>,
    outcome: SettlementOutcome,
    raffle_id: Option<&RaffleId>,
    amount_total: Option<i64>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO settlements (session_id, kind, outcome, raffle_id, amount_total, settled_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(session_id) DO NOTHING
        "#,
    )
    .bind(session_id.as_str())
    .bind(kind.map(|k| k.as_str()))
    .bind(outcome.as_str())
    .bind(raffle_id.map(|r| r.as_str()))
    .bind(amount_total)
    .bind(TimeMs::now().as_ms())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

async fn insert_reconciliation_row(
    conn: &mut SqliteConnection,
    rec: &Reconciliation,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO reconciliations (session_id, reason, detail, raffle_id, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(rec.session_id.as_str())
    .bind(rec.reason.as_str())
    .bind(&rec.detail)
    .bind(rec.raffle_id.as_ref().map(|r| r.as_str()))
    .bind(rec.created_at.as_ms())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

impl Repository {
    /// Commit the paid tickets, consume the pending checkout and queue `flags`,
    /// all in one transaction.
    pub async fn settle_ticket_purchase(
        &self,
        session_id: &SessionId,
        raffle_id: &RaffleId,
        buyer: &UserId,
        numbers: &[u32],
        amount_total: Option<i64>,
        flags: &[Reconciliation],
    ) -> Result<SettleResult, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let claimed = claim_session(
            &mut tx,
            session_id,
            Some(CheckoutKind::TicketPurchase),
            SettlementOutcome::TicketsCommitted,
            Some(raffle_id),
            amount_total,
        )
        .await?;
        if !claimed {
            tx.rollback().await?;
            return Ok(SettleResult::AlreadySettled);
        }

        let committed = insert_tickets_all_or_nothing(
            &mut tx,
            raffle_id,
            numbers,
            buyer,
            Some(session_id.as_str()),
        )
        .await?;
        if let Err(rejection) = committed {
            tx.rollback().await?;
            return Ok(SettleResult::Rejected(rejection));
        }

        delete_pending_row(&mut tx, session_id).await?;
        for flag in flags {
            insert_reconciliation_row(&mut tx, flag).await?;
        }

        tx.commit().await?;
        Ok(SettleResult::Applied)
    }

    /// Materialize a paid raffle, consume the pending checkout and queue `flags`,
    /// all in one transaction. Returns false if the session was already settled.
    pub async fn settle_raffle_creation(
        &self,
        session_id: &SessionId,
        raffle: &Raffle,
        amount_total: Option<i64>,
        flags: &[Reconciliation],
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let claimed = claim_session(
            &mut tx,
            session_id,
            Some(CheckoutKind::RaffleCreation),
            SettlementOutcome::RaffleCreated,
            Some(&raffle.id),
            amount_total,
        )
        .await?;
        if !claimed {
            tx.rollback().await?;
            return Ok(false);
        }

        insert_raffle_row(&mut tx, raffle, false).await?;
        delete_pending_row(&mut tx, session_id).await?;
        for flag in flags {
            insert_reconciliation_row(&mut tx, flag).await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    /// Close a session as an anomaly and queue its reconciliation records.
    /// Returns false if the session was already settled.
    pub async fn record_anomaly(
        &self,
        session_id: &SessionId,
        kind: Option<CheckoutKind>,
        raffle_id: Option<&RaffleId>,
        amount_total: Option<i64>,
        records: &[Reconciliation],
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let claimed = claim_session(
            &mut tx,
            session_id,
            kind,
            SettlementOutcome::Anomaly,
            raffle_id,
            amount_total,
        )
        .await?;
        if !claimed {
            tx.rollback().await?;
            return Ok(false);
        }

        delete_pending_row(&mut tx, session_id).await?;
        for record in records {
            insert_reconciliation_row(&mut tx, record).await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    pub async fn get_settlement(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<SettlementRecord>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT session_id, kind, outcome, raffle_id, amount_total, settled_at
            FROM settlements
            WHERE session_id = ?
            "#,
        )
        .bind(session_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let kind: Option<String> = row.try_get("kind")?;
        let outcome: String = row.try_get("outcome")?;
        let raffle_id: Option<String> = row.try_get("raffle_id")?;
        Ok(Some(SettlementRecord {
            session_id: SessionId::new(row.try_get::<String, _>("session_id")?),
            kind: match kind {
                Some(kind) => Some(
                    CheckoutKind::parse(&kind)
                        .ok_or_else(|| decode_err(format!("Invalid kind: {}", kind)))?,
                ),
                None => None,
            },
            outcome: SettlementOutcome::parse(&outcome)
                .ok_or_else(|| decode_err(format!("Invalid outcome: {}", outcome)))?,
            raffle_id: raffle_id.map(RaffleId::new),
            amount_total: row.try_get("amount_total")?,
            settled_at: TimeMs::new(row.try_get("settled_at")?),
        }))
    }

    /// Reconciliation queue, newest first.
    pub async fn list_reconciliations(&self, limit: u32) -> Result<Vec<Reconciliation>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT session_id, reason, detail, raffle_id, created_at
            FROM reconciliations
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let reason: String = row.try_get("reason")?;
                let raffle_id: Option<String> = row.try_get("raffle_id")?;
                Ok(Reconciliation {
                    session_id: SessionId::new(row.try_get::<String, _>("session_id")?),
                    reason: ReconciliationReason::parse(&reason)
                        .ok_or_else(|| decode_err(format!("Invalid reason: {}", reason)))?,
                    detail: row.try_get("detail")?,
                    raffle_id: raffle_id.map(RaffleId::new),
                    created_at: TimeMs::new(row.try_get("created_at")?),
                })
            })
            .collect()
    }
}
