//! Pending checkout operations for the repository.

use crate::domain::{CheckoutIntent, Money, PendingCheckout, SessionId, TimeMs};
use sqlx::sqlite::SqliteConnection;
use sqlx::Row;

use super::{decode_err, encode_json, Repository};

pub(crate) async fn delete_pending_row(
    conn: &mut SqliteConnection,
    session_id: &SessionId,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM pending_checkouts WHERE session_id = ?")
        .bind(session_id.as_str())
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

impl Repository {
    /// Record an opened checkout. Re-inserting the same session is a no-op.
    pub async fn insert_pending_checkout(
        &self,
        pending: &PendingCheckout,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO pending_checkouts (session_id, kind, intent_json, amount, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(session_id) DO NOTHING
            "#,
        )
        .bind(pending.session_id.as_str())
        .bind(pending.kind().as_str())
        .bind(encode_json(&pending.intent)?)
        .bind(pending.amount.to_canonical_string())
        .bind(pending.created_at.as_ms())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_pending_checkout(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<PendingCheckout>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT session_id, intent_json, amount, created_at
            FROM pending_checkouts
            WHERE session_id = ?
            "#,
        )
        .bind(session_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let intent_json: String = row.try_get("intent_json")?;
        let intent: CheckoutIntent = serde_json::from_str(&intent_json)
            .map_err(|e| decode_err(format!("Invalid intent_json: {}", e)))?;
        let amount: String = row.try_get("amount")?;
        let amount = Money::from_str_canonical(&amount)
            .map_err(|e| decode_err(format!("Invalid amount: {}", e)))?;

        Ok(Some(PendingCheckout {
            session_id: SessionId::new(row.try_get::<String, _>("session_id")?),
            intent,
            amount,
            created_at: TimeMs::new(row.try_get("created_at")?),
        }))
    }

    pub async fn delete_pending_checkout(&self, session_id: &SessionId) -> Result<bool, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        delete_pending_row(&mut conn, session_id).await
    }

    /// Drop pending checkouts created before `cutoff`. Returns how many were removed.
    pub async fn purge_pending_before(&self, cutoff: TimeMs) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM pending_checkouts WHERE created_at < ?")
            .bind(cutoff.as_ms())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
