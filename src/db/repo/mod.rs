//! Repository layer for database operations.
//!
//! Methods are organized across submodules by domain:
//! - `tickets.rs` - Conditional ticket inserts and buyer lookups
//! - `checkouts.rs` - Pending checkout bookkeeping
//! - `settlements.rs` - Idempotent settlement and the reconciliation queue

mod checkouts;
mod settlements;
mod tickets;

pub use settlements::{SettleResult, SettlementRecord};
pub use tickets::{BuyerTicket, TicketRejection};

use crate::domain::{
    Caller, LotteryDetails, Money, Raffle, RaffleId, RaffleStatus, SessionId, TimeMs, UserId,
    WinnerSelectionMethod,
};
use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;

const RAFFLE_COLUMNS: &str = r#"
    id, creator_id, title, description, ticket_price, total_tickets, images_json,
    contact_info, social_links_json, created_at, start_date, end_date, is_promoted,
    promotion_end_date, winner_selection_method, lottery_date, lottery_draw_number,
    status, winner_id, winning_ticket_number, winner_seed, source_session_id,
    needs_reconciliation
"#;

/// Raffle row without its tickets, plus the sold count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaffleSummary {
    pub raffle: Raffle,
    pub sold_count: u32,
}

/// Repository for database operations.
#[derive(Debug)]
pub struct Repository {
    pool: SqlitePool,
}

pub(crate) fn decode_err(msg: impl Into<String>) -> sqlx::Error {
    let msg: String = msg.into();
    sqlx::Error::Decode(msg.into())
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, sqlx::Error> {
    serde_json::to_string(value)
        .map_err(|e| sqlx::Error::Protocol(format!("failed to encode json column: {}", e)))
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Mirror the caller's identity. Existing rows keep their `created_at`.
    pub async fn upsert_user(&self, caller: &Caller) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, role, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                email = COALESCE(excluded.email, users.email),
                role = excluded.role
            "#,
        )
        .bind(caller.user_id.as_str())
        .bind(caller.email.as_deref())
        .bind(caller.role.as_str())
        .bind(TimeMs::now().as_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn user_exists(&self, user_id: &UserId) -> Result<bool, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM users WHERE id = ?")
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    // =========================================================================
    // Raffles
    // =========================================================================

    /// Insert a raffle with no tickets.
    pub async fn insert_raffle(&self, raffle: &Raffle) -> Result<(), sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        insert_raffle_row(&mut conn, raffle, false).await?;
        Ok(())
    }

    /// Insert `raffle` only if its creator has no active raffle yet. Guards the
    /// free-raffle allowance against concurrent creations.
    pub async fn insert_first_raffle(&self, raffle: &Raffle) -> Result<bool, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        insert_raffle_row(&mut conn, raffle, true).await
    }

    /// Load a raffle with its sold tickets in insertion order.
    pub async fn get_raffle(&self, id: &RaffleId) -> Result<Option<Raffle>, sqlx::Error> {
        let sql = format!("SELECT {} FROM raffles WHERE id = ?", RAFFLE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut raffle = raffle_from_row(&row)?;
        raffle.sold_tickets = self.sold_tickets(id).await?;
        Ok(Some(raffle))
    }

    /// List raffles, newest first. Without a status filter, deleted raffles are omitted.
    pub async fn list_raffles(
        &self,
        creator: Option<&UserId>,
        status: Option<RaffleStatus>,
    ) -> Result<Vec<RaffleSummary>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {},
                (SELECT COUNT(*) FROM sold_tickets st WHERE st.raffle_id = raffles.id) AS sold_count
            FROM raffles
            WHERE (?1 IS NULL OR creator_id = ?1)
              AND ((?2 IS NULL AND status != 'deleted') OR status = ?2)
            ORDER BY created_at DESC, id ASC
            "#,
            RAFFLE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(creator.map(|c| c.as_str()))
            .bind(status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let sold_count: i64 = row.try_get("sold_count")?;
                Ok(RaffleSummary {
                    raffle: raffle_from_row(row)?,
                    sold_count: sold_count as u32,
                })
            })
            .collect()
    }

    /// Number of `active` raffles owned by `creator`.
    pub async fn count_active_raffles(&self, creator: &UserId) -> Result<u32, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM raffles WHERE creator_id = ? AND status = 'active'")
                .bind(creator.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u32)
    }

    /// Complete an active raffle, provided its sold set still has `expected_sold`
    /// tickets. Returns false if either condition no longer holds.
    pub async fn complete_raffle(
        &self,
        id: &RaffleId,
        winner: &UserId,
        winning_number: u32,
        seed: &str,
        expected_sold: usize,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE raffles
            SET status = 'completed', winner_id = ?, winning_ticket_number = ?, winner_seed = ?
            WHERE id = ?
              AND status = 'active'
              AND (SELECT COUNT(*) FROM sold_tickets WHERE raffle_id = ?) = ?
            "#,
        )
        .bind(winner.as_str())
        .bind(i64::from(winning_number))
        .bind(seed)
        .bind(id.as_str())
        .bind(id.as_str())
        .bind(expected_sold as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark an active raffle with no sold tickets as deleted.
    pub async fn delete_raffle_if_unsold(&self, id: &RaffleId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE raffles
            SET status = 'deleted'
            WHERE id = ?
              AND status = 'active'
              AND NOT EXISTS (SELECT 1 FROM sold_tickets WHERE raffle_id = ?)
            "#,
        )
        .bind(id.as_str())
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Insert a raffle row. With `first_only`, the insert only happens if the
/// creator has no active raffle; returns whether a row was written.
pub(crate) async fn insert_raffle_row(
    conn: &mut SqliteConnection,
    raffle: &Raffle,
    first_only: bool,
) -> Result<bool, sqlx::Error> {
    let (lottery_date, lottery_draw_number) = match &raffle.lottery_details {
        Some(details) => (
            Some(details.date.format("%Y-%m-%d").to_string()),
            Some(details.draw_number.clone()),
        ),
        None => (None, None),
    };

    let result = sqlx::query(
        r#"
        INSERT INTO raffles (
            id, creator_id, title, description, ticket_price, total_tickets, images_json,
            contact_info, social_links_json, created_at, start_date, end_date, is_promoted,
            promotion_end_date, winner_selection_method, lottery_date, lottery_draw_number,
            status, source_session_id, needs_reconciliation
        )
        SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
        WHERE ? = 0
           OR NOT EXISTS (SELECT 1 FROM raffles WHERE creator_id = ? AND status = 'active')
        "#,
    )
    .bind(raffle.id.as_str())
    .bind(raffle.creator.as_str())
    .bind(&raffle.title)
    .bind(&raffle.description)
    .bind(raffle.ticket_price.to_canonical_string())
    .bind(i64::from(raffle.total_tickets))
    .bind(encode_json(&raffle.images)?)
    .bind(raffle.contact_info.as_deref())
    .bind(encode_json(&raffle.social_links)?)
    .bind(raffle.created_at.as_ms())
    .bind(raffle.start_date.as_ms())
    .bind(raffle.end_date.map(|t| t.as_ms()))
    .bind(raffle.is_promoted as i64)
    .bind(raffle.promotion_end_date.map(|t| t.as_ms()))
    .bind(raffle.winner_selection_method.as_str())
    .bind(lottery_date)
    .bind(lottery_draw_number)
    .bind(raffle.status.as_str())
    .bind(raffle.source_session_id.as_ref().map(|s| s.as_str()))
    .bind(raffle.needs_reconciliation as i64)
    .bind(first_only as i64)
    .bind(raffle.creator.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

fn raffle_from_row(row: &SqliteRow) -> Result<Raffle, sqlx::Error> {
    let ticket_price: String = row.try_get("ticket_price")?;
    let ticket_price = Money::from_str_canonical(&ticket_price)
        .map_err(|e| decode_err(format!("Invalid ticket_price: {}", e)))?;

    let images_json: String = row.try_get("images_json")?;
    let images = serde_json::from_str(&images_json)
        .map_err(|e| decode_err(format!("Invalid images_json: {}", e)))?;
    let social_json: String = row.try_get("social_links_json")?;
    let social_links = serde_json::from_str(&social_json)
        .map_err(|e| decode_err(format!("Invalid social_links_json: {}", e)))?;

    let method: String = row.try_get("winner_selection_method")?;
    let winner_selection_method = WinnerSelectionMethod::from_str(&method).map_err(decode_err)?;
    let status: String = row.try_get("status")?;
    let status = RaffleStatus::from_str(&status).map_err(decode_err)?;

    let lottery_date: Option<String> = row.try_get("lottery_date")?;
    let lottery_draw_number: Option<String> = row.try_get("lottery_draw_number")?;
    let lottery_details = match (lottery_date, lottery_draw_number) {
        (Some(date), Some(draw_number)) => Some(LotteryDetails {
            date: NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .map_err(|e| decode_err(format!("Invalid lottery_date: {}", e)))?,
            draw_number,
        }),
        _ => None,
    };

    let total_tickets: i64 = row.try_get("total_tickets")?;
    let is_promoted: i64 = row.try_get("is_promoted")?;
    let needs_reconciliation: i64 = row.try_get("needs_reconciliation")?;
    let winning_ticket_number: Option<i64> = row.try_get("winning_ticket_number")?;
    let end_date: Option<i64> = row.try_get("end_date")?;
    let promotion_end_date: Option<i64> = row.try_get("promotion_end_date")?;
    let winner_id: Option<String> = row.try_get("winner_id")?;
    let source_session_id: Option<String> = row.try_get("source_session_id")?;

    Ok(Raffle {
        id: RaffleId::new(row.try_get::<String, _>("id")?),
        creator: UserId::new(row.try_get::<String, _>("creator_id")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        ticket_price,
        total_tickets: total_tickets as u32,
        images,
        contact_info: row.try_get("contact_info")?,
        social_links,
        created_at: TimeMs::new(row.try_get("created_at")?),
        start_date: TimeMs::new(row.try_get("start_date")?),
        end_date: end_date.map(TimeMs::new),
        is_promoted: is_promoted != 0,
        promotion_end_date: promotion_end_date.map(TimeMs::new),
        winner_selection_method,
        lottery_details,
        status,
        winner: winner_id.map(UserId::new),
        winning_ticket_number: winning_ticket_number.map(|n| n as u32),
        winner_seed: row.try_get("winner_seed")?,
        sold_tickets: Vec::new(),
        source_session_id: source_session_id.map(SessionId::new),
        needs_reconciliation: needs_reconciliation != 0,
    })
}


#[cfg(test)]
mod tests {
    use super::test_support::{seed_raffle, setup};
    use super::*;
    use crate::domain::raffle::fixtures::draft;
    use crate::domain::UserRole;

    #[test]
    fn test_encode_json_errors_map_to_sqlx() {
        assert_eq!(encode_json(&vec!["a", "b"]).unwrap(), r#"["a","b"]"#);

        // tuple keys cannot become JSON object keys
        let mut bad = std::collections::HashMap::new();
        bad.insert((1, 2), 3);
        assert!(matches!(encode_json(&bad), Err(sqlx::Error::Protocol(_))));
    }

    #[tokio::test]
    async fn test_raffle_round_trip() {
        let (repo, _dir) = setup().await;
        let mut d = draft(10);
        d.winner_selection_method = WinnerSelectionMethod::Lottery;
        d.lottery_details = Some(LotteryDetails {
            date: NaiveDate::from_ymd_opt(2026, 12, 24).unwrap(),
            draw_number: "03821".to_string(),
        });
        d.social_links = vec!["https://social.example/rifa".to_string()];
        let raffle = Raffle::from_draft(
            RaffleId::generate(),
            UserId::new("creator"),
            d,
            TimeMs::new(1_000),
            false,
        );
        repo.insert_raffle(&raffle).await.unwrap();

        let loaded = repo.get_raffle(&raffle.id).await.unwrap().unwrap();
        assert_eq!(loaded, raffle);
    }

    #[tokio::test]
    async fn test_first_raffle_guard() {
        let (repo, _dir) = setup().await;
        let first = Raffle::from_draft(
            RaffleId::generate(),
            UserId::new("ana"),
            draft(10),
            TimeMs::now(),
            false,
        );
        assert!(repo.insert_first_raffle(&first).await.unwrap());

        let second = Raffle::from_draft(
            RaffleId::generate(),
            UserId::new("ana"),
            draft(10),
            TimeMs::now(),
            false,
        );
        assert!(!repo.insert_first_raffle(&second).await.unwrap());
        assert!(repo.get_raffle(&second.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_missing_raffle() {
        let (repo, _dir) = setup().await;
        assert!(repo
            .get_raffle(&RaffleId::new("nope"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_active_count_and_listing() {
        let (repo, _dir) = setup().await;
        let a = seed_raffle(&repo, "ana", 10).await;
        let b = seed_raffle(&repo, "ana", 10).await;
        seed_raffle(&repo, "beto", 10).await;

        assert_eq!(
            repo.count_active_raffles(&UserId::new("ana")).await.unwrap(),
            2
        );

        assert!(repo.delete_raffle_if_unsold(&a.id).await.unwrap());
        assert_eq!(
            repo.count_active_raffles(&UserId::new("ana")).await.unwrap(),
            1
        );

        let listed = repo
            .list_raffles(Some(&UserId::new("ana")), None)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].raffle.id, b.id);

        let deleted = repo
            .list_raffles(None, Some(RaffleStatus::Deleted))
            .await
            .unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].raffle.id, a.id);

        assert_eq!(repo.list_raffles(None, None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_complete_requires_matching_snapshot() {
        let (repo, _dir) = setup().await;
        let raffle = seed_raffle(&repo, "ana", 10).await;
        let buyer = UserId::new("buyer");
        repo.commit_tickets(&raffle.id, &buyer, &[1, 2], None)
            .await
            .unwrap()
            .unwrap();

        assert!(!repo
            .complete_raffle(&raffle.id, &buyer, 1, "random", 1)
            .await
            .unwrap());
        assert!(repo
            .complete_raffle(&raffle.id, &buyer, 1, "random", 2)
            .await
            .unwrap());
        // terminal
        assert!(!repo
            .complete_raffle(&raffle.id, &buyer, 2, "random", 2)
            .await
            .unwrap());

        let loaded = repo.get_raffle(&raffle.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, RaffleStatus::Completed);
        assert_eq!(loaded.winning_ticket_number, Some(1));
        assert_eq!(loaded.winner, Some(buyer));
    }

    #[tokio::test]
    async fn test_delete_refused_with_sales() {
        let (repo, _dir) = setup().await;
        let raffle = seed_raffle(&repo, "ana", 10).await;
        repo.commit_tickets(&raffle.id, &UserId::new("b"), &[5], None)
            .await
            .unwrap()
            .unwrap();
        assert!(!repo.delete_raffle_if_unsold(&raffle.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_user_upsert() {
        let (repo, _dir) = setup().await;
        let caller = Caller {
            user_id: UserId::new("u1"),
            email: Some("u1@example.com".to_string()),
            role: UserRole::User,
        };
        assert!(!repo.user_exists(&caller.user_id).await.unwrap());
        repo.upsert_user(&caller).await.unwrap();
        repo.upsert_user(&caller).await.unwrap();
        assert!(repo.user_exists(&caller.user_id).await.unwrap());
    }
}
