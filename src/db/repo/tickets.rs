//! Ticket ledger persistence.
//!
//! Every sold ticket is written by `insert_ticket_if_available`, a single
//! conditional INSERT that only produces a row when the raffle is active, the
//! number is in range and `(raffle_id, number)` is not yet taken.

use crate::domain::{RaffleId, RaffleStatus, SoldTicket, TimeMs, UserId};
use serde::Serialize;
use sqlx::sqlite::SqliteConnection;
use sqlx::Row;
use std::str::FromStr;

use super::{decode_err, Repository};

/// Why a conditional ticket commit produced no rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketRejection {
    RaffleMissing,
    RaffleNotActive(RaffleStatus),
    /// Numbers that were out of range or already sold.
    Unavailable(Vec<u32>),
}

/// A ticket owned by a buyer, with enough raffle context to list it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyerTicket {
    pub raffle_id: RaffleId,
    pub raffle_title: String,
    pub raffle_status: RaffleStatus,
    pub number: u32,
    pub purchase_date: TimeMs,
    pub is_winner: bool,
}

/// Insert one ticket if and only if it is still available. Returns whether a
/// row was written.
pub(crate) async fn insert_ticket_if_available(
    conn: &mut SqliteConnection,
    raffle_id: &RaffleId,
    number: u32,
    buyer: &UserId,
    purchase_date: TimeMs,
    external_transaction_id: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO sold_tickets (raffle_id, number, buyer_id, purchase_date, external_transaction_id)
        SELECT ?, ?, ?, ?, ?
        FROM raffles
        WHERE id = ? AND status = 'active' AND ? BETWEEN 1 AND total_tickets
        ON CONFLICT(raffle_id, number) DO NOTHING
        "#,
    )
    .bind(raffle_id.as_str())
    .bind(i64::from(number))
    .bind(buyer.as_str())
    .bind(purchase_date.as_ms())
    .bind(external_transaction_id)
    .bind(raffle_id.as_str())
    .bind(i64::from(number))
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Insert every number or none. The caller owns the transaction and must roll
/// back on `Err(rejection)`.
///
/// Writes come first so the transaction takes the write lock before it reads.
pub(crate) async fn insert_tickets_all_or_nothing(
    conn: &mut SqliteConnection,
    raffle_id: &RaffleId,
    numbers: &[u32],
    buyer: &UserId,
    external_transaction_id: Option<&str>,
) -> Result<Result<Vec<SoldTicket>, TicketRejection>, sqlx::Error> {
    let purchase_date = TimeMs::now();
    let mut sold = Vec::with_capacity(numbers.len());
    let mut unavailable = Vec::new();

    for &number in numbers {
        let inserted = insert_ticket_if_available(
            conn,
            raffle_id,
            number,
            buyer,
            purchase_date,
            external_transaction_id,
        )
        .await?;
        if inserted {
            sold.push(SoldTicket {
                number,
                buyer: buyer.clone(),
                purchase_date,
                external_transaction_id: external_transaction_id.map(str::to_string),
            });
        } else {
            unavailable.push(number);
        }
    }

    if unavailable.is_empty() && !sold.is_empty() {
        return Ok(Ok(sold));
    }

    let status: Option<(String,)> = sqlx::query_as("SELECT status FROM raffles WHERE id = ?")
        .bind(raffle_id.as_str())
        .fetch_optional(&mut *conn)
        .await?;
    let rejection = match status {
        None => TicketRejection::RaffleMissing,
        Some((status,)) => {
            let status = RaffleStatus::from_str(&status).map_err(decode_err)?;
            if status != RaffleStatus::Active {
                TicketRejection::RaffleNotActive(status)
            } else {
                TicketRejection::Unavailable(unavailable)
            }
        }
    };
    Ok(Err(rejection))
}

impl Repository {
    /// Atomically commit `numbers` for `buyer`: all are sold, or none.
    pub async fn commit_tickets(
        &self,
        raffle_id: &RaffleId,
        buyer: &UserId,
        numbers: &[u32],
        external_transaction_id: Option<&str>,
    ) -> Result<Result<Vec<SoldTicket>, TicketRejection>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let outcome = insert_tickets_all_or_nothing(
            &mut tx,
            raffle_id,
            numbers,
            buyer,
            external_transaction_id,
        )
        .await?;

        match outcome {
            Ok(sold) => {
                tx.commit().await?;
                Ok(Ok(sold))
            }
            Err(rejection) => {
                tx.rollback().await?;
                Ok(Err(rejection))
            }
        }
    }

    /// Sold tickets for a raffle in insertion order.
    pub async fn sold_tickets(&self, raffle_id: &RaffleId) -> Result<Vec<SoldTicket>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT number, buyer_id, purchase_date, external_transaction_id
            FROM sold_tickets
            WHERE raffle_id = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(raffle_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let number: i64 = row.try_get("number")?;
                Ok(SoldTicket {
                    number: number as u32,
                    buyer: UserId::new(row.try_get::<String, _>("buyer_id")?),
                    purchase_date: TimeMs::new(row.try_get("purchase_date")?),
                    external_transaction_id: row.try_get("external_transaction_id")?,
                })
            })
            .collect()
    }

    /// Every ticket `buyer` holds, newest purchase first.
    pub async fn tickets_for_buyer(&self, buyer: &UserId) -> Result<Vec<BuyerTicket>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT st.raffle_id, r.title, r.status, st.number, st.purchase_date,
                   (r.winning_ticket_number IS NOT NULL
                    AND r.winning_ticket_number = st.number) AS is_winner
            FROM sold_tickets st
            JOIN raffles r ON r.id = st.raffle_id
            WHERE st.buyer_id = ?
            ORDER BY st.purchase_date DESC, st.seq ASC
            "#,
        )
        .bind(buyer.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let status: String = row.try_get("status")?;
                let number: i64 = row.try_get("number")?;
                let is_winner: i64 = row.try_get("is_winner")?;
                Ok(BuyerTicket {
                    raffle_id: RaffleId::new(row.try_get::<String, _>("raffle_id")?),
                    raffle_title: row.try_get("title")?,
                    raffle_status: RaffleStatus::from_str(&status).map_err(decode_err)?,
                    number: number as u32,
                    purchase_date: TimeMs::new(row.try_get("purchase_date")?),
                    is_winner: is_winner != 0,
                })
            })
            .collect()
    }
}
