use axum::extract::Query;
use axum::Json;
use serde::Deserialize;

use crate::engine::{quote, PriceQuote};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteQuery {
    pub ticket_count: u32,
    pub is_promoted: Option<bool>,
    pub promotion_months: Option<u8>,
    pub prior_active_count: Option<u32>,
}

/// Public price estimate. Uses the same calculation as the creation charge.
pub async fn get_quote(Query(params): Query<QuoteQuery>) -> Result<Json<PriceQuote>, AppError> {
    let is_promoted = params.is_promoted.unwrap_or(false);
    let price = quote(
        params.ticket_count,
        is_promoted,
        params.promotion_months.unwrap_or(if is_promoted { 1 } else { 0 }),
        params.prior_active_count.unwrap_or(0),
    )?;
    Ok(Json(price))
}
