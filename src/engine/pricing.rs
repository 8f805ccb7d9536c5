//! Raffle-creation pricing.
//!
//! `quote` is the single source of truth for what an organizer is charged. The
//! public estimate endpoint and the authoritative charge at creation both call
//! it, so the two can never disagree.

use crate::domain::raffle::MAX_PROMOTION_MONTHS;
use crate::domain::{Money, MoneyError};
use serde::Serialize;
use thiserror::Error;

/// Creators with no active raffles get one raffle of up to this many tickets free.
pub const FREE_RAFFLE_MAX_TICKETS: u32 = 100;
/// Above this count the commission switches to a flat per-ticket rate.
pub const PER_TEN_TIER_LIMIT: u32 = 1_000_000;

const FIXED_FEE_PESOS: i64 = 20;
const PROMOTION_MONTHLY_PESOS: i64 = 500;

/// Derived, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub fixed_fee: Money,
    pub tiered_commission: Money,
    pub promotion_fee: Money,
    pub total: Money,
    pub is_free_raffle: bool,
}

impl PriceQuote {
    fn free() -> Self {
        PriceQuote {
            fixed_fee: Money::zero(),
            tiered_commission: Money::zero(),
            promotion_fee: Money::zero(),
            total: Money::zero(),
            is_free_raffle: true,
        }
    }

    pub fn requires_payment(&self) -> bool {
        self.total.is_positive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("ticket count must be at least 1")]
    NoTickets,
    #[error("promotion months must be between 1 and 12, got {0}")]
    InvalidPromotionMonths(u8),
    #[error(transparent)]
    Amount(#[from] MoneyError),
}

/// Per-10-tickets commission rate for `ticket_count`, or None past the per-10 tiers.
fn per_ten_rate(ticket_count: u32) -> Option<Money> {
    match ticket_count {
        0..=100 => Some(Money::from_scaled(100, 2)),
        101..=1_000 => Some(Money::from_scaled(80, 2)),
        1_001..=10_000 => Some(Money::from_scaled(70, 2)),
        10_001..=50_000 => Some(Money::from_scaled(50, 2)),
        50_001..=PER_TEN_TIER_LIMIT => Some(Money::from_scaled(30, 2)),
        _ => None,
    }
}

fn tiered_commission(ticket_count: u32) -> Result<Money, MoneyError> {
    match per_ten_rate(ticket_count) {
        // ceiling applies to the count of tens, never to the money value
        Some(rate) => rate.times(u64::from(ticket_count).div_ceil(10)),
        None => Money::from_scaled(1, 2).times(u64::from(ticket_count)),
    }
}

/// Price a raffle creation.
///
/// `promotion_months` is only read when `is_promoted` is set.
pub fn quote(
    ticket_count: u32,
    is_promoted: bool,
    promotion_months: u8,
    prior_active_raffles: u32,
) -> Result<PriceQuote, PricingError> {
    if ticket_count == 0 {
        return Err(PricingError::NoTickets);
    }
    if is_promoted && !(1..=MAX_PROMOTION_MONTHS).contains(&promotion_months) {
        return Err(PricingError::InvalidPromotionMonths(promotion_months));
    }

    if prior_active_raffles == 0 && ticket_count <= FREE_RAFFLE_MAX_TICKETS {
        return Ok(PriceQuote::free());
    }

    let fixed_fee = Money::from_pesos(FIXED_FEE_PESOS);
    let tiered_commission = tiered_commission(ticket_count)?;
    let promotion_fee = if is_promoted {
        Money::from_pesos(PROMOTION_MONTHLY_PESOS).times(u64::from(promotion_months))?
    } else {
        Money::zero()
    };

    Ok(PriceQuote {
        fixed_fee,
        tiered_commission,
        promotion_fee,
        total: fixed_fee
            .checked_add(tiered_commission)?
            .checked_add(promotion_fee)?,
        is_free_raffle: false,
    })
}
