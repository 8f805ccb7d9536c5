//! Raffle, sold tickets, and the creation payload.

use super::{Money, RaffleId, SessionId, TimeMs, UserId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const MAX_PROMOTION_MONTHS: u8 = 12;
/// Highest accepted ticket price, in whole pesos.
pub const MAX_TICKET_PRICE_PESOS: i64 = 1_000_000;
pub const PROMOTION_MONTH_DAYS: i64 = 30;

/// Lifecycle status of a raffle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RaffleStatus {
    Active,
    Completed,
    Deleted,
}

impl RaffleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RaffleStatus::Active => "active",
            RaffleStatus::Completed => "completed",
            RaffleStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for RaffleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RaffleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(RaffleStatus::Active),
            "completed" => Ok(RaffleStatus::Completed),
            "deleted" => Ok(RaffleStatus::Deleted),
            other => Err(format!("unknown raffle status: {}", other)),
        }
    }
}

/// How the winning ticket is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WinnerSelectionMethod {
    Random,
    Lottery,
    Manual,
}

impl WinnerSelectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            WinnerSelectionMethod::Random => "random",
            WinnerSelectionMethod::Lottery => "lottery",
            WinnerSelectionMethod::Manual => "manual",
        }
    }
}

impl fmt::Display for WinnerSelectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WinnerSelectionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(WinnerSelectionMethod::Random),
            "lottery" => Ok(WinnerSelectionMethod::Lottery),
            "manual" => Ok(WinnerSelectionMethod::Manual),
            other => Err(format!("unknown winner selection method: {}", other)),
        }
    }
}

/// External lottery draw the winner is derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotteryDetails {
    pub date: NaiveDate,
    pub draw_number: String,
}

/// Hosted image reference. The core never touches image bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaffleImage {
    pub url: String,
    pub public_id: String,
}

/// One sold ticket. Created only by a committed purchase, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoldTicket {
    pub number: u32,
    pub buyer: UserId,
    pub purchase_date: TimeMs,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_transaction_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Raffle {
    pub id: RaffleId,
    pub creator: UserId,
    pub title: String,
    pub description: String,
    pub ticket_price: Money,
    pub total_tickets: u32,
    pub images: Vec<RaffleImage>,
    pub contact_info: Option<String>,
    pub social_links: Vec<String>,
    pub created_at: TimeMs,
    pub start_date: TimeMs,
    pub end_date: Option<TimeMs>,
    pub is_promoted: bool,
    pub promotion_end_date: Option<TimeMs>,
    pub winner_selection_method: WinnerSelectionMethod,
    pub lottery_details: Option<LotteryDetails>,
    pub status: RaffleStatus,
    pub winner: Option<UserId>,
    pub winning_ticket_number: Option<u32>,
    /// Audit trail of how the winning index was derived.
    pub winner_seed: Option<String>,
    /// In insertion order.
    pub sold_tickets: Vec<SoldTicket>,
    pub source_session_id: Option<SessionId>,
    pub needs_reconciliation: bool,
}

impl Raffle {
    /// Materialize an active raffle from a validated draft.
    ///
    /// A free raffle never carries a promotion, since its promotion fee was waived.
    pub fn from_draft(
        id: RaffleId,
        creator: UserId,
        draft: RaffleDraft,
        created_at: TimeMs,
        promoted: bool,
    ) -> Self {
        let start_date = draft.start_date.unwrap_or(created_at);
        let is_promoted = promoted && draft.is_promoted;
        let promotion_end_date = if is_promoted {
            let months = draft.promotion_months.unwrap_or(1) as i64;
            Some(start_date.plus_days(months * PROMOTION_MONTH_DAYS))
        } else {
            None
        };

        Raffle {
            id,
            creator,
            title: draft.title,
            description: draft.description,
            ticket_price: draft.ticket_price,
            total_tickets: draft.total_tickets,
            images: draft.images,
            contact_info: draft.contact_info,
            social_links: draft.social_links,
            created_at,
            start_date,
            end_date: draft.end_date,
            is_promoted,
            promotion_end_date,
            winner_selection_method: draft.winner_selection_method,
            lottery_details: draft.lottery_details,
            status: RaffleStatus::Active,
            winner: None,
            winning_ticket_number: None,
            winner_seed: None,
            sold_tickets: Vec::new(),
            source_session_id: None,
            needs_reconciliation: false,
        }
    }

    pub fn sold_count(&self) -> usize {
        self.sold_tickets.len()
    }
}

/// Organizer's creation request. Travels verbatim inside checkout metadata
/// for paid raffles, images included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaffleDraft {
    pub title: String,
    pub description: String,
    pub ticket_price: Money,
    pub total_tickets: u32,
    #[serde(default)]
    pub images: Vec<RaffleImage>,
    #[serde(default)]
    pub contact_info: Option<String>,
    #[serde(default)]
    pub social_links: Vec<String>,
    #[serde(default)]
    pub start_date: Option<TimeMs>,
    #[serde(default)]
    pub end_date: Option<TimeMs>,
    #[serde(default)]
    pub is_promoted: bool,
    #[serde(default)]
    pub promotion_months: Option<u8>,
    pub winner_selection_method: WinnerSelectionMethod,
    #[serde(default)]
    pub lottery_details: Option<LotteryDetails>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("ticket price must be positive")]
    NonPositivePrice,
    #[error("ticket price cannot have more than 2 decimal places")]
    PriceTooPrecise,
    #[error("ticket price cannot exceed {MAX_TICKET_PRICE_PESOS} pesos")]
    PriceTooHigh,
    #[error("total tickets must be at least 1")]
    NoTickets,
    #[error("promotion months must be between 1 and 12")]
    InvalidPromotionMonths,
    #[error("lottery selection requires lottery details with a draw number")]
    MissingLotteryDetails,
    #[error("lottery draw number must be numeric, got {0:?}")]
    NonNumericDrawNumber(String),
    #[error("end date must not precede start date")]
    EndBeforeStart,
    #[error("image entries need both url and publicId")]
    InvalidImage,
}

impl RaffleDraft {
    pub fn validate(&self) -> Result<(), DraftError> {
        if self.title.trim().is_empty() {
            return Err(DraftError::MissingField("title"));
        }
        if self.description.trim().is_empty() {
            return Err(DraftError::MissingField("description"));
        }
        if !self.ticket_price.is_positive() {
            return Err(DraftError::NonPositivePrice);
        }
        if self.ticket_price.decimal_places() > 2 {
            return Err(DraftError::PriceTooPrecise);
        }
        if self.ticket_price > Money::from_pesos(MAX_TICKET_PRICE_PESOS) {
            return Err(DraftError::PriceTooHigh);
        }
        if self.total_tickets == 0 {
            return Err(DraftError::NoTickets);
        }
        if self.is_promoted {
            match self.promotion_months {
                Some(m) if (1..=MAX_PROMOTION_MONTHS).contains(&m) => {}
                _ => return Err(DraftError::InvalidPromotionMonths),
            }
        }
        if self.winner_selection_method == WinnerSelectionMethod::Lottery {
            let details = self
                .lottery_details
                .as_ref()
                .ok_or(DraftError::MissingLotteryDetails)?;
            let draw = details.draw_number.trim();
            if draw.is_empty() {
                return Err(DraftError::MissingLotteryDetails);
            }
            if !draw.chars().all(|c| c.is_ascii_digit()) {
                return Err(DraftError::NonNumericDrawNumber(draw.to_string()));
            }
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end < start {
                return Err(DraftError::EndBeforeStart);
            }
        }
        if self
            .images
            .iter()
            .any(|img| img.url.trim().is_empty() || img.public_id.trim().is_empty())
        {
            return Err(DraftError::InvalidImage);
        }
        Ok(())
    }

    /// Months billed for promotion; zero when not promoted.
    pub fn billed_promotion_months(&self) -> u8 {
        if self.is_promoted {
            self.promotion_months.unwrap_or(0)
        } else {
            0
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn draft(total_tickets: u32) -> RaffleDraft {
        RaffleDraft {
            title: "Bicicleta de montaña".to_string(),
            description: "Rodada 29, nueva".to_string(),
            ticket_price: Money::from_pesos(50),
            total_tickets,
            images: vec![RaffleImage {
                url: "https://img.example/bici.jpg".to_string(),
                public_id: "raffles/bici".to_string(),
            }],
            contact_info: Some("whatsapp 555-0100".to_string()),
            social_links: vec![],
            start_date: None,
            end_date: None,
            is_promoted: false,
            promotion_months: None,
            winner_selection_method: WinnerSelectionMethod::Random,
            lottery_details: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::draft;
    use super::*;

    #[test]
    fn test_valid_draft() {
        assert_eq!(draft(10).validate(), Ok(()));
    }

    #[test]
    fn test_zero_tickets_rejected() {
        assert_eq!(draft(0).validate(), Err(DraftError::NoTickets));
    }

    #[test]
    fn test_blank_title_rejected() {
        let mut d = draft(10);
        d.title = "  ".to_string();
        assert_eq!(d.validate(), Err(DraftError::MissingField("title")));
    }

    #[test]
    fn test_ticket_price_bounds() {
        let mut d = draft(10);
        d.ticket_price = Money::from_scaled(-5, 0);
        assert_eq!(d.validate(), Err(DraftError::NonPositivePrice));
        d.ticket_price = Money::from_scaled(10_005, 3);
        assert_eq!(d.validate(), Err(DraftError::PriceTooPrecise));
        d.ticket_price = Money::from_scaled(10_050, 3);
        assert_eq!(d.validate(), Ok(()));
        d.ticket_price = Money::new(rust_decimal::Decimal::MAX);
        assert_eq!(d.validate(), Err(DraftError::PriceTooHigh));
        d.ticket_price = Money::from_pesos(MAX_TICKET_PRICE_PESOS);
        assert_eq!(d.validate(), Ok(()));
    }

    #[test]
    fn test_promotion_months_bounds() {
        let mut d = draft(10);
        d.is_promoted = true;
        d.promotion_months = Some(0);
        assert_eq!(d.validate(), Err(DraftError::InvalidPromotionMonths));
        d.promotion_months = Some(13);
        assert_eq!(d.validate(), Err(DraftError::InvalidPromotionMonths));
        d.promotion_months = Some(12);
        assert_eq!(d.validate(), Ok(()));
    }

    #[test]
    fn test_lottery_requires_numeric_draw() {
        let mut d = draft(10);
        d.winner_selection_method = WinnerSelectionMethod::Lottery;
        assert_eq!(d.validate(), Err(DraftError::MissingLotteryDetails));

        d.lottery_details = Some(LotteryDetails {
            date: NaiveDate::from_ymd_opt(2026, 12, 24).unwrap(),
            draw_number: "38A".to_string(),
        });
        assert!(matches!(
            d.validate(),
            Err(DraftError::NonNumericDrawNumber(_))
        ));

        d.lottery_details.as_mut().unwrap().draw_number = "03821".to_string();
        assert_eq!(d.validate(), Ok(()));
    }

    #[test]
    fn test_from_draft_sets_promotion_window() {
        let mut d = draft(500);
        d.is_promoted = true;
        d.promotion_months = Some(2);
        d.start_date = Some(TimeMs::new(0));
        let r = Raffle::from_draft(
            RaffleId::new("r"),
            UserId::new("u"),
            d.clone(),
            TimeMs::new(5),
            true,
        );
        assert!(r.is_promoted);
        assert_eq!(r.promotion_end_date, Some(TimeMs::new(0).plus_days(60)));
        assert_eq!(r.status, RaffleStatus::Active);

        let free = Raffle::from_draft(RaffleId::new("r2"), UserId::new("u"), d, TimeMs::new(5), false);
        assert!(!free.is_promoted);
        assert_eq!(free.promotion_end_date, None);
    }

    #[test]
    fn test_status_round_trip() {
        for s in [
            RaffleStatus::Active,
            RaffleStatus::Completed,
            RaffleStatus::Deleted,
        ] {
            assert_eq!(s.as_str().parse::<RaffleStatus>().unwrap(), s);
        }
    }
}
