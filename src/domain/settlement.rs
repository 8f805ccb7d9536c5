//! Settlement bookkeeping: outcomes and the manual reconciliation queue.

use super::{RaffleId, SessionId, TimeMs};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal result of settling one checkout session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementOutcome {
    TicketsCommitted,
    RaffleCreated,
    /// Money moved but no product could be delivered; see the reconciliation queue.
    Anomaly,
}

impl SettlementOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementOutcome::TicketsCommitted => "tickets_committed",
            SettlementOutcome::RaffleCreated => "raffle_created",
            SettlementOutcome::Anomaly => "anomaly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tickets_committed" => Some(SettlementOutcome::TicketsCommitted),
            "raffle_created" => Some(SettlementOutcome::RaffleCreated),
            "anomaly" => Some(SettlementOutcome::Anomaly),
            _ => None,
        }
    }
}

/// Why a settlement needs a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationReason {
    /// Paid numbers were sold to someone else while payment was in flight.
    TicketsUnavailable,
    RaffleMissing,
    RaffleNotActive,
    /// The buyer or creator no longer exists; settled against the placeholder user.
    UnknownUser,
    AmountMismatch,
    InvalidMetadata,
}

impl ReconciliationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconciliationReason::TicketsUnavailable => "tickets_unavailable",
            ReconciliationReason::RaffleMissing => "raffle_missing",
            ReconciliationReason::RaffleNotActive => "raffle_not_active",
            ReconciliationReason::UnknownUser => "unknown_user",
            ReconciliationReason::AmountMismatch => "amount_mismatch",
            ReconciliationReason::InvalidMetadata => "invalid_metadata",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tickets_unavailable" => Some(ReconciliationReason::TicketsUnavailable),
            "raffle_missing" => Some(ReconciliationReason::RaffleMissing),
            "raffle_not_active" => Some(ReconciliationReason::RaffleNotActive),
            "unknown_user" => Some(ReconciliationReason::UnknownUser),
            "amount_mismatch" => Some(ReconciliationReason::AmountMismatch),
            "invalid_metadata" => Some(ReconciliationReason::InvalidMetadata),
            _ => None,
        }
    }
}

impl fmt::Display for ReconciliationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A flagged settlement awaiting manual follow-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconciliation {
    pub session_id: SessionId,
    pub reason: ReconciliationReason,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raffle_id: Option<RaffleId>,
    pub created_at: TimeMs,
}

impl Reconciliation {
    pub fn new(
        session_id: SessionId,
        reason: ReconciliationReason,
        detail: impl Into<String>,
        raffle_id: Option<RaffleId>,
    ) -> Self {
        Self {
            session_id,
            reason,
            detail: detail.into(),
            raffle_id,
            created_at: TimeMs::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_round_trip() {
        for r in [
            ReconciliationReason::TicketsUnavailable,
            ReconciliationReason::RaffleMissing,
            ReconciliationReason::RaffleNotActive,
            ReconciliationReason::UnknownUser,
            ReconciliationReason::AmountMismatch,
            ReconciliationReason::InvalidMetadata,
        ] {
            assert_eq!(ReconciliationReason::parse(r.as_str()), Some(r));
        }
    }

    #[test]
    fn test_outcome_parse_unknown() {
        assert_eq!(SettlementOutcome::parse("refunded"), None);
        assert_eq!(
            SettlementOutcome::parse("anomaly"),
            Some(SettlementOutcome::Anomaly)
        );
    }
}
