//! Payment gateway abstraction: checkout sessions and webhook events.

use crate::domain::{Money, MoneyError, SessionId};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

pub mod mock;
pub mod signature;
pub mod stripe;

pub use mock::MockGateway;
pub use signature::{construct_event, sign_payload, verify_webhook_signature, SignatureError};
pub use stripe::StripeGateway;

pub const CURRENCY: &str = "mxn";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    pub name: String,
    pub description: String,
    pub unit_amount: Money,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub line_items: Vec<LineItem>,
    pub metadata: BTreeMap<String, String>,
    pub success_url: String,
    pub cancel_url: String,
}

impl CheckoutRequest {
    pub fn total(&self) -> Result<Money, MoneyError> {
        self.line_items.iter().try_fold(Money::zero(), |acc, li| {
            acc.checked_add(li.unit_amount.times(u64::from(li.quantity))?)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub session_id: SessionId,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
}

impl PaymentStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "paid" => PaymentStatus::Paid,
            "no_payment_required" => PaymentStatus::NoPaymentRequired,
            _ => PaymentStatus::Unpaid,
        }
    }
}

/// Gateway view of a checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDetails {
    pub session_id: SessionId,
    pub payment_status: PaymentStatus,
    pub metadata: BTreeMap<String, String>,
    /// Charged total in minor units, when the gateway reports it.
    pub amount_total: Option<i64>,
}

/// Checkout session object as serialized by the gateway API and in webhook events.
#[derive(Debug, Deserialize)]
pub(crate) struct RawSession {
    id: String,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    metadata: Option<BTreeMap<String, String>>,
    #[serde(default)]
    amount_total: Option<i64>,
}

impl From<RawSession> for SessionDetails {
    fn from(raw: RawSession) -> Self {
        SessionDetails {
            session_id: SessionId::new(raw.id),
            payment_status: PaymentStatus::parse(raw.payment_status.as_deref().unwrap_or("")),
            metadata: raw.metadata.unwrap_or_default(),
            amount_total: raw.amount_total,
        }
    }
}

/// Payment gateway operations consumed by the settlement coordinator.
///
/// Implementations retry transient failures themselves.
#[async_trait]
pub trait PaymentGateway: Send + Sync + fmt::Debug {
    /// Open a hosted checkout session.
    async fn open_checkout(&self, request: CheckoutRequest)
        -> Result<CheckoutSession, GatewayError>;

    /// Fetch the current state of a session.
    async fn retrieve_session(&self, session_id: &SessionId)
        -> Result<SessionDetails, GatewayError>;
}

/// Error type for gateway operations.
#[derive(Debug, Clone)]
pub enum GatewayError {
    /// Connection timeout, DNS failure and the like
    NetworkError(String),
    /// Non-success HTTP status
    HttpError { status: u16, message: String },
    /// Unexpected response body
    ParseError(String),
    RateLimited,
    /// Request could not be built (e.g. amount out of range)
    InvalidRequest(String),
    NotFound(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            GatewayError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            GatewayError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            GatewayError::RateLimited => write!(f, "Rate limited"),
            GatewayError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            GatewayError::NotFound(id) => write!(f, "Session not found: {}", id),
        }
    }
}

impl std::error::Error for GatewayError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_error_display() {
        let err = GatewayError::HttpError {
            status: 402,
            message: "card declined".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP error 402: card declined");
        assert_eq!(GatewayError::RateLimited.to_string(), "Rate limited");
    }

    #[test]
    fn test_request_total() {
        let req = CheckoutRequest {
            line_items: vec![LineItem {
                name: "Boletos".to_string(),
                description: "2 boleto(s): 3, 4".to_string(),
                unit_amount: Money::from_pesos(50),
                quantity: 2,
            }],
            metadata: BTreeMap::new(),
            success_url: "https://x/ok".to_string(),
            cancel_url: "https://x/cancel".to_string(),
        };
        assert_eq!(req.total(), Ok(Money::from_pesos(100)));

        let huge = CheckoutRequest {
            line_items: vec![LineItem {
                name: "Boletos".to_string(),
                description: "2 boleto(s): 1, 2".to_string(),
                unit_amount: Money::new(rust_decimal::Decimal::MAX),
                quantity: 2,
            }],
            ..req
        };
        assert_eq!(huge.total(), Err(MoneyError::Overflow));
    }

    #[test]
    fn test_payment_status_parse() {
        assert_eq!(PaymentStatus::parse("paid"), PaymentStatus::Paid);
        assert_eq!(PaymentStatus::parse("unpaid"), PaymentStatus::Unpaid);
        assert_eq!(
            PaymentStatus::parse("no_payment_required"),
            PaymentStatus::NoPaymentRequired
        );
    }
}
