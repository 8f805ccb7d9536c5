//! Checkout intent metadata and pending checkouts.
//!
//! Everything needed to reconstruct the effect of a payment travels through the
//! gateway as one versioned JSON document. The document is validated as a whole
//! on the way back; a session whose metadata fails validation is never settled
//! field by field.

use super::{Money, RaffleDraft, RaffleId, SessionId, TimeMs, UserId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

pub const METADATA_VERSION: u32 = 1;

/// Gateway metadata values are capped at this many characters.
pub const METADATA_VALUE_LIMIT: usize = 500;
/// Gateway metadata allows 50 keys; one is spent on the chunk count.
pub const METADATA_MAX_CHUNKS: usize = 49;
const CHUNK_COUNT_KEY: &str = "checkout_chunks";
const CHUNK_KEY_PREFIX: &str = "checkout_";

/// What a checkout session pays for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckoutIntent {
    TicketPurchase {
        raffle_id: RaffleId,
        buyer_id: UserId,
        ticket_numbers: Vec<u32>,
    },
    RaffleCreation {
        creator_id: UserId,
        draft: RaffleDraft,
    },
}

impl CheckoutIntent {
    pub fn kind(&self) -> CheckoutKind {
        match self {
            CheckoutIntent::TicketPurchase { .. } => CheckoutKind::TicketPurchase,
            CheckoutIntent::RaffleCreation { .. } => CheckoutKind::RaffleCreation,
        }
    }

    /// The user the settled effect is attributed to.
    pub fn owner(&self) -> &UserId {
        match self {
            CheckoutIntent::TicketPurchase { buyer_id, .. } => buyer_id,
            CheckoutIntent::RaffleCreation { creator_id, .. } => creator_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutKind {
    TicketPurchase,
    RaffleCreation,
}

impl CheckoutKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutKind::TicketPurchase => "ticket_purchase",
            CheckoutKind::RaffleCreation => "raffle_creation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ticket_purchase" => Some(CheckoutKind::TicketPurchase),
            "raffle_creation" => Some(CheckoutKind::RaffleCreation),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("checkout metadata missing")]
    Missing,
    #[error("checkout metadata chunk {0} missing")]
    MissingChunk(usize),
    #[error("checkout metadata too large: {0} chunks")]
    TooLarge(usize),
    #[error("unsupported checkout metadata version {0}")]
    UnsupportedVersion(u32),
    #[error("malformed checkout metadata: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid checkout metadata: {0}")]
    Invalid(String),
}

/// Versioned envelope around a [`CheckoutIntent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutMetadata {
    pub version: u32,
    pub intent: CheckoutIntent,
}

impl CheckoutMetadata {
    pub fn new(intent: CheckoutIntent) -> Self {
        Self {
            version: METADATA_VERSION,
            intent,
        }
    }

    /// Encode into gateway metadata key/value pairs, chunked to the value limit.
    pub fn to_gateway_metadata(&self) -> Result<BTreeMap<String, String>, MetadataError> {
        let json = serde_json::to_string(self)?;
        let chars: Vec<char> = json.chars().collect();
        let chunks: Vec<String> = chars
            .chunks(METADATA_VALUE_LIMIT)
            .map(|c| c.iter().collect())
            .collect();
        if chunks.len() > METADATA_MAX_CHUNKS {
            return Err(MetadataError::TooLarge(chunks.len()));
        }

        let mut map = BTreeMap::new();
        map.insert(CHUNK_COUNT_KEY.to_string(), chunks.len().to_string());
        for (i, chunk) in chunks.into_iter().enumerate() {
            map.insert(format!("{}{:02}", CHUNK_KEY_PREFIX, i), chunk);
        }
        Ok(map)
    }

    /// Reassemble and validate metadata returned by the gateway.
    pub fn from_gateway_metadata(map: &BTreeMap<String, String>) -> Result<Self, MetadataError> {
        let count: usize = map
            .get(CHUNK_COUNT_KEY)
            .ok_or(MetadataError::Missing)?
            .parse()
            .map_err(|_| MetadataError::Invalid("chunk count is not a number".to_string()))?;
        if count == 0 {
            return Err(MetadataError::Missing);
        }
        if count > METADATA_MAX_CHUNKS {
            return Err(MetadataError::TooLarge(count));
        }

        let mut json = String::new();
        for i in 0..count {
            let chunk = map
                .get(&format!("{}{:02}", CHUNK_KEY_PREFIX, i))
                .ok_or(MetadataError::MissingChunk(i))?;
            json.push_str(chunk);
        }

        let metadata: CheckoutMetadata = serde_json::from_str(&json)?;
        metadata.validate()?;
        Ok(metadata)
    }

    fn validate(&self) -> Result<(), MetadataError> {
        if self.version != METADATA_VERSION {
            return Err(MetadataError::UnsupportedVersion(self.version));
        }
        match &self.intent {
            CheckoutIntent::TicketPurchase { ticket_numbers, .. } => {
                if ticket_numbers.is_empty() {
                    return Err(MetadataError::Invalid("no ticket numbers".to_string()));
                }
                let mut seen = HashSet::new();
                if !ticket_numbers.iter().all(|n| seen.insert(*n)) {
                    return Err(MetadataError::Invalid(
                        "duplicate ticket numbers".to_string(),
                    ));
                }
                Ok(())
            }
            CheckoutIntent::RaffleCreation { draft, .. } => draft
                .validate()
                .map_err(|e| MetadataError::Invalid(e.to_string())),
        }
    }
}

/// A checkout opened with the gateway and not yet confirmed.
///
/// Never reserves ticket numbers; availability is re-validated at settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCheckout {
    pub session_id: SessionId,
    pub intent: CheckoutIntent,
    pub amount: Money,
    pub created_at: TimeMs,
}

impl PendingCheckout {
    pub fn kind(&self) -> CheckoutKind {
        self.intent.kind()
    }

    pub fn is_expired(&self, now: TimeMs, ttl_ms: i64) -> bool {
        now.as_ms().saturating_sub(self.created_at.as_ms()) > ttl_ms
    }
}
