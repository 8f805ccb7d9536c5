//! Webhook signature verification and event parsing.
//!
//! The signature header has the form `t=<unix secs>,v1=<hex hmac>[,v1=...]`.
//! The MAC is HMAC-SHA256 keyed by the endpoint secret over `"<t>.<raw body>"`.

use super::{RawSession, SessionDetails};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("missing signature header")]
    MissingHeader,
    #[error("malformed signature header")]
    MalformedHeader,
    #[error("signature timestamp {timestamp} outside tolerance (now {now})")]
    TimestampOutsideTolerance { timestamp: i64, now: i64 },
    #[error("no signature matches the payload")]
    NoMatchingSignature,
    #[error("invalid webhook secret")]
    InvalidSecret,
    #[error("invalid event payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// A verified gateway event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    pub id: String,
    pub event_type: String,
    /// Present for `checkout.session.*` events.
    pub session: Option<SessionDetails>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
}

#[derive(Debug, Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

fn mac_for(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidSecret)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Verify `header` against `payload`. Comparison is constant time.
pub fn verify_webhook_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now_secs: i64,
) -> Result<(), SignatureError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<Vec<u8>> = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                timestamp = Some(
                    value
                        .parse::<i64>()
                        .map_err(|_| SignatureError::MalformedHeader)?,
                )
            }
            "v1" => {
                // undecodable entries can never match; skip rather than fail
                if let Ok(sig) = hex::decode(value) {
                    signatures.push(sig);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(SignatureError::NoMatchingSignature);
    }
    if (now_secs - timestamp).abs() > tolerance_secs {
        return Err(SignatureError::TimestampOutsideTolerance {
            timestamp,
            now: now_secs,
        });
    }

    let mac = mac_for(secret, timestamp, payload)?;
    if signatures
        .iter()
        .any(|sig| mac.clone().verify_slice(sig).is_ok())
    {
        Ok(())
    } else {
        Err(SignatureError::NoMatchingSignature)
    }
}

/// Build a signature header for `payload`, as the gateway would.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, SignatureError> {
    let mac = mac_for(secret, timestamp, payload)?;
    Ok(format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Verify, then parse. Nothing is parsed from an unverified payload.
pub fn construct_event(
    payload: &[u8],
    header: Option<&str>,
    secret: &str,
    tolerance_secs: i64,
    now_secs: i64,
) -> Result<WebhookEvent, SignatureError> {
    let header = header.ok_or(SignatureError::MissingHeader)?;
    verify_webhook_signature(payload, header, secret, tolerance_secs, now_secs)?;

    let raw: RawEvent = serde_json::from_slice(payload)?;
    let session = if raw.event_type.starts_with("checkout.session.") {
        let session: RawSession = serde_json::from_value(raw.data.object)?;
        Some(session.into())
    } else {
        None
    };

    Ok(WebhookEvent {
        id: raw.id,
        event_type: raw.event_type,
        session,
    })
}
