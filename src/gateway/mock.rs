//! In-memory payment gateway for tests and local runs.

use super::{
    CheckoutRequest, CheckoutSession, GatewayError, PaymentGateway, PaymentStatus, SessionDetails,
};
use crate::domain::SessionId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct MockSession {
    request: CheckoutRequest,
    payment_status: PaymentStatus,
    amount_total: Option<i64>,
}

/// Gateway that records opened sessions and lets tests mark them paid.
#[derive(Debug, Default)]
pub struct MockGateway {
    next_id: AtomicU64,
    sessions: Mutex<HashMap<SessionId, MockSession>>,
    opened: Mutex<Vec<SessionId>>,
    fail_open: bool,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `open_checkout` call fails with a gateway error.
    pub fn with_open_failure(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Number of sessions opened so far.
    pub fn opened_count(&self) -> usize {
        self.opened.lock().map(|o| o.len()).unwrap_or(0)
    }

    /// Ids of opened sessions, oldest first.
    pub fn opened_sessions(&self) -> Vec<SessionId> {
        self.opened.lock().map(|o| o.clone()).unwrap_or_default()
    }

    /// The request a session was opened with.
    pub fn request_for(&self, session_id: &SessionId) -> Option<CheckoutRequest> {
        self.sessions
            .lock()
            .ok()?
            .get(session_id)
            .map(|s| s.request.clone())
    }

    /// Mark a session paid. `amount_total` defaults to the request total.
    pub fn mark_paid(&self, session_id: &SessionId, amount_total: Option<i64>) -> bool {
        let Ok(mut sessions) = self.sessions.lock() else {
            return false;
        };
        match sessions.get_mut(session_id) {
            Some(session) => {
                session.payment_status = PaymentStatus::Paid;
                session.amount_total = amount_total.or_else(|| {
                    session
                        .request
                        .total()
                        .ok()
                        .and_then(|total| total.to_minor_units())
                });
                true
            }
            None => false,
        }
    }

    /// Gateway-side view of a session, as a webhook would carry it.
    pub fn details(&self, session_id: &SessionId) -> Option<SessionDetails> {
        let sessions = self.sessions.lock().ok()?;
        sessions.get(session_id).map(|s| SessionDetails {
            session_id: session_id.clone(),
            payment_status: s.payment_status,
            metadata: s.request.metadata.clone(),
            amount_total: s.amount_total,
        })
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn open_checkout(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        if self.fail_open {
            return Err(GatewayError::HttpError {
                status: 503,
                message: "Server error".to_string(),
            });
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let session_id = SessionId::new(format!("cs_test_{}", n));
        let url = format!("https://checkout.test/pay/{}", session_id);

        self.sessions
            .lock()
            .map_err(|e| GatewayError::NetworkError(e.to_string()))?
            .insert(
                session_id.clone(),
                MockSession {
                    request,
                    payment_status: PaymentStatus::Unpaid,
                    amount_total: None,
                },
            );
        self.opened
            .lock()
            .map_err(|e| GatewayError::NetworkError(e.to_string()))?
            .push(session_id.clone());

        Ok(CheckoutSession { session_id, url })
    }

    async fn retrieve_session(
        &self,
        session_id: &SessionId,
    ) -> Result<SessionDetails, GatewayError> {
        self.details(session_id)
            .ok_or_else(|| GatewayError::NotFound(session_id.to_string()))
    }
}
