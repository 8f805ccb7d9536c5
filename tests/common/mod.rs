#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use rafflehub::api;
use rafflehub::config::Config;
use rafflehub::db::init_db;
use rafflehub::gateway::{sign_payload, MockGateway};
use rafflehub::{Repository, SessionId, TimeMs, UserId};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

pub const WEBHOOK_SECRET: &str = "whsec_integration";

pub struct TestApp {
    pub app: axum::Router,
    pub repo: Arc<Repository>,
    pub gateway: Arc<MockGateway>,
    _temp: TempDir,
}

pub fn test_config(db_path: String) -> Config {
    Config {
        port: 0,
        database_path: db_path,
        payment_api_url: "http://example.invalid".to_string(),
        payment_secret_key: "sk_test".to_string(),
        payment_webhook_secret: WEBHOOK_SECRET.to_string(),
        public_base_url: "https://rifas.test".to_string(),
        webhook_tolerance_secs: 300,
        checkout_ttl_ms: 86_400_000,
        settlement_retry_ms: 2_000,
        placeholder_user_id: UserId::new("unassigned"),
        sweep_interval_secs: 300,
    }
}

pub async fn setup_test_app() -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));
    let gateway = Arc::new(MockGateway::new());

    let state = api::AppState::new(repo.clone(), gateway.clone(), test_config(db_path));
    TestApp {
        app: api::create_router(state),
        repo,
        gateway,
        _temp: temp_dir,
    }
}

impl TestApp {
    /// Send a request as `user` (no identity headers when None).
    pub async fn call(
        &self,
        method: &str,
        uri: &str,
        user: Option<(&str, &str)>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some((id, role)) = user {
            req = req.header("x-user-id", id).header("x-user-role", role);
        }
        let req = match body {
            Some(json) => req
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        self.send(req).await
    }

    pub async fn send(&self, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    /// Deliver a signed `checkout.session.completed` event for a paid mock session.
    pub async fn deliver_paid(&self, session_id: &str) -> (StatusCode, serde_json::Value) {
        let session_id = SessionId::new(session_id);
        self.gateway.mark_paid(&session_id, None);
        let details = self.gateway.details(&session_id).unwrap();
        let body = serde_json::json!({
            "id": format!("evt_{}", session_id),
            "type": "checkout.session.completed",
            "data": {"object": {
                "id": session_id.as_str(),
                "payment_status": "paid",
                "amount_total": details.amount_total,
                "metadata": details.metadata,
            }}
        })
        .to_string();
        let header = sign_payload(body.as_bytes(), WEBHOOK_SECRET, TimeMs::now().as_secs()).unwrap();
        self.post_webhook(body, Some(header)).await
    }

    pub async fn post_webhook(
        &self,
        body: String,
        signature: Option<String>,
    ) -> (StatusCode, serde_json::Value) {
        let mut req = Request::builder()
            .method("POST")
            .uri("/v1/webhooks/payment")
            .header("content-type", "application/json");
        if let Some(sig) = signature {
            req = req.header("stripe-signature", sig);
        }
        self.send(req.body(Body::from(body)).unwrap()).await
    }

    /// Create a free raffle (creator's first, at most 100 tickets) and return its id.
    pub async fn create_free_raffle(&self, creator: &str, body: serde_json::Value) -> String {
        let (status, json) = self
            .call("POST", "/v1/raffles", Some((creator, "user")), Some(body))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", json);
        json["raffleId"].as_str().unwrap().to_string()
    }
}

pub fn draft(total_tickets: u32, method: &str) -> serde_json::Value {
    let mut body = serde_json::json!({
        "title": "Bicicleta de montaña",
        "description": "Rodada 29, nueva",
        "ticketPrice": "50",
        "totalTickets": total_tickets,
        "winnerSelectionMethod": method,
    });
    if method == "lottery" {
        body["lotteryDetails"] = serde_json::json!({"date": "2026-12-01", "drawNumber": "03821"});
    }
    body
}
