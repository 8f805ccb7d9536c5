mod common;

use axum::http::StatusCode;
use common::{draft, setup_test_app};
use futures::future::join_all;
use rafflehub::RaffleId;
use std::sync::Arc;

/// Every buyer pays for the same number; exactly one payment gets it and
/// the rest land in the reconciliation queue.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_payments_never_double_sell() {
    const BUYERS: usize = 8;
    let t = Arc::new(setup_test_app().await);
    let raffle_id = t.create_free_raffle("ana", draft(10, "random")).await;

    let mut sessions = Vec::new();
    for i in 0..BUYERS {
        let buyer = format!("buyer-{}", i);
        let (status, json) = t
            .call(
                "POST",
                &format!("/v1/raffles/{}/tickets", raffle_id),
                Some((buyer.as_str(), "user")),
                Some(serde_json::json!({"ticketNumbers": [5]})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        sessions.push(json["sessionId"].as_str().unwrap().to_string());
    }

    let handles = sessions.into_iter().map(|session_id| {
        let t = t.clone();
        tokio::spawn(async move { t.deliver_paid(&session_id).await })
    });

    let mut committed = 0;
    let mut anomalies = 0;
    for result in join_all(handles).await {
        let (status, ack) = result.unwrap();
        assert_eq!(status, StatusCode::OK);
        match ack["status"].as_str().unwrap() {
            "tickets_committed" => committed += 1,
            "anomaly" => anomalies += 1,
            other => panic!("unexpected status {}", other),
        }
    }
    assert_eq!(committed, 1);
    assert_eq!(anomalies, BUYERS - 1);

    let sold = t.repo.sold_tickets(&RaffleId::new(&raffle_id)).await.unwrap();
    assert_eq!(sold.len(), 1);
    assert_eq!(sold[0].number, 5);

    let (_, queue) = t
        .call("GET", "/v1/admin/reconciliations", Some(("root", "admin")), None)
        .await;
    let queue = queue["reconciliations"].as_array().unwrap();
    assert_eq!(queue.len(), BUYERS - 1);
    assert!(queue.iter().all(|r| r["reason"] == "tickets_unavailable"));
}
