mod common;

use axum::http::StatusCode;
use common::{draft, setup_test_app};
use rafflehub::{RaffleId, UserId};

#[tokio::test]
async fn test_purchase_settles_and_blocks_resale() {
    let t = setup_test_app().await;
    let raffle_id = t.create_free_raffle("ana", draft(10, "random")).await;

    let (status, json) = t
        .call(
            "POST",
            &format!("/v1/raffles/{}/tickets", raffle_id),
            Some(("beto", "user")),
            Some(serde_json::json!({"ticketNumbers": [3, 4]})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", json);
    assert_eq!(json["amount"], "100");
    assert!(json["checkoutUrl"].as_str().unwrap().starts_with("https://"));
    let session_id = json["sessionId"].as_str().unwrap().to_string();

    let (status, ack) = t.deliver_paid(&session_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["received"], true);
    assert_eq!(ack["status"], "tickets_committed");

    let (_, raffle) = t
        .call("GET", &format!("/v1/raffles/{}", raffle_id), None, None)
        .await;
    let sold: Vec<u64> = raffle["soldTickets"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["number"].as_u64().unwrap())
        .collect();
    assert_eq!(sold, vec![3, 4]);
    assert_eq!(raffle["soldTickets"][0]["buyer"], "beto");

    let opened_before = t.gateway.opened_count();
    let (status, json) = t
        .call(
            "POST",
            &format!("/v1/raffles/{}/tickets", raffle_id),
            Some(("carla", "user")),
            Some(serde_json::json!({"ticketNumbers": [4]})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["rejected"], serde_json::json!([4]));
    assert_eq!(t.gateway.opened_count(), opened_before);

    let (_, mine) = t
        .call("GET", "/v1/users/me/tickets", Some(("beto", "user")), None)
        .await;
    assert_eq!(mine["tickets"].as_array().unwrap().len(), 2);
    assert_eq!(mine["tickets"][0]["raffleId"], raffle_id.as_str());
}

#[tokio::test]
async fn test_webhook_replay_is_a_noop() {
    let t = setup_test_app().await;
    let raffle_id = t.create_free_raffle("ana", draft(10, "random")).await;

    let (_, json) = t
        .call(
            "POST",
            &format!("/v1/raffles/{}/tickets", raffle_id),
            Some(("beto", "user")),
            Some(serde_json::json!({"ticketNumbers": [7]})),
        )
        .await;
    let session_id = json["sessionId"].as_str().unwrap().to_string();

    let (_, first) = t.deliver_paid(&session_id).await;
    let (status, second) = t.deliver_paid(&session_id).await;
    assert_eq!(first["status"], "tickets_committed");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["status"], "duplicate");

    let sold = t.repo.sold_tickets(&RaffleId::new(&raffle_id)).await.unwrap();
    assert_eq!(sold.len(), 1);
}

#[tokio::test]
async fn test_bad_signature_rejected_without_effect() {
    let t = setup_test_app().await;
    let raffle_id = t.create_free_raffle("ana", draft(10, "random")).await;
    let (_, json) = t
        .call(
            "POST",
            &format!("/v1/raffles/{}/tickets", raffle_id),
            Some(("beto", "user")),
            Some(serde_json::json!({"ticketNumbers": [1]})),
        )
        .await;
    let session_id = json["sessionId"].as_str().unwrap();

    let body = serde_json::json!({
        "id": "evt_forged",
        "type": "checkout.session.completed",
        "data": {"object": {"id": session_id, "payment_status": "paid"}}
    })
    .to_string();

    let (status, _) = t
        .post_webhook(body.clone(), Some("t=1,v1=00ff".to_string()))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = t.post_webhook(body, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let sold = t.repo.sold_tickets(&RaffleId::new(&raffle_id)).await.unwrap();
    assert!(sold.is_empty());
}

#[tokio::test]
async fn test_availability_and_identity() {
    let t = setup_test_app().await;
    let raffle_id = t.create_free_raffle("ana", draft(10, "random")).await;
    t.repo
        .commit_tickets(&RaffleId::new(&raffle_id), &UserId::new("ana"), &[2], None)
        .await
        .unwrap()
        .unwrap();

    let (status, json) = t
        .call(
            "GET",
            &format!("/v1/raffles/{}/availability?numbers=1,2,11,1", raffle_id),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["accepted"], serde_json::json!([1]));
    assert_eq!(json["rejected"], serde_json::json!([2, 11, 1]));

    let (status, _) = t
        .call(
            "POST",
            &format!("/v1/raffles/{}/tickets", raffle_id),
            None,
            Some(serde_json::json!({"ticketNumbers": [1]})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = t
        .call(
            "POST",
            "/v1/raffles/missing/tickets",
            Some(("beto", "user")),
            Some(serde_json::json!({"ticketNumbers": [1]})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_missing_buyer_settles_to_placeholder() {
    let t = setup_test_app().await;
    let raffle_id = t.create_free_raffle("ana", draft(10, "random")).await;
    let (_, json) = t
        .call(
            "POST",
            &format!("/v1/raffles/{}/tickets", raffle_id),
            Some(("ghost", "user")),
            Some(serde_json::json!({"ticketNumbers": [5]})),
        )
        .await;
    let session_id = json["sessionId"].as_str().unwrap().to_string();

    sqlx::query("DELETE FROM users WHERE id = 'ghost'")
        .execute(t.repo.pool())
        .await
        .unwrap();

    let (status, ack) = t.deliver_paid(&session_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["status"], "tickets_committed");

    let sold = t.repo.sold_tickets(&RaffleId::new(&raffle_id)).await.unwrap();
    assert_eq!(sold[0].buyer, UserId::new("unassigned"));

    let (status, queue) = t
        .call("GET", "/v1/admin/reconciliations", Some(("root", "admin")), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(queue["reconciliations"][0]["reason"], "unknown_user");
    assert_eq!(queue["reconciliations"][0]["sessionId"], session_id.as_str());

    let (status, _) = t
        .call("GET", "/v1/admin/reconciliations", Some(("beto", "user")), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
