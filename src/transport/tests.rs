use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::mpsc::{self, UnboundedReceiver};

use super::{AppState, router};
use crate::broker::Broker;
use crate::broker::message::Bot;
use crate::tests::support::{
    bot, closed_port, http_client, request, serve, temp_store, test_broker,
};
use crate::utils::BrokerError;

async fn post(base: &str, path: &str, body: Value) -> (StatusCode, Value) {
    let response = http_client()
        .post(format!("{base}{path}"))
        .json(&body)
        .send()
        .await
        .unwrap();
    (response.status(), response.json().await.unwrap())
}

async fn get(base: &str, path: &str) -> (StatusCode, Value) {
    let response = http_client()
        .get(format!("{base}{path}"))
        .send()
        .await
        .unwrap();
    (response.status(), response.json().await.unwrap())
}

async fn serve_broker(
    context_aware: bool,
) -> (TempDir, Arc<Broker>, String, UnboundedReceiver<BrokerError>) {
    let (dir, store) = temp_store();
    let broker = test_broker(&store, closed_port(), context_aware);
    let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();
    let base = serve(router(AppState::new(broker.clone(), fatal_tx))).await;
    (dir, broker, base, fatal_rx)
}

#[tokio::test]
async fn test_register_bot_generates_id() {
    let (_dir, broker, base, _fatal) = serve_broker(false).await;

    let (status, body) = post(
        &base,
        "/bot",
        json!({"topic": "humidity", "current_sector": "A", "ipaddr": "10.0.0.7"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let id = body["id"].as_str().unwrap();
    assert!(!id.is_empty());
    assert_eq!(body["topic"], "humidity");
    assert_eq!(body["ipaddr"], "10.0.0.7");
    assert_eq!(broker.registry().bot_count(), 1);
    assert!(broker.registry().find_bot(id).is_some());
}

#[tokio::test]
async fn test_register_bot_with_unknown_topic_is_rejected() {
    let (_dir, broker, base, mut fatal) = serve_broker(false).await;

    let (status, body) = post(
        &base,
        "/bot",
        json!({"id": "b1", "topic": "pressure", "current_sector": "A", "ipaddr": "10.0.0.7"}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("pressure"));
    assert_eq!(broker.registry().bot_count(), 0);
    assert!(fatal.try_recv().is_err());
}

#[tokio::test]
async fn test_unsubscribe_returns_null_bot() {
    let (_dir, broker, base, _fatal) = serve_broker(false).await;
    broker.register_bot(bot("b1", "motion", "A")).unwrap();

    let (status, body) = post(
        &base,
        "/unsubscribeBot",
        json!({"id": "b1", "topic": "motion", "current_sector": "A", "ipaddr": "127.0.0.1"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let returned: Bot = serde_json::from_value(body).unwrap();
    assert_eq!(returned, Bot::null());
    assert_eq!(broker.registry().bot_count(), 0);
    assert!(broker.registry().snapshot_for("motion", "A").is_empty());
}

#[tokio::test]
async fn test_sensor_request_is_persisted_and_queued() {
    let (_dir, broker, base, _fatal) = serve_broker(false).await;

    let (status, body) = post(
        &base,
        "/sensor",
        json!({"id": "s1", "msg": "21C", "type": "temperature", "current_sector": "A", "pbrtx": false}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "s1");
    assert_eq!(body["msg"], "Ack on message : 21C on sensor :s1");
    assert_eq!(body["type"], "temperature");
    assert_eq!(broker.queue().len(), 1);
    assert!(
        broker
            .pending()
            .contains(&request("s1", "21C", "temperature", "A"))
            .unwrap()
    );
}

#[tokio::test]
async fn test_sensor_request_without_id_gets_one() {
    let (_dir, _broker, base, _fatal) = serve_broker(false).await;

    let (_, body) = post(
        &base,
        "/sensor",
        json!({"msg": "open", "type": "motion", "current_sector": "B"}),
    )
    .await;

    let id = body["id"].as_str().unwrap();
    assert!(!id.is_empty());
    assert_eq!(body["msg"], format!("Ack on message : open on sensor :{id}"));
}

#[tokio::test]
async fn test_retransmission_is_acknowledged_only() {
    let (_dir, broker, base, _fatal) = serve_broker(false).await;

    let (status, body) = post(
        &base,
        "/sensor",
        json!({"id": "s1", "msg": "21C", "type": "temperature", "current_sector": "A", "pbrtx": true}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["msg"], "Ack on message : 21C on sensor :s1");
    assert!(broker.queue().is_empty());
    assert!(broker.pending().load().unwrap().is_empty());
}

#[tokio::test]
async fn test_status_reports_mode_and_counts() {
    let (_dir, broker, base, _fatal) = serve_broker(true).await;
    broker.register_bot(bot("b1", "temperature", "A")).unwrap();
    broker.register_bot(bot("b2", "humidity", "B")).unwrap();
    broker
        .accept(request("s1", "21C", "temperature", "A"))
        .unwrap();

    let (status, body) = get(&base, "/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "alivectx");
    assert_eq!(body["totbot"], 2);
    assert_eq!(body["totsens"], 1);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_status_flat_mode() {
    let (_dir, _broker, base, _fatal) = serve_broker(false).await;

    let (_, body) = get(&base, "/status").await;

    assert_eq!(body["status"], "alive");
    assert_eq!(body["totbot"], 0);
    assert_eq!(body["totsens"], 0);
}

#[tokio::test]
async fn test_stats_are_cleared_on_read() {
    let (_dir, broker, base, _fatal) = serve_broker(false).await;
    broker
        .service_times()
        .record(std::time::Duration::from_millis(12));

    let (_, first) = get(&base, "/stats").await;
    let (_, second) = get(&base, "/stats").await;

    assert_eq!(first["timelist"].as_array().unwrap().len(), 1);
    assert_eq!(second["timelist"], json!([]));
}

#[tokio::test]
async fn test_null_ids_are_generated() {
    let (_dir, broker, base, _fatal) = serve_broker(false).await;

    let (status, stored) = post(
        &base,
        "/bot",
        json!({"id": null, "topic": "temperature", "current_sector": "A", "ipaddr": "10.0.0.7"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let bot_id = stored["id"].as_str().unwrap();
    assert!(!bot_id.is_empty());
    assert!(broker.registry().find_bot(bot_id).is_some());

    let (status, echo) = post(
        &base,
        "/sensor",
        json!({"id": null, "msg": "21C", "type": "temperature", "current_sector": "A"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let sensor_id = echo["id"].as_str().unwrap();
    assert!(!sensor_id.is_empty());
    assert_eq!(
        echo["msg"],
        format!("Ack on message : 21C on sensor :{sensor_id}")
    );
    assert_eq!(broker.queue().len(), 1);
}

#[tokio::test]
async fn test_body_is_decoded_without_content_type() {
    let (_dir, broker, base, _fatal) = serve_broker(false).await;

    let response = http_client()
        .post(format!("{base}/sensor"))
        .body(r#"{"id": "s1", "msg": "40%", "type": "humidity", "current_sector": "B"}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let echo: Value = response.json().await.unwrap();
    assert_eq!(echo["msg"], "Ack on message : 40% on sensor :s1");
    assert_eq!(broker.queue().len(), 1);
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let (_dir, broker, base, mut fatal) = serve_broker(false).await;

    let response = http_client()
        .post(format!("{base}/bot"))
        .body("not json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().starts_with("malformed request body"));
    assert_eq!(broker.registry().bot_count(), 0);
    assert!(fatal.try_recv().is_err());
}
