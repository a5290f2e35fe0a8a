use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use super::start;
use crate::broker::logs::{PendingLog, ResilienceLog};
use crate::config::Settings;
use crate::tests::support::{
    MockBot, Reply, bot, eventually, http_client, request, temp_store, test_settings,
};
use crate::utils::BrokerError;

fn local_settings(bot_port: u16) -> Settings {
    let mut settings = test_settings(bot_port, false);
    settings.server.host = "127.0.0.1".to_string();
    settings.server.port = 0;
    settings
}

#[tokio::test]
async fn start_resumes_recovery_and_serves() {
    let (_dir, store) = temp_store();
    let mock = MockBot::spawn(Reply::Ack).await;
    let b1 = bot("b1", "temperature", "A");
    let s1 = request("s1", "21C", "temperature", "A");
    // left behind by a previous run that stopped before b1 acknowledged
    store.put(&b1).unwrap();
    PendingLog::new(store.clone()).accept(&s1).unwrap();
    ResilienceLog::new(store.clone())
        .record(std::slice::from_ref(&b1), &s1)
        .unwrap();

    let shutdown = CancellationToken::new();
    let server = start(&local_settings(mock.port()), store.clone(), shutdown.clone())
        .await
        .unwrap();
    let broker = server.broker().clone();
    let base = format!("http://{}", server.local_addr());
    let waiting = tokio::spawn(server.wait());

    assert!(eventually(|| mock.hits() == 1).await);
    assert_eq!(mock.received()[0].sensor, "s1");
    assert!(eventually(|| !broker.pending().contains(&s1).unwrap()).await);

    let status: Value = http_client()
        .get(format!("{base}/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["totbot"], 1);

    // intake is running: a new request reaches the restored bot
    let response = http_client()
        .post(format!("{base}/sensor"))
        .json(&json!({"id": "s2", "msg": "22C", "type": "temperature", "current_sector": "A"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(eventually(|| mock.hits() == 2).await);

    shutdown.cancel();
    let stopped = tokio::time::timeout(Duration::from_secs(5), waiting)
        .await
        .unwrap()
        .unwrap();
    assert!(stopped.is_ok());
}

#[tokio::test]
async fn start_fails_on_orphaned_entry_before_serving() {
    let (_dir, store) = temp_store();
    let mock = MockBot::spawn(Reply::Ack).await;
    let s1 = request("s1", "21C", "temperature", "A");
    PendingLog::new(store.clone()).accept(&s1).unwrap();
    ResilienceLog::new(store.clone())
        .record(&[bot("gone", "temperature", "A")], &s1)
        .unwrap();

    let Err(err) = start(&local_settings(mock.port()), store, CancellationToken::new()).await
    else {
        panic!("startup should fail on an orphaned entry");
    };

    assert!(matches!(err, BrokerError::OrphanedEntry { bot_id, .. } if bot_id == "gone"));
    assert_eq!(mock.hits(), 0);
}

#[tokio::test]
async fn start_fails_when_port_is_taken() {
    let (_dir, store) = temp_store();
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let mut settings = local_settings(1);
    settings.server.port = taken.local_addr().unwrap().port();

    let Err(err) = start(&settings, store, CancellationToken::new()).await else {
        panic!("binding a taken port should fail");
    };

    assert!(matches!(err, BrokerError::Io(_)));
}
