//! Shared fixtures: temporary stores, test settings and a scriptable mock
//! bot that answers notifications over HTTP.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::broker::Broker;
use crate::broker::logs::ResilienceLog;
use crate::broker::message::{Acknowledgment, Bot, Notification, PublishRequest, ResilienceKey};
use crate::config::Settings;
use crate::persistence::Persistence;

pub(crate) fn temp_store() -> (TempDir, Persistence) {
    let dir = TempDir::new().expect("create tempdir");
    let store = Persistence::open(dir.path().to_str().unwrap()).expect("open store");
    (dir, store)
}

/// Settings with short timeouts so retry paths finish quickly.
pub(crate) fn test_settings(bot_port: u16, context_aware: bool) -> Settings {
    let mut settings = Settings::default();
    settings.broker.context_aware = context_aware;
    settings.delivery.bot_port = bot_port;
    settings.delivery.request_timeout_ms = 300;
    settings.delivery.retry_backoff_ms = 50;
    settings
}

pub(crate) fn test_broker(store: &Persistence, bot_port: u16, context_aware: bool) -> Arc<Broker> {
    Arc::new(
        Broker::new(
            &test_settings(bot_port, context_aware),
            store.clone(),
            CancellationToken::new(),
        )
        .expect("build broker"),
    )
}

pub(crate) fn bot(id: &str, topic: &str, sector: &str) -> Bot {
    Bot {
        id: id.to_string(),
        topic: topic.to_string(),
        sector: sector.to_string(),
        address: "127.0.0.1".to_string(),
    }
}

pub(crate) fn request(id: &str, message: &str, topic: &str, sector: &str) -> PublishRequest {
    PublishRequest {
        id: id.to_string(),
        message: message.to_string(),
        topic: topic.to_string(),
        sector: sector.to_string(),
        is_retransmission: false,
    }
}

/// Serves `app` on an ephemeral loopback port and returns its base URL.
pub(crate) async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind app");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("build http client")
}

/// A port nothing listens on.
pub(crate) fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("local addr").port()
}

/// Polls `check` until it holds or five seconds pass.
pub(crate) async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..250 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

/// How the mock bot answers one notification.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Ack,
    /// Acknowledge after sleeping, long enough to trip the client timeout.
    Stall(Duration),
    /// A well-formed acknowledgment for a different message.
    WrongAck,
    /// A body that is not JSON.
    Garbage,
}

#[derive(Debug)]
struct MockState {
    script: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    received: Mutex<Vec<Notification>>,
    watched: Option<ResilienceLog>,
    entry_present: Mutex<Vec<bool>>,
}

pub(crate) struct MockBot {
    pub addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockBot {
    /// A bot that always answers with `reply`.
    pub(crate) async fn spawn(reply: Reply) -> Self {
        Self::scripted(Vec::new(), reply, None).await
    }

    /// A bot that answers with `script` in order, then with `fallback`. When
    /// `watched` is set it records, for every notification, whether the
    /// matching resilience entry existed on arrival.
    pub(crate) async fn scripted(
        script: Vec<Reply>,
        fallback: Reply,
        watched: Option<ResilienceLog>,
    ) -> Self {
        let state = Arc::new(MockState {
            script: Mutex::new(script.into()),
            fallback,
            received: Mutex::new(Vec::new()),
            watched,
            entry_present: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/", post(handle_notification))
            .with_state(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock bot");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state }
    }

    pub(crate) fn port(&self) -> u16 {
        self.addr.port()
    }

    pub(crate) fn received(&self) -> Vec<Notification> {
        self.state.received.lock().unwrap().clone()
    }

    pub(crate) fn hits(&self) -> usize {
        self.state.received.lock().unwrap().len()
    }

    pub(crate) fn entry_present(&self) -> Vec<bool> {
        self.state.entry_present.lock().unwrap().clone()
    }
}

async fn handle_notification(
    State(state): State<Arc<MockState>>,
    Json(notification): Json<Notification>,
) -> Response {
    if let Some(log) = &state.watched {
        let key = ResilienceKey {
            bot_id: notification.bot_id.clone(),
            sensor_id: notification.sensor.clone(),
            message: notification.msg.clone(),
        };
        let present = log.contains(&key).unwrap_or(false);
        state.entry_present.lock().unwrap().push(present);
    }
    state.received.lock().unwrap().push(notification.clone());

    let reply = state
        .script
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| state.fallback.clone());

    let ack = Acknowledgment {
        bot_id: notification.bot_id,
        message: notification.msg,
    };
    match reply {
        Reply::Ack => Json(ack).into_response(),
        Reply::Stall(delay) => {
            tokio::time::sleep(delay).await;
            Json(ack).into_response()
        }
        Reply::WrongAck => Json(Acknowledgment {
            message: "something else".to_string(),
            ..ack
        })
        .into_response(),
        Reply::Garbage => "definitely not json".into_response(),
    }
}
