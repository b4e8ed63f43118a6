//! Streaming Session Integration Tests
//!
//! Runs the streaming client against a local WebSocket server standing in
//! for the KIS real-time endpoint.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_util::sync::CancellationToken;

use kis_feed_bridge::{
    ApprovalKey, ApprovalKeyProvider, AuthError, BroadcastBus, ConnectionState,
    StreamClientConfig, StreamingFeedClient, SubscriptionTarget,
};

const WAIT: Duration = Duration::from_secs(5);

const SAMSUNG_FRAME: &str = "0|H0STCNT0|001|005930^093354^71900^5^-100^-0.14^72023.83^72100^72400^71700^71900^71800^1^3052507^219853241700^5105^6937^1832^84.90^1366314^1159996^1^0.39^20.28^090020^5^-200^090820^5^-500^092619^2^200^20230612^20^N^65945^216924^1118750^2199206^0.05^2424142^125.92^0^^72100";

// =============================================================================
// Fake KIS server
// =============================================================================

/// One accepted client connection with its handshake headers.
struct ServerConnection {
    approval_key: String,
    custtype: String,
    ws: WebSocketStream<TcpStream>,
}

impl ServerConnection {
    /// Next text frame from the client.
    async fn next_text(&mut self) -> String {
        loop {
            let msg = timeout(WAIT, self.ws.next())
                .await
                .expect("timed out waiting for client frame")
                .expect("client closed the socket")
                .unwrap();
            if let Message::Text(text) = msg {
                return text.to_string();
            }
        }
    }

    /// Read `n` subscription requests and return their `tr_key`s in order.
    async fn subscription_keys(&mut self, n: usize) -> Vec<String> {
        let mut keys = Vec::with_capacity(n);
        for _ in 0..n {
            let request: serde_json::Value = serde_json::from_str(&self.next_text().await).unwrap();
            assert_eq!(request["header"]["approval_key"], self.approval_key.as_str());
            assert_eq!(request["header"]["tr_type"], "1");
            assert_eq!(request["body"]["input"]["tr_id"], "H0STCNT0");
            keys.push(request["body"]["input"]["tr_key"].as_str().unwrap().to_string());
        }
        keys
    }

    /// Assert the client sends nothing for a short while.
    async fn assert_quiet(&mut self) {
        let next = timeout(Duration::from_millis(200), self.ws.next()).await;
        assert!(next.is_err(), "unexpected frame: {next:?}");
    }

    async fn send(&mut self, text: &str) {
        self.ws.send(Message::Text(text.to_string().into())).await.unwrap();
    }
}

async fn start_server() -> (String, mpsc::UnboundedReceiver<ServerConnection>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut approval_key = String::new();
                let mut custtype = String::new();
                let ws = tokio_tungstenite::accept_hdr_async(
                    stream,
                    |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                        let header = |name: &str| {
                            request
                                .headers()
                                .get(name)
                                .and_then(|v| v.to_str().ok())
                                .unwrap_or_default()
                                .to_string()
                        };
                        approval_key = header("approval_key");
                        custtype = header("custtype");
                        Ok(response)
                    },
                )
                .await
                .unwrap();

                let _ = tx.send(ServerConnection {
                    approval_key,
                    custtype,
                    ws,
                });
            });
        }
    });

    (format!("ws://{addr}/tryitout/H0STCNT0"), rx)
}

// =============================================================================
// Client fixtures
// =============================================================================

/// Approval provider handing out `approval-1`, `approval-2`, ...
#[derive(Default)]
struct CountingApproval {
    calls: AtomicUsize,
}

#[async_trait]
impl ApprovalKeyProvider for CountingApproval {
    async fn fetch_approval_key(&self) -> Result<ApprovalKey, AuthError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ApprovalKey::new(format!("approval-{n}")))
    }
}

struct Harness {
    client: Arc<StreamingFeedClient>,
    approval: Arc<CountingApproval>,
    bus: BroadcastBus,
    runner: JoinHandle<()>,
}

fn targets(codes: &[&str]) -> Vec<SubscriptionTarget> {
    codes
        .iter()
        .map(|c| SubscriptionTarget::parse(c).unwrap())
        .collect()
}

fn start_client(url: &str, codes: &[&str]) -> Harness {
    let mut config = StreamClientConfig::new(url);
    config.reconnect.initial_delay = Duration::from_millis(10);
    config.reconnect.max_delay = Duration::from_millis(50);

    let approval = Arc::new(CountingApproval::default());
    let bus = BroadcastBus::with_defaults();
    let client = Arc::new(StreamingFeedClient::new(
        config,
        approval.clone(),
        Arc::new(bus.clone()),
        CancellationToken::new(),
    ));
    client.subscribe(targets(codes));

    let runner = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.run().await.unwrap() })
    };

    Harness {
        client,
        approval,
        bus,
        runner,
    }
}

async fn wait_for_state(client: &StreamingFeedClient, state: ConnectionState) {
    let mut rx = client.watch_state();
    timeout(WAIT, rx.wait_for(|s| *s == state))
        .await
        .expect("timed out waiting for state")
        .unwrap();
}

async fn accept(connections: &mut mpsc::UnboundedReceiver<ServerConnection>) -> ServerConnection {
    timeout(WAIT, connections.recv())
        .await
        .expect("timed out waiting for connection")
        .unwrap()
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn sends_one_subscription_per_code() {
    let (url, mut connections) = start_server().await;
    let harness = start_client(&url, &["005930", "000660"]);

    let mut conn = accept(&mut connections).await;
    assert_eq!(conn.approval_key, "approval-1");
    assert_eq!(conn.custtype, "P");

    assert_eq!(conn.subscription_keys(2).await, vec!["005930", "000660"]);
    conn.assert_quiet().await;

    wait_for_state(&harness.client, ConnectionState::Subscribed).await;
    harness.client.close();
    harness.runner.await.unwrap();
}

#[tokio::test]
async fn reconnect_replays_subscriptions_in_order() {
    let (url, mut connections) = start_server().await;
    let harness = start_client(&url, &["005930", "000660", "035720"]);

    let mut first = accept(&mut connections).await;
    assert_eq!(
        first.subscription_keys(3).await,
        vec!["005930", "000660", "035720"]
    );
    drop(first);

    let mut second = accept(&mut connections).await;
    assert_eq!(second.approval_key, "approval-2");
    assert_eq!(
        second.subscription_keys(3).await,
        vec!["005930", "000660", "035720"]
    );
    second.assert_quiet().await;

    assert_eq!(harness.approval.calls.load(Ordering::SeqCst), 2);
    harness.client.close();
    harness.runner.await.unwrap();
}

#[tokio::test]
async fn codes_added_while_connected_are_sent_once() {
    let (url, mut connections) = start_server().await;
    let harness = start_client(&url, &["005930"]);

    let mut conn = accept(&mut connections).await;
    assert_eq!(conn.subscription_keys(1).await, vec!["005930"]);

    assert_eq!(harness.client.subscribe(targets(&["005930", "035720"])), 1);
    assert_eq!(conn.subscription_keys(1).await, vec!["035720"]);
    conn.assert_quiet().await;

    harness.client.close();
    harness.runner.await.unwrap();
}

#[tokio::test]
async fn data_frames_are_published_and_heartbeats_echoed() {
    let (url, mut connections) = start_server().await;
    let harness = start_client(&url, &["005930"]);
    let mut ticks = harness.bus.subscribe_topic("realtime-data");

    let mut conn = accept(&mut connections).await;
    conn.subscription_keys(1).await;

    conn.send(r#"{"header":{"tr_id":"H0STCNT0","tr_key":"005930","encrypt":"N"},"body":{"rt_cd":"0","msg_cd":"OPSP0000","msg1":"SUBSCRIBE SUCCESS"}}"#)
        .await;

    let pingpong = r#"{"header":{"tr_id":"PINGPONG","datetime":"20240612093354"}}"#;
    conn.send(pingpong).await;
    assert_eq!(conn.next_text().await, pingpong);

    conn.send(SAMSUNG_FRAME).await;

    let tick = timeout(WAIT, ticks.recv()).await.unwrap().unwrap();
    let body: serde_json::Value = serde_json::from_str(&tick.body).unwrap();
    assert_eq!(body["stockId"], "005930");
    assert_eq!(body["currentPrice"], "71900");
    assert_eq!(body["tradingTime"], "093354");

    harness.client.close();
    harness.runner.await.unwrap();
}

#[tokio::test]
async fn close_stops_the_session() {
    let (url, mut connections) = start_server().await;
    let harness = start_client(&url, &["005930"]);

    let mut conn = accept(&mut connections).await;
    conn.subscription_keys(1).await;

    harness.client.close();
    timeout(WAIT, harness.runner).await.unwrap().unwrap();
    assert_eq!(harness.client.state(), ConnectionState::Closed);

    // The server sees a close frame or the end of the stream
    let next = timeout(WAIT, conn.ws.next()).await.unwrap();
    assert!(matches!(next, None | Some(Ok(Message::Close(_)) | Err(_))));

    // No reconnect after close
    let reconnect = timeout(Duration::from_millis(200), connections.recv()).await;
    assert!(reconnect.is_err() || matches!(reconnect, Ok(None)));
}
