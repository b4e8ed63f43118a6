//! Streaming Feed Client
//!
//! Maintains the real-time price socket to KIS and forwards every decoded
//! tick to the publish sink.
//!
//! # Stream URL
//!
//! - Real: `ws://ops.koreainvestment.com:21000/tryitout/H0STCNT0`
//! - Virtual: `ws://ops.koreainvestment.com:31000/tryitout/H0STCNT0`
//!
//! # Protocol
//!
//! Each connect fetches a fresh approval key and passes it as a handshake
//! header. After the handshake one JSON subscription request is sent per
//! instrument. The server then sends `|`/`^` data frames (see
//! [`super::codec`]) interleaved with JSON control frames: `PINGPONG`
//! heartbeats, which must be echoed, and subscription acknowledgements.
//!
//! # Concurrency
//!
//! The socket task only reads, answers heartbeats and writes subscriptions.
//! Data frames are handed over a bounded channel to a single
//! [`FrameDispatcher`] task, so ticks are published in arrival order.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{Notify, mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::codec::FrameDecoder;
use super::messages::{CUSTOMER_TYPE_PERSONAL, SubscriptionRequest, TR_TYPE_REGISTER};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::{ApprovalKeyProvider, AuthError, PublishSink};
use crate::domain::market_data::{ApprovalKey, PublishMessage};
use crate::domain::streaming::{ConnectionEvent, ConnectionState};
use crate::domain::subscription::{SubscriptionList, SubscriptionTarget};
use crate::infrastructure::config::{EndpointSettings, StreamSettings};
use crate::infrastructure::metrics::{self, MessageKind};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in the streaming client.
#[derive(Debug, thiserror::Error)]
pub enum StreamClientError {
    /// Approval key could not be obtained.
    #[error("approval key unavailable: {0}")]
    Approval(#[from] AuthError),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The approval key is not a valid header value.
    #[error("invalid handshake header: {0}")]
    InvalidHeader(String),

    /// A subscription request could not be serialized.
    #[error("failed to serialize subscription: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The frame dispatcher has stopped.
    #[error("frame channel closed")]
    ChannelSend,

    /// Connection closed by the server.
    #[error("connection closed")]
    ConnectionClosed,

    /// `run` was called while another `run` is active.
    #[error("client is already running")]
    AlreadyRunning,
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the streaming client.
#[derive(Debug, Clone)]
pub struct StreamClientConfig {
    /// WebSocket URL.
    pub url: String,
    /// Bus topic for decoded ticks.
    pub tick_topic: String,
    /// Capacity of the channel between the socket and the dispatcher.
    pub frame_channel_capacity: usize,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
}

impl StreamClientConfig {
    /// Create a configuration with default topic, capacity and backoff.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        let defaults = StreamSettings::default();
        Self {
            url: url.into(),
            tick_topic: defaults.tick_topic,
            frame_channel_capacity: defaults.frame_channel_capacity,
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Build from loaded settings.
    #[must_use]
    pub fn from_settings(endpoints: &EndpointSettings, stream: &StreamSettings) -> Self {
        Self {
            url: endpoints.stream_url.clone(),
            tick_topic: stream.tick_topic.clone(),
            frame_channel_capacity: stream.frame_channel_capacity,
            reconnect: ReconnectConfig {
                initial_delay: stream.reconnect_delay_initial,
                max_delay: stream.reconnect_delay_max,
                multiplier: stream.reconnect_delay_multiplier,
                ..ReconnectConfig::default()
            },
        }
    }
}

// =============================================================================
// Frame Dispatcher
// =============================================================================

/// Decodes data frames and publishes their ticks.
///
/// Decode and publish failures are logged and counted; they never stop
/// processing of later frames.
pub struct FrameDispatcher {
    decoder: FrameDecoder,
    sink: Arc<dyn PublishSink>,
    topic: String,
}

impl FrameDispatcher {
    /// Create a dispatcher publishing to `topic`.
    #[must_use]
    pub fn new(sink: Arc<dyn PublishSink>, topic: impl Into<String>) -> Self {
        Self {
            decoder: FrameDecoder::new(),
            sink,
            topic: topic.into(),
        }
    }

    /// Handle one data frame. Returns the number of ticks accepted by the sink.
    pub async fn on_frame(&self, raw: &str) -> usize {
        let frame = match self.decoder.decode(raw) {
            Ok(frame) => frame,
            Err(e) => {
                metrics::record_decode_error(e.reason());
                tracing::warn!(error = %e, "Dropping undecodable frame");
                return 0;
            }
        };

        if let Some(e) = &frame.truncated {
            metrics::record_decode_error(e.reason());
            tracing::warn!(error = %e, tr_id = %frame.tr_id, "Frame payload truncated");
        }

        let mut published = 0;
        for tick in &frame.records {
            let message = match PublishMessage::from_tick(&self.topic, tick) {
                Ok(message) => message,
                Err(e) => {
                    metrics::record_publish_failure(MessageKind::Tick);
                    tracing::warn!(error = %e, code = %tick.instrument_code, "Failed to encode tick");
                    continue;
                }
            };

            match self.sink.publish(message).await {
                Ok(()) => {
                    metrics::record_published(MessageKind::Tick);
                    published += 1;
                }
                Err(e) => {
                    metrics::record_publish_failure(MessageKind::Tick);
                    tracing::warn!(error = %e, code = %tick.instrument_code, "Failed to publish tick");
                }
            }
        }
        published
    }

    async fn run(self, mut frames: mpsc::Receiver<String>) {
        while let Some(raw) = frames.recv().await {
            self.on_frame(&raw).await;
        }
        tracing::debug!("Frame dispatcher stopped");
    }
}

// =============================================================================
// Streaming Feed Client
// =============================================================================

/// WebSocket client for the KIS real-time price feed.
///
/// Manages the connection lifecycle including:
/// - Approval key retrieval on every connect
/// - Subscription replay after reconnects
/// - Automatic reconnection with exponential backoff, without limit
/// - Heartbeat echo
pub struct StreamingFeedClient {
    config: StreamClientConfig,
    decoder: FrameDecoder,
    approval: Arc<dyn ApprovalKeyProvider>,
    sink: Arc<dyn PublishSink>,
    subscriptions: Mutex<SubscriptionList>,
    flush: Notify,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    running: AtomicBool,
}

impl StreamingFeedClient {
    /// Create a new client. Cancelling `cancel` has the same effect as
    /// [`close`](Self::close).
    #[must_use]
    pub fn new(
        config: StreamClientConfig,
        approval: Arc<dyn ApprovalKeyProvider>,
        sink: Arc<dyn PublishSink>,
        cancel: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            decoder: FrameDecoder::new(),
            approval,
            sink,
            subscriptions: Mutex::new(SubscriptionList::new()),
            flush: Notify::new(),
            state,
            cancel,
            running: AtomicBool::new(false),
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Instruments currently stored, in subscription order.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<SubscriptionTarget> {
        self.subscriptions.lock().targets().to_vec()
    }

    /// Add instruments to the subscription list.
    ///
    /// Already stored codes are ignored. New codes are sent on the live
    /// connection if there is one, otherwise on the next connect. Returns
    /// the number of newly stored codes.
    pub fn subscribe(&self, targets: impl IntoIterator<Item = SubscriptionTarget>) -> usize {
        let added = self.subscriptions.lock().add(targets);
        if added > 0 {
            tracing::info!(added, "Subscriptions added");
            self.flush.notify_one();
        }
        added
    }

    /// Stop the client. Safe to call more than once.
    pub fn close(&self) {
        if self.apply(ConnectionEvent::CloseRequested) {
            tracing::info!("Streaming client closing");
        }
        self.cancel.cancel();
    }

    /// Run the connection loop until [`close`](Self::close) is called.
    ///
    /// Connection failures are never returned; they lead to a reconnect.
    ///
    /// # Errors
    ///
    /// Returns [`StreamClientError::AlreadyRunning`] if another `run` is
    /// active on this client.
    pub async fn run(&self) -> Result<(), StreamClientError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(StreamClientError::AlreadyRunning);
        }

        let (frame_tx, frame_rx) = mpsc::channel(self.config.frame_channel_capacity.max(1));
        let dispatcher = FrameDispatcher::new(Arc::clone(&self.sink), self.config.tick_topic.clone());
        let dispatcher_handle = tokio::spawn(dispatcher.run(frame_rx));

        let mut reconnect_policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            self.apply(ConnectionEvent::ConnectRequested);

            let connected = tokio::select! {
                () = self.cancel.cancelled() => break,
                result = self.connect() => result,
            };

            let (ws_stream, approval_key) = match connected {
                Ok(connected) => connected,
                Err(e) => {
                    tracing::warn!(error = %e, "Streaming handshake failed");
                    self.apply(ConnectionEvent::HandshakeFailed);
                    if self.wait_before_reconnect(&mut reconnect_policy).await {
                        continue;
                    }
                    break;
                }
            };

            self.apply(ConnectionEvent::HandshakeSucceeded);
            reconnect_policy.reset();

            match self.session(ws_stream, &approval_key, &frame_tx).await {
                Ok(()) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Streaming connection lost");
                    self.apply(ConnectionEvent::TransportFailed);
                    if !self.wait_before_reconnect(&mut reconnect_policy).await {
                        break;
                    }
                }
            }
        }

        drop(frame_tx);
        if let Err(e) = dispatcher_handle.await {
            tracing::error!(error = %e, "Frame dispatcher task failed");
        }

        self.apply(ConnectionEvent::CloseRequested);
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("Streaming client stopped");
        Ok(())
    }

    /// Apply a state machine event. Returns whether the state changed.
    fn apply(&self, event: ConnectionEvent) -> bool {
        let mut changed = false;
        self.state.send_if_modified(|state| match state.next(event) {
            Some(next) if next != *state => {
                *state = next;
                changed = true;
                true
            }
            _ => false,
        });

        if changed {
            let state = self.state();
            metrics::set_connection_state(state);
            tracing::debug!(%state, ?event, "Connection state changed");
        }
        changed
    }

    /// Sleep out the next backoff delay. Returns `false` if cancelled.
    async fn wait_before_reconnect(&self, policy: &mut ReconnectPolicy) -> bool {
        let delay = policy.next_delay();
        tracing::info!(
            attempt = policy.attempt_count(),
            delay_ms = delay.as_millis(),
            "Reconnecting to KIS stream"
        );
        metrics::record_reconnect();

        tokio::select! {
            () = self.cancel.cancelled() => {
                tracing::info!("Streaming client cancelled during reconnect delay");
                false
            }
            () = tokio::time::sleep(delay) => true,
        }
    }

    /// Fetch an approval key and open the socket.
    async fn connect(&self) -> Result<(WsStream, ApprovalKey), StreamClientError> {
        let approval_key = self.approval.fetch_approval_key().await?;

        tracing::info!(url = %self.config.url, "Connecting to KIS stream");

        let mut request = self.config.url.as_str().into_client_request()?;
        let headers = request.headers_mut();
        headers.insert(
            "approval_key",
            HeaderValue::from_str(approval_key.as_str())
                .map_err(|e| StreamClientError::InvalidHeader(e.to_string()))?,
        );
        headers.insert("custtype", HeaderValue::from_static(CUSTOMER_TYPE_PERSONAL));
        headers.insert("tr_type", HeaderValue::from_static(TR_TYPE_REGISTER));
        headers.insert("content-type", HeaderValue::from_static("utf-8"));

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request).await?;
        tracing::info!("KIS stream connected");
        Ok((ws_stream, approval_key))
    }

    /// Serve one connection. `Ok` means the client was cancelled.
    async fn session(
        &self,
        ws_stream: WsStream,
        approval_key: &ApprovalKey,
        frame_tx: &mpsc::Sender<String>,
    ) -> Result<(), StreamClientError> {
        let (mut write, mut read) = ws_stream.split();

        self.subscriptions.lock().reset_sent();
        self.send_pending(&mut write, approval_key).await?;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        tracing::debug!(error = %e, "Close frame not delivered");
                    }
                    return Ok(());
                }
                () = self.flush.notified() => {
                    self.send_pending(&mut write, approval_key).await?;
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text_message(&text, &mut write, frame_tx).await?;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(frame = ?frame, "Server sent close frame");
                            return Err(StreamClientError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {
                            // Binary and pong frames carry nothing for us
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            tracing::info!("WebSocket stream ended");
                            return Err(StreamClientError::ConnectionClosed);
                        }
                    }
                }
            }
        }
    }

    /// Write one subscription request per code not yet sent on this connection.
    async fn send_pending(
        &self,
        write: &mut WsWrite,
        approval_key: &ApprovalKey,
    ) -> Result<(), StreamClientError> {
        let pending = self.subscriptions.lock().take_pending();
        if pending.is_empty() {
            return Ok(());
        }

        for target in &pending {
            let request = SubscriptionRequest::register(approval_key.as_str(), target.as_str());
            let json = serde_json::to_string(&request)?;
            write.send(Message::Text(json.into())).await?;
            tracing::debug!(code = %target, "Subscription request sent");
        }

        tracing::info!(count = pending.len(), "Subscriptions sent");
        self.apply(ConnectionEvent::SubscriptionsSent);
        Ok(())
    }

    /// Handle a text frame: control frames are answered here, data frames go
    /// to the dispatcher.
    async fn handle_text_message(
        &self,
        text: &str,
        write: &mut WsWrite,
        frame_tx: &mpsc::Sender<String>,
    ) -> Result<(), StreamClientError> {
        if let Some(control) = self.decoder.parse_control(text) {
            let success = control.is_success();
            if control.is_pingpong() {
                tracing::trace!("Echoing PINGPONG");
                write.send(Message::Text(text.to_string().into())).await?;
            } else if let Some(body) = control.body.as_ref().filter(|_| !success) {
                tracing::warn!(
                    tr_id = %control.header.tr_id,
                    tr_key = control.header.tr_key.as_deref().unwrap_or(""),
                    rt_cd = %body.rt_cd,
                    msg_cd = %body.msg_cd,
                    msg = %body.msg1,
                    "Subscription rejected"
                );
            } else {
                tracing::info!(
                    tr_id = %control.header.tr_id,
                    tr_key = control.header.tr_key.as_deref().unwrap_or(""),
                    "Subscription acknowledged"
                );
            }
            return Ok(());
        }

        metrics::record_frame_received();
        frame_tx
            .send(text.to_string())
            .await
            .map_err(|_| StreamClientError::ChannelSend)
    }
}

impl std::fmt::Debug for StreamingFeedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingFeedClient")
            .field("url", &self.config.url)
            .field("state", &self.state())
            .field("subscriptions", &self.subscriptions.lock().len())
            .finish_non_exhaustive()
    }
}
