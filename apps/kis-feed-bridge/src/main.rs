//! KIS Feed Bridge Binary
//!
//! Starts the streaming client and the ranking poller and writes every
//! message to stdout as `topic<TAB>json`.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin kis-feed-bridge | kafka-console-producer --property parse.key=true ...
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `KIS_APP_KEY`: KIS application key
//! - `KIS_APP_SECRET`: KIS application secret
//!
//! ## Optional
//! - `KIS_SECRETS_FILE`: JSON file with `kis.api.appKey`, `kis.api.appSecret`, `kis.api.baseUrl`
//! - `KIS_ENV`: real | virtual (default: real)
//! - `KIS_SUBSCRIPTIONS`: Comma-separated instrument codes (default: 005930,000660)
//! - `KIS_POLL_INTERVAL_SECS`: Ranking poll period, 0 disables (default: 10)
//! - `KIS_BRIDGE_METRICS_PORT`: Prometheus metrics port, 0 disables (default: 9090)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `RUST_LOG`: Log filter (logs go to stderr)

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use kis_feed_bridge::application::ports::PublishSink;
use kis_feed_bridge::infrastructure::telemetry;
use kis_feed_bridge::{
    BridgeConfig, CredentialCache, CredentialCacheConfig, KisAuthClient, KisRankingClient,
    PollScheduler, QueuedSink, StdoutSink, StreamClientConfig, StreamingFeedClient, SystemClock,
    init_metrics,
};
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting KIS feed bridge");

    let config = BridgeConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    if config.server.metrics_port != 0 {
        init_metrics(config.server.metrics_port).context("metrics exporter failed to start")?;
    }

    let shutdown_token = CancellationToken::new();

    // Single consumer in front of stdout
    let (queued_sink, publish_worker) = QueuedSink::spawn(
        Arc::new(StdoutSink::stdout()),
        config.publish.queue_capacity,
    );
    let sink: Arc<dyn PublishSink> = Arc::new(queued_sink);

    let auth_client = Arc::new(
        KisAuthClient::new(
            config.endpoints.base_url.clone(),
            config.credentials.clone(),
            config.endpoints.http_timeout,
        )
        .context("failed to build auth client")?,
    );

    let credential_cache = Arc::new(CredentialCache::new(
        auth_client.clone(),
        Arc::new(SystemClock),
        CredentialCacheConfig::from(&config.token),
    ));

    // Streaming client
    let stream_client = Arc::new(StreamingFeedClient::new(
        StreamClientConfig::from_settings(&config.endpoints, &config.stream),
        auth_client,
        Arc::clone(&sink),
        shutdown_token.child_token(),
    ));
    stream_client.subscribe(config.stream.subscriptions.clone());

    let stream_task = {
        let client = Arc::clone(&stream_client);
        tokio::spawn(async move {
            if let Err(e) = client.run().await {
                tracing::error!(error = %e, "Streaming client error");
            }
        })
    };

    // Ranking poller
    let poll_task: Option<JoinHandle<()>> = match config.poll.scheduler_config() {
        Some(poll_config) => {
            let ranking_client = Arc::new(
                KisRankingClient::new(
                    config.endpoints.base_url.clone(),
                    config.credentials.clone(),
                    config.endpoints.http_timeout,
                )
                .context("failed to build ranking client")?,
            );
            let scheduler = PollScheduler::new(
                Arc::clone(&credential_cache),
                ranking_client,
                Arc::clone(&sink),
                poll_config,
            );
            let token = shutdown_token.clone();
            Some(tokio::spawn(async move { scheduler.run(token).await }))
        }
        None => {
            tracing::info!("Ranking poller disabled");
            None
        }
    };

    tracing::info!("KIS feed bridge ready");

    await_shutdown(&shutdown_token).await;
    stream_client.close();

    // The publish worker exits once every sink handle is gone
    drop(sink);
    drop(stream_client);
    drop(credential_cache);

    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        let _ = stream_task.await;
        if let Some(task) = poll_task {
            let _ = task.await;
        }
        let _ = publish_worker.await;
    })
    .await;

    if drained.is_err() {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Shutdown timed out before all tasks finished"
        );
    }

    tracing::info!("KIS feed bridge stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &BridgeConfig) {
    tracing::info!(
        environment = config.environment.as_str(),
        subscriptions = config.stream.subscriptions.len(),
        poll_interval_secs = config.poll.interval.map(|d| d.as_secs()),
        metrics_port = config.server.metrics_port,
        "Configuration loaded"
    );
    tracing::debug!(
        base_url = %config.endpoints.base_url,
        stream_url = %config.endpoints.stream_url,
        tick_topic = %config.stream.tick_topic,
        ranking_topic = %config.poll.ranking_topic,
        "KIS endpoints"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT), then cancel `shutdown_token`.
async fn await_shutdown(shutdown_token: &CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
