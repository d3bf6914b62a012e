//! Server integration tests
//!
//! Tests for metric rendering and for the HTTP endpoints of a running
//! engine served on an ephemeral port.

use nas_engine::config::{Config, PolicySeed};
use nas_engine::engine::Engine;
use nas_engine::exec::{FakeExecutor, FakeResponse};
use nas_engine::metrics::MetricsCollector;
use nas_engine::server::serve;
use nas_engine::store::MemoryStore;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Helper to create a test metrics instance
fn create_test_metrics() -> MetricsCollector {
    MetricsCollector::new().expect("Failed to create metrics")
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    // Given: A metrics collector with some metrics set
    let metrics = create_test_metrics();
    metrics.up.set(1.0);
    metrics
        .pool_health
        .with_label_values(&["test-pool", "ONLINE"])
        .set(1.0);

    // When: Rendering metrics to Prometheus format
    let rendered = metrics.render().expect("Failed to render metrics");

    // Then: Output should be valid Prometheus format
    assert!(rendered.contains("# HELP"), "Missing HELP comment");
    assert!(rendered.contains("# TYPE"), "Missing TYPE comment");
    assert!(rendered.contains("nas_up 1"), "Missing up metric");
    assert!(
        rendered.contains("{pool=\"test-pool\",status=\"ONLINE\"}"),
        "Labels not in correct format"
    );
}

#[test]
fn test_metrics_rendering_is_stable() {
    let metrics = create_test_metrics();
    metrics.up.set(1.0);

    let render1 = metrics.render().expect("First render failed");
    let render2 = metrics.render().expect("Second render failed");

    assert_eq!(render1, render2, "Metrics rendering is not stable");
}

#[test]
fn test_policy_state_series() {
    // Given: One policy in each state
    let metrics = create_test_metrics();
    for (policy, state) in [("daily", "idle"), ("hourly", "running"), ("old", "disabled")] {
        metrics.policy_state.with_label_values(&[policy, state]).set(1);
    }

    // When: Rendering
    let rendered = metrics.render().expect("Failed to render");

    // Then: Every pair is exported
    assert!(rendered.contains(r#"nas_policy_state{policy="daily",state="idle"} 1"#));
    assert!(rendered.contains(r#"nas_policy_state{policy="hourly",state="running"} 1"#));
    assert!(rendered.contains(r#"nas_policy_state{policy="old",state="disabled"} 1"#));
}

// ---------------------------------------------------------------------------
// Live server
// ---------------------------------------------------------------------------

fn healthy_host() -> Arc<FakeExecutor> {
    let fake = Arc::new(FakeExecutor::new());
    fake.respond(
        "zpool",
        &["list"],
        FakeResponse::stdout("tank\t1000000\t400000\t600000\tONLINE\n"),
    );
    fake.respond(
        "zfs",
        &["list", "-H", "-p", "-t", "filesystem,volume"],
        FakeResponse::stdout("tank/data\tfilesystem\t300000\t600000\t/mnt/tank/data\n"),
    );
    fake.respond(
        "zfs",
        &["list", "-H", "-p", "-t", "snapshot"],
        FakeResponse::stdout(""),
    );
    fake.respond(
        "lsblk",
        &[],
        FakeResponse::stdout(json!({ "blockdevices": [] }).to_string()),
    );
    fake.respond("zfs", &["snapshot"], FakeResponse::stdout(""));
    fake
}

struct Running {
    addr: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl Running {
    async fn stop(self) {
        self.shutdown.cancel();
        let result = tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("server stops in time")
            .expect("server task joins");
        assert!(result.is_ok(), "serve returned {result:?}");
    }
}

async fn start(fake: Arc<FakeExecutor>, policies: Vec<PolicySeed>) -> Running {
    let mut config = Config::default();
    config.server.metrics_refresh_seconds = 1;
    config.policies = policies;
    let engine = Arc::new(Engine::with_executor(
        &config,
        Arc::new(MemoryStore::new()),
        fake,
    ));

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(serve(config, engine, listener, shutdown.clone()));
    Running {
        addr,
        shutdown,
        handle,
    }
}

/// Issues a bare HTTP/1.1 GET and returns (status, body).
async fn get(addr: SocketAddr, path: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.expect("write");

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.expect("read");
    let response = String::from_utf8_lossy(&raw).into_owned();

    let status = response
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap_or(0);
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    (status, body)
}

/// Polls `path` until `check` accepts the response or five seconds pass.
async fn eventually(addr: SocketAddr, path: &str, check: impl Fn(u16, &str) -> bool) -> (u16, String) {
    let mut last = (0, String::new());
    for _ in 0..50 {
        last = get(addr, path).await;
        if check(last.0, &last.1) {
            return last;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    last
}

#[tokio::test]
async fn test_live_server_exports_engine_state() {
    // Given: A served engine over a healthy host
    let server = start(healthy_host(), Vec::new()).await;

    // When: Scraping /metrics after the first refresh
    let (status, body) = eventually(server.addr, "/metrics", |_, body| {
        body.contains(r#"nas_pool_health{pool="tank""#) && body.contains("nas_events_total")
    })
    .await;

    // Then: Pool state and the startup policy-reloaded event are exported
    assert_eq!(status, 200);
    assert!(body.contains(r#"nas_pool_health{pool="tank",status="ONLINE"} 1"#));
    assert!(body.contains(r#"nas_events_total{kind="policy-reloaded",severity="info"} 1"#));

    // And: Health and the landing page respond
    let (status, body) = get(server.addr, "/health").await;
    assert_eq!(status, 200);
    assert_eq!(body, "OK");
    let (status, body) = get(server.addr, "/").await;
    assert_eq!(status, 200);
    assert!(body.contains("/metrics"));

    server.stop().await;
}

#[tokio::test]
async fn test_health_reports_failed_tick() {
    // Given: A host where every command is missing
    let server = start(Arc::new(FakeExecutor::new()), Vec::new()).await;

    // When: The first monitor tick has failed
    let (status, body) = eventually(server.addr, "/health", |status, _| status == 503).await;

    // Then: Health is unavailable
    assert_eq!(status, 503);
    assert!(body.contains("Last monitor tick failed"));

    server.stop().await;
}

#[tokio::test]
async fn test_seeded_policy_runs_after_startup() {
    // Given: A configuration with one hourly policy
    let fake = healthy_host();
    let seed = PolicySeed {
        name: "hourly".to_string(),
        schedule: "every 1h".to_string(),
        retention: "keep 3".to_string(),
        datasets: vec!["tank/data".to_string()],
        enabled: true,
    };
    let server = start(fake.clone(), vec![seed]).await;

    // When: The scheduler's first tick has run and metrics refreshed
    let (_, body) = eventually(server.addr, "/metrics", |_, body| {
        body.contains(r#"nas_policy_last_run_timestamp_seconds{policy="hourly"}"#)
    })
    .await;

    // Then: The never-run policy fired right away
    assert!(body.contains(r#"nas_policy_last_run_timestamp_seconds{policy="hourly"}"#));
    assert_eq!(fake.count_matching("zfs snapshot tank/data@hourly-"), 1);

    server.stop().await;
}
