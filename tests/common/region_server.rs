/// In-process region server for HTTP tests
///
/// Serves `GET /health` and `POST /api/replicate` with configurable status
/// codes and records every replication request.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use ghidrainsight_core::RegionConfig;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Clone)]
struct ServerState {
    health_status: Arc<AtomicU16>,
    replicate_status: Arc<AtomicU16>,
    health_delay_ms: Arc<AtomicU64>,
    health_hits: Arc<AtomicUsize>,
    replicated: Arc<Mutex<Vec<(Option<String>, Value)>>>,
}

pub struct RegionServer {
    pub url: String,
    state: ServerState,
    handle: JoinHandle<()>,
}

#[allow(dead_code)]
impl RegionServer {
    pub async fn start(health_status: u16, replicate_status: u16) -> Self {
        let state = ServerState {
            health_status: Arc::new(AtomicU16::new(health_status)),
            replicate_status: Arc::new(AtomicU16::new(replicate_status)),
            health_delay_ms: Arc::new(AtomicU64::new(0)),
            health_hits: Arc::new(AtomicUsize::new(0)),
            replicated: Arc::new(Mutex::new(Vec::new())),
        };

        let app = Router::new()
            .route("/health", get(health))
            .route("/api/replicate", post(replicate))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { url, state, handle }
    }

    pub async fn healthy() -> Self {
        Self::start(200, 200).await
    }

    pub fn set_health_status(&self, status: u16) {
        self.state.health_status.store(status, Ordering::SeqCst);
    }

    pub fn set_health_delay(&self, delay: Duration) {
        self.state
            .health_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn health_hits(&self) -> usize {
        self.state.health_hits.load(Ordering::SeqCst)
    }

    /// Replication requests received so far as (X-Region header, body)
    pub fn replicated(&self) -> Vec<(Option<String>, Value)> {
        self.state.replicated.lock().unwrap().clone()
    }
}

impl Drop for RegionServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn health(State(state): State<ServerState>) -> StatusCode {
    state.health_hits.fetch_add(1, Ordering::SeqCst);
    let delay = state.health_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    StatusCode::from_u16(state.health_status.load(Ordering::SeqCst))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn replicate(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    let origin = headers
        .get("x-region")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    state.replicated.lock().unwrap().push((origin, body));
    StatusCode::from_u16(state.replicate_status.load(Ordering::SeqCst))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// URL of a loopback port with nothing listening
#[allow(dead_code)]
pub fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

/// Enabled region config whose regions point at the given URLs. The first
/// region is the current one.
#[allow(dead_code)]
pub fn region_config(regions: &[(&str, &str)]) -> RegionConfig {
    RegionConfig {
        enabled: true,
        regions: regions.iter().map(|(name, _)| name.to_string()).collect(),
        current_region: regions[0].0.to_string(),
        cross_region_timeout_secs: 2.0,
        region_urls: regions
            .iter()
            .map(|(name, url)| (name.to_string(), url.to_string()))
            .collect::<HashMap<_, _>>(),
        ..Default::default()
    }
}
