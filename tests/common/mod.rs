//! Shared utilities for relay integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use image_relay::config::RelayConfig;
use image_relay::lifecycle::Shutdown;
use image_relay::net::Listener;
use image_relay::security::RateLimiter;
use image_relay::upstream::UpstreamClient;
use image_relay::RelayServer;

/// One canned reply of the mock provider.
#[derive(Clone, Debug)]
pub struct MockRoute {
    pub status: u16,
    pub body: Vec<u8>,
    /// Wait before answering.
    pub delay: Duration,
    /// Send no Content-Length; the body then ends at connection close.
    pub omit_length: bool,
}

impl MockRoute {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            delay: Duration::ZERO,
            omit_length: false,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
            delay: Duration::ZERO,
            omit_length: false,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn without_length(mut self) -> Self {
        self.omit_length = true;
        self
    }
}

#[derive(Default)]
struct MockState {
    routes: HashMap<String, MockRoute>,
    hits: HashMap<String, usize>,
    requests: Vec<String>,
}

/// A programmable HTTP/1.1 server standing in for the image-search provider.
///
/// Routes are matched on the path alone; unknown paths answer 404. Every
/// request head is recorded and hits are counted per path.
#[derive(Clone)]
pub struct MockUpstream {
    addr: SocketAddr,
    state: Arc<Mutex<MockState>>,
}

impl MockUpstream {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(MockState::default()));

        let accept_state = state.clone();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((socket, _)) => {
                        tokio::spawn(serve(socket, accept_state.clone()));
                    }
                    Err(_) => break,
                }
            }
        });

        Self { addr, state }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Absolute URL of `path` on this server.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn route(&self, path: &str, route: MockRoute) {
        self.state.lock().unwrap().routes.insert(path.to_string(), route);
    }

    /// Serve a search result list whose entries point back at this server.
    pub fn search_results(&self, image_paths: &[&str]) {
        let results: Vec<serde_json::Value> = image_paths
            .iter()
            .enumerate()
            .map(|(i, path)| {
                serde_json::json!({
                    "id": format!("img-{}", i),
                    "urls": { "regular": self.url(path), "thumb": self.url("/thumb") }
                })
            })
            .collect();
        let body = serde_json::json!({ "total": results.len(), "results": results });
        self.route(SEARCH_PATH, MockRoute::ok(body.to_string()));
    }

    pub fn hits(&self, path: &str) -> usize {
        self.state.lock().unwrap().hits.get(path).copied().unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.state.lock().unwrap().hits.values().sum()
    }

    /// Request heads received so far, oldest first.
    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().requests.clone()
    }
}

pub const SEARCH_PATH: &str = "/search/photos";

async fn serve(mut socket: TcpStream, state: Arc<Mutex<MockState>>) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }

    let head = String::from_utf8_lossy(&head).to_string();
    let target = head.split_whitespace().nth(1).unwrap_or("/").to_string();
    let path = target.split('?').next().unwrap_or("/").to_string();

    let route = {
        let mut state = state.lock().unwrap();
        *state.hits.entry(path.clone()).or_insert(0) += 1;
        state.requests.push(head);
        state.routes.get(&path).cloned()
    };
    let route = route.unwrap_or_else(|| MockRoute::status(404));

    if !route.delay.is_zero() {
        tokio::time::sleep(route.delay).await;
    }

    let mut response = format!("HTTP/1.1 {} {}\r\n", route.status, reason(route.status));
    if !route.omit_length {
        response.push_str(&format!("Content-Length: {}\r\n", route.body.len()));
    }
    response.push_str("Connection: close\r\n\r\n");

    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.write_all(&route.body).await;
    let _ = socket.shutdown().await;
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Configuration tuned for tests: fast timeouts, fast retries, ample quota.
pub fn test_config(upstream_base_url: &str) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.listener.max_connections = 8;

    config.upstream.base_url = upstream_base_url.into();
    config.upstream.access_key = "test-key".into();

    config.timeouts.read_idle_ms = 2_000;
    config.timeouts.write_ms = 2_000;
    config.timeouts.admission_ms = 50;
    config.timeouts.drain_ms = 2_000;
    config.timeouts.upstream_request_ms = 2_000;
    config.timeouts.upstream_connect_ms = 500;
    config.timeouts.upstream_chunk_ms = 2_000;

    config.rate_limit.quota_requests = 100_000;
    config.rate_limit.quota_window_secs = 1;
    config.rate_limit.burst = 1_000;
    config.rate_limit.acquire_timeout_ms = 500;

    config.retries.base_delay_ms = 10;
    config.retries.max_delay_ms = 50;
    config
}

/// A relay running on an ephemeral port.
pub struct RunningRelay {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<()>,
}

impl RunningRelay {
    /// Trigger shutdown and wait for the server to return.
    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("relay did not stop")
            .expect("relay task failed");
    }
}

pub async fn start_relay(config: RelayConfig) -> RunningRelay {
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp.local_addr().unwrap();
    let listener = Listener::from_tcp(tcp, config.listener.max_connections).unwrap();

    let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
    let upstream = Arc::new(UpstreamClient::new(&config, limiter).unwrap());

    let shutdown = Shutdown::new();
    let server = RelayServer::new(config, upstream);
    let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));

    RunningRelay {
        addr,
        shutdown,
        handle,
    }
}

/// Send `term` plus newline and read the whole reply.
pub async fn request(addr: SocketAddr, term: &str) -> Vec<u8> {
    request_raw(addr, format!("{}\n", term).as_bytes()).await
}

pub async fn request_raw(addr: SocketAddr, bytes: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(bytes).await.unwrap();

    let mut reply = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), stream.read_to_end(&mut reply))
        .await
        .expect("reply did not complete")
        .unwrap();
    reply
}

/// Like [`request`], but surfaces I/O errors. A rejected client's unread
/// request can turn the relay's close into a reset.
pub async fn try_request(addr: SocketAddr, term: &str) -> std::io::Result<Vec<u8>> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(format!("{}\n", term).as_bytes()).await?;

    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await?;
    Ok(reply)
}

/// A recognisable binary payload of `len` bytes.
pub fn image_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
