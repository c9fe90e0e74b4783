//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::time::Duration;

use http_gateway::config::{GatewayConfig, RouteConfig};
use http_gateway::http::HttpServer;
use http_gateway::lifecycle::Shutdown;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// One request received by the mock backend.
#[allow(dead_code)]
pub struct ReceivedRequest {
    pub head: String,
    pub body: serde_json::Value,
}

/// Read a request head and its content-length body.
async fn read_request(socket: &mut TcpStream) -> Option<(String, Vec<u8>)> {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = socket.read(&mut buf).await.ok()?;
        if n == 0 {
            return None;
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&data[..end]).to_string();
            let len = head
                .to_lowercase()
                .lines()
                .find_map(|l| l.strip_prefix("content-length:").map(|v| v.trim().to_string()))
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(0);
            if data.len() >= end + 4 + len {
                return Some((head, data[end + 4..end + 4 + len].to_vec()));
            }
        }
    }
}

/// Start a streaming backend that answers every request with `status_line`
/// and then writes `chunks` one by one on a close-delimited body.
///
/// Each received envelope is published on the returned channel.
pub async fn start_streaming_backend(
    status_line: &'static str,
    chunks: Vec<&'static str>,
) -> (SocketAddr, mpsc::UnboundedReceiver<ReceivedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            let chunks = chunks.clone();
            tokio::spawn(async move {
                let Some((head, body)) = read_request(&mut socket).await else {
                    return;
                };
                let body = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
                let _ = tx.send(ReceivedRequest { head, body });

                let response = format!("HTTP/1.1 {}\r\nConnection: close\r\n\r\n", status_line);
                if socket.write_all(response.as_bytes()).await.is_err() {
                    return;
                }
                for chunk in chunks {
                    if socket.write_all(chunk.as_bytes()).await.is_err() {
                        return;
                    }
                    let _ = socket.flush().await;
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, rx)
}

/// A route sending everything under `/` to `endpoint`.
pub fn catch_all_route(endpoint: String) -> RouteConfig {
    RouteConfig {
        name: "story".into(),
        host: None,
        path: None,
        path_prefix: Some("/".into()),
        methods: Vec::new(),
        endpoint,
        priority: 0,
    }
}

/// Start the gateway on an ephemeral port.
pub async fn start_gateway(config: GatewayConfig) -> (SocketAddr, Shutdown) {
    let shutdown = Shutdown::new();
    let (_, config_updates) = mpsc::unbounded_channel();
    start_gateway_with_updates(config, config_updates, shutdown.clone()).await
}

/// Start the gateway with an explicit config update channel.
#[allow(dead_code)]
pub async fn start_gateway_with_updates(
    config: GatewayConfig,
    config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
    shutdown: Shutdown,
) -> (SocketAddr, Shutdown) {
    let server = HttpServer::new(config).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    (addr, shutdown)
}

/// HTTP client that never pools or proxies.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}
