//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use task_gateway::config::GatewayConfig;
use task_gateway::registry::ServiceRegistry;
use task_gateway::store::MemoryStore;
use task_gateway::{Gateway, Shutdown};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// A gateway running on ephemeral ports over an in-memory store.
pub struct TestGateway {
    pub data: SocketAddr,
    pub admin: SocketAddr,
    pub registry: Arc<ServiceRegistry>,
    pub shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.data, path)
    }

    pub fn admin_url(&self, path: &str) -> String {
        format!("http://{}{}", self.admin, path)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Config with quiet background tasks, pointing the default route at `default_backend`.
pub fn test_config(default_backend: SocketAddr) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.upstream.default_backend = format!("http://{}", default_backend);
    config.health_check.enabled = false;
    config.observability.metrics_enabled = false;
    config
}

pub async fn start_gateway(config: GatewayConfig) -> TestGateway {
    let gateway = Gateway::with_store(config, Arc::new(MemoryStore::new())).unwrap();
    let registry = gateway.registry();

    let data = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let admin = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let data_addr = data.local_addr().unwrap();
    let admin_addr = admin.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let handle = shutdown.clone();
    tokio::spawn(async move {
        let _ = gateway.serve(data, Some(admin), &handle).await;
    });

    TestGateway {
        data: data_addr,
        admin: admin_addr,
        registry,
        shutdown,
    }
}

/// Read one HTTP/1.1 request head (and body, if sized). Returns the raw text.
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(head_end) = text.find("\r\n\r\n") {
            let content_length = text[..head_end]
                .lines()
                .filter_map(|l| l.split_once(':'))
                .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Backend that answers 200 with the raw request it received, tagged
/// with an `x-backend: {name}` header.
pub async fn start_echo_backend(name: &'static str) -> SocketAddr {
    start_programmable_backend(move |_request| async move { (200, name.to_string()) }, true).await
}

/// Backend whose status and tag are computed per request.
///
/// With `echo` set the response body is the raw request text.
pub async fn start_programmable_backend<F, Fut>(f: F, echo: bool) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                let request = read_request(&mut socket).await;
                let (status, tag) = f(request.clone()).await;
                let status_text = match status {
                    200 => "200 OK",
                    404 => "404 Not Found",
                    500 => "500 Internal Server Error",
                    503 => "503 Service Unavailable",
                    _ => "200 OK",
                };
                let body = if echo { request } else { tag.clone() };
                let response = format!(
                    "HTTP/1.1 {}\r\nx-backend: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    tag,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}
