//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use vanguard::admission::SamplerError;
use vanguard::http::AppState;
use vanguard::{Shutdown, VanguardConfig, VanguardServer};

pub const ADMIN_KEY: &str = "test-admin-key";

/// Start a mock upstream whose response depends on the request path.
/// Returns the bound address.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let path = read_request_path(&mut socket).await;
                        let (status, body) = f(path).await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            429 => "429 Too Many Requests",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Read the request head and return its path.
async fn read_request_path(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf)
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string()
}

/// Memory reading the gateway's sampler reports, settable from the test.
#[derive(Clone, Default)]
pub struct MemoryDial(Arc<AtomicU64>);

impl MemoryDial {
    pub fn set(&self, pct: f64) {
        self.0.store(pct.to_bits(), Ordering::Relaxed);
    }

    fn sampler(&self) -> impl FnMut() -> Result<f64, SamplerError> + Send + 'static {
        let value = self.0.clone();
        move || Ok(f64::from_bits(value.load(Ordering::Relaxed)))
    }
}

pub struct Gateway {
    pub addr: SocketAddr,
    pub state: AppState,
    pub memory: MemoryDial,
    pub shutdown: Shutdown,
}

impl Gateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Config pointing at `upstream` with the admin API enabled.
pub fn config_for(upstream: SocketAddr) -> VanguardConfig {
    let mut config = VanguardConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.upstream.address = upstream.to_string();
    config.observability.metrics_enabled = false;
    config.admin.enabled = true;
    config.admin.api_key = ADMIN_KEY.into();
    config
}

/// Start a gateway on an ephemeral port and wait until it answers.
pub async fn start_gateway(config: VanguardConfig) -> Gateway {
    let memory = MemoryDial::default();
    memory.set(10.0);

    let server = VanguardServer::new(config).unwrap();
    let state = server.state().clone();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let sampler = memory.sampler();
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run_with_sampler(listener, sampler, None, &server_shutdown).await;
    });

    let gateway = Gateway {
        addr,
        state,
        memory,
        shutdown,
    };

    let client = client();
    for _ in 0..50 {
        if client.get(gateway.url("/healthz")).send().await.is_ok() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    gateway
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
