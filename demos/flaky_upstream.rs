//! Upstream that fails a configurable share of requests, for watching
//! circuits open and recover.
//!
//! ```text
//! cargo run --example flaky_upstream -- 0.7
//! VANGUARD_MODE=active cargo run
//! ```

use axum::{extract::State, http::StatusCode, routing::get, Router};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let failure_share: f64 = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(0.6);
    let counter = Arc::new(AtomicU64::new(0));

    let app = Router::new()
        .route("/status", get(|| async { "upstream healthy" }))
        .fallback(flaky)
        .with_state((counter, failure_share));

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    println!("Flaky upstream on http://{} failing {:.0}% of requests", addr, failure_share * 100.0);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Fails deterministically: request n fails when its position in a block of
/// 100 falls below the configured share.
async fn flaky(State((counter, share)): State<(Arc<AtomicU64>, f64)>) -> (StatusCode, &'static str) {
    let n = counter.fetch_add(1, Ordering::Relaxed) % 100;
    if (n as f64) < share * 100.0 {
        (StatusCode::INTERNAL_SERVER_ERROR, "simulated failure")
    } else {
        (StatusCode::OK, "ok")
    }
}
