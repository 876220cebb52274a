//! End-to-end admission behaviour through a running gateway.

use axum::http::StatusCode;
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use vanguard::config::{AdmissionMode, HandlerConfig, RouteConfig};

mod common;
use common::{client, config_for, start_gateway, start_programmable_backend, ADMIN_KEY};

#[tokio::test]
async fn test_failing_endpoint_is_quarantined() {
    let hits = Arc::new(AtomicU32::new(0));
    let h = hits.clone();
    let upstream = start_programmable_backend(move |_| {
        let h = h.clone();
        async move {
            h.fetch_add(1, Ordering::SeqCst);
            (500, "boom".into())
        }
    })
    .await;

    let mut config = config_for(upstream);
    config.admission.mode = AdmissionMode::Active;
    let gateway = start_gateway(config).await;
    let client = client();

    for _ in 0..10 {
        let res = client.get(gateway.url("/matchup/analyze")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    let res = client.get(gateway.url("/matchup/analyze")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.headers()["retry-after"], "60");
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "circuit_open");
    assert_eq!(body["endpoint"], "/matchup/analyze");
    assert_eq!(body["retryAfter"], 60);
    assert_eq!(hits.load(Ordering::SeqCst), 10, "quarantined request must not reach upstream");

    // Other endpoints are unaffected.
    let res = client.get(gateway.url("/players/123")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let circuits: Value = client
        .get(gateway.url("/vanguard/circuits"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(circuits["/matchup/analyze"]["state"], "OPEN");
    assert_eq!(circuits["/matchup/analyze"]["failure_rate_at_open"], 1.0);
}

#[tokio::test]
async fn test_shadow_mode_never_blocks() {
    let upstream = start_programmable_backend(|_| async { (500, "boom".into()) }).await;
    let gateway = start_gateway(config_for(upstream)).await;
    let client = client();

    for _ in 0..15 {
        let res = client.get(gateway.url("/pulse/data")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    let status: Value = client.get(gateway.url("/vanguard/status")).send().await.unwrap().json().await.unwrap();
    assert_eq!(status["mode"], "shadow");
    let circuits: Value = client.get(gateway.url("/vanguard/circuits")).send().await.unwrap().json().await.unwrap();
    assert_eq!(circuits["/pulse/data"]["state"], "OPEN");
}

#[tokio::test]
async fn test_client_errors_do_not_trip() {
    let upstream = start_programmable_backend(|_| async { (404, "missing".into()) }).await;
    let mut config = config_for(upstream);
    config.admission.mode = AdmissionMode::Active;
    let gateway = start_gateway(config).await;
    let client = client();

    for _ in 0..20 {
        let res = client.get(gateway.url("/players/unknown")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    let rates: Value = client.get(gateway.url("/vanguard/rates")).send().await.unwrap().json().await.unwrap();
    assert_eq!(rates["/players/unknown"]["total"], 20);
    assert_eq!(rates["/players/unknown"]["failure_rate"], 0.0);
}

#[tokio::test]
async fn test_unreachable_upstream_counts_as_failure() {
    // Bind and drop to get a port nobody listens on.
    let dead = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let gateway = start_gateway(config_for(dead)).await;
    let client = client();

    let res = client.get(gateway.url("/players/1")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(gateway.state.admission.tracker.failure_rate("/players/1"), 1.0);
}

#[tokio::test]
async fn test_blast_radius_stays_untracked() {
    let upstream = start_programmable_backend(|_| async { (200, "ok".into()) }).await;
    let mut config = config_for(upstream);
    config.admission.mode = AdmissionMode::Active;
    let gateway = start_gateway(config).await;
    let client = client();

    for _ in 0..5 {
        assert_eq!(client.get(gateway.url("/healthz")).send().await.unwrap().status(), StatusCode::OK);
    }
    let rates: Value = client.get(gateway.url("/vanguard/rates")).send().await.unwrap().json().await.unwrap();
    assert!(rates.get("/healthz").is_none());
    assert!(rates.get("/vanguard/rates").is_none());

    let res = client
        .post(gateway.url("/admin/circuits/force-open"))
        .bearer_auth(ADMIN_KEY)
        .json(&serde_json::json!({ "endpoint": "/healthz" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_shedding_rejects_writes_and_fails_readiness() {
    let upstream = start_programmable_backend(|_| async { (200, "ok".into()) }).await;
    let mut config = config_for(upstream);
    config.admission.mode = AdmissionMode::Active;
    let gateway = start_gateway(config).await;
    let client = client();

    gateway.state.admission.governor.observe(95.0);

    let res = client.post(gateway.url("/players/123")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(res.headers()["retry-after"], "30");

    assert_eq!(client.get(gateway.url("/players/123")).send().await.unwrap().status(), StatusCode::OK);
    assert_eq!(client.post(gateway.url("/live/scores")).send().await.unwrap().status(), StatusCode::OK);
    assert_eq!(
        client.get(gateway.url("/readyz")).send().await.unwrap().status(),
        StatusCode::SERVICE_UNAVAILABLE
    );

    let shedding: Value = client.get(gateway.url("/vanguard/shedding")).send().await.unwrap().json().await.unwrap();
    assert_eq!(shedding["shedding_active"], true);
    assert_eq!(shedding["memory_pct"], 95.0);

    gateway.state.admission.governor.observe(70.0);
    assert_eq!(client.post(gateway.url("/players/123")).send().await.unwrap().status(), StatusCode::OK);
}

#[tokio::test]
async fn test_fallback_switch_via_admin_api() {
    let primary = start_programmable_backend(|_| async { (200, "primary".into()) }).await;
    let mut config = config_for(primary);
    config.routes.push(RouteConfig {
        key: "/matchup".into(),
        primary: HandlerConfig::Upstream { address: primary.to_string() },
        fallback: Some(HandlerConfig::Static { status: 200, body: "cached matchup".into() }),
    });
    let gateway = start_gateway(config).await;
    let client = client();

    let body = client.get(gateway.url("/matchup/42")).send().await.unwrap().text().await.unwrap();
    assert_eq!(body, "primary");

    let activate = serde_json::json!({ "key": "/matchup", "reason": "upstream degraded" });
    let res = client.post(gateway.url("/admin/fallbacks/activate")).json(&activate).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .post(gateway.url("/admin/fallbacks/activate"))
        .bearer_auth(ADMIN_KEY)
        .json(&activate)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(gateway.url("/matchup/42")).send().await.unwrap();
    assert_eq!(res.headers()["x-vanguard-fallback"], "/matchup");
    assert_eq!(res.text().await.unwrap(), "cached matchup");

    let deps: Value = client.get(gateway.url("/health/deps")).send().await.unwrap().json().await.unwrap();
    assert_eq!(deps["active_fallbacks"][0], "/matchup");

    let res = client
        .post(gateway.url("/admin/fallbacks/deactivate"))
        .bearer_auth(ADMIN_KEY)
        .json(&serde_json::json!({ "key": "/matchup" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = client.get(gateway.url("/matchup/42")).send().await.unwrap().text().await.unwrap();
    assert_eq!(body, "primary");
}

#[tokio::test]
async fn test_forced_circuit_is_reported_as_incident() {
    let upstream = start_programmable_backend(|_| async { (200, "ok".into()) }).await;
    let mut config = config_for(upstream);
    config.admission.mode = AdmissionMode::Active;
    let gateway = start_gateway(config).await;
    let client = client();

    let res = client
        .post(gateway.url("/admin/circuits/force-open"))
        .bearer_auth(ADMIN_KEY)
        .json(&serde_json::json!({ "endpoint": "/players/7" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        client.get(gateway.url("/players/7")).send().await.unwrap().status(),
        StatusCode::SERVICE_UNAVAILABLE
    );

    let mut incidents = Value::Null;
    for _ in 0..50 {
        incidents = client.get(gateway.url("/vanguard/incidents")).send().await.unwrap().json().await.unwrap();
        if incidents.as_array().is_some_and(|list| !list.is_empty()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(incidents[0]["errorType"], "circuit_open");
    assert_eq!(incidents[0]["endpoint"], "/players/7");
    assert_eq!(incidents[0]["severity"], "high");

    let res = client
        .post(gateway.url("/admin/circuits/force-closed"))
        .bearer_auth(ADMIN_KEY)
        .json(&serde_json::json!({ "endpoint": "/players/7" }))
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["previous_state"], "OPEN");
    assert_eq!(client.get(gateway.url("/players/7")).send().await.unwrap().status(), StatusCode::OK);
}
