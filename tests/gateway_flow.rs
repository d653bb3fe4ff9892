//! End-to-end data-plane tests: correlation ids, rate limiting, validation
//! and resource-type routing through a live gateway.

use reqwest::StatusCode;
use task_gateway::registry::ServiceInfo;

mod common;

#[tokio::test]
async fn test_request_id_round_trip() {
    let core = common::start_echo_backend("core").await;
    let gateway = common::start_gateway(common::test_config(core)).await;

    let res = reqwest::Client::new()
        .get(gateway.url("/api/v1/users/42"))
        .header("X-Request-ID", "trace-abc-123")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-request-id"], "trace-abc-123");
    assert_eq!(res.headers()["x-backend"], "core");

    let seen = res.text().await.unwrap().to_lowercase();
    assert!(seen.contains("x-request-id: trace-abc-123"), "{}", seen);
    assert!(seen.starts_with("get /api/v1/users/42 "), "{}", seen);
}

#[tokio::test]
async fn test_request_id_generated_when_absent() {
    let core = common::start_echo_backend("core").await;
    let gateway = common::start_gateway(common::test_config(core)).await;

    let res = reqwest::get(gateway.url("/anything")).await.unwrap();
    let id = res.headers()["x-request-id"].to_str().unwrap().to_string();

    let parts: Vec<&str> = id.split('_').collect();
    assert_eq!(parts.len(), 3, "{}", id);
    assert_eq!(parts[0], "req");
    assert_eq!(parts[2].len(), 8);

    let seen = res.text().await.unwrap().to_lowercase();
    assert!(seen.contains(&format!("x-request-id: {}", id.to_lowercase())));
}

#[tokio::test]
async fn test_task_dispatched_to_registered_instance() {
    let core = common::start_echo_backend("core").await;
    let executor = common::start_echo_backend("docking").await;
    let gateway = common::start_gateway(common::test_config(core)).await;

    gateway
        .registry
        .register(ServiceInfo::new("docking-executor", "127.0.0.1", executor.port()))
        .await
        .unwrap();

    let res = reqwest::Client::new()
        .post(gateway.url("/api/v1/tasks/gnina-molecular-docking/execute"))
        .json(&serde_json::json!({"ligand": "CCO"}))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-backend"], "docking");

    let seen = res.text().await.unwrap().to_lowercase();
    assert!(seen.contains("x-task-type: gnina-molecular-docking"));
    assert!(seen.contains(&format!("x-selected-instance: 127.0.0.1:{}", executor.port())));
    assert!(seen.contains("x-upstream-timeout: 300"));
    assert!(seen.contains(r#"{"ligand":"cco"}"#), "{}", seen);
}

#[tokio::test]
async fn test_task_without_healthy_instance_falls_back() {
    let core = common::start_echo_backend("core").await;
    let executor = common::start_echo_backend("docking").await;
    let gateway = common::start_gateway(common::test_config(core)).await;

    let instance = gateway
        .registry
        .register(ServiceInfo::new("docking-executor", "127.0.0.1", executor.port()))
        .await
        .unwrap();
    gateway.registry.update_health(&instance.key(), false).await.unwrap();

    let res = reqwest::get(gateway.url("/tasks/docking/status")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-backend"], "core");

    let seen = res.text().await.unwrap().to_lowercase();
    assert!(!seen.contains("x-selected-instance"));
}

#[tokio::test]
async fn test_task_validation() {
    let core = common::start_echo_backend("core").await;
    let gateway = common::start_gateway(common::test_config(core)).await;
    let client = reqwest::Client::new();

    let res = client
        .post(gateway.url("/api/v1/tasks/docking/execute"))
        .header("content-type", "text/plain")
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(res.headers().contains_key("x-request-id"));
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unsupported_media_type");

    let res = client
        .patch(gateway.url("/api/v1/tasks/docking/execute"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);

    // Other paths are not constrained.
    let res = client.patch(gateway.url("/api/v1/users/1")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rate_limit_allows_limit_plus_burst() {
    let core = common::start_echo_backend("core").await;
    let mut config = common::test_config(core);
    config.rate_limit.limit = 3;
    config.rate_limit.burst = 2;
    let gateway = common::start_gateway(config).await;
    let client = reqwest::Client::new();

    for i in 1..=5u64 {
        let res = client.get(gateway.url("/api/v1/users")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK, "request {}", i);
        assert_eq!(res.headers()["x-ratelimit-limit"], "3");
        let remaining: u64 = res.headers()["x-ratelimit-remaining"].to_str().unwrap().parse().unwrap();
        assert_eq!(remaining, 3u64.saturating_sub(i));
    }

    let res = client
        .get(gateway.url("/api/v1/users"))
        .header("X-Request-ID", "limited-1")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(res.headers()["x-request-id"], "limited-1");
    assert_eq!(res.headers()["retry-after"], "60");
    assert!(res.headers().contains_key("x-ratelimit-reset"));

    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "rate_limit_exceeded");
    assert_eq!(body["current"], 6);
    assert_eq!(body["limit"], 3);
}

#[tokio::test]
async fn test_users_behind_trusted_proxy_are_limited_separately() {
    let core = common::start_echo_backend("core").await;
    let mut config = common::test_config(core);
    config.rate_limit.limit = 1;
    config.rate_limit.burst = 0;
    config.rate_limit.trusted_proxies = vec!["127.0.0.1".parse().unwrap()];
    let gateway = common::start_gateway(config).await;
    let client = reqwest::Client::new();

    for user in ["alice", "bob"] {
        let res = client
            .get(gateway.url("/x"))
            .header("X-User-ID", user)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK, "{}", user);
    }

    let res = client.get(gateway.url("/x")).header("X-User-ID", "alice").send().await.unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_self_asserted_user_ids_do_not_bypass_limit() {
    let core = common::start_echo_backend("core").await;
    let mut config = common::test_config(core);
    config.rate_limit.limit = 1;
    config.rate_limit.burst = 0;
    let gateway = common::start_gateway(config).await;
    let client = reqwest::Client::new();

    let mut allowed = 0;
    for i in 0..20 {
        let res = client
            .get(gateway.url("/x"))
            .header("X-User-ID", format!("forged-{}", i))
            .send()
            .await
            .unwrap();
        if res.status() == StatusCode::OK {
            allowed += 1;
            let seen = res.text().await.unwrap();
            assert!(!seen.to_ascii_lowercase().contains("x-user-id"), "{}", seen);
        }
    }
    assert_eq!(allowed, 1);
}

#[tokio::test]
async fn test_unreachable_default_backend_is_bad_gateway() {
    let closed = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let gateway = common::start_gateway(common::test_config(closed)).await;

    let res = reqwest::get(gateway.url("/api/v1/users")).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert!(res.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_probes() {
    let core = common::start_echo_backend("core").await;
    let gateway = common::start_gateway(common::test_config(core)).await;

    let res = reqwest::get(gateway.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "healthy");

    let res = reqwest::get(gateway.url("/ready")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}
