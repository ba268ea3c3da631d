//! API regression tests.
//!
//! Drives the full router with `oneshot` requests: assign, release, pool
//! status, cluster lookup, recovery and metrics.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use clusterpool_api::build_router;
use clusterpool_scheduler::{BoxFuture, ClusterPool, ClusterResetter, ReclaimConfig};
use clusterpool_state::*;
use tower::ServiceExt;

struct QuickReset;

impl ClusterResetter for QuickReset {
    fn reset(&self, _resource: &Resource) -> BoxFuture<Result<(), String>> {
        Box::pin(async { Ok(()) })
    }
}

struct BrokenReset;

impl ClusterResetter for BrokenReset {
    fn reset(&self, _resource: &Resource) -> BoxFuture<Result<(), String>> {
        Box::pin(async { Err("api server unreachable".to_string()) })
    }
}

fn test_pool(size: usize, resetter: Arc<dyn ClusterResetter>) -> Arc<ClusterPool> {
    let registry = PoolRegistry::initialize(size, &IndexedNamer::default()).unwrap();
    for resource in registry.list() {
        registry.transition(&resource.id, Transition::Confirm).unwrap();
    }
    let config = ReclaimConfig {
        timeout: Duration::from_secs(5),
        shutdown_grace: Duration::from_secs(1),
    };
    Arc::new(ClusterPool::new(registry, resetter, config).unwrap())
}

async fn send(router: &Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn assign_returns_cluster_details() {
    let pool = test_pool(2, Arc::new(QuickReset));
    let router = build_router(pool);

    let (status, body) = send(&router, "POST", "/api/v1/sessions/s1/assign").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["resource_id"], "cluster-1");
    assert_eq!(body["data"]["namespace"], "ns-cluster-1");
    assert_eq!(body["data"]["status"], "locked");
    assert_eq!(body["data"]["members"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn double_assign_is_conflict() {
    let router = build_router(test_pool(2, Arc::new(QuickReset)));
    send(&router, "POST", "/api/v1/sessions/s1/assign").await;

    let (status, body) = send(&router, "POST", "/api/v1/sessions/s1/assign").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(body["kind"], "session_already_bound");
}

#[tokio::test]
async fn exhausted_pool_is_503() {
    let router = build_router(test_pool(1, Arc::new(QuickReset)));
    send(&router, "POST", "/api/v1/sessions/s1/assign").await;

    let (status, body) = send(&router, "POST", "/api/v1/sessions/s2/assign").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["kind"], "pool_exhausted");
}

#[tokio::test]
async fn release_then_reclaim_restores_pool() {
    let pool = test_pool(1, Arc::new(QuickReset));
    let router = build_router(pool.clone());
    send(&router, "POST", "/api/v1/sessions/s1/assign").await;

    let (status, body) = send(&router, "POST", "/api/v1/sessions/s1/release").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["resource_id"], "cluster-1");

    let (status, body) = send(&router, "POST", "/api/v1/sessions/s1/release").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "session_not_bound");

    pool.reclaimer().wait_idle().await;
    let (status, body) = send(&router, "GET", "/api/v1/pool").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["available"], 1);
    assert_eq!(body["data"]["resources"]["cluster-1"], "available");
}

#[tokio::test]
async fn failed_reset_recovered_through_api() {
    let pool = test_pool(1, Arc::new(BrokenReset));
    let router = build_router(pool.clone());
    send(&router, "POST", "/api/v1/sessions/s1/assign").await;
    send(&router, "POST", "/api/v1/sessions/s1/release").await;
    pool.reclaimer().wait_idle().await;

    let (status, body) = send(&router, "GET", "/api/v1/clusters/cluster-1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "error");
    assert_eq!(body["data"]["fault"]["kind"], "reset_failed");

    let (status, _) = send(&router, "POST", "/api/v1/sessions/s2/assign").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, body) = send(&router, "POST", "/api/v1/clusters/cluster-1/mark-available").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "available");

    let (status, _) = send(&router, "POST", "/api/v1/sessions/s2/assign").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn mark_available_on_locked_is_conflict() {
    let router = build_router(test_pool(1, Arc::new(QuickReset)));
    send(&router, "POST", "/api/v1/sessions/s1/assign").await;

    let (status, body) = send(&router, "POST", "/api/v1/clusters/cluster-1/mark-available").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "invalid_transition");
}

#[tokio::test]
async fn unknown_cluster_is_404() {
    let router = build_router(test_pool(1, Arc::new(QuickReset)));
    let (status, body) = send(&router, "GET", "/api/v1/clusters/cluster-42").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn list_clusters_in_id_order() {
    let router = build_router(test_pool(3, Arc::new(QuickReset)));
    let (status, body) = send(&router, "GET", "/api/v1/clusters").await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["cluster-1", "cluster-2", "cluster-3"]);
}

#[tokio::test]
async fn shutdown_rejects_requests() {
    let pool = test_pool(1, Arc::new(QuickReset));
    let router = build_router(pool.clone());
    pool.shutdown().await;

    let (status, body) = send(&router, "POST", "/api/v1/sessions/s1/assign").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["kind"], "shutting_down");
}

#[tokio::test]
async fn metrics_endpoint_exposes_gauges() {
    let router = build_router(test_pool(2, Arc::new(QuickReset)));
    send(&router, "POST", "/api/v1/sessions/s1/assign").await;

    let req = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("clusterpool_clusters{status=\"locked\"} 1"));
    assert!(text.contains("clusterpool_clusters{status=\"available\"} 1"));
}
