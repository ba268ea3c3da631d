//! clusterpool-api — REST API over a [`ClusterPool`].
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/v1/sessions/{session}/assign` | Lock a cluster to a session |
//! | POST | `/api/v1/sessions/{session}/release` | Release the session's cluster |
//! | GET | `/api/v1/pool` | Pool counts and per-cluster status |
//! | GET | `/api/v1/clusters` | Every cluster, in id order |
//! | GET | `/api/v1/clusters/{id}` | One cluster |
//! | POST | `/api/v1/clusters/{id}/mark-available` | Administrative recovery |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;
pub mod prometheus;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use clusterpool_scheduler::ClusterPool;

pub use prometheus::render_prometheus;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub pool: Arc<ClusterPool>,
}

/// Build the complete API router (REST + metrics).
pub fn build_router(pool: Arc<ClusterPool>) -> Router {
    let api_state = ApiState { pool };

    let api_routes = Router::new()
        .route("/sessions/{session}/assign", post(handlers::assign))
        .route("/sessions/{session}/release", post(handlers::release))
        .route("/pool", get(handlers::pool_status))
        .route("/clusters", get(handlers::list_clusters))
        .route("/clusters/{id}", get(handlers::get_cluster))
        .route("/clusters/{id}/mark-available", post(handlers::mark_available))
        .with_state(api_state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::prometheus_metrics).with_state(api_state))
}
