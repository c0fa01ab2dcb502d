pub mod types;
pub mod versions;

use axum::{
    Router,
    routing::{delete, get},
};

use crate::AppState;

/// Routes for the version-management API, nested under `/api`.
pub fn version_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/versions",
            get(versions::list_versions).post(versions::deploy_version),
        )
        .route("/versions/{namespace}", delete(versions::remove_version))
        .route(
            "/versions/{namespace}/status",
            get(versions::namespace_status),
        )
        .route(
            "/versions/{namespace}/events",
            get(versions::namespace_events),
        )
        .route("/versions/{namespace}/pods", get(versions::namespace_pods))
        .route("/versions/{namespace}/logs", get(versions::namespace_logs))
        .route(
            "/versions/{namespace}/logs/stream",
            get(versions::stream_pod_logs),
        )
}
