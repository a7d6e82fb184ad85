use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::server::app::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: DatabaseHealth,
    pub uptime_seconds: u64,
    pub in_flight_documents: usize,
    pub runtime_workers: usize,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DatabaseHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Health check endpoint
///
/// Returns 200 OK when the store answers within 5 seconds, 503 otherwise.
pub async fn health_handler(
    Extension(state): Extension<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let db_health = match tokio::time::timeout(
        Duration::from_secs(5),
        state.store.check_connection(),
    )
    .await
    {
        Ok(Ok(())) => DatabaseHealth {
            status: "ok".to_string(),
            error: None,
        },
        Ok(Err(e)) => DatabaseHealth {
            status: "error".to_string(),
            error: Some(format!("Query failed: {}", e)),
        },
        Err(_) => DatabaseHealth {
            status: "error".to_string(),
            error: Some("Query timeout (>5s)".to_string()),
        },
    };

    let is_healthy = db_health.status == "ok";
    let status_code = if is_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if is_healthy { "healthy" } else { "unhealthy" }.to_string(),
            database: db_health,
            uptime_seconds: state.started_at.elapsed().as_secs(),
            in_flight_documents: state.in_flight.load(Ordering::SeqCst),
            runtime_workers: tokio::runtime::Handle::current().metrics().num_workers(),
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::test_dependencies::MockStore;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[tokio::test]
    async fn healthy_store_reports_ok() {
        let in_flight = Arc::new(AtomicUsize::new(2));
        let state = AppState::new(Arc::new(MockStore::new()), in_flight);

        let (status, Json(body)) = health_handler(Extension(state)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "healthy");
        assert_eq!(body.in_flight_documents, 2);
        assert!(body.database.error.is_none());
    }

    #[tokio::test]
    async fn failing_store_reports_unavailable() {
        let store = MockStore::new().with_failing_checks(1);
        let state = AppState::new(Arc::new(store), Arc::new(AtomicUsize::new(0)));

        let (status, Json(body)) = health_handler(Extension(state)).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.status, "unhealthy");
        assert_eq!(body.database.status, "error");
    }
}
