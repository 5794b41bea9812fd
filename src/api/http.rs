//! HTTP server setup with Axum

use std::future::Future;
use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::websocket::{ws_handler, AppState};
use crate::relay::{Relay, RelayStats};

/// Create the Axum router with all endpoints
pub fn create_router(state: AppState) -> Router {
    // CORS configuration - allow all origins
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // WebSocket endpoint
        .route("/ws", get(ws_handler))
        // Health check
        .route("/health", get(health_check))
        .route("/stats", get(stats))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve the relay on `listener` until `shutdown` resolves, then shut the
/// relay down so open sockets are closed.
pub async fn serve<F>(listener: TcpListener, relay: Arc<Relay>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(AppState::new(Arc::clone(&relay)));

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            relay.shutdown();
        })
        .await
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Connection, room, and pending broadcast counters
async fn stats(State(state): State<AppState>) -> Json<RelayStats> {
    Json(state.relay.stats())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    fn app() -> (Router, Arc<Relay>) {
        let relay = Arc::new(Relay::new(RelayConfig::default()));
        (create_router(AppState::new(relay.clone())), relay)
    }

    #[tokio::test]
    async fn test_health_check() {
        let (app, _relay) = app();

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn test_stats_reports_counters() {
        let (app, relay) = app();
        let (handle, _rx) = relay.open_connection().unwrap();
        relay.join(handle.id(), "doc-1").unwrap();

        let response = app
            .oneshot(Request::builder().uri("/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let stats: RelayStats = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            stats,
            RelayStats {
                connections: 1,
                rooms: 1,
                pending_broadcasts: 1
            }
        );
    }

    #[tokio::test]
    async fn test_ws_requires_upgrade() {
        let (app, _relay) = app();

        let response = app
            .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }
}
