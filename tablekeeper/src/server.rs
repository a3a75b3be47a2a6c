//! HTTP server exposing the reconciliation endpoint.
//!
//! # Routes
//! - `POST /api/tables/reconcile` (also `POST /api/criarTabelas`)
//! - `GET /api/ws` for reconciliation events
//! - `GET /health`
//!
//! The request body is `{"secret": "...", "tables": [...]}`. `senha` and
//! `dados` are accepted for the same fields, and `tables` may also be an
//! object whose string values name the tables in document order.

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tablekeeper_core::{ReconcileRequest, ReconcileStatus, Reconciler};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};

use crate::ws::{EventHub, ws_handler};

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub reconciler: Arc<Reconciler>,
    pub events: EventHub,
}

/// Optional server features.
#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    pub cors_origin: Option<String>,
    pub static_dir: Option<PathBuf>,
}

/// Request body of the reconcile endpoint.
#[derive(Deserialize)]
struct ReconcileBody {
    #[serde(alias = "senha")]
    secret: String,
    #[serde(alias = "dados")]
    tables: Value,
}

/// Builds the application router.
///
/// # Errors
/// Returns an error if the CORS origin is not a valid header value.
pub fn router(state: AppState, options: &ServerOptions) -> anyhow::Result<Router> {
    let mut app = Router::new()
        .route("/api/tables/reconcile", post(reconcile_handler))
        .route("/api/criarTabelas", post(reconcile_handler))
        .route("/api/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    if let Some(dir) = &options.static_dir {
        info!(dir = %dir.display(), "Serving static files");
        app = app.fallback_service(ServeDir::new(dir));
    }

    if let Some(origin) = &options.cors_origin {
        let origin: HeaderValue = origin
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid CORS origin '{origin}': {e}"))?;
        app = app.layer(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE]),
        );
    }

    Ok(app.layer(TraceLayer::new_for_http()))
}

/// Binds `addr` and serves until Ctrl-C.
///
/// # Errors
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(addr: SocketAddr, app: Router) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Starting TableKeeper server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Extracts table names from a list or an object's values.
fn table_names(value: &Value) -> Result<Vec<String>, String> {
    let items: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => map.values().collect(),
        _ => return Err("tables must be a list or an object of names".to_string()),
    };

    items
        .into_iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| format!("table names must be strings, got {item}"))
        })
        .collect()
}

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "status": "invalid", "message": message.into() })),
    )
        .into_response()
}

async fn reconcile_handler(
    State(state): State<AppState>,
    body: Result<Json<ReconcileBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection.body_text()),
    };

    let tables = match table_names(&body.tables) {
        Ok(tables) if tables.is_empty() => return bad_request("no tables requested"),
        Ok(tables) => tables,
        Err(message) => return bad_request(message),
    };

    let request = ReconcileRequest::new(body.secret, tables);
    let outcome = state.reconciler.reconcile(&request).await;

    let status = match outcome.status {
        ReconcileStatus::Done => StatusCode::OK,
        ReconcileStatus::Denied => StatusCode::FORBIDDEN,
        ReconcileStatus::Failed => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(outcome)).into_response()
}

async fn health_handler(State(state): State<AppState>) -> Response {
    match state.reconciler.adapter().test_connection().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response(),
        Err(e) => {
            warn!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            )
                .into_response()
        }
    }
}
