//! HTTP API gateway for docchat.
//!
//! Exposes the question-answering turn (blocking and SSE streaming), session
//! history, guest-session claiming, document ingestion and a live stream of
//! domain events.
//!
//! Built on Axum. Authentication happens upstream: the fronting auth layer
//! sets `X-User-Id` for signed-in callers and omits it for guests.

pub mod api;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::{Router, response::Json, routing::get};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use docchat_agent::Services;
use docchat_config::AppConfig;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub services: Services,
    pub config: AppConfig,
}

pub type SharedState = Arc<GatewayState>;

/// Build the full router: API routes plus health, with CORS, the body
/// limit and HTTP trace logging applied.
pub fn build_router(state: SharedState) -> Router {
    let cors = cors_layer(&state.config.gateway.allowed_origins);
    let body_limit = state.config.gateway.body_limit;

    Router::new()
        .route("/health", get(health_handler))
        .merge(api::api_router(state))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// CORS for the configured origins. `"*"` allows any origin, unparseable
/// origins are skipped and an empty list allows no cross-origin callers.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(parse_origins(origins))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::HeaderName::from_static(api::IDENTITY_HEADER),
        ])
        .max_age(std::time::Duration::from_secs(3600))
}

fn parse_origins(origins: &[String]) -> Vec<HeaderValue> {
    origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect()
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let services = docchat_agent::build_services(&config).await?;
    let app = build_router(Arc::new(GatewayState { services, config }));

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
