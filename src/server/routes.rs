//! Router assembly.
//!
//! The health endpoint is the only fixed route; image identifiers contain
//! slashes, so IIIF and IIP requests all land in the fallback handler.

use axum::{routing::get, Router};
use http::header::{HeaderValue, CONTENT_TYPE};
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;

use super::handlers::{health_handler, request_handler, AppState};

/// Build the application router from the resolved configuration.
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config);

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .fallback(get(request_handler))
        .with_state(state);

    if let Some(cors) = cors {
        router = router.layer(cors);
    }

    router.layer(TraceLayer::new_for_http())
}

/// Build the CORS layer from the `CORS` option. An empty value disables
/// CORS headers entirely; `*` allows any origin.
fn build_cors_layer(config: &Config) -> Option<CorsLayer> {
    if config.cors.is_empty() {
        return None;
    }

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    let cors = if config.cors == "*" {
        cors.allow_origin(Any)
    } else {
        match config.cors.parse::<HeaderValue>() {
            Ok(origin) => cors.allow_origin(origin),
            Err(_) => cors.allow_origin(Any),
        }
    };

    Some(cors)
}

// =============================================================================
// Tests
// =============================================================================
