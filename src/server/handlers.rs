//! HTTP request handlers.
//!
//! A single fallback handler receives every request and dispatches on its
//! shape: a query string carrying `FIF=` is the legacy IIP dialect,
//! everything else is an IIIF path. Errors are mapped to HTTP at this
//! boundary.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::debug;

use crate::cache::MetadataCache;
use crate::config::Config;
use crate::error::{ServeError, SourceError};
use crate::render::{self, OutputFormat, RenderOutput};
use crate::source::ImageDescriptor;
use crate::url;
use crate::view::ViewSpec;

use super::{fif, iiif, iip};

/// Server response header value.
pub const SERVER_NAME: &str = concat!("iiif-streamer/", env!("CARGO_PKG_VERSION"));

// =============================================================================
// Application State
// =============================================================================

/// Shared application state: the immutable configuration and the metadata
/// cache.
pub struct AppState {
    pub config: Arc<Config>,
    pub cache: Arc<MetadataCache>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let cache = MetadataCache::new(config.metadata_cache_capacity());
        Self {
            config: Arc::new(config),
            cache: Arc::new(cache),
        }
    }
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            cache: Arc::clone(&self.cache),
        }
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,

    /// Internal error code ("1 3" for unavailable files)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(
        error: impl Into<String>,
        message: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            code: Some(code.into()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// =============================================================================
// Error Mapping
// =============================================================================

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let cacheable = self.cacheable();
        let (status, location, body) = match self {
            ServeError::Parse(message) => (
                StatusCode::BAD_REQUEST,
                None,
                Some(ErrorResponse::new("bad_request", message)),
            ),
            ServeError::Region(message) => (
                StatusCode::BAD_REQUEST,
                None,
                Some(ErrorResponse::new("invalid_region", message)),
            ),
            ServeError::File(path) => (
                StatusCode::NOT_FOUND,
                None,
                Some(ErrorResponse::with_code(
                    "not_found",
                    format!("file not found: {path}"),
                    "1 3",
                )),
            ),
            ServeError::Forbidden => (
                StatusCode::FORBIDDEN,
                None,
                Some(ErrorResponse::new("forbidden", "restricted image")),
            ),
            ServeError::PolicyRedirect(location) | ServeError::InfoRedirect(location) => {
                (StatusCode::SEE_OTHER, Some(location), None)
            }
            ServeError::NotModified => (StatusCode::NOT_MODIFIED, None, None),
            ServeError::Codec(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                None,
                Some(ErrorResponse::new("encode_error", message)),
            ),
            ServeError::Source(SourceError::NotFound(path)) => (
                StatusCode::NOT_FOUND,
                None,
                Some(ErrorResponse::with_code(
                    "not_found",
                    format!("file not found: {path}"),
                    "1 3",
                )),
            ),
            ServeError::Source(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                None,
                Some(ErrorResponse::new("source_error", err.to_string())),
            ),
        };

        let mut builder = Response::builder()
            .status(status)
            .header(header::SERVER, SERVER_NAME);
        if let Some(location) = location {
            builder = builder.header(header::LOCATION, location);
        }
        if !cacheable {
            builder = builder.header(header::CACHE_CONTROL, "no-cache");
        }

        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap_or_default()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// `GET /health`
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Fallback handler for every image request.
pub async fn request_handler(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let result = if has_fif_query(uri.query().unwrap_or("")) {
        iip_dispatch(&state, &uri, &headers).await
    } else {
        iiif_dispatch(&state, &uri, &headers).await
    };

    match result {
        Ok(response) => response,
        Err(error) => error.into_response(),
    }
}

fn has_fif_query(query: &str) -> bool {
    query
        .split('&')
        .any(|pair| pair.split('=').next().is_some_and(|k| k.eq_ignore_ascii_case("fif")))
}

// =============================================================================
// IIIF Dispatch
// =============================================================================

async fn iiif_dispatch(
    state: &AppState,
    uri: &Uri,
    headers: &HeaderMap,
) -> Result<Response, ServeError> {
    let config = &state.config;
    let request_uri = request_target(uri);

    let path = uri.path();
    let path = if !config.iiif_prefix.is_empty() {
        path.strip_prefix(config.iiif_prefix.as_str()).unwrap_or(path)
    } else {
        path
    };
    let raw = path.trim_start_matches('/');
    if raw.is_empty() {
        return Err(ServeError::Parse("no image identifier given".to_string()));
    }

    let decoded = url::decode(raw);
    let argument = decoded.value;

    // An identifier that resolves straight to a file has no parameters:
    // send the client to its info.json service
    let filecheck = if config.filesystem_prefix.is_empty() {
        format!("/{argument}")
    } else {
        format!("{}/{argument}", config.filesystem_prefix.trim_end_matches('/'))
    };
    if Path::new(&filecheck).is_file() {
        let id = canonical_id(config, headers, &request_uri, 0);
        debug!("IIIF :: sending HTTP 303 See Other: {id}/info.json");
        return Err(ServeError::InfoRedirect(format!("{id}/info.json")));
    }

    // A bare UUID identifier carries no parameters, but must pass through
    // FIF first so the embedded max-pixel policy can answer
    if fif::is_uuid_identifier(&argument) {
        let mut view = base_view(config);
        fif::resolve(
            config,
            &state.cache,
            &argument,
            &request_uri,
            if_modified_since(headers),
            &mut view,
        )
        .await?;
        let id = canonical_id(config, headers, &request_uri, 0);
        return Err(ServeError::InfoRedirect(format!("{id}/info.json")));
    }

    match iiif::split_request(&argument)? {
        iiif::IiifRequest::Bare { .. } => {
            let id = canonical_id(config, headers, &request_uri, 0);
            Err(ServeError::InfoRedirect(format!("{id}/info.json")))
        }

        iiif::IiifRequest::Info { identifier } => {
            let mut view = base_view(config);
            let resolved = fif::resolve(
                config,
                &state.cache,
                &identifier,
                &request_uri,
                if_modified_since(headers),
                &mut view,
            )
            .await?;

            // Canonical @id: strip the "/info.json" suffix from the target
            let id = canonical_id(config, headers, &request_uri, "/info.json".len());
            let iiif_id = headers
                .get("x-iiif-id")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .unwrap_or_else(|| url::escape(&id));

            let body = iiif::info_json(&resolved.descriptor, &view, &iiif_id);
            Ok(json_response(config, &resolved, body))
        }

        iiif::IiifRequest::Image { identifier, params } => {
            let mut view = base_view(config);
            let resolved = fif::resolve(
                config,
                &state.cache,
                &identifier,
                &request_uri,
                if_modified_since(headers),
                &mut view,
            )
            .await?;

            let descriptor = resolved.descriptor.clone();
            let format = iiif::parse_image_params(
                &params,
                &mut view,
                descriptor.width(),
                descriptor.height(),
            )?;

            debug!(
                "IIIF :: image request for {} region {},{} {}x{} size {}x{} rotation {}",
                descriptor.path.display(),
                view.view_left(),
                view.view_top(),
                view.view_width(),
                view.view_height(),
                view.requested_width,
                view.requested_height,
                view.rotation,
            );

            let output = run_render(config.clone(), descriptor.clone(), view, format, 1.0).await?;
            Ok(image_response(config, &resolved, output))
        }
    }
}

// =============================================================================
// IIP Dispatch
// =============================================================================

async fn iip_dispatch(
    state: &AppState,
    uri: &Uri,
    headers: &HeaderMap,
) -> Result<Response, ServeError> {
    let config = &state.config;
    let request_uri = request_target(uri);

    let pairs: Vec<(String, String)> = uri
        .query()
        .unwrap_or("")
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect();
    let request = iip::parse_query(&pairs)?;

    let mut view = base_view(config);
    let resolved = fif::resolve(
        config,
        &state.cache,
        &request.identifier,
        &request_uri,
        if_modified_since(headers),
        &mut view,
    )
    .await?;
    let descriptor = resolved.descriptor.clone();

    iip::apply_to_view(&request, &mut view)?;

    // Per-request quality override
    let config = match request.quality {
        Some(quality) => {
            let mut overridden = (**config).clone();
            overridden.jpeg_quality = quality as i32;
            Arc::new(overridden)
        }
        None => config.clone(),
    };

    let output = match request.command {
        iip::IipCommand::Tile { resolution, index } => {
            let cfg = config.clone();
            let desc = descriptor.clone();
            let view = view.clone();
            tokio::task::spawn_blocking(move || {
                render::render_tile(&desc, &view, &cfg, OutputFormat::Jpeg, resolution, index)
            })
            .await
            .map_err(|e| ServeError::Codec(format!("render task failed: {e}")))??
        }

        iip::IipCommand::Convert(format) => {
            derive_convert_size(&mut view, &descriptor, &request);
            let oversampling = config.oversampling_factor;
            run_render(config.clone(), descriptor.clone(), view, format, oversampling).await?
        }
    };

    Ok(image_response(&config, &resolved, output))
}

/// Fill in missing CVT output dimensions: a single given axis derives the
/// other from the region aspect, no axis at all means the region's own
/// size, and everything is capped by the effective output limit.
fn derive_convert_size(view: &mut ViewSpec, descriptor: &ImageDescriptor, request: &iip::IipRequest) {
    let region_w = (view.view_width() * descriptor.width() as f64).round().max(1.0);
    let region_h = (view.view_height() * descriptor.height() as f64).round().max(1.0);
    let aspect = region_w / region_h;

    match (request.width, request.height) {
        (Some(_), Some(_)) => {}
        (Some(w), None) => {
            view.requested_height = ((w as f64 / aspect).round() as u32).max(1);
        }
        (None, Some(h)) => {
            view.requested_width = ((h as f64 * aspect).round() as u32).max(1);
        }
        (None, None) => {
            view.requested_width = region_w as u32;
            view.requested_height = region_h as u32;
        }
    }

    let max = view.effective_max_size();
    if max > 0 {
        if view.requested_width > max {
            view.requested_height = ((max as f64 / view.requested_width as f64
                * view.requested_height as f64)
                .round() as u32)
                .max(1);
            view.requested_width = max;
        }
        if view.requested_height > max {
            view.requested_width = ((max as f64 / view.requested_height as f64
                * view.requested_width as f64)
                .round() as u32)
                .max(1);
            view.requested_height = max;
        }
    }
}

// =============================================================================
// Shared Helpers
// =============================================================================

/// A view spec primed with the configured limits.
fn base_view(config: &Config) -> ViewSpec {
    let mut view = ViewSpec::new();
    view.max_size = config.max_cvt();
    view.max_sample_size = config.max_sample_size();
    view.allow_upscaling = config.allow_upscaling();
    view
}

fn if_modified_since(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
}

/// The original request target (path plus query).
fn request_target(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string())
}

/// Canonical absolute URL of the request, honouring BASE_URL when the
/// server sits behind a rewriting proxy. `strip` removes a trailing
/// suffix (the "/info.json" of info requests).
fn canonical_id(config: &Config, headers: &HeaderMap, request_uri: &str, strip: usize) -> String {
    let target = &request_uri[..request_uri.len().saturating_sub(strip)];
    if !config.base_url.is_empty() {
        let base = config.base_url.trim_end_matches('/');
        return format!("{base}{target}");
    }
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{host}{target}")
}

async fn run_render(
    config: Arc<Config>,
    descriptor: Arc<ImageDescriptor>,
    view: ViewSpec,
    format: OutputFormat,
    oversampling: f32,
) -> Result<RenderOutput, ServeError> {
    tokio::task::spawn_blocking(move || {
        render::render(&descriptor, &view, &config, format, oversampling)
    })
    .await
    .map_err(|e| ServeError::Codec(format!("render task failed: {e}")))?
}

fn cache_control_value(config: &Config, resolved: &fif::ResolvedImage) -> String {
    if resolved.cacheable {
        config.cache_control.clone()
    } else {
        "no-cache".to_string()
    }
}

fn last_modified_value(descriptor: &ImageDescriptor) -> String {
    let when = UNIX_EPOCH + Duration::from_secs(descriptor.timestamp.max(0) as u64);
    httpdate::fmt_http_date(when)
}

fn json_response(config: &Config, resolved: &fif::ResolvedImage, body: String) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::SERVER, SERVER_NAME)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::LAST_MODIFIED, last_modified_value(&resolved.descriptor))
        .header(header::CACHE_CONTROL, cache_control_value(config, resolved))
        .body(Body::from(body))
        .unwrap()
}

fn image_response(
    config: &Config,
    resolved: &fif::ResolvedImage,
    output: RenderOutput,
) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::SERVER, SERVER_NAME)
        .header(header::CONTENT_TYPE, output.format.content_type())
        .header(header::LAST_MODIFIED, last_modified_value(&resolved.descriptor))
        .header(header::CACHE_CONTROL, cache_control_value(config, resolved))
        .body(Body::from(output.data))
        .unwrap()
}

// =============================================================================
// Tests
// =============================================================================
