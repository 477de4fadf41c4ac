//! HTTP server: request handlers, protocol parsing and routing.
//!
//! - [`fif`] resolves identifiers to images and applies the embedded
//!   max-pixel policy
//! - [`iiif`] parses the IIIF Image API grammar and builds info.json
//! - [`iip`] parses the legacy CGI-style query dialect
//! - [`handlers`] maps both surfaces onto HTTP
//! - [`routes`] assembles the axum router

pub mod fif;
pub mod handlers;
pub mod iiif;
pub mod iip;
pub mod routes;

pub use handlers::{
    health_handler, request_handler, AppState, ErrorResponse, HealthResponse, SERVER_NAME,
};
pub use routes::create_router;
