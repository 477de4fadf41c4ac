//! # IIIF Streamer
//!
//! A tile server for very large pyramidal raster images (gigapixel scans,
//! microscopy, digitized artworks). Clients speak the IIIF Image API
//! level 1 or the legacy IIP query dialect; the server locates the minimal
//! pyramid level for each request, crops and resamples the region, applies
//! rotation/mirroring/colourspace conversion and encodes the result as
//! JPEG or PNG.
//!
//! ## Architecture
//!
//! - [`config`] - runtime options resolved from CLI flags and environment
//! - [`url`] - identifier decoding and sanitisation
//! - [`source`] - pyramidal TIFF and JPEG2000 readers behind one descriptor
//! - [`cache`] - bounded FIFO metadata cache of opened descriptors
//! - [`view`] - per-request view specification and resolution selection
//! - [`render`] - tile fast path, region transforms and the JPEG/PNG encoders
//! - [`server`] - axum handlers for the IIIF and IIP surfaces
//!
//! ## Example
//!
//! ```rust,no_run
//! use clap::Parser;
//! use iiif_streamer::{create_router, AppState, Config};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::parse().clamped();
//!     let router = create_router(AppState::new(config));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, router).await.unwrap();
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod render;
pub mod server;
pub mod source;
pub mod url;
pub mod view;

// Re-export commonly used types
pub use cache::{cache_key, MetadataCache};
pub use config::{Config, PngCompression, PngFilter};
pub use error::{ServeError, SourceError};
pub use render::{JpegEncoder, OutputFormat, PngEncoder, RenderOutput};
pub use server::{create_router, AppState, ErrorResponse, HealthResponse};
pub use source::{ImageDescriptor, ImageFormat, RawTile};
pub use view::{Colourspace, Flip, ViewSpec};
