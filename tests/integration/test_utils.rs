//! Shared helpers for the integration tests.

use std::fs::File;
use std::path::Path;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use clap::Parser;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tower::ServiceExt;

use iiif_streamer::{create_router, AppState, Config};

/// TIFF tag holding the XMP packet.
const TAG_XMP: u16 = 700;

/// Write a two-level greyscale pyramid (256x192 over 128x96) with an
/// optional XMP packet on the first directory.
pub fn write_pyramid(path: &Path, xmp: Option<&str>) {
    let file = File::create(path).unwrap();
    let mut encoder = TiffEncoder::new(file).unwrap();

    let full: Vec<u8> = (0..192u32)
        .flat_map(|y| (0..256u32).map(move |x| ((x + y) % 256) as u8))
        .collect();
    let mut image = encoder
        .new_image::<colortype::Gray8>(256, 192)
        .unwrap();
    if let Some(xmp) = xmp {
        image
            .encoder()
            .write_tag(Tag::Unknown(TAG_XMP), xmp.as_bytes())
            .unwrap();
    }
    image.write_data(&full).unwrap();

    let half: Vec<u8> = (0..96u32)
        .flat_map(|y| (0..128u32).map(move |x| ((2 * x + 2 * y) % 256) as u8))
        .collect();
    encoder
        .write_image::<colortype::Gray8>(128, 96, &half)
        .unwrap();
}

/// An XMP packet carrying an embedded max-pixel restriction.
pub fn xmp_with_max_pixels(max: i64) -> String {
    format!(
        "<x:xmpmeta xmlns:x=\"adobe:ns:meta/\">\
         <nga:imgMaxPublicPixels>{max}</nga:imgMaxPublicPixels>\
         </x:xmpmeta>"
    )
}

/// A server rooted at a fresh temp directory. Keep the TempDir alive for
/// the duration of the test.
pub struct TestServer {
    pub dir: TempDir,
    pub config: Config,
}

impl TestServer {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::parse_from(["iiif-streamer"]).clamped();
        config.filesystem_prefix = dir.path().to_string_lossy().into_owned();
        config.logfile = String::new();
        Self { dir, config }
    }

    /// Add a pyramid image under the given name.
    pub fn add_image(&self, name: &str, xmp: Option<&str>) {
        write_pyramid(&self.dir.path().join(name), xmp);
    }

    /// Add a pyramid image at a nested path (creating directories).
    pub fn add_image_at(&self, relative: &str, xmp: Option<&str>) {
        let path = self.dir.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        write_pyramid(&path, xmp);
    }

    pub fn router(&self) -> Router {
        create_router(AppState::new(self.config.clone()))
    }
}

/// Issue a GET request against the router.
pub async fn get(router: Router, uri: &str) -> Response<Body> {
    router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

/// Issue a GET request with an extra header.
pub async fn get_with_header(
    router: Router,
    uri: &str,
    name: &str,
    value: &str,
) -> Response<Body> {
    router
        .oneshot(
            Request::builder()
                .uri(uri)
                .header(name, value)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

/// Collect a response body into bytes.
pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

/// Whether the bytes start with the JPEG SOI marker.
pub fn is_valid_jpeg(data: &[u8]) -> bool {
    data.len() > 2 && data[0] == 0xFF && data[1] == 0xD8
}

/// Decode a JPEG body and return its dimensions.
pub fn jpeg_dimensions(data: &[u8]) -> (u32, u32) {
    let img = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg).unwrap();
    (img.width(), img.height())
}
