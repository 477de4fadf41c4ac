//! Metadata cache behavior observed through the HTTP surface.

use axum::http::{header, StatusCode};
use filetime_touch::touch_future;

use super::test_utils::{body_bytes, get, jpeg_dimensions, TestServer};

/// Minimal mtime manipulation without extra dependencies.
mod filetime_touch {
    use std::fs::File;
    use std::path::Path;

    /// Rewrite the file so its modification time moves forward.
    pub fn touch_future(path: &Path) {
        let contents = std::fs::read(path).unwrap();
        // Sleep past a whole second so coarse filesystems observe a change
        std::thread::sleep(std::time::Duration::from_millis(1100));
        std::io::Write::write_all(&mut File::create(path).unwrap(), &contents).unwrap();
    }
}

#[tokio::test]
async fn test_repeated_requests_hit_cache() {
    let server = TestServer::new();
    server.add_image("scan.tif", None);
    let router = server.router();

    for _ in 0..3 {
        let response = get(router.clone(), "/scan.tif/full/64,48/0/default.jpg").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(jpeg_dimensions(&body_bytes(response).await), (64, 48));
    }
}

#[tokio::test]
async fn test_disabled_cache_still_serves() {
    let mut server = TestServer::new();
    server.config.max_headers_in_metadata_cache = 0;
    server.add_image("scan.tif", None);
    let router = server.router();

    for _ in 0..2 {
        let response = get(router.clone(), "/scan.tif/full/full/0/default.jpg").await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_timestamp_change_reloads_metadata() {
    let server = TestServer::new();
    server.add_image("scan.tif", None);
    let router = server.router();

    let first = get(router.clone(), "/scan.tif/full/full/0/default.jpg").await;
    assert_eq!(first.status(), StatusCode::OK);
    let first_modified = first
        .headers()
        .get(header::LAST_MODIFIED)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    // Rewrite the file: the cached descriptor is stale and must be rebuilt
    touch_future(&server.dir.path().join("scan.tif"));

    let second = get(router.clone(), "/scan.tif/full/full/0/default.jpg").await;
    assert_eq!(second.status(), StatusCode::OK);
    let second_modified = second
        .headers()
        .get(header::LAST_MODIFIED)
        .unwrap()
        .to_str()
        .unwrap();
    assert_ne!(first_modified, second_modified);
}

#[tokio::test]
async fn test_distinct_sample_sizes_do_not_collide() {
    let server = TestServer::new();
    let xmp = super::test_utils::xmp_with_max_pixels(600);
    server.add_image("restricted.tif", Some(&xmp));
    let router = server.router();

    // Constrained and more-constrained views of the same file
    let a = get(
        router.clone(),
        "/restricted.tif__600/full/full/0/default.jpg",
    )
    .await;
    assert_eq!(a.status(), StatusCode::OK);

    let b = get(
        router.clone(),
        "/restricted.tif__100/full/full/0/default.jpg",
    )
    .await;
    assert_eq!(b.status(), StatusCode::OK);

    // The __100 view is capped at 100 pixels on the long edge
    let body = body_bytes(b).await;
    let (w, h) = jpeg_dimensions(&body);
    assert!(w <= 100 && h <= 100);
}

#[tokio::test]
async fn test_nested_identifier_paths() {
    let server = TestServer::new();
    server.add_image_at("collection/2024/scan.tif", None);

    let response = get(
        server.router(),
        "/collection/2024/scan.tif/full/full/0/default.jpg",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}
