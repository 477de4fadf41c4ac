//! Legacy IIP dialect tests: `FIF` + `CVT`/`JTL` query requests.

use axum::http::{header, StatusCode};

use super::test_utils::{body_bytes, get, is_valid_jpeg, jpeg_dimensions, TestServer};

#[tokio::test]
async fn test_cvt_full_image() {
    let server = TestServer::new();
    server.add_image("scan.tif", None);

    let response = get(server.router(), "/?FIF=scan.tif&CVT=jpeg").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/jpeg"
    );
    assert_eq!(jpeg_dimensions(&body_bytes(response).await), (256, 192));
}

#[tokio::test]
async fn test_cvt_with_width_derives_height() {
    let server = TestServer::new();
    server.add_image("scan.tif", None);

    let response = get(server.router(), "/?FIF=scan.tif&WID=64&CVT=jpeg").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(jpeg_dimensions(&body_bytes(response).await), (64, 48));
}

#[tokio::test]
async fn test_cvt_region() {
    let server = TestServer::new();
    server.add_image("scan.tif", None);

    let response = get(
        server.router(),
        "/?FIF=scan.tif&RGN=0.25,0.25,0.5,0.5&WID=64&HEI=48&CVT=jpeg",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(jpeg_dimensions(&body_bytes(response).await), (64, 48));
}

#[tokio::test]
async fn test_jtl_tile_request() {
    let server = TestServer::new();
    server.add_image("scan.tif", None);

    // Resolution 0 is the 128x96 level; it fits a single strip-tile
    let response = get(server.router(), "/?FIF=scan.tif&JTL=0,0").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_bytes(response).await;
    assert!(is_valid_jpeg(&body));
    assert_eq!(jpeg_dimensions(&body), (128, 96));
}

#[tokio::test]
async fn test_jtl_out_of_range_tile() {
    let server = TestServer::new();
    server.add_image("scan.tif", None);

    let response = get(server.router(), "/?FIF=scan.tif&JTL=0,99").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_command_is_bad_request() {
    let server = TestServer::new();
    server.add_image("scan.tif", None);

    let response = get(server.router(), "/?FIF=scan.tif&WID=100").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_image_is_not_found() {
    let server = TestServer::new();

    let response = get(server.router(), "/?FIF=absent.tif&CVT=jpeg").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cvt_png_output() {
    let server = TestServer::new();
    server.add_image("scan.tif", None);

    let response = get(server.router(), "/?FIF=scan.tif&WID=32&CVT=png").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/png"
    );
}
