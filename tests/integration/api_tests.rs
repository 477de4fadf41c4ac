//! End-to-end IIIF API tests: full requests, regions, sizes, rotation,
//! quality, info.json and error responses.

use axum::http::{header, StatusCode};
use serde_json::Value;

use super::test_utils::{
    body_bytes, get, get_with_header, is_valid_jpeg, jpeg_dimensions, TestServer,
};

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let server = TestServer::new();
    let response = get(server.router(), "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["status"], "healthy");
}

// =============================================================================
// Full Image Requests
// =============================================================================

#[tokio::test]
async fn test_full_image_request() {
    let server = TestServer::new();
    server.add_image("scan.tif", None);

    let response = get(server.router(), "/scan.tif/full/full/0/default.jpg").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/jpeg"
    );
    assert!(response.headers().get(header::LAST_MODIFIED).is_some());
    assert!(response.headers().get(header::SERVER).is_some());

    let body = body_bytes(response).await;
    assert!(is_valid_jpeg(&body));
    assert_eq!(jpeg_dimensions(&body), (256, 192));
}

#[tokio::test]
async fn test_forced_size_breaks_aspect() {
    let server = TestServer::new();
    server.add_image("scan.tif", None);

    let response = get(server.router(), "/scan.tif/full/100,100/0/default.jpg").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(jpeg_dimensions(&body_bytes(response).await), (100, 100));
}

#[tokio::test]
async fn test_fit_box_preserves_aspect() {
    let server = TestServer::new();
    server.add_image("scan.tif", None);

    // 256x192 fit into !96,96 gives 96x72
    let response = get(server.router(), "/scan.tif/full/!96,96/0/default.jpg").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(jpeg_dimensions(&body_bytes(response).await), (96, 72));
}

// =============================================================================
// Regions
// =============================================================================

#[tokio::test]
async fn test_square_region_gray() {
    let server = TestServer::new();
    server.add_image("scan.tif", None);

    let response = get(server.router(), "/scan.tif/square/50,/0/gray.jpg").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_bytes(response).await;
    assert_eq!(jpeg_dimensions(&body), (50, 50));
    let img = image::load_from_memory_with_format(&body, image::ImageFormat::Jpeg).unwrap();
    assert_eq!(img.color().channel_count(), 1);
}

#[tokio::test]
async fn test_pct_region_with_rotation() {
    let server = TestServer::new();
    server.add_image("scan.tif", None);

    let response = get(
        server.router(),
        "/scan.tif/pct:25,25,50,50/!64,64/90/default.jpg",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Region is 128x96; fit in 64x64 gives 64x48; rotated 90 gives 48x64
    assert_eq!(jpeg_dimensions(&body_bytes(response).await), (48, 64));
}

#[tokio::test]
async fn test_region_larger_than_image_is_invalid() {
    let server = TestServer::new();
    server.add_image("scan.tif", None);

    let response = get(server.router(), "/scan.tif/0,0,1000,1000/full/0/default.jpg").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_pixel_region_exact_output() {
    let server = TestServer::new();
    server.add_image("scan.tif", None);

    let response = get(server.router(), "/scan.tif/64,48,128,96/full/0/default.jpg").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(jpeg_dimensions(&body_bytes(response).await), (128, 96));
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_missing_image_gives_404_with_code() {
    let server = TestServer::new();

    let response = get(server.router(), "/absent.tif/full/full/0/default.jpg").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["code"], "1 3");
}

#[tokio::test]
async fn test_invalid_quality_rejected() {
    let server = TestServer::new();
    server.add_image("scan.tif", None);

    let response = get(server.router(), "/scan.tif/full/full/0/sepia.jpg").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_rotation_rejected() {
    let server = TestServer::new();
    server.add_image("scan.tif", None);

    let response = get(server.router(), "/scan.tif/full/full/45/default.jpg").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_too_few_parameters_rejected() {
    let server = TestServer::new();
    server.add_image("scan.tif", None);

    let response = get(server.router(), "/scan.tif/full/default.jpg").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// info.json
// =============================================================================

#[tokio::test]
async fn test_info_json_document() {
    let server = TestServer::new();
    server.add_image("scan.tif", None);

    let response = get(server.router(), "/scan.tif/info.json").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );

    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["width"], 256);
    assert_eq!(body["height"], 192);
    assert_eq!(body["protocol"], "http://iiif.io/api/image");
    assert_eq!(
        body["@context"],
        "http://iiif.io/api/image/2/context.json"
    );

    // Smallest level is advertised in sizes
    let sizes = body["sizes"].as_array().unwrap();
    assert_eq!(sizes[0]["width"], 128);
    assert_eq!(sizes[0]["height"], 96);

    // Two levels: scale factors 1 and 2
    let tiles = &body["tiles"][0];
    assert_eq!(tiles["scaleFactors"], serde_json::json!([1, 2]));

    let profile = body["profile"].as_array().unwrap();
    let supports = profile[1]["supports"].as_array().unwrap();
    assert!(supports.iter().any(|s| s == "regionByPct"));
    assert!(supports.iter().any(|s| s == "mirroring"));
}

#[tokio::test]
async fn test_info_json_honours_x_iiif_id() {
    let server = TestServer::new();
    server.add_image("scan.tif", None);

    let response = get_with_header(
        server.router(),
        "/scan.tif/info.json",
        "x-iiif-id",
        "https://cdn.example.org/iiif/scan.tif",
    )
    .await;
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["@id"], "https://cdn.example.org/iiif/scan.tif");
}

#[tokio::test]
async fn test_bare_identifier_redirects_to_info() {
    let server = TestServer::new();
    server.add_image("scan.tif", None);

    let response = get(server.router(), "/scan.tif").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response.headers().get(header::LOCATION).unwrap();
    assert!(location.to_str().unwrap().ends_with("/scan.tif/info.json"));
}

// =============================================================================
// Conditional GET
// =============================================================================

#[tokio::test]
async fn test_if_modified_since_yields_304() {
    let server = TestServer::new();
    server.add_image("scan.tif", None);

    // A date far in the future is always at or after the file timestamp
    let response = get_with_header(
        server.router(),
        "/scan.tif/full/full/0/default.jpg",
        "if-modified-since",
        "Fri, 01 Jan 2100 00:00:00 GMT",
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_stale_if_modified_since_yields_full_response() {
    let server = TestServer::new();
    server.add_image("scan.tif", None);

    let response = get_with_header(
        server.router(),
        "/scan.tif/full/full/0/default.jpg",
        "if-modified-since",
        "Mon, 01 Jan 2001 00:00:00 GMT",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

// =============================================================================
// PNG Output
// =============================================================================

#[tokio::test]
async fn test_png_output() {
    let server = TestServer::new();
    server.add_image("scan.tif", None);

    let response = get(server.router(), "/scan.tif/full/80,60/0/default.png").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/png"
    );

    let body = body_bytes(response).await;
    assert_eq!(&body[1..4], b"PNG");
}
