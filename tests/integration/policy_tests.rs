//! Embedded max-pixel policy tests: redirect, forbid and pass-through
//! behavior driven by the `nga:imgMaxPublicPixels` XMP element.

use axum::http::{header, StatusCode};

use super::test_utils::{body_bytes, get, is_valid_jpeg, xmp_with_max_pixels, TestServer};

#[tokio::test]
async fn test_unconstrained_request_redirects_with_marker() {
    let server = TestServer::new();
    server.add_image("restricted.tif", Some(&xmp_with_max_pixels(600)));

    let response = get(
        server.router(),
        "/restricted.tif/full/full/0/default.jpg",
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let location = response.headers().get(header::LOCATION).unwrap();
    assert_eq!(
        location.to_str().unwrap(),
        "/restricted.tif__600/full/full/0/default.jpg"
    );
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-cache"
    );
}

#[tokio::test]
async fn test_redirect_round_trip_serves_image() {
    let server = TestServer::new();
    server.add_image("restricted.tif", Some(&xmp_with_max_pixels(600)));

    // First request is redirected
    let response = get(
        server.router(),
        "/restricted.tif/full/full/0/default.jpg",
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    // Following the redirect serves the image; a request that honours the
    // restriction is an ordinary cacheable response
    let response = get(server.router(), &location).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_ne!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-cache"
    );
    assert!(is_valid_jpeg(&body_bytes(response).await));
}

#[tokio::test]
async fn test_request_within_restriction_passes() {
    let server = TestServer::new();
    server.add_image("restricted.tif", Some(&xmp_with_max_pixels(600)));

    let response = get(
        server.router(),
        "/restricted.tif__400/full/full/0/default.jpg",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_fully_restricted_image_forbidden() {
    let server = TestServer::new();
    server.add_image("locked.tif", Some(&xmp_with_max_pixels(0)));

    let response = get(server.router(), "/locked.tif/full/full/0/default.jpg").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-cache"
    );
}

#[tokio::test]
async fn test_enforcement_disabled_serves_without_redirect() {
    let mut server = TestServer::new();
    server.config.enforce_embedded_max_sample = 0;
    server.add_image("restricted.tif", Some(&xmp_with_max_pixels(600)));

    let response = get(
        server.router(),
        "/restricted.tif/full/full/0/default.jpg",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    // Still not cacheable: the restriction applies even unenforced
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-cache"
    );
}

#[tokio::test]
async fn test_unrestricted_image_unaffected() {
    let server = TestServer::new();
    server.add_image("open.tif", None);

    let response = get(server.router(), "/open.tif/full/full/0/default.jpg").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_ne!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-cache"
    );
}

#[tokio::test]
async fn test_uuid_identifier_policy_redirect() {
    let server = TestServer::new();
    server.add_image_at(
        "public/images/abc/def/abcdef01-2345-6789-abcd-ef0123456789",
        Some(&xmp_with_max_pixels(600)),
    );

    let response = get(server.router(), "/abc/def/01-2345-6789-abcd-ef0123456789").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let location = response.headers().get(header::LOCATION).unwrap();
    assert_eq!(
        location.to_str().unwrap(),
        "/abc/def/01-2345-6789-abcd-ef0123456789__600"
    );
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-cache"
    );
}

#[tokio::test]
async fn test_uuid_identifier_within_restriction_redirects_to_info() {
    let server = TestServer::new();
    server.add_image_at(
        "public/images/abc/def/abcdef01-2345-6789-abcd-ef0123456789",
        Some(&xmp_with_max_pixels(600)),
    );

    let response = get(
        server.router(),
        "/abc/def/01-2345-6789-abcd-ef0123456789__600",
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response.headers().get(header::LOCATION).unwrap();
    assert!(location.to_str().unwrap().ends_with("/info.json"));
}

#[tokio::test]
async fn test_private_directory_preferred_over_public() {
    let server = TestServer::new();
    // Same uuid in both trees; private must win
    server.add_image_at(
        "private/images/abc/def/abcdef01-2345-6789-abcd-ef0123456789",
        None,
    );
    server.add_image_at(
        "public/images/abc/def/abcdef01-2345-6789-abcd-ef0123456789",
        None,
    );

    let response = get(
        server.router(),
        "/abc/def/01-2345-6789-abcd-ef0123456789/full/full/0/default.jpg",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}
