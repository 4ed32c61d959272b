//! `/v1/firmware/check-versions` endpoint integration tests.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use afas_core::host::Device;
use common::create_app_with_golden_firmware;

#[tokio::test]
async fn test_check_firmware_version_reports_known_and_unknown_versions() {
    let device = Device {
        asset_id: 3,
        model_id: 77,
        hostname: None,
    };
    let golden = vec![0x7Fu8; 32];
    let app = create_app_with_golden_firmware(device, golden).await;

    let payload = json!({
        "model_id": 77,
        "versions": ["1.0.0", "9.9.9"],
    });

    let request = Request::builder()
        .uri("/v1/firmware/check-versions")
        .method("POST")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&payload).unwrap()))
        .expect("build request");

    let response = app.oneshot(request).await.expect("send request");
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let decoded: Value = serde_json::from_slice(&body).unwrap();
    let results = decoded.as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["version"], "1.0.0");
    assert_eq!(results[0]["exists"], true);
    assert_eq!(results[1]["version"], "9.9.9");
    assert_eq!(results[1]["exists"], false);
}

#[tokio::test]
async fn test_check_firmware_version_rejects_malformed_version_string() {
    let app = common::create_app();

    let payload = json!({"model_id": 1, "versions": ["not-a-semver"]});
    let request = Request::builder()
        .uri("/v1/firmware/check-versions")
        .method("POST")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&payload).unwrap()))
        .expect("build request");

    let response = app.oneshot(request).await.expect("send request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
