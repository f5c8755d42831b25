use axum::body::Body;
use axum::http::{Request, StatusCode};
use firmware_site_lib::engine::api::{create_router, KeyResult};
use firmware_site_lib::engine::config::{ArtifactMode, Config, KeySource};
use firmware_site_lib::engine::crypto::{Algorithm, FileSigner, PublicKey, TransportEncoding};
use firmware_site_lib::engine::updater::{manifest_text, UpdateResult};
use firmware_site_lib::engine::Site;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

fn site(dir: &std::path::Path, algorithm: Algorithm, mode: ArtifactMode) -> Site {
    let mut config = Config::default_for_site("acme", "8080");
    config.crypto.algorithm = algorithm;
    config.crypto.key_bits = 1024;
    config.crypto.key_source = KeySource::Persisted;
    config.crypto.transport_encoding = TransportEncoding::Hex;
    config.updates.artifact_mode = mode;
    Site::with_config(dir, config).unwrap()
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_version_check_reports_stored_version() {
    let dir = tempfile::tempdir().unwrap();
    let site = site(dir.path(), Algorithm::Ed25519, ArtifactMode::Sign);
    let app = create_router(site.api_state().unwrap());

    let (status, body) = get(app.clone(), "/firmware/update/router-x1").await;
    assert_eq!(status, StatusCode::OK);
    let result: UpdateResult = serde_json::from_value(body).unwrap();
    assert_eq!(result.action, "version");
    assert_eq!(result.version, "1");
    assert_eq!(result.firmware, "8080");

    site.db.increment_version("8080", "router-x1").unwrap();
    let (_, body) = get(app, "/firmware/update/router-x1").await;
    assert_eq!(body["version"], "2");
}

#[tokio::test]
async fn test_signed_package_verifies_with_published_key() {
    let dir = tempfile::tempdir().unwrap();
    let site = site(dir.path(), Algorithm::Rsa, ArtifactMode::Sign);
    let app = create_router(site.api_state().unwrap());

    let (status, body) = get(app.clone(), "/firmware/publickey").await;
    assert_eq!(status, StatusCode::OK);
    let key: KeyResult = serde_json::from_value(body).unwrap();
    assert_eq!(key.action, "publickey");
    assert_eq!(key.algorithm, "RSA");
    let der = TransportEncoding::Hex.decode(&key.publickey).unwrap();
    let public = PublicKey::from_der(Algorithm::Rsa, &der).unwrap();

    let (status, body) = get(app, "/firmware/update/package/router-x1").await;
    assert_eq!(status, StatusCode::OK);
    let result: UpdateResult = serde_json::from_value(body).unwrap();
    assert_eq!(result.action, "update");

    let payload = TransportEncoding::Hex.decode(&result.payload.unwrap()).unwrap();
    let signature = TransportEncoding::Hex.decode(&result.file.unwrap()).unwrap();
    assert_eq!(payload, manifest_text("8080", "router-x1", 1).as_bytes());
    assert!(FileSigner::verify(&payload, &signature, &public).unwrap());
    assert!(dir.path().join("updateFiles").join("Update_router-x1_1.txt").exists());
}

#[tokio::test]
async fn test_encrypted_package_decrypts_with_site_key() {
    let dir = tempfile::tempdir().unwrap();
    let site = site(dir.path(), Algorithm::Rsa, ArtifactMode::Encrypt);
    let state = site.api_state().unwrap();
    let keys = state.keys.clone();
    let app = create_router(state);

    let (status, body) = get(app, "/firmware/update/package/cam-2").await;
    assert_eq!(status, StatusCode::OK);
    let result: UpdateResult = serde_json::from_value(body).unwrap();
    assert!(result.payload.is_none());

    let manifest = site
        .config
        .cipher()
        .decrypt_encoded(&result.file.unwrap(), keys.private_key().unwrap())
        .unwrap();
    assert_eq!(manifest, manifest_text("8080", "cam-2", 1).as_bytes());
}

#[tokio::test]
async fn test_invalid_model_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let site = site(dir.path(), Algorithm::Ed25519, ArtifactMode::Sign);
    let app = create_router(site.api_state().unwrap());

    let (status, body) = get(app.clone(), "/firmware/update/package/..hidden").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Invalid model"));

    let (status, _) = get(app, "/firmware/update/bad%20model").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(site.db.list_versions("8080").unwrap().is_empty());
}

#[tokio::test]
async fn test_health_and_openapi() {
    let dir = tempfile::tempdir().unwrap();
    let site = site(dir.path(), Algorithm::Ed25519, ArtifactMode::Sign);
    let app = create_router(site.api_state().unwrap());

    let (status, body) = get(app.clone(), "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = get(app, "/api/openapi.json").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/firmware/publickey"].is_object());
}
