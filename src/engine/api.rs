//! Firmware Site API Module
//! REST endpoints for version checks, update packages and the vendor public key

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;
use utoipa::{OpenApi, ToSchema};

use crate::engine::crypto::{CryptoError, KeyManager};
use crate::engine::database::{Database, DatabaseError};
use crate::engine::updater::{validate_model, PackageError, UpdatePackager, UpdateResult};

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<Database>,
    pub keys: Arc<KeyManager>,
    pub packager: Arc<UpdatePackager>,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Package(#[from] PackageError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Package(PackageError::InvalidModel(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

/// Vendor public key, SPKI DER in the transport encoding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct KeyResult {
    pub action: String,
    pub algorithm: String,
    pub publickey: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        check_version,
        get_update_package,
        get_public_key,
        health_check,
    ),
    components(schemas(UpdateResult, KeyResult, ErrorResponse, HealthResponse)),
    tags(
        (name = "firmware", description = "Firmware version checks and update packages"),
        (name = "keys", description = "Vendor key distribution"),
    )
)]
pub struct ApiDoc;

pub fn create_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/firmware/update/{model}", get(check_version))
        .route("/firmware/update/package/{model}", get(get_update_package))
        .route("/firmware/publickey", get(get_public_key))
        .route("/api/health", get(health_check))
        .route("/api/openapi.json", get(openapi_document))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn openapi_document() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[utoipa::path(
    get,
    path = "/firmware/update/{model}",
    params(
        ("model" = String, Path, description = "Device model identifier"),
    ),
    responses(
        (status = 200, description = "Current firmware version", body = UpdateResult),
        (status = 400, description = "Invalid model identifier", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    ),
    tag = "firmware"
)]
async fn check_version(
    State(state): State<ApiState>,
    Path(model): Path<String>,
) -> Result<Json<UpdateResult>, ApiError> {
    validate_model(&model)?;
    let result = tokio::task::spawn_blocking(move || -> Result<UpdateResult, ApiError> {
        let record = state.db.current_version(state.packager.firmware_id(), &model)?;
        Ok(state.packager.version_result(&record))
    })
    .await??;
    Ok(Json(result))
}

#[utoipa::path(
    get,
    path = "/firmware/update/package/{model}",
    params(
        ("model" = String, Path, description = "Device model identifier"),
    ),
    responses(
        (status = 200, description = "Protected update manifest", body = UpdateResult),
        (status = 400, description = "Invalid model identifier", body = ErrorResponse),
        (status = 500, description = "Signing, encryption or storage failure", body = ErrorResponse)
    ),
    tag = "firmware"
)]
async fn get_update_package(
    State(state): State<ApiState>,
    Path(model): Path<String>,
) -> Result<Json<UpdateResult>, ApiError> {
    validate_model(&model)?;
    let result = tokio::task::spawn_blocking(move || -> Result<UpdateResult, ApiError> {
        let record = state.db.current_version(state.packager.firmware_id(), &model)?;
        Ok(state.packager.package(&model, record.version, &state.keys)?)
    })
    .await??;
    Ok(Json(result))
}

#[utoipa::path(
    get,
    path = "/firmware/publickey",
    responses(
        (status = 200, description = "Vendor public key", body = KeyResult),
        (status = 500, description = "Keys not initialized", body = ErrorResponse)
    ),
    tag = "keys"
)]
async fn get_public_key(State(state): State<ApiState>) -> Result<Json<KeyResult>, ApiError> {
    let der = state.keys.public_key_der()?;
    Ok(Json(KeyResult {
        action: "publickey".to_string(),
        algorithm: state.keys.config().algorithm.to_string(),
        publickey: state.packager.encoding().encode(der),
    }))
}
