//! Request/response DTOs and handlers for the five entry points named in
//! §4.8 of the specification, plus the teacher's own `/health`.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use semver::Version;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::router::AppState;
use crate::artifact::Artifact;
use crate::error::{AfasError, Result};
use crate::firmware::models::{FirmwareFilter, OriginalFirmwareRecord};
use crate::host::models::HostInfo;
use crate::report::{AnalyzeResult, JobId, ReportFilter};

pub async fn health_handler() -> impl IntoResponse {
    StatusCode::OK
}

/// Request header carrying the transport-authenticated hostname, the HTTP
/// analogue of the original's TLS client-identity extraction (see
/// `SPEC_FULL.md` Open Questions). Off by default: only consulted when a
/// front-end proxy sets it, and only honored when the caller also asserts
/// `host_info.is_client_host_analyzed`.
const TRUSTED_HOSTNAME_HEADER: &str = "x-trusted-hostname";

#[derive(Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub host_info: Option<HostInfo>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub analyzers: Vec<String>,
}

pub async fn analyze_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResult>> {
    let trusted_hostname = headers
        .get(TRUSTED_HOSTNAME_HEADER)
        .and_then(|v| v.to_str().ok());

    let result = state
        .controller
        .analyze(
            request.host_info,
            trusted_hostname,
            request.artifacts,
            request.analyzers,
        )
        .await?;
    Ok(Json(result))
}

#[derive(Deserialize)]
pub struct SearchFirmwareRequest {
    #[serde(default)]
    pub model_id: Option<i64>,
    #[serde(default)]
    pub version: Option<Version>,
    #[serde(default)]
    pub fetch_content: bool,
}

#[derive(Serialize)]
pub struct FirmwareMatch {
    #[serde(flatten)]
    pub record: OriginalFirmwareRecord,
    pub blob_base64: Option<String>,
}

pub async fn search_firmware_handler(
    State(state): State<AppState>,
    Json(request): Json<SearchFirmwareRequest>,
) -> Result<Json<Vec<FirmwareMatch>>> {
    let filter = FirmwareFilter {
        model_id: request.model_id,
        version: request.version,
    };
    let matches = state
        .controller
        .search_firmware(&filter, request.fetch_content)
        .await?;
    let out = matches
        .into_iter()
        .map(|(record, blob)| FirmwareMatch {
            record,
            blob_base64: blob.map(|b| STANDARD.encode(b)),
        })
        .collect();
    Ok(Json(out))
}

#[derive(Deserialize)]
pub struct SearchReportRequest {
    #[serde(default)]
    pub job_id: Option<Uuid>,
    #[serde(default)]
    pub asset_id: Option<i64>,
    #[serde(default = "default_report_limit")]
    pub limit: usize,
}

fn default_report_limit() -> usize {
    20
}

pub async fn search_report_handler(
    State(state): State<AppState>,
    Json(request): Json<SearchReportRequest>,
) -> Result<Json<Vec<AnalyzeResult>>> {
    let filter = ReportFilter {
        job_id: request.job_id.map(JobId),
        asset_id: request.asset_id,
    };
    let results = state.controller.search_report(&filter, request.limit).await?;
    Ok(Json(results))
}

#[derive(Deserialize)]
pub struct ReportHostConfigurationRequest {
    #[serde(default)]
    pub measurements_base64: Vec<String>,
}

#[derive(Serialize)]
pub struct Pcr0Response {
    pub pcr0_sha1_hex: String,
    pub pcr0_sha256_hex: String,
}

pub async fn report_host_configuration_handler(
    State(state): State<AppState>,
    Json(request): Json<ReportHostConfigurationRequest>,
) -> Result<Json<Pcr0Response>> {
    let measurements = request
        .measurements_base64
        .iter()
        .map(|m| {
            STANDARD
                .decode(m)
                .map_err(|e| AfasError::InvalidArgument(format!("invalid base64 measurement: {e}")))
        })
        .collect::<Result<Vec<Vec<u8>>>>()?;

    let digests = state
        .controller
        .report_host_configuration(&measurements)
        .await?;

    Ok(Json(Pcr0Response {
        pcr0_sha1_hex: hex_encode(&digests.sha1),
        pcr0_sha256_hex: hex_encode(&digests.sha256),
    }))
}

#[derive(Deserialize)]
pub struct CheckFirmwareVersionRequest {
    pub model_id: i64,
    pub versions: Vec<String>,
}

#[derive(Serialize)]
pub struct VersionExistence {
    pub version: String,
    pub exists: bool,
}

pub async fn check_firmware_version_handler(
    State(state): State<AppState>,
    Json(request): Json<CheckFirmwareVersionRequest>,
) -> Result<Json<Vec<VersionExistence>>> {
    let versions = request
        .versions
        .iter()
        .map(|v| {
            Version::parse(v)
                .map_err(|e| AfasError::InvalidArgument(format!("invalid version '{v}': {e}")))
        })
        .collect::<Result<Vec<Version>>>()?;

    let results = state
        .controller
        .check_firmware_version(request.model_id, &versions)
        .await?;

    Ok(Json(
        results
            .into_iter()
            .map(|(version, exists)| VersionExistence {
                version: version.to_string(),
                exists,
            })
            .collect(),
    ))
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        s.push_str(&format!("{byte:02x}"));
    }
    s
}
