//! Single-step endpoints that run one `pdptool` subcommand and hand back
//! its raw output.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::error::AppError;
use crate::pdp::ServiceTarget;
use crate::pdp::upload::upload_raw;
use crate::service::form::UploadForm;
use crate::utils::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    pub service_url: String,
    pub service_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProofSetRequest {
    pub service_url: String,
    pub service_name: String,
    pub recordkeeper: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddRootsRequest {
    pub service_url: String,
    pub service_name: String,
    pub root: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusParams {
    #[serde(default)]
    pub service_url: String,
    #[serde(default)]
    pub service_name: String,
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

/// Rejects blank values for fields the tool cannot run without.
fn non_blank(fields: &[(&str, &str)]) -> Result<(), AppError> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();
    match missing.as_slice() {
        [] => Ok(()),
        [name] => Err(AppError::BadRequest(format!("{name} is required"))),
        names => Err(AppError::BadRequest(format!(
            "{} are required",
            names.join(" and ")
        ))),
    }
}

/// POST /api/ping
pub async fn ping_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ServiceRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let req = body(payload)?;
    non_blank(&[
        ("serviceUrl", req.service_url.as_str()),
        ("serviceName", req.service_name.as_str()),
    ])?;
    let service = ServiceTarget::new(req.service_url, req.service_name);
    let output = state
        .backend()
        .ping(&service, &state.shutdown.child_token())
        .await?;
    Ok(Json(json!({ "message": output.text() })))
}

/// POST /api/proof-sets
pub async fn create_proof_set_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateProofSetRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let req = body(payload)?;
    non_blank(&[
        ("serviceUrl", req.service_url.as_str()),
        ("serviceName", req.service_name.as_str()),
        ("recordkeeper", req.recordkeeper.as_str()),
    ])?;
    let service = ServiceTarget::new(req.service_url, req.service_name);
    let output = state
        .backend()
        .create_proof_set(&service, &req.recordkeeper, &state.shutdown.child_token())
        .await?;
    Ok(Json(json!({ "output": output.text() })))
}

/// GET /api/proof-sets/{txHash}/status
pub async fn proof_set_status_handler(
    State(state): State<Arc<AppState>>,
    Path(tx_hash): Path<String>,
    Query(params): Query<StatusParams>,
) -> Result<impl IntoResponse, AppError> {
    let service = ServiceTarget::new(params.service_url, params.service_name);
    let output = state
        .backend()
        .create_status(&service, &tx_hash, &state.shutdown.child_token())
        .await?;
    Ok(Json(json!({ "status": output.text() })))
}

/// POST /api/upload
pub async fn upload_handler(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut form = UploadForm::read(multipart).await?;
    let file = form.take_file()?;
    info!("Upload of {} ({} bytes)", file.filename, file.bytes.len());

    let mut content: &[u8] = &file.bytes;
    let output = upload_raw(
        state.backend(),
        &mut content,
        &form.service(),
        &state.shutdown.child_token(),
    )
    .await?;
    Ok(Json(json!({ "output": output.text() })))
}

/// POST /api/proof-sets/{proofSetId}/roots
pub async fn add_roots_handler(
    State(state): State<Arc<AppState>>,
    Path(proof_set_id): Path<String>,
    payload: Result<Json<AddRootsRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let req = body(payload)?;
    non_blank(&[
        ("serviceUrl", req.service_url.as_str()),
        ("serviceName", req.service_name.as_str()),
        ("root", req.root.as_str()),
    ])?;
    let service = ServiceTarget::new(req.service_url, req.service_name);
    let output = state
        .backend()
        .add_roots(&service, &proof_set_id, &req.root, &state.shutdown.child_token())
        .await?;
    info!("add-roots for proof set {}: {}", proof_set_id, output.trimmed());
    Ok(Json(json!({ "message": output.text() })))
}
