use std::sync::Arc;

use axum::Json;
use axum::extract::{Multipart, State};
use axum::response::IntoResponse;
use tracing::info;

use crate::error::AppError;
use crate::pdp::Upload;
use crate::service::form::{UploadForm, split_keywords};
use crate::store::model::{NewGenome, NewPaper, NewRecord, NewSpectrum};
use crate::utils::state::AppState;

fn required(form: &UploadForm, names: &[&str]) -> Result<(), AppError> {
    if names.iter().all(|name| form.field(name).is_some()) {
        return Ok(());
    }
    Err(AppError::BadRequest(format!("{} are required", names.join(" and "))))
}

/// POST /api/pdp
pub async fn full_flow_handler(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut form = UploadForm::read(multipart).await?;
    let file = form.take_file()?;
    let service = form.service();
    info!("Full flow for {} on {}", file.filename, service.url);

    let mut content: &[u8] = &file.bytes;
    let outcome = state
        .coordinator
        .run_full_flow(
            &service,
            form.field("recordkeeper").unwrap_or_default(),
            Upload {
                display_name: &file.filename,
                stream: &mut content,
            },
            &state.shutdown.child_token(),
        )
        .await?;
    Ok(Json(outcome))
}

/// POST /api/proofset/upload-and-add-root
pub async fn bind_flow_handler(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut form = UploadForm::read(multipart).await?;
    let proof_set_id = form
        .owned("proofSetID")
        .ok_or_else(|| AppError::BadRequest("proofSetID is required".to_string()))?;
    let file = form.take_file()?;
    info!("{} -> proof set {}", file.filename, proof_set_id);

    let mut content: &[u8] = &file.bytes;
    let outcome = state
        .coordinator
        .run_bind_flow(
            &form.service(),
            &proof_set_id,
            Upload {
                display_name: &file.filename,
                stream: &mut content,
            },
            &state.shutdown.child_token(),
        )
        .await?;
    Ok(Json(outcome))
}

/// POST /api/upload/paper
pub async fn paper_handler(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let form = UploadForm::read(multipart).await?;
    required(&form, &["proofSetID", "title"])?;
    let record = NewRecord::Paper(NewPaper {
        title: form.owned("title").unwrap_or_default(),
        journal: form.owned("journal"),
        year: form.field("year").and_then(|y| y.parse().ok()),
        keywords: split_keywords(form.field("keywords")),
    });
    typed_flow(&state, form, record).await
}

/// POST /api/upload/genome
pub async fn genome_handler(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let form = UploadForm::read(multipart).await?;
    required(&form, &["proofSetID", "organism"])?;
    let record = NewRecord::Genome(NewGenome {
        organism: form.owned("organism").unwrap_or_default(),
        assembly_version: form.owned("assemblyVersion"),
        notes: form.owned("notes"),
    });
    typed_flow(&state, form, record).await
}

/// POST /api/upload/spectrum
pub async fn spectrum_handler(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let form = UploadForm::read(multipart).await?;
    required(&form, &["proofSetID", "compound"])?;
    let metadata = form
        .field("metadata")
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .map_err(|_| AppError::BadRequest("Invalid JSON metadata".to_string()))?;
    let record = NewRecord::Spectrum(NewSpectrum {
        compound: form.owned("compound").unwrap_or_default(),
        technique: form.owned("technique"),
        metadata,
    });
    typed_flow(&state, form, record).await
}

async fn typed_flow(
    state: &AppState,
    mut form: UploadForm,
    record: NewRecord,
) -> Result<Json<crate::pdp::TypedOutcome>, AppError> {
    let file = form.take_file()?;
    let proof_set_id = form.owned("proofSetID").unwrap_or_default();
    info!(
        "{} {} -> proof set {}",
        record.kind().table(),
        file.filename,
        proof_set_id
    );

    let mut content: &[u8] = &file.bytes;
    let outcome = state
        .coordinator
        .run_typed_flow(
            &form.service(),
            &proof_set_id,
            Upload {
                display_name: &file.filename,
                stream: &mut content,
            },
            record,
            &state.shutdown.child_token(),
        )
        .await?;
    Ok(Json(outcome))
}
