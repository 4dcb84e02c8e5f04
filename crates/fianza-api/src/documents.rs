//! Handlers for `/documents` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/documents/{id}/process` | Staff. Runs OCR over the stored file |

use axum::{
  Json,
  extract::{Path, State},
};
use fianza_core::store::IntakeStore;
use fianza_relay::ocr::{Extraction, infer_mime_type};
use serde::Serialize;
use uuid::Uuid;

use crate::{AppState, auth::Staff, error::ApiError};

/// Result of an OCR run. `no_text` distinguishes an empty read from a failure,
/// which is reported as an error status instead.
#[derive(Debug, Serialize)]
pub struct ProcessedBody {
  pub document_id: Uuid,
  pub mime_type:   &'static str,
  pub text:        Option<String>,
  pub no_text:     bool,
}

/// `POST /documents/{id}/process`
pub async fn process<S>(
  _staff: Staff,
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<ProcessedBody>, ApiError>
where
  S: IntakeStore,
{
  let ocr = state
    .ocr
    .clone()
    .ok_or_else(|| ApiError::NotConfigured("OCR is not configured".into()))?;

  let document = state
    .store
    .get_document(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("document {id} not found")))?;

  let bytes = state.storage.fetch(&document.url).await?;
  let mime_type = infer_mime_type(&document.url);
  let extraction = ocr.extract(&bytes, mime_type).await?;

  tracing::info!(
    document_id = %id,
    mime_type,
    found_text = matches!(extraction, Extraction::Text(_)),
    "document processed"
  );

  let (text, no_text) = match extraction {
    Extraction::Text(t) => (Some(t), false),
    Extraction::NoText => (None, true),
  };
  Ok(Json(ProcessedBody { document_id: id, mime_type, text, no_text }))
}
