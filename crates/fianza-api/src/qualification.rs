//! `POST /qualification`: staff hand-off of an applicant to the qualification
//! flow. Only checks the applicant and issues a fresh session id; the flow
//! itself runs on the automation platform.

use axum::{Json, extract::State};
use fianza_core::{ids::new_session_id, store::IntakeStore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, auth::Staff, error::ApiError, extract::ApiJson};

#[derive(Debug, Deserialize)]
pub struct QualificationBody {
  pub applicant_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QualificationStarted {
  pub session_id:   Uuid,
  pub applicant_id: Uuid,
  pub request_code: Option<String>,
  pub message:      String,
}

/// `POST /qualification`: body: `{"applicant_id":"<uuid>"}`
pub async fn trigger<S>(
  _staff: Staff,
  State(state): State<AppState<S>>,
  ApiJson(body): ApiJson<QualificationBody>,
) -> Result<Json<QualificationStarted>, ApiError>
where
  S: IntakeStore,
{
  let raw = body
    .applicant_id
    .as_deref()
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .ok_or_else(|| ApiError::BadRequest("missing field: applicant_id".into()))?;
  let applicant_id = Uuid::parse_str(raw)
    .map_err(|_| ApiError::BadRequest(format!("invalid applicant_id: {raw:?}")))?;

  let applicant = state
    .store
    .get_applicant(applicant_id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("applicant {applicant_id} not found")))?;

  let session_id = new_session_id();
  tracing::info!(%applicant_id, %session_id, "qualification started");

  let name = applicant.full_name();
  let message = if name.is_empty() {
    "Qualification started".to_owned()
  } else {
    format!("Qualification started for {name}")
  };

  Ok(Json(QualificationStarted {
    session_id,
    applicant_id,
    request_code: applicant.request_code,
    message,
  }))
}
