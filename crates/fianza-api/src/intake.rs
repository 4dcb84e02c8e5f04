//! Multipart document intake.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/applicants/intake` | Registration fields + `kind` (default `id_front`) + `file` |
//! | `POST` | `/applicants/{id}/documents` | `kind` + `file`; 201 + stored document |
//!
//! The file is checked against the [`IntakePolicy`](fianza_core::intake::IntakePolicy)
//! and uploaded before any row is written, so a rejected or failed upload
//! leaves the store untouched.

use axum::{
  Json,
  extract::{
    Multipart, Path, State,
    multipart::{Field, MultipartError},
  },
  http::StatusCode,
  response::{IntoResponse, Response},
};
use bytes::Bytes;
use fianza_core::{
  applicant::RegistrationForm,
  document::{DocumentKind, NewDocument},
  intake::storage_key,
  store::{IntakeStore, Registration, StoredUpload},
};
use uuid::Uuid;

use crate::{AppState, applicants::registered, error::ApiError};

// ─── Form parsing ─────────────────────────────────────────────────────────────

/// The file part of a multipart body.
#[derive(Debug)]
pub struct UploadedFile {
  pub content_type: String,
  pub bytes:        Bytes,
}

/// Every recognised part of an intake form. Unknown parts are ignored.
#[derive(Debug, Default)]
pub struct IntakeForm {
  pub registration: RegistrationForm,
  pub kind:         Option<String>,
  pub file:         Option<UploadedFile>,
}

fn multipart_error(e: MultipartError) -> ApiError {
  if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
    ApiError::PayloadTooLarge(e.body_text())
  } else {
    ApiError::BadRequest(e.body_text())
  }
}

async fn text(field: Field<'_>) -> Result<Option<String>, ApiError> {
  Ok(Some(field.text().await.map_err(multipart_error)?))
}

/// Drain `multipart` into an [`IntakeForm`].
pub async fn read_form(mut multipart: Multipart) -> Result<IntakeForm, ApiError> {
  let mut form = IntakeForm::default();

  while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
    let name = field.name().unwrap_or_default().to_owned();
    match name.as_str() {
      "first_name" => form.registration.first_name = text(field).await?,
      "last_name" => form.registration.last_name = text(field).await?,
      "phone" | "phone_e164" => form.registration.phone = text(field).await?,
      "role" => form.registration.role = text(field).await?,
      "doc_type" => form.registration.doc_type = text(field).await?,
      "doc_number" => form.registration.doc_number = text(field).await?,
      "kind" => form.kind = text(field).await?,
      "file" => {
        let content_type = field
          .content_type()
          .unwrap_or("application/octet-stream")
          .to_owned();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        form.file = Some(UploadedFile { content_type, bytes });
      }
      other => tracing::debug!(field = other, "ignoring unknown multipart field"),
    }
  }

  Ok(form)
}

/// Check `file` against the policy and upload it under `applicant_id`.
/// Returns the object URL.
async fn store_file<S>(
  state: &AppState<S>,
  applicant_id: Uuid,
  file: UploadedFile,
) -> Result<String, ApiError> {
  let accepted = state.intake.check(&file.content_type, file.bytes.len())?;
  let key = storage_key(applicant_id, accepted.extension);
  let size = file.bytes.len();

  let url = state
    .storage
    .upload(&key, file.bytes, accepted.content_type)
    .await?;

  tracing::info!(%applicant_id, key = %key, size, "document uploaded");
  Ok(url)
}

fn parse_kind(raw: Option<&str>, default: Option<DocumentKind>) -> Result<DocumentKind, ApiError> {
  match (raw.map(str::trim).filter(|s| !s.is_empty()), default) {
    (Some(raw), _) => Ok(DocumentKind::parse(raw)?),
    (None, Some(kind)) => Ok(kind),
    (None, None) => Err(ApiError::BadRequest("missing field: kind".into())),
  }
}

// ─── Register with document ──────────────────────────────────────────────────

/// `POST /applicants/intake`
pub async fn register_with_document<S>(
  State(state): State<AppState<S>>,
  multipart: Multipart,
) -> Result<Response, ApiError>
where
  S: IntakeStore,
{
  let form = read_form(multipart).await?;
  let identity = form.registration.validate()?;
  let kind = parse_kind(form.kind.as_deref(), Some(DocumentKind::IdFront))?;
  let file = form
    .file
    .ok_or_else(|| ApiError::BadRequest("missing field: file".into()))?;

  // Reject before the lookup so a bad file costs no round trip.
  state.intake.check(&file.content_type, file.bytes.len())?;

  let applicant_id = {
    let document = identity.document.as_ref().map(|(t, n)| (*t, n.as_str()));
    state
      .store
      .find_applicant(&identity.phone_e164, document)
      .await
      .map_err(ApiError::store)?
      .map_or_else(Uuid::new_v4, |a| a.applicant_id)
  };

  let url = store_file(&state, applicant_id, file).await?;

  let outcome = state
    .store
    .register(Registration {
      candidate_id: applicant_id,
      identity,
      document: Some(StoredUpload { kind, url }),
    })
    .await
    .map_err(ApiError::store)?;

  Ok(registered(&state, outcome))
}

// ─── Upload to an existing applicant ──────────────────────────────────────────

/// `POST /applicants/{id}/documents`
pub async fn upload_document<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
  multipart: Multipart,
) -> Result<Response, ApiError>
where
  S: IntakeStore,
{
  let form = read_form(multipart).await?;
  let kind = parse_kind(form.kind.as_deref(), None)?;
  let file = form
    .file
    .ok_or_else(|| ApiError::BadRequest("missing field: file".into()))?;

  let not_found = || ApiError::NotFound(format!("applicant {id} not found"));

  state
    .store
    .get_applicant(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(not_found)?;

  let url = store_file(&state, id, file).await?;

  let document = state
    .store
    .add_document(NewDocument { applicant_id: id, kind, url })
    .await
    .map_err(ApiError::store)?
    .ok_or_else(not_found)?;

  Ok((StatusCode::CREATED, Json(document)).into_response())
}
