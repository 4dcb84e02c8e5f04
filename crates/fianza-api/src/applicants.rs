//! Handlers for `/applicants` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/applicants` | Body: [`RegistrationForm`]; 201 created / 200 merged |
//! | `GET`  | `/applicants` | Staff. Optional `?q=<text>&page=<n>` |
//! | `GET`  | `/applicants/{id}` | Staff. 404 if not found |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::{StatusCode, header},
  response::{IntoResponse, Response},
};
use fianza_core::{
  applicant::RegistrationForm,
  store::{
    ApplicantDetail, ApplicantPage, ApplicantQuery, IntakeStore, PAGE_SIZE, Registration,
    RegistrationOutcome,
  },
};
use fianza_relay::notify::RegistrationNotice;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, auth::Staff, error::ApiError, extract::ApiJson};

/// Name of the cookie carrying the session id back to the web client.
pub const SESSION_COOKIE: &str = "agent_session_id";

/// Lifetime of the session cookie: seven days.
pub const SESSION_COOKIE_MAX_AGE: u64 = 7 * 24 * 60 * 60;

// ─── Register ─────────────────────────────────────────────────────────────────

/// Response body of every registration endpoint.
#[derive(Debug, Serialize)]
pub struct RegisteredBody {
  pub applicant_id: Uuid,
  pub request_no:   Option<i64>,
  pub request_code: Option<String>,
  pub session_id:   Uuid,
  pub created:      bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub document_id:  Option<Uuid>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub document_url: Option<String>,
}

fn session_cookie(session_id: Uuid) -> String {
  format!(
    "{SESSION_COOKIE}={session_id}; Path=/; Max-Age={SESSION_COOKIE_MAX_AGE}; HttpOnly; Secure; SameSite=Lax"
  )
}

/// Notify the automation platform and build the registration response.
///
/// The notice runs detached; its outcome never reaches the caller.
pub(crate) fn registered<S>(state: &AppState<S>, outcome: RegistrationOutcome) -> Response {
  state.notifier.dispatch(RegistrationNotice::from_outcome(&outcome));

  let status = if outcome.created { StatusCode::CREATED } else { StatusCode::OK };
  let session_id = outcome.conversation.conversation_id;
  let body = RegisteredBody {
    applicant_id: outcome.applicant.applicant_id,
    request_no:   outcome.applicant.request_no,
    request_code: outcome.applicant.request_code,
    session_id,
    created:      outcome.created,
    document_id:  outcome.document.as_ref().map(|d| d.document_id),
    document_url: outcome.document.map(|d| d.url),
  };

  (status, [(header::SET_COOKIE, session_cookie(session_id))], Json(body)).into_response()
}

/// `POST /applicants`: body: [`RegistrationForm`]
pub async fn register<S>(
  State(state): State<AppState<S>>,
  ApiJson(form): ApiJson<RegistrationForm>,
) -> Result<Response, ApiError>
where
  S: IntakeStore,
{
  let identity = form.validate()?;
  let outcome = state
    .store
    .register(Registration { candidate_id: Uuid::new_v4(), identity, document: None })
    .await
    .map_err(ApiError::store)?;

  Ok(registered(&state, outcome))
}

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  /// Free-text search over names, phone, document number and request code.
  pub q:    Option<String>,
  /// 1-based page number. Defaults to 1.
  pub page: Option<usize>,
}

/// `GET /applicants[?q=<text>][&page=<n>]`
pub async fn list<S>(
  _staff: Staff,
  State(state): State<AppState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<ApplicantPage>, ApiError>
where
  S: IntakeStore,
{
  let query = ApplicantQuery {
    text:      params.q,
    page:      params.page.unwrap_or(1).max(1),
    page_size: PAGE_SIZE,
  };
  let page = state
    .store
    .list_applicants(&query)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(page))
}

// ─── Detail ───────────────────────────────────────────────────────────────────

/// `GET /applicants/{id}`
pub async fn detail<S>(
  _staff: Staff,
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<ApplicantDetail>, ApiError>
where
  S: IntakeStore,
{
  let detail = state
    .store
    .get_applicant_detail(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("applicant {id} not found")))?;
  Ok(Json(detail))
}
