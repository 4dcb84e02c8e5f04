//! Handlers for `/conversations` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/conversations` | Body: `{"applicant_id", "remote_jid"? , "phone"?}` |
//! | `POST` | `/conversations/{id}/state` | Body: `{"state", "last_message_id"?}`; reported by the automation platform |

use axum::{
  Json,
  extract::{Path, State},
};
use chrono::{DateTime, Utc};
use fianza_core::{
  applicant::normalize_phone,
  conversation::{Channel, Conversation, ConversationState, remote_jid_for_phone},
  store::IntakeStore,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, error::ApiError, extract::ApiJson};

/// What callers get back after an upsert.
#[derive(Debug, Serialize)]
pub struct ConversationSummary {
  pub conversation_id: Uuid,
  pub applicant_id:    Uuid,
  pub remote_jid:      String,
  pub channel:         Channel,
  pub state:           ConversationState,
  pub updated_at:      DateTime<Utc>,
}

impl From<Conversation> for ConversationSummary {
  fn from(c: Conversation) -> Self {
    Self {
      conversation_id: c.conversation_id,
      applicant_id:    c.applicant_id,
      remote_jid:      c.remote_jid,
      channel:         c.channel,
      state:           c.state,
      updated_at:      c.updated_at,
    }
  }
}

// ─── Upsert ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UpsertBody {
  pub applicant_id: Uuid,
  /// Used as is when present.
  pub remote_jid:   Option<String>,
  /// Otherwise the identifier is derived from this phone number.
  pub phone:        Option<String>,
}

impl UpsertBody {
  fn remote_jid(&self) -> Result<String, ApiError> {
    if let Some(jid) = self.remote_jid.as_deref().map(str::trim).filter(|j| !j.is_empty()) {
      return Ok(jid.to_owned());
    }
    match self.phone.as_deref() {
      Some(phone) => Ok(remote_jid_for_phone(&normalize_phone(phone)?)),
      None => Err(ApiError::BadRequest("remote_jid or phone is required".into())),
    }
  }
}

/// `POST /conversations`
pub async fn upsert<S>(
  State(state): State<AppState<S>>,
  ApiJson(body): ApiJson<UpsertBody>,
) -> Result<Json<ConversationSummary>, ApiError>
where
  S: IntakeStore,
{
  let remote_jid = body.remote_jid()?;
  let conversation = state
    .store
    .upsert_conversation(body.applicant_id, remote_jid)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("applicant {} not found", body.applicant_id)))?;

  tracing::info!(
    conversation_id = %conversation.conversation_id,
    applicant_id = %conversation.applicant_id,
    "conversation upserted"
  );
  Ok(Json(conversation.into()))
}

// ─── State reports ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StateBody {
  pub state:           String,
  pub last_message_id: Option<String>,
}

/// `POST /conversations/{id}/state`
pub async fn report_state<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
  ApiJson(body): ApiJson<StateBody>,
) -> Result<Json<Conversation>, ApiError>
where
  S: IntakeStore,
{
  let new_state: ConversationState = body
    .state
    .trim()
    .parse()
    .map_err(|_| ApiError::BadRequest(format!("unknown conversation state: {:?}", body.state)))?;

  let conversation = state
    .store
    .update_conversation_state(id, new_state, body.last_message_id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("conversation {id} not found")))?;

  tracing::info!(conversation_id = %id, state = new_state.as_ref(), "conversation state reported");
  Ok(Json(conversation))
}
