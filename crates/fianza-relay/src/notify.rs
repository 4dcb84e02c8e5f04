//! Webhooks of the automation platform.
//!
//! [`Notifier`] tells the platform that an applicant registered so it can
//! start the messaging flow. It is fire-and-forget: the request runs on its
//! own task with a bounded timeout and failures are only logged.
//!
//! [`WebhookRelay`] forwards arbitrary JSON (payment events) and hands the
//! downstream answer back verbatim.

use std::time::Duration;

use bytes::Bytes;
use reqwest::{Client, header::CONTENT_TYPE};
use serde::Serialize;
use tokio::task::JoinHandle;
use uuid::Uuid;

use fianza_core::{
  applicant::{DocType, Role},
  conversation::Channel,
  store::RegistrationOutcome,
};

use crate::{Error, Result, storage::upstream_error};

/// Timeout applied to registration notices unless configured otherwise.
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(8);

// ─── Registration notices ────────────────────────────────────────────────────

/// Body of the registration webhook.
///
/// Field names and values follow the automation flow's existing contract
/// (`nombres`, `telefono`, legacy document codes, ...), not this crate's
/// internal vocabulary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationNotice {
  pub session_id:   Uuid,
  pub applicant_id: Uuid,
  pub request_code: Option<String>,
  #[serde(rename = "nombres")]
  pub first_name:   Option<String>,
  #[serde(rename = "apellidos")]
  pub last_name:    Option<String>,
  /// E.164 with the leading `+`.
  #[serde(rename = "telefono")]
  pub phone_e164:   String,
  /// Always `"registrado"`.
  #[serde(rename = "estado")]
  pub state:        &'static str,
  /// `CC`, `CE` or `PA`.
  pub doc_type:     Option<&'static str>,
  pub doc_number:   Option<String>,
  /// `Inquilino` or `DeudorSolidario`.
  #[serde(rename = "rol")]
  pub role:         Option<&'static str>,
  pub channel:      Channel,
}

/// Short document code the automation flow expects.
fn doc_code(doc_type: DocType) -> &'static str {
  match doc_type {
    DocType::NationalId => "CC",
    DocType::ForeignResidentId => "CE",
    DocType::Passport => "PA",
  }
}

fn role_label(role: Role) -> &'static str {
  match role {
    Role::PrimaryTenant => "Inquilino",
    Role::CoSigner => "DeudorSolidario",
  }
}

impl RegistrationNotice {
  pub fn from_outcome(outcome: &RegistrationOutcome) -> Self {
    let a = &outcome.applicant;
    Self {
      session_id:   outcome.conversation.conversation_id,
      applicant_id: a.applicant_id,
      request_code: a.request_code.clone(),
      first_name:   a.first_name.clone(),
      last_name:    a.last_name.clone(),
      phone_e164:   a.phone_e164.clone(),
      state:        "registrado",
      doc_type:     a.doc_type.map(doc_code),
      doc_number:   a.doc_number.clone(),
      role:         a.role.map(role_label),
      channel:      outcome.conversation.channel,
    }
  }
}

/// Posts [`RegistrationNotice`]s to the automation webhook. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Notifier {
  client:      Client,
  webhook_url: Option<String>,
}

impl Notifier {
  /// A notifier for `webhook_url`; `None` makes every dispatch a no-op.
  pub fn new(webhook_url: Option<String>, timeout: Duration) -> Result<Self> {
    let client = Client::builder().timeout(timeout).build()?;
    Ok(Self { client, webhook_url })
  }

  pub fn disabled() -> Result<Self> { Self::new(None, DEFAULT_NOTIFY_TIMEOUT) }

  pub fn is_enabled(&self) -> bool { self.webhook_url.is_some() }

  /// POST the notice and wait for the answer.
  pub async fn send(&self, notice: &RegistrationNotice) -> Result<()> {
    let url = self
      .webhook_url
      .as_deref()
      .ok_or(Error::NotConfigured("notification webhook"))?;

    let resp = self.client.post(url).json(notice).send().await?;
    if !resp.status().is_success() {
      return Err(upstream_error(resp).await);
    }
    Ok(())
  }

  /// Send `notice` on a detached task. Returns `None` when no webhook is
  /// configured. The handle may be dropped; the task keeps running.
  pub fn dispatch(&self, notice: RegistrationNotice) -> Option<JoinHandle<()>> {
    if !self.is_enabled() {
      return None;
    }

    let notifier = self.clone();
    Some(tokio::spawn(async move {
      match notifier.send(&notice).await {
        Ok(()) => tracing::debug!(applicant_id = %notice.applicant_id, "registration notice delivered"),
        Err(e) => tracing::warn!(
          applicant_id = %notice.applicant_id,
          error = %e,
          "registration notice failed"
        ),
      }
    }))
  }
}

// ─── Pass-through relay ──────────────────────────────────────────────────────

/// A downstream answer, passed back to the caller unchanged.
#[derive(Debug, Clone)]
pub struct Relayed {
  pub status:       u16,
  pub content_type: Option<String>,
  pub body:         Bytes,
}

/// Forwards JSON bodies to a fixed webhook. Cheap to clone.
#[derive(Debug, Clone)]
pub struct WebhookRelay {
  client: Client,
  url:    Option<String>,
  name:   &'static str,
}

impl WebhookRelay {
  pub fn new(name: &'static str, url: Option<String>) -> Result<Self> {
    let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
    Ok(Self { client, url, name })
  }

  /// Forward `body`. Any HTTP answer is `Ok`, whatever its status; only a
  /// missing URL or a transport failure is an error.
  pub async fn forward(&self, body: &serde_json::Value) -> Result<Relayed> {
    let url = self.url.as_deref().ok_or(Error::NotConfigured(self.name))?;

    let resp = self.client.post(url).json(body).send().await?;
    let status = resp.status().as_u16();
    let content_type = resp
      .headers()
      .get(CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .map(str::to_owned);
    let body = resp.bytes().await?;

    tracing::info!(relay = self.name, status, "webhook relayed");
    Ok(Relayed { status, content_type, body })
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use axum::{Json, Router, http::StatusCode, routing::post};
  use chrono::Utc;
  use fianza_core::{
    applicant::Applicant,
    conversation::Conversation,
  };
  use serde_json::{Value, json};
  use tokio::sync::Mutex;

  use super::*;
  use crate::testing::{serve, unreachable_url};

  fn outcome() -> RegistrationOutcome {
    let applicant_id = Uuid::new_v4();
    let mut applicant = Applicant {
      applicant_id,
      request_no: None,
      request_code: None,
      first_name: Some("Ana".into()),
      last_name: Some("Gómez".into()),
      phone_e164: "+573001234567".into(),
      doc_type: Some(DocType::NationalId),
      doc_number: Some("12345678".into()),
      role: Some(Role::CoSigner),
      created_at: Utc::now(),
    };
    applicant.assign_request_no(7);
    RegistrationOutcome {
      conversation: Conversation::registered(applicant_id, "573001234567@s.whatsapp.net".into()),
      applicant,
      created: true,
      document: None,
    }
  }

  #[test]
  fn notice_carries_registration_fields() {
    let out = outcome();
    let body = serde_json::to_value(RegistrationNotice::from_outcome(&out)).unwrap();
    assert_eq!(body["sessionId"], json!(out.conversation.conversation_id));
    assert_eq!(body["applicantId"], json!(out.applicant.applicant_id));
    assert_eq!(body["requestCode"], "SOL-000007");
    assert_eq!(body["nombres"], "Ana");
    assert_eq!(body["apellidos"], "Gómez");
    assert_eq!(body["telefono"], "+573001234567");
    assert_eq!(body["estado"], "registrado");
    assert_eq!(body["docType"], "CC");
    assert_eq!(body["docNumber"], "12345678");
    assert_eq!(body["rol"], "DeudorSolidario");
    assert_eq!(body["channel"], "web");
  }

  #[tokio::test]
  async fn dispatch_delivers_in_background() {
    let seen = Arc::new(Mutex::new(None::<Value>));
    let sink = seen.clone();
    let base = serve(Router::new().route(
      "/hook",
      post(move |Json(body): Json<Value>| {
        let sink = sink.clone();
        async move {
          *sink.lock().await = Some(body);
          StatusCode::OK
        }
      }),
    ))
    .await;

    let notifier = Notifier::new(Some(format!("{base}/hook")), DEFAULT_NOTIFY_TIMEOUT).unwrap();
    notifier
      .dispatch(RegistrationNotice::from_outcome(&outcome()))
      .unwrap()
      .await
      .unwrap();

    let body = seen.lock().await.clone().unwrap();
    assert_eq!(body["telefono"], "+573001234567");
  }

  #[tokio::test]
  async fn unreachable_webhook_is_swallowed() {
    let notifier =
      Notifier::new(Some(unreachable_url().await), Duration::from_millis(500)).unwrap();

    let notice = RegistrationNotice::from_outcome(&outcome());
    assert!(notifier.send(&notice).await.is_err());
    // The detached task finishes without panicking.
    notifier.dispatch(notice).unwrap().await.unwrap();
  }

  #[tokio::test]
  async fn disabled_notifier_is_a_noop() {
    let notifier = Notifier::disabled().unwrap();
    assert!(notifier.dispatch(RegistrationNotice::from_outcome(&outcome())).is_none());
  }

  #[tokio::test]
  async fn relay_passes_status_and_body_through() {
    let base = serve(Router::new().route(
      "/pay",
      post(|Json(body): Json<Value>| async move {
        (StatusCode::ACCEPTED, Json(json!({ "echo": body["amount"] })))
      }),
    ))
    .await;

    let relay = WebhookRelay::new("payment webhook", Some(format!("{base}/pay"))).unwrap();
    let out = relay.forward(&json!({ "amount": 100 })).await.unwrap();
    assert_eq!(out.status, 202);
    assert_eq!(out.content_type.as_deref(), Some("application/json"));
    assert_eq!(serde_json::from_slice::<Value>(&out.body).unwrap(), json!({ "echo": 100 }));
  }

  #[tokio::test]
  async fn relay_without_url_is_not_configured() {
    let relay = WebhookRelay::new("payment webhook", None).unwrap();
    assert!(matches!(
      relay.forward(&json!({})).await,
      Err(Error::NotConfigured("payment webhook"))
    ));
  }
}
