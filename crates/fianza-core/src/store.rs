//! The `IntakeStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `fianza-store-sqlite`).
//! The HTTP layer depends on this abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
  applicant::{Applicant, ApplicantIdentity, DocType},
  conversation::{Conversation, ConversationState},
  document::{Document, DocumentKind, NewDocument},
};

// ─── Registration ────────────────────────────────────────────────────────────

/// A document already uploaded to object storage, to be recorded as part of a
/// registration.
#[derive(Debug, Clone)]
pub struct StoredUpload {
  pub kind: DocumentKind,
  pub url:  String,
}

/// Input to [`IntakeStore::register`].
#[derive(Debug, Clone)]
pub struct Registration {
  /// Id used if, and only if, a new applicant has to be created.
  pub candidate_id: Uuid,
  pub identity:     ApplicantIdentity,
  pub document:     Option<StoredUpload>,
}

/// Everything a registration wrote or touched.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationOutcome {
  pub applicant:    Applicant,
  /// `false` when an existing applicant was matched and merged.
  pub created:      bool,
  pub conversation: Conversation,
  pub document:     Option<Document>,
}

// ─── Dashboard queries ───────────────────────────────────────────────────────

/// Number of applicants per dashboard page.
pub const PAGE_SIZE: usize = 20;

/// Parameters for [`IntakeStore::list_applicants`].
#[derive(Debug, Clone)]
pub struct ApplicantQuery {
  /// Case-insensitive substring over names, phone, document number and request
  /// code; a numeric query also matches the request number exactly.
  pub text:      Option<String>,
  /// 1-based.
  pub page:      usize,
  pub page_size: usize,
}

impl Default for ApplicantQuery {
  fn default() -> Self { Self { text: None, page: 1, page_size: PAGE_SIZE } }
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplicantSummary {
  #[serde(flatten)]
  pub applicant:      Applicant,
  pub document_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplicantPage {
  pub items:       Vec<ApplicantSummary>,
  pub total:       u64,
  pub page:        usize,
  pub total_pages: usize,
}

/// An applicant with everything it owns. Documents are newest first.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicantDetail {
  pub applicant:     Applicant,
  pub documents:     Vec<Document>,
  pub conversations: Vec<Conversation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyCount {
  pub day:   NaiveDate,
  pub count: u64,
}

/// Rows created since a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivityTotals {
  pub applicants:    u64,
  pub documents:     u64,
  pub conversations: u64,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over an intake store backend.
///
/// Writes that reference an applicant return `Ok(None)` when it does not
/// exist, and write nothing in that case.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait IntakeStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Applicants ────────────────────────────────────────────────────────

  /// Find an applicant by phone, or by document when `document` is given and
  /// no phone matches.
  fn find_applicant<'a>(
    &'a self,
    phone_e164: &'a str,
    document: Option<(DocType, &'a str)>,
  ) -> impl Future<Output = Result<Option<Applicant>, Self::Error>> + Send + 'a;

  /// Reconcile the identity with existing applicants, assign request
  /// identifiers if needed, record the optional document, and reset the
  /// applicant's conversation, all in one transaction.
  fn register(
    &self,
    registration: Registration,
  ) -> impl Future<Output = Result<RegistrationOutcome, Self::Error>> + Send + '_;

  fn get_applicant(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Applicant>, Self::Error>> + Send + '_;

  /// Materialise an applicant with its documents and conversations.
  fn get_applicant_detail(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<ApplicantDetail>, Self::Error>> + Send + '_;

  fn list_applicants<'a>(
    &'a self,
    query: &'a ApplicantQuery,
  ) -> impl Future<Output = Result<ApplicantPage, Self::Error>> + Send + 'a;

  // ── Documents ─────────────────────────────────────────────────────────

  fn add_document(
    &self,
    input: NewDocument,
  ) -> impl Future<Output = Result<Option<Document>, Self::Error>> + Send + '_;

  fn get_document(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Document>, Self::Error>> + Send + '_;

  // ── Conversations ─────────────────────────────────────────────────────

  /// Create or reset the conversation keyed by `remote_jid`.
  fn upsert_conversation(
    &self,
    applicant_id: Uuid,
    remote_jid: String,
  ) -> impl Future<Output = Result<Option<Conversation>, Self::Error>> + Send + '_;

  /// Record a state transition reported by the automation platform.
  /// Returns `None` if the conversation does not exist.
  fn update_conversation_state(
    &self,
    conversation_id: Uuid,
    state: ConversationState,
    last_message_id: Option<String>,
  ) -> impl Future<Output = Result<Option<Conversation>, Self::Error>> + Send + '_;

  // ── Statistics ────────────────────────────────────────────────────────

  /// Applicants created per UTC day since `since`, oldest first. Days without
  /// registrations are omitted.
  fn daily_registrations(
    &self,
    since: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<DailyCount>, Self::Error>> + Send + '_;

  fn activity_totals(
    &self,
    since: DateTime<Utc>,
  ) -> impl Future<Output = Result<ActivityTotals, Self::Error>> + Send + '_;
}
