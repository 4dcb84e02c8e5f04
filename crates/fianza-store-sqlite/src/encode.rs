//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings (microsecond
//! precision, `Z` suffix) so that lexical order is chronological. Enums are
//! stored as their snake_case names. UUIDs are stored as hyphenated lowercase
//! strings.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use fianza_core::{
  applicant::Applicant,
  conversation::Conversation,
  document::Document,
  store::DailyCount,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ──────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

/// Decode an enum column through its `FromStr` (strum) implementation.
pub fn decode_variant<T: FromStr>(column: &'static str, s: &str) -> Result<T> {
  s.parse()
    .map_err(|_| Error::UnknownVariant { column, value: s.to_owned() })
}

fn decode_opt_variant<T: FromStr>(
  column: &'static str,
  s: Option<String>,
) -> Result<Option<T>> {
  s.as_deref().map(|v| decode_variant(column, v)).transpose()
}

// ─── Applicants ───────────────────────────────────────────────────────────────

pub const APPLICANT_COLUMNS: &str = "applicant_id, request_no, request_code, \
  first_name, last_name, phone_e164, doc_type, doc_number, role, created_at";

/// Raw values read directly from an `applicants` row.
pub struct RawApplicant {
  pub applicant_id: String,
  pub request_no:   Option<i64>,
  pub request_code: Option<String>,
  pub first_name:   Option<String>,
  pub last_name:    Option<String>,
  pub phone_e164:   String,
  pub doc_type:     Option<String>,
  pub doc_number:   Option<String>,
  pub role:         Option<String>,
  pub created_at:   String,
}

impl RawApplicant {
  /// Read the columns listed in [`APPLICANT_COLUMNS`], in order.
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      applicant_id: row.get(0)?,
      request_no:   row.get(1)?,
      request_code: row.get(2)?,
      first_name:   row.get(3)?,
      last_name:    row.get(4)?,
      phone_e164:   row.get(5)?,
      doc_type:     row.get(6)?,
      doc_number:   row.get(7)?,
      role:         row.get(8)?,
      created_at:   row.get(9)?,
    })
  }

  pub fn into_applicant(self) -> Result<Applicant> {
    Ok(Applicant {
      applicant_id: decode_uuid(&self.applicant_id)?,
      request_no:   self.request_no,
      request_code: self.request_code,
      first_name:   self.first_name,
      last_name:    self.last_name,
      phone_e164:   self.phone_e164,
      doc_type:     decode_opt_variant("doc_type", self.doc_type)?,
      doc_number:   self.doc_number,
      role:         decode_opt_variant("role", self.role)?,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

// ─── Documents ────────────────────────────────────────────────────────────────

pub const DOCUMENT_COLUMNS: &str = "document_id, applicant_id, kind, url, uploaded_at";

pub struct RawDocument {
  pub document_id:  String,
  pub applicant_id: String,
  pub kind:         String,
  pub url:          String,
  pub uploaded_at:  String,
}

impl RawDocument {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      document_id:  row.get(0)?,
      applicant_id: row.get(1)?,
      kind:         row.get(2)?,
      url:          row.get(3)?,
      uploaded_at:  row.get(4)?,
    })
  }

  pub fn into_document(self) -> Result<Document> {
    Ok(Document {
      document_id:  decode_uuid(&self.document_id)?,
      applicant_id: decode_uuid(&self.applicant_id)?,
      kind:         decode_variant("kind", &self.kind)?,
      url:          self.url,
      uploaded_at:  decode_dt(&self.uploaded_at)?,
    })
  }
}

// ─── Conversations ────────────────────────────────────────────────────────────

pub const CONVERSATION_COLUMNS: &str = "conversation_id, applicant_id, remote_jid, \
  channel, state, last_message_id, updated_at";

pub struct RawConversation {
  pub conversation_id: String,
  pub applicant_id:    String,
  pub remote_jid:      String,
  pub channel:         String,
  pub state:           String,
  pub last_message_id: Option<String>,
  pub updated_at:      String,
}

impl RawConversation {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      conversation_id: row.get(0)?,
      applicant_id:    row.get(1)?,
      remote_jid:      row.get(2)?,
      channel:         row.get(3)?,
      state:           row.get(4)?,
      last_message_id: row.get(5)?,
      updated_at:      row.get(6)?,
    })
  }

  pub fn into_conversation(self) -> Result<Conversation> {
    Ok(Conversation {
      conversation_id: decode_uuid(&self.conversation_id)?,
      applicant_id:    decode_uuid(&self.applicant_id)?,
      remote_jid:      self.remote_jid,
      channel:         decode_variant("channel", &self.channel)?,
      state:           decode_variant("state", &self.state)?,
      last_message_id: self.last_message_id,
      updated_at:      decode_dt(&self.updated_at)?,
    })
  }
}

// ─── Statistics ───────────────────────────────────────────────────────────────

/// Decode a `(YYYY-MM-DD, count)` pair from a grouped query.
pub fn decode_daily_count(day: &str, count: i64) -> Result<DailyCount> {
  let day = NaiveDate::parse_from_str(day, "%Y-%m-%d")
    .map_err(|e| Error::DateParse(e.to_string()))?;
  Ok(DailyCount { day, count: count.max(0) as u64 })
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn timestamps_sort_lexically() {
    let a = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
    let b = a + chrono::Duration::milliseconds(1);
    let (ea, eb) = (encode_dt(a), encode_dt(b));
    assert_eq!(ea.len(), eb.len());
    assert!(ea < eb);
    assert_eq!(decode_dt(&ea).unwrap(), a);
  }

  #[test]
  fn unknown_variant_is_reported() {
    let err = decode_variant::<fianza_core::document::DocumentKind>("kind", "selfie")
      .unwrap_err();
    assert!(matches!(err, Error::UnknownVariant { column: "kind", .. }));
  }
}
