//! Documents uploaded for an applicant. Immutable once recorded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};
use uuid::Uuid;

use crate::{Error, Result};

/// What a stored document shows.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DocumentKind {
  IdFront,
  IdBack,
  Contract,
  Receipt,
  Other,
}

impl DocumentKind {
  /// Parse a caller-supplied kind; unknown values are rejected.
  pub fn parse(raw: &str) -> Result<Self> {
    raw
      .trim()
      .parse()
      .map_err(|_| Error::Validation(format!("unknown document kind: {raw:?}")))
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
  pub document_id:  Uuid,
  pub applicant_id: Uuid,
  pub kind:         DocumentKind,
  /// Where the object store serves the file from.
  pub url:          String,
  pub uploaded_at:  DateTime<Utc>,
}

/// Input to [`crate::store::IntakeStore::add_document`]. `document_id` and
/// `uploaded_at` are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewDocument {
  pub applicant_id: Uuid,
  pub kind:         DocumentKind,
  pub url:          String,
}
