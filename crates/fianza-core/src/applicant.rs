//! Applicant, the aggregate root of the intake model.
//!
//! An applicant is identified primarily by phone number and secondarily by
//! identity document. Registration input is validated and normalised here,
//! before it ever reaches a store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};
use uuid::Uuid;

use crate::{Error, Result, ids::format_request_code};

// ─── Enumerations ────────────────────────────────────────────────────────────

/// Kind of identity document. The short legacy codes (`CC`, `CE`, `PA`) are
/// accepted on input.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
  #[serde(alias = "CC")]
  #[strum(to_string = "national_id", serialize = "CC")]
  NationalId,
  #[serde(alias = "CE")]
  #[strum(to_string = "foreign_resident_id", serialize = "CE")]
  ForeignResidentId,
  #[serde(alias = "PA")]
  #[strum(to_string = "passport", serialize = "PA")]
  Passport,
}

impl DocType {
  /// National and foreign-resident IDs are purely numeric.
  pub fn is_numeric(self) -> bool { !matches!(self, Self::Passport) }
}

/// The part an applicant plays in the guarantee.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
  PrimaryTenant,
  CoSigner,
}

// ─── Applicant ───────────────────────────────────────────────────────────────

/// A persisted applicant.
///
/// `request_no` and `request_code` are `None` only while a freshly inserted
/// row is waiting for its identifiers; every applicant returned from a
/// registration has both set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Applicant {
  pub applicant_id: Uuid,
  pub request_no:   Option<i64>,
  pub request_code: Option<String>,
  pub first_name:   Option<String>,
  pub last_name:    Option<String>,
  pub phone_e164:   String,
  pub doc_type:     Option<DocType>,
  pub doc_number:   Option<String>,
  pub role:         Option<Role>,
  pub created_at:   DateTime<Utc>,
}

impl Applicant {
  /// A brand-new applicant built from validated input, without identifiers.
  pub fn from_identity(applicant_id: Uuid, identity: &ApplicantIdentity) -> Self {
    let (doc_type, doc_number) = match &identity.document {
      Some((t, n)) => (Some(*t), Some(n.clone())),
      None => (None, None),
    };
    Self {
      applicant_id,
      request_no: None,
      request_code: None,
      first_name: Some(identity.first_name.clone()),
      last_name: Some(identity.last_name.clone()),
      phone_e164: identity.phone_e164.clone(),
      doc_type,
      doc_number,
      role: identity.role,
      created_at: Utc::now(),
    }
  }

  /// Fill every attribute that is still null or blank from `identity`.
  /// Populated attributes, and the phone number, are never touched.
  ///
  /// Returns `true` if anything changed.
  pub fn fill_missing(&mut self, identity: &ApplicantIdentity) -> bool {
    let mut changed = false;

    if is_blank(&self.first_name) {
      self.first_name = Some(identity.first_name.clone());
      changed = true;
    }
    if is_blank(&self.last_name) {
      self.last_name = Some(identity.last_name.clone());
      changed = true;
    }
    if self.role.is_none() && identity.role.is_some() {
      self.role = identity.role;
      changed = true;
    }
    if let Some((doc_type, doc_number)) = &identity.document {
      if self.doc_type.is_none() {
        self.doc_type = Some(*doc_type);
        changed = true;
      }
      if is_blank(&self.doc_number) {
        self.doc_number = Some(doc_number.clone());
        changed = true;
      }
    }

    changed
  }

  /// Assign the request number and its derived code.
  pub fn assign_request_no(&mut self, request_no: i64) {
    self.request_no = Some(request_no);
    self.request_code = Some(format_request_code(request_no));
  }

  pub fn full_name(&self) -> String {
    [self.first_name.as_deref(), self.last_name.as_deref()]
      .into_iter()
      .flatten()
      .filter(|s| !s.is_empty())
      .collect::<Vec<_>>()
      .join(" ")
  }
}

fn is_blank(value: &Option<String>) -> bool {
  value.as_deref().is_none_or(|s| s.trim().is_empty())
}

// ─── Registration input ──────────────────────────────────────────────────────

/// Raw registration fields as submitted by a form, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationForm {
  pub first_name: Option<String>,
  pub last_name:  Option<String>,
  #[serde(alias = "phone_e164")]
  pub phone:      Option<String>,
  pub role:       Option<String>,
  pub doc_type:   Option<String>,
  pub doc_number: Option<String>,
}

/// Validated, normalised identity of a registering applicant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicantIdentity {
  pub first_name: String,
  pub last_name:  String,
  pub phone_e164: String,
  pub role:       Option<Role>,
  /// Secondary matching key; present only when both halves were supplied.
  pub document:   Option<(DocType, String)>,
}

impl RegistrationForm {
  /// Validate and normalise every field.
  pub fn validate(&self) -> Result<ApplicantIdentity> {
    let first_name = required(&self.first_name, "first_name")?;
    let last_name = required(&self.last_name, "last_name")?;
    let phone = required(&self.phone, "phone")?;
    let phone_e164 = normalize_phone(&phone)?;

    let role = optional(&self.role)
      .map(|r| {
        r.parse::<Role>()
          .map_err(|_| Error::validation(format!("unknown role: {r:?}")))
      })
      .transpose()?;

    let document = match (optional(&self.doc_type), optional(&self.doc_number)) {
      (Some(t), Some(n)) => {
        let doc_type = t
          .parse::<DocType>()
          .map_err(|_| Error::validation(format!("unknown document type: {t:?}")))?;
        Some((doc_type, normalize_doc_number(doc_type, &n)?))
      }
      (None, None) => None,
      (Some(_), None) => {
        return Err(Error::validation("doc_number is required with doc_type"));
      }
      (None, Some(_)) => {
        return Err(Error::validation("doc_type is required with doc_number"));
      }
    };

    Ok(ApplicantIdentity { first_name, last_name, phone_e164, role, document })
  }
}

fn optional(value: &Option<String>) -> Option<String> {
  value
    .as_deref()
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(str::to_owned)
}

fn required(value: &Option<String>, field: &str) -> Result<String> {
  optional(value).ok_or_else(|| Error::validation(format!("missing field: {field}")))
}

// ─── Normalisation ───────────────────────────────────────────────────────────

/// Normalise a phone number to E.164: a leading `+` followed by 8–15 digits.
/// Spaces, dashes, dots and parentheses are tolerated as separators.
pub fn normalize_phone(raw: &str) -> Result<String> {
  let rest = raw
    .trim()
    .strip_prefix('+')
    .ok_or_else(|| Error::validation("phone must be in E.164 format (+<country><number>)"))?;

  let mut digits = String::with_capacity(rest.len());
  for c in rest.chars() {
    match c {
      '0'..='9' => digits.push(c),
      ' ' | '-' | '.' | '(' | ')' => {}
      other => {
        return Err(Error::validation(format!(
          "phone contains an invalid character: {other:?}"
        )));
      }
    }
  }

  if !(8..=15).contains(&digits.len()) {
    return Err(Error::validation("phone must have between 8 and 15 digits"));
  }
  Ok(format!("+{digits}"))
}

/// Normalise a document number according to its type.
///
/// Numeric IDs keep only their digits and must have 6–12 of them. Passports
/// drop whitespace, are upper-cased, and must be 6–15 ASCII alphanumerics.
pub fn normalize_doc_number(doc_type: DocType, raw: &str) -> Result<String> {
  if doc_type.is_numeric() {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if !(6..=12).contains(&digits.len()) {
      return Err(Error::validation("document number must have 6-12 digits"));
    }
    Ok(digits)
  } else {
    let compact: String = raw
      .chars()
      .filter(|c| !c.is_whitespace())
      .collect::<String>()
      .to_uppercase();
    if !(6..=15).contains(&compact.len())
      || !compact.chars().all(|c| c.is_ascii_alphanumeric())
    {
      return Err(Error::validation(
        "passport number must be 6-15 alphanumeric characters",
      ));
    }
    Ok(compact)
  }
}
