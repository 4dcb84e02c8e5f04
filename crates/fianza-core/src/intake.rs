//! Upload policy shared by every document intake path.

use uuid::Uuid;

use crate::{Error, Result};

/// Largest accepted upload: 7 MiB.
pub const MAX_UPLOAD_BYTES: usize = 7 * 1024 * 1024;

/// Content types accepted for applicant uploads, with the file extension used
/// in storage keys.
pub const ALLOWED_CONTENT_TYPES: &[(&str, &str)] = &[
  ("image/jpeg", "jpg"),
  ("image/png", "png"),
  ("image/webp", "webp"),
];

#[derive(Debug, Clone)]
pub struct IntakePolicy {
  pub max_bytes: usize,
}

impl Default for IntakePolicy {
  fn default() -> Self { Self { max_bytes: MAX_UPLOAD_BYTES } }
}

/// An upload that passed [`IntakePolicy::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedUpload {
  pub content_type: &'static str,
  pub extension:    &'static str,
}

impl IntakePolicy {
  /// Check the declared content type and the payload size.
  ///
  /// Parameters such as `; charset=...` are ignored and the comparison is
  /// case-insensitive.
  pub fn check(&self, content_type: &str, size: usize) -> Result<AcceptedUpload> {
    let essence = content_type
      .split(';')
      .next()
      .unwrap_or_default()
      .trim()
      .to_ascii_lowercase();

    let (content_type, extension) = ALLOWED_CONTENT_TYPES
      .iter()
      .copied()
      .find(|(ct, _)| *ct == essence)
      .ok_or_else(|| Error::UnsupportedMediaType(content_type.to_owned()))?;

    if size == 0 {
      return Err(Error::Validation("uploaded file is empty".into()));
    }
    if size > self.max_bytes {
      return Err(Error::PayloadTooLarge { size, limit: self.max_bytes });
    }

    Ok(AcceptedUpload { content_type, extension })
  }
}

/// Object key for a new upload: namespaced by applicant, unique per call.
pub fn storage_key(applicant_id: Uuid, extension: &str) -> String {
  format!("documents/{applicant_id}/{}.{extension}", Uuid::new_v4())
}
