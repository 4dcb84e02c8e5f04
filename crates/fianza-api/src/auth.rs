//! HTTP Basic-auth extractor guarding the staff routes.

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use fianza_core::store::IntakeStore;

use crate::{AppState, error::ApiError};

/// Staff credentials accepted by this server instance.
#[derive(Clone)]
pub struct StaffAuth {
  pub username:      String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
}

/// Present in a handler means the caller is staff. When no credentials are
/// configured every caller is.
pub struct Staff;

/// Verify Basic credentials from `headers` against `auth`.
pub fn verify_auth(headers: &HeaderMap, auth: &StaffAuth) -> Result<(), ApiError> {
  let header_val = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(ApiError::Unauthorized)?;

  let encoded = header_val
    .strip_prefix("Basic ")
    .ok_or(ApiError::Unauthorized)?;

  let decoded = B64.decode(encoded).map_err(|_| ApiError::Unauthorized)?;
  let creds   = std::str::from_utf8(&decoded).map_err(|_| ApiError::Unauthorized)?;

  let (username, password) = creds.split_once(':').ok_or(ApiError::Unauthorized)?;

  if username != auth.username {
    return Err(ApiError::Unauthorized);
  }

  let parsed_hash = PasswordHash::new(&auth.password_hash)
    .map_err(|_| ApiError::Unauthorized)?;

  Argon2::default()
    .verify_password(password.as_bytes(), &parsed_hash)
    .map_err(|_| ApiError::Unauthorized)?;

  Ok(())
}

impl<S> FromRequestParts<AppState<S>> for Staff
where
  S: IntakeStore + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    if let Some(auth) = &state.staff {
      verify_auth(&parts.headers, auth)?;
    }
    Ok(Staff)
  }
}
