//! Request extractors whose rejections use the [`ApiError`] body and statuses.

use axum::extract::{FromRequest, rejection::JsonRejection};

use crate::error::ApiError;

/// [`axum::Json`] for request bodies. A malformed body, a missing field or a
/// field of the wrong type is a 400 rather than axum's 422.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self {
    match rejection {
      JsonRejection::MissingJsonContentType(r) => Self::UnsupportedMediaType(r.body_text()),
      other => Self::BadRequest(other.body_text()),
    }
  }
}
