//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("unsupported media type: {0}")]
  UnsupportedMediaType(String),

  #[error("payload too large: {0}")]
  PayloadTooLarge(String),

  #[error("unauthorized")]
  Unauthorized,

  /// A collaborator (object storage, OCR, webhook) failed or was unreachable.
  #[error("upstream error: {0}")]
  Upstream(String),

  /// A required collaborator is not configured. The message is shown as is.
  #[error("not configured: {0}")]
  NotConfigured(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  pub fn store<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
    Self::Store(Box::new(e))
  }
}

impl From<fianza_core::Error> for ApiError {
  fn from(e: fianza_core::Error) -> Self {
    use fianza_core::Error as E;
    match e {
      E::Validation(m) => Self::BadRequest(m),
      e @ E::UnsupportedMediaType(_) => Self::UnsupportedMediaType(e.to_string()),
      e @ E::PayloadTooLarge { .. } => Self::PayloadTooLarge(e.to_string()),
    }
  }
}

impl From<fianza_relay::Error> for ApiError {
  fn from(e: fianza_relay::Error) -> Self {
    match e {
      fianza_relay::Error::NotConfigured(what) => {
        Self::NotConfigured(format!("{what} is not configured"))
      }
      fianza_relay::Error::Upstream { message, .. } => Self::Upstream(message),
      other => Self::Upstream(other.to_string()),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::UnsupportedMediaType(m) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, m.clone()),
      ApiError::PayloadTooLarge(m) => (StatusCode::PAYLOAD_TOO_LARGE, m.clone()),
      ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_owned()),
      ApiError::Upstream(m) => {
        tracing::warn!(error = %m, "upstream failure");
        (StatusCode::BAD_GATEWAY, m.clone())
      }
      ApiError::NotConfigured(m) => (StatusCode::INTERNAL_SERVER_ERROR, m.clone()),
      ApiError::Store(e) => {
        tracing::error!(error = %e, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_owned())
      }
    };

    let mut res = (status, Json(json!({ "error": message }))).into_response();
    if matches!(self, ApiError::Unauthorized) {
      res.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"fianza\""),
      );
    }
    res
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn core_errors_map_to_statuses() {
    let cases = [
      (fianza_core::Error::Validation("x".into()), StatusCode::BAD_REQUEST),
      (fianza_core::Error::UnsupportedMediaType("a/b".into()), StatusCode::UNSUPPORTED_MEDIA_TYPE),
      (fianza_core::Error::PayloadTooLarge { size: 2, limit: 1 }, StatusCode::PAYLOAD_TOO_LARGE),
    ];
    for (err, status) in cases {
      assert_eq!(ApiError::from(err).into_response().status(), status);
    }
  }

  #[test]
  fn relay_errors_map_to_gateway_or_config() {
    let upstream = fianza_relay::Error::Upstream { status: 500, message: "boom".into() };
    assert_eq!(ApiError::from(upstream).into_response().status(), StatusCode::BAD_GATEWAY);

    let missing = fianza_relay::Error::NotConfigured("payment webhook");
    let resp = ApiError::from(missing).into_response();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
  }

  #[test]
  fn unauthorized_challenges_for_basic_auth() {
    let resp = ApiError::Unauthorized.into_response();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));
  }
}
