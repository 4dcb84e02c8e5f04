//! Error type for `fianza-relay`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The request never produced a response (connect, timeout, TLS, ...).
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  /// The collaborator answered with a non-success status.
  #[error("upstream returned {status}: {message}")]
  Upstream { status: u16, message: String },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// The relay has no endpoint configured.
  #[error("{0} is not configured")]
  NotConfigured(&'static str),

  #[error("invalid url: {0}")]
  InvalidUrl(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
