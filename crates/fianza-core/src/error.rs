//! Error types for `fianza-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Missing or malformed caller input. The message is safe to show to the
  /// caller verbatim.
  #[error("{0}")]
  Validation(String),

  #[error("unsupported content type: {0:?}")]
  UnsupportedMediaType(String),

  #[error("file of {size} bytes exceeds the {limit} byte limit")]
  PayloadTooLarge { size: usize, limit: usize },
}

impl Error {
  pub(crate) fn validation(msg: impl Into<String>) -> Self {
    Self::Validation(msg.into())
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
