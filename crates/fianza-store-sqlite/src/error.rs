//! Error type for `fianza-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored enum column held a value this build does not know.
  #[error("unknown {column} value: {value:?}")]
  UnknownVariant { column: &'static str, value: String },
}

impl Error {
  /// Carry an error out of a `tokio_rusqlite` closure.
  pub(crate) fn into_call(self) -> tokio_rusqlite::Error {
    match self {
      Error::Sqlite(e) => tokio_rusqlite::Error::Rusqlite(e),
      other => tokio_rusqlite::Error::Other(Box::new(other)),
    }
  }

  /// Undo [`Error::into_call`] once the closure has returned.
  pub(crate) fn from_call(e: tokio_rusqlite::Error) -> Self {
    match e {
      tokio_rusqlite::Error::Rusqlite(e) => Error::Sqlite(e),
      tokio_rusqlite::Error::Other(boxed) => match boxed.downcast::<Error>() {
        Ok(inner) => *inner,
        Err(boxed) => Error::Database(tokio_rusqlite::Error::Other(boxed)),
      },
      other => Error::Database(other),
    }
  }

  /// Whether this is a UNIQUE constraint failure on `column`
  /// (`table.column`, as SQLite reports it).
  pub(crate) fn is_unique_violation_on(&self, column: &str) -> bool {
    match self {
      Error::Sqlite(rusqlite::Error::SqliteFailure(failure, message)) => {
        failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
          && message.as_deref().is_some_and(|m| m.contains(column))
      }
      _ => false,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
