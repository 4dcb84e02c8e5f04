//! Human-readable request identifiers and session identifiers.
//!
//! Request numbers are sequential (`MAX + 1` inside the registration
//! transaction). The code is a pure function of the number, so the two can
//! never disagree.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Prefix of every request code.
pub const REQUEST_CODE_PREFIX: &str = "SOL-";

/// Minimum number of digits in a request code; larger numbers render wider.
pub const REQUEST_CODE_WIDTH: usize = 6;

/// How many times a store may try to claim the next sequential number before
/// falling back to [`fallback_request_no`].
pub const MAX_SEQUENCE_ATTEMPTS: usize = 5;

/// Sequential numbers stay below this value; fallback numbers are above it,
/// so a fallback never shifts the sequence.
pub const SEQUENCE_CEILING: i64 = 1_000_000_000;

/// `SOL-000123` for `123`.
pub fn format_request_code(request_no: i64) -> String {
  format!("{REQUEST_CODE_PREFIX}{request_no:0width$}", width = REQUEST_CODE_WIDTH)
}

/// Low-collision request number used when every sequential attempt collided.
pub fn fallback_request_no(now: DateTime<Utc>) -> i64 { now.timestamp_millis() }

/// A fresh opaque session identifier.
pub fn new_session_id() -> Uuid { Uuid::new_v4() }

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn request_code_is_zero_padded() {
    assert_eq!(format_request_code(123), "SOL-000123");
    assert_eq!(format_request_code(1), "SOL-000001");
    assert_eq!(format_request_code(1_234_567), "SOL-1234567");
  }

  #[test]
  fn fallback_is_above_any_realistic_sequence() {
    let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    assert!(fallback_request_no(now) > SEQUENCE_CEILING);
  }
}
