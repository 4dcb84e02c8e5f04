//! Outbound collaborators of the Fianza intake service: object storage, the
//! cloud OCR API, and the automation platform's webhooks.
//!
//! Each relay owns one reusable [`reqwest::Client`]. Nothing here retries;
//! failures surface as [`Error`] and are mapped to HTTP statuses by the API
//! layer.

pub mod error;
pub mod notify;
pub mod ocr;
pub mod storage;

pub use error::{Error, Result};

#[cfg(test)]
mod testing;
