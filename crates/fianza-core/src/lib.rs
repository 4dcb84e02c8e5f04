//! Core types and trait definitions for the Fianza intake service.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it.

pub mod applicant;
pub mod conversation;
pub mod document;
pub mod error;
pub mod ids;
pub mod intake;
pub mod store;

pub use error::{Error, Result};
