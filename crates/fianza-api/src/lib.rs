//! JSON and multipart HTTP API for the Fianza intake service.
//!
//! Exposes an axum [`Router`] backed by any [`IntakeStore`] plus the outbound
//! relays. TLS, request tracing and the listening socket are the caller's
//! responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", fianza_api::api_router(state))
//! ```
//!
//! | Method | Path | Access |
//! |--------|------|--------|
//! | `POST` | `/applicants` | public |
//! | `POST` | `/applicants/intake` | public (multipart) |
//! | `GET`  | `/applicants` | staff |
//! | `GET`  | `/applicants/{id}` | staff |
//! | `POST` | `/applicants/{id}/documents` | public (multipart) |
//! | `POST` | `/conversations` | public |
//! | `POST` | `/conversations/{id}/state` | public |
//! | `POST` | `/documents/{id}/process` | staff |
//! | `POST` | `/qualification` | staff |
//! | `POST`, `OPTIONS` | `/payments/relay` | public, any origin |
//! | `GET`  | `/stats` | staff |

pub mod applicants;
pub mod auth;
pub mod conversations;
pub mod documents;
pub mod error;
pub mod extract;
pub mod intake;
pub mod payments;
pub mod qualification;
pub mod stats;

use std::sync::Arc;

use axum::{
  Router,
  extract::DefaultBodyLimit,
  routing::{get, post},
};
use fianza_core::{intake::IntakePolicy, store::IntakeStore};
use fianza_relay::{
  notify::{Notifier, WebhookRelay},
  ocr::TextExtractor,
  storage::ObjectStorage,
};

pub use auth::StaffAuth;
pub use error::ApiError;

/// Request bodies on multipart routes may exceed the upload ceiling by this
/// much to leave room for the other form fields.
const MULTIPART_BODY_LIMIT: usize = 10 * 1024 * 1024;

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct AppState<S> {
  pub store:    Arc<S>,
  pub storage:  Arc<dyn ObjectStorage>,
  /// `None` disables `/documents/{id}/process`.
  pub ocr:      Option<Arc<dyn TextExtractor>>,
  pub notifier: Notifier,
  pub payments: WebhookRelay,
  /// `None` leaves the staff routes open.
  pub staff:    Option<Arc<StaffAuth>>,
  pub intake:   IntakePolicy,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:    self.store.clone(),
      storage:  self.storage.clone(),
      ocr:      self.ocr.clone(),
      notifier: self.notifier.clone(),
      payments: self.payments.clone(),
      staff:    self.staff.clone(),
      intake:   self.intake.clone(),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: AppState<S>) -> Router<()>
where
  S: IntakeStore + 'static,
{
  let multipart = Router::new()
    .route("/applicants/intake", post(intake::register_with_document::<S>))
    .route("/applicants/{id}/documents", post(intake::upload_document::<S>))
    .layer(DefaultBodyLimit::max(MULTIPART_BODY_LIMIT));

  Router::new()
    // Applicants
    .route(
      "/applicants",
      get(applicants::list::<S>).post(applicants::register::<S>),
    )
    .route("/applicants/{id}", get(applicants::detail::<S>))
    .merge(multipart)
    // Conversations
    .route("/conversations", post(conversations::upsert::<S>))
    .route("/conversations/{id}/state", post(conversations::report_state::<S>))
    // Documents
    .route("/documents/{id}/process", post(documents::process::<S>))
    // Staff actions
    .route("/qualification", post(qualification::trigger::<S>))
    .route("/stats", get(stats::handler::<S>))
    // Payments
    .merge(payments::router::<S>())
    .with_state(state)
}
