//! `POST /payments/relay`: pass payment events through to the payment
//! webhook. Callable from any origin; `OPTIONS` answers CORS preflights.

use axum::{
  Router,
  body::Body,
  extract::State,
  http::{Method, StatusCode, header},
  response::{IntoResponse, Response},
  routing::post,
};
use fianza_core::store::IntakeStore;
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};

use crate::{AppState, error::ApiError, extract::ApiJson};

/// The payment routes with their CORS policy applied.
pub fn router<S>() -> Router<AppState<S>>
where
  S: IntakeStore + 'static,
{
  let cors = CorsLayer::new()
    .allow_origin(Any)
    .allow_methods([Method::POST, Method::OPTIONS])
    .allow_headers(Any);

  Router::new()
    .route("/payments/relay", post(relay::<S>).options(preflight))
    .layer(cors)
}

/// `OPTIONS /payments/relay`
pub async fn preflight() -> StatusCode { StatusCode::NO_CONTENT }

/// `POST /payments/relay`: any JSON body; the downstream status and body are
/// returned unchanged.
pub async fn relay<S>(
  State(state): State<AppState<S>>,
  ApiJson(body): ApiJson<Value>,
) -> Result<Response, ApiError>
where
  S: IntakeStore,
{
  let relayed = state.payments.forward(&body).await?;

  let status = StatusCode::from_u16(relayed.status).unwrap_or(StatusCode::BAD_GATEWAY);
  let mut response = (status, Body::from(relayed.body)).into_response();
  if let Some(ct) = relayed.content_type.and_then(|ct| ct.parse().ok()) {
    response.headers_mut().insert(header::CONTENT_TYPE, ct);
  }
  Ok(response)
}
