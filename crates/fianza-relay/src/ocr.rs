//! Text extraction through a cloud OCR API.
//!
//! Two request shapes are supported: a Document AI style processor
//! (`rawDocument` submission, bearer token) and a Vision style annotator
//! (`DOCUMENT_TEXT_DETECTION`, API key). Both are stateless POSTs; the caller
//! fetches the bytes and infers the MIME type.
//!
//! Document AI bearer tokens expire after about an hour. For long-running
//! servers use [`AccessToken::File`] and keep the file fresh from outside,
//! e.g. `gcloud auth print-access-token > token` on a timer; it is re-read on
//! every request.

use std::{path::PathBuf, time::Duration};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::Client;
use serde_json::{Value, json};

use crate::{Error, Result};

/// Default endpoint of the Vision style annotator.
pub const VISION_ENDPOINT: &str = "https://vision.googleapis.com/v1/images:annotate";

/// MIME type assumed when the URL carries no recognised extension.
pub const FALLBACK_MIME_TYPE: &str = "application/pdf";

/// Outcome of a successful OCR call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
  Text(String),
  /// The provider answered, but found nothing to read.
  NoText,
}

impl Extraction {
  fn from_text(text: Option<&str>) -> Self {
    match text.map(str::trim) {
      Some(t) if !t.is_empty() => Self::Text(t.to_owned()),
      _ => Self::NoText,
    }
  }
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
  async fn extract(&self, bytes: &[u8], mime_type: &str) -> Result<Extraction>;
}

/// Infer a MIME type from the extension of the last path segment of `url`.
/// Query strings and fragments are ignored.
pub fn infer_mime_type(url: &str) -> &'static str {
  let path = url.split(['?', '#']).next().unwrap_or_default();
  let segment = path.rsplit('/').next().unwrap_or_default();
  let ext = match segment.rsplit_once('.') {
    Some((_, ext)) => ext.to_ascii_lowercase(),
    None => return FALLBACK_MIME_TYPE,
  };

  match ext.as_str() {
    "png" => "image/png",
    "jpg" | "jpeg" => "image/jpeg",
    "tif" | "tiff" => "image/tiff",
    "gif" => "image/gif",
    "bmp" => "image/bmp",
    "webp" => "image/webp",
    "pdf" => "application/pdf",
    _ => FALLBACK_MIME_TYPE,
  }
}

// ─── Providers ───────────────────────────────────────────────────────────────

/// Where the Document AI bearer token comes from.
#[derive(Debug, Clone)]
pub enum AccessToken {
  /// Used as is until the process restarts.
  Static(String),
  /// Read (and trimmed) on every request.
  File(PathBuf),
}

impl AccessToken {
  async fn resolve(&self) -> Result<String> {
    let token = match self {
      Self::Static(token) => token.trim().to_owned(),
      Self::File(path) => tokio::fs::read_to_string(path).await?.trim().to_owned(),
    };
    if token.is_empty() {
      return Err(Error::NotConfigured("OCR access token"));
    }
    Ok(token)
  }
}

#[derive(Debug, Clone)]
pub enum OcrProvider {
  /// `POST endpoint` with `Authorization: Bearer <access_token>`.
  DocumentAi { endpoint: String, access_token: AccessToken },
  /// `POST endpoint?key=<api_key>`.
  Vision { endpoint: String, api_key: String },
}

/// HTTP client for the configured [`OcrProvider`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct OcrClient {
  client:   Client,
  provider: OcrProvider,
}

impl OcrClient {
  pub fn new(provider: OcrProvider) -> Result<Self> {
    let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
    Ok(Self { client, provider })
  }

  async fn post(&self, req: reqwest::RequestBuilder, body: &Value) -> Result<Value> {
    let resp = req.json(body).send().await?;
    let status = resp.status();
    let payload: Value = resp.json().await.unwrap_or(Value::Null);

    if !status.is_success() {
      return Err(Error::Upstream {
        status:  status.as_u16(),
        message: provider_error_message(&payload)
          .unwrap_or_else(|| status.canonical_reason().unwrap_or("OCR request failed").to_owned()),
      });
    }
    Ok(payload)
  }
}

/// `error.message`, else `error.status`, as both providers report them.
fn provider_error_message(payload: &Value) -> Option<String> {
  let error = payload.get("error")?;
  error
    .get("message")
    .or_else(|| error.get("status"))
    .and_then(Value::as_str)
    .map(str::to_owned)
}

#[async_trait]
impl TextExtractor for OcrClient {
  async fn extract(&self, bytes: &[u8], mime_type: &str) -> Result<Extraction> {
    let content = STANDARD.encode(bytes);

    let extraction = match &self.provider {
      OcrProvider::DocumentAi { endpoint, access_token } => {
        let body = json!({
          "rawDocument": { "content": content, "mimeType": mime_type },
        });
        let token = access_token.resolve().await?;
        let payload = self
          .post(self.client.post(endpoint).bearer_auth(token), &body)
          .await?;
        Extraction::from_text(payload.pointer("/document/text").and_then(Value::as_str))
      }

      OcrProvider::Vision { endpoint, api_key } => {
        let body = json!({
          "requests": [{
            "image": { "content": content },
            "features": [{ "type": "DOCUMENT_TEXT_DETECTION" }],
          }],
        });
        let payload = self
          .post(self.client.post(endpoint).query(&[("key", api_key)]), &body)
          .await?;

        // Vision reports per-image failures inside a 200 response.
        let first = payload.pointer("/responses/0").cloned().unwrap_or(Value::Null);
        if let Some(message) = provider_error_message(&first) {
          return Err(Error::Upstream { status: 200, message });
        }
        Extraction::from_text(first.pointer("/fullTextAnnotation/text").and_then(Value::as_str))
      }
    };

    tracing::debug!(
      mime_type,
      size = bytes.len(),
      found_text = matches!(extraction, Extraction::Text(_)),
      "OCR completed"
    );
    Ok(extraction)
  }
}
