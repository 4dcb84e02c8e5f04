//! Object storage for uploaded documents.
//!
//! The service only needs two operations: put an object under a key and get
//! back a URL, and read an object back given that URL (for OCR). Backends are
//! chosen at startup and shared behind `Arc<dyn ObjectStorage>`.

use std::{
  collections::HashMap,
  path::{Component, Path, PathBuf},
  time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, header::CONTENT_TYPE};
use tokio::sync::RwLock;

use crate::{Error, Result};

#[async_trait]
pub trait ObjectStorage: Send + Sync {
  /// Store `bytes` under `key`, returning the URL the object is served from.
  async fn upload(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<String>;

  /// Read back an object previously returned by [`ObjectStorage::upload`].
  async fn fetch(&self, url: &str) -> Result<Bytes>;
}

fn join_url(base: &str, key: &str) -> String {
  format!("{}/{}", base.trim_end_matches('/'), key.trim_start_matches('/'))
}

/// Turn a non-success response into [`Error::Upstream`], keeping a bounded
/// excerpt of the body as the message.
pub(crate) async fn upstream_error(resp: reqwest::Response) -> Error {
  const MAX_MESSAGE: usize = 512;

  let status = resp.status();
  let body = resp.text().await.unwrap_or_default();
  let message = match body.trim() {
    "" => status.canonical_reason().unwrap_or("request failed").to_owned(),
    text => text.chars().take(MAX_MESSAGE).collect(),
  };
  Error::Upstream { status: status.as_u16(), message }
}

// ─── Local filesystem ────────────────────────────────────────────────────────

/// Writes objects below a directory; URLs are `public_base_url/key`.
#[derive(Debug, Clone)]
pub struct LocalStorage {
  root:            PathBuf,
  public_base_url: String,
}

impl LocalStorage {
  pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
    Self { root: root.into(), public_base_url: public_base_url.into() }
  }

  /// Resolve `key` below the root. Absolute keys and `..` are refused.
  fn path_for(&self, key: &str) -> Result<PathBuf> {
    let relative = Path::new(key);
    if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
      return Err(Error::InvalidUrl(key.to_owned()));
    }
    Ok(self.root.join(relative))
  }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
  async fn upload(&self, key: &str, bytes: Bytes, _content_type: &str) -> Result<String> {
    let path = self.path_for(key)?;
    if let Some(parent) = path.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, &bytes).await?;

    tracing::debug!(path = %path.display(), size = bytes.len(), "stored object on disk");
    Ok(join_url(&self.public_base_url, key))
  }

  async fn fetch(&self, url: &str) -> Result<Bytes> {
    let base = format!("{}/", self.public_base_url.trim_end_matches('/'));
    let key = url
      .strip_prefix(&base)
      .ok_or_else(|| Error::InvalidUrl(url.to_owned()))?;
    let path = self.path_for(key)?;

    match tokio::fs::read(&path).await {
      Ok(bytes) => Ok(Bytes::from(bytes)),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::Upstream {
        status:  404,
        message: format!("object not found: {key}"),
      }),
      Err(e) => Err(e.into()),
    }
  }
}

// ─── HTTP object store ───────────────────────────────────────────────────────

/// Uploads with `PUT upload_base_url/key` and fetches with a plain `GET`.
///
/// Works with any bucket that accepts authenticated PUTs (pre-signed gateways,
/// MinIO behind a proxy, ...). Cheap to clone.
#[derive(Debug, Clone)]
pub struct HttpStorage {
  client:          Client,
  upload_base_url: String,
  public_base_url: String,
  bearer_token:    Option<String>,
}

impl HttpStorage {
  pub fn new(
    upload_base_url: impl Into<String>,
    public_base_url: impl Into<String>,
    bearer_token: Option<String>,
  ) -> Result<Self> {
    let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
    Ok(Self {
      client,
      upload_base_url: upload_base_url.into(),
      public_base_url: public_base_url.into(),
      bearer_token,
    })
  }

  fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    match &self.bearer_token {
      Some(token) => req.bearer_auth(token),
      None => req,
    }
  }
}

#[async_trait]
impl ObjectStorage for HttpStorage {
  async fn upload(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<String> {
    let target = join_url(&self.upload_base_url, key);
    let resp = self
      .auth(self.client.put(&target))
      .header(CONTENT_TYPE, content_type)
      .body(bytes)
      .send()
      .await?;

    if !resp.status().is_success() {
      return Err(upstream_error(resp).await);
    }
    Ok(join_url(&self.public_base_url, key))
  }

  async fn fetch(&self, url: &str) -> Result<Bytes> {
    let resp = self.auth(self.client.get(url)).send().await?;
    if !resp.status().is_success() {
      return Err(upstream_error(resp).await);
    }
    Ok(resp.bytes().await?)
  }
}

// ─── In-memory ───────────────────────────────────────────────────────────────

/// Keeps objects in a map. URLs are `memory://key`.
#[derive(Debug, Default)]
pub struct MemoryStorage {
  objects: RwLock<HashMap<String, (Bytes, String)>>,
}

impl MemoryStorage {
  pub const SCHEME: &'static str = "memory://";

  pub fn new() -> Self { Self::default() }

  pub async fn len(&self) -> usize { self.objects.read().await.len() }

  pub async fn is_empty(&self) -> bool { self.objects.read().await.is_empty() }

  /// Content type an object was stored with.
  pub async fn content_type(&self, key: &str) -> Option<String> {
    self.objects.read().await.get(key).map(|(_, ct)| ct.clone())
  }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
  async fn upload(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<String> {
    self
      .objects
      .write()
      .await
      .insert(key.to_owned(), (bytes, content_type.to_owned()));
    Ok(format!("{}{key}", Self::SCHEME))
  }

  async fn fetch(&self, url: &str) -> Result<Bytes> {
    let key = url
      .strip_prefix(Self::SCHEME)
      .ok_or_else(|| Error::InvalidUrl(url.to_owned()))?;
    self
      .objects
      .read()
      .await
      .get(key)
      .map(|(bytes, _)| bytes.clone())
      .ok_or_else(|| Error::Upstream { status: 404, message: format!("object not found: {key}") })
  }
}
