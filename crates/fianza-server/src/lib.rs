//! Configuration and router assembly for the Fianza intake server.
//!
//! The binary in `main.rs` reads a [`ServerConfig`], opens the SQLite store
//! and serves [`router`]. Everything here is also usable from tests.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::{Context as _, bail};
use axum::Router;
use fianza_api::{AppState, StaffAuth, api_router};
use fianza_core::{intake::IntakePolicy, store::IntakeStore};
use fianza_relay::{
  notify::{Notifier, WebhookRelay},
  ocr::{AccessToken, OcrClient, OcrProvider, TextExtractor, VISION_ENDPOINT},
  storage::{HttpStorage, LocalStorage, MemoryStorage, ObjectStorage},
};
use serde::Deserialize;
use tower_http::{services::ServeDir, trace::TraceLayer};

/// Prefix of environment variables overriding the config file, e.g.
/// `FIANZA_PORT` or `FIANZA_STORAGE__BACKEND`.
pub const ENV_PREFIX: &str = "FIANZA";

/// Path under which the local storage backend serves its files.
pub const FILES_ROUTE: &str = "/files";

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and the
/// environment.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:       String,
  #[serde(default = "default_port")]
  pub port:       u16,
  #[serde(default = "default_store_path")]
  pub store_path: PathBuf,
  #[serde(default)]
  pub storage:    StorageConfig,
  /// Absent disables OCR.
  #[serde(default)]
  pub ocr:        Option<OcrConfig>,
  #[serde(default)]
  pub notify:     NotifyConfig,
  #[serde(default)]
  pub payments:   PaymentsConfig,
  /// Absent leaves the staff routes unauthenticated.
  #[serde(default)]
  pub staff:      Option<StaffConfig>,
}

fn default_host() -> String { "127.0.0.1".to_string() }

fn default_port() -> u16 { 8080 }

fn default_store_path() -> PathBuf { PathBuf::from("fianza.sqlite3") }

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
  #[default]
  Local,
  Http,
  Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
  #[serde(default)]
  pub backend:         StorageBackend,
  /// Directory of the `local` backend.
  #[serde(default = "default_storage_root")]
  pub root:            PathBuf,
  /// Base of the URLs recorded for stored documents.
  #[serde(default = "default_public_base_url")]
  pub public_base_url: String,
  /// `PUT` target of the `http` backend.
  pub upload_base_url: Option<String>,
  pub bearer_token:    Option<String>,
}

fn default_storage_root() -> PathBuf { PathBuf::from("uploads") }

fn default_public_base_url() -> String { format!("http://127.0.0.1:8080{FILES_ROUTE}") }

impl Default for StorageConfig {
  fn default() -> Self {
    Self {
      backend:         StorageBackend::default(),
      root:            default_storage_root(),
      public_base_url: default_public_base_url(),
      upload_base_url: None,
      bearer_token:    None,
    }
  }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OcrProviderKind {
  DocumentAi,
  Vision,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcrConfig {
  pub provider:          OcrProviderKind,
  /// Required for `document_ai`; defaults to the public annotator for `vision`.
  pub endpoint:          Option<String>,
  /// Static bearer token for `document_ai`. These expire after about an
  /// hour; prefer `access_token_file` for anything long-running.
  pub access_token:      Option<String>,
  /// File holding the `document_ai` bearer token, re-read on every request
  /// so an external job can refresh it. Wins over `access_token`.
  #[serde(default)]
  pub access_token_file: Option<PathBuf>,
  pub api_key:           Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotifyConfig {
  pub webhook_url:  Option<String>,
  #[serde(default = "default_notify_timeout")]
  pub timeout_secs: u64,
}

fn default_notify_timeout() -> u64 { 8 }

impl Default for NotifyConfig {
  fn default() -> Self { Self { webhook_url: None, timeout_secs: default_notify_timeout() } }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PaymentsConfig {
  pub webhook_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StaffConfig {
  pub username:      String,
  /// PHC string; generate with `fianza-server --hash-password`.
  pub password_hash: String,
}

/// Read `path` (optional) and `FIANZA_*` environment variables.
pub fn load_config(path: &Path) -> anyhow::Result<ServerConfig> {
  let settings = config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(
      config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__"),
    )
    .build()
    .context("failed to read config file")?;

  settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")
}

// ─── Application state ────────────────────────────────────────────────────────

fn build_storage(cfg: &StorageConfig) -> anyhow::Result<Arc<dyn ObjectStorage>> {
  Ok(match cfg.backend {
    StorageBackend::Local => {
      Arc::new(LocalStorage::new(cfg.root.clone(), cfg.public_base_url.clone()))
    }
    StorageBackend::Http => {
      let upload = cfg
        .upload_base_url
        .clone()
        .context("storage.upload_base_url is required for the http backend")?;
      Arc::new(HttpStorage::new(
        upload,
        cfg.public_base_url.clone(),
        cfg.bearer_token.clone(),
      )?)
    }
    StorageBackend::Memory => Arc::new(MemoryStorage::new()),
  })
}

fn build_ocr(cfg: &OcrConfig) -> anyhow::Result<Arc<dyn TextExtractor>> {
  let provider = match cfg.provider {
    OcrProviderKind::DocumentAi => OcrProvider::DocumentAi {
      endpoint:     cfg
        .endpoint
        .clone()
        .context("ocr.endpoint is required for document_ai")?,
      access_token: match (&cfg.access_token_file, &cfg.access_token) {
        (Some(path), _) => AccessToken::File(path.clone()),
        (None, Some(token)) => AccessToken::Static(token.clone()),
        (None, None) => {
          bail!("ocr.access_token or ocr.access_token_file is required for document_ai")
        }
      },
    },
    OcrProviderKind::Vision => OcrProvider::Vision {
      endpoint: cfg.endpoint.clone().unwrap_or_else(|| VISION_ENDPOINT.to_string()),
      api_key:  cfg.api_key.clone().context("ocr.api_key is required for vision")?,
    },
  };
  Ok(Arc::new(OcrClient::new(provider)?))
}

/// Wire `store` and the configured relays into an [`AppState`].
pub fn build_state<S: IntakeStore>(store: S, config: &ServerConfig) -> anyhow::Result<AppState<S>> {
  if let Some(staff) = &config.staff
    && staff.password_hash.trim().is_empty()
  {
    bail!("staff.password_hash is empty; generate one with --hash-password");
  }

  let notifier = Notifier::new(
    config.notify.webhook_url.clone(),
    Duration::from_secs(config.notify.timeout_secs),
  )?;
  if !notifier.is_enabled() {
    tracing::warn!("notify.webhook_url is not set; registrations will not be announced");
  }

  Ok(AppState {
    store:    Arc::new(store),
    storage:  build_storage(&config.storage)?,
    ocr:      config.ocr.as_ref().map(build_ocr).transpose()?,
    notifier,
    payments: WebhookRelay::new("payment webhook", config.payments.webhook_url.clone())?,
    staff:    config.staff.as_ref().map(|s| {
      Arc::new(StaffAuth {
        username:      s.username.clone(),
        password_hash: s.password_hash.clone(),
      })
    }),
    intake:   IntakePolicy::default(),
  })
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// The full application: the API under `/api`, local files under
/// [`FILES_ROUTE`] when the local backend is in use, and request tracing.
pub fn router<S>(state: AppState<S>, config: &ServerConfig) -> Router
where
  S: IntakeStore + 'static,
{
  let mut app = Router::new().nest("/api", api_router(state));
  if config.storage.backend == StorageBackend::Local {
    app = app.nest_service(FILES_ROUTE, ServeDir::new(&config.storage.root));
  }
  app.layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
  use std::io::Write as _;

  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use fianza_store_sqlite::SqliteStore;
  use tower::ServiceExt as _;

  use super::*;

  fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
  }

  #[test]
  fn missing_file_yields_defaults() {
    let cfg = load_config(Path::new("/nonexistent/fianza.toml")).unwrap();
    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.storage.backend, StorageBackend::Local);
    assert_eq!(cfg.notify.timeout_secs, 8);
    assert!(cfg.ocr.is_none());
    assert!(cfg.staff.is_none());
  }

  #[test]
  fn nested_sections_are_read() {
    let file = write_config(
      r#"
        port = 9000

        [storage]
        backend = "memory"

        [ocr]
        provider = "vision"
        api_key  = "k"

        [notify]
        webhook_url  = "http://hooks.local/registered"
        timeout_secs = 3

        [payments]
        webhook_url = "http://hooks.local/pay"
      "#,
    );

    let cfg = load_config(file.path()).unwrap();
    assert_eq!(cfg.port, 9000);
    assert_eq!(cfg.storage.backend, StorageBackend::Memory);
    assert_eq!(cfg.ocr.as_ref().unwrap().provider, OcrProviderKind::Vision);
    assert_eq!(cfg.notify.timeout_secs, 3);
    assert_eq!(cfg.payments.webhook_url.as_deref(), Some("http://hooks.local/pay"));
  }

  #[tokio::test]
  async fn incomplete_collaborators_are_rejected() {
    let mut cfg = load_config(Path::new("/nonexistent/fianza.toml")).unwrap();
    cfg.ocr = Some(OcrConfig {
      provider:          OcrProviderKind::DocumentAi,
      endpoint:          None,
      access_token:      Some("t".into()),
      access_token_file: None,
      api_key:           None,
    });
    let store = SqliteStore::open_in_memory().await.unwrap();
    assert!(build_state(store, &cfg).is_err());

    // An endpoint without any token source is still incomplete.
    cfg.ocr = Some(OcrConfig {
      provider:          OcrProviderKind::DocumentAi,
      endpoint:          Some("http://ocr.local/process".into()),
      access_token:      None,
      access_token_file: None,
      api_key:           None,
    });
    let store = SqliteStore::open_in_memory().await.unwrap();
    assert!(build_state(store, &cfg).is_err());

    let mut cfg = load_config(Path::new("/nonexistent/fianza.toml")).unwrap();
    cfg.storage.backend = StorageBackend::Http;
    let store = SqliteStore::open_in_memory().await.unwrap();
    assert!(build_state(store, &cfg).is_err());
  }

  #[test]
  fn token_file_is_read_from_config() {
    let file = write_config(
      r#"
        [ocr]
        provider          = "document_ai"
        endpoint          = "http://ocr.local/process"
        access_token_file = "/run/secrets/ocr-token"
      "#,
    );

    let cfg = load_config(file.path()).unwrap();
    let ocr = cfg.ocr.as_ref().unwrap();
    assert_eq!(ocr.access_token_file.as_deref(), Some(Path::new("/run/secrets/ocr-token")));
    assert!(build_ocr(ocr).is_ok());
  }

  #[tokio::test]
  async fn api_is_mounted_and_local_files_are_served() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = load_config(Path::new("/nonexistent/fianza.toml")).unwrap();
    cfg.storage.root = dir.path().to_path_buf();
    std::fs::create_dir_all(dir.path().join("documents")).unwrap();
    std::fs::write(dir.path().join("documents/a.png"), b"png").unwrap();

    let store = SqliteStore::open_in_memory().await.unwrap();
    let app = router(build_state(store, &cfg).unwrap(), &cfg);

    let req = Request::builder()
      .method("POST")
      .uri("/api/applicants")
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(
        serde_json::json!({
          "first_name": "Ana",
          "last_name":  "Gómez",
          "phone":      "+573001234567",
        })
        .to_string(),
      ))
      .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let req = Request::builder().uri("/files/documents/a.png").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
  }
}
