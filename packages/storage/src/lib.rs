//! Durable storage for logged exception detail.
//!
//! Every failure the worker logs under a reference code gets a plain text
//! dump named `<code>.txt`. Backends:
//! - S3-compatible object storage for deployed workers
//! - A local directory for single-host setups
//! - In-memory for tests
//!
//! Built on `object_store`, which provides all three backends.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use object_store::ObjectStore;
use object_store::ObjectStoreExt;
use object_store::path::Path;

/// Directory used when no filesystem root is configured.
pub const DEFAULT_FS_ROOT: &str = "./data/exceptions";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid storage config: {0}")]
    InvalidConfig(String),

    #[error("object key must not be empty")]
    EmptyKey,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object_store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("object {key} is not valid UTF-8 text: {reason}")]
    Encoding { key: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    S3,
    Filesystem,
    Memory,
}

impl StorageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageKind::S3 => "s3",
            StorageKind::Filesystem => "filesystem",
            StorageKind::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub allow_http: bool,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub virtual_hosted_style: bool,
}

#[derive(Debug, Clone)]
pub enum StorageBackendConfig {
    S3(S3Config),
    Filesystem { root: PathBuf },
    Memory,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackendConfig,
    /// Optional key prefix applied to all object keys.
    pub prefix: Option<String>,
}

impl StorageConfig {
    pub fn memory() -> Self {
        Self {
            backend: StorageBackendConfig::Memory,
            prefix: None,
        }
    }

    pub fn filesystem(root: impl Into<PathBuf>) -> Self {
        Self {
            backend: StorageBackendConfig::Filesystem { root: root.into() },
            prefix: None,
        }
    }

    pub fn s3(cfg: S3Config) -> Self {
        Self {
            backend: StorageBackendConfig::S3(cfg),
            prefix: None,
        }
    }

    /// Build a config from environment variables.
    ///
    /// Selection rules:
    /// - If `STORAGE_BACKEND` is set: use it (`s3`, `filesystem`, `memory`)
    /// - Otherwise: default to filesystem (`./data/exceptions`)
    ///
    /// S3 env vars (S3-compatible):
    /// - `S3_BUCKET` (required when backend is `s3`)
    /// - `AWS_REGION` (default: `us-east-1`)
    /// - `S3_ENDPOINT` (optional, e.g. `http://localhost:9000`)
    /// - `S3_ALLOW_HTTP` (`true`/`false`, default: auto true if endpoint is http://)
    /// - `S3_VIRTUAL_HOSTED_STYLE` (`true`/`false`, default: false)
    /// - `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, `AWS_SESSION_TOKEN` (optional; also picked up from the ambient AWS environment by the SDK)
    ///
    /// Filesystem env vars:
    /// - `STORAGE_FS_ROOT` (default: `./data/exceptions`)
    ///
    /// Common:
    /// - `STORAGE_PREFIX` (optional, e.g. `worker-a/`)
    pub fn from_env() -> Result<Self, StorageError> {
        let backend = env_opt("STORAGE_BACKEND").map(|b| b.to_ascii_lowercase());
        let prefix = env_opt("STORAGE_PREFIX");

        let cfg = match backend.as_deref() {
            Some("s3") => Self::s3(read_s3_config()?),
            Some("filesystem") | Some("fs") | None => Self::filesystem(fs_root_from_env()),
            Some("memory") | Some("mem") => Self::memory(),
            Some(other) => {
                return Err(StorageError::InvalidConfig(format!(
                    "unsupported STORAGE_BACKEND={other} (expected s3|filesystem|memory)"
                )));
            }
        };

        Ok(Self { prefix, ..cfg })
    }
}

/// Handle to the configured backend. Cheap to clone.
#[derive(Clone)]
pub struct Storage {
    kind: StorageKind,
    store: Arc<dyn ObjectStore>,
    prefix: Option<String>,
}

impl Storage {
    pub fn kind(&self) -> StorageKind {
        self.kind
    }

    pub fn kind_str(&self) -> &'static str {
        self.kind.as_str()
    }

    pub async fn new(cfg: StorageConfig) -> Result<Self, StorageError> {
        let (kind, store) = match cfg.backend {
            StorageBackendConfig::S3(s3) => (StorageKind::S3, Arc::new(build_s3(s3)?) as _),
            StorageBackendConfig::Filesystem { root } => {
                std::fs::create_dir_all(&root)?;
                let fs = object_store::local::LocalFileSystem::new_with_prefix(&root)?;
                (StorageKind::Filesystem, Arc::new(fs) as _)
            }
            StorageBackendConfig::Memory => {
                let mem = object_store::memory::InMemory::new();
                (StorageKind::Memory, Arc::new(mem) as _)
            }
        };

        let prefix = cfg
            .prefix
            .and_then(|p| non_empty(p.trim_matches('/').to_string()));
        tracing::debug!(backend = kind.as_str(), ?prefix, "Exception storage ready");

        Ok(Self {
            kind,
            store,
            prefix,
        })
    }

    pub async fn from_env() -> Result<Self, StorageError> {
        Self::new(StorageConfig::from_env()?).await
    }

    /// Object path for a key, below the configured prefix.
    fn to_path(&self, key: &str) -> Result<Path, StorageError> {
        let key = key.trim_start_matches('/');
        if key.is_empty() {
            return Err(StorageError::EmptyKey);
        }

        Ok(match &self.prefix {
            Some(prefix) => Path::from(format!("{prefix}/{key}")),
            None => Path::from(key),
        })
    }

    pub async fn put_bytes(&self, key: &str, bytes: Bytes) -> Result<(), StorageError> {
        let path = self.to_path(key)?;
        self.store
            .put(&path, object_store::PutPayload::from(bytes))
            .await?;
        Ok(())
    }

    pub async fn get_bytes(&self, key: &str) -> Result<Bytes, StorageError> {
        let path = self.to_path(key)?;
        let res = self.store.get(&path).await?;
        Ok(res.bytes().await?)
    }

    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.to_path(key)?;
        self.store.delete(&path).await?;
        Ok(())
    }

    /// Store a UTF-8 text document, replacing any previous content.
    pub async fn put_text(&self, key: &str, text: &str) -> Result<(), StorageError> {
        tracing::debug!(key, backend = self.kind_str(), "Writing text object");
        self.put_bytes(key, Bytes::copy_from_slice(text.as_bytes()))
            .await
    }

    pub async fn get_text(&self, key: &str) -> Result<String, StorageError> {
        let bytes = self.get_bytes(key).await?;
        String::from_utf8(bytes.to_vec()).map_err(|e| StorageError::Encoding {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    /// Whether an object exists under `key`.
    pub async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.to_path(key)?;
        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn fs_root_from_env() -> PathBuf {
    PathBuf::from(env_opt("STORAGE_FS_ROOT").unwrap_or_else(|| DEFAULT_FS_ROOT.to_string()))
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn env_opt(var_name: &str) -> Option<String> {
    std::env::var(var_name).ok().and_then(non_empty)
}

fn parse_bool_env(var_name: &str) -> Result<Option<bool>, StorageError> {
    let Some(raw) = env_opt(var_name) else {
        return Ok(None);
    };

    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" => Ok(Some(true)),
        "0" | "false" | "no" | "n" => Ok(Some(false)),
        _ => Err(StorageError::InvalidConfig(format!(
            "invalid boolean for {var_name}={raw} (expected true/false)"
        ))),
    }
}

fn read_s3_config() -> Result<S3Config, StorageError> {
    let bucket = env_opt("S3_BUCKET").ok_or_else(|| {
        StorageError::InvalidConfig("S3_BUCKET is required for s3 backend".into())
    })?;
    let endpoint = env_opt("S3_ENDPOINT");
    // Plain-http endpoints (local MinIO and friends) opt in automatically
    let http_endpoint = endpoint
        .as_deref()
        .is_some_and(|e| e.to_ascii_lowercase().starts_with("http://"));

    Ok(S3Config {
        bucket,
        region: env_opt("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
        allow_http: parse_bool_env("S3_ALLOW_HTTP")?.unwrap_or(http_endpoint),
        virtual_hosted_style: parse_bool_env("S3_VIRTUAL_HOSTED_STYLE")?.unwrap_or(false),
        endpoint,
        access_key_id: env_opt("AWS_ACCESS_KEY_ID"),
        secret_access_key: env_opt("AWS_SECRET_ACCESS_KEY"),
        session_token: env_opt("AWS_SESSION_TOKEN"),
    })
}

fn build_s3(cfg: S3Config) -> Result<object_store::aws::AmazonS3, StorageError> {
    let mut builder = object_store::aws::AmazonS3Builder::new()
        .with_bucket_name(cfg.bucket)
        .with_region(cfg.region)
        .with_allow_http(cfg.allow_http)
        .with_virtual_hosted_style_request(cfg.virtual_hosted_style);

    let optional = [
        (cfg.endpoint, object_store::aws::AmazonS3ConfigKey::Endpoint),
        (cfg.access_key_id, object_store::aws::AmazonS3ConfigKey::AccessKeyId),
        (
            cfg.secret_access_key,
            object_store::aws::AmazonS3ConfigKey::SecretAccessKey,
        ),
        (cfg.session_token, object_store::aws::AmazonS3ConfigKey::Token),
    ];
    for (value, key) in optional {
        if let Some(value) = value {
            builder = builder.with_config(key, value);
        }
    }

    Ok(builder.build()?)
}
