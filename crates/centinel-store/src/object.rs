// crates/centinel-store/src/object.rs
//
// OpendalStore: `ObjectStore` over an opendal `Operator`.
//
// Production deployments point it at an S3-compatible bucket; tests and
// local runs use the in-memory or filesystem services. opendal errors are
// folded into the two-way transient/permanent split the retry loop needs.

use std::path::Path;

use async_trait::async_trait;
use opendal::{services, ErrorKind, Operator};

use centinel_core::error::StorageError;
use centinel_core::traits::ObjectStore;

/// Connection settings for an S3-compatible bucket.
#[derive(Debug, Clone, Default)]
pub struct S3Settings {
    pub bucket: String,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

/// Object store backed by opendal.
#[derive(Debug, Clone)]
pub struct OpendalStore {
    op: Operator,
}

impl OpendalStore {
    /// Wrap an already-configured operator.
    pub fn new(op: Operator) -> Self {
        Self { op }
    }

    /// Volatile in-process store.
    pub fn memory() -> Result<Self, StorageError> {
        let op = Operator::new(services::Memory::default())
            .map_err(classify)?
            .finish();
        Ok(Self::new(op))
    }

    /// Store rooted at a local directory.
    pub fn filesystem(root: &Path) -> Result<Self, StorageError> {
        let builder = services::Fs::default().root(&root.to_string_lossy());
        let op = Operator::new(builder).map_err(classify)?.finish();
        Ok(Self::new(op))
    }

    /// Store backed by an S3-compatible bucket.
    pub fn s3(settings: &S3Settings) -> Result<Self, StorageError> {
        let mut builder = services::S3::default().bucket(&settings.bucket);
        if let Some(endpoint) = &settings.endpoint {
            builder = builder.endpoint(endpoint);
        }
        if let Some(region) = &settings.region {
            builder = builder.region(region);
        }
        if let Some(key) = &settings.access_key_id {
            builder = builder.access_key_id(key);
        }
        if let Some(secret) = &settings.secret_access_key {
            builder = builder.secret_access_key(secret);
        }
        let op = Operator::new(builder).map_err(classify)?.finish();
        Ok(Self::new(op))
    }
}

/// Map an opendal error onto the retry classification.
///
/// Transport failures surface from opendal as `Unexpected` (usually flagged
/// temporary); throttling is `RateLimited`. Everything else is permanent.
fn classify(e: opendal::Error) -> StorageError {
    let transient = e.is_temporary()
        || matches!(e.kind(), ErrorKind::RateLimited | ErrorKind::Unexpected);
    if transient {
        StorageError::Transient(e.to_string())
    } else {
        StorageError::Permanent(e.to_string())
    }
}

#[async_trait]
impl ObjectStore for OpendalStore {
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError> {
        self.op.write(key, body).await.map(|_| ()).map_err(classify)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match self.op.read(key).await {
            Ok(buffer) => Ok(Some(buffer.to_vec())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(classify(e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let entries = match self.op.list(prefix).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(classify(e)),
        };
        Ok(entries
            .into_iter()
            .map(|entry| entry.path().to_string())
            .filter(|path| !path.ends_with('/'))
            .collect())
    }
}
