//! Object store backend contract.
//!
//! The gateway only needs four primitives from a store: put a blob, get a
//! blob, list keys under a prefix and delete a batch of keys. Anything that
//! offers them with read-after-write consistency for a single key can back
//! the gateway.

pub mod local;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use thiserror::Error;

use crate::models::document::ObjectStat;

pub use local::LocalBlobStore;
pub use memory::MemoryBlobStore;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error("{0}")]
    Unavailable(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// A blob read back from the store.
#[derive(Debug, Clone)]
pub struct Blob {
    pub body: Bytes,
    pub stat: ObjectStat,
    /// Hex MD5 of `body`, when the backend records one.
    pub etag: Option<String>,
}

/// One entry of a prefix listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedObject {
    pub key: String,
    pub stat: ObjectStat,
}

/// Per-key result of a bulk delete.
#[derive(Debug, Default)]
pub struct DeleteOutcome {
    pub deleted: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl DeleteOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `body` under `key`, replacing any previous blob.
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> BackendResult<()>;

    /// Read a blob with its stat. `Ok(None)` when the key is absent.
    async fn get(&self, key: &str) -> BackendResult<Option<Blob>>;

    /// Stat a blob without reading its body.
    async fn head(&self, key: &str) -> BackendResult<Option<ObjectStat>>;

    /// Keys starting with `prefix`, ascending. `limit` caps the result size.
    async fn list_prefix(&self, prefix: &str, limit: Option<usize>)
    -> BackendResult<Vec<ListedObject>>;

    /// Delete every key in `keys` in one request, reporting failures per key.
    async fn delete_many(&self, keys: &[String]) -> BackendResult<DeleteOutcome>;

    /// Cheap readiness probe.
    async fn ping(&self) -> BackendResult<()> {
        self.list_prefix("", Some(1)).await.map(|_| ())
    }
}
