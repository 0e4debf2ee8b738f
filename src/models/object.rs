//! Represents a blob row held by the local backend.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::models::document::ObjectStat;

/// One stored blob, keyed by its full store key.
///
/// The struct describes the payload; the bytes themselves live on disk.
#[derive(Clone, FromRow, Debug)]
pub struct StoredObject {
    /// Full store key, e.g. `images/{id}/origin/cat.png`.
    pub key: String,

    /// Content type (MIME type) declared at upload.
    pub content_type: Option<String>,

    /// Size in bytes.
    pub size_bytes: i64,

    /// MD5 checksum of the payload.
    pub etag: Option<String>,

    /// Timestamp when the blob was last written.
    pub last_modified: DateTime<Utc>,
}

impl StoredObject {
    pub fn stat(&self) -> ObjectStat {
        ObjectStat {
            size: self.size_bytes.max(0) as u64,
            content_type: self
                .content_type
                .clone()
                .unwrap_or_else(|| "application/octet-stream".into()),
            last_modified: self.last_modified,
        }
    }
}
