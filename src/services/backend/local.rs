//! src/services/backend/local.rs
//!
//! LocalBlobStore — blob rows (content type, size, etag, mtime) in SQLite and
//! payloads on local disk sharded beneath `base_path/{shard}/{shard}/{key}`.
//! No cache sits in front of either; every call goes to SQLite and the disk.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

use super::{BackendError, BackendResult, Blob, BlobStore, DeleteOutcome, ListedObject};
use crate::models::{document::ObjectStat, object::StoredObject};

/// Schema applied by [`LocalBlobStore::migrate`].
pub const SCHEMA: &str = include_str!("../../../migrations/0001_init.sql");

const MAX_OBJECT_KEY_LEN: usize = 1024;

#[derive(Clone)]
pub struct LocalBlobStore {
    /// Shared SQLite connection pool used for blob rows.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where payloads are stored.
    pub base_path: PathBuf,
}

impl LocalBlobStore {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Apply the embedded schema. Every statement is idempotent.
    pub async fn migrate(&self) -> BackendResult<()> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        debug!("running {} schema statements", statements.len());
        for stmt in statements {
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    /// Reject keys that could escape `base_path` or confuse the shard layout.
    fn ensure_key_safe(key: &str) -> BackendResult<()> {
        let unsafe_key = key.is_empty()
            || key.len() > MAX_OBJECT_KEY_LEN
            || key.starts_with('/')
            || key.contains("..")
            || key
                .bytes()
                .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0');
        if unsafe_key {
            return Err(BackendError::InvalidKey(key.to_string()));
        }
        Ok(())
    }

    /// First two bytes of `md5(key)` as lowercase hex. Keeps directories small.
    fn object_shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(key);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    async fn fetch_object(&self, key: &str) -> BackendResult<Option<StoredObject>> {
        let row = sqlx::query_as::<_, StoredObject>(
            "SELECT key, content_type, size_bytes, etag, last_modified
             FROM objects WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&*self.db)
        .await?;
        Ok(row)
    }

    /// Write `body` to a temp file next to `file_path`, fsync, then rename into place.
    async fn write_payload(&self, file_path: &Path, body: &[u8]) -> BackendResult<()> {
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            BackendError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let written = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(body).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, file_path).await
        }
        .await;

        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(BackendError::Io(err));
        }
        Ok(())
    }

    async fn delete_one(&self, key: &str) -> BackendResult<()> {
        Self::ensure_key_safe(key)?;
        sqlx::query("DELETE FROM objects WHERE key = ?")
            .bind(key)
            .execute(&*self.db)
            .await?;

        let file_path = self.object_path(key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed payload {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("payload {} already missing", file_path.display());
            }
            Err(err) => return Err(BackendError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent, &self.base_path).await;
        }
        Ok(())
    }

    /// Remove empty directories from `start` upward, stopping at `stop`.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

/// Smallest string greater than every string starting with `prefix`, so
/// `key >= prefix AND key < bound` selects the prefix on the primary-key index.
/// `None` when no such bound exists (empty prefix or all `char::MAX`).
fn prefix_upper_bound(prefix: &str) -> Option<String> {
    let mut chars: Vec<char> = prefix.chars().collect();
    while let Some(last) = chars.pop() {
        let next = (last as u32 + 1..=char::MAX as u32).find_map(char::from_u32);
        if let Some(next) = next {
            chars.push(next);
            return Some(chars.into_iter().collect());
        }
    }
    None
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> BackendResult<()> {
        Self::ensure_key_safe(key)?;
        let file_path = self.object_path(key);
        self.write_payload(&file_path, &body).await?;

        let etag = format!("{:x}", md5::compute(&body));
        let upserted = sqlx::query(
            r#"
            INSERT INTO objects (key, content_type, size_bytes, etag, last_modified)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                last_modified = excluded.last_modified
            "#,
        )
        .bind(key)
        .bind(content_type)
        .bind(body.len() as i64)
        .bind(&etag)
        .bind(Utc::now())
        .execute(&*self.db)
        .await;

        if let Err(err) = upserted {
            let _ = fs::remove_file(&file_path).await;
            return Err(BackendError::Sqlx(err));
        }
        debug!(key, size = body.len(), "stored payload");
        Ok(())
    }

    async fn get(&self, key: &str) -> BackendResult<Option<Blob>> {
        Self::ensure_key_safe(key)?;
        let Some(object) = self.fetch_object(key).await? else {
            return Ok(None);
        };

        match fs::read(self.object_path(key)).await {
            Ok(body) => Ok(Some(Blob {
                body: Bytes::from(body),
                stat: object.stat(),
                etag: object.etag,
            })),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(BackendError::Io(err)),
        }
    }

    async fn head(&self, key: &str) -> BackendResult<Option<ObjectStat>> {
        Self::ensure_key_safe(key)?;
        Ok(self.fetch_object(key).await?.map(|object| object.stat()))
    }

    async fn list_prefix(
        &self,
        prefix: &str,
        limit: Option<usize>,
    ) -> BackendResult<Vec<ListedObject>> {
        // SQLite treats a negative LIMIT as "no limit".
        let limit = limit.map(|n| n as i64).unwrap_or(-1);
        let rows = match prefix_upper_bound(prefix) {
            Some(upper) => {
                sqlx::query_as::<_, StoredObject>(
                    "SELECT key, content_type, size_bytes, etag, last_modified
                     FROM objects
                     WHERE key >= ? AND key < ?
                     ORDER BY key ASC
                     LIMIT ?",
                )
                .bind(prefix)
                .bind(upper)
                .bind(limit)
                .fetch_all(&*self.db)
                .await?
            }
            None => {
                sqlx::query_as::<_, StoredObject>(
                    "SELECT key, content_type, size_bytes, etag, last_modified
                     FROM objects
                     WHERE key >= ?
                     ORDER BY key ASC
                     LIMIT ?",
                )
                .bind(prefix)
                .bind(limit)
                .fetch_all(&*self.db)
                .await?
            }
        };

        Ok(rows
            .into_iter()
            .map(|row| ListedObject {
                stat: row.stat(),
                key: row.key,
            })
            .collect())
    }

    async fn delete_many(&self, keys: &[String]) -> BackendResult<DeleteOutcome> {
        let mut outcome = DeleteOutcome::default();
        for key in keys {
            match self.delete_one(key).await {
                Ok(()) => outcome.deleted.push(key.clone()),
                Err(err) => outcome.failed.push((key.clone(), err.to_string())),
            }
        }
        Ok(outcome)
    }

    async fn ping(&self) -> BackendResult<()> {
        let one = sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        if one != 1 {
            return Err(BackendError::Unavailable(format!(
                "unexpected probe result: {}",
                one
            )));
        }
        fs::metadata(&self.base_path).await?;
        Ok(())
    }
}
