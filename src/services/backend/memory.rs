//! In-process backend keeping every blob in a sorted map.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::{
    collections::{BTreeMap, HashSet},
    sync::{Mutex, MutexGuard, PoisonError},
};

use super::{BackendResult, Blob, BlobStore, DeleteOutcome, ListedObject};
use crate::models::document::ObjectStat;

/// Strongly consistent, non-durable store. Used for tests and for running
/// the gateway without any disk state (`--backend memory`).
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<BTreeMap<String, Blob>>,
    failing_deletes: Mutex<HashSet<String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future delete of `key` report a per-key failure.
    #[cfg(test)]
    pub fn fail_deletes_for(&self, key: impl Into<String>) {
        self.failing_deletes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into());
    }

    fn objects(&self) -> MutexGuard<'_, BTreeMap<String, Blob>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> BackendResult<()> {
        let stat = ObjectStat {
            size: body.len() as u64,
            content_type: content_type.to_string(),
            last_modified: Utc::now(),
        };
        let etag = Some(format!("{:x}", md5::compute(&body)));
        self.objects()
            .insert(key.to_string(), Blob { body, stat, etag });
        Ok(())
    }

    async fn get(&self, key: &str) -> BackendResult<Option<Blob>> {
        Ok(self.objects().get(key).cloned())
    }

    async fn head(&self, key: &str) -> BackendResult<Option<ObjectStat>> {
        Ok(self.objects().get(key).map(|blob| blob.stat.clone()))
    }

    async fn list_prefix(
        &self,
        prefix: &str,
        limit: Option<usize>,
    ) -> BackendResult<Vec<ListedObject>> {
        let objects = self.objects();
        let listed = objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .take(limit.unwrap_or(usize::MAX))
            .map(|(key, blob)| ListedObject {
                key: key.clone(),
                stat: blob.stat.clone(),
            })
            .collect();
        Ok(listed)
    }

    async fn delete_many(&self, keys: &[String]) -> BackendResult<DeleteOutcome> {
        let failing = self
            .failing_deletes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let mut objects = self.objects();
        let mut outcome = DeleteOutcome::default();
        for key in keys {
            if failing.contains(key) {
                outcome.failed.push((key.clone(), "AccessDenied".into()));
                continue;
            }
            objects.remove(key);
            outcome.deleted.push(key.clone());
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_only_matching_prefix_in_key_order() {
        let store = MemoryBlobStore::new();
        for key in ["images/b/x", "images/a/y", "images/a/x", "images/ab/z", "videos/a/x"] {
            store
                .put(key, Bytes::from_static(b"data"), "image/png")
                .await
                .unwrap();
        }

        let keys: Vec<_> = store
            .list_prefix("images/a/", None)
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(keys, vec!["images/a/x", "images/a/y"]);

        let limited = store.list_prefix("images/", Some(1)).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn reports_failed_deletes_per_key() {
        let store = MemoryBlobStore::new();
        store.put("a", Bytes::from_static(b"1"), "text/plain").await.unwrap();
        store.put("b", Bytes::from_static(b"2"), "text/plain").await.unwrap();
        store.fail_deletes_for("b");

        let outcome = store
            .delete_many(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(outcome.deleted, vec!["a"]);
        assert_eq!(outcome.failed.len(), 1);
        assert!(!outcome.is_complete());
        let kept = store.get("b").await.unwrap().unwrap();
        assert_eq!(kept.etag, Some(format!("{:x}", md5::compute(b"2"))));
    }
}
