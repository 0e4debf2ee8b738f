//! Identifier allocation by probing the store.
//!
//! Uniqueness is checked by listing `{kind}/{candidate}/` before handing the
//! identifier out. Nothing reserves the identifier between the check and the
//! first write, so two callers could in principle race on the same value; with
//! random v4 UUIDs that only happens at UUID-collision odds.

use futures::future::try_join_all;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::{
    errors::{FileError, FileResult},
    models::file_kind::FileKind,
    services::{backend::BlobStore, key_layout},
};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

type IdGenerator = Box<dyn Fn() -> Uuid + Send + Sync>;

pub struct IdAllocator {
    store: Arc<dyn BlobStore>,
    max_attempts: u32,
    generate: IdGenerator,
}

impl IdAllocator {
    pub fn new(store: Arc<dyn BlobStore>, max_attempts: u32) -> Self {
        Self::with_generator(store, max_attempts, Uuid::new_v4)
    }

    /// Use a custom candidate source instead of random v4 UUIDs.
    pub fn with_generator(
        store: Arc<dyn BlobStore>,
        max_attempts: u32,
        generate: impl Fn() -> Uuid + Send + Sync + 'static,
    ) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
            generate: Box::new(generate),
        }
    }

    /// Whether any blob exists under `{kind}/{file_id}/`.
    pub async fn exists(&self, kind: FileKind, file_id: &str) -> FileResult<bool> {
        let prefix = key_layout::object_prefix(kind, file_id)?;
        let found = self.store.list_prefix(&prefix, Some(1)).await?;
        Ok(!found.is_empty())
    }

    /// Draw identifiers until one is free under `kind`.
    ///
    /// Gives up with `AllocationExhausted` after `max_attempts` collisions.
    pub async fn allocate(&self, kind: FileKind) -> FileResult<String> {
        for attempt in 1..=self.max_attempts {
            let candidate = (self.generate)().to_string();
            if !self.exists(kind, &candidate).await? {
                return Ok(candidate);
            }
            warn!(%kind, file_id = %candidate, attempt, "identifier already taken, retrying");
        }
        Err(FileError::AllocationExhausted {
            kind,
            attempts: self.max_attempts,
        })
    }

    /// Find which kind namespace holds `file_id`.
    ///
    /// All kinds are probed, and the first hit in `FileKind::ALL` order wins.
    pub async fn find_kind(&self, file_id: &str) -> FileResult<FileKind> {
        let probes = FileKind::ALL.map(|kind| async move {
            self.exists(kind, file_id).await.map(|found| (kind, found))
        });
        try_join_all(probes)
            .await?
            .into_iter()
            .find_map(|(kind, found)| found.then_some(kind))
            .ok_or_else(|| FileError::NotFound(format!("file `{}`", file_id)))
    }
}
