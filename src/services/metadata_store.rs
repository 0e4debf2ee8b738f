//! Read-modify-write of the per-upload JSON sidecar.
//!
//! The document is always written whole. `add_variant` loads, mutates and
//! saves without any lock, so two concurrent variant additions on the same
//! upload race and the later save wins; the earlier entry is lost from the
//! document even though its blob stays in the store.

use bytes::Bytes;
use std::sync::Arc;
use tracing::debug;

use crate::{
    errors::{FileError, FileResult},
    models::{
        document::{FileDocument, VariantInfo},
        file_kind::FileKind,
    },
    services::{backend::BlobStore, key_layout},
};

const DOCUMENT_CONTENT_TYPE: &str = "application/json";

#[derive(Clone)]
pub struct MetadataStore {
    store: Arc<dyn BlobStore>,
}

impl MetadataStore {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Write the initial document, replacing anything already there.
    pub async fn create(
        &self,
        kind: FileKind,
        file_id: &str,
        document: &FileDocument,
    ) -> FileResult<()> {
        self.save(kind, file_id, document).await
    }

    pub async fn load(&self, kind: FileKind, file_id: &str) -> FileResult<FileDocument> {
        let key = key_layout::metadata_key(kind, file_id)?;
        let blob = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| FileError::NotFound(format!("metadata for `{}`", file_id)))?;
        Ok(serde_json::from_slice(&blob.body)?)
    }

    /// Serialize the whole document as pretty JSON and overwrite the sidecar.
    pub async fn save(
        &self,
        kind: FileKind,
        file_id: &str,
        document: &FileDocument,
    ) -> FileResult<()> {
        let key = key_layout::metadata_key(kind, file_id)?;
        let body = serde_json::to_vec_pretty(document)?;
        self.store
            .put(&key, Bytes::from(body), DOCUMENT_CONTENT_TYPE)
            .await?;
        debug!(%kind, file_id, "saved metadata document");
        Ok(())
    }

    /// Load, set `variants[variant_kind][variant_key] = info`, save.
    ///
    /// Returns the document as saved.
    pub async fn add_variant(
        &self,
        kind: FileKind,
        file_id: &str,
        variant_kind: &str,
        variant_key: &str,
        info: VariantInfo,
    ) -> FileResult<FileDocument> {
        let mut document = self.load(kind, file_id).await?;
        document.set_variant(variant_kind, variant_key, info);
        self.save(kind, file_id, &document).await?;
        Ok(document)
    }
}
