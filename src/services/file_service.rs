//! FileService — upload, variant creation and deletion of stored files.
//!
//! Each operation runs in two phases against the store: blobs first, then the
//! metadata document. There is no transaction spanning them, so a failure
//! between the phases leaves a blob without matching metadata. Such orphans
//! are visible by listing `{kind}/{file_id}/` and finding no `metadata.json`.

use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    errors::{FileError, FileResult},
    models::{
        document::{FileDocument, ObjectStat, VariantInfo},
        file_kind::FileKind,
    },
    services::{
        allocator::IdAllocator,
        backend::{BackendError, Blob, BlobStore},
        key_layout,
        metadata_store::MetadataStore,
        transform::{Transform, TransformError},
    },
};

/// Result of a successful variant creation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VariantCreated {
    pub file_id: String,
    pub url: String,
    pub variant_kind: String,
    pub variant_key: String,
    pub size: u64,
    pub content_type: String,
}

#[derive(Clone)]
pub struct FileService {
    store: Arc<dyn BlobStore>,
    allocator: Arc<IdAllocator>,
    metadata: MetadataStore,
    public_base_url: String,
}

impl FileService {
    pub fn new(
        store: Arc<dyn BlobStore>,
        allocator: IdAllocator,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            metadata: MetadataStore::new(store.clone()),
            allocator: Arc::new(allocator),
            store,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    #[cfg(test)]
    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    /// Public URL a key is served under.
    pub fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    /// Resolve a content type to its kind, rejecting unknown types.
    pub fn kind_for(content_type: &str) -> FileResult<FileKind> {
        FileKind::from_content_type(content_type).ok_or_else(|| {
            FileError::InvalidInput(format!(
                "unsupported file type: {}. Allowed types are: {}",
                content_type,
                FileKind::supported_content_types().collect::<Vec<_>>().join(", ")
            ))
        })
    }

    /// Stat a blob that was just written. A missing blob at this point means
    /// the store lost a write it acknowledged.
    async fn stat_written(&self, key: &str) -> FileResult<ObjectStat> {
        self.store.head(key).await?.ok_or_else(|| {
            FileError::BackendUnavailable(BackendError::Unavailable(format!(
                "object `{}` missing right after write",
                key
            )))
        })
    }

    /// Store a new upload under `kind`.
    ///
    /// Allocates an identifier, writes the origin blob, reads its stat back
    /// and creates the metadata document with no variants.
    pub async fn upload(
        &self,
        kind: FileKind,
        body: Bytes,
        content_type: &str,
        filename: &str,
    ) -> FileResult<FileDocument> {
        let actual = Self::kind_for(content_type)?;
        if actual != kind {
            return Err(FileError::TypeMismatch {
                expected: kind,
                actual: actual.to_string(),
            });
        }

        let file_id = self.allocator.allocate(kind).await?;
        let key = key_layout::origin_key(kind, &file_id, filename)?;
        self.store.put(&key, body, content_type).await?;
        let stat = self.stat_written(&key).await?;
        debug!(%kind, %file_id, key = %key, size = stat.size, "origin stored");

        let document = FileDocument::new(self.url_for(&key), file_id.clone(), filename.into(), stat);
        self.metadata.create(kind, &file_id, &document).await?;
        info!(%kind, %file_id, filename, "upload complete");
        Ok(document)
    }

    /// Upload with the kind taken from the content type.
    pub async fn upload_detected(
        &self,
        body: Bytes,
        content_type: &str,
        filename: &str,
    ) -> FileResult<FileDocument> {
        let kind = Self::kind_for(content_type)?;
        self.upload(kind, body, content_type, filename).await
    }

    /// Derive a variant of an existing upload and record it in the metadata.
    ///
    /// The transform runs on the blocking pool. Re-running an identical
    /// transform overwrites its own blob and metadata entry.
    pub async fn create_variant<T: Transform>(
        &self,
        kind: FileKind,
        file_id: &str,
        transform: T,
    ) -> FileResult<VariantCreated> {
        if !self.allocator.exists(kind, file_id).await? {
            return Err(FileError::NotFound(format!("file `{}`", file_id)));
        }
        let document = self.metadata.load(kind, file_id).await?;
        let origin_key = key_layout::origin_key(kind, file_id, &document.filename)?;
        let Blob { body, stat, .. } = self
            .store
            .get(&origin_key)
            .await?
            .ok_or_else(|| FileError::NotFound(format!("origin of `{}`", file_id)))?;

        let variant_kind = transform.variant_kind();
        let variant_key = transform.variant_key();
        let key = key_layout::variant_blob_key(
            kind,
            file_id,
            variant_kind,
            &transform.segments(),
            &document.filename,
        )?;

        let source_type = stat.content_type.clone();
        let derived = tokio::task::spawn_blocking(move || transform.apply(&body, &source_type))
            .await
            .map_err(|e| TransformError::Encode(format!("transform task failed: {}", e)))??;

        self.store
            .put(&key, Bytes::from(derived), &stat.content_type)
            .await?;
        let variant_stat = self.stat_written(&key).await?;

        let info = VariantInfo {
            url: self.url_for(&key),
            size: variant_stat.size,
            content_type: variant_stat.content_type,
            last_modified: variant_stat.last_modified,
        };
        let saved = self
            .metadata
            .add_variant(kind, file_id, variant_kind, &variant_key, info)
            .await?;
        let recorded = saved
            .variant(variant_kind, &variant_key)
            .ok_or_else(|| FileError::NotFound(format!("variant `{}` of `{}`", variant_key, file_id)))?;
        let created = VariantCreated {
            file_id: file_id.to_string(),
            url: recorded.url.clone(),
            variant_kind: variant_kind.to_string(),
            variant_key: variant_key.clone(),
            size: recorded.size,
            content_type: recorded.content_type.clone(),
        };
        info!(%kind, file_id, variant_kind, variant_key = %variant_key, "variant stored");
        Ok(created)
    }

    /// Remove every blob under `{kind}/{file_id}/`, metadata included, in one
    /// bulk request.
    pub async fn delete(&self, kind: FileKind, file_id: &str) -> FileResult<()> {
        let prefix = key_layout::object_prefix(kind, file_id)?;
        let keys: Vec<String> = self
            .store
            .list_prefix(&prefix, None)
            .await?
            .into_iter()
            .map(|object| object.key)
            .collect();
        if keys.is_empty() {
            return Err(FileError::NotFound(format!("file `{}`", file_id)));
        }

        let outcome = self.store.delete_many(&keys).await?;
        if !outcome.is_complete() {
            warn!(%kind, file_id, failed = ?outcome.failed, "bulk delete partially failed");
            return Err(FileError::PartialDeleteFailure {
                deleted: outcome.deleted.len(),
                failed: outcome.failed.into_iter().map(|(key, _)| key).collect(),
            });
        }
        info!(%kind, file_id, removed = keys.len(), "deleted {}", prefix);
        Ok(())
    }

    /// Find the kind holding `file_id` and return its metadata document.
    pub async fn describe(&self, file_id: &str) -> FileResult<FileDocument> {
        let kind = self.allocator.find_kind(file_id).await?;
        self.metadata.load(kind, file_id).await
    }

    /// Delete an upload without knowing its kind up front.
    pub async fn delete_by_id(&self, file_id: &str) -> FileResult<FileKind> {
        let kind = self.allocator.find_kind(file_id).await?;
        self.delete(kind, file_id).await?;
        Ok(kind)
    }

    pub async fn find_kind(&self, file_id: &str) -> FileResult<FileKind> {
        self.allocator.find_kind(file_id).await
    }

    /// Raw blob by full store key.
    pub async fn fetch(&self, key: &str) -> FileResult<Blob> {
        self.store
            .get(key)
            .await?
            .ok_or_else(|| FileError::NotFound(format!("object `{}`", key)))
    }

    pub async fn ping(&self) -> FileResult<()> {
        Ok(self.store.ping().await?)
    }
}
