//! The JSON sidecar stored at `{kind}/{file_id}/metadata.json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Size, content type and modification time of one stored blob, as reported
/// by the backend after a write.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ObjectStat {
    pub size: u64,
    pub content_type: String,
    pub last_modified: DateTime<Utc>,
}

/// Metadata for one derived artifact (e.g. a crop).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct VariantInfo {
    pub url: String,
    pub size: u64,
    pub content_type: String,
    pub last_modified: DateTime<Utc>,
}

/// `variant kind -> variant key -> info`, e.g. `crop -> 100x100_offset0x0 -> {..}`.
pub type VariantTree = BTreeMap<String, BTreeMap<String, VariantInfo>>;

/// Everything the gateway knows about one upload and its variants.
///
/// The whole document is rewritten on every change; there are no partial updates.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FileDocument {
    pub url: String,
    pub file_id: String,
    pub filename: String,
    /// Stat of the origin blob.
    pub metadata: ObjectStat,
    #[serde(default)]
    pub variants: VariantTree,
}

impl FileDocument {
    pub fn new(url: String, file_id: String, filename: String, metadata: ObjectStat) -> Self {
        Self {
            url,
            file_id,
            filename,
            metadata,
            variants: VariantTree::new(),
        }
    }

    /// Insert or replace one variant entry. Other entries are left alone.
    pub fn set_variant(&mut self, variant_kind: &str, variant_key: &str, info: VariantInfo) {
        self.variants
            .entry(variant_kind.to_string())
            .or_default()
            .insert(variant_key.to_string(), info);
    }

    pub fn variant(&self, variant_kind: &str, variant_key: &str) -> Option<&VariantInfo> {
        self.variants.get(variant_kind)?.get(variant_key)
    }
}
