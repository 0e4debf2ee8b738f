//! Upload categories and the content-type table that resolves them.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Top-level category of a stored upload. Determines the key namespace.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Images,
    Videos,
    Files,
}

/// Accepted content types and the kind each one is filed under.
const CONTENT_TYPES: [(&str, FileKind); 10] = [
    ("image/jpeg", FileKind::Images),
    ("image/png", FileKind::Images),
    ("image/gif", FileKind::Images),
    ("image/webp", FileKind::Images),
    ("video/mp4", FileKind::Videos),
    ("video/webm", FileKind::Videos),
    ("video/quicktime", FileKind::Videos),
    ("application/pdf", FileKind::Files),
    ("text/plain", FileKind::Files),
    ("application/zip", FileKind::Files),
];

impl FileKind {
    /// Every kind, in the order lookups by bare identifier probe them.
    pub const ALL: [FileKind; 3] = [FileKind::Images, FileKind::Videos, FileKind::Files];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Images => "images",
            FileKind::Videos => "videos",
            FileKind::Files => "files",
        }
    }

    /// Resolve a content type such as `image/png; charset=binary` to its kind.
    ///
    /// Parameters after `;` are ignored and the comparison is case-insensitive.
    /// Returns `None` for types outside the table.
    pub fn from_content_type(content_type: &str) -> Option<FileKind> {
        let essence = content_type.split(';').next().unwrap_or("").trim();
        CONTENT_TYPES
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(essence))
            .map(|(_, kind)| *kind)
    }

    pub fn supported_content_types() -> impl Iterator<Item = &'static str> {
        CONTENT_TYPES.iter().map(|(ct, _)| *ct)
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FileKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown file kind `{}`", s))
    }
}
