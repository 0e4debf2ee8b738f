//! Core data models for the upload gateway.
//!
//! `FileKind` names the top-level namespace an upload lands in, `FileDocument`
//! is the JSON sidecar stored next to every upload, and `StoredObject` is the
//! row the local backend keeps per blob.

pub mod document;
pub mod file_kind;
pub mod object;
