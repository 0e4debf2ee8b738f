//! Store key layout.
//!
//! Every blob belonging to one upload lives under `{kind}/{file_id}/`:
//!
//! ```text
//! images/{file_id}/metadata.json
//! images/{file_id}/origin/{filename}
//! images/{file_id}/crop/{W}x{H}/offset{X}x{Y}/{filename}
//! ```
//!
//! Keeping the sidecar inside the identifier prefix means a single prefix
//! delete removes the origin, every variant and the metadata together.

use crate::{
    errors::{FileError, FileResult},
    models::file_kind::FileKind,
};

pub const SEPARATOR: char = '/';
pub const ORIGIN_SEGMENT: &str = "origin";
pub const METADATA_FILENAME: &str = "metadata.json";

/// Validate one key component: non-empty, no separator, not `.` or `..`.
fn ensure_component(what: &str, value: &str) -> FileResult<()> {
    if value.is_empty() {
        return Err(FileError::InvalidInput(format!("{} must not be empty", what)));
    }
    if value.contains(SEPARATOR) {
        return Err(FileError::InvalidInput(format!(
            "{} `{}` must not contain `{}`",
            what, value, SEPARATOR
        )));
    }
    if value == "." || value == ".." {
        return Err(FileError::InvalidInput(format!("{} `{}` is reserved", what, value)));
    }
    Ok(())
}

/// `{kind}/` — every upload of one kind.
pub fn kind_prefix(kind: FileKind) -> String {
    format!("{}{}", kind.as_str(), SEPARATOR)
}

/// `{kind}/{file_id}/` — every blob of one upload, metadata included.
pub fn object_prefix(kind: FileKind, file_id: &str) -> FileResult<String> {
    ensure_component("identifier", file_id)?;
    Ok(format!("{}{}{}", kind_prefix(kind), file_id, SEPARATOR))
}

/// `{kind}/{file_id}/{variant_kind}/` — every variant of one kind, e.g. all crops.
pub fn variant_prefix(kind: FileKind, file_id: &str, variant_kind: &str) -> FileResult<String> {
    ensure_component("variant kind", variant_kind)?;
    Ok(format!("{}{}{}", object_prefix(kind, file_id)?, variant_kind, SEPARATOR))
}

fn push_segments<S: AsRef<str>>(key: &mut String, segments: &[S]) -> FileResult<()> {
    for segment in segments {
        let segment = segment.as_ref();
        ensure_component("path segment", segment)?;
        key.push_str(segment);
        key.push(SEPARATOR);
    }
    Ok(())
}

/// Build `{kind}/{file_id}/{segments...}/{filename}`.
pub fn encode<S: AsRef<str>>(
    kind: FileKind,
    file_id: &str,
    segments: &[S],
    filename: &str,
) -> FileResult<String> {
    ensure_component("filename", filename)?;
    let mut key = object_prefix(kind, file_id)?;
    push_segments(&mut key, segments)?;
    key.push_str(filename);
    Ok(key)
}

/// Build `{kind}/{file_id}/{variant_kind}/{params...}/{filename}`.
pub fn variant_blob_key<S: AsRef<str>>(
    kind: FileKind,
    file_id: &str,
    variant_kind: &str,
    params: &[S],
    filename: &str,
) -> FileResult<String> {
    ensure_component("filename", filename)?;
    let mut key = variant_prefix(kind, file_id, variant_kind)?;
    push_segments(&mut key, params)?;
    key.push_str(filename);
    Ok(key)
}

pub fn origin_key(kind: FileKind, file_id: &str, filename: &str) -> FileResult<String> {
    encode(kind, file_id, &[ORIGIN_SEGMENT], filename)
}

/// `{kind}/{file_id}/metadata.json`
pub fn metadata_key(kind: FileKind, file_id: &str) -> FileResult<String> {
    encode::<&str>(kind, file_id, &[], METADATA_FILENAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_origin_and_crop_keys() {
        assert_eq!(
            origin_key(FileKind::Images, "abc", "cat.png").unwrap(),
            "images/abc/origin/cat.png"
        );
        assert_eq!(
            encode(FileKind::Images, "abc", &["crop", "100x50", "offset0x10"], "cat.png").unwrap(),
            "images/abc/crop/100x50/offset0x10/cat.png"
        );
        assert_eq!(
            metadata_key(FileKind::Videos, "abc").unwrap(),
            "videos/abc/metadata.json"
        );
    }

    #[test]
    fn encoded_keys_fall_under_their_prefixes() {
        let cases: [(FileKind, &str, Vec<&str>, &str); 3] = [
            (FileKind::Images, "id-1", vec!["origin"], "a.jpg"),
            (FileKind::Videos, "id-2", vec!["crop", "1x1", "offset0x0"], "b.mp4"),
            (FileKind::Files, "id-3", vec![], "c.pdf"),
        ];
        for (kind, id, segments, filename) in cases {
            let key = encode(kind, id, &segments, filename).unwrap();
            let prefix = object_prefix(kind, id).unwrap();
            assert!(key.starts_with(&prefix), "{} under {}", key, prefix);
            assert!(key.ends_with(&format!("/{}", filename)));
            assert!(!key.starts_with(SEPARATOR));
        }

        let crop = variant_blob_key(FileKind::Images, "id", "crop", &["2x2", "offset1x1"], "x.png")
            .unwrap();
        assert_eq!(
            crop,
            encode(FileKind::Images, "id", &["crop", "2x2", "offset1x1"], "x.png").unwrap()
        );
        assert!(crop.starts_with(&variant_prefix(FileKind::Images, "id", "crop").unwrap()));
        assert!(variant_blob_key(FileKind::Images, "id", "crop/x", &["1x1"], "x.png").is_err());
    }

    #[test]
    fn rejects_separator_in_identifier_or_filename() {
        assert!(matches!(
            origin_key(FileKind::Images, "a/b", "x.png"),
            Err(FileError::InvalidInput(_))
        ));
        assert!(matches!(
            origin_key(FileKind::Images, "ab", "dir/x.png"),
            Err(FileError::InvalidInput(_))
        ));
        assert!(origin_key(FileKind::Images, "", "x.png").is_err());
        assert!(origin_key(FileKind::Images, "ab", "..").is_err());
        assert!(encode(FileKind::Images, "ab", &["cr/op"], "x.png").is_err());
    }
}
