//! Compressed, self-describing document files.
//!
//! Every file written by Personae is a gzip-compressed JSON envelope:
//!
//! ```text
//! { "format_version": 1, "kind": "character", "body": { ... } }
//! ```
//!
//! The `kind` tag lets a reader reject a file that was copied into the
//! wrong directory, and `format_version` lets a reader reject documents
//! written by a newer release.
//!
//! Writes go to a sibling `.tmp` file which is then renamed over the
//! target, so a crash mid-write never leaves a truncated document behind.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::DbError;

/// Current on-disk document format version.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    format_version: u32,
    kind: &'a str,
    body: &'a T,
}

#[derive(Deserialize)]
struct Envelope<T> {
    format_version: u32,
    kind: String,
    body: T,
}

/// Encode `body` into compressed envelope bytes.
///
/// # Errors
///
/// Returns [`DbError::Serialization`] if `body` cannot be serialized, or
/// [`DbError::Io`] if compression fails.
pub fn encode<T: Serialize>(kind: &str, body: &T) -> Result<Vec<u8>, DbError> {
    let envelope = EnvelopeRef {
        format_version: FORMAT_VERSION,
        kind,
        body,
    };
    let json = serde_json::to_vec(&envelope)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&json)
        .map_err(|e| DbError::io("<memory>", e))?;
    encoder.finish().map_err(|e| DbError::io("<memory>", e))
}

/// Decode compressed envelope bytes read from `path`.
///
/// # Errors
///
/// Returns [`DbError::Io`] if the bytes are not valid gzip,
/// [`DbError::Serialization`] if the JSON is malformed, or
/// [`DbError::Format`] if the kind or version does not match.
pub fn decode<T: DeserializeOwned>(kind: &str, bytes: &[u8], path: &Path) -> Result<T, DbError> {
    let mut json = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut json)
        .map_err(|e| DbError::io(path, e))?;
    let envelope: Envelope<T> = serde_json::from_slice(&json)?;
    if envelope.kind != kind {
        return Err(DbError::Format {
            path: path.to_path_buf(),
            reason: format!("expected kind `{kind}`, found `{}`", envelope.kind),
        });
    }
    if envelope.format_version > FORMAT_VERSION {
        return Err(DbError::Format {
            path: path.to_path_buf(),
            reason: format!(
                "format version {} is newer than supported version {FORMAT_VERSION}",
                envelope.format_version
            ),
        });
    }
    Ok(envelope.body)
}

/// Atomically write `body` as a `kind` document at `path`.
///
/// Parent directories are created as needed.
///
/// # Errors
///
/// Returns [`DbError`] if encoding or any filesystem step fails. On
/// failure the previous file at `path`, if any, is left untouched.
pub fn write_document<T: Serialize>(path: &Path, kind: &str, body: &T) -> Result<(), DbError> {
    let bytes = encode(kind, body)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| DbError::io(parent, e))?;
    }

    let tmp = temp_path(path);
    let write_tmp = || -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()
    };
    if let Err(e) = write_tmp() {
        let _ = fs::remove_file(&tmp);
        return Err(DbError::io(&tmp, e));
    }

    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        DbError::io(path, e)
    })
}

/// Read a `kind` document from `path`.
///
/// Returns `Ok(None)` when the file does not exist.
///
/// # Errors
///
/// Returns [`DbError`] if the file exists but cannot be read or decoded.
pub fn read_document<T: DeserializeOwned>(path: &Path, kind: &str) -> Result<Option<T>, DbError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(DbError::io(path, e)),
    };
    decode(kind, &bytes, path).map(Some)
}

/// Remove the document at `path`.
///
/// Returns `Ok(())` when the file was already absent.
///
/// # Errors
///
/// Returns [`DbError::Io`] if removal fails for any other reason.
pub fn remove_document(path: &Path) -> Result<(), DbError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DbError::io(path, e)),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(ToOwned::to_owned).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    #[test]
    fn write_then_read_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("doc.dat");
        let body = json!({"name": "Aria", "slots": [1, 2, 3]});

        write_document(&path, "test", &body).unwrap();
        let read: Option<Value> = read_document(&path, "test").unwrap();
        assert_eq!(read, Some(body));
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let read: Option<Value> = read_document(&dir.path().join("absent.dat"), "test").unwrap();
        assert!(read.is_none());
    }

    #[test]
    fn garbage_bytes_are_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.dat");
        fs::write(&path, b"definitely not gzip").unwrap();
        assert!(read_document::<Value>(&path, "test").is_err());
    }

    #[test]
    fn wrong_kind_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.dat");
        write_document(&path, "player", &json!({})).unwrap();
        let err = read_document::<Value>(&path, "character").unwrap_err();
        assert!(matches!(err, DbError::Format { .. }));
    }

    #[test]
    fn newer_format_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.dat");
        let json = serde_json::to_vec(&json!({
            "format_version": FORMAT_VERSION + 1,
            "kind": "test",
            "body": {},
        }))
        .unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json).unwrap();
        fs::write(&path, encoder.finish().unwrap()).unwrap();

        let err = read_document::<Value>(&path, "test").unwrap_err();
        assert!(matches!(err, DbError::Format { .. }));
    }

    #[test]
    fn encoded_documents_are_compressed() {
        let body = json!({"padding": "x".repeat(4096)});
        let bytes = encode("test", &body).unwrap();
        assert!(bytes.len() < 4096);
    }

    #[test]
    fn remove_missing_document_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        assert!(remove_document(&dir.path().join("gone.dat")).is_ok());
    }
}
