//! Versioned, hash-addressed file snapshots.
//!
//! Every read or write that goes through a [`Session`](crate::Session) hands back a
//! [`FileSnapshot`]: the content, its SHA-256 digest, and a version number that is
//! unique within the session. The digest is what callers send back as the
//! precondition for the next mutation.

use crate::edit::EditError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Hex-encoded SHA-256 digest of file content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Digest of `content`'s bytes.
    pub fn of(content: &str) -> Self {
        Self::of_bytes(content.as_bytes())
    }

    pub fn of_bytes(bytes: &[u8]) -> Self {
        ContentHash(hex::encode(Sha256::digest(bytes)))
    }

    /// Digest of the empty string, the precondition for a file that does not exist yet.
    pub fn empty() -> Self {
        Self::of_bytes(b"")
    }

    /// Wrap a caller-supplied hex digest. Case is normalized; the value is not
    /// otherwise validated, so a malformed digest simply never matches.
    pub fn from_hex(hex_digest: impl AsRef<str>) -> Self {
        ContentHash(hex_digest.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check whether `content` hashes to this digest.
    pub fn matches(&self, content: &str) -> bool {
        *self == Self::of(content)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable stamped copy of a file's content at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSnapshot {
    pub path: PathBuf,
    pub version: u64,
    pub content_hash: ContentHash,
    pub content: String,
}

/// Session-scoped monotonic version counter.
///
/// The first call to [`next_version`](Self::next_version) returns 1. Versions are a
/// same-session staleness signal only; a new issuer starts over at 1.
#[derive(Debug, Default)]
pub struct VersionIssuer {
    last: u64,
}

impl VersionIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_version(&mut self) -> u64 {
        self.last += 1;
        self.last
    }

    /// Most recently issued version, or 0 if none has been issued.
    pub fn last_issued(&self) -> u64 {
        self.last
    }

    /// Hash `content` and stamp it with the next version. Consumes one version.
    pub fn stamp(&mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> FileSnapshot {
        let content = content.into();
        FileSnapshot {
            path: path.into(),
            version: self.next_version(),
            content_hash: ContentHash::of(&content),
            content,
        }
    }

    /// Read `path` from disk and stamp it. Content that is not UTF-8 is an
    /// [`EditError::Utf8`], not an I/O error.
    pub fn read_and_stamp(&mut self, path: &Path) -> Result<FileSnapshot, EditError> {
        let bytes = fs::read(path).map_err(|source| EditError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let content = String::from_utf8(bytes).map_err(|e| EditError::Utf8 {
            path: path.to_path_buf(),
            source: e.utf8_error(),
        })?;
        Ok(self.stamp(path, content))
    }
}
