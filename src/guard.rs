//! Optimistic concurrency guard.
//!
//! A mutation is only permitted when the caller's expected hash equals the hash
//! of what is on disk right now. Nothing here locks: drift introduced between the
//! caller's read and this check is detected, never prevented, and never resolved
//! on the caller's behalf.

use crate::edit::EditError;
use crate::snapshot::ContentHash;
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

/// Result of comparing disk state against an expected hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Disk matches; the caller may mutate
    Match { content: String, existed: bool },
    /// Disk has drifted; the caller must re-read and retry
    Mismatch {
        current_content: String,
        actual: ContentHash,
        existed: bool,
    },
}

impl VerifyOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, VerifyOutcome::Match { .. })
    }

    /// Current disk content, whichever way the check went.
    pub fn content(&self) -> &str {
        match self {
            VerifyOutcome::Match { content, .. } => content,
            VerifyOutcome::Mismatch {
                current_content, ..
            } => current_content,
        }
    }

    pub fn existed(&self) -> bool {
        match self {
            VerifyOutcome::Match { existed, .. } | VerifyOutcome::Mismatch { existed, .. } => {
                *existed
            }
        }
    }
}

/// Read `path`, treating a missing file as empty content.
///
/// Returns the content and whether the file existed.
pub fn read_current(path: &Path) -> Result<(String, bool), EditError> {
    match fs::read(path) {
        Ok(bytes) => {
            let content = String::from_utf8(bytes).map_err(|e| EditError::Utf8 {
                path: path.to_path_buf(),
                source: e.utf8_error(),
            })?;
            Ok((content, true))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok((String::new(), false)),
        Err(source) => Err(EditError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Compare the hash of `path`'s current content with `expected`.
pub fn verify(path: &Path, expected: &ContentHash) -> Result<VerifyOutcome, EditError> {
    let (content, existed) = read_current(path)?;
    let actual = ContentHash::of(&content);

    if actual == *expected {
        debug!(path = %path.display(), hash = %actual, existed, "precondition satisfied");
        Ok(VerifyOutcome::Match { content, existed })
    } else {
        debug!(
            path = %path.display(),
            expected = %expected,
            actual = %actual,
            "precondition failed"
        );
        Ok(VerifyOutcome::Mismatch {
            current_content: content,
            actual,
            existed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        fs::write(&path, "hello\n").unwrap();

        let outcome = verify(&path, &ContentHash::of("hello\n")).unwrap();
        assert!(outcome.is_match());
        assert!(outcome.existed());
        assert_eq!(outcome.content(), "hello\n");
    }

    #[test]
    fn test_one_character_change_is_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        fs::write(&path, "hellp\n").unwrap();

        let outcome = verify(&path, &ContentHash::of("hello\n")).unwrap();
        match outcome {
            VerifyOutcome::Mismatch {
                current_content,
                actual,
                ..
            } => {
                assert_eq!(current_content, "hellp\n");
                assert_eq!(actual, ContentHash::of("hellp\n"));
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_is_empty_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.txt");

        let outcome = verify(&path, &ContentHash::empty()).unwrap();
        assert_eq!(
            outcome,
            VerifyOutcome::Match {
                content: String::new(),
                existed: false
            }
        );

        let outcome = verify(&path, &ContentHash::of("something")).unwrap();
        assert!(!outcome.is_match());
        assert!(!outcome.existed());
    }

    #[test]
    fn test_non_utf8_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bin");
        fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();

        let result = verify(&path, &ContentHash::empty());
        assert!(matches!(result, Err(EditError::Utf8 { .. })));
    }

    #[test]
    fn test_directory_read_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = verify(dir.path(), &ContentHash::empty());
        assert!(matches!(result, Err(EditError::Io { .. })));
    }
}
