//! Offline artifacts for diffs that did not apply.
//!
//! When a destination is configured, each invalid diff leaves behind the source
//! text it was applied to and the diff itself, as `source_<timestamp>` and
//! `diff_<timestamp>`. Logging is best effort: a failure here is reported through
//! `tracing` and never replaces the invalid-diff result.

use chrono::Utc;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Paths of the two files written for one failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureArtifacts {
    pub source: PathBuf,
    pub diff: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct FailureLogger {
    destination: Option<PathBuf>,
}

impl FailureLogger {
    pub fn new(destination: Option<PathBuf>) -> Self {
        Self { destination }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn destination(&self) -> Option<&Path> {
        self.destination.as_deref()
    }

    /// Persist `source` and `diff` if a destination is configured.
    ///
    /// Returns the written paths, or `None` when disabled or when writing failed.
    pub fn log_failure(&self, source: &str, diff: &str) -> Option<FailureArtifacts> {
        let destination = self.destination.as_deref()?;
        match log_failure(destination, source, diff) {
            Ok(artifacts) => {
                info!(
                    source = %artifacts.source.display(),
                    diff = %artifacts.diff.display(),
                    "saved failed diff artifacts"
                );
                Some(artifacts)
            }
            Err(e) => {
                warn!(
                    destination = %destination.display(),
                    "could not save failed diff artifacts: {e}"
                );
                None
            }
        }
    }
}

/// Write `source_<timestamp>` and `diff_<timestamp>` under `path_prefix`.
pub fn log_failure(path_prefix: &Path, source: &str, diff: &str) -> io::Result<FailureArtifacts> {
    fs::create_dir_all(path_prefix)?;

    let timestamp = Utc::now().format("%Y%m%dT%H%M%S%.6fZ").to_string();
    let mut artifacts = artifact_paths(path_prefix, &timestamp, 0);
    let mut attempt = 0;
    while artifacts.source.exists() || artifacts.diff.exists() {
        attempt += 1;
        artifacts = artifact_paths(path_prefix, &timestamp, attempt);
    }

    fs::write(&artifacts.source, source)?;
    fs::write(&artifacts.diff, diff)?;
    Ok(artifacts)
}

fn artifact_paths(dir: &Path, timestamp: &str, attempt: u32) -> FailureArtifacts {
    let suffix = if attempt == 0 {
        timestamp.to_string()
    } else {
        format!("{timestamp}-{attempt}")
    };
    FailureArtifacts {
        source: dir.join(format!("source_{suffix}")),
        diff: dir.join(format!("diff_{suffix}")),
    }
}
