use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Confines edits to a workspace root and keeps them out of forbidden sub-paths.
#[derive(Debug, Clone)]
pub struct WorkspaceGuard {
    /// Absolute, canonical path to workspace root
    workspace_root: PathBuf,
    /// Forbidden directories, absolute (not necessarily existing)
    forbidden_paths: Vec<PathBuf>,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("Path is outside workspace: {path} (workspace: {workspace})")]
    OutsideWorkspace { path: PathBuf, workspace: PathBuf },

    #[error("Path is in forbidden directory: {path} (forbidden: {forbidden})")]
    ForbiddenPath { path: PathBuf, forbidden: PathBuf },

    #[error("Path escapes through '..' after a missing directory: {0}")]
    UnresolvableParent(PathBuf),

    #[error("Failed to canonicalize {path}: {source}")]
    Canonicalize { path: PathBuf, source: io::Error },
}

impl WorkspaceGuard {
    /// Create a guard for `workspace_root`. Relative `forbidden` entries are
    /// resolved against the root.
    pub fn new(
        workspace_root: impl AsRef<Path>,
        forbidden: &[PathBuf],
    ) -> Result<Self, SafetyError> {
        let root = workspace_root.as_ref();
        let workspace_root = root.canonicalize().map_err(|source| SafetyError::Canonicalize {
            path: root.to_path_buf(),
            source,
        })?;

        let forbidden_paths = forbidden
            .iter()
            .map(|entry| {
                let absolute = if entry.is_absolute() {
                    entry.clone()
                } else {
                    workspace_root.join(entry)
                };
                absolute.canonicalize().unwrap_or(absolute)
            })
            .collect();

        Ok(Self {
            workspace_root,
            forbidden_paths,
        })
    }

    /// Check if a path is safe to edit.
    ///
    /// Returns the resolved absolute path. Files that do not exist yet are
    /// resolved through their nearest existing ancestor, so symlinked parents
    /// cannot smuggle a new file out of the workspace.
    pub fn validate_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let path = path.as_ref();

        // Resolve relative paths against workspace root
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        };

        let resolved = resolve_existing_prefix(&absolute)?;
        self.check_resolved(&resolved)?;
        Ok(resolved)
    }

    fn check_resolved(&self, resolved: &Path) -> Result<(), SafetyError> {
        if !resolved.starts_with(&self.workspace_root) {
            return Err(SafetyError::OutsideWorkspace {
                path: resolved.to_path_buf(),
                workspace: self.workspace_root.clone(),
            });
        }

        for forbidden in &self.forbidden_paths {
            if resolved.starts_with(forbidden) {
                return Err(SafetyError::ForbiddenPath {
                    path: resolved.to_path_buf(),
                    forbidden: forbidden.clone(),
                });
            }
        }

        Ok(())
    }

    /// Get the workspace root.
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }
}

/// Canonicalize the longest existing prefix of `absolute` and re-append the rest.
fn resolve_existing_prefix(absolute: &Path) -> Result<PathBuf, SafetyError> {
    let mut existing = absolute.to_path_buf();
    let mut missing = Vec::new();

    loop {
        match existing.canonicalize() {
            Ok(canonical) => {
                let mut resolved = canonical;
                for component in missing.iter().rev() {
                    resolved.push(component);
                }
                return Ok(resolved);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let name = match existing.components().next_back() {
                    Some(Component::Normal(name)) => name.to_os_string(),
                    Some(Component::CurDir) => {
                        existing.pop();
                        continue;
                    }
                    Some(Component::ParentDir) => {
                        return Err(SafetyError::UnresolvableParent(absolute.to_path_buf()));
                    }
                    _ => {
                        return Err(SafetyError::Canonicalize {
                            path: absolute.to_path_buf(),
                            source: e,
                        });
                    }
                };
                missing.push(name);
                existing.pop();
            }
            Err(source) => {
                return Err(SafetyError::Canonicalize {
                    path: absolute.to_path_buf(),
                    source,
                });
            }
        }
    }
}
