use crate::config::schema::{SafePatchConfig, ValidationError};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming a config file, consulted after `--config`.
pub const CONFIG_ENV_VAR: &str = "SAFE_PATCH_CONFIG";

/// Sections a config file may contain, listed in parse errors.
const SECTIONS: &str = "[patch], [confirm], [failure_log], [workspace]";

/// How a config file was located.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOrigin {
    /// `--config` on the command line
    Flag,
    /// The `SAFE_PATCH_CONFIG` environment variable
    Env,
    /// `~/.config/safe-patch/config.toml`
    User,
}

impl fmt::Display for ConfigOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigOrigin::Flag => f.write_str("--config"),
            ConfigOrigin::Env => write!(f, "${CONFIG_ENV_VAR}"),
            ConfigOrigin::User => f.write_str("user config"),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        origin: Option<ConfigOrigin>,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        origin: Option<ConfigOrigin>,
        source: toml_edit::de::Error,
    },
    Validation {
        path: Option<PathBuf>,
        origin: Option<ConfigOrigin>,
        source: ValidationError,
    },
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            ConfigError::Toml {
                path: None,
                origin,
                source,
            } => ConfigError::Toml {
                path: Some(path),
                origin,
                source,
            },
            ConfigError::Validation {
                path: None,
                origin,
                source,
            } => ConfigError::Validation {
                path: Some(path),
                origin,
                source,
            },
            other => other,
        }
    }

    fn with_origin(mut self, found_via: ConfigOrigin) -> Self {
        match &mut self {
            ConfigError::Io { origin, .. }
            | ConfigError::Toml { origin, .. }
            | ConfigError::Validation { origin, .. } => *origin = Some(found_via),
        }
        self
    }

    /// How the offending file was located, when it came from discovery.
    pub fn origin(&self) -> Option<ConfigOrigin> {
        match self {
            ConfigError::Io { origin, .. }
            | ConfigError::Toml { origin, .. }
            | ConfigError::Validation { origin, .. } => *origin,
        }
    }
}

/// "safe-patch config", "safe-patch config ($SAFE_PATCH_CONFIG)" and so on.
struct Subject<'a>(Option<ConfigOrigin>, Option<&'a Path>);

impl fmt::Display for Subject<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("safe-patch config")?;
        match (self.0, self.1) {
            (Some(origin), Some(path)) => write!(f, " {} (from {origin})", path.display()),
            (None, Some(path)) => write!(f, " {}", path.display()),
            (Some(origin), None) => write!(f, " (from {origin})"),
            (None, None) => Ok(()),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io {
                path,
                origin,
                source,
            } => write!(
                f,
                "cannot read {}: {source}",
                Subject(*origin, Some(path))
            ),
            ConfigError::Toml {
                path,
                origin,
                source,
            } => write!(
                f,
                "{} is not valid (known sections: {SECTIONS}): {source}",
                Subject(*origin, path.as_deref())
            ),
            ConfigError::Validation {
                path,
                origin,
                source,
            } => write!(
                f,
                "{} has invalid values: {source}",
                Subject(*origin, path.as_deref())
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
        }
    }
}

pub fn load_from_str(input: &str) -> Result<SafePatchConfig, ConfigError> {
    let config: SafePatchConfig = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml {
            path: None,
            origin: None,
            source,
        })?;
    config
        .validate()
        .map_err(|source| ConfigError::Validation {
            path: None,
            origin: None,
            source,
        })?;
    Ok(config)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<SafePatchConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        origin: None,
        source,
    })?;
    load_from_str(&contents).map_err(|error| error.with_path(path))
}

/// Per-user config location, `$HOME/.config/safe-patch/config.toml`.
pub fn user_config_path() -> Option<PathBuf> {
    home::home_dir().map(|home| home.join(".config").join("safe-patch").join("config.toml"))
}

/// Find and load the effective configuration.
///
/// Priority order:
/// 1. `explicit` (the `--config` flag); must exist
/// 2. `SAFE_PATCH_CONFIG`; must exist when set
/// 3. The per-user config file, if present
/// 4. Built-in defaults
///
/// Returns the config and the file it came from.
pub fn discover(
    explicit: Option<&Path>,
) -> Result<(SafePatchConfig, Option<PathBuf>), ConfigError> {
    let found = explicit
        .map(|path| (path.to_path_buf(), ConfigOrigin::Flag))
        .or_else(|| {
            env::var_os(CONFIG_ENV_VAR)
                .filter(|v| !v.is_empty())
                .map(|value| (PathBuf::from(value), ConfigOrigin::Env))
        })
        .or_else(|| {
            user_config_path()
                .filter(|p| p.is_file())
                .map(|path| (path, ConfigOrigin::User))
        });

    if let Some((path, origin)) = found {
        debug!(path = %path.display(), %origin, "loading config");
        return load_from_path(&path)
            .map(|config| (config, Some(path)))
            .map_err(|error| error.with_origin(origin));
    }

    debug!("no config file found; using defaults");
    Ok((SafePatchConfig::default(), None))
}
