pub mod loader;
pub mod schema;

pub use loader::{
    discover, load_from_path, load_from_str, user_config_path, ConfigError, ConfigOrigin,
    CONFIG_ENV_VAR,
};
pub use schema::{
    ConfirmSection, FailureLogSection, PatchSection, SafePatchConfig, ValidationError,
    ValidationIssue, WorkspaceSection, DEFAULT_MAX_DIFF_BYTES,
};
