//! Purpose: Shared config-directory and alias validation helpers.
//! Exports: `default_config_dir`, `registry_path`, `validate_alias`.
//! Role: Keep CLI and library registry-location semantics aligned from one source.
//! Invariants: Default config directory remains `~/.objadm` unless `OBJADM_CONFIG_DIR` is set.
//! Invariants: Aliases are non-empty and contain no whitespace or path separators.

use std::path::{Path, PathBuf};

pub const CONFIG_DIR_ENV: &str = "OBJADM_CONFIG_DIR";
pub const REGISTRY_FILE_NAME: &str = "hosts.json";

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AliasError {
    Empty,
    ContainsPathSeparator,
    ContainsWhitespace,
}

impl AliasError {
    pub fn message(self) -> &'static str {
        match self {
            AliasError::Empty => "alias must not be empty",
            AliasError::ContainsPathSeparator => "alias must not contain path separators",
            AliasError::ContainsWhitespace => "alias must not contain whitespace",
        }
    }
}

pub fn default_config_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|dir| !dir.is_empty()) {
        return PathBuf::from(dir);
    }
    let home = std::env::var_os("HOME").unwrap_or_default();
    PathBuf::from(home).join(".objadm")
}

pub fn registry_path(config_dir: &Path) -> PathBuf {
    config_dir.join(REGISTRY_FILE_NAME)
}

pub fn validate_alias(alias: &str) -> Result<(), AliasError> {
    if alias.is_empty() {
        return Err(AliasError::Empty);
    }
    if alias.contains('/') || alias.contains('\\') {
        return Err(AliasError::ContainsPathSeparator);
    }
    if alias.chars().any(char::is_whitespace) {
        return Err(AliasError::ContainsWhitespace);
    }
    Ok(())
}
