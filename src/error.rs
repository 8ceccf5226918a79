use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Inventory not found: {}", .0.display())]
    InventoryNotFound(PathBuf),

    #[error("Inventory parse error at line {line}: {message}")]
    InventoryParse { line: usize, message: String },

    #[error("Invalid host pattern: {0}")]
    Pattern(String),

    #[error("Unknown playbook: {name} (available: {})", .available.join(", "))]
    UnknownPlaybook { name: String, available: Vec<String> },

    #[error("Execution binary not found: {0}")]
    EngineBinaryNotFound(String),

    #[error("Dispatch cancelled")]
    Cancelled,

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, Error>;
