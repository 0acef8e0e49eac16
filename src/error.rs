use thiserror::Error;

use crate::agent::AgentType;

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

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown agent type: {0}")]
    UnknownAgentType(String),

    #[error("Unknown page type: {0}")]
    UnknownPageType(String),

    #[error("Unknown operation {operation} for {agent_type} agent")]
    UnknownOperation {
        agent_type: AgentType,
        operation: String,
    },

    #[error("Failed to construct {agent_type} agent: {reason}")]
    AgentConstruction {
        agent_type: AgentType,
        reason: String,
    },

    #[error("Bridge error: {0}")]
    Bridge(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Bulk operation not found: {0}")]
    OperationNotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;
