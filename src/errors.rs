use thiserror::Error;

use crate::llm::ModelError;

/// Errors emitted by the mission core.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Page capture failed after the bounded retry budget.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// A model collaborator call failed with a typed error.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// The answer POST could not be delivered or produced no readable body.
    #[error("submission failed: {0}")]
    Submission(String),

    /// Configuration was missing or malformed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Mission workspace could not be prepared.
    #[error("workspace error: {0}")]
    Workspace(String),
}

impl AgentError {
    pub fn navigation(message: impl Into<String>) -> Self {
        Self::Navigation(message.into())
    }

    pub fn submission(message: impl Into<String>) -> Self {
        Self::Submission(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn workspace(message: impl Into<String>) -> Self {
        Self::Workspace(message.into())
    }
}
