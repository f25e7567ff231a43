use std::fmt::Debug;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("State Transition Error: {0}")]
    StateTransition(String),

    #[error("Verification Error: {0}")]
    Verification(String),

    #[error("Resource Not Found: {resource_type} with ID {resource_id}")]
    NotFound {
        resource_type: String,
        resource_id: String,
    },

    #[error("Store Error: {0}")]
    Store(String),

    #[error("Timeout Error: {0}")]
    Timeout(String),

    #[error("Serialization Error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Conflict Error: {0}")]
    Conflict(String),

    #[error("Internal Error: {0}")]
    Internal(String),
}

impl Error {
    /// True for errors that indicate a bad migration plan or wiring,
    /// as opposed to a failure encountered while work was underway.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Config(_) | Error::Conflict(_))
    }
}
