//! Error types for thyspace

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpaceError {
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("Location already owned by {owner}")]
    AlreadyOwned { owner: String },

    #[error("Location must be owned to purchase features or change settings")]
    RequiresOwnership,

    #[error("Location is owned by {owner}")]
    NotOwner { owner: String },

    #[error("Feature already purchased: {0}")]
    AlreadyPurchased(String),

    #[error("Invalid feature: {0}")]
    NoSuchFeature(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SpaceError {
    /// Business-rule violations the caller can recover from by changing the request
    pub fn is_rule_violation(&self) -> bool {
        matches!(
            self,
            SpaceError::AlreadyOwned { .. }
                | SpaceError::RequiresOwnership
                | SpaceError::NotOwner { .. }
                | SpaceError::AlreadyPurchased(_)
                | SpaceError::NoSuchFeature(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SpaceError>;
