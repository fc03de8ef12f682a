//! Error types for state loading and inventory projection

use thiserror::Error;

/// Errors that can occur while building an inventory
#[derive(Debug, Error)]
pub enum InventoryError {
    /// State stream or file could not be read
    #[error("Failed to read state: {0}")]
    Io(#[from] std::io::Error),

    /// State document is not structurally valid
    #[error("Failed to decode state: {0}")]
    Decode(#[from] serde_json::Error),

    /// Query attempted against an absent state document
    #[error("No state file provided")]
    NoState,

    /// Strict tag policy hit a resource without the expected tag
    #[error("{kind} resource{} is missing tag '{tag}'", .address.as_deref().map(|a| format!(" '{a}'")).unwrap_or_default())]
    MissingTag {
        tag: String,
        kind: String,
        address: Option<String>,
    },

    /// Projection result could not be written
    #[error("Failed to write output: {0}")]
    Output(#[source] std::io::Error),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Remote state fetch failed
    #[error("Remote fetch error: {0}")]
    Remote(String),
}

/// Result type for inventory operations
pub type Result<T> = std::result::Result<T, InventoryError>;
