//! Error types for the notification feed.

use crate::types::NotificationId;
use thiserror::Error;

/// Main error type for feed and repository operations.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Notification not found: {0}")]
    NotificationNotFound(NotificationId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid repository format: {0}")]
    InvalidFormat(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Repository is locked by another process")]
    Locked,

    #[error("Repository not initialized")]
    NotInitialized,
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self {
        FeedError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for FeedError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        FeedError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for FeedError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        FeedError::Deserialization(e.to_string())
    }
}

/// Result type for feed operations.
pub type Result<T> = std::result::Result<T, FeedError>;
