//! # AppError
//!
//! Centralized error handling for Agora.
//! Maps domain-specific failures to actionable error types.

use thiserror::Error;

use crate::models::{UserId, VoteTarget};

/// The primary error type for all agora-core operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (e.g., Post, Comment, User)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Validation failure (e.g., empty title, vote with two targets)
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Resource already exists (e.g., duplicate post url)
    #[error("conflict: {0}")]
    Conflict(String),

    /// The voter already has a vote on this target.
    #[error("user {voter} already voted on {target}")]
    DuplicateVote { voter: UserId, target: VoteTarget },

    /// Requester is authenticated but does not own the resource
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Session token missing, expired or forged
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Infrastructure failure (e.g., database locked, I/O)
    #[error("store error: {0}")]
    Store(String),
}

impl AppError {
    pub fn not_found(entity: &str, key: impl ToString) -> Self {
        Self::NotFound(entity.to_string(), key.to_string())
    }

    /// True for every uniqueness violation, duplicate votes included.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::DuplicateVote { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(..))
    }
}

/// A specialized Result type for Agora logic.
pub type Result<T> = std::result::Result<T, AppError>;
