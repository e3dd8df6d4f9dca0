//! # DomainError
//!
//! Centralized error handling for the roleplay board engine.
//! Every operation returns one of these variants; none of them is meant to
//! escape as a panic or an untyped fault.

use thiserror::Error;

/// The primary error type for all engine operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// No identity, or the identity lacks a required staff capability.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Identity known, but this actor may not act on this resource.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The character does not qualify (e.g. never posted in the thread).
    #[error("ineligible: {0}")]
    Ineligible(String),

    /// State already transitioned (archived twice, claim decided twice, ...)
    #[error("conflict: {0}")]
    Conflict(String),

    /// An open claim already exists for the character/thread pair.
    #[error("duplicate claim for character {character_id} on thread {thread_id}")]
    DuplicateClaim {
        character_id: String,
        thread_id: String,
    },

    /// Malformed request (empty skill selection, unknown ids, kind mismatch)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Referenced entity absent (e.g., Thread, Character, Claim)
    #[error("{entity} not found with ID {id}")]
    NotFound { entity: &'static str, id: String },

    /// Infrastructure failure (e.g., DB down, pool exhausted)
    #[error("storage error: {0}")]
    Storage(String),
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Conflicts are benign races ("already done"), not failures.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::DuplicateClaim { .. })
    }
}

/// A specialized Result type for engine logic.
pub type Result<T> = std::result::Result<T, DomainError>;
