//! Errors for local interactions that are rejected before any write.

use thiserror::Error;

/// An interaction the engine refused.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InteractionError {
    #[error("Point ({x:.1}, {y:.1}) is outside the map")]
    OutOfBounds { x: f64, y: f64 },
    #[error("Not permitted: {0}")]
    NotPermitted(String),
    #[error("No active map")]
    NoActiveMap,
    #[error("No gesture in progress")]
    NoActiveGesture,
}

/// Result type for interactions.
pub type InteractionResult<T> = Result<T, InteractionError>;
