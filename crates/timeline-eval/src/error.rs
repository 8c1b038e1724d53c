//! Error types for timeline evaluation.

use thiserror::Error;

/// Errors that can occur while evaluating animated or parented clip state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Unknown animatable property: {property}")]
    UnknownProperty { property: String },

    #[error("Clip not found: {clip_id}")]
    ClipNotFound { clip_id: String },

    #[error("Parent chain too deep (max {max_depth}) at clip {clip_id}")]
    ParentChainTooDeep { clip_id: String, max_depth: usize },
}

pub type EvalResult<T> = Result<T, EvalError>;
