//! Error types for timeline store actions.

use ms_common::{MediaKind, TrackType};
use ms_project::ProjectError;
use ms_timeline_eval::EvalError;

/// Errors raised by timeline store actions.
///
/// The store facade never surfaces these to callers: a failed action is
/// rolled back, logged at `warn!`, and reported as a no-op.
#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    #[error("track not found: {track_id}")]
    TrackNotFound { track_id: String },

    #[error("clip not found: {clip_id}")]
    ClipNotFound { clip_id: String },

    #[error("keyframe not found: {keyframe_id}")]
    KeyframeNotFound { keyframe_id: String },

    #[error("marker not found: {marker_id}")]
    MarkerNotFound { marker_id: String },

    #[error("effect {effect_id} not found on clip {clip_id}")]
    EffectNotFound { clip_id: String, effect_id: String },

    #[error("mask {mask_id} not found on clip {clip_id}")]
    MaskNotFound { clip_id: String, mask_id: String },

    #[error("linked group not found: {group_id}")]
    GroupNotFound { group_id: String },

    #[error("composition not registered: {composition_id}")]
    CompositionNotFound { composition_id: String },

    #[error("transition not found: {transition_id}")]
    TransitionNotFound { transition_id: String },

    #[error("{kind} clips cannot be placed on {track_type} track {track_id}")]
    WrongTrackType {
        kind: MediaKind,
        track_type: TrackType,
        track_id: String,
    },

    #[error("track {track_id} is locked")]
    TrackLocked { track_id: String },

    #[error("split time {time:.3}s is outside clip {clip_id}")]
    SplitOutOfBounds { clip_id: String, time: f64 },

    #[error("{id} cannot be its own parent")]
    SelfParent { id: String },

    #[error("parenting {id} to {parent_id} would create a cycle")]
    ParentCycle { id: String, parent_id: String },

    #[error("no free space on track {track_id}")]
    NoFreeSpace { track_id: String },

    #[error("invalid trim of clip {clip_id}: {reason}")]
    InvalidTrim { clip_id: String, reason: String },

    #[error("invalid transition: {reason}")]
    InvalidTransition { reason: String },

    #[error("invalid property {property} for clip {clip_id}")]
    InvalidProperty { clip_id: String, property: String },

    #[error("invalid operation: {reason}")]
    InvalidOperation { reason: String },

    #[error("clipboard is empty")]
    EmptyClipboard,

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Project(#[from] ProjectError),
}

impl TimelineError {
    pub(crate) fn clip(clip_id: &str) -> Self {
        Self::ClipNotFound {
            clip_id: clip_id.to_string(),
        }
    }

    pub(crate) fn track(track_id: &str) -> Self {
        Self::TrackNotFound {
            track_id: track_id.to_string(),
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidOperation {
            reason: reason.into(),
        }
    }
}

/// Convenience result type for timeline store operations.
pub type TimelineResult<T> = Result<T, TimelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_ids() {
        let err = TimelineError::clip("clip-7");
        assert_eq!(err.to_string(), "clip not found: clip-7");

        let err = TimelineError::WrongTrackType {
            kind: MediaKind::Audio,
            track_type: TrackType::Video,
            track_id: "video-1".into(),
        };
        assert_eq!(
            err.to_string(),
            "audio clips cannot be placed on Video track video-1"
        );
    }

    #[test]
    fn eval_errors_convert() {
        let err: TimelineError = EvalError::ClipNotFound {
            clip_id: "x".into(),
        }
        .into();
        assert!(matches!(err, TimelineError::Eval(_)));
    }
}
