//! `ms-timeline-eval` — Timeline math for the MasterSelects timeline engine.
//!
//! Pure functions over the timeline data model, with no store state:
//!
//! - **Keyframes**: property/easing types and interpolation (linear, hold,
//!   CSS eases, cubic bezier with handles)
//! - **Transforms**: parent-then-child composition and parent-chain resolution
//! - **Speed**: time-stretch durations and keyframed speed integration
//! - **Transitions**: crossfade and dip definitions and opacity weights
//!
//! # Usage
//!
//! ```rust
//! use ms_timeline_eval::{interpolate, AnimatableProperty, Easing, Keyframe};
//!
//! let kfs = vec![
//!     Keyframe::new("a", "clip", AnimatableProperty::Opacity, 0.0, 0.0, Easing::Linear),
//!     Keyframe::new("b", "clip", AnimatableProperty::Opacity, 2.0, 1.0, Easing::Linear),
//! ];
//! let v = interpolate(&kfs, 1.0).unwrap();
//! assert!((v - 0.5).abs() < 1e-9);
//! ```

pub mod error;
pub mod keyframe;
pub mod parent;
pub mod speed;
pub mod transform;
pub mod transition;
pub mod types;

// Re-export primary API
pub use error::{EvalError, EvalResult};
pub use keyframe::{apply_effect_keyframes, apply_keyframes, interpolate, keyframed_properties, value_at};
pub use parent::{resolve_world_transform, ClipPlacement, TransformSource};
pub use speed::{effective_speed, source_offset, source_time, timeline_duration, MIN_SPEED};
pub use transform::compose;
pub use transition::{
    compute_progress, evaluate_transition, find_overlap, TransitionDef, TransitionKind,
    TransitionResult,
};
pub use types::{AnimatableProperty, BezierHandle, Easing, Keyframe};
