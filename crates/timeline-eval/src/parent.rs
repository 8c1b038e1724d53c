//! Parent-chain ("pick-whip") transform resolution.
//!
//! A child is sampled at its own local time; its parent is sampled at the
//! parent-local time that corresponds to the same global instant, and the two
//! are composed parent-then-child. Chains of any length resolve recursively,
//! bounded by a depth guard.

use ms_common::ClipTransform;

use crate::error::{EvalError, EvalResult};
use crate::transform::compose;

/// Placement facts needed to walk a parent chain.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ClipPlacement<'a> {
    pub start_time: f64,
    pub parent_clip_id: Option<&'a str>,
}

/// Read access to clips for parent-chain resolution.
pub trait TransformSource {
    fn placement(&self, clip_id: &str) -> Option<ClipPlacement<'_>>;

    /// The clip's own transform at `local_time`, keyframes applied, no parent.
    fn local_transform(&self, clip_id: &str, local_time: f64) -> Option<ClipTransform>;
}

/// Resolve a clip's transform including every ancestor.
pub fn resolve_world_transform<S: TransformSource + ?Sized>(
    source: &S,
    clip_id: &str,
    local_time: f64,
    max_depth: usize,
) -> EvalResult<ClipTransform> {
    resolve(source, clip_id, local_time, 0, max_depth)
}

fn resolve<S: TransformSource + ?Sized>(
    source: &S,
    clip_id: &str,
    local_time: f64,
    depth: usize,
    max_depth: usize,
) -> EvalResult<ClipTransform> {
    let not_found = || EvalError::ClipNotFound {
        clip_id: clip_id.to_string(),
    };
    let placement = source.placement(clip_id).ok_or_else(not_found)?;
    let local = source
        .local_transform(clip_id, local_time)
        .ok_or_else(not_found)?;

    let Some(parent_id) = placement.parent_clip_id else {
        return Ok(local);
    };
    let Some(parent) = source.placement(parent_id) else {
        tracing::warn!(clip_id, parent_id, "Dangling parent reference, ignoring parent");
        return Ok(local);
    };
    if depth + 1 >= max_depth {
        return Err(EvalError::ParentChainTooDeep {
            clip_id: clip_id.to_string(),
            max_depth,
        });
    }

    let parent_local = placement.start_time + local_time - parent.start_time;
    let parent_world = resolve(source, parent_id, parent_local, depth + 1, max_depth)?;
    Ok(compose(&parent_world, &local))
}
