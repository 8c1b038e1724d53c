//! Transitions: deliberate overlaps between adjacent clips on one track.
//!
//! Applying a transition pulls the incoming clip B back over the tail of the
//! outgoing clip A and records a shared [`TransitionRef`] id on
//! `A.transition_out` and `B.transition_in`. The compositor blends the
//! overlap; no keyframes are involved.

use std::collections::HashSet;

use tracing::debug;

use ms_project::TransitionRef;
use ms_timeline_eval::TransitionKind;

use crate::error::{TimelineError, TimelineResult};
use crate::positioning::{is_slot_free, trim_overlapping_clips};
use crate::state::TimelineState;
use crate::types::{new_id, TIME_EPSILON};

fn invalid(reason: impl Into<String>) -> TimelineError {
    TimelineError::InvalidTransition {
        reason: reason.into(),
    }
}

/// Clear every reference to `transition_id` without moving any clip.
/// Returns whether anything was attached.
pub fn detach_transition(state: &mut TimelineState, transition_id: &str) -> bool {
    let mut found = false;
    for clip in &mut state.clips {
        if clip.transition_in.as_ref().is_some_and(|t| t.id == transition_id) {
            clip.transition_in = None;
            found = true;
        }
        if clip.transition_out.as_ref().is_some_and(|t| t.id == transition_id) {
            clip.transition_out = None;
            found = true;
        }
    }
    found
}

/// Detach both transitions of a clip (and their other sides).
pub fn clear_clip_transitions(state: &mut TimelineState, clip_id: &str) -> TimelineResult<()> {
    let ids: Vec<String> = state
        .require_clip(clip_id)?
        .transition_ids()
        .map(str::to_string)
        .collect();
    for id in ids {
        detach_transition(state, &id);
    }
    Ok(())
}

/// Join `clip_a` (outgoing) and `clip_b` (incoming) with a transition.
///
/// Both clips must share a track and B must start at or after A's end. The
/// duration (kind default when `None`) is clamped to the kind's limits and
/// to both clip durations; B then moves to `A.end - duration`. B's linked
/// partner moves by the same amount: if it sat right after A's partner the
/// partners get the same transition, otherwise whatever it now covers is
/// trimmed. Returns the transition id.
pub fn apply_transition(
    state: &mut TimelineState,
    clip_a: &str,
    clip_b: &str,
    kind: TransitionKind,
    duration: Option<f64>,
) -> TimelineResult<String> {
    if clip_a == clip_b {
        return Err(invalid("a clip cannot transition into itself"));
    }
    let a = state.require_clip(clip_a)?;
    let b = state.require_clip(clip_b)?;
    if a.track_id != b.track_id {
        return Err(invalid(format!("{clip_a} and {clip_b} are on different tracks")));
    }
    if b.start_time < a.end_time() - TIME_EPSILON {
        return Err(invalid(format!("{clip_b} starts before {clip_a} ends")));
    }
    state.ensure_track_unlocked(&a.track_id)?;

    let requested = duration.unwrap_or(kind.definition().default_duration);
    let duration = kind.clamp_duration(requested, a.duration, b.duration);
    if duration <= TIME_EPSILON {
        return Err(invalid("clips are too short for a transition"));
    }

    let track_id = a.track_id.clone();
    let new_start = (a.end_time() - duration).max(0.0);
    let delta = new_start - b.start_time;
    let b_duration = b.duration;
    let a_partner = a.linked_clip_id.clone();
    let b_partner = b.linked_clip_id.clone();
    let replaced: Vec<String> = a
        .transition_out
        .iter()
        .chain(b.transition_in.iter())
        .map(|t| t.id.clone())
        .collect();

    if !is_slot_free(state, &track_id, new_start, b_duration, &[clip_a, clip_b]) {
        return Err(invalid(format!("another clip lies between {clip_a} and {clip_b}")));
    }

    for id in &replaced {
        detach_transition(state, id);
    }

    let id = new_id("transition");
    state.require_clip_mut(clip_b)?.start_time = new_start;
    link_pair(state, clip_a, clip_b, &id, kind, duration)?;

    if let Some(bp) = b_partner.filter(|bp| bp != clip_a) {
        move_incoming_partner(state, &id, kind, duration, a_partner.as_deref(), &bp, delta)?;
    }

    debug!(transition_id = %id, clip_a, clip_b, %kind, duration, "Transition applied");
    Ok(id)
}

fn link_pair(
    state: &mut TimelineState,
    clip_a: &str,
    clip_b: &str,
    id: &str,
    kind: TransitionKind,
    duration: f64,
) -> TimelineResult<()> {
    state.require_clip_mut(clip_a)?.transition_out = Some(TransitionRef {
        id: id.to_string(),
        kind,
        duration,
        linked_clip_id: clip_b.to_string(),
    });
    state.require_clip_mut(clip_b)?.transition_in = Some(TransitionRef {
        id: id.to_string(),
        kind,
        duration,
        linked_clip_id: clip_a.to_string(),
    });
    Ok(())
}

fn move_incoming_partner(
    state: &mut TimelineState,
    id: &str,
    kind: TransitionKind,
    duration: f64,
    a_partner: Option<&str>,
    b_partner: &str,
    delta: f64,
) -> TimelineResult<()> {
    let partner = state.require_clip(b_partner)?;
    let old_start = partner.start_time;
    let new_start = (old_start + delta).max(0.0);
    let track_id = partner.track_id.clone();
    let partner_duration = partner.duration;
    let partner_old_transition = partner.transition_in.as_ref().map(|t| t.id.clone());

    let outgoing = a_partner
        .and_then(|ap| state.clip(ap))
        .filter(|ap| ap.track_id == track_id);
    let adjacent = outgoing.is_some_and(|ap| (ap.end_time() - old_start).abs() < TIME_EPSILON);
    if !adjacent && outgoing.is_some_and(|ap| ap.overlaps(new_start, new_start + partner_duration)) {
        return Err(invalid(format!("linked clip {b_partner} has no room to follow")));
    }
    let outgoing = outgoing.map(|ap| {
        (
            ap.id.clone(),
            ap.duration,
            ap.transition_out.as_ref().map(|t| t.id.clone()),
        )
    });

    state.require_clip_mut(b_partner)?.start_time = new_start;

    match outgoing {
        Some((ap, ap_duration, ap_old_transition)) if adjacent => {
            for old in ap_old_transition.iter().chain(partner_old_transition.iter()) {
                detach_transition(state, old);
            }
            let partner_transition = duration.min(ap_duration).min(partner_duration);
            link_pair(state, &ap, b_partner, id, kind, partner_transition)?;
        }
        _ => {
            trim_overlapping_clips(state, b_partner, new_start, &track_id, partner_duration, &[])?;
        }
    }
    Ok(())
}

/// Remove a transition by id. Every incoming side moves back to the end of
/// its outgoing clip, linked partners follow, and anything the restored
/// clips now cover is trimmed.
pub fn remove_transition(state: &mut TimelineState, transition_id: &str) -> TimelineResult<()> {
    let pairs: Vec<(String, String)> = state
        .clips
        .iter()
        .filter_map(|c| {
            c.transition_out
                .as_ref()
                .filter(|t| t.id == transition_id)
                .map(|t| (c.id.clone(), t.linked_clip_id.clone()))
        })
        .collect();
    if pairs.is_empty() {
        return Err(TimelineError::TransitionNotFound {
            transition_id: transition_id.to_string(),
        });
    }
    detach_transition(state, transition_id);

    let mut moved: Vec<(String, f64)> = Vec::new();
    for (a, b) in &pairs {
        let a_end = state.require_clip(a)?.end_time();
        let incoming = state.require_clip_mut(b)?;
        moved.push((b.clone(), a_end - incoming.start_time));
        incoming.start_time = a_end;
    }

    let paired: HashSet<&str> = pairs
        .iter()
        .flat_map(|(a, b)| [a.as_str(), b.as_str()])
        .collect();
    let followers: Vec<(String, f64)> = moved
        .iter()
        .filter_map(|(b, delta)| {
            state
                .clip(b)
                .and_then(|c| c.linked_clip_id.clone())
                .filter(|p| !paired.contains(p.as_str()))
                .map(|p| (p, *delta))
        })
        .collect();
    for (partner, delta) in &followers {
        let clip = state.require_clip_mut(partner)?;
        clip.start_time = (clip.start_time + delta).max(0.0);
    }

    let shifted: Vec<String> = moved
        .iter()
        .chain(followers.iter())
        .map(|(id, _)| id.clone())
        .collect();
    let mut exclude: Vec<String> = paired.iter().map(|s| s.to_string()).collect();
    exclude.extend(shifted.iter().cloned());
    for id in &shifted {
        let Some(clip) = state.clip(id) else {
            continue;
        };
        let (start, track_id, duration) = (clip.start_time, clip.track_id.clone(), clip.duration);
        trim_overlapping_clips(state, id, start, &track_id, duration, &exclude)?;
    }

    debug!(transition_id, "Transition removed");
    Ok(())
}
