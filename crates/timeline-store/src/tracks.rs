//! Track management and effective visibility/audibility resolution.

use tracing::debug;

use ms_common::{TimelineConfig, TrackType};

use crate::clips::remove_clip;
use crate::error::{TimelineError, TimelineResult};
use crate::state::TimelineState;
use crate::types::{new_id, Track};

/// Add a track. Video tracks go on top (index 0, the front layer); audio
/// tracks are appended at the bottom.
pub fn add_track(state: &mut TimelineState, config: &TimelineConfig, track_type: TrackType) -> String {
    let number = state
        .tracks
        .iter()
        .filter(|t| t.track_type == track_type)
        .count()
        + 1;
    let prefix = match track_type {
        TrackType::Video => "video",
        TrackType::Audio => "audio",
    };
    let id = new_id(prefix);
    let track = Track::new(
        id.clone(),
        format!("{track_type} {number}"),
        track_type,
        config.default_track_height,
    );
    match track_type {
        TrackType::Video => state.tracks.insert(0, track),
        TrackType::Audio => state.tracks.push(track),
    }
    debug!(track_id = %id, %track_type, "Track added");
    id
}

/// Delete a track and every clip on it. Linked partners on other tracks go
/// with their clips; child tracks are re-parented to the deleted track's
/// parent.
pub fn remove_track(state: &mut TimelineState, track_id: &str) -> TimelineResult<()> {
    let parent = state.require_track(track_id)?.parent_track_id.clone();

    let clip_ids: Vec<String> = state.clips_on_track(track_id).map(|c| c.id.clone()).collect();
    for clip_id in clip_ids {
        if state.clip(&clip_id).is_some() {
            remove_clip(state, &clip_id, false)?;
        }
    }

    state.tracks.retain(|t| t.id != track_id);
    for track in &mut state.tracks {
        if track.parent_track_id.as_deref() == Some(track_id) {
            track.parent_track_id = parent.clone();
        }
    }
    state.expanded_tracks.remove(track_id);
    state.expanded_curve_editors.retain(|(t, _)| t != track_id);
    state.selection.deselect_track(track_id);
    debug!(track_id, "Track removed");
    Ok(())
}

pub fn rename_track(state: &mut TimelineState, track_id: &str, name: &str) -> TimelineResult<()> {
    state.require_track_mut(track_id)?.name = name.to_string();
    Ok(())
}

pub fn set_track_muted(state: &mut TimelineState, track_id: &str, muted: bool) -> TimelineResult<()> {
    state.require_track_mut(track_id)?.muted = muted;
    Ok(())
}

pub fn set_track_visible(state: &mut TimelineState, track_id: &str, visible: bool) -> TimelineResult<()> {
    state.require_track_mut(track_id)?.visible = visible;
    Ok(())
}

pub fn set_track_solo(state: &mut TimelineState, track_id: &str, solo: bool) -> TimelineResult<()> {
    state.require_track_mut(track_id)?.solo = solo;
    Ok(())
}

pub fn set_track_locked(state: &mut TimelineState, track_id: &str, locked: bool) -> TimelineResult<()> {
    state.require_track_mut(track_id)?.locked = locked;
    Ok(())
}

pub fn set_track_height(
    state: &mut TimelineState,
    config: &TimelineConfig,
    track_id: &str,
    height: i64,
) -> TimelineResult<()> {
    state.require_track_mut(track_id)?.height = config.clamp_track_height(height);
    Ok(())
}

/// Nest `track_id` under `parent_id`, or un-nest it with `None`.
pub fn set_track_parent(
    state: &mut TimelineState,
    track_id: &str,
    parent_id: Option<&str>,
) -> TimelineResult<()> {
    state.require_track(track_id)?;
    if let Some(parent_id) = parent_id {
        if parent_id == track_id {
            return Err(TimelineError::SelfParent {
                id: track_id.to_string(),
            });
        }
        state.require_track(parent_id)?;
        let mut cursor = Some(parent_id.to_string());
        let mut steps = 0;
        while let Some(current) = cursor {
            if current == track_id || steps > state.tracks.len() {
                return Err(TimelineError::ParentCycle {
                    id: track_id.to_string(),
                    parent_id: parent_id.to_string(),
                });
            }
            cursor = state.track(&current).and_then(|t| t.parent_track_id.clone());
            steps += 1;
        }
    }
    state.require_track_mut(track_id)?.parent_track_id = parent_id.map(str::to_string);
    Ok(())
}

/// Resize every track of `track_type`. Tracks with differing heights are
/// first equalized to the tallest; otherwise all grow by `delta`. Heights
/// stay within the configured bounds.
pub fn scale_tracks_of_type(
    state: &mut TimelineState,
    config: &TimelineConfig,
    track_type: TrackType,
    delta: i64,
) {
    let heights: Vec<u32> = state
        .tracks
        .iter()
        .filter(|t| t.track_type == track_type)
        .map(|t| t.height)
        .collect();
    let Some(&max) = heights.iter().max() else {
        return;
    };
    let uniform = heights.iter().all(|&h| h == max);
    let target = if uniform {
        config.clamp_track_height(i64::from(max) + delta)
    } else {
        max
    };
    for track in state.tracks.iter_mut().filter(|t| t.track_type == track_type) {
        track.height = target;
    }
}

/// Ancestors of a track, nearest first. Dangling or cyclic references end
/// the walk.
fn ancestors<'a>(state: &'a TimelineState, track: &'a Track) -> Vec<&'a Track> {
    let mut chain = Vec::new();
    let mut cursor = track.parent_track_id.as_deref();
    while let Some(parent_id) = cursor {
        let Some(parent) = state.track(parent_id) else {
            break;
        };
        if parent.id == track.id || chain.iter().any(|t: &&Track| t.id == parent.id) {
            break;
        }
        chain.push(parent);
        cursor = parent.parent_track_id.as_deref();
    }
    chain
}

fn passes_solo(state: &TimelineState, track: &Track) -> bool {
    let any_solo = state
        .tracks
        .iter()
        .any(|t| t.track_type == track.track_type && t.solo);
    !any_solo || track.solo
}

/// A track is seen if it and all its ancestors are visible and it survives
/// the solo rule (when any track of its type is soloed, only soloed tracks
/// count).
pub fn is_track_effectively_visible(state: &TimelineState, track_id: &str) -> bool {
    let Some(track) = state.track(track_id) else {
        return false;
    };
    track.visible && ancestors(state, track).iter().all(|t| t.visible) && passes_solo(state, track)
}

/// A track is heard if neither it nor an ancestor is muted and it survives
/// the solo rule.
pub fn is_track_audible(state: &TimelineState, track_id: &str) -> bool {
    let Some(track) = state.track(track_id) else {
        return false;
    };
    !track.muted && ancestors(state, track).iter().all(|t| !t.muted) && passes_solo(state, track)
}
