//! Clip lifecycle and editing: import, move, trim, split, delete, and the
//! per-clip properties (transform, speed, effects, masks, parenting,
//! multicam groups).

use std::collections::BTreeMap;

use tracing::debug;

use ms_common::{Effect, Mask, MediaKind, ParamValue, TrackType, TransformPatch};
use ms_project::TextProperties;
use ms_timeline_eval::{
    effective_speed, interpolate, keyframed_properties, source_offset, timeline_duration,
    AnimatableProperty, Keyframe,
};

use crate::error::{TimelineError, TimelineResult};
use crate::media::{load_request_for, register_media};
use crate::positioning::{
    find_non_overlapping_position, get_position_with_resistance, get_snapped_position,
    is_slot_free, trim_overlapping_clips,
};
use crate::state::TimelineState;
use crate::tracks::add_track;
use crate::transitions::{clear_clip_transitions, detach_transition, remove_transition};
use crate::types::{new_id, Clip, ClipEdge, ClipSource, EditContext, LinkedGroup, MediaFile, TIME_EPSILON};

/// Placeholder length of a video/audio import whose length is not known yet.
const PLACEHOLDER_DURATION: f64 = 5.0;

/// Reject `kind` on a track of the wrong type or on a locked track.
pub(crate) fn check_track_accepts(state: &TimelineState, track_id: &str, kind: MediaKind) -> TimelineResult<()> {
    let track = state.require_track(track_id)?;
    if track.track_type != kind.track_type() {
        return Err(TimelineError::WrongTrackType {
            kind,
            track_type: track.track_type,
            track_id: track_id.to_string(),
        });
    }
    if track.locked {
        return Err(TimelineError::TrackLocked {
            track_id: track_id.to_string(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

/// Import a media file as a loading placeholder and queue its load.
///
/// Video imports also get a linked audio placeholder on the first audio
/// track with room (a new audio track otherwise); it is dropped again if the
/// file turns out to be silent. Returns the primary clip id.
pub fn add_clip(
    state: &mut TimelineState,
    ctx: &EditContext<'_>,
    track_id: &str,
    file: MediaFile,
    start: f64,
    estimated_duration: Option<f64>,
    media_file_id: Option<String>,
) -> TimelineResult<String> {
    let kind = file.kind;
    if !kind.is_file_backed() {
        return Err(TimelineError::invalid(format!("{kind} sources are not imported from files")));
    }
    check_track_accepts(state, track_id, kind)?;

    let estimated = estimated_duration
        .filter(|d| *d > TIME_EPSILON)
        .unwrap_or(match kind {
            MediaKind::Image => ctx.config.default_image_duration,
            _ => PLACEHOLDER_DURATION,
        });
    let media_file_id = register_media(state, &file, media_file_id);
    let id = new_id("clip");
    let start = find_non_overlapping_position(state, &id, start, track_id, estimated);
    let source = ClipSource::Loading {
        kind,
        media_file_id: Some(media_file_id.clone()),
        estimated_duration: estimated,
    };
    push_clip(state, Clip::new(&id, track_id, &file.name, source, start, estimated));

    if kind == MediaKind::Video {
        let audio_id = add_audio_placeholder(state, ctx, &id, &file.name, &media_file_id, start, estimated);
        debug!(clip_id = %id, audio_clip_id = %audio_id, "Linked audio placeholder created");
    }

    debug!(clip_id = %id, track_id, %kind, start, path = %file.path, "Clip added");
    Ok(id)
}

/// Insert a clip and queue its media load if it has one.
pub(crate) fn push_clip(state: &mut TimelineState, clip: Clip) {
    let request = load_request_for(state, &clip);
    state.clips.push(clip);
    if let Some(request) = request {
        state.schedule_load(request);
    }
}

fn add_audio_placeholder(
    state: &mut TimelineState,
    ctx: &EditContext<'_>,
    video_id: &str,
    name: &str,
    media_file_id: &str,
    start: f64,
    duration: f64,
) -> String {
    let free_track = state
        .tracks
        .iter()
        .find(|t| {
            t.track_type == TrackType::Audio
                && !t.locked
                && is_slot_free(state, &t.id, start, duration, &[])
        })
        .map(|t| t.id.clone());
    let track_id = match free_track {
        Some(id) => id,
        None => add_track(state, ctx.config, TrackType::Audio),
    };

    let audio_id = new_id("clip");
    let source = ClipSource::Loading {
        kind: MediaKind::Audio,
        media_file_id: Some(media_file_id.to_string()),
        estimated_duration: duration,
    };
    let mut audio = Clip::new(&audio_id, track_id, name, source, start, duration);
    audio.linked_clip_id = Some(video_id.to_string());
    push_clip(state, audio);
    if let Some(video) = state.clip_mut(video_id) {
        video.linked_clip_id = Some(audio_id.clone());
    }
    audio_id
}

/// Add a generated text clip, ready immediately.
pub fn add_text_clip(
    state: &mut TimelineState,
    ctx: &EditContext<'_>,
    track_id: &str,
    text: TextProperties,
    start: f64,
    duration: Option<f64>,
) -> TimelineResult<String> {
    let name = if text.text.trim().is_empty() {
        "Text".to_string()
    } else {
        text.text.clone()
    };
    add_generated(state, ctx, track_id, name, ClipSource::Text(text), start, duration)
}

/// Add a solid colour clip, ready immediately.
pub fn add_solid_clip(
    state: &mut TimelineState,
    ctx: &EditContext<'_>,
    track_id: &str,
    color: &str,
    start: f64,
    duration: Option<f64>,
) -> TimelineResult<String> {
    let source = ClipSource::Solid {
        color: color.to_string(),
    };
    add_generated(state, ctx, track_id, format!("Solid {color}"), source, start, duration)
}

fn add_generated(
    state: &mut TimelineState,
    ctx: &EditContext<'_>,
    track_id: &str,
    name: String,
    source: ClipSource,
    start: f64,
    duration: Option<f64>,
) -> TimelineResult<String> {
    let kind = source.kind();
    check_track_accepts(state, track_id, kind)?;
    let duration = duration
        .filter(|d| *d > TIME_EPSILON)
        .unwrap_or(ctx.config.default_generated_duration);
    let id = new_id("clip");
    let start = find_non_overlapping_position(state, &id, start, track_id, duration);
    state.clips.push(Clip::new(&id, track_id, name, source, start, duration));
    debug!(clip_id = %id, track_id, %kind, start, duration, "Generated clip added");
    Ok(id)
}

/// Add a clip for remote media that is not downloaded yet. It becomes a
/// loading clip once `resolve_download` hands it a local file.
pub fn add_download_clip(
    state: &mut TimelineState,
    track_id: &str,
    url: &str,
    kind: MediaKind,
    name: &str,
    start: f64,
    estimated_duration: Option<f64>,
) -> TimelineResult<String> {
    if !kind.is_file_backed() {
        return Err(TimelineError::invalid(format!("{kind} sources cannot be downloaded")));
    }
    check_track_accepts(state, track_id, kind)?;
    let duration = estimated_duration
        .filter(|d| *d > TIME_EPSILON)
        .unwrap_or(PLACEHOLDER_DURATION);
    let id = new_id("clip");
    let start = find_non_overlapping_position(state, &id, start, track_id, duration);
    let source = ClipSource::PendingDownload {
        url: url.to_string(),
        kind,
    };
    state.clips.push(Clip::new(&id, track_id, name, source, start, duration));
    debug!(clip_id = %id, url, "Download placeholder added");
    Ok(id)
}

// ---------------------------------------------------------------------------
// Removal
// ---------------------------------------------------------------------------

/// Delete a clip with its keyframes, transitions and references to it.
///
/// The linked partner is deleted too unless `skip_linked`, in which case it
/// is only unlinked. Returns every deleted clip id.
pub fn remove_clip(state: &mut TimelineState, clip_id: &str, skip_linked: bool) -> TimelineResult<Vec<String>> {
    let clip = state.require_clip(clip_id)?;
    let partner = clip.linked_clip_id.clone();
    let group = clip.linked_group_id.clone();
    let transitions: Vec<String> = clip.transition_ids().map(str::to_string).collect();

    for id in &transitions {
        detach_transition(state, id);
    }
    state.clips.retain(|c| c.id != clip_id);
    state.keyframes.remove(clip_id);
    state.recording.retain(|(c, _)| c != clip_id);
    for other in &mut state.clips {
        if other.parent_clip_id.as_deref() == Some(clip_id) {
            other.parent_clip_id = None;
        }
    }
    if let Some(group_id) = group {
        leave_group(state, &group_id, clip_id);
    }
    state.prune_selection();
    debug!(clip_id, "Clip removed");

    let mut removed = vec![clip_id.to_string()];
    if let Some(partner_id) = partner {
        if skip_linked {
            if let Some(partner) = state.clip_mut(&partner_id) {
                partner.linked_clip_id = None;
            }
        } else if state.clip(&partner_id).is_some() {
            removed.extend(remove_clip(state, &partner_id, true)?);
        }
    }
    Ok(removed)
}

// ---------------------------------------------------------------------------
// Moving
// ---------------------------------------------------------------------------

/// Move a clip to `new_start`, optionally onto `new_track`.
///
/// The drop is snapped, then resolved against other clips: on the same
/// track an overlapping drop trims what it covers, on another track the
/// nearest free slot is used. The linked partner (unless `skip_linked`) and
/// multicam group members (unless `skip_group`) shift by the same delta on
/// their own tracks. Transitions attached to any moved clip are cleared.
pub fn move_clip(
    state: &mut TimelineState,
    ctx: &EditContext<'_>,
    clip_id: &str,
    new_start: f64,
    new_track: Option<&str>,
    skip_linked: bool,
    skip_group: bool,
) -> TimelineResult<()> {
    let clip = state.require_clip(clip_id)?;
    let old_start = clip.start_time;
    let duration = clip.duration;
    let kind = clip.kind();
    let source_track = clip.track_id.clone();
    let partner = clip.linked_clip_id.clone();
    let group = clip.linked_group_id.clone();
    let target_track = new_track.unwrap_or(&source_track).to_string();

    state.ensure_track_unlocked(&source_track)?;
    check_track_accepts(state, &target_track, kind)?;

    let snap = get_snapped_position(state, ctx.config, clip_id, new_start, &target_track)?;
    let placement = get_position_with_resistance(state, clip_id, snap.start_time, &target_track, duration);
    if placement.no_free_space {
        return Err(TimelineError::NoFreeSpace {
            track_id: target_track,
        });
    }
    let followers = followers_of(state, clip_id, partner, group.as_deref(), skip_linked, skip_group);
    let mut moved = vec![clip_id.to_string()];
    moved.extend(followers.iter().cloned());

    // The whole set shifts rigidly, so the earliest follower bounds how far
    // left the leader may go.
    let floor = followers
        .iter()
        .filter_map(|f| state.clip(f))
        .map(|c| -c.start_time)
        .fold(f64::NEG_INFINITY, f64::max);
    let clamped = placement.start_time - old_start < floor;
    let delta = if clamped { floor } else { placement.start_time - old_start };
    let start = old_start + delta;

    clear_clip_transitions(state, clip_id)?;
    let clip = state.require_clip_mut(clip_id)?;
    clip.start_time = start;
    clip.track_id = target_track.clone();
    if placement.forcing_overlap || clamped {
        trim_overlapping_clips(state, clip_id, start, &target_track, duration, &moved)?;
    }

    if delta.abs() > TIME_EPSILON {
        for follower in &followers {
            let Some(clip) = state.clip(follower) else {
                continue;
            };
            let (track_id, follower_duration, desired) =
                (clip.track_id.clone(), clip.duration, clip.start_time + delta);
            state.ensure_track_unlocked(&track_id)?;
            let placement = get_position_with_resistance(state, follower, desired, &track_id, follower_duration);
            clear_clip_transitions(state, follower)?;
            state.require_clip_mut(follower)?.start_time = placement.start_time;
            if placement.forcing_overlap {
                trim_overlapping_clips(state, follower, placement.start_time, &track_id, follower_duration, &moved)?;
            }
        }
    }

    ensure_disjoint(state, &moved)?;

    if skip_group {
        if let Some(group_id) = group {
            refresh_group_offsets(state, &group_id);
        }
    }

    debug!(clip_id, start, track_id = %target_track, followers = followers.len(), "Clip moved");
    Ok(())
}

/// Clips that move along with `clip_id`: its partner, and group members
/// with their partners.
fn followers_of(
    state: &TimelineState,
    clip_id: &str,
    partner: Option<String>,
    group: Option<&str>,
    skip_linked: bool,
    skip_group: bool,
) -> Vec<String> {
    let mut followers: Vec<String> = Vec::new();
    if !skip_linked {
        followers.extend(partner.filter(|p| state.clip(p).is_some()));
    }
    if skip_group {
        return followers;
    }
    let Some(group) = group.and_then(|g| state.linked_groups.get(g)) else {
        return followers;
    };
    for member in group.offsets.keys() {
        if member == clip_id || followers.contains(member) || state.clip(member).is_none() {
            continue;
        }
        followers.push(member.clone());
        if !skip_linked {
            if let Some(member_partner) = state.linked_partner(member) {
                if member_partner.id != clip_id && !followers.contains(&member_partner.id) {
                    followers.push(member_partner.id.clone());
                }
            }
        }
    }
    followers
}

// ---------------------------------------------------------------------------
// Trimming
// ---------------------------------------------------------------------------

/// Set a clip's source range directly. Duration follows from the range and
/// speed, shortened if it would run into the next clip on the track.
pub fn trim_clip(state: &mut TimelineState, clip_id: &str, in_point: f64, out_point: f64) -> TimelineResult<()> {
    let clip = state.require_clip(clip_id)?;
    let invalid = |reason: &str| TimelineError::InvalidTrim {
        clip_id: clip_id.to_string(),
        reason: reason.to_string(),
    };
    if !(in_point >= 0.0 && out_point > in_point + TIME_EPSILON) {
        return Err(invalid("out point must follow a non-negative in point"));
    }
    if clip.natural_duration().is_some_and(|n| out_point > n + TIME_EPSILON) {
        return Err(invalid("out point is past the end of the source"));
    }

    let speed = effective_speed(clip.speed);
    let transition_partner = clip.transition_out.as_ref().map(|t| t.linked_clip_id.as_str());
    let next_start = state
        .clips_on_track(&clip.track_id)
        .filter(|c| c.id != clip_id && Some(c.id.as_str()) != transition_partner)
        .filter(|c| c.start_time > clip.start_time + TIME_EPSILON)
        .map(|c| c.start_time)
        .fold(f64::INFINITY, f64::min);
    let room = next_start - clip.start_time;
    let reversed = clip.reversed;

    let (mut in_point, mut out_point) = (in_point, out_point);
    let mut duration = timeline_duration(out_point - in_point, clip.speed);
    if duration > room + TIME_EPSILON {
        duration = room;
        if reversed {
            in_point = out_point - duration * speed;
        } else {
            out_point = in_point + duration * speed;
        }
    }

    let clip = state.require_clip_mut(clip_id)?;
    clip.in_point = in_point;
    clip.out_point = out_point;
    clip.duration = duration;
    debug!(clip_id, in_point, out_point, duration, "Clip trimmed");
    Ok(())
}

/// Drag one edge of a clip to `time`.
///
/// The edge stops at the neighbouring clip, at the source's natural bounds
/// and one preview frame short of the opposite edge. With
/// `propagate_linked`, the partner's same edge moves by the same amount and
/// the tighter of both limits applies. A transition on the dragged edge is
/// removed first, which puts the incoming clip back at the outgoing clip's
/// end, so the edge is then bounded by the ordinary neighbour.
pub fn trim_clip_edge(
    state: &mut TimelineState,
    ctx: &EditContext<'_>,
    clip_id: &str,
    edge: ClipEdge,
    time: f64,
    propagate_linked: bool,
) -> TimelineResult<()> {
    let min_length = ctx.config.preview_fps.frame_duration();
    let clip = state.require_clip(clip_id)?;
    state.ensure_track_unlocked(&clip.track_id)?;

    let mut on_edge: Vec<String> = std::iter::once(clip_id)
        .chain(clip.linked_clip_id.as_deref().filter(|_| propagate_linked))
        .filter_map(|id| state.clip(id))
        .filter_map(|c| match edge {
            ClipEdge::Start => c.transition_in.as_ref(),
            ClipEdge::End => c.transition_out.as_ref(),
        })
        .map(|t| t.id.clone())
        .collect();
    on_edge.dedup();
    for transition_id in &on_edge {
        remove_transition(state, transition_id)?;
    }

    let clip = state.require_clip(clip_id)?;
    let edge_time = match edge {
        ClipEdge::Start => clip.start_time,
        ClipEdge::End => clip.end_time(),
    };
    let (mut lo, mut hi) = edge_bounds(state, clip, edge, min_length);
    let partner = if propagate_linked {
        clip.linked_clip_id.clone().filter(|p| state.clip(p).is_some())
    } else {
        None
    };
    if let Some(partner) = partner.as_deref().and_then(|p| state.clip(p)) {
        let (partner_lo, partner_hi) = edge_bounds(state, partner, edge, min_length);
        lo = lo.max(partner_lo);
        hi = hi.min(partner_hi);
    }
    if lo > hi + TIME_EPSILON {
        return Err(TimelineError::InvalidTrim {
            clip_id: clip_id.to_string(),
            reason: "no room to move this edge".to_string(),
        });
    }

    let delta = (time - edge_time).max(lo).min(hi);
    for id in std::iter::once(clip_id.to_string()).chain(partner) {
        apply_edge_delta(state, &id, edge, delta)?;
    }
    debug!(clip_id, ?edge, delta, "Clip edge trimmed");
    Ok(())
}

/// Allowed `[lo, hi]` movement of one clip edge.
fn edge_bounds(state: &TimelineState, clip: &Clip, edge: ClipEdge, min_length: f64) -> (f64, f64) {
    let speed = effective_speed(clip.speed);
    let natural = clip.natural_duration();
    let others = move || state.clips_on_track(&clip.track_id).filter(move |c| c.id != clip.id);

    match edge {
        ClipEdge::Start => {
            let prev_end = others()
                .filter(|c| c.start_time < clip.start_time)
                .map(Clip::end_time)
                .fold(0.0_f64, f64::max);
            let mut lo = prev_end - clip.start_time;
            if let Some(natural) = natural {
                let source_limit = if clip.reversed {
                    (clip.out_point - natural) / speed
                } else {
                    -clip.in_point / speed
                };
                lo = lo.max(source_limit);
            }
            (lo, clip.duration - min_length)
        }
        ClipEdge::End => {
            let next_start = others()
                .filter(|c| c.start_time > clip.start_time)
                .map(|c| c.start_time)
                .fold(f64::INFINITY, f64::min);
            let mut hi = next_start - clip.end_time();
            if let Some(natural) = natural {
                let source_limit = if clip.reversed {
                    clip.in_point / speed
                } else {
                    (natural - clip.out_point) / speed
                };
                hi = hi.min(source_limit);
            }
            (-(clip.duration - min_length), hi)
        }
    }
}

fn apply_edge_delta(state: &mut TimelineState, clip_id: &str, edge: ClipEdge, delta: f64) -> TimelineResult<()> {
    let clip = state.require_clip_mut(clip_id)?;
    let speed = effective_speed(clip.speed);
    match edge {
        ClipEdge::Start => {
            clip.start_time += delta;
            clip.duration -= delta;
            if clip.reversed {
                clip.out_point -= delta * speed;
            } else {
                clip.in_point += delta * speed;
            }
        }
        ClipEdge::End => {
            clip.duration += delta;
            if clip.reversed {
                clip.in_point -= delta * speed;
            } else {
                clip.out_point += delta * speed;
            }
        }
    }
    // Stretchable sources have no real source range.
    if clip.natural_duration().is_none() {
        clip.in_point = 0.0;
        clip.out_point = clip.duration * speed;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Splitting
// ---------------------------------------------------------------------------

/// Cut a clip in two at timeline `time`.
///
/// Both halves get fresh ids and the original is removed. A linked partner
/// spanning `time` is split too and the halves are relinked pairwise.
/// Keyframes are divided at the cut with an interpolated boundary keyframe
/// on each side. The second half becomes the selection; its id is returned.
pub fn split_clip(state: &mut TimelineState, clip_id: &str, time: f64) -> TimelineResult<String> {
    let clip = state.require_clip(clip_id)?;
    if time <= clip.start_time + TIME_EPSILON || time >= clip.end_time() - TIME_EPSILON {
        return Err(TimelineError::SplitOutOfBounds {
            clip_id: clip_id.to_string(),
            time,
        });
    }
    state.ensure_track_unlocked(&clip.track_id)?;
    let partner = clip.linked_clip_id.clone();

    let (first, second) = split_one(state, clip_id, time)?;

    if let Some(partner_id) = partner {
        let span = state.clip(&partner_id).map(|p| (p.start_time, p.end_time()));
        match span {
            Some((start, end)) if time > start + TIME_EPSILON && time < end - TIME_EPSILON => {
                let (partner_first, partner_second) = split_one(state, &partner_id, time)?;
                link_clips(state, &first, &partner_first)?;
                link_clips(state, &second, &partner_second)?;
            }
            Some((start, _)) => {
                let half = if start < time { &first } else { &second };
                link_clips(state, half, &partner_id)?;
            }
            None => {}
        }
    }

    state.selection.select_clip(&second, false);
    debug!(clip_id, time, first = %first, second = %second, "Clip split");
    Ok(second)
}

fn link_clips(state: &mut TimelineState, a: &str, b: &str) -> TimelineResult<()> {
    state.require_clip_mut(a)?.linked_clip_id = Some(b.to_string());
    state.require_clip_mut(b)?.linked_clip_id = Some(a.to_string());
    Ok(())
}

/// Replace one clip by two halves. Partner links are left for the caller.
fn split_one(state: &mut TimelineState, clip_id: &str, time: f64) -> TimelineResult<(String, String)> {
    let index = state
        .clips
        .iter()
        .position(|c| c.id == clip_id)
        .ok_or_else(|| TimelineError::clip(clip_id))?;
    let original = state.clips[index].clone();
    let local = time - original.start_time;
    let keyframes = state.clip_keyframes(clip_id).to_vec();
    let offset = source_offset(local, original.speed, &keyframes);

    let first_id = new_id("clip");
    let second_id = new_id("clip");

    let mut first = original.clone();
    first.id = first_id.clone();
    first.duration = local;
    first.transition_out = None;
    first.linked_clip_id = None;

    let mut second = original.clone();
    second.id = second_id.clone();
    second.start_time = time;
    second.duration = original.duration - local;
    second.transition_in = None;
    second.linked_clip_id = None;

    let (low, high) = (original.in_point, original.out_point);
    if original.reversed {
        let cut = (high - offset).clamp(low.min(high), high.max(low));
        first.in_point = cut;
        second.out_point = cut;
    } else {
        let cut = (low + offset).clamp(low.min(high), high.max(low));
        first.out_point = cut;
        second.in_point = cut;
    }

    if let Some(nested) = first.nested.as_deref_mut() {
        crate::nested::rebind_nested_ids(nested, clip_id, &first_id);
    }
    if let Some(nested) = second.nested.as_deref_mut() {
        crate::nested::rebind_nested_ids(nested, clip_id, &second_id);
    }

    for other in &mut state.clips {
        if let Some(t) = other.transition_out.as_mut().filter(|t| t.linked_clip_id == clip_id) {
            t.linked_clip_id = first_id.clone();
        }
        if let Some(t) = other.transition_in.as_mut().filter(|t| t.linked_clip_id == clip_id) {
            t.linked_clip_id = second_id.clone();
        }
        if other.parent_clip_id.as_deref() == Some(clip_id) {
            other.parent_clip_id = Some(first_id.clone());
        }
    }

    let (first_kfs, second_kfs) = split_keyframes(&keyframes, local, &first_id, &second_id);
    state.keyframes.remove(clip_id);
    if !first_kfs.is_empty() {
        state.keyframes.insert(first_id.clone(), first_kfs);
    }
    if !second_kfs.is_empty() {
        state.keyframes.insert(second_id.clone(), second_kfs);
    }

    let recorded: Vec<AnimatableProperty> = state
        .recording
        .iter()
        .filter(|(c, _)| c == clip_id)
        .map(|(_, p)| p.clone())
        .collect();
    state.recording.retain(|(c, _)| c != clip_id);
    for property in recorded {
        state.recording.insert((first_id.clone(), property.clone()));
        state.recording.insert((second_id.clone(), property));
    }

    if let Some(group) = original
        .linked_group_id
        .as_deref()
        .and_then(|g| state.linked_groups.get_mut(g))
    {
        let offset = group.offsets.remove(clip_id).unwrap_or(0.0);
        group.offsets.insert(first_id.clone(), offset);
        group.offsets.insert(second_id.clone(), offset + local);
        if group.master_clip_id == clip_id {
            group.master_clip_id = first_id.clone();
        }
    }

    state.clips[index] = first;
    state.clips.insert(index + 1, second);
    state.selection.deselect_clip(clip_id);

    // Loads still in flight for the original are stale now.
    for id in [&first_id, &second_id] {
        crate::nested::schedule_loads_for(state, id);
    }
    Ok((first_id, second_id))
}

/// Divide a clip's keyframes at clip-local `cut`. Every animated property
/// gets a boundary keyframe holding its value at the cut on both sides, so
/// neither half changes what it shows.
fn split_keyframes(keyframes: &[Keyframe], cut: f64, first_id: &str, second_id: &str) -> (Vec<Keyframe>, Vec<Keyframe>) {
    let mut first = Vec::new();
    let mut second = Vec::new();

    for property in keyframed_properties(keyframes) {
        let track: Vec<&Keyframe> = keyframes.iter().filter(|k| k.property == property).collect();
        let Some(boundary_value) = interpolate(track.iter().copied(), cut) else {
            continue;
        };
        for kf in &track {
            if kf.time < cut - TIME_EPSILON {
                first.push(rehome(kf, first_id, kf.time));
            } else if kf.time > cut + TIME_EPSILON {
                second.push(rehome(kf, second_id, kf.time - cut));
            }
        }

        let boundary = match track.iter().find(|k| (k.time - cut).abs() <= TIME_EPSILON) {
            Some(existing) => (*existing).clone(),
            None => {
                let easing = track
                    .iter()
                    .rev()
                    .find(|k| k.time <= cut)
                    .map(|k| k.easing)
                    .unwrap_or_default();
                Keyframe::new("", "", property.clone(), cut, boundary_value, easing)
            }
        };
        first.push(rehome(&boundary, first_id, cut));
        second.push(rehome(&boundary, second_id, 0.0));
    }

    first.sort_by(|a, b| a.time.total_cmp(&b.time));
    second.sort_by(|a, b| a.time.total_cmp(&b.time));
    (first, second)
}

fn rehome(kf: &Keyframe, clip_id: &str, time: f64) -> Keyframe {
    Keyframe {
        id: new_id("kf"),
        clip_id: clip_id.to_string(),
        time,
        ..kf.clone()
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

pub fn update_clip_transform(state: &mut TimelineState, clip_id: &str, patch: &TransformPatch) -> TimelineResult<()> {
    state.require_clip_mut(clip_id)?.transform.apply_patch(patch);
    Ok(())
}

pub fn set_clip_name(state: &mut TimelineState, clip_id: &str, name: &str) -> TimelineResult<()> {
    state.require_clip_mut(clip_id)?.name = name.to_string();
    Ok(())
}

/// Reverse playback of a clip and its partner.
pub fn set_clip_reversed(state: &mut TimelineState, clip_id: &str, reversed: bool) -> TimelineResult<()> {
    let partner = state.require_clip(clip_id)?.linked_clip_id.clone();
    for id in std::iter::once(clip_id.to_string()).chain(partner) {
        if let Some(clip) = state.clip_mut(&id) {
            clip.reversed = reversed;
        }
    }
    Ok(())
}

/// Change playback speed of a clip and its partner. Durations follow the
/// source range; anything a longer clip now covers is trimmed.
pub fn set_clip_speed(state: &mut TimelineState, clip_id: &str, speed: f64) -> TimelineResult<()> {
    if !speed.is_finite() || speed == 0.0 {
        return Err(TimelineError::InvalidProperty {
            clip_id: clip_id.to_string(),
            property: format!("speed {speed}"),
        });
    }
    let partner = state.require_clip(clip_id)?.linked_clip_id.clone();
    let ids: Vec<String> = std::iter::once(clip_id.to_string())
        .chain(partner.filter(|p| state.clip(p).is_some()))
        .collect();

    let mut stale: Vec<String> = Vec::new();
    for id in &ids {
        let clip = state.require_clip_mut(id)?;
        let old_duration = clip.duration;
        clip.speed = speed;
        clip.duration = timeline_duration(clip.out_point - clip.in_point, speed);
        if (clip.duration - old_duration).abs() > TIME_EPSILON {
            stale.extend(clip.transition_out.as_ref().map(|t| t.id.clone()));
        }
    }
    // The outgoing end moved, so the incoming side goes back to the new end.
    stale.sort();
    stale.dedup();
    for transition_id in &stale {
        remove_transition(state, transition_id)?;
    }
    for id in &ids {
        let Some(clip) = state.clip(id) else {
            continue;
        };
        let (start, track_id, duration) = (clip.start_time, clip.track_id.clone(), clip.duration);
        trim_overlapping_clips(state, id, start, &track_id, duration, &ids)?;
    }
    debug!(clip_id, speed, "Clip speed changed");
    Ok(())
}

// ---------------------------------------------------------------------------
// Effects and masks
// ---------------------------------------------------------------------------

/// Append an effect with the default parameters of `effect_type`.
pub fn add_effect(state: &mut TimelineState, clip_id: &str, effect_type: &str) -> TimelineResult<String> {
    let id = new_id("effect");
    state
        .require_clip_mut(clip_id)?
        .effects
        .push(Effect::new(&id, effect_type));
    debug!(clip_id, effect_id = %id, effect_type, "Effect added");
    Ok(id)
}

fn effect_not_found(clip_id: &str, effect_id: &str) -> TimelineError {
    TimelineError::EffectNotFound {
        clip_id: clip_id.to_string(),
        effect_id: effect_id.to_string(),
    }
}

/// Remove an effect and every keyframe animating it.
pub fn remove_effect(state: &mut TimelineState, clip_id: &str, effect_id: &str) -> TimelineResult<()> {
    let clip = state.require_clip_mut(clip_id)?;
    let before = clip.effects.len();
    clip.effects.retain(|e| e.id != effect_id);
    if clip.effects.len() == before {
        return Err(effect_not_found(clip_id, effect_id));
    }
    if let Some(kfs) = state.keyframes.get_mut(clip_id) {
        kfs.retain(|k| k.property.effect_id() != Some(effect_id));
        if kfs.is_empty() {
            state.keyframes.remove(clip_id);
        }
    }
    state
        .recording
        .retain(|(c, p)| !(c == clip_id && p.effect_id() == Some(effect_id)));
    state.prune_selection();
    Ok(())
}

pub fn set_effect_param(
    state: &mut TimelineState,
    clip_id: &str,
    effect_id: &str,
    param: &str,
    value: ParamValue,
) -> TimelineResult<()> {
    let effect = state
        .require_clip_mut(clip_id)?
        .effects
        .iter_mut()
        .find(|e| e.id == effect_id)
        .ok_or_else(|| effect_not_found(clip_id, effect_id))?;
    effect.params.insert(param.to_string(), value);
    Ok(())
}

pub fn set_effect_enabled(state: &mut TimelineState, clip_id: &str, effect_id: &str, enabled: bool) -> TimelineResult<()> {
    let effect = state
        .require_clip_mut(clip_id)?
        .effects
        .iter_mut()
        .find(|e| e.id == effect_id)
        .ok_or_else(|| effect_not_found(clip_id, effect_id))?;
    effect.enabled = enabled;
    Ok(())
}

/// Attach a mask. An empty mask id is replaced by a fresh one.
pub fn add_mask(state: &mut TimelineState, clip_id: &str, mut mask: Mask) -> TimelineResult<String> {
    if mask.id.is_empty() {
        mask.id = new_id("mask");
    }
    let id = mask.id.clone();
    state.require_clip_mut(clip_id)?.masks.push(mask);
    Ok(id)
}

fn mask_not_found(clip_id: &str, mask_id: &str) -> TimelineError {
    TimelineError::MaskNotFound {
        clip_id: clip_id.to_string(),
        mask_id: mask_id.to_string(),
    }
}

/// Replace the mask with the same id.
pub fn update_mask(state: &mut TimelineState, clip_id: &str, mask: Mask) -> TimelineResult<()> {
    let slot = state
        .require_clip_mut(clip_id)?
        .masks
        .iter_mut()
        .find(|m| m.id == mask.id)
        .ok_or_else(|| mask_not_found(clip_id, &mask.id))?;
    *slot = mask;
    Ok(())
}

pub fn remove_mask(state: &mut TimelineState, clip_id: &str, mask_id: &str) -> TimelineResult<()> {
    let clip = state.require_clip_mut(clip_id)?;
    let before = clip.masks.len();
    clip.masks.retain(|m| m.id != mask_id);
    if clip.masks.len() == before {
        return Err(mask_not_found(clip_id, mask_id));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Parenting
// ---------------------------------------------------------------------------

/// Parent a clip's transform to another clip (pick-whip), or clear it.
pub fn set_clip_parent(state: &mut TimelineState, clip_id: &str, parent_id: Option<&str>) -> TimelineResult<()> {
    state.require_clip(clip_id)?;
    if let Some(parent_id) = parent_id {
        if parent_id == clip_id {
            return Err(TimelineError::SelfParent {
                id: clip_id.to_string(),
            });
        }
        state.require_clip(parent_id)?;
        let mut cursor = Some(parent_id.to_string());
        let mut steps = 0;
        while let Some(current) = cursor {
            if current == clip_id || steps > state.clips.len() {
                return Err(TimelineError::ParentCycle {
                    id: clip_id.to_string(),
                    parent_id: parent_id.to_string(),
                });
            }
            cursor = state.clip(&current).and_then(|c| c.parent_clip_id.clone());
            steps += 1;
        }
    }
    state.require_clip_mut(clip_id)?.parent_clip_id = parent_id.map(str::to_string);
    Ok(())
}

// ---------------------------------------------------------------------------
// Multicam groups
// ---------------------------------------------------------------------------

/// Group clips for multicam editing. The first id is the master.
///
/// With `offsets` (one per id), each member is repositioned to
/// `master.start + offset - offsets[0]` and whatever it lands on is trimmed;
/// otherwise the current relative positions are recorded. Clips already in
/// a group leave it first.
pub fn create_linked_group(
    state: &mut TimelineState,
    clip_ids: &[&str],
    offsets: Option<&[f64]>,
) -> TimelineResult<String> {
    let [master_id, ..] = clip_ids else {
        return Err(TimelineError::invalid("a group needs at least two clips"));
    };
    if clip_ids.len() < 2 {
        return Err(TimelineError::invalid("a group needs at least two clips"));
    }
    if offsets.is_some_and(|o| o.len() != clip_ids.len()) {
        return Err(TimelineError::invalid("one offset per grouped clip is required"));
    }
    for id in clip_ids {
        state.require_clip(id)?;
    }

    for id in clip_ids {
        if let Some(old) = state.clip(id).and_then(|c| c.linked_group_id.clone()) {
            leave_group(state, &old, id);
            if let Some(clip) = state.clip_mut(id) {
                clip.linked_group_id = None;
            }
        }
    }

    let master_start = state.require_clip(master_id)?.start_time;
    if let Some(offsets) = offsets {
        place_group_members(state, clip_ids, master_start, offsets)?;
    }

    let group_id = new_id("group");
    let mut group_offsets = BTreeMap::new();
    for id in clip_ids {
        let clip = state.require_clip_mut(id)?;
        clip.linked_group_id = Some(group_id.clone());
        group_offsets.insert(id.to_string(), clip.start_time - master_start);
    }
    state.linked_groups.insert(
        group_id.clone(),
        LinkedGroup {
            master_clip_id: master_id.to_string(),
            offsets: group_offsets,
        },
    );
    debug!(group_id = %group_id, members = clip_ids.len(), "Linked group created");
    Ok(group_id)
}

/// Move each non-master member to `master_start + offset - offsets[0]`,
/// taking its linked partner along by the same delta. The delta is limited
/// so neither side of the pair crosses zero. Members that would overlap one
/// another are an error; anything else they land on is trimmed.
fn place_group_members(
    state: &mut TimelineState,
    clip_ids: &[&str],
    master_start: f64,
    offsets: &[f64],
) -> TimelineResult<()> {
    let base = offsets[0];
    let mut shifts: Vec<(String, f64)> = Vec::new();
    for (id, offset) in clip_ids.iter().zip(offsets).skip(1) {
        let clip = state.require_clip(id)?;
        let partner = clip
            .linked_clip_id
            .as_deref()
            .filter(|p| !clip_ids.contains(p))
            .and_then(|p| state.clip(p));
        let earliest = partner.map_or(clip.start_time, |p| p.start_time.min(clip.start_time));
        let delta = (master_start + offset - base - clip.start_time).max(-earliest);
        shifts.push((id.to_string(), delta));
        if let Some(partner) = partner {
            shifts.push((partner.id.clone(), delta));
        }
    }

    for (id, delta) in &shifts {
        if delta.abs() <= TIME_EPSILON {
            continue;
        }
        clear_clip_transitions(state, id)?;
        let clip = state.require_clip_mut(id)?;
        clip.start_time = (clip.start_time + delta).max(0.0);
    }

    let mut grouped: Vec<String> = clip_ids.iter().map(|s| s.to_string()).collect();
    for id in clip_ids {
        grouped.extend(state.clip(id).and_then(|c| c.linked_clip_id.clone()));
    }
    grouped.sort();
    grouped.dedup();
    ensure_disjoint(state, &grouped)?;

    for (id, delta) in &shifts {
        if delta.abs() <= TIME_EPSILON {
            continue;
        }
        let clip = state.require_clip(id)?;
        let (start, track_id, duration) = (clip.start_time, clip.track_id.clone(), clip.duration);
        trim_overlapping_clips(state, id, start, &track_id, duration, &grouped)?;
    }
    Ok(())
}

/// Fail if any two of `ids` overlap on a shared track. A pair joined by a
/// transition may overlap.
fn ensure_disjoint(state: &TimelineState, ids: &[String]) -> TimelineResult<()> {
    let clips: Vec<&Clip> = ids.iter().filter_map(|id| state.clip(id)).collect();
    for (i, a) in clips.iter().enumerate() {
        for b in &clips[i + 1..] {
            let joined = a.transition_ids().any(|t| b.transition_ids().any(|u| u == t));
            if a.track_id == b.track_id && !joined && a.overlaps(b.start_time, b.end_time()) {
                return Err(TimelineError::invalid(format!(
                    "{} and {} would overlap on {}",
                    a.id, b.id, a.track_id
                )));
            }
        }
    }
    Ok(())
}

/// Dissolve a group; its clips stay where they are.
pub fn unlink_group(state: &mut TimelineState, group_id: &str) -> TimelineResult<()> {
    let group = state
        .linked_groups
        .remove(group_id)
        .ok_or_else(|| TimelineError::GroupNotFound {
            group_id: group_id.to_string(),
        })?;
    for member in group.offsets.keys() {
        if let Some(clip) = state.clip_mut(member) {
            clip.linked_group_id = None;
        }
    }
    Ok(())
}

/// Re-derive a group's offsets from the current clip positions.
fn refresh_group_offsets(state: &mut TimelineState, group_id: &str) {
    let Some(group) = state.linked_groups.get(group_id) else {
        return;
    };
    let Some(master_start) = state.clip(&group.master_clip_id).map(|c| c.start_time) else {
        return;
    };
    let offsets: BTreeMap<String, f64> = group
        .offsets
        .keys()
        .filter_map(|id| state.clip(id).map(|c| (id.clone(), c.start_time - master_start)))
        .collect();
    if let Some(group) = state.linked_groups.get_mut(group_id) {
        group.offsets = offsets;
    }
}

/// Drop `clip_id` from a group. A group left with fewer than two members
/// is dissolved; a group losing its master promotes the next member.
fn leave_group(state: &mut TimelineState, group_id: &str, clip_id: &str) {
    let Some(group) = state.linked_groups.get_mut(group_id) else {
        return;
    };
    group.offsets.remove(clip_id);
    if group.offsets.len() < 2 {
        let rest: Vec<String> = group.offsets.keys().cloned().collect();
        state.linked_groups.remove(group_id);
        for member in rest {
            if let Some(clip) = state.clip_mut(&member) {
                clip.linked_group_id = None;
            }
        }
        return;
    }
    if group.master_clip_id == clip_id {
        if let Some(next) = group.offsets.keys().next().cloned() {
            group.master_clip_id = next;
        }
        let base = group.offsets.get(&group.master_clip_id).copied().unwrap_or(0.0);
        for offset in group.offsets.values_mut() {
            *offset -= base;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MediaSource;
    use ms_common::TimelineConfig;
    use ms_timeline_eval::Easing;

    fn solid(id: &str, track: &str, start: f64, duration: f64) -> Clip {
        Clip::new(id, track, id, ClipSource::Solid { color: "#000".into() }, start, duration)
    }

    fn video(id: &str, track: &str, start: f64, duration: f64, natural: f64) -> Clip {
        let source = ClipSource::Video(MediaSource::empty(None, natural));
        Clip::new(id, track, id, source, start, duration)
    }

    fn audio(id: &str, track: &str, start: f64, duration: f64, natural: f64) -> Clip {
        let source = ClipSource::Audio(MediaSource::empty(None, natural));
        Clip::new(id, track, id, source, start, duration)
    }

    fn state_with(clips: Vec<Clip>) -> TimelineState {
        let mut state = TimelineState::new(&TimelineConfig::default());
        state.clips = clips;
        state
    }

    fn link(state: &mut TimelineState, a: &str, b: &str) {
        link_clips(state, a, b).unwrap();
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-9, "expected {expected}, got {actual}");
    }

    #[test]
    fn video_import_creates_linked_audio_placeholder() {
        let config = TimelineConfig::default();
        let ctx = EditContext { config: &config, playhead: 0.0 };
        let mut state = TimelineState::new(&config);
        let file = MediaFile::new("clip.mp4", "/media/clip.mp4", MediaKind::Video);

        let id = add_clip(&mut state, &ctx, "video-1", file, 1.0, Some(8.0), None).unwrap();
        let clip = state.clip(&id).unwrap();
        assert!(clip.is_loading());
        assert_close(clip.duration, 8.0);

        let partner = state.linked_partner(&id).unwrap();
        assert_eq!(partner.track_id, "audio-1");
        assert_eq!(partner.kind(), MediaKind::Audio);
        assert_eq!(partner.linked_clip_id.as_deref(), Some(id.as_str()));
        assert_eq!(state.pending_loads.len(), 2);
        assert_eq!(state.media_library.len(), 1);
    }

    #[test]
    fn audio_placeholder_gets_new_track_when_busy() {
        let config = TimelineConfig::default();
        let ctx = EditContext { config: &config, playhead: 0.0 };
        let mut state = state_with(vec![audio("busy", "audio-1", 0.0, 10.0, 10.0)]);
        let file = MediaFile::new("clip.mp4", "/media/clip.mp4", MediaKind::Video);

        let id = add_clip(&mut state, &ctx, "video-1", file, 0.0, Some(4.0), None).unwrap();
        let partner = state.linked_partner(&id).unwrap();
        assert_ne!(partner.track_id, "audio-1");
        assert_eq!(state.tracks.len(), 3);
    }

    #[test]
    fn import_rejects_wrong_track_and_locked_track() {
        let config = TimelineConfig::default();
        let ctx = EditContext { config: &config, playhead: 0.0 };
        let mut state = TimelineState::new(&config);
        let file = MediaFile::new("song.wav", "/media/song.wav", MediaKind::Audio);
        let err = add_clip(&mut state, &ctx, "video-1", file.clone(), 0.0, None, None).unwrap_err();
        assert!(matches!(err, TimelineError::WrongTrackType { .. }));

        state.tracks[1].locked = true;
        let err = add_clip(&mut state, &ctx, "audio-1", file, 0.0, None, None).unwrap_err();
        assert!(matches!(err, TimelineError::TrackLocked { .. }));
        assert!(state.clips.is_empty());
    }

    #[test]
    fn generated_clips_avoid_overlap() {
        let config = TimelineConfig::default();
        let ctx = EditContext { config: &config, playhead: 0.0 };
        let mut state = state_with(vec![solid("a", "video-1", 0.0, 4.0)]);
        let id = add_solid_clip(&mut state, &ctx, "video-1", "#ff0000", 3.0, Some(2.0)).unwrap();
        assert_close(state.clip(&id).unwrap().start_time, 4.0);

        let text = add_text_clip(&mut state, &ctx, "video-1", TextProperties::default(), 10.0, None).unwrap();
        let text = state.clip(&text).unwrap();
        assert_eq!(text.kind(), MediaKind::Text);
        assert_close(text.duration, 5.0);
    }

    #[test]
    fn moving_over_a_clip_deletes_what_it_covers() {
        let config = TimelineConfig::default();
        let ctx = EditContext { config: &config, playhead: 0.0 };
        let mut state = state_with(vec![solid("a", "video-1", 0.0, 5.0), solid("b", "video-1", 4.0, 2.0)]);

        move_clip(&mut state, &ctx, "a", 3.0, None, false, false).unwrap();
        assert_close(state.clip("a").unwrap().start_time, 3.0);
        assert!(state.clip("b").is_none());
    }

    #[test]
    fn linked_partner_moves_by_same_delta() {
        let config = TimelineConfig::default();
        let ctx = EditContext { config: &config, playhead: 0.0 };
        let mut state = state_with(vec![
            video("v", "video-1", 1.0, 4.0, 10.0),
            audio("a", "audio-1", 1.0, 4.0, 10.0),
        ]);
        link(&mut state, "v", "a");

        move_clip(&mut state, &ctx, "v", 6.0, None, false, false).unwrap();
        assert_close(state.clip("a").unwrap().start_time, 6.0);

        move_clip(&mut state, &ctx, "v", 8.0, None, true, false).unwrap();
        assert_close(state.clip("v").unwrap().start_time, 8.0);
        assert_close(state.clip("a").unwrap().start_time, 6.0);
    }

    #[test]
    fn move_to_wrong_track_type_is_rejected() {
        let config = TimelineConfig::default();
        let ctx = EditContext { config: &config, playhead: 0.0 };
        let mut state = state_with(vec![solid("s", "video-1", 0.0, 2.0)]);
        let err = move_clip(&mut state, &ctx, "s", 0.0, Some("audio-1"), false, false).unwrap_err();
        assert!(matches!(err, TimelineError::WrongTrackType { .. }));
    }

    #[test]
    fn move_clears_transitions() {
        let config = TimelineConfig::default();
        let ctx = EditContext { config: &config, playhead: 0.0 };
        let mut state = state_with(vec![solid("a", "video-1", 0.0, 4.0), solid("b", "video-1", 4.0, 4.0)]);
        crate::transitions::apply_transition(
            &mut state,
            "a",
            "b",
            ms_timeline_eval::TransitionKind::Crossfade,
            Some(1.0),
        )
        .unwrap();

        move_clip(&mut state, &ctx, "b", 12.0, None, false, false).unwrap();
        assert!(state.clip("a").unwrap().transition_out.is_none());
        assert!(state.clip("b").unwrap().transition_in.is_none());
    }

    #[test]
    fn end_edge_stops_at_next_clip_and_source_end() {
        let config = TimelineConfig::default();
        let ctx = EditContext { config: &config, playhead: 0.0 };
        let mut state = state_with(vec![
            video("v", "video-1", 0.0, 4.0, 10.0),
            solid("next", "video-1", 6.0, 2.0),
        ]);

        trim_clip_edge(&mut state, &ctx, "v", ClipEdge::End, 9.0, true).unwrap();
        let v = state.clip("v").unwrap();
        assert_close(v.end_time(), 6.0);
        assert_close(v.out_point, 6.0);

        state.clips.retain(|c| c.id != "next");
        trim_clip_edge(&mut state, &ctx, "v", ClipEdge::End, 20.0, true).unwrap();
        assert_close(state.clip("v").unwrap().out_point, 10.0);
    }

    #[test]
    fn start_edge_respects_in_point_and_propagates() {
        let config = TimelineConfig::default();
        let ctx = EditContext { config: &config, playhead: 0.0 };
        let mut v = video("v", "video-1", 5.0, 4.0, 10.0);
        v.in_point = 2.0;
        v.out_point = 6.0;
        let mut a = audio("a", "audio-1", 5.0, 4.0, 10.0);
        a.in_point = 2.0;
        a.out_point = 6.0;
        let mut state = state_with(vec![v, a]);
        link(&mut state, "v", "a");

        trim_clip_edge(&mut state, &ctx, "v", ClipEdge::Start, 1.0, true).unwrap();
        for id in ["v", "a"] {
            let clip = state.clip(id).unwrap();
            assert_close(clip.start_time, 3.0);
            assert_close(clip.in_point, 0.0);
            assert_close(clip.duration, 6.0);
        }
    }

    #[test]
    fn edge_keeps_one_frame() {
        let config = TimelineConfig::default();
        let ctx = EditContext { config: &config, playhead: 0.0 };
        let mut state = state_with(vec![solid("s", "video-1", 0.0, 2.0)]);
        trim_clip_edge(&mut state, &ctx, "s", ClipEdge::End, -5.0, false).unwrap();
        assert_close(state.clip("s").unwrap().duration, 1.0 / 30.0);
    }

    #[test]
    fn edge_drag_through_transition_restores_the_incoming_clip() {
        let config = TimelineConfig::default();
        let ctx = EditContext { config: &config, playhead: 0.0 };
        let crossfaded = || {
            let mut state = state_with(vec![
                video("a", "video-1", 0.0, 4.0, 10.0),
                video("b", "video-1", 4.0, 4.0, 10.0),
            ]);
            crate::transitions::apply_transition(
                &mut state,
                "a",
                "b",
                ms_timeline_eval::TransitionKind::Crossfade,
                Some(1.0),
            )
            .unwrap();
            assert_close(state.clip("b").unwrap().start_time, 3.0);
            state
        };

        let mut state = crossfaded();
        trim_clip_edge(&mut state, &ctx, "a", ClipEdge::End, 4.5, false).unwrap();
        let (a, b) = (state.clip("a").unwrap(), state.clip("b").unwrap());
        assert_close(a.duration, 4.0);
        assert_close(b.start_time, 4.0);
        assert!(a.transition_out.is_none() && b.transition_in.is_none());

        let mut state = crossfaded();
        trim_clip_edge(&mut state, &ctx, "a", ClipEdge::End, 3.5, false).unwrap();
        assert_close(state.clip("a").unwrap().duration, 3.5);
        assert_close(state.clip("b").unwrap().start_time, 4.0);

        let mut state = crossfaded();
        trim_clip_edge(&mut state, &ctx, "b", ClipEdge::Start, 5.0, false).unwrap();
        let b = state.clip("b").unwrap();
        assert_close(b.start_time, 5.0);
        assert_close(b.duration, 3.0);
        assert_close(state.clip("a").unwrap().end_time(), 4.0);
    }

    #[test]
    fn trim_clip_recomputes_duration_and_clamps_to_next() {
        let mut state = state_with(vec![
            video("v", "video-1", 0.0, 2.0, 10.0),
            solid("next", "video-1", 5.0, 1.0),
        ]);
        trim_clip(&mut state, "v", 1.0, 4.0).unwrap();
        assert_close(state.clip("v").unwrap().duration, 3.0);

        trim_clip(&mut state, "v", 1.0, 9.0).unwrap();
        let v = state.clip("v").unwrap();
        assert_close(v.duration, 5.0);
        assert_close(v.out_point, 6.0);

        assert!(trim_clip(&mut state, "v", 0.0, 12.0).is_err());
    }

    #[test]
    fn split_produces_two_halves_with_fresh_ids() {
        let mut state = state_with(vec![video("v", "video-1", 0.0, 5.0, 10.0)]);
        let second = split_clip(&mut state, "v", 2.5).unwrap();

        assert!(state.clip("v").is_none());
        assert_eq!(state.clips.len(), 2);
        let first = state.clips.iter().find(|c| c.id != second).unwrap();
        assert_close(first.duration, 2.5);
        assert_close(first.out_point, 2.5);
        let second_clip = state.clip(&second).unwrap();
        assert_close(second_clip.start_time, 2.5);
        assert_close(second_clip.in_point, 2.5);
        assert_close(second_clip.out_point, 5.0);
        assert_eq!(state.selection.selected_clips(), [second.clone()]);
    }

    #[test]
    fn split_rejects_edges() {
        let mut state = state_with(vec![solid("s", "video-1", 1.0, 2.0)]);
        assert!(matches!(
            split_clip(&mut state, "s", 1.0),
            Err(TimelineError::SplitOutOfBounds { .. })
        ));
        assert!(split_clip(&mut state, "s", 3.0).is_err());
    }

    #[test]
    fn split_relinks_partner_halves_pairwise() {
        let mut state = state_with(vec![
            video("v", "video-1", 0.0, 4.0, 10.0),
            audio("a", "audio-1", 0.0, 4.0, 10.0),
        ]);
        link(&mut state, "v", "a");
        split_clip(&mut state, "v", 1.0).unwrap();

        assert_eq!(state.clips.len(), 4);
        for clip in &state.clips {
            let partner = state.linked_partner(&clip.id).unwrap();
            assert_eq!(partner.linked_clip_id.as_deref(), Some(clip.id.as_str()));
            assert_close(partner.start_time, clip.start_time);
        }
    }

    #[test]
    fn split_divides_keyframes_with_boundary_values() {
        let mut state = state_with(vec![solid("s", "video-1", 0.0, 4.0)]);
        state.keyframes.insert(
            "s".into(),
            vec![
                Keyframe::new("k1", "s", AnimatableProperty::Opacity, 0.0, 0.0, Easing::Linear),
                Keyframe::new("k2", "s", AnimatableProperty::Opacity, 4.0, 1.0, Easing::Linear),
            ],
        );
        let second = split_clip(&mut state, "s", 1.0).unwrap();
        let first = state.clips.iter().find(|c| c.id != second).unwrap().id.clone();

        let first_kfs = state.clip_keyframes(&first);
        assert_eq!(first_kfs.len(), 2);
        assert_close(first_kfs[1].time, 1.0);
        assert_close(first_kfs[1].value, 0.25);

        let second_kfs = state.clip_keyframes(&second);
        assert_eq!(second_kfs.len(), 2);
        assert_close(second_kfs[0].time, 0.0);
        assert_close(second_kfs[0].value, 0.25);
        assert_close(second_kfs[1].time, 3.0);
        assert!(second_kfs.iter().all(|k| k.clip_id == second));
        assert!(state.keyframes.get("s").is_none());
    }

    #[test]
    fn remove_takes_partner_unless_skipped() {
        let mut state = state_with(vec![
            video("v", "video-1", 0.0, 4.0, 10.0),
            audio("a", "audio-1", 0.0, 4.0, 10.0),
        ]);
        link(&mut state, "v", "a");
        let mut skipped = state.clone();

        let removed = remove_clip(&mut state, "v", false).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(state.clips.is_empty());

        remove_clip(&mut skipped, "v", true).unwrap();
        assert!(skipped.clip("a").unwrap().linked_clip_id.is_none());
    }

    #[test]
    fn parent_cycles_are_rejected() {
        let mut state = state_with(vec![
            solid("a", "video-1", 0.0, 1.0),
            solid("b", "video-1", 1.0, 1.0),
            solid("c", "video-1", 2.0, 1.0),
        ]);
        set_clip_parent(&mut state, "b", Some("a")).unwrap();
        set_clip_parent(&mut state, "c", Some("b")).unwrap();
        assert!(matches!(
            set_clip_parent(&mut state, "a", Some("c")),
            Err(TimelineError::ParentCycle { .. })
        ));
        assert!(matches!(
            set_clip_parent(&mut state, "a", Some("a")),
            Err(TimelineError::SelfParent { .. })
        ));
        remove_clip(&mut state, "a", false).unwrap();
        assert!(state.clip("b").unwrap().parent_clip_id.is_none());
    }

    #[test]
    fn speed_change_rescales_duration() {
        let mut state = state_with(vec![video("v", "video-1", 0.0, 4.0, 10.0)]);
        set_clip_speed(&mut state, "v", 2.0).unwrap();
        assert_close(state.clip("v").unwrap().duration, 2.0);
        set_clip_speed(&mut state, "v", 0.5).unwrap();
        assert_close(state.clip("v").unwrap().duration, 8.0);
        assert!(set_clip_speed(&mut state, "v", 0.0).is_err());
    }

    #[test]
    fn slowing_an_outgoing_clip_pushes_the_incoming_one() {
        let mut state = state_with(vec![
            video("a", "video-1", 0.0, 4.0, 10.0),
            video("b", "video-1", 4.0, 4.0, 10.0),
        ]);
        crate::transitions::apply_transition(
            &mut state,
            "a",
            "b",
            ms_timeline_eval::TransitionKind::Crossfade,
            Some(1.0),
        )
        .unwrap();

        set_clip_speed(&mut state, "a", 0.5).unwrap();
        let (a, b) = (state.clip("a").unwrap(), state.clip("b").unwrap());
        assert_close(a.duration, 8.0);
        assert_close(b.start_time, 8.0);
        assert_close(b.duration, 4.0);
        assert!(a.transition_out.is_none() && b.transition_in.is_none());
    }

    #[test]
    fn removing_effect_drops_its_keyframes() {
        let mut state = state_with(vec![solid("s", "video-1", 0.0, 4.0)]);
        let effect = add_effect(&mut state, "s", "brightness").unwrap();
        set_effect_param(&mut state, "s", &effect, "amount", ParamValue::Float(0.3)).unwrap();
        state.keyframes.insert(
            "s".into(),
            vec![
                Keyframe::new("k1", "s", AnimatableProperty::effect(&effect, "amount"), 0.0, 0.0, Easing::Linear),
                Keyframe::new("k2", "s", AnimatableProperty::Opacity, 0.0, 1.0, Easing::Linear),
            ],
        );

        remove_effect(&mut state, "s", &effect).unwrap();
        assert!(state.clip("s").unwrap().effects.is_empty());
        assert_eq!(state.clip_keyframes("s").len(), 1);
        assert!(matches!(
            remove_effect(&mut state, "s", &effect),
            Err(TimelineError::EffectNotFound { .. })
        ));
    }

    #[test]
    fn masks_add_update_remove() {
        let mut state = state_with(vec![solid("s", "video-1", 0.0, 4.0)]);
        let id = add_mask(&mut state, "s", Mask::rectangle("", 0.0, 0.0, 1.0, 1.0)).unwrap();
        assert!(id.starts_with("mask-"));

        let mut mask = state.clip("s").unwrap().masks[0].clone();
        mask.feather = 12.0;
        update_mask(&mut state, "s", mask).unwrap();
        assert_close(state.clip("s").unwrap().masks[0].feather, 12.0);

        remove_mask(&mut state, "s", &id).unwrap();
        assert!(remove_mask(&mut state, "s", &id).is_err());
    }

    #[test]
    fn group_members_follow_the_master() {
        let config = TimelineConfig::default();
        let ctx = EditContext { config: &config, playhead: 0.0 };
        let mut state = state_with(vec![solid("m", "video-1", 0.0, 4.0), audio("cam2", "audio-1", 0.0, 4.0, 10.0)]);
        let group = create_linked_group(&mut state, &["m", "cam2"], Some(&[0.0, 0.5][..])).unwrap();
        assert_close(state.clip("cam2").unwrap().start_time, 0.5);

        move_clip(&mut state, &ctx, "m", 2.0, None, false, false).unwrap();
        assert_close(state.clip("cam2").unwrap().start_time, 2.5);

        move_clip(&mut state, &ctx, "cam2", 3.5, None, false, true).unwrap();
        assert_close(state.linked_groups[&group].offsets["cam2"], 1.5);

        remove_clip(&mut state, "cam2", false).unwrap();
        assert!(state.linked_groups.is_empty());
        assert!(state.clip("m").unwrap().linked_group_id.is_none());
    }

    #[test]
    fn group_offsets_that_stack_members_are_rejected() {
        let pair = || state_with(vec![solid("m", "video-1", 0.0, 4.0), solid("n", "video-1", 10.0, 4.0)]);
        let mut state = pair();
        let err = create_linked_group(&mut state, &["m", "n"], Some(&[0.0, 1.0][..])).unwrap_err();
        assert!(matches!(err, TimelineError::InvalidOperation { .. }));

        let mut state = pair();
        create_linked_group(&mut state, &["m", "n"], Some(&[0.0, 4.0][..])).unwrap();
        assert_close(state.clip("n").unwrap().start_time, 4.0);
    }

    #[test]
    fn grouping_carries_the_linked_partner() {
        let config = TimelineConfig::default();
        let mut state = state_with(vec![
            solid("m", "video-1", 0.0, 4.0),
            audio("a", "audio-1", 10.0, 4.0, 10.0),
        ]);
        let cam = add_track(&mut state, &config, TrackType::Video);
        state.clips.push(video("v", &cam, 10.0, 4.0, 10.0));
        link(&mut state, "v", "a");

        create_linked_group(&mut state, &["m", "v"], Some(&[0.0, 6.0][..])).unwrap();
        assert_close(state.clip("v").unwrap().start_time, 6.0);
        assert_close(state.clip("a").unwrap().start_time, 6.0);
    }

    #[test]
    fn group_move_stops_at_zero_for_every_member() {
        let config = TimelineConfig::default();
        let ctx = EditContext { config: &config, playhead: 0.0 };
        let mut state = state_with(vec![solid("m", "video-1", 5.0, 4.0), audio("cam2", "audio-1", 1.0, 2.0, 10.0)]);
        create_linked_group(&mut state, &["m", "cam2"], None).unwrap();

        move_clip(&mut state, &ctx, "m", 2.0, None, false, false).unwrap();
        assert_close(state.clip("m").unwrap().start_time, 4.0);
        assert_close(state.clip("cam2").unwrap().start_time, 0.0);
    }

    #[test]
    fn group_move_onto_a_member_is_rejected() {
        let config = TimelineConfig::default();
        let ctx = EditContext { config: &config, playhead: 0.0 };
        let mut state = state_with(vec![solid("m", "video-1", 0.0, 4.0)]);
        let cam = add_track(&mut state, &config, TrackType::Video);
        state.clips.push(solid("n", &cam, 0.0, 4.0));
        create_linked_group(&mut state, &["m", "n"], None).unwrap();

        let err = move_clip(&mut state, &ctx, "m", 0.5, Some(&cam), false, false).unwrap_err();
        assert!(matches!(err, TimelineError::InvalidOperation { .. }));
    }
}
