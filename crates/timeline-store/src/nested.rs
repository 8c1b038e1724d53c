//! Nested composition clips.
//!
//! A composition clip embeds a deep copy of a registered composition. Ids
//! inside the copy are namespaced as `nested-{parentClipId}-{id}` so media
//! events can address nested clips without colliding with the outer
//! timeline. Edits to the copy never flow back to the registry.

use std::collections::HashMap;

use tracing::{debug, warn};

use ms_common::MediaKind;
use ms_project::CompositionData;

use crate::clips::{check_track_accepts, push_clip};
use crate::composition::{clip_from_data, track_from_data};
use crate::error::{TimelineError, TimelineResult};
use crate::media::load_request_for;
use crate::positioning::find_non_overlapping_position;
use crate::state::TimelineState;
use crate::types::{new_id, Clip, ClipSource, EditContext, NestedTimeline};

/// Compositions nested deeper than this are cut off.
const MAX_NESTING_DEPTH: usize = 8;

fn nested_prefix(parent_clip_id: &str) -> String {
    format!("nested-{parent_clip_id}-")
}

/// Make a composition available for nesting, replacing any previous copy
/// with the same id. Existing composition clips keep their old copy.
pub fn register_composition(state: &mut TimelineState, composition: CompositionData) {
    debug!(composition_id = %composition.id, clips = composition.clips.len(), "Composition registered");
    state.compositions.insert(composition.id.clone(), composition);
}

/// Place a clip playing a registered composition. Returns the new clip id.
pub fn add_comp_clip(
    state: &mut TimelineState,
    ctx: &EditContext<'_>,
    track_id: &str,
    composition_id: &str,
    start: f64,
) -> TimelineResult<String> {
    check_track_accepts(state, track_id, MediaKind::Composition)?;
    if composition_id == state.composition_id {
        return Err(TimelineError::invalid("a composition cannot contain itself"));
    }
    let data = state
        .compositions
        .get(composition_id)
        .ok_or_else(|| TimelineError::CompositionNotFound {
            composition_id: composition_id.to_string(),
        })?;

    let id = new_id("clip");
    let nested = build_nested(&state.compositions, data, &id, 0)?;
    let duration = if nested.duration > 0.0 {
        nested.duration
    } else {
        ctx.config.default_generated_duration
    };
    let name = data.name.clone();

    let start = find_non_overlapping_position(state, &id, start, track_id, duration);
    let mut clip = Clip::new(
        &id,
        track_id,
        name,
        ClipSource::Composition {
            composition_id: composition_id.to_string(),
        },
        start,
        duration,
    );
    clip.nested = Some(Box::new(nested));
    push_clip(state, clip);
    schedule_loads_for(state, &id);

    debug!(clip_id = %id, track_id, composition_id, start, duration, "Composition clip added");
    Ok(id)
}

/// Build (or rebuild) the nested copy of a composition clip already in the
/// state. A composition missing from the registry leaves the clip without
/// content.
pub(crate) fn attach_nested(state: &mut TimelineState, clip_id: &str) -> TimelineResult<()> {
    let clip = state.require_clip(clip_id)?;
    let ClipSource::Composition { composition_id } = &clip.source else {
        return Ok(());
    };
    let Some(data) = state.compositions.get(composition_id) else {
        warn!(clip_id, %composition_id, "Nested composition missing from registry");
        return Ok(());
    };
    let nested = build_nested(&state.compositions, data, clip_id, 0)?;
    state.require_clip_mut(clip_id)?.nested = Some(Box::new(nested));
    Ok(())
}

/// Deep copy `data` for the composition clip `parent_clip_id`.
fn build_nested(
    registry: &HashMap<String, CompositionData>,
    data: &CompositionData,
    parent_clip_id: &str,
    depth: usize,
) -> TimelineResult<NestedTimeline> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(TimelineError::invalid(format!(
            "composition {} is nested more than {MAX_NESTING_DEPTH} levels deep",
            data.id
        )));
    }
    let prefix = nested_prefix(parent_clip_id);
    let scoped = |id: &str| format!("{prefix}{id}");

    let tracks = data
        .tracks
        .iter()
        .map(|t| {
            let mut track = track_from_data(t);
            track.id = scoped(&track.id);
            track.parent_track_id = track.parent_track_id.as_deref().map(scoped);
            track
        })
        .collect();

    let mut clips = Vec::with_capacity(data.clips.len());
    let mut keyframes = HashMap::new();
    for clip_data in &data.clips {
        let (mut clip, mut clip_keyframes) = clip_from_data(clip_data);
        rescope_clip(&mut clip, |id| scoped(id));
        for kf in &mut clip_keyframes {
            kf.id = scoped(&kf.id);
            kf.clip_id = clip.id.clone();
        }
        if let ClipSource::Composition { composition_id } = &clip.source {
            match registry.get(composition_id) {
                Some(inner) => {
                    clip.nested = Some(Box::new(build_nested(registry, inner, &clip.id, depth + 1)?));
                }
                None => warn!(clip_id = %clip.id, %composition_id, "Nested composition missing from registry"),
            }
        }
        if !clip_keyframes.is_empty() {
            keyframes.insert(clip.id.clone(), clip_keyframes);
        }
        clips.push(clip);
    }

    let duration = if data.duration > 0.0 {
        data.duration
    } else {
        clips.iter().map(Clip::end_time).fold(0.0_f64, f64::max)
    };
    Ok(NestedTimeline {
        tracks,
        clips,
        keyframes,
        duration,
    })
}

/// Apply `map` to every id a clip holds.
fn rescope_clip(clip: &mut Clip, map: impl Fn(&str) -> String) {
    clip.id = map(&clip.id);
    clip.track_id = map(&clip.track_id);
    for id in [
        &mut clip.linked_clip_id,
        &mut clip.linked_group_id,
        &mut clip.parent_clip_id,
    ]
    .into_iter()
    .flatten()
    {
        *id = map(id);
    }
    for transition in [&mut clip.transition_in, &mut clip.transition_out]
        .into_iter()
        .flatten()
    {
        transition.linked_clip_id = map(&transition.linked_clip_id);
    }
}

/// Re-namespace a nested copy after its composition clip got a new id.
pub(crate) fn rebind_nested_ids(nested: &mut NestedTimeline, old_parent: &str, new_parent: &str) {
    let old_prefix = nested_prefix(old_parent);
    let new_prefix = nested_prefix(new_parent);
    let rebind = |id: &str| match id.strip_prefix(&old_prefix) {
        Some(rest) => format!("{new_prefix}{rest}"),
        None => id.to_string(),
    };

    for track in &mut nested.tracks {
        track.id = rebind(&track.id);
        track.parent_track_id = track.parent_track_id.as_deref().map(&rebind);
    }
    for clip in &mut nested.clips {
        let old_id = clip.id.clone();
        rescope_clip(clip, &rebind);
        if let Some(inner) = clip.nested.as_deref_mut() {
            rebind_nested_ids(inner, &old_id, &clip.id);
        }
    }
    nested.keyframes = std::mem::take(&mut nested.keyframes)
        .into_iter()
        .map(|(clip_id, mut kfs)| {
            let clip_id = rebind(&clip_id);
            for kf in &mut kfs {
                kf.id = rebind(&kf.id);
                kf.clip_id = clip_id.clone();
            }
            (clip_id, kfs)
        })
        .collect();
}

/// Queue media loads for a top-level clip and every loading clip nested
/// inside it.
pub(crate) fn schedule_loads_for(state: &mut TimelineState, clip_id: &str) {
    let Some(clip) = state.clip(clip_id) else {
        return;
    };
    let mut requests = Vec::new();
    if let Some(nested) = clip.nested.as_deref() {
        collect_nested_loads(state, nested, &mut requests);
    }
    // A loading top-level clip was already queued when it was inserted.
    if clip.is_loading() && !state.pending_loads.iter().any(|r| r.clip_id == clip_id) {
        requests.extend(load_request_for(state, clip));
    }
    for request in requests {
        state.schedule_load(request);
    }
}

fn collect_nested_loads(
    state: &TimelineState,
    nested: &NestedTimeline,
    out: &mut Vec<crate::media::LoadRequest>,
) {
    for clip in &nested.clips {
        if clip.is_loading() {
            out.extend(load_request_for(state, clip));
        }
        if let Some(inner) = clip.nested.as_deref() {
            collect_nested_loads(state, inner, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ms_common::{TimelineConfig, TrackType};
    use ms_project::{ClipData, MediaFileRef, TrackData};

    fn comp_with_video(id: &str) -> CompositionData {
        let mut comp = CompositionData::new(id, "Inner", 1920, 1080, 30.0);
        comp.tracks.push(TrackData {
            id: "v".into(),
            name: "Video 1".into(),
            track_type: TrackType::Video,
            height: 60,
            locked: false,
            visible: true,
            muted: false,
            solo: false,
            parent_track_id: None,
        });
        let mut clip = ClipData::new("c1", "v", MediaKind::Video, 0.0, 3.0);
        clip.media_file_id = Some("m1".into());
        comp.clips.push(clip);
        comp.duration = 3.0;
        comp
    }

    fn setup() -> (TimelineState, TimelineConfig) {
        let config = TimelineConfig::default();
        let mut state = TimelineState::new(&config);
        state.media_library.insert(
            "m1".into(),
            MediaFileRef {
                id: "m1".into(),
                name: "inner.mp4".into(),
                kind: MediaKind::Video,
                source_path: "/media/inner.mp4".into(),
                duration: None,
                width: None,
                height: None,
                has_audio: None,
            },
        );
        register_composition(&mut state, comp_with_video("inner"));
        (state, config)
    }

    #[test]
    fn comp_clip_deep_copies_with_scoped_ids() {
        let (mut state, config) = setup();
        let ctx = EditContext { config: &config, playhead: 0.0 };
        let id = add_comp_clip(&mut state, &ctx, "video-1", "inner", 1.0).unwrap();

        let clip = state.clip(&id).unwrap();
        assert!((clip.duration - 3.0).abs() < 1e-9);
        let nested = clip.nested.as_deref().unwrap();
        let inner_id = format!("nested-{id}-c1");
        assert_eq!(nested.clips[0].id, inner_id);
        assert_eq!(nested.clips[0].track_id, format!("nested-{id}-v"));
        assert_eq!(state.pending_loads.len(), 1);
        assert_eq!(state.pending_loads[0].clip_id, inner_id);

        // the registry copy is untouched
        assert_eq!(state.compositions["inner"].clips[0].id, "c1");
    }

    #[test]
    fn self_nesting_and_unknown_compositions_are_rejected() {
        let (mut state, config) = setup();
        let ctx = EditContext { config: &config, playhead: 0.0 };
        let main = state.composition_id.clone();
        assert!(add_comp_clip(&mut state, &ctx, "video-1", &main, 0.0).is_err());
        assert!(matches!(
            add_comp_clip(&mut state, &ctx, "video-1", "missing", 0.0),
            Err(TimelineError::CompositionNotFound { .. })
        ));
        assert!(matches!(
            add_comp_clip(&mut state, &ctx, "audio-1", "inner", 0.0),
            Err(TimelineError::WrongTrackType { .. })
        ));
    }

    #[test]
    fn cyclic_registry_hits_depth_limit() {
        let (mut state, config) = setup();
        let mut loop_comp = CompositionData::new("loop", "Loop", 1920, 1080, 30.0);
        loop_comp.tracks = comp_with_video("x").tracks;
        let mut clip = ClipData::new("self", "v", MediaKind::Composition, 0.0, 2.0);
        clip.composition_id = Some("loop".into());
        loop_comp.clips.push(clip);
        register_composition(&mut state, loop_comp);

        let ctx = EditContext { config: &config, playhead: 0.0 };
        assert!(add_comp_clip(&mut state, &ctx, "video-1", "loop", 0.0).is_err());
    }

    #[test]
    fn rebind_renames_the_whole_subtree() {
        let (mut state, config) = setup();
        let ctx = EditContext { config: &config, playhead: 0.0 };
        let id = add_comp_clip(&mut state, &ctx, "video-1", "inner", 0.0).unwrap();
        let mut nested = state.clip(&id).unwrap().nested.as_deref().cloned().unwrap();

        rebind_nested_ids(&mut nested, &id, "fresh");
        assert_eq!(nested.clips[0].id, "nested-fresh-c1");
        assert_eq!(nested.tracks[0].id, "nested-fresh-v");
        assert_eq!(nested.clips[0].track_id, "nested-fresh-v");
    }
}
