//! Conversion between the live timeline and the serialized composition
//! format, and the project-file entry points built on it.
//!
//! Ids survive a round trip unchanged. Live media handles are never
//! serialized: file-backed clips come back as loading placeholders and are
//! reloaded through the media library.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{info, warn};

use ms_common::MediaKind;
use ms_project::{
    ClipData, CompositionData, LinkedGroupData, MarkerData, ProjectFile, TrackData,
};
use ms_timeline_eval::Keyframe;

use crate::error::TimelineResult;
use crate::media::stalled_loads;
use crate::nested::attach_nested;
use crate::state::TimelineState;
use crate::types::{Clip, ClipSource, LinkedGroup, Marker, MediaSource, Track};

const DEFAULT_SOLID_COLOR: &str = "#000000";

pub fn track_to_data(track: &Track) -> TrackData {
    TrackData {
        id: track.id.clone(),
        name: track.name.clone(),
        track_type: track.track_type,
        height: track.height,
        locked: track.locked,
        visible: track.visible,
        muted: track.muted,
        solo: track.solo,
        parent_track_id: track.parent_track_id.clone(),
    }
}

pub fn track_from_data(data: &TrackData) -> Track {
    Track {
        id: data.id.clone(),
        name: data.name.clone(),
        track_type: data.track_type,
        height: data.height,
        muted: data.muted,
        visible: data.visible,
        solo: data.solo,
        locked: data.locked,
        parent_track_id: data.parent_track_id.clone(),
    }
}

/// Serialize a clip with its keyframes inline.
pub fn clip_to_data(clip: &Clip, keyframes: &[Keyframe]) -> ClipData {
    let mut data = ClipData::new(&clip.id, &clip.track_id, clip.kind(), clip.start_time, clip.duration);
    data.name = clip.name.clone();
    data.media_file_id = clip.source.media_file_id().map(str::to_string);
    data.in_point = clip.in_point;
    data.out_point = clip.out_point;
    data.natural_duration = match &clip.source {
        ClipSource::Loading {
            kind,
            estimated_duration,
            ..
        } if kind.has_natural_duration() => Some(*estimated_duration),
        _ => clip.natural_duration(),
    };
    data.transform = clip.transform.clone();
    data.effects = clip.effects.clone();
    data.masks = clip.masks.clone();
    data.keyframes = keyframes.to_vec();
    data.speed = clip.speed;
    data.reversed = clip.reversed;
    data.linked_clip_id = clip.linked_clip_id.clone();
    data.linked_group_id = clip.linked_group_id.clone();
    data.parent_clip_id = clip.parent_clip_id.clone();
    data.transition_in = clip.transition_in.clone();
    data.transition_out = clip.transition_out.clone();

    match &clip.source {
        ClipSource::Composition { composition_id } => data.composition_id = Some(composition_id.clone()),
        ClipSource::Text(text) => data.text_properties = Some(text.clone()),
        ClipSource::Solid { color } => data.solid_color = Some(color.clone()),
        ClipSource::PendingDownload { url, .. } => data.source_url = Some(url.clone()),
        _ => {}
    }
    data
}

/// Rebuild a clip and its keyframes. File-backed clips come back loading
/// (or pending download); a file-backed clip with no media reference at
/// all comes back ready but empty. Nested timelines are attached by the
/// caller.
pub fn clip_from_data(data: &ClipData) -> (Clip, Vec<Keyframe>) {
    let kind = data.source_type;
    let source = match kind {
        MediaKind::Text => ClipSource::Text(data.text_properties.clone().unwrap_or_default()),
        MediaKind::Solid => ClipSource::Solid {
            color: data
                .solid_color
                .clone()
                .unwrap_or_else(|| DEFAULT_SOLID_COLOR.to_string()),
        },
        MediaKind::Composition => ClipSource::Composition {
            composition_id: data.composition_id.clone().unwrap_or_default(),
        },
        MediaKind::Video | MediaKind::Audio | MediaKind::Image => {
            let estimated = data
                .natural_duration
                .unwrap_or(data.out_point - data.in_point);
            match (&data.media_file_id, &data.source_url) {
                (Some(media_file_id), _) => ClipSource::Loading {
                    kind,
                    media_file_id: Some(media_file_id.clone()),
                    estimated_duration: estimated,
                },
                (None, Some(url)) => ClipSource::PendingDownload {
                    url: url.clone(),
                    kind,
                },
                (None, None) => ClipSource::ready(kind, MediaSource::empty(None, estimated))
                    .unwrap_or(ClipSource::Loading {
                        kind,
                        media_file_id: None,
                        estimated_duration: estimated,
                    }),
            }
        }
    };

    let clip = Clip {
        id: data.id.clone(),
        track_id: data.track_id.clone(),
        name: data.name.clone(),
        start_time: data.start_time.max(0.0),
        duration: data.duration,
        in_point: data.in_point,
        out_point: data.out_point,
        source,
        transform: data.transform.clone(),
        effects: data.effects.clone(),
        masks: data.masks.clone(),
        linked_clip_id: data.linked_clip_id.clone(),
        linked_group_id: data.linked_group_id.clone(),
        parent_clip_id: data.parent_clip_id.clone(),
        reversed: data.reversed,
        speed: data.speed,
        transition_in: data.transition_in.clone(),
        transition_out: data.transition_out.clone(),
        nested: None,
    };
    let mut keyframes = data.keyframes.clone();
    keyframes.sort_by(|a, b| a.time.total_cmp(&b.time));
    (clip, keyframes)
}

/// Serialize the live timeline.
pub fn to_composition(state: &TimelineState) -> CompositionData {
    let mut data = CompositionData::new(
        &state.composition_id,
        &state.composition_name,
        state.settings.width,
        state.settings.height,
        state.settings.frame_rate,
    );
    data.duration = state.duration;
    data.tracks = state.tracks.iter().map(track_to_data).collect();
    data.clips = state
        .clips
        .iter()
        .map(|c| clip_to_data(c, state.clip_keyframes(&c.id)))
        .collect();
    data.markers = state
        .markers
        .iter()
        .map(|m| MarkerData {
            id: m.id.clone(),
            time: m.time,
            label: m.label.clone(),
            color: m.color.clone(),
        })
        .collect();
    let mut groups: Vec<LinkedGroupData> = state
        .linked_groups
        .iter()
        .map(|(id, g)| LinkedGroupData {
            id: id.clone(),
            master_clip_id: g.master_clip_id.clone(),
            offsets: g.offsets.clone(),
        })
        .collect();
    groups.sort_by(|a, b| a.id.cmp(&b.id));
    data.linked_groups = groups;
    data
}

/// Replace the live timeline with `data`.
///
/// Clips on unknown tracks are dropped with a warning. Selection, recording
/// and the preview cache are reset; media loads are queued for every
/// file-backed clip, nested ones included.
pub fn load_composition(state: &mut TimelineState, data: &CompositionData) -> TimelineResult<()> {
    state.composition_id = data.id.clone();
    state.composition_name = data.name.clone();
    state.settings.width = data.width;
    state.settings.height = data.height;
    state.settings.frame_rate = data.frame_rate;

    state.tracks = data.tracks.iter().map(track_from_data).collect();
    state.clips.clear();
    state.keyframes.clear();
    for clip_data in &data.clips {
        if state.track(&clip_data.track_id).is_none() {
            warn!(clip_id = %clip_data.id, track_id = %clip_data.track_id, "Dropping clip on unknown track");
            continue;
        }
        let (clip, keyframes) = clip_from_data(clip_data);
        if !keyframes.is_empty() {
            state.keyframes.insert(clip.id.clone(), keyframes);
        }
        state.clips.push(clip);
    }

    drop_dangling_links(state);

    let composition_clips: Vec<String> = state
        .clips
        .iter()
        .filter(|c| matches!(c.source, ClipSource::Composition { .. }))
        .map(|c| c.id.clone())
        .collect();
    for clip_id in composition_clips {
        attach_nested(state, &clip_id)?;
    }

    state.markers = data
        .markers
        .iter()
        .map(|m| Marker {
            id: m.id.clone(),
            time: m.time,
            label: m.label.clone(),
            color: m.color.clone(),
        })
        .collect();
    state.markers.sort_by(|a, b| a.time.total_cmp(&b.time));

    state.linked_groups = data
        .linked_groups
        .iter()
        .filter_map(|g| {
            let offsets: BTreeMap<String, f64> = g
                .offsets
                .iter()
                .filter(|(id, _)| state.clip(id).is_some())
                .map(|(id, offset)| (id.clone(), *offset))
                .collect();
            if offsets.len() < 2 || !offsets.contains_key(&g.master_clip_id) {
                warn!(group_id = %g.id, "Dropping incomplete linked group");
                return None;
            }
            Some((
                g.id.clone(),
                LinkedGroup {
                    master_clip_id: g.master_clip_id.clone(),
                    offsets,
                },
            ))
        })
        .collect();
    let groups: HashSet<String> = state.linked_groups.keys().cloned().collect();
    for clip in &mut state.clips {
        if clip.linked_group_id.as_ref().is_some_and(|g| !groups.contains(g)) {
            clip.linked_group_id = None;
        }
    }

    state.selection.clear();
    state.recording.clear();
    state.expanded_tracks.clear();
    state.expanded_curve_editors.clear();
    state.cached_ranges.clear();
    state.recalculate_duration();

    for request in stalled_loads(state, |_| false) {
        state.schedule_load(request);
    }
    info!(
        composition_id = %data.id,
        tracks = state.tracks.len(),
        clips = state.clips.len(),
        "Composition loaded"
    );
    Ok(())
}

/// Clear links, transitions and parents that point at clips which did not
/// survive the load. A link must be symmetric to be kept.
fn drop_dangling_links(state: &mut TimelineState) {
    let links: HashMap<String, Option<String>> = state
        .clips
        .iter()
        .map(|c| (c.id.clone(), c.linked_clip_id.clone()))
        .collect();
    for clip in &mut state.clips {
        if let Some(partner) = clip.linked_clip_id.as_deref() {
            let symmetric = links
                .get(partner)
                .is_some_and(|back| back.as_deref() == Some(clip.id.as_str()));
            if !symmetric {
                warn!(clip_id = %clip.id, partner, "Dropping dangling clip link");
                clip.linked_clip_id = None;
            }
        }
        for side in [&mut clip.transition_in, &mut clip.transition_out] {
            if side.as_ref().is_some_and(|t| !links.contains_key(&t.linked_clip_id)) {
                *side = None;
            }
        }
        if clip.parent_clip_id.as_ref().is_some_and(|p| !links.contains_key(p)) {
            warn!(clip_id = %clip.id, "Ignoring missing parent clip");
            clip.parent_clip_id = None;
        }
    }
}

/// Bundle the live timeline, the composition registry and the media
/// library into a project file.
pub fn to_project_file(state: &TimelineState, name: &str) -> ProjectFile {
    let mut project = ProjectFile::new(name, state.settings.clone());
    let mut media: Vec<_> = state.media_library.values().cloned().collect();
    media.sort_by(|a, b| a.id.cmp(&b.id));
    project.media = media;

    let mut compositions: Vec<CompositionData> = state.compositions.values().cloned().collect();
    compositions.sort_by(|a, b| a.id.cmp(&b.id));
    project.compositions = compositions;
    project.upsert_composition(to_composition(state));
    project.active_composition_id = Some(state.composition_id.clone());
    project
}

/// Load a project: media library, composition registry, then the active
/// composition (or the first one) into the live timeline.
pub fn load_project_file(state: &mut TimelineState, project: &ProjectFile) -> TimelineResult<()> {
    state.settings = project.settings.clone();
    state.media_library = project
        .media
        .iter()
        .map(|m| (m.id.clone(), m.clone()))
        .collect();
    state.compositions = project
        .compositions
        .iter()
        .map(|c| (c.id.clone(), c.clone()))
        .collect();

    let active = project
        .active_composition_id
        .as_deref()
        .and_then(|id| project.composition(id))
        .or_else(|| project.compositions.first());
    match active {
        Some(composition) => load_composition(state, composition)?,
        None => warn!(project = %project.name, "Project has no compositions"),
    }
    info!(project = %project.name, media = project.media.len(), "Project loaded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ms_common::{TimelineConfig, TrackType};
    use ms_project::{MediaFileRef, TextProperties, TransitionRef};
    use ms_timeline_eval::{AnimatableProperty, Easing, TransitionKind};

    fn sample_state() -> TimelineState {
        let mut state = TimelineState::new(&TimelineConfig::default());
        state.media_library.insert(
            "m1".into(),
            MediaFileRef {
                id: "m1".into(),
                name: "a.mp4".into(),
                kind: MediaKind::Video,
                source_path: "/media/a.mp4".into(),
                duration: Some(10.0),
                width: Some(1920),
                height: Some(1080),
                has_audio: Some(true),
            },
        );
        let mut video = Clip::new(
            "v1",
            "video-1",
            "a.mp4",
            ClipSource::Video(MediaSource::empty(Some("m1".into()), 10.0)),
            1.0,
            4.0,
        );
        video.in_point = 2.0;
        video.out_point = 6.0;
        video.transition_out = Some(TransitionRef {
            id: "t1".into(),
            kind: TransitionKind::Crossfade,
            duration: 0.5,
            linked_clip_id: "txt".into(),
        });
        let mut text = Clip::new("txt", "video-1", "Title", ClipSource::Text(TextProperties::default()), 4.5, 3.0);
        text.transition_in = Some(TransitionRef {
            id: "t1".into(),
            kind: TransitionKind::Crossfade,
            duration: 0.5,
            linked_clip_id: "v1".into(),
        });
        state.clips = vec![video, text];
        state.keyframes.insert(
            "txt".into(),
            vec![Keyframe::new("k1", "txt", AnimatableProperty::Opacity, 0.0, 0.0, Easing::EaseIn)],
        );
        state.markers.push(Marker {
            id: "mk".into(),
            time: 2.0,
            label: "Intro".into(),
            color: "#ffcc00".into(),
        });
        state.recalculate_duration();
        state
    }

    #[test]
    fn round_trip_preserves_ids_and_relations() {
        let state = sample_state();
        let data = to_composition(&state);
        assert!((data.duration - 7.5).abs() < 1e-9);

        let mut restored = TimelineState::new(&TimelineConfig::default());
        restored.media_library = state.media_library.clone();
        load_composition(&mut restored, &data).unwrap();

        assert_eq!(to_composition(&restored), data);
        let video = restored.clip("v1").unwrap();
        assert!(video.is_loading());
        assert_eq!(video.transition_out.as_ref().map(|t| t.id.as_str()), Some("t1"));
        assert_eq!(restored.clip_keyframes("txt").len(), 1);
        assert_eq!(restored.pending_loads.len(), 1);
        assert_eq!(restored.pending_loads[0].clip_id, "v1");
    }

    #[test]
    fn clips_on_unknown_tracks_are_dropped() {
        let mut data = to_composition(&sample_state());
        data.clips[0].track_id = "ghost".into();
        let mut state = TimelineState::new(&TimelineConfig::default());
        load_composition(&mut state, &data).unwrap();
        assert_eq!(state.clips.len(), 1);
    }

    #[test]
    fn dangling_links_are_dropped() {
        let mut data = to_composition(&sample_state());
        data.clips[0].linked_clip_id = Some("gone".into());
        data.clips.retain(|c| c.id != "txt");
        let mut state = TimelineState::new(&TimelineConfig::default());
        state.media_library = sample_state().media_library;
        load_composition(&mut state, &data).unwrap();
        let clip = state.clip("v1").unwrap();
        assert!(clip.linked_clip_id.is_none());
        assert!(clip.transition_out.is_none());
    }

    #[test]
    fn file_clip_without_media_reference_is_ready_but_empty() {
        let data = ClipData::new("c", "video-1", MediaKind::Video, 0.0, 2.0);
        let (clip, _) = clip_from_data(&data);
        assert!(!clip.is_loading());
        assert!(clip.source.handle().is_none());
    }

    #[test]
    fn project_file_round_trips_through_json() {
        let state = sample_state();
        let project = to_project_file(&state, "Demo");
        let json = ms_project::to_json_string(&project).unwrap();
        let parsed = ms_project::from_json_string(&json).unwrap();

        let mut restored = TimelineState::new(&TimelineConfig::default());
        load_project_file(&mut restored, &parsed).unwrap();
        assert_eq!(restored.clips.len(), 2);
        assert_eq!(restored.markers[0].label, "Intro");
        assert!(restored.media_library.contains_key("m1"));
        assert_eq!(restored.tracks[1].track_type, TrackType::Audio);
    }
}
