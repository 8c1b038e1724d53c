//! Copy and paste of clips.
//!
//! The clipboard holds serialized clips (no media handles). Pasting gives
//! every clip a fresh id, keeps links between pasted clips, and reloads
//! file-backed media.

use std::collections::HashMap;

use tracing::debug;

use ms_project::ClipData;

use crate::clips::{check_track_accepts, push_clip};
use crate::composition::{clip_from_data, clip_to_data};
use crate::error::{TimelineError, TimelineResult};
use crate::nested::{attach_nested, schedule_loads_for};
use crate::positioning::{find_non_overlapping_position, trim_overlapping_clips};
use crate::state::TimelineState;
use crate::types::{new_id, ClipSource, EditContext};

/// Copied clips with their keyframes inline.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClipboardData {
    pub clips: Vec<ClipData>,
}

impl ClipboardData {
    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    fn earliest_start(&self) -> f64 {
        self.clips
            .iter()
            .map(|c| c.start_time)
            .fold(f64::INFINITY, f64::min)
    }
}

/// Copy the selected clips and their linked partners. Returns how many
/// clips were copied.
pub fn copy_selected_clips(state: &mut TimelineState) -> TimelineResult<usize> {
    let mut ids: Vec<String> = Vec::new();
    for id in state.selection.selected_clips() {
        let Some(clip) = state.clip(id) else {
            continue;
        };
        for candidate in std::iter::once(&clip.id).chain(clip.linked_clip_id.as_ref()) {
            if state.clip(candidate).is_some() && !ids.contains(candidate) {
                ids.push(candidate.clone());
            }
        }
    }
    if ids.is_empty() {
        return Err(TimelineError::invalid("no clips selected"));
    }

    let clips: Vec<ClipData> = state
        .clips
        .iter()
        .filter(|c| ids.contains(&c.id))
        .map(|c| clip_to_data(c, state.clip_keyframes(&c.id)))
        .collect();
    let count = clips.len();
    state.clipboard = Some(ClipboardData { clips });
    debug!(count, "Clips copied");
    Ok(count)
}

/// Paste the clipboard at the playhead. The earliest copied clip lands on
/// the playhead and the rest keep their relative timing; each clip is moved
/// off existing clips where possible and trims whatever it still covers.
/// Returns the new clip ids, which become the selection.
pub fn paste_clips(state: &mut TimelineState, ctx: &EditContext<'_>) -> TimelineResult<Vec<String>> {
    let data = state
        .clipboard
        .clone()
        .filter(|c| !c.is_empty())
        .ok_or(TimelineError::EmptyClipboard)?;
    let offset = ctx.playhead - data.earliest_start();

    let id_map: HashMap<&str, String> = data
        .clips
        .iter()
        .map(|c| (c.id.as_str(), new_id("clip")))
        .collect();
    let mut placed: HashMap<String, f64> = HashMap::new();
    let mut pasted: Vec<String> = Vec::new();

    for clip_data in &data.clips {
        check_track_accepts(state, &clip_data.track_id, clip_data.source_type)?;
        let (mut clip, keyframes) = clip_from_data(clip_data);
        let Some(new_clip_id) = id_map.get(clip_data.id.as_str()) else {
            continue;
        };
        clip.id = new_clip_id.clone();
        clip.linked_clip_id = clip_data
            .linked_clip_id
            .as_deref()
            .and_then(|old| id_map.get(old))
            .cloned();
        clip.parent_clip_id = clip_data.parent_clip_id.as_deref().and_then(|old| {
            id_map
                .get(old)
                .cloned()
                .or_else(|| state.clip(old).map(|p| p.id.clone()))
        });
        clip.linked_group_id = None;
        clip.transition_in = None;
        clip.transition_out = None;

        // A partner pasted earlier fixes this clip's position.
        let partner_start = clip_data.linked_clip_id.as_deref().and_then(|old| {
            let partner = data.clips.iter().find(|c| c.id == old)?;
            let start = placed.get(old)?;
            Some(start + (clip_data.start_time - partner.start_time))
        });
        let start = match partner_start {
            Some(start) => start.max(0.0),
            None => find_non_overlapping_position(
                state,
                &clip.id,
                (clip_data.start_time + offset).max(0.0),
                &clip.track_id,
                clip.duration,
            ),
        };
        clip.start_time = start;
        placed.insert(clip_data.id.clone(), start);

        let is_composition = matches!(clip.source, ClipSource::Composition { .. });
        let (id, track_id, duration) = (clip.id.clone(), clip.track_id.clone(), clip.duration);
        push_clip(state, clip);
        if is_composition {
            attach_nested(state, &id)?;
            schedule_loads_for(state, &id);
        }
        if !keyframes.is_empty() {
            let keyframes = keyframes
                .into_iter()
                .map(|mut kf| {
                    kf.id = new_id("kf");
                    kf.clip_id = id.clone();
                    kf
                })
                .collect();
            state.keyframes.insert(id.clone(), keyframes);
        }
        pasted.push(id.clone());
        trim_overlapping_clips(state, &id, start, &track_id, duration, &pasted)?;
    }

    state.selection.select_clips(pasted.iter().map(String::as_str));
    state.recalculate_duration();
    debug!(count = pasted.len(), offset, "Clips pasted");
    Ok(pasted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ms_common::{MediaKind, TimelineConfig};
    use ms_project::MediaFileRef;
    use ms_timeline_eval::{AnimatableProperty, Easing, Keyframe};

    use crate::types::{Clip, MediaSource};

    fn setup() -> (TimelineState, TimelineConfig) {
        let config = TimelineConfig::default();
        let mut state = TimelineState::new(&config);
        state.media_library.insert(
            "m1".into(),
            MediaFileRef {
                id: "m1".into(),
                name: "a.mp4".into(),
                kind: MediaKind::Video,
                source_path: "/media/a.mp4".into(),
                duration: Some(4.0),
                width: None,
                height: None,
                has_audio: Some(true),
            },
        );
        let mut video = Clip::new(
            "v",
            "video-1",
            "a.mp4",
            ClipSource::Video(MediaSource::empty(Some("m1".into()), 4.0)),
            1.0,
            4.0,
        );
        video.linked_clip_id = Some("a".into());
        let mut audio = Clip::new(
            "a",
            "audio-1",
            "a.mp4",
            ClipSource::Audio(MediaSource::empty(Some("m1".into()), 4.0)),
            1.0,
            4.0,
        );
        audio.linked_clip_id = Some("v".into());
        state.clips = vec![video, audio];
        state.keyframes.insert(
            "v".into(),
            vec![Keyframe::new("k", "v", AnimatableProperty::Opacity, 1.0, 0.5, Easing::Linear)],
        );
        (state, config)
    }

    #[test]
    fn copy_includes_linked_partner() {
        let (mut state, _) = setup();
        state.selection.select_clip("v", false);
        assert_eq!(copy_selected_clips(&mut state).unwrap(), 2);
        let clipboard = state.clipboard.as_ref().unwrap();
        assert_eq!(clipboard.clips[0].keyframes.len(), 1);
    }

    #[test]
    fn paste_remaps_ids_and_keeps_pairs_in_sync() {
        let (mut state, config) = setup();
        state.selection.select_clip("v", false);
        copy_selected_clips(&mut state).unwrap();

        let ctx = EditContext { config: &config, playhead: 10.0 };
        let pasted = paste_clips(&mut state, &ctx).unwrap();
        assert_eq!(pasted.len(), 2);

        let video = state.clip(&pasted[0]).unwrap();
        let audio = state.clip(&pasted[1]).unwrap();
        assert!((video.start_time - 10.0).abs() < 1e-9);
        assert!((audio.start_time - 10.0).abs() < 1e-9);
        assert_eq!(video.linked_clip_id.as_deref(), Some(audio.id.as_str()));
        assert_eq!(audio.linked_clip_id.as_deref(), Some(video.id.as_str()));
        assert!(video.is_loading());

        let kfs = state.clip_keyframes(&video.id);
        assert_eq!(kfs.len(), 1);
        assert_eq!(kfs[0].clip_id, video.id);
        assert_ne!(kfs[0].id, "k");

        assert_eq!(state.pending_loads.len(), 2);
        assert_eq!(state.selection.selected_clips(), pasted.as_slice());
    }

    #[test]
    fn paste_over_the_source_moves_aside() {
        let (mut state, config) = setup();
        state.selection.select_clip("v", false);
        copy_selected_clips(&mut state).unwrap();

        let ctx = EditContext { config: &config, playhead: 2.0 };
        let pasted = paste_clips(&mut state, &ctx).unwrap();
        let video = state.clip(&pasted[0]).unwrap();
        // [2,6) overlaps [1,5); the nearer free edge is after the original
        assert!((video.start_time - 5.0).abs() < 1e-9);
        assert!(state.clip("v").is_some());
    }

    #[test]
    fn empty_clipboard_is_an_error() {
        let (mut state, config) = setup();
        let ctx = EditContext { config: &config, playhead: 0.0 };
        assert!(matches!(paste_clips(&mut state, &ctx), Err(TimelineError::EmptyClipboard)));
    }
}
