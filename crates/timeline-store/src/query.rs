//! Read-side queries for the compositor and the audio mixer.
//!
//! `resolve_layers` walks the video tracks back to front, samples every
//! active clip (keyframes, parent chain, transitions), and flattens nested
//! compositions into the same list.

use std::collections::HashMap;

use ms_common::{ClipTransform, LayerDesc, TimelineConfig, TrackType};
use ms_timeline_eval::{
    apply_effect_keyframes, apply_keyframes, compose, compute_progress, evaluate_transition,
    resolve_world_transform, source_offset, source_time, ClipPlacement, Keyframe, TransformSource,
};

use crate::error::TimelineResult;
use crate::state::TimelineState;
use crate::tracks::{is_track_audible, is_track_effectively_visible};
use crate::types::{Clip, ClipSource, Track};

/// Nested compositions deeper than this are not rendered.
const MAX_RESOLVE_DEPTH: usize = 8;

/// Top-level clips under the playhead at `time`, in track order.
pub fn get_clips_at_time(state: &TimelineState, time: f64) -> Vec<&Clip> {
    state
        .tracks
        .iter()
        .flat_map(|track| state.clips_on_track(&track.id).filter(|c| c.is_active_at(time)))
        .collect()
}

/// Clips the mixer should hear at `time`: loaded audio on audible tracks.
pub fn get_audible_clips_at_time(state: &TimelineState, time: f64) -> Vec<&Clip> {
    state
        .tracks
        .iter()
        .filter(|t| t.track_type == TrackType::Audio && is_track_audible(state, &t.id))
        .flat_map(|track| {
            state
                .clips_on_track(&track.id)
                .filter(|c| c.is_active_at(time) && !c.is_loading())
        })
        .collect()
}

/// One timeline level: the top-level state or a nested composition.
struct Scope<'a> {
    tracks: &'a [Track],
    clips: &'a [Clip],
    keyframes: &'a HashMap<String, Vec<Keyframe>>,
    root: Option<&'a TimelineState>,
}

impl<'a> Scope<'a> {
    fn clip(&self, clip_id: &str) -> Option<&'a Clip> {
        self.clips.iter().find(|c| c.id == clip_id)
    }

    fn keyframes_of(&self, clip_id: &str) -> &'a [Keyframe] {
        self.keyframes.get(clip_id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn is_visible(&self, track: &Track) -> bool {
        match self.root {
            Some(state) => is_track_effectively_visible(state, &track.id),
            None => track.visible,
        }
    }
}

impl TransformSource for Scope<'_> {
    fn placement(&self, clip_id: &str) -> Option<ClipPlacement<'_>> {
        self.clip(clip_id).map(|c| ClipPlacement {
            start_time: c.start_time,
            parent_clip_id: c.parent_clip_id.as_deref(),
        })
    }

    fn local_transform(&self, clip_id: &str, local_time: f64) -> Option<ClipTransform> {
        self.clip(clip_id)
            .map(|c| apply_keyframes(&c.transform, self.keyframes_of(clip_id), local_time))
    }
}

/// Layers visible at `time`, sorted back to front.
pub fn resolve_layers(state: &TimelineState, config: &TimelineConfig, time: f64) -> TimelineResult<Vec<LayerDesc>> {
    let scope = Scope {
        tracks: &state.tracks,
        clips: &state.clips,
        keyframes: &state.keyframes,
        root: Some(state),
    };
    let mut layers = Vec::new();
    resolve_scope(&scope, config, time, &ClipTransform::default(), 1.0, 0, &mut layers)?;
    for (z, layer) in layers.iter_mut().enumerate() {
        layer.z_order = z as i32;
    }
    Ok(layers)
}

fn resolve_scope(
    scope: &Scope<'_>,
    config: &TimelineConfig,
    time: f64,
    outer: &ClipTransform,
    outer_weight: f64,
    depth: usize,
    out: &mut Vec<LayerDesc>,
) -> TimelineResult<()> {
    // Track 0 is the front layer, so walk backwards.
    for track in scope
        .tracks
        .iter()
        .rev()
        .filter(|t| t.track_type == TrackType::Video && scope.is_visible(t))
    {
        for clip in scope
            .clips
            .iter()
            .filter(|c| c.track_id == track.id && c.is_active_at(time) && !c.is_loading())
        {
            let local = time - clip.start_time;
            let transform = compose(
                outer,
                &resolve_world_transform(scope, &clip.id, local, config.max_parent_depth)?,
            );
            let weight = outer_weight * transition_weight(clip, time);
            let keyframes = scope.keyframes_of(&clip.id);
            let offset = source_offset(local, clip.speed, keyframes);
            let media_time = source_time(clip.in_point, clip.out_point, clip.reversed, offset);

            if let ClipSource::Composition { .. } = clip.source {
                if let Some(nested) = clip.nested.as_deref().filter(|_| depth < MAX_RESOLVE_DEPTH) {
                    let inner = Scope {
                        tracks: &nested.tracks,
                        clips: &nested.clips,
                        keyframes: &nested.keyframes,
                        root: None,
                    };
                    resolve_scope(&inner, config, media_time, &transform, weight, depth + 1, out)?;
                }
                continue;
            }

            out.push(LayerDesc {
                clip_id: clip.id.clone(),
                track_id: track.id.clone(),
                source_kind: clip.kind(),
                media: clip.source.handle().cloned(),
                source_time: media_time,
                transform,
                effects: apply_effect_keyframes(&clip.effects, keyframes, local),
                masks: clip.masks.iter().filter(|m| m.visible).cloned().collect(),
                transition_weight: weight,
                z_order: 0,
            });
        }
    }
    Ok(())
}

/// Opacity weight from a transition covering `time`, 1.0 outside of one.
fn transition_weight(clip: &Clip, time: f64) -> f64 {
    if let Some(t) = &clip.transition_in {
        if time < clip.start_time + t.duration {
            let progress = compute_progress(time, clip.start_time, t.duration);
            return evaluate_transition(t.kind, progress).incoming;
        }
    }
    if let Some(t) = &clip.transition_out {
        let start = clip.end_time() - t.duration;
        if time >= start {
            let progress = compute_progress(time, start, t.duration);
            return evaluate_transition(t.kind, progress).outgoing;
        }
    }
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use ms_common::MediaKind;
    use ms_project::{TextProperties, TransitionRef};
    use ms_timeline_eval::TransitionKind;

    use crate::types::NestedTimeline;

    fn solid(id: &str, track: &str, start: f64, duration: f64) -> Clip {
        Clip::new(id, track, id, ClipSource::Solid { color: "#000".into() }, start, duration)
    }

    fn setup() -> (TimelineState, TimelineConfig) {
        let config = TimelineConfig::default();
        let mut state = TimelineState::new(&config);
        state.tracks.insert(0, Track::new("video-2", "Video 2", TrackType::Video, 60));
        (state, config)
    }

    #[test]
    fn clips_at_time_follow_track_order() {
        let (mut state, _) = setup();
        state.clips.push(solid("back", "video-1", 0.0, 5.0));
        state.clips.push(solid("front", "video-2", 1.0, 5.0));
        state.clips.push(solid("later", "video-1", 6.0, 1.0));
        let ids: Vec<&str> = get_clips_at_time(&state, 2.0).iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["front", "back"]);
    }

    #[test]
    fn layers_are_back_to_front_and_respect_visibility() {
        let (mut state, config) = setup();
        state.clips.push(solid("back", "video-1", 0.0, 5.0));
        state.clips.push(solid("front", "video-2", 0.0, 5.0));

        let layers = resolve_layers(&state, &config, 1.0).unwrap();
        let ids: Vec<&str> = layers.iter().map(|l| l.clip_id.as_str()).collect();
        assert_eq!(ids, ["back", "front"]);
        assert_eq!(layers[1].z_order, 1);

        state.track_mut("video-2").unwrap().visible = false;
        assert_eq!(resolve_layers(&state, &config, 1.0).unwrap().len(), 1);
    }

    #[test]
    fn crossfade_weights_both_sides() {
        let (mut state, config) = setup();
        let transition = |linked: &str| TransitionRef {
            id: "t".into(),
            kind: TransitionKind::Crossfade,
            duration: 1.0,
            linked_clip_id: linked.into(),
        };
        let mut a = solid("a", "video-1", 0.0, 5.0);
        a.transition_out = Some(transition("b"));
        let mut b = solid("b", "video-1", 4.0, 3.0);
        b.transition_in = Some(transition("a"));
        state.clips = vec![a, b];

        let layers = resolve_layers(&state, &config, 4.25).unwrap();
        assert_eq!(layers.len(), 2);
        let weight = |id: &str| layers.iter().find(|l| l.clip_id == id).unwrap().transition_weight;
        assert!((weight("a") - 0.75).abs() < 1e-9);
        assert!((weight("b") - 0.25).abs() < 1e-9);
    }

    #[test]
    fn nested_layers_are_flattened_with_outer_transform() {
        let (mut state, config) = setup();
        let mut comp = Clip::new(
            "comp",
            "video-1",
            "Comp",
            ClipSource::Composition {
                composition_id: "inner".into(),
            },
            2.0,
            4.0,
        );
        comp.transform.opacity = 0.5;
        let mut inner_text = Clip::new(
            "nested-comp-t",
            "nested-comp-v",
            "Title",
            ClipSource::Text(TextProperties::default()),
            1.0,
            2.0,
        );
        inner_text.transform.opacity = 0.5;
        comp.nested = Some(Box::new(NestedTimeline {
            tracks: vec![Track::new("nested-comp-v", "Video 1", TrackType::Video, 60)],
            clips: vec![inner_text],
            keyframes: HashMap::new(),
            duration: 4.0,
        }));
        state.clips.push(comp);

        // global 3.5 -> nested 1.5, inside the text clip
        let layers = resolve_layers(&state, &config, 3.5).unwrap();
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].clip_id, "nested-comp-t");
        assert_eq!(layers[0].source_kind, MediaKind::Text);
        assert!((layers[0].transform.opacity - 0.25).abs() < 1e-9);

        // global 2.5 -> nested 0.5, before the text clip
        assert!(resolve_layers(&state, &config, 2.5).unwrap().is_empty());
    }

    #[test]
    fn audible_clips_skip_muted_tracks() {
        let (mut state, _) = setup();
        let audio = Clip::new(
            "a",
            "audio-1",
            "a.wav",
            ClipSource::Audio(crate::types::MediaSource::empty(None, 4.0)),
            0.0,
            4.0,
        );
        state.clips.push(audio);
        assert_eq!(get_audible_clips_at_time(&state, 1.0).len(), 1);
        state.track_mut("audio-1").unwrap().muted = true;
        assert!(get_audible_clips_at_time(&state, 1.0).is_empty());
    }
}
