//! Keyframe editing, recording mode, and interpolated property queries.
//!
//! Keyframe times are clip-local. The per-clip lists in
//! `TimelineState::keyframes` stay sorted by time after every edit.

use tracing::debug;

use ms_common::{ClipTransform, Effect, ParamValue, TimelineConfig};
use ms_timeline_eval::{
    apply_effect_keyframes, apply_keyframes, keyframed_properties, resolve_world_transform,
    source_offset, source_time, value_at, AnimatableProperty, BezierHandle, ClipPlacement, Easing,
    Keyframe, TransformSource,
};

use crate::clips::{set_clip_speed, set_effect_param};
use crate::error::{TimelineError, TimelineResult};
use crate::state::TimelineState;
use crate::types::{new_id, EditContext, TIME_EPSILON};

fn keyframe_not_found(keyframe_id: &str) -> TimelineError {
    TimelineError::KeyframeNotFound {
        keyframe_id: keyframe_id.to_string(),
    }
}

fn invalid_property(clip_id: &str, property: &AnimatableProperty) -> TimelineError {
    TimelineError::InvalidProperty {
        clip_id: clip_id.to_string(),
        property: property.to_string(),
    }
}

fn sort_by_time(keyframes: &mut [Keyframe]) {
    keyframes.sort_by(|a, b| a.time.total_cmp(&b.time));
}

/// Locate a keyframe as (clip id, index in that clip's list).
fn locate(state: &TimelineState, keyframe_id: &str) -> Option<(String, usize)> {
    state.keyframes.iter().find_map(|(clip_id, kfs)| {
        kfs.iter()
            .position(|k| k.id == keyframe_id)
            .map(|i| (clip_id.clone(), i))
    })
}

fn keyframe_mut<'a>(state: &'a mut TimelineState, keyframe_id: &str) -> TimelineResult<&'a mut Keyframe> {
    state
        .keyframes
        .values_mut()
        .flatten()
        .find(|k| k.id == keyframe_id)
        .ok_or_else(|| keyframe_not_found(keyframe_id))
}

/// Effect-parameter properties must name an effect the clip has.
fn check_property(state: &TimelineState, clip_id: &str, property: &AnimatableProperty) -> TimelineResult<()> {
    let clip = state.require_clip(clip_id)?;
    if let Some(effect_id) = property.effect_id() {
        if clip.effect(effect_id).is_none() {
            return Err(invalid_property(clip_id, property));
        }
    }
    Ok(())
}

/// Add a keyframe, or overwrite the value and easing of the one already at
/// the same (property, time). `time` defaults to the playhead and is clamped
/// to the clip. A clip's first keyframe expands its track.
pub fn add_keyframe(
    state: &mut TimelineState,
    ctx: &EditContext<'_>,
    clip_id: &str,
    property: AnimatableProperty,
    value: f64,
    time: Option<f64>,
    easing: Easing,
) -> TimelineResult<String> {
    check_property(state, clip_id, &property)?;
    if !value.is_finite() {
        return Err(invalid_property(clip_id, &property));
    }
    let clip = state.require_clip(clip_id)?;
    let time = time
        .unwrap_or(ctx.playhead - clip.start_time)
        .clamp(0.0, clip.duration.max(0.0));
    let track_id = clip.track_id.clone();

    let keyframes = state.keyframes.entry(clip_id.to_string()).or_default();
    let first = keyframes.is_empty();
    if let Some(existing) = keyframes
        .iter_mut()
        .find(|k| k.property == property && (k.time - time).abs() < TIME_EPSILON)
    {
        existing.value = value;
        existing.easing = easing;
        debug!(clip_id, keyframe_id = %existing.id, %property, time, value, "Keyframe overwritten");
        return Ok(existing.id.clone());
    }

    let id = new_id("kf");
    debug!(clip_id, keyframe_id = %id, %property, time, value, "Keyframe added");
    keyframes.push(Keyframe::new(&id, clip_id, property, time, value, easing));
    sort_by_time(keyframes);
    if first {
        state.expanded_tracks.insert(track_id);
    }
    Ok(id)
}

pub fn remove_keyframe(state: &mut TimelineState, keyframe_id: &str) -> TimelineResult<()> {
    let (clip_id, index) = locate(state, keyframe_id).ok_or_else(|| keyframe_not_found(keyframe_id))?;
    if let Some(kfs) = state.keyframes.get_mut(&clip_id) {
        kfs.remove(index);
        if kfs.is_empty() {
            state.keyframes.remove(&clip_id);
        }
    }
    state.selection.deselect_keyframe(keyframe_id);
    Ok(())
}

/// Retime a keyframe within its clip. A keyframe of the same property
/// already at the target time is replaced.
pub fn move_keyframe(state: &mut TimelineState, keyframe_id: &str, new_time: f64) -> TimelineResult<()> {
    let (clip_id, index) = locate(state, keyframe_id).ok_or_else(|| keyframe_not_found(keyframe_id))?;
    let duration = state.require_clip(&clip_id)?.duration.max(0.0);
    let time = new_time.clamp(0.0, duration);

    let Some(kfs) = state.keyframes.get_mut(&clip_id) else {
        return Err(keyframe_not_found(keyframe_id));
    };
    let property = kfs[index].property.clone();
    kfs[index].time = time;
    let displaced: Vec<String> = kfs
        .iter()
        .filter(|k| k.id != keyframe_id && k.property == property && (k.time - time).abs() < TIME_EPSILON)
        .map(|k| k.id.clone())
        .collect();
    kfs.retain(|k| !displaced.contains(&k.id));
    sort_by_time(kfs);
    for id in &displaced {
        state.selection.deselect_keyframe(id);
    }
    Ok(())
}

pub fn update_keyframe_value(state: &mut TimelineState, keyframe_id: &str, value: f64) -> TimelineResult<()> {
    let kf = keyframe_mut(state, keyframe_id)?;
    if !value.is_finite() {
        return Err(invalid_property(&kf.clip_id, &kf.property));
    }
    kf.value = value;
    Ok(())
}

pub fn set_keyframe_easing(state: &mut TimelineState, keyframe_id: &str, easing: Easing) -> TimelineResult<()> {
    keyframe_mut(state, keyframe_id)?.easing = easing;
    Ok(())
}

/// Set bezier handles; the keyframe switches to bezier easing.
pub fn set_keyframe_handles(
    state: &mut TimelineState,
    keyframe_id: &str,
    handle_in: Option<BezierHandle>,
    handle_out: Option<BezierHandle>,
) -> TimelineResult<()> {
    let kf = keyframe_mut(state, keyframe_id)?;
    kf.handle_in = handle_in;
    kf.handle_out = handle_out;
    kf.easing = Easing::Bezier;
    Ok(())
}

/// Distinct animated properties of a clip, in first-seen order.
pub fn clip_keyframed_properties(state: &TimelineState, clip_id: &str) -> Vec<AnimatableProperty> {
    keyframed_properties(state.clip_keyframes(clip_id))
}

fn has_keyframes_for(state: &TimelineState, clip_id: &str, property: &AnimatableProperty) -> bool {
    state
        .clip_keyframes(clip_id)
        .iter()
        .any(|k| &k.property == property)
}

// ---------------------------------------------------------------------------
// Recording and property writes
// ---------------------------------------------------------------------------

/// Flip recording for (clip, property). Returns the new state.
pub fn toggle_recording(state: &mut TimelineState, clip_id: &str, property: AnimatableProperty) -> TimelineResult<bool> {
    check_property(state, clip_id, &property)?;
    let key = (clip_id.to_string(), property);
    let recording = if state.recording.remove(&key) {
        false
    } else {
        state.recording.insert(key);
        true
    };
    Ok(recording)
}

pub fn is_recording(state: &TimelineState, clip_id: &str, property: &AnimatableProperty) -> bool {
    state
        .recording
        .iter()
        .any(|(c, p)| c == clip_id && p == property)
}

/// Write a property value. A property that is recording or already
/// keyframed gets a keyframe at the playhead; otherwise the static value
/// changes (speed also recomputes the clip duration).
pub fn set_property_value(
    state: &mut TimelineState,
    ctx: &EditContext<'_>,
    clip_id: &str,
    property: AnimatableProperty,
    value: f64,
) -> TimelineResult<()> {
    check_property(state, clip_id, &property)?;
    if is_recording(state, clip_id, &property) || has_keyframes_for(state, clip_id, &property) {
        add_keyframe(state, ctx, clip_id, property, value, None, Easing::default())?;
        return Ok(());
    }
    if !value.is_finite() {
        return Err(invalid_property(clip_id, &property));
    }

    match &property {
        AnimatableProperty::Speed => set_clip_speed(state, clip_id, value),
        AnimatableProperty::EffectParam { effect_id, param } => {
            set_effect_param(state, clip_id, effect_id, param, ParamValue::Float(value))
        }
        _ => {
            let clip = state.require_clip_mut(clip_id)?;
            write_transform_property(&mut clip.transform, &property, value);
            Ok(())
        }
    }
}

fn write_transform_property(transform: &mut ClipTransform, property: &AnimatableProperty, value: f64) {
    match property {
        AnimatableProperty::Opacity => transform.opacity = value.clamp(0.0, 1.0),
        AnimatableProperty::PositionX => transform.position.x = value,
        AnimatableProperty::PositionY => transform.position.y = value,
        AnimatableProperty::PositionZ => transform.position.z = value,
        AnimatableProperty::ScaleX => transform.scale.x = value,
        AnimatableProperty::ScaleY => transform.scale.y = value,
        AnimatableProperty::RotationX => transform.rotation.x = value,
        AnimatableProperty::RotationY => transform.rotation.y = value,
        AnimatableProperty::RotationZ => transform.rotation.z = value,
        AnimatableProperty::Speed | AnimatableProperty::EffectParam { .. } => {}
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

impl TransformSource for TimelineState {
    fn placement(&self, clip_id: &str) -> Option<ClipPlacement<'_>> {
        self.clip(clip_id).map(|c| ClipPlacement {
            start_time: c.start_time,
            parent_clip_id: c.parent_clip_id.as_deref(),
        })
    }

    fn local_transform(&self, clip_id: &str, local_time: f64) -> Option<ClipTransform> {
        self.clip(clip_id)
            .map(|c| apply_keyframes(&c.transform, self.clip_keyframes(clip_id), local_time))
    }
}

/// The clip's transform at `local_time`, composed with its parent chain.
pub fn get_interpolated_transform(
    state: &TimelineState,
    config: &TimelineConfig,
    clip_id: &str,
    local_time: f64,
) -> TimelineResult<ClipTransform> {
    Ok(resolve_world_transform(state, clip_id, local_time, config.max_parent_depth)?)
}

/// The clip's effects with animated parameters evaluated at `local_time`.
pub fn get_interpolated_effects(state: &TimelineState, clip_id: &str, local_time: f64) -> TimelineResult<Vec<Effect>> {
    let clip = state.require_clip(clip_id)?;
    Ok(apply_effect_keyframes(&clip.effects, state.clip_keyframes(clip_id), local_time))
}

pub fn get_interpolated_speed(state: &TimelineState, clip_id: &str, local_time: f64) -> TimelineResult<f64> {
    let clip = state.require_clip(clip_id)?;
    Ok(value_at(state.clip_keyframes(clip_id), &AnimatableProperty::Speed, local_time).unwrap_or(clip.speed))
}

/// Source media time shown at clip-local `local_time`, honoring speed
/// keyframes and reversal.
pub fn get_source_time(state: &TimelineState, clip_id: &str, local_time: f64) -> TimelineResult<f64> {
    let clip = state.require_clip(clip_id)?;
    let offset = source_offset(local_time, clip.speed, state.clip_keyframes(clip_id));
    Ok(source_time(clip.in_point, clip.out_point, clip.reversed, offset))
}

// ---------------------------------------------------------------------------
// Track expansion bookkeeping
// ---------------------------------------------------------------------------

pub fn toggle_track_expanded(state: &mut TimelineState, track_id: &str) -> TimelineResult<bool> {
    state.require_track(track_id)?;
    if state.expanded_tracks.remove(track_id) {
        Ok(false)
    } else {
        state.expanded_tracks.insert(track_id.to_string());
        Ok(true)
    }
}

pub fn toggle_curve_editor(state: &mut TimelineState, track_id: &str, property: AnimatableProperty) -> TimelineResult<bool> {
    state.require_track(track_id)?;
    let key = (track_id.to_string(), property);
    if state.expanded_curve_editors.remove(&key) {
        Ok(false)
    } else {
        state.expanded_curve_editors.insert(key);
        Ok(true)
    }
}

/// Rendered height of a track: the base height, plus one row per animated
/// property of the selected clip on it and one curve editor per open
/// editor among those properties, when the track is expanded.
pub fn track_display_height(state: &TimelineState, config: &TimelineConfig, track_id: &str) -> TimelineResult<u32> {
    let track = state.require_track(track_id)?;
    if !state.expanded_tracks.contains(track_id) {
        return Ok(track.height);
    }
    let Some(clip_id) = state
        .selection
        .selected_clips()
        .iter()
        .find(|id| state.clip(id).is_some_and(|c| c.track_id == track_id))
    else {
        return Ok(track.height);
    };

    let properties = clip_keyframed_properties(state, clip_id);
    let curves = properties
        .iter()
        .filter(|p| state.expanded_curve_editors.contains(&(track_id.to_string(), (*p).clone())))
        .count();
    let rows = properties.len() as u32;
    Ok(track.height + rows * config.keyframe_row_height + curves as u32 * config.curve_editor_height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clips::add_effect;
    use crate::types::{Clip, ClipSource};

    fn setup() -> (TimelineState, TimelineConfig) {
        let config = TimelineConfig::default();
        let mut state = TimelineState::new(&config);
        state.clips.push(Clip::new(
            "c",
            "video-1",
            "C",
            ClipSource::Solid { color: "#fff".into() },
            2.0,
            4.0,
        ));
        (state, config)
    }

    #[test]
    fn same_time_overwrites_instead_of_duplicating() {
        let (mut state, config) = setup();
        let ctx = EditContext { config: &config, playhead: 0.0 };
        let a = add_keyframe(&mut state, &ctx, "c", AnimatableProperty::Opacity, 0.5, Some(1.0), Easing::Linear).unwrap();
        let b = add_keyframe(&mut state, &ctx, "c", AnimatableProperty::Opacity, 0.8, Some(1.0), Easing::EaseIn).unwrap();
        assert_eq!(a, b);
        let kfs = state.clip_keyframes("c");
        assert_eq!(kfs.len(), 1);
        assert!((kfs[0].value - 0.8).abs() < 1e-9);
        assert_eq!(kfs[0].easing, Easing::EaseIn);
    }

    #[test]
    fn default_time_is_playhead_clamped_to_clip() {
        let (mut state, config) = setup();
        let ctx = EditContext { config: &config, playhead: 3.5 };
        add_keyframe(&mut state, &ctx, "c", AnimatableProperty::ScaleX, 2.0, None, Easing::Linear).unwrap();
        let ctx = EditContext { config: &config, playhead: 20.0 };
        add_keyframe(&mut state, &ctx, "c", AnimatableProperty::ScaleX, 3.0, None, Easing::Linear).unwrap();

        let times: Vec<f64> = state.clip_keyframes("c").iter().map(|k| k.time).collect();
        assert!((times[0] - 1.5).abs() < 1e-9);
        assert!((times[1] - 4.0).abs() < 1e-9);
        assert!(state.expanded_tracks.contains("video-1"));
    }

    #[test]
    fn keyframes_stay_sorted_after_move() {
        let (mut state, config) = setup();
        let ctx = EditContext { config: &config, playhead: 0.0 };
        let early = add_keyframe(&mut state, &ctx, "c", AnimatableProperty::Opacity, 0.0, Some(0.5), Easing::Linear).unwrap();
        add_keyframe(&mut state, &ctx, "c", AnimatableProperty::Opacity, 1.0, Some(2.0), Easing::Linear).unwrap();
        move_keyframe(&mut state, &early, 3.0).unwrap();
        let kfs = state.clip_keyframes("c");
        assert_eq!(kfs[1].id, early);
        assert!((kfs[1].time - 3.0).abs() < 1e-9);
    }

    #[test]
    fn effect_keyframes_need_an_existing_effect() {
        let (mut state, config) = setup();
        let ctx = EditContext { config: &config, playhead: 0.0 };
        let missing = AnimatableProperty::effect("nope", "amount");
        assert!(matches!(
            add_keyframe(&mut state, &ctx, "c", missing, 1.0, None, Easing::Linear),
            Err(TimelineError::InvalidProperty { .. })
        ));

        let effect = add_effect(&mut state, "c", "blur").unwrap();
        let prop = AnimatableProperty::effect(&effect, "radius");
        add_keyframe(&mut state, &ctx, "c", prop.clone(), 0.0, Some(0.0), Easing::Linear).unwrap();
        add_keyframe(&mut state, &ctx, "c", prop, 10.0, Some(2.0), Easing::Linear).unwrap();
        let effects = get_interpolated_effects(&state, "c", 1.0).unwrap();
        assert_eq!(effects[0].get_param("radius").and_then(ParamValue::as_float), Some(5.0));
    }

    #[test]
    fn property_write_is_static_until_keyframed() {
        let (mut state, config) = setup();
        let ctx = EditContext { config: &config, playhead: 3.0 };
        set_property_value(&mut state, &ctx, "c", AnimatableProperty::Opacity, 0.4).unwrap();
        assert!((state.clip("c").unwrap().transform.opacity - 0.4).abs() < 1e-9);
        assert!(state.clip_keyframes("c").is_empty());

        assert!(toggle_recording(&mut state, "c", AnimatableProperty::Opacity).unwrap());
        set_property_value(&mut state, &ctx, "c", AnimatableProperty::Opacity, 0.9).unwrap();
        assert_eq!(state.clip_keyframes("c").len(), 1);
        assert!((state.clip_keyframes("c")[0].time - 1.0).abs() < 1e-9);

        // keyframed properties never go back to static writes
        assert!(!toggle_recording(&mut state, "c", AnimatableProperty::Opacity).unwrap());
        let ctx = EditContext { config: &config, playhead: 5.0 };
        set_property_value(&mut state, &ctx, "c", AnimatableProperty::Opacity, 0.1).unwrap();
        assert_eq!(state.clip_keyframes("c").len(), 2);
        assert!((state.clip("c").unwrap().transform.opacity - 0.4).abs() < 1e-9);
    }

    #[test]
    fn static_speed_write_retimes_clip() {
        let (mut state, config) = setup();
        let ctx = EditContext { config: &config, playhead: 0.0 };
        set_property_value(&mut state, &ctx, "c", AnimatableProperty::Speed, 2.0).unwrap();
        assert!((state.clip("c").unwrap().duration - 2.0).abs() < 1e-9);
    }

    #[test]
    fn child_composes_with_animated_parent() {
        let (mut state, config) = setup();
        let mut child = Clip::new("child", "video-1", "Child", ClipSource::Solid { color: "#000".into() }, 2.0, 4.0);
        child.parent_clip_id = Some("c".into());
        child.transform.opacity = 0.5;
        state.clips.push(child);

        let ctx = EditContext { config: &config, playhead: 0.0 };
        add_keyframe(&mut state, &ctx, "c", AnimatableProperty::Opacity, 1.0, Some(0.0), Easing::Linear).unwrap();
        add_keyframe(&mut state, &ctx, "c", AnimatableProperty::Opacity, 0.0, Some(2.0), Easing::Linear).unwrap();

        let world = get_interpolated_transform(&state, &config, "child", 1.0).unwrap();
        assert!((world.opacity - 0.25).abs() < 1e-9);
    }

    #[test]
    fn source_time_follows_speed_and_reversal() {
        let (mut state, _) = setup();
        {
            let clip = state.clip_mut("c").unwrap();
            clip.in_point = 1.0;
            clip.out_point = 5.0;
            clip.speed = 2.0;
        }
        assert!((get_source_time(&state, "c", 1.0).unwrap() - 3.0).abs() < 1e-9);
        state.clip_mut("c").unwrap().reversed = true;
        assert!((get_source_time(&state, "c", 1.0).unwrap() - 3.0).abs() < 1e-9);
        assert!((get_source_time(&state, "c", 0.5).unwrap() - 4.0).abs() < 1e-9);
        assert!((get_interpolated_speed(&state, "c", 0.0).unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn display_height_counts_rows_and_curves() {
        let (mut state, config) = setup();
        let ctx = EditContext { config: &config, playhead: 0.0 };
        add_keyframe(&mut state, &ctx, "c", AnimatableProperty::Opacity, 1.0, Some(0.0), Easing::Linear).unwrap();
        add_keyframe(&mut state, &ctx, "c", AnimatableProperty::PositionX, 1.0, Some(0.0), Easing::Linear).unwrap();
        let base = state.track("video-1").unwrap().height;

        // nothing selected: base height only
        assert_eq!(track_display_height(&state, &config, "video-1").unwrap(), base);

        state.selection.select_clip("c", false);
        toggle_curve_editor(&mut state, "video-1", AnimatableProperty::Opacity).unwrap();
        assert_eq!(
            track_display_height(&state, &config, "video-1").unwrap(),
            base + 2 * config.keyframe_row_height + config.curve_editor_height
        );

        assert!(!toggle_track_expanded(&mut state, "video-1").unwrap());
        assert_eq!(track_display_height(&state, &config, "video-1").unwrap(), base);
    }

    #[test]
    fn handles_switch_to_bezier() {
        let (mut state, config) = setup();
        let ctx = EditContext { config: &config, playhead: 0.0 };
        let id = add_keyframe(&mut state, &ctx, "c", AnimatableProperty::Opacity, 1.0, Some(0.0), Easing::Linear).unwrap();
        set_keyframe_handles(&mut state, &id, None, Some(BezierHandle { x: 0.3, y: 0.0 })).unwrap();
        assert_eq!(state.clip_keyframes("c")[0].easing, Easing::Bezier);
        remove_keyframe(&mut state, &id).unwrap();
        assert!(state.keyframes.get("c").is_none());
        assert!(matches!(remove_keyframe(&mut state, &id), Err(TimelineError::KeyframeNotFound { .. })));
    }
}
