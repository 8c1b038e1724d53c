//! `TimelineStore`: the single owner of the timeline state.
//!
//! Every edit goes through [`TimelineStore::commit`]: the state is
//! snapshotted, the slice function runs, and on failure the snapshot is put
//! back and the action becomes a logged no-op. On success the history gets
//! the snapshot, the duration is recomputed, the render cache is invalidated
//! once, and any media loads the action scheduled are started.
//!
//! Selection, track expansion, curve editors, and the clipboard are UI state:
//! they change without history or invalidation.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use ms_common::{
    ClipTransform, ConfigError, Effect, LayerDesc, Mask, MediaKind, ParamValue, TimelineConfig, TrackType,
    TransformPatch,
};
use ms_project::{CompositionData, TextProperties};
use ms_timeline_eval::{AnimatableProperty, BezierHandle, Easing, TransitionKind};

use crate::cancel::CancelToken;
use crate::clipboard;
use crate::clips;
use crate::composition;
use crate::error::TimelineResult;
use crate::history::HistoryManager;
use crate::keyframes;
use crate::markers;
use crate::media::{self, MediaEvent, MediaLoader, MediaProvider};
use crate::nested;
use crate::playback::{PlaybackState, SeekThrottle};
use crate::positioning::{self, PlacementResult, SnapResult};
use crate::query;
use crate::ram_preview::{CachedRanges, RamPreviewJob};
use crate::selection::SelectionState;
use crate::state::TimelineState;
use crate::tracks;
use crate::transitions;
use crate::types::{Clip, ClipEdge, EditContext, MediaFile, Track};

/// Notified once per committed mutation that changes rendered output.
pub trait CacheInvalidator: Send + Sync {
    fn invalidate_cache(&self);
}

/// Invalidator for stores without a renderer attached.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopInvalidator;

impl CacheInvalidator for NoopInvalidator {
    fn invalidate_cache(&self) {}
}

/// What a committed action touches besides the state itself.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Commit {
    /// Undoable, changes rendered output.
    Edit,
    /// Undoable, rendered output unchanged (markers).
    Document,
}

pub struct TimelineStore {
    config: TimelineConfig,
    state: TimelineState,
    history: HistoryManager<TimelineState>,
    playback: PlaybackState,
    seek_throttle: SeekThrottle,
    loader: MediaLoader,
    invalidator: Arc<dyn CacheInvalidator>,
    /// Token of the running RAM preview, cancelled by the next edit.
    ram_preview: Option<CancelToken>,
}

impl TimelineStore {
    pub fn new(
        config: TimelineConfig,
        provider: Arc<dyn MediaProvider>,
        invalidator: Arc<dyn CacheInvalidator>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let state = TimelineState::new(&config);
        let loader = MediaLoader::new(provider, &config);
        info!(
            history_limit = config.history_limit,
            preview_fps = %config.preview_fps,
            "Timeline store created"
        );
        Ok(Self {
            history: HistoryManager::new(config.history_limit),
            seek_throttle: SeekThrottle::new(Duration::from_millis(config.scrub_seek_interval_ms)),
            playback: PlaybackState::new(),
            state,
            loader,
            invalidator,
            ram_preview: None,
            config,
        })
    }

    // --- Core commit path ---

    fn commit<T>(
        &mut self,
        action: &'static str,
        kind: Commit,
        f: impl FnOnce(&mut TimelineState, &EditContext<'_>) -> TimelineResult<T>,
    ) -> Option<T> {
        let before = self.state.clone();
        let ctx = EditContext {
            config: &self.config,
            playhead: self.playback.current_time,
        };
        match f(&mut self.state, &ctx) {
            Ok(value) => {
                self.history.push(action, before);
                match kind {
                    Commit::Edit => self.after_edit(),
                    Commit::Document => self.state.prune_selection(),
                }
                debug!(action, "Action committed");
                Some(value)
            }
            Err(e) => {
                self.state = before;
                warn!(action, error = %e, "Action rejected");
                None
            }
        }
    }

    /// Run a UI-only change. Errors are logged; nothing is recorded.
    fn ui<T>(&mut self, action: &'static str, f: impl FnOnce(&mut TimelineState) -> TimelineResult<T>) -> Option<T> {
        match f(&mut self.state) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(action, error = %e, "Action rejected");
                None
            }
        }
    }

    fn after_edit(&mut self) {
        self.state.recalculate_duration();
        self.state.prune_selection();
        self.state.cached_ranges.clear();
        self.cancel_ram_preview();
        self.invalidator.invalidate_cache();
        for request in self.state.take_pending_loads() {
            self.loader.request(request);
        }
    }

    /// Swap in a snapshot from history or disk and restart any media loads
    /// it still waits on.
    fn restore(&mut self, snapshot: TimelineState) {
        let clipboard = self.state.clipboard.take();
        self.state = snapshot;
        self.state.clipboard = clipboard;
        self.state.pending_loads.clear();
        let loader = &self.loader;
        for request in media::stalled_loads(&self.state, |id| loader.is_in_flight(id)) {
            self.state.schedule_load(request);
        }
        self.after_edit();
    }

    // --- Accessors ---

    pub fn state(&self) -> &TimelineState {
        &self.state
    }

    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    pub fn playback(&self) -> &PlaybackState {
        &self.playback
    }

    pub fn selection(&self) -> &SelectionState {
        &self.state.selection
    }

    pub fn duration(&self) -> f64 {
        self.state.duration
    }

    pub fn playhead(&self) -> f64 {
        self.playback.current_time
    }

    pub fn tracks(&self) -> &[Track] {
        &self.state.tracks
    }

    pub fn clip(&self, clip_id: &str) -> Option<&Clip> {
        self.state.clip(clip_id)
    }

    pub fn cached_ranges(&self) -> &CachedRanges {
        &self.state.cached_ranges
    }

    pub fn media_loads_in_flight(&self) -> usize {
        self.loader.in_flight_count()
    }

    // --- Tracks ---

    pub fn add_track(&mut self, track_type: TrackType) -> Option<String> {
        self.commit("Add track", Commit::Edit, |state, ctx| {
            Ok(tracks::add_track(state, ctx.config, track_type))
        })
    }

    pub fn remove_track(&mut self, track_id: &str) -> bool {
        self.commit("Remove track", Commit::Edit, |state, _| tracks::remove_track(state, track_id))
            .is_some()
    }

    pub fn rename_track(&mut self, track_id: &str, name: &str) -> bool {
        self.commit("Rename track", Commit::Document, |state, _| {
            tracks::rename_track(state, track_id, name)
        })
        .is_some()
    }

    pub fn set_track_muted(&mut self, track_id: &str, muted: bool) -> bool {
        self.commit("Mute track", Commit::Edit, |state, _| tracks::set_track_muted(state, track_id, muted))
            .is_some()
    }

    pub fn set_track_visible(&mut self, track_id: &str, visible: bool) -> bool {
        self.commit("Toggle track visibility", Commit::Edit, |state, _| {
            tracks::set_track_visible(state, track_id, visible)
        })
        .is_some()
    }

    pub fn set_track_solo(&mut self, track_id: &str, solo: bool) -> bool {
        self.commit("Solo track", Commit::Edit, |state, _| tracks::set_track_solo(state, track_id, solo))
            .is_some()
    }

    pub fn set_track_locked(&mut self, track_id: &str, locked: bool) -> bool {
        self.commit("Lock track", Commit::Document, |state, _| {
            tracks::set_track_locked(state, track_id, locked)
        })
        .is_some()
    }

    pub fn set_track_height(&mut self, track_id: &str, height: i64) -> bool {
        self.commit("Resize track", Commit::Document, |state, ctx| {
            tracks::set_track_height(state, ctx.config, track_id, height)
        })
        .is_some()
    }

    pub fn set_track_parent(&mut self, track_id: &str, parent_id: Option<&str>) -> bool {
        self.commit("Parent track", Commit::Edit, |state, _| {
            tracks::set_track_parent(state, track_id, parent_id)
        })
        .is_some()
    }

    pub fn scale_tracks_of_type(&mut self, track_type: TrackType, delta: i64) -> bool {
        self.commit("Resize tracks", Commit::Document, |state, ctx| {
            tracks::scale_tracks_of_type(state, ctx.config, track_type, delta);
            Ok(())
        })
        .is_some()
    }

    pub fn is_track_effectively_visible(&self, track_id: &str) -> bool {
        tracks::is_track_effectively_visible(&self.state, track_id)
    }

    pub fn is_track_audible(&self, track_id: &str) -> bool {
        tracks::is_track_audible(&self.state, track_id)
    }

    pub fn toggle_track_expanded(&mut self, track_id: &str) -> Option<bool> {
        self.ui("Toggle track expanded", |state| keyframes::toggle_track_expanded(state, track_id))
    }

    pub fn toggle_curve_editor(&mut self, track_id: &str, property: AnimatableProperty) -> Option<bool> {
        self.ui("Toggle curve editor", |state| {
            keyframes::toggle_curve_editor(state, track_id, property)
        })
    }

    pub fn track_display_height(&self, track_id: &str) -> Option<u32> {
        keyframes::track_display_height(&self.state, &self.config, track_id).ok()
    }

    // --- Clips ---

    pub fn add_clip(
        &mut self,
        track_id: &str,
        file: MediaFile,
        start: f64,
        estimated_duration: Option<f64>,
        media_file_id: Option<String>,
    ) -> Option<String> {
        self.commit("Add clip", Commit::Edit, |state, ctx| {
            clips::add_clip(state, ctx, track_id, file, start, estimated_duration, media_file_id)
        })
    }

    pub fn add_text_clip(
        &mut self,
        track_id: &str,
        text: TextProperties,
        start: f64,
        duration: Option<f64>,
    ) -> Option<String> {
        self.commit("Add text clip", Commit::Edit, |state, ctx| {
            clips::add_text_clip(state, ctx, track_id, text, start, duration)
        })
    }

    pub fn add_solid_clip(&mut self, track_id: &str, color: &str, start: f64, duration: Option<f64>) -> Option<String> {
        self.commit("Add solid clip", Commit::Edit, |state, ctx| {
            clips::add_solid_clip(state, ctx, track_id, color, start, duration)
        })
    }

    pub fn add_download_clip(
        &mut self,
        track_id: &str,
        url: &str,
        kind: MediaKind,
        name: &str,
        start: f64,
        estimated_duration: Option<f64>,
    ) -> Option<String> {
        self.commit("Add download clip", Commit::Edit, |state, _| {
            clips::add_download_clip(state, track_id, url, kind, name, start, estimated_duration)
        })
    }

    /// Hand the downloaded file to a pending download clip.
    pub fn resolve_download(&mut self, clip_id: &str, file: MediaFile) -> bool {
        self.commit("Resolve download", Commit::Edit, |state, _| {
            media::resolve_download(state, clip_id, file)
        })
        .is_some()
    }

    pub fn remove_clip(&mut self, clip_id: &str, skip_linked: bool) -> bool {
        self.commit("Remove clip", Commit::Edit, |state, _| clips::remove_clip(state, clip_id, skip_linked))
            .is_some()
    }

    /// Remove every selected clip together with its linked partner.
    pub fn remove_selected_clips(&mut self) -> bool {
        let selected = self.state.selection.selected_clips().to_vec();
        if selected.is_empty() {
            return false;
        }
        self.commit("Remove clips", Commit::Edit, |state, _| {
            for clip_id in &selected {
                if state.clip(clip_id).is_some() {
                    clips::remove_clip(state, clip_id, false)?;
                }
            }
            Ok(())
        })
        .is_some()
    }

    pub fn move_clip(
        &mut self,
        clip_id: &str,
        new_start: f64,
        new_track: Option<&str>,
        skip_linked: bool,
        skip_group: bool,
    ) -> bool {
        self.commit("Move clip", Commit::Edit, |state, ctx| {
            clips::move_clip(state, ctx, clip_id, new_start, new_track, skip_linked, skip_group)
        })
        .is_some()
    }

    pub fn trim_clip(&mut self, clip_id: &str, in_point: f64, out_point: f64) -> bool {
        self.commit("Trim clip", Commit::Edit, |state, _| {
            clips::trim_clip(state, clip_id, in_point, out_point)
        })
        .is_some()
    }

    pub fn trim_clip_edge(&mut self, clip_id: &str, edge: ClipEdge, time: f64, propagate_linked: bool) -> bool {
        self.commit("Trim clip", Commit::Edit, |state, ctx| {
            clips::trim_clip_edge(state, ctx, clip_id, edge, time, propagate_linked)
        })
        .is_some()
    }

    pub fn split_clip(&mut self, clip_id: &str, time: f64) -> Option<String> {
        self.commit("Split clip", Commit::Edit, |state, _| clips::split_clip(state, clip_id, time))
    }

    /// Split the clips under the playhead that are selected, or all of them
    /// when nothing under the playhead is selected.
    pub fn split_at_playhead(&mut self) -> Vec<String> {
        let time = self.playback.current_time;
        let under: Vec<String> = query::get_clips_at_time(&self.state, time)
            .iter()
            .map(|c| c.id.clone())
            .collect();
        let selected: Vec<String> = under
            .iter()
            .filter(|id| self.state.selection.is_clip_selected(id))
            .cloned()
            .collect();
        let targets = if selected.is_empty() { under } else { selected };
        self.commit("Split clips", Commit::Edit, |state, _| {
            let mut created = Vec::new();
            for clip_id in &targets {
                // Linked partners are split with their clip and are gone by now.
                if state.clip(clip_id).is_some_and(|c| c.is_active_at(time)) {
                    created.push(clips::split_clip(state, clip_id, time)?);
                }
            }
            Ok(created)
        })
        .unwrap_or_default()
    }

    pub fn update_clip_transform(&mut self, clip_id: &str, patch: &TransformPatch) -> bool {
        self.commit("Transform clip", Commit::Edit, |state, _| {
            clips::update_clip_transform(state, clip_id, patch)
        })
        .is_some()
    }

    pub fn set_clip_name(&mut self, clip_id: &str, name: &str) -> bool {
        self.commit("Rename clip", Commit::Document, |state, _| clips::set_clip_name(state, clip_id, name))
            .is_some()
    }

    pub fn set_clip_reversed(&mut self, clip_id: &str, reversed: bool) -> bool {
        self.commit("Reverse clip", Commit::Edit, |state, _| {
            clips::set_clip_reversed(state, clip_id, reversed)
        })
        .is_some()
    }

    pub fn set_clip_speed(&mut self, clip_id: &str, speed: f64) -> bool {
        self.commit("Change clip speed", Commit::Edit, |state, _| {
            clips::set_clip_speed(state, clip_id, speed)
        })
        .is_some()
    }

    pub fn set_clip_parent(&mut self, clip_id: &str, parent_id: Option<&str>) -> bool {
        self.commit("Parent clip", Commit::Edit, |state, _| {
            clips::set_clip_parent(state, clip_id, parent_id)
        })
        .is_some()
    }

    pub fn add_effect(&mut self, clip_id: &str, effect_type: &str) -> Option<String> {
        self.commit("Add effect", Commit::Edit, |state, _| clips::add_effect(state, clip_id, effect_type))
    }

    pub fn remove_effect(&mut self, clip_id: &str, effect_id: &str) -> bool {
        self.commit("Remove effect", Commit::Edit, |state, _| {
            clips::remove_effect(state, clip_id, effect_id)
        })
        .is_some()
    }

    pub fn set_effect_param(&mut self, clip_id: &str, effect_id: &str, param: &str, value: ParamValue) -> bool {
        self.commit("Change effect", Commit::Edit, |state, _| {
            clips::set_effect_param(state, clip_id, effect_id, param, value)
        })
        .is_some()
    }

    pub fn set_effect_enabled(&mut self, clip_id: &str, effect_id: &str, enabled: bool) -> bool {
        self.commit("Toggle effect", Commit::Edit, |state, _| {
            clips::set_effect_enabled(state, clip_id, effect_id, enabled)
        })
        .is_some()
    }

    pub fn add_mask(&mut self, clip_id: &str, mask: Mask) -> Option<String> {
        self.commit("Add mask", Commit::Edit, |state, _| clips::add_mask(state, clip_id, mask))
    }

    pub fn update_mask(&mut self, clip_id: &str, mask: Mask) -> bool {
        self.commit("Edit mask", Commit::Edit, |state, _| clips::update_mask(state, clip_id, mask))
            .is_some()
    }

    pub fn remove_mask(&mut self, clip_id: &str, mask_id: &str) -> bool {
        self.commit("Remove mask", Commit::Edit, |state, _| clips::remove_mask(state, clip_id, mask_id))
            .is_some()
    }

    pub fn create_linked_group(&mut self, clip_ids: &[&str], offsets: Option<&[f64]>) -> Option<String> {
        self.commit("Group clips", Commit::Edit, |state, _| {
            clips::create_linked_group(state, clip_ids, offsets)
        })
    }

    pub fn unlink_group(&mut self, group_id: &str) -> bool {
        self.commit("Ungroup clips", Commit::Edit, |state, _| clips::unlink_group(state, group_id))
            .is_some()
    }

    // --- Nested compositions ---

    /// Make a composition available for nesting. Not undoable.
    pub fn register_composition(&mut self, composition: CompositionData) {
        nested::register_composition(&mut self.state, composition);
    }

    pub fn add_comp_clip(&mut self, track_id: &str, composition_id: &str, start: f64) -> Option<String> {
        self.commit("Add composition clip", Commit::Edit, |state, ctx| {
            nested::add_comp_clip(state, ctx, track_id, composition_id, start)
        })
    }

    // --- Keyframes ---

    pub fn add_keyframe(
        &mut self,
        clip_id: &str,
        property: AnimatableProperty,
        value: f64,
        time: Option<f64>,
        easing: Easing,
    ) -> Option<String> {
        self.commit("Add keyframe", Commit::Edit, |state, ctx| {
            keyframes::add_keyframe(state, ctx, clip_id, property, value, time, easing)
        })
    }

    pub fn remove_keyframe(&mut self, keyframe_id: &str) -> bool {
        self.commit("Remove keyframe", Commit::Edit, |state, _| {
            keyframes::remove_keyframe(state, keyframe_id)
        })
        .is_some()
    }

    /// Remove every selected keyframe.
    pub fn remove_selected_keyframes(&mut self) -> bool {
        let selected = self.state.selection.selected_keyframes().to_vec();
        if selected.is_empty() {
            return false;
        }
        self.commit("Remove keyframes", Commit::Edit, |state, _| {
            selected
                .iter()
                .try_for_each(|id| keyframes::remove_keyframe(state, id))
        })
        .is_some()
    }

    pub fn move_keyframe(&mut self, keyframe_id: &str, new_time: f64) -> bool {
        self.commit("Move keyframe", Commit::Edit, |state, _| {
            keyframes::move_keyframe(state, keyframe_id, new_time)
        })
        .is_some()
    }

    pub fn update_keyframe_value(&mut self, keyframe_id: &str, value: f64) -> bool {
        self.commit("Change keyframe", Commit::Edit, |state, _| {
            keyframes::update_keyframe_value(state, keyframe_id, value)
        })
        .is_some()
    }

    pub fn set_keyframe_easing(&mut self, keyframe_id: &str, easing: Easing) -> bool {
        self.commit("Change easing", Commit::Edit, |state, _| {
            keyframes::set_keyframe_easing(state, keyframe_id, easing)
        })
        .is_some()
    }

    pub fn set_keyframe_handles(
        &mut self,
        keyframe_id: &str,
        handle_in: Option<BezierHandle>,
        handle_out: Option<BezierHandle>,
    ) -> bool {
        self.commit("Change curve", Commit::Edit, |state, _| {
            keyframes::set_keyframe_handles(state, keyframe_id, handle_in, handle_out)
        })
        .is_some()
    }

    pub fn toggle_recording(&mut self, clip_id: &str, property: AnimatableProperty) -> Option<bool> {
        self.ui("Toggle recording", |state| keyframes::toggle_recording(state, clip_id, property))
    }

    pub fn is_recording(&self, clip_id: &str, property: &AnimatableProperty) -> bool {
        keyframes::is_recording(&self.state, clip_id, property)
    }

    /// Change a property from the UI: records a keyframe at the playhead
    /// when the property is animated, else sets the static value.
    pub fn set_property_value(&mut self, clip_id: &str, property: AnimatableProperty, value: f64) -> bool {
        self.commit("Change property", Commit::Edit, |state, ctx| {
            keyframes::set_property_value(state, ctx, clip_id, property, value)
        })
        .is_some()
    }

    pub fn clip_keyframed_properties(&self, clip_id: &str) -> Vec<AnimatableProperty> {
        keyframes::clip_keyframed_properties(&self.state, clip_id)
    }

    // --- Markers ---

    pub fn add_marker(&mut self, time: f64, label: Option<&str>, color: Option<&str>) -> Option<String> {
        self.commit("Add marker", Commit::Document, |state, _| {
            Ok(markers::add_marker(state, time, label, color))
        })
    }

    /// Drop a marker at the playhead.
    pub fn add_marker_at_playhead(&mut self) -> Option<String> {
        self.add_marker(self.playback.current_time, None, None)
    }

    pub fn remove_marker(&mut self, marker_id: &str) -> bool {
        self.commit("Remove marker", Commit::Document, |state, _| markers::remove_marker(state, marker_id))
            .is_some()
    }

    pub fn move_marker(&mut self, marker_id: &str, time: f64) -> bool {
        self.commit("Move marker", Commit::Document, |state, _| {
            markers::move_marker(state, marker_id, time)
        })
        .is_some()
    }

    pub fn update_marker(&mut self, marker_id: &str, label: Option<&str>, color: Option<&str>) -> bool {
        self.commit("Edit marker", Commit::Document, |state, _| {
            markers::update_marker(state, marker_id, label, color)
        })
        .is_some()
    }

    /// Seek to the next marker after the playhead. Returns its time.
    pub fn seek_to_next_marker(&mut self) -> Option<f64> {
        let time = markers::next_marker_after(&self.state, self.playback.current_time)?.time;
        self.seek(time);
        Some(time)
    }

    /// Seek to the last marker before the playhead. Returns its time.
    pub fn seek_to_previous_marker(&mut self) -> Option<f64> {
        let time = markers::previous_marker_before(&self.state, self.playback.current_time)?.time;
        self.seek(time);
        Some(time)
    }

    // --- Transitions ---

    pub fn apply_transition(
        &mut self,
        clip_a: &str,
        clip_b: &str,
        kind: TransitionKind,
        duration: Option<f64>,
    ) -> Option<String> {
        self.commit("Add transition", Commit::Edit, |state, _| {
            transitions::apply_transition(state, clip_a, clip_b, kind, duration)
        })
    }

    /// Remove a transition by its id, or the transition on a clip given the
    /// clip id (its outgoing one first).
    pub fn remove_transition(&mut self, id: &str) -> bool {
        let transition_id = match self.state.clip(id) {
            Some(clip) => match clip.transition_out.as_ref().or(clip.transition_in.as_ref()) {
                Some(t) => t.id.clone(),
                None => {
                    warn!(clip_id = id, "Clip has no transition to remove");
                    return false;
                }
            },
            None => id.to_string(),
        };
        self.commit("Remove transition", Commit::Edit, |state, _| {
            transitions::remove_transition(state, &transition_id)
        })
        .is_some()
    }

    // --- Selection ---

    pub fn select_clip(&mut self, clip_id: &str, add_to_selection: bool) {
        if self.state.clip(clip_id).is_some() {
            self.state.selection.select_clip(clip_id, add_to_selection);
        }
    }

    pub fn select_clips(&mut self, clip_ids: &[&str]) {
        let existing: Vec<&str> = clip_ids
            .iter()
            .copied()
            .filter(|id| self.state.clip(id).is_some())
            .collect();
        self.state.selection.select_clips(existing);
    }

    pub fn deselect_clip(&mut self, clip_id: &str) {
        self.state.selection.deselect_clip(clip_id);
    }

    pub fn select_track(&mut self, track_id: &str, add_to_selection: bool) {
        if self.state.track(track_id).is_some() {
            self.state.selection.select_track(track_id, add_to_selection);
        }
    }

    pub fn select_keyframe(&mut self, keyframe_id: &str, add_to_selection: bool) {
        self.state.selection.select_keyframe(keyframe_id, add_to_selection);
    }

    pub fn clear_selection(&mut self) {
        self.state.selection.clear();
    }

    // --- Clipboard ---

    /// Copy the selected clips. Returns how many were copied.
    pub fn copy_selected_clips(&mut self) -> usize {
        self.ui("Copy clips", clipboard::copy_selected_clips).unwrap_or(0)
    }

    pub fn paste_clips(&mut self) -> Vec<String> {
        self.commit("Paste clips", Commit::Edit, clipboard::paste_clips)
            .unwrap_or_default()
    }

    pub fn has_clipboard(&self) -> bool {
        self.state.clipboard.as_ref().is_some_and(|c| !c.is_empty())
    }

    // --- Queries ---

    pub fn get_clips_at_time(&self, time: f64) -> Vec<&Clip> {
        query::get_clips_at_time(&self.state, time)
    }

    pub fn get_audible_clips_at_time(&self, time: f64) -> Vec<&Clip> {
        query::get_audible_clips_at_time(&self.state, time)
    }

    /// Layers for the compositor at `time`, back to front. Empty if the
    /// timeline cannot be resolved.
    pub fn resolve_layers(&self, time: f64) -> Vec<LayerDesc> {
        query::resolve_layers(&self.state, &self.config, time).unwrap_or_else(|e| {
            warn!(time, error = %e, "Layer resolution failed");
            Vec::new()
        })
    }

    pub fn get_interpolated_transform(&self, clip_id: &str, local_time: f64) -> Option<ClipTransform> {
        keyframes::get_interpolated_transform(&self.state, &self.config, clip_id, local_time).ok()
    }

    pub fn get_interpolated_effects(&self, clip_id: &str, local_time: f64) -> Option<Vec<Effect>> {
        keyframes::get_interpolated_effects(&self.state, clip_id, local_time).ok()
    }

    pub fn get_interpolated_speed(&self, clip_id: &str, local_time: f64) -> Option<f64> {
        keyframes::get_interpolated_speed(&self.state, clip_id, local_time).ok()
    }

    pub fn get_source_time(&self, clip_id: &str, local_time: f64) -> Option<f64> {
        keyframes::get_source_time(&self.state, clip_id, local_time).ok()
    }

    pub fn get_snapped_position(&self, clip_id: &str, desired: f64, track_id: &str) -> Option<SnapResult> {
        positioning::get_snapped_position(&self.state, &self.config, clip_id, desired, track_id).ok()
    }

    pub fn get_position_with_resistance(
        &self,
        clip_id: &str,
        desired: f64,
        track_id: &str,
        duration: f64,
    ) -> PlacementResult {
        positioning::get_position_with_resistance(&self.state, clip_id, desired, track_id, duration)
    }

    pub fn get_position_with_pixel_resistance(
        &self,
        clip_id: &str,
        desired: f64,
        track_id: &str,
        duration: f64,
        pixels_per_second: f64,
    ) -> PlacementResult {
        positioning::get_position_with_pixel_resistance(
            &self.state,
            &self.config,
            clip_id,
            desired,
            track_id,
            duration,
            pixels_per_second,
        )
    }

    pub fn find_non_overlapping_position(&self, clip_id: &str, desired: f64, track_id: &str, duration: f64) -> f64 {
        positioning::find_non_overlapping_position(&self.state, clip_id, desired, track_id, duration)
    }

    // --- History ---

    pub fn undo(&mut self) -> bool {
        let Some(previous) = self.history.undo(self.state.clone()) else {
            return false;
        };
        self.restore(previous);
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(next) = self.history.redo(self.state.clone()) else {
            return false;
        };
        self.restore(next);
        true
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo_label(&self) -> Option<&str> {
        self.history.undo_label()
    }

    pub fn redo_label(&self) -> Option<&str> {
        self.history.redo_label()
    }

    /// Collapse the edits of a gesture (a drag, a trim) into one undo step.
    pub fn begin_batch(&mut self, label: &str) {
        self.history.start_batch(label, self.state.clone());
    }

    pub fn end_batch(&mut self) {
        self.history.end_batch();
    }

    // --- Media ---

    /// Merge finished media work into the state. Returns how many events
    /// changed it.
    pub fn poll_media(&mut self) -> usize {
        let mut applied = 0;
        for event in self.loader.drain_events() {
            if self.apply_media(event) {
                applied += 1;
            }
        }
        applied
    }

    /// Block up to `timeout` for one media event and merge it. Returns
    /// whether an event arrived.
    pub fn wait_for_media(&mut self, timeout: Duration) -> bool {
        match self.loader.wait_event(timeout) {
            Some(event) => {
                self.apply_media(event);
                true
            }
            None => false,
        }
    }

    fn apply_media(&mut self, event: MediaEvent) -> bool {
        let clip_id = event.clip_id().to_string();
        let before = self.state.clone();
        match media::apply_media_event(&mut self.state, event) {
            Ok(true) => {
                self.after_edit();
                true
            }
            Ok(false) => {
                debug!(clip_id = %clip_id, "Stale media event ignored");
                false
            }
            Err(e) => {
                self.state = before;
                warn!(clip_id = %clip_id, error = %e, "Media result rejected");
                false
            }
        }
    }

    // --- RAM preview ---

    /// Start caching rendered frames over `[start, end)`, or over the
    /// in/out range when not given. Replaces a running preview.
    pub fn start_ram_preview(&mut self, range: Option<(f64, f64)>) -> RamPreviewJob {
        self.cancel_ram_preview();
        let (start, end) = range.unwrap_or_else(|| self.playback.playback_range(self.state.duration));
        let token = CancelToken::new();
        self.ram_preview = Some(token.clone());
        debug!(start, end, "RAM preview started");
        RamPreviewJob::new(start, end, self.state.cached_ranges.fps(), token)
    }

    /// Record a rendered frame. Ignored once `job` has been cancelled.
    pub fn mark_frame_cached(&mut self, job: &RamPreviewJob, time: f64) -> bool {
        if job.is_cancelled() {
            return false;
        }
        self.state.cached_ranges.add_frame(time);
        true
    }

    pub fn cancel_ram_preview(&mut self) {
        if let Some(token) = self.ram_preview.take() {
            token.cancel();
            debug!("RAM preview cancelled");
        }
    }

    pub fn is_frame_cached(&self, time: f64) -> bool {
        self.state.cached_ranges.contains(time)
    }

    // --- Serialization ---

    pub fn to_composition(&self) -> CompositionData {
        composition::to_composition(&self.state)
    }

    /// Replace the timeline with `data`. Clears the undo history.
    pub fn load_composition(&mut self, data: &CompositionData) -> bool {
        let mut next = self.state.clone();
        if let Err(e) = composition::load_composition(&mut next, data) {
            warn!(composition_id = %data.id, error = %e, "Composition load rejected");
            return false;
        }
        self.loader.cancel_all();
        self.history.clear();
        self.restore(next);
        true
    }

    pub fn save_project(&self, path: &Path, name: &str) -> TimelineResult<()> {
        let project = composition::to_project_file(&self.state, name);
        ms_project::save_project(&project, path)?;
        info!(path = %path.display(), "Project saved");
        Ok(())
    }

    /// Load a project file and open its active composition. Clears the undo
    /// history.
    pub fn load_project(&mut self, path: &Path) -> TimelineResult<()> {
        let project = ms_project::load_project(path)?;
        let mut next = TimelineState::new(&self.config);
        composition::load_project_file(&mut next, &project)?;
        self.loader.cancel_all();
        self.history.clear();
        self.playback = PlaybackState::new();
        self.restore(next);
        info!(path = %path.display(), clips = self.state.clips.len(), "Project loaded");
        Ok(())
    }

    // --- Playback ---

    pub fn play(&mut self) {
        self.playback.play();
    }

    pub fn pause(&mut self) {
        self.playback.pause();
    }

    pub fn stop(&mut self) {
        self.playback.stop();
    }

    pub fn toggle_play_pause(&mut self) {
        self.playback.toggle_play_pause();
    }

    pub fn seek(&mut self, time: f64) {
        self.playback.seek(time);
    }

    pub fn set_in_point(&mut self, time: f64) {
        self.playback.set_in_point(time);
    }

    pub fn set_out_point(&mut self, time: f64) {
        self.playback.set_out_point(time);
    }

    pub fn clear_in_out(&mut self) {
        self.playback.clear_in_out();
    }

    pub fn set_loop(&mut self, enabled: bool) {
        self.playback.set_loop(enabled);
    }

    pub fn set_playback_rate(&mut self, rate: f64) {
        self.playback.set_rate(rate);
    }

    /// Timer tick while playing. Returns the new playhead.
    pub fn tick(&mut self, dt: f64) -> f64 {
        self.playback.advance(dt, self.state.duration)
    }

    pub fn start_scrub(&mut self, time: f64) -> bool {
        self.playback.start_scrub(time);
        self.seek_throttle.request(self.playback.current_time, true, Instant::now())
    }

    /// Move the playhead while scrubbing. Returns whether the decoder should
    /// seek now; held-back seeks are flushed by [`Self::end_scrub`].
    pub fn scrub_to(&mut self, time: f64) -> bool {
        self.playback.scrub_to(time);
        self.seek_throttle.request(self.playback.current_time, true, Instant::now())
    }

    /// End scrubbing. Returns the seek that was still held back, if any.
    pub fn end_scrub(&mut self) -> Option<f64> {
        self.playback.end_scrub();
        self.seek_throttle.take_pending()
    }
}

impl std::fmt::Debug for TimelineStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimelineStore")
            .field("composition_id", &self.state.composition_id)
            .field("tracks", &self.state.tracks.len())
            .field("clips", &self.state.clips.len())
            .field("undo_depth", &self.history.undo_count())
            .field("playhead", &self.playback.current_time)
            .finish_non_exhaustive()
    }
}
