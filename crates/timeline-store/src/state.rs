//! The timeline state container and its lookup helpers.
//!
//! `TimelineState` is plain data. Slice modules mutate it through free
//! functions; the `TimelineStore` facade owns it and snapshots it for
//! rollback and undo.

use std::collections::{HashMap, HashSet};

use ms_common::{TimelineConfig, TrackType};
use ms_project::{CompositionData, MediaFileRef, ProjectSettings};
use ms_timeline_eval::{AnimatableProperty, Keyframe};

use crate::clipboard::ClipboardData;
use crate::error::{TimelineError, TimelineResult};
use crate::media::LoadRequest;
use crate::ram_preview::CachedRanges;
use crate::selection::SelectionState;
use crate::types::{Clip, LinkedGroup, Marker, Track};

/// Id of the default video track of a new timeline.
pub const DEFAULT_VIDEO_TRACK: &str = "video-1";
/// Id of the default audio track of a new timeline.
pub const DEFAULT_AUDIO_TRACK: &str = "audio-1";

/// Everything the timeline knows, owned by the store.
#[derive(Clone, Debug)]
pub struct TimelineState {
    pub composition_id: String,
    pub composition_name: String,
    pub settings: ProjectSettings,

    /// Ordered tracks; index 0 is the front-most video layer.
    pub tracks: Vec<Track>,
    pub clips: Vec<Clip>,
    /// clip id -> keyframes sorted by time.
    pub keyframes: HashMap<String, Vec<Keyframe>>,
    /// Sorted by time.
    pub markers: Vec<Marker>,
    pub linked_groups: HashMap<String, LinkedGroup>,

    pub selection: SelectionState,
    pub clipboard: Option<ClipboardData>,
    /// (clip id, property) pairs whose edits record keyframes.
    pub recording: HashSet<(String, AnimatableProperty)>,
    pub expanded_tracks: HashSet<String>,
    /// (track id, property) pairs with an open curve editor.
    pub expanded_curve_editors: HashSet<(String, AnimatableProperty)>,

    /// Compositions available for nesting, by id.
    pub compositions: HashMap<String, CompositionData>,
    /// Media files known to the project, by id.
    pub media_library: HashMap<String, MediaFileRef>,

    pub cached_ranges: CachedRanges,
    /// End of the last clip, in seconds.
    pub duration: f64,

    pub(crate) pending_loads: Vec<LoadRequest>,
}

impl TimelineState {
    /// An empty timeline with one video and one audio track.
    pub fn new(config: &TimelineConfig) -> Self {
        let height = config.default_track_height;
        Self {
            composition_id: "main".to_string(),
            composition_name: "Main".to_string(),
            settings: ProjectSettings::default(),
            tracks: vec![
                Track::new(DEFAULT_VIDEO_TRACK, "Video 1", TrackType::Video, height),
                Track::new(DEFAULT_AUDIO_TRACK, "Audio 1", TrackType::Audio, height),
            ],
            clips: Vec::new(),
            keyframes: HashMap::new(),
            markers: Vec::new(),
            linked_groups: HashMap::new(),
            selection: SelectionState::new(),
            clipboard: None,
            recording: HashSet::new(),
            expanded_tracks: HashSet::new(),
            expanded_curve_editors: HashSet::new(),
            compositions: HashMap::new(),
            media_library: HashMap::new(),
            cached_ranges: CachedRanges::new(config.preview_fps),
            duration: 0.0,
            pending_loads: Vec::new(),
        }
    }

    // --- Tracks ---

    pub fn track(&self, track_id: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == track_id)
    }

    pub fn track_mut(&mut self, track_id: &str) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id == track_id)
    }

    pub fn require_track(&self, track_id: &str) -> TimelineResult<&Track> {
        self.track(track_id).ok_or_else(|| TimelineError::track(track_id))
    }

    pub fn require_track_mut(&mut self, track_id: &str) -> TimelineResult<&mut Track> {
        self.track_mut(track_id)
            .ok_or_else(|| TimelineError::track(track_id))
    }

    // --- Clips ---

    pub fn clip(&self, clip_id: &str) -> Option<&Clip> {
        self.clips.iter().find(|c| c.id == clip_id)
    }

    pub fn clip_mut(&mut self, clip_id: &str) -> Option<&mut Clip> {
        self.clips.iter_mut().find(|c| c.id == clip_id)
    }

    pub fn require_clip(&self, clip_id: &str) -> TimelineResult<&Clip> {
        self.clip(clip_id).ok_or_else(|| TimelineError::clip(clip_id))
    }

    pub fn require_clip_mut(&mut self, clip_id: &str) -> TimelineResult<&mut Clip> {
        self.clip_mut(clip_id)
            .ok_or_else(|| TimelineError::clip(clip_id))
    }

    pub fn clips_on_track<'a>(&'a self, track_id: &'a str) -> impl Iterator<Item = &'a Clip> + 'a {
        self.clips.iter().filter(move |c| c.track_id == track_id)
    }

    /// The linked partner of `clip_id`, if it has one that exists.
    pub fn linked_partner(&self, clip_id: &str) -> Option<&Clip> {
        self.clip(clip_id)
            .and_then(|c| c.linked_clip_id.as_deref())
            .and_then(|id| self.clip(id))
    }

    pub fn clip_keyframes(&self, clip_id: &str) -> &[Keyframe] {
        self.keyframes.get(clip_id).map(Vec::as_slice).unwrap_or(&[])
    }

    // --- Derived data ---

    /// Recompute `duration` as the end of the last clip.
    pub fn recalculate_duration(&mut self) {
        self.duration = self
            .clips
            .iter()
            .map(Clip::end_time)
            .fold(0.0_f64, f64::max);
    }

    pub fn ensure_track_unlocked(&self, track_id: &str) -> TimelineResult<()> {
        if self.require_track(track_id)?.locked {
            return Err(TimelineError::TrackLocked {
                track_id: track_id.to_string(),
            });
        }
        Ok(())
    }

    /// Queue a media load; the store dispatches it after the action commits.
    pub(crate) fn schedule_load(&mut self, request: LoadRequest) {
        self.pending_loads.push(request);
    }

    pub(crate) fn take_pending_loads(&mut self) -> Vec<LoadRequest> {
        std::mem::take(&mut self.pending_loads)
    }

    /// Drop selection entries that point at deleted entities.
    pub(crate) fn prune_selection(&mut self) {
        let clips: HashSet<&str> = self.clips.iter().map(|c| c.id.as_str()).collect();
        let tracks: HashSet<&str> = self.tracks.iter().map(|t| t.id.as_str()).collect();
        let keyframes: HashSet<&str> = self
            .keyframes
            .values()
            .flatten()
            .map(|k| k.id.as_str())
            .collect();
        let mut selection = std::mem::take(&mut self.selection);
        selection.retain_existing(
            |id| clips.contains(id),
            |id| tracks.contains(id),
            |id| keyframes.contains(id),
        );
        self.selection = selection;
    }
}
