//! Clip, track, and keyframe selection.

/// Which clips, tracks, and keyframes are currently selected, in selection
/// order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SelectionState {
    selected_clips: Vec<String>,
    selected_tracks: Vec<String>,
    selected_keyframes: Vec<String>,
}

/// Replace the selection with `id`, or toggle its membership when `additive`.
fn select_in(list: &mut Vec<String>, id: &str, additive: bool) {
    if !additive {
        list.clear();
        list.push(id.to_string());
        return;
    }
    if let Some(pos) = list.iter().position(|s| s == id) {
        list.remove(pos);
    } else {
        list.push(id.to_string());
    }
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Click selects only `clip_id`; shift-click toggles it.
    pub fn select_clip(&mut self, clip_id: &str, add_to_selection: bool) {
        select_in(&mut self.selected_clips, clip_id, add_to_selection);
    }

    /// Replace the clip selection with `clip_ids` (deduplicated).
    pub fn select_clips<'a, I: IntoIterator<Item = &'a str>>(&mut self, clip_ids: I) {
        self.selected_clips.clear();
        for id in clip_ids {
            if !self.is_clip_selected(id) {
                self.selected_clips.push(id.to_string());
            }
        }
    }

    pub fn deselect_clip(&mut self, clip_id: &str) {
        self.selected_clips.retain(|id| id != clip_id);
    }

    pub fn select_track(&mut self, track_id: &str, add_to_selection: bool) {
        select_in(&mut self.selected_tracks, track_id, add_to_selection);
    }

    pub fn deselect_track(&mut self, track_id: &str) {
        self.selected_tracks.retain(|id| id != track_id);
    }

    pub fn select_keyframe(&mut self, keyframe_id: &str, add_to_selection: bool) {
        select_in(&mut self.selected_keyframes, keyframe_id, add_to_selection);
    }

    pub fn deselect_keyframe(&mut self, keyframe_id: &str) {
        self.selected_keyframes.retain(|id| id != keyframe_id);
    }

    pub fn clear_keyframes(&mut self) {
        self.selected_keyframes.clear();
    }

    /// Clear clips, tracks and keyframes.
    pub fn clear(&mut self) {
        self.selected_clips.clear();
        self.selected_tracks.clear();
        self.selected_keyframes.clear();
    }

    pub fn selected_clips(&self) -> &[String] {
        &self.selected_clips
    }

    pub fn selected_tracks(&self) -> &[String] {
        &self.selected_tracks
    }

    pub fn selected_keyframes(&self) -> &[String] {
        &self.selected_keyframes
    }

    pub fn is_clip_selected(&self, clip_id: &str) -> bool {
        self.selected_clips.iter().any(|id| id == clip_id)
    }

    pub fn is_track_selected(&self, track_id: &str) -> bool {
        self.selected_tracks.iter().any(|id| id == track_id)
    }

    pub fn is_keyframe_selected(&self, keyframe_id: &str) -> bool {
        self.selected_keyframes.iter().any(|id| id == keyframe_id)
    }

    pub fn is_empty(&self) -> bool {
        self.selected_clips.is_empty()
            && self.selected_tracks.is_empty()
            && self.selected_keyframes.is_empty()
    }

    /// Total number of selected items across all categories.
    pub fn count(&self) -> usize {
        self.selected_clips.len() + self.selected_tracks.len() + self.selected_keyframes.len()
    }

    /// Drop references to entities that no longer exist.
    pub(crate) fn retain_existing(
        &mut self,
        clip_exists: impl Fn(&str) -> bool,
        track_exists: impl Fn(&str) -> bool,
        keyframe_exists: impl Fn(&str) -> bool,
    ) {
        self.selected_clips.retain(|id| clip_exists(id));
        self.selected_tracks.retain(|id| track_exists(id));
        self.selected_keyframes.retain(|id| keyframe_exists(id));
    }
}
