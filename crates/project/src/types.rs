//! Serialized data model: compositions, tracks, clips, markers, and the
//! project file that bundles them.
//!
//! A composition serializes to `{tracks, clips, markers, duration}` with
//! every transform, effect, mask, and keyframe inline and media referenced
//! by id only. Live media handles never appear here.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use ms_common::{ClipTransform, Effect, Mask, MediaKind, TrackType};
use ms_timeline_eval::{Keyframe, TransitionKind};

/// Current project format version.
pub const CURRENT_VERSION: u32 = 1;

/// Top-level project file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFile {
    pub version: u32,
    pub name: String,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// ISO 8601 last-modified timestamp.
    pub updated_at: String,
    pub settings: ProjectSettings,
    /// Media library entries referenced by clips.
    #[serde(default)]
    pub media: Vec<MediaFileRef>,
    /// Every composition in the project, including those embedded as nested
    /// composition clips.
    #[serde(default)]
    pub compositions: Vec<CompositionData>,
    #[serde(default)]
    pub active_composition_id: Option<String>,
}

impl ProjectFile {
    pub fn new(name: impl Into<String>, settings: ProjectSettings) -> Self {
        let now = current_iso_timestamp();
        Self {
            version: CURRENT_VERSION,
            name: name.into(),
            created_at: now.clone(),
            updated_at: now,
            settings,
            media: Vec::new(),
            compositions: Vec::new(),
            active_composition_id: None,
        }
    }

    pub fn composition(&self, id: &str) -> Option<&CompositionData> {
        self.compositions.iter().find(|c| c.id == id)
    }

    /// Insert or replace a composition by id.
    pub fn upsert_composition(&mut self, comp: CompositionData) {
        match self.compositions.iter_mut().find(|c| c.id == comp.id) {
            Some(existing) => *existing = comp,
            None => self.compositions.push(comp),
        }
    }

    /// Update `updated_at` to now.
    pub fn touch(&mut self) {
        self.updated_at = current_iso_timestamp();
    }
}

/// Project-level settings (resolution, frame rate, sample rate).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSettings {
    pub width: u32,
    pub height: u32,
    /// Frame rate (e.g., 30.0, 29.97, 60.0).
    pub frame_rate: f64,
    /// Audio sample rate in Hz.
    pub sample_rate: u32,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            frame_rate: 30.0,
            sample_rate: 48000,
        }
    }
}

/// A composition (timeline) containing tracks, clips, and markers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionData {
    pub id: String,
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    /// Total duration in seconds.
    pub duration: f64,
    /// Background color (CSS hex string, e.g. "#000000").
    pub background_color: String,
    /// Ordered tracks (index 0 = front-most video track).
    pub tracks: Vec<TrackData>,
    pub clips: Vec<ClipData>,
    #[serde(default)]
    pub markers: Vec<MarkerData>,
    /// Multicam groups with their per-member offsets.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub linked_groups: Vec<LinkedGroupData>,
}

impl CompositionData {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        width: u32,
        height: u32,
        frame_rate: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            width,
            height,
            frame_rate,
            duration: 0.0,
            background_color: "#000000".to_string(),
            tracks: Vec::new(),
            clips: Vec::new(),
            markers: Vec::new(),
            linked_groups: Vec::new(),
        }
    }

    pub fn clip(&self, id: &str) -> Option<&ClipData> {
        self.clips.iter().find(|c| c.id == id)
    }
}

/// A track within a composition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackData {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub track_type: TrackType,
    /// Track height in pixels (for UI).
    pub height: u32,
    pub locked: bool,
    pub visible: bool,
    pub muted: bool,
    pub solo: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_track_id: Option<String>,
}

/// Styling of a generated text clip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextProperties {
    pub text: String,
    pub font_family: String,
    pub font_size: f64,
    /// CSS color string.
    pub color: String,
    pub bold: bool,
    pub italic: bool,
    /// "left" | "center" | "right".
    pub align: String,
}

impl Default for TextProperties {
    fn default() -> Self {
        Self {
            text: "Text".to_string(),
            font_family: "Arial".to_string(),
            font_size: 72.0,
            color: "#ffffff".to_string(),
            bold: false,
            italic: false,
            align: "center".to_string(),
        }
    }
}

/// One side of a transition. Clip A stores it as `transitionOut` and clip B
/// as `transitionIn`, both with the same `id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRef {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransitionKind,
    pub duration: f64,
    /// The clip on the other side of the transition.
    pub linked_clip_id: String,
}

/// A clip on a track, with all of its animation data inline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipData {
    pub id: String,
    pub track_id: String,
    pub name: String,
    pub source_type: MediaKind,
    /// Reference to `MediaFileRef.id` for file-backed clips.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_file_id: Option<String>,
    pub start_time: f64,
    pub duration: f64,
    pub in_point: f64,
    pub out_point: f64,
    /// Untrimmed duration of the source, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub natural_duration: Option<f64>,
    #[serde(default)]
    pub transform: ClipTransform,
    #[serde(default)]
    pub effects: Vec<Effect>,
    #[serde(default)]
    pub masks: Vec<Mask>,
    #[serde(default)]
    pub keyframes: Vec<Keyframe>,
    #[serde(default = "default_speed")]
    pub speed: f64,
    #[serde(default)]
    pub reversed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_clip_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_clip_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_in: Option<TransitionRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_out: Option<TransitionRef>,
    /// Source composition of a nested composition clip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composition_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_properties: Option<TextProperties>,
    /// Solid color for solid clips (CSS hex).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solid_color: Option<String>,
    /// Remote URL of a clip whose media is still being downloaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

fn default_speed() -> f64 {
    1.0
}

impl ClipData {
    /// A plain clip with identity transform and no animation.
    pub fn new(
        id: impl Into<String>,
        track_id: impl Into<String>,
        source_type: MediaKind,
        start_time: f64,
        duration: f64,
    ) -> Self {
        Self {
            id: id.into(),
            track_id: track_id.into(),
            name: String::new(),
            source_type,
            media_file_id: None,
            start_time,
            duration,
            in_point: 0.0,
            out_point: duration,
            natural_duration: None,
            transform: ClipTransform::default(),
            effects: Vec::new(),
            masks: Vec::new(),
            keyframes: Vec::new(),
            speed: 1.0,
            reversed: false,
            linked_clip_id: None,
            linked_group_id: None,
            parent_clip_id: None,
            transition_in: None,
            transition_out: None,
            composition_id: None,
            text_properties: None,
            solid_color: None,
            source_url: None,
        }
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}

/// A multicam group: members start at `master.start + offset`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedGroupData {
    pub id: String,
    pub master_clip_id: String,
    /// clip id -> offset from the master's start, in seconds.
    pub offsets: BTreeMap<String, f64>,
}

/// A timeline marker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerData {
    pub id: String,
    /// Global timeline seconds.
    pub time: f64,
    #[serde(alias = "name")]
    pub label: String,
    /// CSS hex string.
    pub color: String,
}

/// Reference to a media file in the project.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFileRef {
    pub id: String,
    /// Original file name.
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    /// Path (or URL) the media provider loads from.
    pub source_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_audio: Option<bool>,
}

/// Current UTC time as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn current_iso_timestamp() -> String {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format_epoch(secs)
}

fn format_epoch(epoch: u64) -> String {
    let (hour, min, sec) = ((epoch / 3600) % 24, (epoch / 60) % 60, epoch % 60);
    let (year, month, day) = civil_from_days((epoch / 86_400) as i64);
    format!("{year:04}-{month:02}-{day:02}T{hour:02}:{min:02}:{sec:02}Z")
}

/// Days since 1970-01-01 to a proleptic Gregorian (year, month, day).
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}
