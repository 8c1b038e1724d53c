//! Live timeline entities: tracks, clips and their sources, markers, and
//! multicam groups.
//!
//! These differ from the `ms-project` data types in that they may hold live
//! media handles and nested timelines; conversion lives in `composition.rs`.

use std::collections::{BTreeMap, HashMap};

use ms_common::{ClipTransform, Effect, Mask, MediaHandle, MediaKind, TimelineConfig, TrackType};
use ms_project::{TextProperties, TransitionRef};
use ms_timeline_eval::Keyframe;
use uuid::Uuid;

/// Generate a fresh entity id such as `clip-3f2a…`.
pub fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

/// A track in the timeline.
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub track_type: TrackType,
    /// Base height in pixels, excluding keyframe rows.
    pub height: u32,
    pub muted: bool,
    pub visible: bool,
    pub solo: bool,
    pub locked: bool,
    pub parent_track_id: Option<String>,
}

impl Track {
    pub fn new(id: impl Into<String>, name: impl Into<String>, track_type: TrackType, height: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            track_type,
            height,
            muted: false,
            visible: true,
            solo: false,
            locked: false,
            parent_track_id: None,
        }
    }
}

/// A file being imported into the timeline.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaFile {
    pub name: String,
    /// Path (or URL) handed to the media provider.
    pub path: String,
    pub kind: MediaKind,
}

impl MediaFile {
    pub fn new(name: impl Into<String>, path: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind,
        }
    }
}

/// Loaded media backing a file-based clip.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaSource {
    pub media_file_id: Option<String>,
    pub natural_duration: f64,
    /// `None` once loading finished means the load failed ("ready but empty").
    pub handle: Option<MediaHandle>,
    pub thumbnails: Vec<MediaHandle>,
    /// Normalized peak amplitudes, one per waveform bucket.
    pub waveform: Vec<f32>,
}

impl MediaSource {
    pub fn empty(media_file_id: Option<String>, natural_duration: f64) -> Self {
        Self {
            media_file_id,
            natural_duration,
            handle: None,
            thumbnails: Vec::new(),
            waveform: Vec::new(),
        }
    }
}

/// What a clip plays.
#[derive(Clone, Debug, PartialEq)]
pub enum ClipSource {
    /// Placeholder while the media provider loads the file.
    Loading {
        kind: MediaKind,
        media_file_id: Option<String>,
        estimated_duration: f64,
    },
    Video(MediaSource),
    Audio(MediaSource),
    Image(MediaSource),
    Text(TextProperties),
    Solid {
        color: String,
    },
    Composition {
        composition_id: String,
    },
    /// Remote media not yet fetched; becomes `Loading` once a local file exists.
    PendingDownload {
        url: String,
        kind: MediaKind,
    },
}

impl ClipSource {
    pub fn kind(&self) -> MediaKind {
        match self {
            Self::Loading { kind, .. } | Self::PendingDownload { kind, .. } => *kind,
            Self::Video(_) => MediaKind::Video,
            Self::Audio(_) => MediaKind::Audio,
            Self::Image(_) => MediaKind::Image,
            Self::Text(_) => MediaKind::Text,
            Self::Solid { .. } => MediaKind::Solid,
            Self::Composition { .. } => MediaKind::Composition,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading { .. })
    }

    pub fn media(&self) -> Option<&MediaSource> {
        match self {
            Self::Video(m) | Self::Audio(m) | Self::Image(m) => Some(m),
            _ => None,
        }
    }

    pub fn media_mut(&mut self) -> Option<&mut MediaSource> {
        match self {
            Self::Video(m) | Self::Audio(m) | Self::Image(m) => Some(m),
            _ => None,
        }
    }

    pub fn media_file_id(&self) -> Option<&str> {
        match self {
            Self::Loading { media_file_id, .. } => media_file_id.as_deref(),
            _ => self.media().and_then(|m| m.media_file_id.as_deref()),
        }
    }

    pub fn handle(&self) -> Option<&MediaHandle> {
        self.media().and_then(|m| m.handle.as_ref())
    }

    /// Untrimmed source length, when the source has one.
    pub fn natural_duration(&self) -> Option<f64> {
        match self {
            Self::Video(m) | Self::Audio(m) => Some(m.natural_duration),
            _ => None,
        }
    }

    /// Wrap loaded media in the variant matching `kind`.
    pub fn ready(kind: MediaKind, media: MediaSource) -> Option<Self> {
        match kind {
            MediaKind::Video => Some(Self::Video(media)),
            MediaKind::Audio => Some(Self::Audio(media)),
            MediaKind::Image => Some(Self::Image(media)),
            _ => None,
        }
    }
}

/// Deep copy of a composition embedded in a nested composition clip.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NestedTimeline {
    pub tracks: Vec<Track>,
    pub clips: Vec<Clip>,
    pub keyframes: HashMap<String, Vec<Keyframe>>,
    pub duration: f64,
}

/// A clip on a track.
#[derive(Clone, Debug, PartialEq)]
pub struct Clip {
    pub id: String,
    pub track_id: String,
    pub name: String,
    pub start_time: f64,
    pub duration: f64,
    pub in_point: f64,
    pub out_point: f64,
    pub source: ClipSource,
    pub transform: ClipTransform,
    pub effects: Vec<Effect>,
    pub masks: Vec<Mask>,
    pub linked_clip_id: Option<String>,
    pub linked_group_id: Option<String>,
    pub parent_clip_id: Option<String>,
    pub reversed: bool,
    pub speed: f64,
    pub transition_in: Option<TransitionRef>,
    pub transition_out: Option<TransitionRef>,
    pub nested: Option<Box<NestedTimeline>>,
}

impl Clip {
    pub fn new(
        id: impl Into<String>,
        track_id: impl Into<String>,
        name: impl Into<String>,
        source: ClipSource,
        start_time: f64,
        duration: f64,
    ) -> Self {
        Self {
            id: id.into(),
            track_id: track_id.into(),
            name: name.into(),
            start_time: start_time.max(0.0),
            duration,
            in_point: 0.0,
            out_point: duration,
            source,
            transform: ClipTransform::default(),
            effects: Vec::new(),
            masks: Vec::new(),
            linked_clip_id: None,
            linked_group_id: None,
            parent_clip_id: None,
            reversed: false,
            speed: 1.0,
            transition_in: None,
            transition_out: None,
            nested: None,
        }
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    pub fn kind(&self) -> MediaKind {
        self.source.kind()
    }

    pub fn is_loading(&self) -> bool {
        self.source.is_loading()
    }

    /// Whether `time` falls inside `[start, end)`.
    pub fn is_active_at(&self, time: f64) -> bool {
        time >= self.start_time && time < self.end_time()
    }

    /// Whether the clip intersects the half-open span `[start, end)`.
    pub fn overlaps(&self, start: f64, end: f64) -> bool {
        self.start_time < end - TIME_EPSILON && self.end_time() > start + TIME_EPSILON
    }

    pub fn transition_ids(&self) -> impl Iterator<Item = &str> {
        self.transition_in
            .iter()
            .chain(self.transition_out.iter())
            .map(|t| t.id.as_str())
    }

    /// Upper bound for `out_point`, if the source has a finite length.
    pub fn natural_duration(&self) -> Option<f64> {
        match &self.source {
            ClipSource::Composition { .. } => self.nested.as_ref().map(|n| n.duration),
            source => source.natural_duration(),
        }
    }

    pub fn effect(&self, effect_id: &str) -> Option<&Effect> {
        self.effects.iter().find(|e| e.id == effect_id)
    }
}

/// Comparisons between timeline positions tolerate this much float error.
pub const TIME_EPSILON: f64 = 1e-6;

/// Which end of a clip an edit applies to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ClipEdge {
    Start,
    End,
}

/// A timeline marker.
#[derive(Clone, Debug, PartialEq)]
pub struct Marker {
    pub id: String,
    pub time: f64,
    pub label: String,
    pub color: String,
}

/// A multicam group. Members start at `master.start + offset`.
#[derive(Clone, Debug, PartialEq)]
pub struct LinkedGroup {
    pub master_clip_id: String,
    pub offsets: BTreeMap<String, f64>,
}

/// Per-action context handed to slice functions alongside the state.
#[derive(Copy, Clone, Debug)]
pub struct EditContext<'a> {
    pub config: &'a TimelineConfig,
    /// Playhead position in global timeline seconds.
    pub playhead: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_prefixed_and_unique() {
        let a = new_id("clip");
        let b = new_id("clip");
        assert!(a.starts_with("clip-"));
        assert_ne!(a, b);
    }

    #[test]
    fn overlap_is_half_open() {
        let clip = Clip::new("c", "video-1", "A", ClipSource::Solid { color: "#fff".into() }, 2.0, 3.0);
        assert!(clip.overlaps(4.0, 6.0));
        assert!(!clip.overlaps(5.0, 6.0));
        assert!(!clip.overlaps(0.0, 2.0));
        assert!(clip.is_active_at(2.0));
        assert!(!clip.is_active_at(5.0));
    }

    #[test]
    fn source_kind_and_loading() {
        let loading = ClipSource::Loading {
            kind: MediaKind::Video,
            media_file_id: Some("m1".into()),
            estimated_duration: 4.0,
        };
        assert!(loading.is_loading());
        assert_eq!(loading.kind(), MediaKind::Video);
        assert_eq!(loading.media_file_id(), Some("m1"));

        let ready = ClipSource::ready(MediaKind::Audio, MediaSource::empty(None, 8.0)).unwrap();
        assert_eq!(ready.kind(), MediaKind::Audio);
        assert_eq!(ready.natural_duration(), Some(8.0));
        assert!(ready.handle().is_none());
        assert!(ClipSource::ready(MediaKind::Text, MediaSource::empty(None, 1.0)).is_none());
    }
}
