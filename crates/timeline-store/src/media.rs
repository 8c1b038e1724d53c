//! Background media loading and the `Loading -> ready` clip state machine.
//!
//! The store never blocks on media. Imports create `ClipSource::Loading`
//! placeholders and queue a [`LoadRequest`]; after the action commits the
//! store hands requests to the [`MediaLoader`], which runs the provider on a
//! worker thread and reports back over a crossbeam channel. The store drains
//! the channel in `poll_media` and applies each [`MediaEvent`] as one atomic
//! merge. A failed load leaves the clip ready but empty.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use ms_common::{MediaHandle, MediaKind, TimelineConfig};
use ms_project::MediaFileRef;
use ms_timeline_eval::{effective_speed, timeline_duration};

use crate::cancel::CancelToken;
use crate::error::{TimelineError, TimelineResult};
use crate::state::TimelineState;
use crate::types::{Clip, ClipSource, MediaFile, MediaSource, TIME_EPSILON};

/// Errors reported by a media provider.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum MediaError {
    #[error("failed to decode {path}: {reason}")]
    Decode { path: String, reason: String },

    #[error("unsupported media kind {kind}")]
    Unsupported { kind: MediaKind },

    #[error("file not found: {path}")]
    NotFound { path: String },

    #[error("load cancelled")]
    Cancelled,

    #[error("media worker failed: {reason}")]
    Worker { reason: String },
}

/// One clip's request for media.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadRequest {
    pub clip_id: String,
    pub file: MediaFileRef,
    /// What the clip needs from the file (a video file's audio partner asks
    /// for `Audio`).
    pub kind: MediaKind,
}

/// What a provider returns for a successfully opened file.
#[derive(Clone, Debug)]
pub struct LoadedMedia {
    pub natural_duration: f64,
    pub handle: MediaHandle,
    pub has_audio: bool,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// The external media subsystem. Implementations may block; they always
/// run on a loader worker thread.
pub trait MediaProvider: Send + Sync {
    fn load(&self, request: &LoadRequest, cancel: &CancelToken) -> Result<LoadedMedia, MediaError>;

    fn thumbnails(
        &self,
        _request: &LoadRequest,
        _media: &LoadedMedia,
    ) -> Result<Vec<MediaHandle>, MediaError> {
        Ok(Vec::new())
    }

    /// Normalized peak amplitudes for the waveform display.
    fn waveform(&self, _request: &LoadRequest, _media: &LoadedMedia) -> Result<Vec<f32>, MediaError> {
        Ok(Vec::new())
    }
}

/// A result delivered from a loader worker.
#[derive(Clone, Debug)]
pub enum MediaEvent {
    Loaded {
        clip_id: String,
        result: Result<LoadedMedia, MediaError>,
    },
    Thumbnails {
        clip_id: String,
        thumbnails: Vec<MediaHandle>,
    },
    Waveform {
        clip_id: String,
        peaks: Vec<f32>,
    },
}

impl MediaEvent {
    pub fn clip_id(&self) -> &str {
        match self {
            Self::Loaded { clip_id, .. }
            | Self::Thumbnails { clip_id, .. }
            | Self::Waveform { clip_id, .. } => clip_id,
        }
    }
}

/// Runs provider loads on worker threads, one per request.
pub struct MediaLoader {
    provider: Arc<dyn MediaProvider>,
    event_tx: Sender<MediaEvent>,
    event_rx: Receiver<MediaEvent>,
    in_flight: Arc<Mutex<HashMap<String, CancelToken>>>,
    generate_thumbnails: bool,
    generate_waveforms: bool,
}

impl MediaLoader {
    pub fn new(provider: Arc<dyn MediaProvider>, config: &TimelineConfig) -> Self {
        let (event_tx, event_rx) = channel::unbounded();
        Self {
            provider,
            event_tx,
            event_rx,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            generate_thumbnails: config.generate_thumbnails,
            generate_waveforms: config.generate_waveforms,
        }
    }

    /// Start loading on a background thread. A request for a clip that is
    /// already loading supersedes the earlier one.
    pub fn request(&self, request: LoadRequest) {
        let token = CancelToken::new();
        if let Some(previous) = self
            .in_flight
            .lock()
            .insert(request.clip_id.clone(), token.clone())
        {
            previous.cancel();
        }

        debug!(
            clip_id = %request.clip_id,
            path = %request.file.source_path,
            kind = %request.kind,
            "Media load requested"
        );

        let worker = LoadWorker {
            provider: Arc::clone(&self.provider),
            events: self.event_tx.clone(),
            in_flight: Arc::clone(&self.in_flight),
            token,
            generate_thumbnails: self.generate_thumbnails,
            generate_waveforms: self.generate_waveforms,
        };
        let clip_id = request.clip_id.clone();
        let spawned = thread::Builder::new()
            .name(format!("media-load-{clip_id}"))
            .spawn(move || worker.run(request));

        if let Err(e) = spawned {
            warn!(clip_id = %clip_id, error = %e, "Failed to spawn media load thread");
            self.in_flight.lock().remove(&clip_id);
            let _ = self.event_tx.send(MediaEvent::Loaded {
                clip_id,
                result: Err(MediaError::Worker {
                    reason: e.to_string(),
                }),
            });
        }
    }

    /// Cancel the load for `clip_id`, if one is running.
    pub fn cancel(&self, clip_id: &str) {
        if let Some(token) = self.in_flight.lock().remove(clip_id) {
            token.cancel();
            debug!(clip_id, "Media load cancelled");
        }
    }

    pub fn cancel_all(&self) {
        for (_, token) in self.in_flight.lock().drain() {
            token.cancel();
        }
    }

    pub fn is_in_flight(&self, clip_id: &str) -> bool {
        self.in_flight.lock().contains_key(clip_id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Drain every event that has arrived (non-blocking).
    pub fn drain_events(&self) -> Vec<MediaEvent> {
        self.event_rx.try_iter().collect()
    }

    /// Block up to `timeout` for the next event.
    pub fn wait_event(&self, timeout: Duration) -> Option<MediaEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }
}

impl Drop for MediaLoader {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

struct LoadWorker {
    provider: Arc<dyn MediaProvider>,
    events: Sender<MediaEvent>,
    in_flight: Arc<Mutex<HashMap<String, CancelToken>>>,
    token: CancelToken,
    generate_thumbnails: bool,
    generate_waveforms: bool,
}

impl LoadWorker {
    fn run(self, request: LoadRequest) {
        let result = self.provider.load(&request, &self.token);
        if self.token.is_cancelled() {
            debug!(clip_id = %request.clip_id, "Discarding cancelled media load");
            return;
        }

        let loaded = result.as_ref().ok().cloned();
        let _ = self.events.send(MediaEvent::Loaded {
            clip_id: request.clip_id.clone(),
            result,
        });

        if let Some(media) = loaded {
            self.send_extras(&request, &media);
        }
        self.finish(&request.clip_id);
    }

    fn send_extras(&self, request: &LoadRequest, media: &LoadedMedia) {
        let wants_thumbnails = matches!(request.kind, MediaKind::Video | MediaKind::Image);
        if self.generate_thumbnails && wants_thumbnails && !self.token.is_cancelled() {
            match self.provider.thumbnails(request, media) {
                Ok(thumbnails) if !thumbnails.is_empty() => {
                    let _ = self.events.send(MediaEvent::Thumbnails {
                        clip_id: request.clip_id.clone(),
                        thumbnails,
                    });
                }
                Ok(_) => {}
                Err(e) => warn!(clip_id = %request.clip_id, error = %e, "Thumbnail generation failed"),
            }
        }

        if self.generate_waveforms && request.kind == MediaKind::Audio && !self.token.is_cancelled() {
            match self.provider.waveform(request, media) {
                Ok(peaks) if !peaks.is_empty() => {
                    let _ = self.events.send(MediaEvent::Waveform {
                        clip_id: request.clip_id.clone(),
                        peaks,
                    });
                }
                Ok(_) => {}
                Err(e) => warn!(clip_id = %request.clip_id, error = %e, "Waveform generation failed"),
            }
        }
    }

    /// Forget this worker's token unless a newer request replaced it.
    fn finish(&self, clip_id: &str) {
        let mut in_flight = self.in_flight.lock();
        if in_flight.get(clip_id).is_some_and(|t| t.same_as(&self.token)) {
            in_flight.remove(clip_id);
        }
    }
}

// ---------------------------------------------------------------------------
// Applying results to the state
// ---------------------------------------------------------------------------

/// Register `file` in the media library, reusing an entry with the same id
/// or the same path.
pub(crate) fn register_media(state: &mut TimelineState, file: &MediaFile, media_file_id: Option<String>) -> String {
    if let Some(id) = media_file_id.as_deref() {
        if state.media_library.contains_key(id) {
            return id.to_string();
        }
    } else if let Some(existing) = state
        .media_library
        .values()
        .find(|m| m.source_path == file.path && m.kind == file.kind)
    {
        return existing.id.clone();
    }

    let id = media_file_id.unwrap_or_else(|| crate::types::new_id("media"));
    state.media_library.insert(
        id.clone(),
        MediaFileRef {
            id: id.clone(),
            name: file.name.clone(),
            kind: file.kind,
            source_path: file.path.clone(),
            duration: None,
            width: None,
            height: None,
            has_audio: None,
        },
    );
    id
}

/// Build the load request for a clip in the `Loading` state, if its media
/// is in the library.
pub(crate) fn load_request_for(state: &TimelineState, clip: &Clip) -> Option<LoadRequest> {
    let ClipSource::Loading {
        kind,
        media_file_id: Some(media_file_id),
        ..
    } = &clip.source
    else {
        return None;
    };
    let file = state.media_library.get(media_file_id)?;
    Some(LoadRequest {
        clip_id: clip.id.clone(),
        file: file.clone(),
        kind: *kind,
    })
}

/// Load requests for every loading clip (top-level and nested) that the
/// loader is not already working on. Used after undo/redo restores a
/// snapshot whose loads have since been applied to a different state.
pub(crate) fn stalled_loads(state: &TimelineState, in_flight: impl Fn(&str) -> bool) -> Vec<LoadRequest> {
    let mut requests = Vec::new();
    collect_stalled(state, &state.clips, &in_flight, &mut requests);
    requests
}

fn collect_stalled(
    state: &TimelineState,
    clips: &[Clip],
    in_flight: &impl Fn(&str) -> bool,
    out: &mut Vec<LoadRequest>,
) {
    for clip in clips {
        if clip.is_loading() && !in_flight(&clip.id) {
            out.extend(load_request_for(state, clip));
        }
        if let Some(nested) = clip.nested.as_deref() {
            collect_stalled(state, &nested.clips, in_flight, out);
        }
    }
}

fn find_clip_in<'a>(clips: &'a mut [Clip], clip_id: &str) -> Option<&'a mut Clip> {
    for clip in clips.iter_mut() {
        if clip.id == clip_id {
            return Some(clip);
        }
        if let Some(nested) = clip.nested.as_deref_mut() {
            if let Some(found) = find_clip_in(&mut nested.clips, clip_id) {
                return Some(found);
            }
        }
    }
    None
}

/// Turn a `PendingDownload` clip into a loading clip once its file exists
/// locally.
pub fn resolve_download(state: &mut TimelineState, clip_id: &str, file: MediaFile) -> TimelineResult<()> {
    let clip = state.require_clip(clip_id)?;
    let ClipSource::PendingDownload { kind, .. } = &clip.source else {
        return Err(TimelineError::invalid(format!(
            "clip {clip_id} is not waiting for a download"
        )));
    };
    if *kind != file.kind {
        return Err(TimelineError::invalid(format!(
            "downloaded {} does not match expected {kind}",
            file.kind
        )));
    }
    let estimated_duration = clip.out_point - clip.in_point;

    let media_file_id = register_media(state, &file, None);
    let clip = state.require_clip_mut(clip_id)?;
    clip.source = ClipSource::Loading {
        kind: file.kind,
        media_file_id: Some(media_file_id),
        estimated_duration,
    };
    let clip = clip.clone();
    if let Some(request) = load_request_for(state, &clip) {
        state.schedule_load(request);
    }
    debug!(clip_id, path = %file.path, "Download resolved");
    Ok(())
}

/// Apply one loader event. Returns `false` for stale events (the clip was
/// deleted or is no longer waiting for this result).
pub fn apply_media_event(state: &mut TimelineState, event: MediaEvent) -> TimelineResult<bool> {
    match event {
        MediaEvent::Loaded { clip_id, result } => apply_loaded(state, &clip_id, result),
        MediaEvent::Thumbnails { clip_id, thumbnails } => {
            let Some(media) = find_clip_in(&mut state.clips, &clip_id).and_then(|c| c.source.media_mut())
            else {
                return Ok(false);
            };
            media.thumbnails = thumbnails;
            Ok(true)
        }
        MediaEvent::Waveform { clip_id, peaks } => {
            let Some(media) = find_clip_in(&mut state.clips, &clip_id).and_then(|c| c.source.media_mut())
            else {
                return Ok(false);
            };
            media.waveform = peaks;
            Ok(true)
        }
    }
}

fn apply_loaded(
    state: &mut TimelineState,
    clip_id: &str,
    result: Result<LoadedMedia, MediaError>,
) -> TimelineResult<bool> {
    let Some(clip) = find_clip_in(&mut state.clips, clip_id) else {
        debug!(clip_id, "Media loaded for a clip that no longer exists");
        return Ok(false);
    };
    let ClipSource::Loading {
        kind,
        media_file_id,
        estimated_duration,
    } = clip.source.clone()
    else {
        return Ok(false);
    };

    let media = match result {
        Ok(media) => media,
        Err(e) => {
            warn!(clip_id, error = %e, "Media load failed, clip left empty");
            if let Some(source) = ClipSource::ready(kind, MediaSource::empty(media_file_id, estimated_duration)) {
                clip.source = source;
            }
            return Ok(true);
        }
    };

    let is_top_level = state.clip(clip_id).is_some();

    // A video's speculative audio partner is dropped when the file is silent.
    if kind == MediaKind::Audio && !media.has_audio && is_top_level {
        let has_partner = state.linked_partner(clip_id).is_some();
        if has_partner {
            info!(clip_id, "Source has no audio, removing audio placeholder");
            crate::clips::remove_clip(state, clip_id, true)?;
            return Ok(true);
        }
    }

    if let Some(entry) = media_file_id.as_deref().and_then(|id| state.media_library.get_mut(id)) {
        entry.duration = Some(media.natural_duration);
        entry.width = media.width.or(entry.width);
        entry.height = media.height.or(entry.height);
        if kind != MediaKind::Audio {
            entry.has_audio = Some(media.has_audio);
        }
    }

    let natural = media.natural_duration;
    let source = MediaSource {
        media_file_id,
        natural_duration: natural,
        handle: Some(media.handle.clone()),
        thumbnails: Vec::new(),
        waveform: Vec::new(),
    };
    let Some(ready) = ClipSource::ready(kind, source) else {
        return Err(TimelineError::invalid(format!("{kind} clips are not file-backed")));
    };

    if let Some(clip) = find_clip_in(&mut state.clips, clip_id) {
        clip.source = ready;
    }

    if kind.has_natural_duration() {
        if is_top_level {
            fit_to_natural_duration(state, clip_id, natural, estimated_duration)?;
        } else if let Some(clip) = find_clip_in(&mut state.clips, clip_id) {
            clip.out_point = clip.out_point.min(natural).max(clip.in_point);
            clip.duration = timeline_duration(clip.out_point - clip.in_point, clip.speed);
        }
    }

    info!(
        clip_id,
        media = media.handle.label(),
        natural_duration = natural,
        "Media ready"
    );
    Ok(true)
}

/// Resize a freshly loaded clip (and its partner) to the real source
/// length. An untouched placeholder grows or shrinks to the full length; a
/// trimmed one only shrinks if it ran past the end of the source. Growth
/// stops at the next clip on either track.
fn fit_to_natural_duration(
    state: &mut TimelineState,
    clip_id: &str,
    natural: f64,
    estimated_duration: f64,
) -> TimelineResult<()> {
    let clip = state.require_clip(clip_id)?;
    let untouched = clip.in_point.abs() < TIME_EPSILON
        && (clip.out_point - estimated_duration).abs() < TIME_EPSILON;
    let wanted_out = if untouched {
        natural
    } else {
        clip.out_point.min(natural)
    };
    let wanted_duration = timeline_duration(wanted_out - clip.in_point, clip.speed);

    let partner_id = clip.linked_clip_id.clone();
    let start = clip.start_time;
    let mut room = room_after(state, clip_id, start);
    if let Some(pid) = partner_id.as_deref() {
        if state.clip(pid).is_some_and(|p| (p.start_time - start).abs() < TIME_EPSILON) {
            room = room.min(room_after(state, pid, start));
        }
    }
    let duration = wanted_duration.min(room);

    let mut ids = vec![clip_id.to_string()];
    ids.extend(partner_id.filter(|pid| {
        state
            .clip(pid)
            .is_some_and(|p| (p.start_time - start).abs() < TIME_EPSILON)
    }));
    for id in ids {
        let clip = state.require_clip_mut(&id)?;
        let speed = effective_speed(clip.speed);
        clip.duration = duration;
        clip.out_point = clip.in_point + duration * speed;
    }
    Ok(())
}

/// Free time after `start` on the clip's track before the next clip begins.
fn room_after(state: &TimelineState, clip_id: &str, start: f64) -> f64 {
    let Some(clip) = state.clip(clip_id) else {
        return f64::INFINITY;
    };
    state
        .clips_on_track(&clip.track_id)
        .filter(|c| c.id != clip_id && c.start_time >= start + TIME_EPSILON)
        .map(|c| c.start_time - start)
        .fold(f64::INFINITY, f64::min)
}
