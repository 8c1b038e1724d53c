//! `ms-timeline-store` — The authoritative timeline store for the
//! MasterSelects timeline engine.
//!
//! - **State**: `TimelineState` (tracks, clips, keyframes, markers, groups)
//! - **Facade**: `TimelineStore` runs every edit through one commit path
//!   with rollback, undo history, and cache invalidation
//! - **Slices**: free functions per concern (`tracks`, `clips`,
//!   `keyframes`, `positioning`, `transitions`, `markers`, `clipboard`,
//!   `nested`) over `&mut TimelineState`
//! - **Media**: `MediaLoader` runs a `MediaProvider` off-thread; clips sit in
//!   `ClipSource::Loading` until the result is merged
//! - **Serialization**: `CompositionData` / `ProjectFile` via `ms-project`
//! - **Playback**: transport state, scrub seek throttling, RAM preview ranges
//!
//! # Architecture
//!
//! ```text
//! UI gesture
//!   └── TimelineStore::commit(action)
//!         ├── snapshot state
//!         ├── slice fn (&mut TimelineState)   ── Err ──> restore + warn!
//!         ├── history.push(snapshot)
//!         ├── recalculate duration, invalidate cache once
//!         └── MediaLoader::request(pending loads)
//!                   └── worker thread ── MediaEvent ──> poll_media()
//! ```
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use ms_common::TimelineConfig;
//! use ms_timeline_store::{
//!     CancelToken, LoadRequest, LoadedMedia, MediaError, MediaProvider, NoopInvalidator,
//!     TimelineStore, DEFAULT_VIDEO_TRACK,
//! };
//!
//! struct NoMedia;
//!
//! impl MediaProvider for NoMedia {
//!     fn load(&self, request: &LoadRequest, _cancel: &CancelToken) -> Result<LoadedMedia, MediaError> {
//!         Err(MediaError::NotFound { path: request.file.source_path.clone() })
//!     }
//! }
//!
//! let mut store =
//!     TimelineStore::new(TimelineConfig::default(), Arc::new(NoMedia), Arc::new(NoopInvalidator)).unwrap();
//! let clip = store.add_solid_clip(DEFAULT_VIDEO_TRACK, "#ff0000", 0.0, Some(2.0)).unwrap();
//! assert!((store.duration() - 2.0).abs() < 1e-9);
//!
//! store.remove_clip(&clip, false);
//! assert!(store.undo());
//! assert!(store.clip(&clip).is_some());
//! ```

pub mod cancel;
pub mod clipboard;
pub mod clips;
pub mod composition;
pub mod error;
pub mod history;
pub mod keyframes;
pub mod markers;
pub mod media;
pub mod nested;
pub mod playback;
pub mod positioning;
pub mod query;
pub mod ram_preview;
pub mod selection;
pub mod state;
pub mod store;
pub mod tracks;
pub mod transitions;
pub mod types;

// Re-export primary API at crate root
pub use cancel::CancelToken;
pub use clipboard::ClipboardData;
pub use error::{TimelineError, TimelineResult};
pub use history::HistoryManager;
pub use media::{LoadRequest, LoadedMedia, MediaError, MediaEvent, MediaLoader, MediaProvider};
pub use playback::{PlaybackMode, PlaybackState, SeekThrottle};
pub use positioning::{PlacementResult, SnapResult};
pub use ram_preview::{CachedRanges, RamPreviewJob};
pub use selection::SelectionState;
pub use state::{TimelineState, DEFAULT_AUDIO_TRACK, DEFAULT_VIDEO_TRACK};
pub use store::{CacheInvalidator, NoopInvalidator, TimelineStore};
pub use types::{
    new_id, Clip, ClipEdge, ClipSource, EditContext, LinkedGroup, Marker, MediaFile, MediaSource,
    NestedTimeline, Track, TIME_EPSILON,
};
