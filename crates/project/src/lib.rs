//! `ms-project` — Composition and project serialization for the MasterSelects
//! timeline engine.
//!
//! A composition is the serialized form of one timeline: tracks, clips (with
//! transforms, effects, masks, keyframes, links, and transitions inline),
//! markers, and duration. Media is referenced by id, never by live handle.
//!
//! - **Types**: `CompositionData`, `TrackData`, `ClipData`, `MarkerData`, `ProjectFile`
//! - **Save/Load**: JSON with atomic file writes and structural validation
//!
//! # Usage
//!
//! ```rust,no_run
//! use ms_project::{load_project, save_project, ProjectFile, ProjectSettings};
//! use std::path::Path;
//!
//! let project = ProjectFile::new("My Project", ProjectSettings::default());
//! save_project(&project, Path::new("project.msproj")).unwrap();
//!
//! let loaded = load_project(Path::new("project.msproj")).unwrap();
//! assert_eq!(loaded.name, "My Project");
//! ```

pub mod error;
pub mod load;
pub mod save;
pub mod types;

// Re-export primary API at crate root
pub use error::{ProjectError, ProjectResult};
pub use load::{composition_from_json, from_json_string, load_project};
pub use save::{composition_to_json, save_project, to_json_string};
pub use types::{
    current_iso_timestamp, ClipData, CompositionData, LinkedGroupData, MarkerData, MediaFileRef,
    ProjectFile, ProjectSettings, TextProperties, TrackData, TransitionRef, CURRENT_VERSION,
};
