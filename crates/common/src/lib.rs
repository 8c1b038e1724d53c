//! `ms-common` — Shared types and configuration for the MasterSelects
//! timeline engine.
//!
//! This crate is the foundation the other timeline crates depend on:
//!
//! - **Types**: `Rational`, `Resolution`, `TrackType`, `MediaKind`
//! - **Layer**: `ClipTransform`, `TransformPatch`, `LayerDesc` (compositor interface)
//! - **Effects / masks**: `Effect`, `ParamValue`, `Mask`
//! - **Media**: `MediaHandle` (opaque provider-owned media)
//! - **Config**: `TimelineConfig`
//! - **Errors**: `ConfigError` (thiserror-based)

pub mod blend;
pub mod config;
pub mod effect;
pub mod error;
pub mod layer;
pub mod mask;
pub mod media;
pub mod types;

// Re-export commonly used items at crate root
pub use blend::BlendMode;
pub use config::TimelineConfig;
pub use effect::{Effect, ParamValue};
pub use error::ConfigError;
pub use layer::{ClipTransform, LayerDesc, Position3, Rotation3, Scale2, TransformPatch};
pub use mask::{Mask, MaskMode, MaskVertex, Point2};
pub use media::MediaHandle;
pub use types::{MediaKind, Rational, Resolution, TrackType};
