//! Clip transform and layer description: the interface between the timeline
//! store and the compositor.

use serde::{Deserialize, Serialize};

use crate::blend::BlendMode;
use crate::effect::Effect;
use crate::mask::Mask;
use crate::media::MediaHandle;
use crate::types::MediaKind;

/// 3D position (x/y in composition pixels, z as depth).
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// 2D scale factors (1.0 = original size).
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scale2 {
    pub x: f64,
    pub y: f64,
}

impl Default for Scale2 {
    fn default() -> Self {
        Self { x: 1.0, y: 1.0 }
    }
}

/// Rotation in degrees around each axis.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rotation3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Static transform of a clip. Keyframes override individual fields at
/// evaluation time; the stored value is what un-keyframed properties use.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipTransform {
    /// Opacity (0.0..=1.0).
    pub opacity: f64,
    pub blend_mode: BlendMode,
    pub position: Position3,
    pub scale: Scale2,
    pub rotation: Rotation3,
}

impl Default for ClipTransform {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            position: Position3::default(),
            scale: Scale2::default(),
            rotation: Rotation3::default(),
        }
    }
}

impl ClipTransform {
    /// Apply a partial update. Opacity is clamped to `[0, 1]`.
    pub fn apply_patch(&mut self, patch: &TransformPatch) {
        if let Some(opacity) = patch.opacity {
            self.opacity = opacity.clamp(0.0, 1.0);
        }
        if let Some(mode) = patch.blend_mode {
            self.blend_mode = mode;
        }
        if let Some(position) = patch.position {
            self.position = position;
        }
        if let Some(scale) = patch.scale {
            self.scale = scale;
        }
        if let Some(rotation) = patch.rotation {
            self.rotation = rotation;
        }
    }
}

/// Partial transform update sent by property panels and gizmos.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransformPatch {
    pub opacity: Option<f64>,
    pub blend_mode: Option<BlendMode>,
    pub position: Option<Position3>,
    pub scale: Option<Scale2>,
    pub rotation: Option<Rotation3>,
}

impl TransformPatch {
    pub fn is_empty(&self) -> bool {
        self.opacity.is_none()
            && self.blend_mode.is_none()
            && self.position.is_none()
            && self.scale.is_none()
            && self.rotation.is_none()
    }
}

/// Complete description of a layer to render at a given time.
/// Produced by the timeline store, consumed by the compositor.
#[derive(Clone, Debug)]
pub struct LayerDesc {
    pub clip_id: String,
    pub track_id: String,
    pub source_kind: MediaKind,
    /// Playable media, if the source is file-backed and loaded.
    pub media: Option<MediaHandle>,
    /// Time inside the source media to present.
    pub source_time: f64,
    /// Transform after keyframes and parent composition.
    pub transform: ClipTransform,
    /// Effects with keyframe-animated parameters applied.
    pub effects: Vec<Effect>,
    pub masks: Vec<Mask>,
    /// Extra opacity weight from an active transition (1.0 when none).
    pub transition_weight: f64,
    /// Z-order (lower = behind).
    pub z_order: i32,
}
