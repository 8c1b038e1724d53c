//! Per-clip vector masks. The compositor rasterizes them; the timeline only
//! stores and copies them.

use serde::{Deserialize, Serialize};

/// Mask compositing mode.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskMode {
    #[default]
    Add,
    Subtract,
    Intersect,
}

/// A 2D point, used for vertex positions and bezier handles.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

/// A vertex in a mask path. Handles are relative to the vertex position.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskVertex {
    pub position: Point2,
    pub handle_in: Point2,
    pub handle_out: Point2,
}

impl MaskVertex {
    pub fn corner(x: f64, y: f64) -> Self {
        Self {
            position: Point2 { x, y },
            ..Default::default()
        }
    }
}

/// A mask applied to a clip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mask {
    pub id: String,
    pub name: String,
    pub vertices: Vec<MaskVertex>,
    pub closed: bool,
    /// Feather radius in pixels.
    pub feather: f64,
    /// Mask opacity (0.0 to 1.0).
    pub opacity: f64,
    pub inverted: bool,
    pub mode: MaskMode,
    pub visible: bool,
}

impl Mask {
    /// A closed rectangular mask in normalized composition coordinates.
    pub fn rectangle(id: impl Into<String>, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            id: id.into(),
            name: "Mask".to_string(),
            vertices: vec![
                MaskVertex::corner(x, y),
                MaskVertex::corner(x + width, y),
                MaskVertex::corner(x + width, y + height),
                MaskVertex::corner(x, y + height),
            ],
            closed: true,
            feather: 0.0,
            opacity: 1.0,
            inverted: false,
            mode: MaskMode::Add,
            visible: true,
        }
    }
}
