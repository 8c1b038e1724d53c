//! Keyframe data model: animatable properties, easing modes, and keyframes.
//!
//! Keyframes are clip-scoped: `time` is seconds relative to the owning clip's
//! start, so moving or trimming a clip never retimes its animation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EvalError;

/// Properties that can be animated with keyframes.
///
/// On the wire a property is a dotted string: `opacity`, `position.x`,
/// `scale.y`, `rotation.z`, `speed`, or `effect.<effectId>.<param>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AnimatableProperty {
    Opacity,
    PositionX,
    PositionY,
    PositionZ,
    ScaleX,
    ScaleY,
    RotationX,
    RotationY,
    RotationZ,
    Speed,
    EffectParam { effect_id: String, param: String },
}

impl AnimatableProperty {
    /// Every property that maps onto a `ClipTransform` field.
    pub const TRANSFORM: [AnimatableProperty; 9] = [
        Self::Opacity,
        Self::PositionX,
        Self::PositionY,
        Self::PositionZ,
        Self::ScaleX,
        Self::ScaleY,
        Self::RotationX,
        Self::RotationY,
        Self::RotationZ,
    ];

    pub fn effect(effect_id: impl Into<String>, param: impl Into<String>) -> Self {
        Self::EffectParam {
            effect_id: effect_id.into(),
            param: param.into(),
        }
    }

    pub fn is_transform(&self) -> bool {
        !matches!(self, Self::Speed | Self::EffectParam { .. })
    }

    /// The effect instance this property animates, if any.
    pub fn effect_id(&self) -> Option<&str> {
        match self {
            Self::EffectParam { effect_id, .. } => Some(effect_id),
            _ => None,
        }
    }
}

impl fmt::Display for AnimatableProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Opacity => "opacity",
            Self::PositionX => "position.x",
            Self::PositionY => "position.y",
            Self::PositionZ => "position.z",
            Self::ScaleX => "scale.x",
            Self::ScaleY => "scale.y",
            Self::RotationX => "rotation.x",
            Self::RotationY => "rotation.y",
            Self::RotationZ => "rotation.z",
            Self::Speed => "speed",
            Self::EffectParam { effect_id, param } => {
                return write!(f, "effect.{effect_id}.{param}");
            }
        };
        f.write_str(name)
    }
}

impl FromStr for AnimatableProperty {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let prop = match s {
            "opacity" => Self::Opacity,
            "position.x" => Self::PositionX,
            "position.y" => Self::PositionY,
            "position.z" => Self::PositionZ,
            "scale.x" => Self::ScaleX,
            "scale.y" => Self::ScaleY,
            "rotation.x" => Self::RotationX,
            "rotation.y" => Self::RotationY,
            "rotation.z" => Self::RotationZ,
            "speed" => Self::Speed,
            other => {
                let parsed = other
                    .strip_prefix("effect.")
                    .and_then(|rest| rest.split_once('.'))
                    .filter(|(id, param)| !id.is_empty() && !param.is_empty());
                match parsed {
                    Some((effect_id, param)) => Self::effect(effect_id, param),
                    None => {
                        return Err(EvalError::UnknownProperty {
                            property: other.to_string(),
                        })
                    }
                }
            }
        };
        Ok(prop)
    }
}

impl TryFrom<String> for AnimatableProperty {
    type Error = EvalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AnimatableProperty> for String {
    fn from(value: AnimatableProperty) -> Self {
        value.to_string()
    }
}

/// How a segment is interpolated. A segment uses the easing of its leading
/// keyframe.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Easing {
    #[default]
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
    /// Custom curve shaped by the keyframes' bezier handles.
    Bezier,
    /// Hold the value until the next keyframe (step function).
    Hold,
}

/// Bezier handle offset relative to its keyframe: `x` in seconds, `y` in
/// property units.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BezierHandle {
    pub x: f64,
    pub y: f64,
}

/// A single keyframe sample of one clip property.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keyframe {
    pub id: String,
    pub clip_id: String,
    /// Seconds relative to the clip start.
    pub time: f64,
    pub property: AnimatableProperty,
    pub value: f64,
    pub easing: Easing,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle_in: Option<BezierHandle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle_out: Option<BezierHandle>,
}

impl Keyframe {
    pub fn new(
        id: impl Into<String>,
        clip_id: impl Into<String>,
        property: AnimatableProperty,
        time: f64,
        value: f64,
        easing: Easing,
    ) -> Self {
        Self {
            id: id.into(),
            clip_id: clip_id.into(),
            time,
            property,
            value,
            easing,
            handle_in: None,
            handle_out: None,
        }
    }
}
