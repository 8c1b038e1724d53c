//! Effect instances attached to clips and their parameter values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Concrete parameter value. Untagged so that it matches the plain JSON
/// values the web project format stores (`0.5`, `true`, `"#ff0000"`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    /// Numeric view of the value; keyframe animation works on this.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

/// An instance of an effect applied to a clip, with concrete parameter values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Effect {
    /// Instance id, unique within the owning clip. Keyframe properties
    /// address parameters as `effect.<id>.<param>`.
    pub id: String,
    /// Effect type identifier (e.g. "brightness", "gaussian-blur").
    #[serde(rename = "type")]
    pub effect_type: String,
    pub name: String,
    pub enabled: bool,
    pub params: BTreeMap<String, ParamValue>,
}

impl Effect {
    /// Create an effect with the default parameters for its type.
    pub fn new(id: impl Into<String>, effect_type: impl Into<String>) -> Self {
        let effect_type = effect_type.into();
        let params = default_params(&effect_type);
        Self {
            id: id.into(),
            name: display_name(&effect_type),
            effect_type,
            enabled: true,
            params,
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    pub fn get_param(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }
}

/// Default parameter sets for the built-in effect types. Unknown types start
/// with no parameters.
fn default_params(effect_type: &str) -> BTreeMap<String, ParamValue> {
    let defaults: &[(&str, f64)] = match effect_type {
        "brightness" => &[("brightness", 0.0), ("contrast", 1.0)],
        "exposure" => &[("exposure", 0.0), ("gamma", 1.0)],
        "hue-saturation" => &[("hue", 0.0), ("saturation", 1.0), ("lightness", 0.0)],
        "gaussian-blur" => &[("radius", 0.0)],
        "directional-blur" => &[("radius", 0.0), ("angle", 0.0)],
        "vignette" => &[("amount", 0.5), ("size", 0.5), ("softness", 0.5)],
        "sharpen" => &[("amount", 0.0)],
        "noise" => &[("amount", 0.0)],
        "chroma-key" => &[("tolerance", 0.3), ("softness", 0.1)],
        _ => &[],
    };
    defaults
        .iter()
        .map(|(name, value)| ((*name).to_string(), ParamValue::Float(*value)))
        .collect()
}

fn display_name(effect_type: &str) -> String {
    effect_type
        .split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_effect_has_type_defaults() {
        let fx = Effect::new("fx-1", "hue-saturation");
        assert_eq!(fx.name, "Hue Saturation");
        assert_eq!(fx.get_param("saturation").and_then(ParamValue::as_float), Some(1.0));
        assert!(fx.enabled);
    }

    #[test]
    fn builder_overrides_param() {
        let fx = Effect::new("fx-1", "brightness").with_param("brightness", ParamValue::Float(0.4));
        assert_eq!(fx.get_param("brightness").and_then(ParamValue::as_float), Some(0.4));
        assert_eq!(fx.params.len(), 2);
    }

    #[test]
    fn param_values_roundtrip_as_plain_json() {
        let fx = Effect::new("fx-1", "custom")
            .with_param("amount", ParamValue::Float(0.5))
            .with_param("steps", ParamValue::Int(3))
            .with_param("invert", ParamValue::Bool(true))
            .with_param("color", ParamValue::Text("#ff0000".into()));
        let json = serde_json::to_string(&fx).unwrap();
        assert!(json.contains("\"amount\":0.5"));
        assert!(json.contains("\"type\":\"custom\""));
        let back: Effect = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fx);
    }
}
