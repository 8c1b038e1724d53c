//! Blend mode definitions for layer compositing.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Blend modes a clip can be composited with. Serialized in the web
/// project format's kebab-case spelling (`"color-dodge"`).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Hue,
    Saturation,
    Color,
    Luminosity,
    Add,
    Subtract,
}

impl BlendMode {
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Multiply => "Multiply",
            Self::Screen => "Screen",
            Self::Overlay => "Overlay",
            Self::Darken => "Darken",
            Self::Lighten => "Lighten",
            Self::ColorDodge => "Color Dodge",
            Self::ColorBurn => "Color Burn",
            Self::HardLight => "Hard Light",
            Self::SoftLight => "Soft Light",
            Self::Difference => "Difference",
            Self::Exclusion => "Exclusion",
            Self::Hue => "Hue",
            Self::Saturation => "Saturation",
            Self::Color => "Color",
            Self::Luminosity => "Luminosity",
            Self::Add => "Add",
            Self::Subtract => "Subtract",
        }
    }

    /// All blend modes in display order.
    pub fn all() -> &'static [BlendMode] {
        &[
            Self::Normal,
            Self::Multiply,
            Self::Screen,
            Self::Overlay,
            Self::Darken,
            Self::Lighten,
            Self::ColorDodge,
            Self::ColorBurn,
            Self::HardLight,
            Self::SoftLight,
            Self::Difference,
            Self::Exclusion,
            Self::Hue,
            Self::Saturation,
            Self::Color,
            Self::Luminosity,
            Self::Add,
            Self::Subtract,
        ]
    }
}

impl FromStr for BlendMode {
    type Err = String;

    /// Accepts both the display name and the serialized kebab-case form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .collect::<String>()
            .to_ascii_lowercase();
        Self::all()
            .iter()
            .copied()
            .find(|mode| {
                mode.display_name().replace(' ', "").to_ascii_lowercase() == normalized
            })
            .ok_or_else(|| format!("unknown blend mode: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_display_and_wire_names() {
        assert_eq!("Color Dodge".parse::<BlendMode>(), Ok(BlendMode::ColorDodge));
        assert_eq!("color-dodge".parse::<BlendMode>(), Ok(BlendMode::ColorDodge));
        assert_eq!("normal".parse::<BlendMode>(), Ok(BlendMode::Normal));
        assert!("glow".parse::<BlendMode>().is_err());
    }

    #[test]
    fn serializes_kebab_case() {
        let json = serde_json::to_string(&BlendMode::SoftLight).unwrap();
        assert_eq!(json, "\"soft-light\"");
    }
}
