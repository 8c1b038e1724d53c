//! Core value types shared by the timeline crates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Rational number for frame rates (e.g., 30000/1001 for 29.97fps).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    pub num: u32,
    pub den: u32,
}

impl Rational {
    pub const FPS_24: Self = Self { num: 24, den: 1 };
    pub const FPS_25: Self = Self { num: 25, den: 1 };
    pub const FPS_30: Self = Self { num: 30, den: 1 };
    pub const FPS_29_97: Self = Self {
        num: 30000,
        den: 1001,
    };
    pub const FPS_60: Self = Self { num: 60, den: 1 };

    pub fn new(num: u32, den: u32) -> Self {
        assert!(den > 0, "Rational denominator must be > 0");
        Self { num, den }
    }

    /// Approximate a floating-point frame rate (as stored in project files).
    pub fn from_fps(fps: f64) -> Self {
        if (fps - 29.97).abs() < 0.01 {
            return Self::FPS_29_97;
        }
        if (fps - 59.94).abs() < 0.01 {
            return Self::new(60000, 1001);
        }
        Self::new(fps.round().max(1.0) as u32, 1)
    }

    pub fn as_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Duration of a single frame in seconds.
    pub fn frame_duration(self) -> f64 {
        self.den as f64 / self.num as f64
    }

    /// Snap a time in seconds down to the start of its frame.
    pub fn quantize(self, secs: f64) -> f64 {
        let frame = (secs * self.as_f64() + 1e-6).floor();
        frame / self.as_f64()
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

/// Composition resolution.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const HD: Self = Self {
        width: 1920,
        height: 1080,
    };
    pub const UHD: Self = Self {
        width: 3840,
        height: 2160,
    };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect_ratio(self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Track type: video tracks stack visually, audio tracks mix.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackType {
    Video,
    Audio,
}

impl TrackType {
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Video => "Video",
            Self::Audio => "Audio",
        }
    }
}

impl fmt::Display for TrackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Kind of source media a clip is built from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    Image,
    Text,
    Solid,
    Composition,
}

impl MediaKind {
    /// The track type a clip of this kind may be placed on.
    pub fn track_type(self) -> TrackType {
        match self {
            Self::Audio => TrackType::Audio,
            Self::Video | Self::Image | Self::Text | Self::Solid | Self::Composition => {
                TrackType::Video
            }
        }
    }

    /// Whether clips of this kind are backed by a decodable file.
    pub fn is_file_backed(self) -> bool {
        matches!(self, Self::Video | Self::Audio | Self::Image)
    }

    /// Whether the source has a finite natural duration (images and generated
    /// sources can be stretched indefinitely).
    pub fn has_natural_duration(self) -> bool {
        matches!(self, Self::Video | Self::Audio | Self::Composition)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Image => "image",
            Self::Text => "text",
            Self::Solid => "solid",
            Self::Composition => "composition",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rational_display() {
        assert_eq!(Rational::FPS_30.to_string(), "30");
        assert_eq!(Rational::FPS_29_97.to_string(), "30000/1001");
    }

    #[test]
    fn rational_from_fps() {
        assert_eq!(Rational::from_fps(30.0), Rational::FPS_30);
        assert_eq!(Rational::from_fps(29.97), Rational::FPS_29_97);
        assert_eq!(Rational::from_fps(0.0), Rational::new(1, 1));
    }

    #[test]
    fn quantize_snaps_to_frame_start() {
        let fps = Rational::FPS_30;
        let q = fps.quantize(1.0 / 30.0 * 4.5);
        assert!((q - 4.0 / 30.0).abs() < 1e-9);
        // exact frame boundaries stay put
        let q = fps.quantize(2.0);
        assert!((q - 2.0).abs() < 1e-9);
    }

    #[test]
    fn media_kind_track_compatibility() {
        assert_eq!(MediaKind::Video.track_type(), TrackType::Video);
        assert_eq!(MediaKind::Image.track_type(), TrackType::Video);
        assert_eq!(MediaKind::Solid.track_type(), TrackType::Video);
        assert_eq!(MediaKind::Audio.track_type(), TrackType::Audio);
    }

    #[test]
    fn track_type_serializes_lowercase() {
        let json = serde_json::to_string(&TrackType::Audio).unwrap();
        assert_eq!(json, "\"audio\"");
    }
}
