//! Timeline engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::Rational;

/// Tunables for editing behavior, UI bookkeeping, and background work.
///
/// Every field has a default, so a partial JSON document (or `{}`) is a
/// valid configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Whether drag positions snap to neighbouring clip edges and 0.
    pub snapping_enabled: bool,
    /// Maximum distance (seconds) at which a snap candidate is taken.
    pub snap_threshold: f64,
    /// Pixels the user must drag past a free position before a same-track
    /// overlap is allowed (pixel resistance placement).
    pub overlap_resistance_px: f64,
    /// Height of newly created tracks, in pixels.
    pub default_track_height: u32,
    pub min_track_height: u32,
    pub max_track_height: u32,
    /// Height of one keyframe property row in an expanded track.
    pub keyframe_row_height: u32,
    /// Height of one expanded curve editor.
    pub curve_editor_height: u32,
    /// Recursion guard for parent-chain transform resolution.
    pub max_parent_depth: usize,
    /// Timeline duration given to still images on import (seconds).
    pub default_image_duration: f64,
    /// Timeline duration given to text and solid clips (seconds).
    pub default_generated_duration: f64,
    /// Number of undo steps kept.
    pub history_limit: usize,
    /// Minimum interval between decoder seeks while scrubbing.
    pub scrub_seek_interval_ms: u64,
    /// Ask the media provider for thumbnails after a video/image loads.
    pub generate_thumbnails: bool,
    /// Ask the media provider for a waveform after audio loads.
    pub generate_waveforms: bool,
    /// Frame rate used to quantize RAM-preview cache ranges.
    pub preview_fps: Rational,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            snapping_enabled: true,
            snap_threshold: 0.1,
            overlap_resistance_px: 100.0,
            default_track_height: 60,
            min_track_height: 30,
            max_track_height: 200,
            keyframe_row_height: 20,
            curve_editor_height: 120,
            max_parent_depth: 32,
            default_image_duration: 5.0,
            default_generated_duration: 5.0,
            history_limit: 50,
            scrub_seek_interval_ms: 50,
            generate_thumbnails: true,
            generate_waveforms: true,
            preview_fps: Rational::FPS_30,
        }
    }
}

impl TimelineConfig {
    /// Parse a configuration from JSON and validate it.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_track_height == 0 || self.min_track_height > self.max_track_height {
            return Err(ConfigError::Invalid {
                field: "min_track_height",
                reason: format!(
                    "must be in 1..={} (got {})",
                    self.max_track_height, self.min_track_height
                ),
            });
        }
        if !(self.min_track_height..=self.max_track_height).contains(&self.default_track_height) {
            return Err(ConfigError::Invalid {
                field: "default_track_height",
                reason: format!(
                    "must lie within [{}, {}]",
                    self.min_track_height, self.max_track_height
                ),
            });
        }
        if !(self.snap_threshold >= 0.0) {
            return Err(ConfigError::Invalid {
                field: "snap_threshold",
                reason: "must be non-negative".into(),
            });
        }
        if self.max_parent_depth == 0 {
            return Err(ConfigError::Invalid {
                field: "max_parent_depth",
                reason: "must be at least 1".into(),
            });
        }
        if self.default_image_duration <= 0.0 || self.default_generated_duration <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "default_image_duration",
                reason: "default durations must be positive".into(),
            });
        }
        if self.preview_fps.num == 0 || self.preview_fps.den == 0 {
            return Err(ConfigError::Invalid {
                field: "preview_fps",
                reason: "frame rate must be positive".into(),
            });
        }
        Ok(())
    }

    /// Clamp a track height into the configured range.
    pub fn clamp_track_height(&self, height: i64) -> u32 {
        height.clamp(self.min_track_height as i64, self.max_track_height as i64) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(TimelineConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = TimelineConfig::from_json_str(r#"{ "snap_threshold": 0.25 }"#).unwrap();
        assert!((config.snap_threshold - 0.25).abs() < 1e-12);
        assert_eq!(config.max_track_height, 200);
        assert!(config.snapping_enabled);
    }

    #[test]
    fn rejects_inverted_height_range() {
        let err = TimelineConfig::from_json_str(
            r#"{ "min_track_height": 300, "max_track_height": 200 }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "min_track_height", .. }));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = TimelineConfig::from_json_str("{ nope").unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn clamp_track_height_limits() {
        let config = TimelineConfig::default();
        assert_eq!(config.clamp_track_height(10), 30);
        assert_eq!(config.clamp_track_height(500), 200);
        assert_eq!(config.clamp_track_height(90), 90);
    }
}
