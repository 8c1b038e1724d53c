//! Transition definitions and evaluation between two overlapping clips.
//!
//! A transition is a deliberate overlap between an outgoing clip A and an
//! incoming clip B on the same track. During the overlap the compositor
//! weights each layer's opacity by the values computed here.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Types of transitions between clips.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionKind {
    /// Outgoing fades out while incoming fades in.
    Crossfade,
    /// Outgoing fades to black, then incoming fades from black.
    DipToBlack,
    /// Outgoing fades to white, then incoming fades from white.
    DipToWhite,
}

/// Duration limits and defaults of a transition type.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TransitionDef {
    pub kind: TransitionKind,
    pub name: &'static str,
    pub min_duration: f64,
    pub max_duration: f64,
    pub default_duration: f64,
}

impl TransitionKind {
    pub fn all() -> &'static [TransitionKind] {
        &[Self::Crossfade, Self::DipToBlack, Self::DipToWhite]
    }

    pub fn definition(self) -> TransitionDef {
        let name = match self {
            Self::Crossfade => "Crossfade",
            Self::DipToBlack => "Dip to Black",
            Self::DipToWhite => "Dip to White",
        };
        TransitionDef {
            kind: self,
            name,
            min_duration: 0.1,
            max_duration: 5.0,
            default_duration: 0.5,
        }
    }

    /// Clamp a requested duration to `[min, min(max, a_duration, b_duration)]`.
    /// If the clips are shorter than the minimum, the shorter clip wins.
    pub fn clamp_duration(self, requested: f64, a_duration: f64, b_duration: f64) -> f64 {
        let def = self.definition();
        let upper = def.max_duration.min(a_duration).min(b_duration);
        requested.max(def.min_duration).min(upper)
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.definition().name)
    }
}

/// Opacity weights for the two sides of a transition at a given progress.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TransitionResult {
    /// Opacity multiplier for the outgoing clip.
    pub outgoing: f64,
    /// Opacity multiplier for the incoming clip.
    pub incoming: f64,
    /// Background colour shown through a dip (RGBA), if any.
    pub dip_color: Option<[f32; 4]>,
}

/// Evaluate a transition at `progress` (0.0 at the start of the overlap,
/// 1.0 at its end).
pub fn evaluate_transition(kind: TransitionKind, progress: f64) -> TransitionResult {
    let progress = progress.clamp(0.0, 1.0);

    match kind {
        TransitionKind::Crossfade => TransitionResult {
            outgoing: 1.0 - progress,
            incoming: progress,
            dip_color: None,
        },
        TransitionKind::DipToBlack => evaluate_dip(progress, [0.0, 0.0, 0.0, 1.0]),
        TransitionKind::DipToWhite => evaluate_dip(progress, [1.0, 1.0, 1.0, 1.0]),
    }
}

/// First half: outgoing goes 1.0 -> 0.0, incoming stays 0.0.
/// Second half: outgoing stays 0.0, incoming goes 0.0 -> 1.0.
fn evaluate_dip(progress: f64, color: [f32; 4]) -> TransitionResult {
    let (outgoing, incoming) = if progress < 0.5 {
        (1.0 - progress * 2.0, 0.0)
    } else {
        (0.0, (progress - 0.5) * 2.0)
    };
    TransitionResult {
        outgoing,
        incoming,
        dip_color: Some(color),
    }
}

/// Transition progress for `time` inside a region starting at
/// `transition_start`. Returns a value in [0.0, 1.0].
pub fn compute_progress(time: f64, transition_start: f64, transition_duration: f64) -> f64 {
    if transition_duration <= 0.0 {
        return 1.0;
    }
    ((time - transition_start) / transition_duration).clamp(0.0, 1.0)
}

/// Overlap of two half-open spans `[start, end)`, if any.
pub fn find_overlap(a: (f64, f64), b: (f64, f64)) -> Option<(f64, f64)> {
    let start = a.0.max(b.0);
    let end = a.1.min(b.1);
    (start < end).then_some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definitions_share_limits() {
        for kind in TransitionKind::all() {
            let def = kind.definition();
            assert!((def.min_duration - 0.1).abs() < 1e-9);
            assert!((def.max_duration - 5.0).abs() < 1e-9);
            assert!((def.default_duration - 0.5).abs() < 1e-9);
        }
    }

    #[test]
    fn clamp_duration_respects_clip_lengths() {
        let k = TransitionKind::Crossfade;
        assert!((k.clamp_duration(0.01, 5.0, 5.0) - 0.1).abs() < 1e-9);
        assert!((k.clamp_duration(9.0, 10.0, 10.0) - 5.0).abs() < 1e-9);
        assert!((k.clamp_duration(2.0, 1.5, 3.0) - 1.5).abs() < 1e-9);
        assert!((k.clamp_duration(1.0, 0.05, 3.0) - 0.05).abs() < 1e-9);
    }

    #[test]
    fn crossfade_weights() {
        let r = evaluate_transition(TransitionKind::Crossfade, 0.0);
        assert!((r.outgoing - 1.0).abs() < 1e-9 && r.incoming.abs() < 1e-9);
        let r = evaluate_transition(TransitionKind::Crossfade, 0.5);
        assert!((r.outgoing - 0.5).abs() < 1e-9 && (r.incoming - 0.5).abs() < 1e-9);
        let r = evaluate_transition(TransitionKind::Crossfade, 1.0);
        assert!(r.outgoing.abs() < 1e-9 && (r.incoming - 1.0).abs() < 1e-9);
        assert!(r.dip_color.is_none());
    }

    #[test]
    fn dip_first_and_second_half() {
        let r = evaluate_transition(TransitionKind::DipToBlack, 0.25);
        assert!((r.outgoing - 0.5).abs() < 1e-9);
        assert!(r.incoming.abs() < 1e-9);
        assert_eq!(r.dip_color, Some([0.0, 0.0, 0.0, 1.0]));

        let r = evaluate_transition(TransitionKind::DipToWhite, 0.75);
        assert!(r.outgoing.abs() < 1e-9);
        assert!((r.incoming - 0.5).abs() < 1e-9);
        assert_eq!(r.dip_color, Some([1.0, 1.0, 1.0, 1.0]));
    }

    #[test]
    fn compute_progress_basic_and_clamped() {
        assert!((compute_progress(5.5, 5.0, 2.0) - 0.25).abs() < 1e-9);
        assert!((compute_progress(10.0, 5.0, 2.0) - 1.0).abs() < 1e-9);
        assert!((compute_progress(1.0, 5.0, 0.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn find_overlap_cases() {
        let overlap = find_overlap((0.0, 5.0), (4.0, 9.0)).unwrap();
        assert!((overlap.0 - 4.0).abs() < 1e-9);
        assert!((overlap.1 - 5.0).abs() < 1e-9);
        assert!(find_overlap((0.0, 5.0), (5.0, 10.0)).is_none());
    }

    #[test]
    fn kind_serializes_kebab_case() {
        let json = serde_json::to_string(&TransitionKind::DipToBlack).unwrap();
        assert_eq!(json, "\"dip-to-black\"");
    }
}
