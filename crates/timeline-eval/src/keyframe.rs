//! Keyframe interpolation: linear, hold, CSS-style eases, and cubic bezier.
//!
//! Given keyframes sorted by time and a clip-local time, this module computes
//! the interpolated property value. Each segment is shaped by the easing of
//! its leading keyframe.

use ms_common::{ClipTransform, Effect, ParamValue};

use crate::types::{AnimatableProperty, BezierHandle, Easing, Keyframe};

/// Control points of the CSS `ease-in`, `ease-out`, and `ease-in-out` curves.
const EASE_IN: (f64, f64, f64, f64) = (0.42, 0.0, 1.0, 1.0);
const EASE_OUT: (f64, f64, f64, f64) = (0.0, 0.0, 0.58, 1.0);
const EASE_IN_OUT: (f64, f64, f64, f64) = (0.42, 0.0, 0.58, 1.0);

/// Evaluate a list of keyframes of one property at the given clip-local time.
///
/// Returns `None` if the list is empty. Before the first keyframe the first
/// value is held; after the last keyframe the last value is held.
pub fn interpolate<'a, I>(keyframes: I, time: f64) -> Option<f64>
where
    I: IntoIterator<Item = &'a Keyframe>,
{
    let mut keyframes: Vec<&Keyframe> = keyframes.into_iter().collect();
    if keyframes.is_empty() {
        return None;
    }
    keyframes.sort_by(|a, b| a.time.total_cmp(&b.time));

    let first = keyframes[0];
    if keyframes.len() == 1 || time <= first.time {
        return Some(first.value);
    }

    let last = keyframes[keyframes.len() - 1];
    if time >= last.time {
        return Some(last.value);
    }

    keyframes
        .windows(2)
        .find(|pair| time >= pair[0].time && time < pair[1].time)
        .map(|pair| interpolate_segment(pair[0], pair[1], time))
        .or(Some(last.value))
}

/// Evaluate one property out of a clip's mixed keyframe list.
pub fn value_at(keyframes: &[Keyframe], property: &AnimatableProperty, time: f64) -> Option<f64> {
    interpolate(keyframes.iter().filter(|kf| &kf.property == property), time)
}

/// Unique keyframed properties of a clip, in first-seen order.
pub fn keyframed_properties(keyframes: &[Keyframe]) -> Vec<AnimatableProperty> {
    let mut props: Vec<AnimatableProperty> = Vec::new();
    for kf in keyframes {
        if !props.contains(&kf.property) {
            props.push(kf.property.clone());
        }
    }
    props
}

fn interpolate_segment(kf_a: &Keyframe, kf_b: &Keyframe, t: f64) -> f64 {
    let dt = kf_b.time - kf_a.time;
    if dt <= 0.0 {
        return kf_a.value;
    }

    // Normalized time within the segment [0, 1]
    let frac = (t - kf_a.time) / dt;

    match kf_a.easing {
        Easing::Hold => kf_a.value,
        Easing::Linear => lerp(kf_a.value, kf_b.value, frac),
        Easing::EaseIn => lerp(kf_a.value, kf_b.value, css_curve(EASE_IN, frac)),
        Easing::EaseOut => lerp(kf_a.value, kf_b.value, css_curve(EASE_OUT, frac)),
        Easing::EaseInOut => lerp(kf_a.value, kf_b.value, css_curve(EASE_IN_OUT, frac)),
        Easing::Bezier => {
            let out = kf_a
                .handle_out
                .unwrap_or(BezierHandle { x: dt / 3.0, y: 0.0 });
            let inc = kf_b
                .handle_in
                .unwrap_or(BezierHandle { x: -dt / 3.0, y: 0.0 });
            value_bezier(kf_a.value, kf_b.value, out, inc, dt, frac)
        }
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Progress through a CSS `cubic-bezier(x1, y1, x2, y2)` timing curve.
fn css_curve((x1, y1, x2, y2): (f64, f64, f64, f64), frac: f64) -> f64 {
    let param_t = solve_bezier_x(x1, x2, frac);
    eval_cubic(0.0, y1, y2, 1.0, param_t)
}

/// Cubic bezier in (time, value) space.
///
/// Control points, with x normalized to the segment:
///   P0 = (0, v_a)
///   P1 = (out.x / dt, v_a + out.y)
///   P2 = (1 + in.x / dt, v_b + in.y)
///   P3 = (1, v_b)
///
/// x is clamped into [0, 1] so the curve stays a function of time.
fn value_bezier(
    v_a: f64,
    v_b: f64,
    out: BezierHandle,
    inc: BezierHandle,
    dt: f64,
    frac: f64,
) -> f64 {
    let x1 = (out.x / dt).clamp(0.0, 1.0);
    let x2 = (1.0 + inc.x / dt).clamp(0.0, 1.0);

    let param_t = solve_bezier_x(x1, x2, frac);
    eval_cubic(v_a, v_a + out.y, v_b + inc.y, v_b, param_t)
}

/// B(t) = (1-t)^3*p0 + 3*(1-t)^2*t*p1 + 3*(1-t)*t^2*p2 + t^3*p3
fn eval_cubic(p0: f64, p1: f64, p2: f64, p3: f64, t: f64) -> f64 {
    let one_minus_t = 1.0 - t;
    let omt2 = one_minus_t * one_minus_t;
    let omt3 = omt2 * one_minus_t;
    let t2 = t * t;
    let t3 = t2 * t;
    omt3 * p0 + 3.0 * omt2 * t * p1 + 3.0 * one_minus_t * t2 * p2 + t3 * p3
}

/// B'(t) = 3*(1-t)^2*(p1-p0) + 6*(1-t)*t*(p2-p1) + 3*t^2*(p3-p2)
fn eval_cubic_derivative(p0: f64, p1: f64, p2: f64, p3: f64, t: f64) -> f64 {
    let one_minus_t = 1.0 - t;
    3.0 * one_minus_t * one_minus_t * (p1 - p0)
        + 6.0 * one_minus_t * t * (p2 - p1)
        + 3.0 * t * t * (p3 - p2)
}

/// Solve for parametric t given x in a cubic bezier where x0=0, x3=1.
/// Newton-Raphson first, bisection if it fails to converge.
fn solve_bezier_x(x1: f64, x2: f64, target_x: f64) -> f64 {
    let mut t = target_x;

    for _ in 0..8 {
        let x = eval_cubic(0.0, x1, x2, 1.0, t) - target_x;
        if x.abs() < 1e-9 {
            return t;
        }
        let dx = eval_cubic_derivative(0.0, x1, x2, 1.0, t);
        if dx.abs() < 1e-12 {
            break;
        }
        t = (t - x / dx).clamp(0.0, 1.0);
    }

    let mut lo = 0.0_f64;
    let mut hi = 1.0_f64;
    t = target_x;

    for _ in 0..48 {
        let x = eval_cubic(0.0, x1, x2, 1.0, t);
        if (x - target_x).abs() < 1e-9 {
            return t;
        }
        if x < target_x {
            lo = t;
        } else {
            hi = t;
        }
        t = (lo + hi) * 0.5;
    }

    t
}

/// Override every keyframed transform property of `base` with its value at
/// `local_time`. Un-keyframed properties keep their static value.
pub fn apply_keyframes(base: &ClipTransform, keyframes: &[Keyframe], local_time: f64) -> ClipTransform {
    let mut out = base.clone();
    if keyframes.is_empty() {
        return out;
    }

    for prop in AnimatableProperty::TRANSFORM {
        let Some(value) = value_at(keyframes, &prop, local_time) else {
            continue;
        };
        match prop {
            AnimatableProperty::Opacity => out.opacity = value.clamp(0.0, 1.0),
            AnimatableProperty::PositionX => out.position.x = value,
            AnimatableProperty::PositionY => out.position.y = value,
            AnimatableProperty::PositionZ => out.position.z = value,
            AnimatableProperty::ScaleX => out.scale.x = value,
            AnimatableProperty::ScaleY => out.scale.y = value,
            AnimatableProperty::RotationX => out.rotation.x = value,
            AnimatableProperty::RotationY => out.rotation.y = value,
            AnimatableProperty::RotationZ => out.rotation.z = value,
            AnimatableProperty::Speed | AnimatableProperty::EffectParam { .. } => {}
        }
    }

    out
}

/// Return a copy of `effects` with keyframed parameters replaced by their
/// interpolated values. Keyframes addressing a missing effect are ignored.
pub fn apply_effect_keyframes(effects: &[Effect], keyframes: &[Keyframe], local_time: f64) -> Vec<Effect> {
    let mut out = effects.to_vec();

    for prop in keyframed_properties(keyframes) {
        let AnimatableProperty::EffectParam { effect_id, param } = &prop else {
            continue;
        };
        let Some(effect) = out.iter_mut().find(|e| &e.id == effect_id) else {
            continue;
        };
        if let Some(value) = value_at(keyframes, &prop, local_time) {
            effect.params.insert(param.clone(), ParamValue::Float(value));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kf(time: f64, value: f64, easing: Easing) -> Keyframe {
        Keyframe::new(
            format!("kf-{time}"),
            "clip",
            AnimatableProperty::Opacity,
            time,
            value,
            easing,
        )
    }

    fn linear(times_values: &[(f64, f64)]) -> Vec<Keyframe> {
        times_values
            .iter()
            .map(|&(t, v)| kf(t, v, Easing::Linear))
            .collect()
    }

    #[test]
    fn empty_keyframes_returns_none() {
        assert!(interpolate(&[], 1.0).is_none());
    }

    #[test]
    fn single_keyframe_returns_value() {
        let kfs = linear(&[(0.0, 0.75)]);
        let val = interpolate(&kfs, 5.0).unwrap();
        assert!((val - 0.75).abs() < 1e-9);
    }

    #[test]
    fn linear_interpolation_midpoint() {
        let kfs = linear(&[(0.0, 0.0), (2.0, 4.0)]);
        assert!((interpolate(&kfs, 1.0).unwrap() - 2.0).abs() < 1e-9);
        assert!((interpolate(&kfs, 0.5).unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn clamps_outside_keyframe_range() {
        let kfs = linear(&[(1.0, 5.0), (2.0, 10.0)]);
        assert!((interpolate(&kfs, 0.0).unwrap() - 5.0).abs() < 1e-9);
        assert!((interpolate(&kfs, 9.0).unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn multi_segment_linear() {
        let kfs = linear(&[(0.0, 0.0), (1.0, 10.0), (2.0, 5.0)]);
        assert!((interpolate(&kfs, 0.5).unwrap() - 5.0).abs() < 1e-9);
        assert!((interpolate(&kfs, 1.5).unwrap() - 7.5).abs() < 1e-9);
    }

    #[test]
    fn hold_uses_leading_value() {
        let kfs = vec![kf(0.0, 1.0, Easing::Hold), kf(1.0, 0.0, Easing::Linear)];
        assert!((interpolate(&kfs, 0.99).unwrap() - 1.0).abs() < 1e-9);
        assert!((interpolate(&kfs, 1.0).unwrap() - 0.0).abs() < 1e-9);
    }

    #[test]
    fn leading_easing_governs_segment() {
        // The trailing keyframe is Hold, but the segment belongs to the Linear leader.
        let kfs = vec![kf(0.0, 0.0, Easing::Linear), kf(1.0, 1.0, Easing::Hold)];
        assert!((interpolate(&kfs, 0.25).unwrap() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn css_eases_bend_the_right_way() {
        let ease_in = vec![kf(0.0, 0.0, Easing::EaseIn), kf(1.0, 1.0, Easing::Linear)];
        let ease_out = vec![kf(0.0, 0.0, Easing::EaseOut), kf(1.0, 1.0, Easing::Linear)];
        let in_out = vec![kf(0.0, 0.0, Easing::EaseInOut), kf(1.0, 1.0, Easing::Linear)];

        assert!(interpolate(&ease_in, 0.5).unwrap() < 0.5);
        assert!(interpolate(&ease_out, 0.5).unwrap() > 0.5);
        // ease-in-out is symmetric around the midpoint
        assert!((interpolate(&in_out, 0.5).unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn bezier_default_handles_hit_endpoints() {
        let kfs = vec![kf(0.0, 0.0, Easing::Bezier), kf(1.0, 100.0, Easing::Bezier)];
        assert!((interpolate(&kfs, 0.0).unwrap() - 0.0).abs() < 1e-6);
        assert!((interpolate(&kfs, 1.0).unwrap() - 100.0).abs() < 1e-6);
        // flat default handles ease both ends: the midpoint is still centered
        assert!((interpolate(&kfs, 0.5).unwrap() - 50.0).abs() < 1e-6);
        assert!(interpolate(&kfs, 0.1).unwrap() < 10.0);
    }

    #[test]
    fn bezier_handle_overshoots() {
        let mut a = kf(0.0, 0.0, Easing::Bezier);
        a.handle_out = Some(BezierHandle { x: 0.33, y: 150.0 });
        let mut b = kf(1.0, 100.0, Easing::Linear);
        b.handle_in = Some(BezierHandle { x: -0.33, y: 50.0 });
        let v = interpolate(&[a, b], 0.5).unwrap();
        assert!(v > 100.0, "expected overshoot, got {v}");
    }

    #[test]
    fn value_at_filters_by_property() {
        let mut kfs = linear(&[(0.0, 0.0), (1.0, 1.0)]);
        kfs.push(Keyframe::new("px", "clip", AnimatableProperty::PositionX, 0.0, 100.0, Easing::Linear));
        kfs.push(Keyframe::new("px2", "clip", AnimatableProperty::PositionX, 1.0, 200.0, Easing::Linear));

        let op = value_at(&kfs, &AnimatableProperty::Opacity, 0.5).unwrap();
        let px = value_at(&kfs, &AnimatableProperty::PositionX, 0.5).unwrap();
        assert!((op - 0.5).abs() < 1e-9);
        assert!((px - 150.0).abs() < 1e-9);
        assert!(value_at(&kfs, &AnimatableProperty::ScaleX, 0.5).is_none());
        assert_eq!(keyframed_properties(&kfs).len(), 2);
    }

    #[test]
    fn apply_keyframes_overrides_only_animated_fields() {
        let mut base = ClipTransform::default();
        base.position.y = 42.0;
        let kfs = vec![
            Keyframe::new("a", "clip", AnimatableProperty::PositionX, 0.0, 100.0, Easing::Linear),
            Keyframe::new("b", "clip", AnimatableProperty::PositionX, 1.0, 200.0, Easing::Linear),
            Keyframe::new("c", "clip", AnimatableProperty::Opacity, 0.0, 3.0, Easing::Linear),
        ];
        let t = apply_keyframes(&base, &kfs, 0.5);
        assert!((t.position.x - 150.0).abs() < 1e-9);
        assert!((t.position.y - 42.0).abs() < 1e-9);
        assert!((t.opacity - 1.0).abs() < 1e-9);
    }

    #[test]
    fn apply_effect_keyframes_updates_params() {
        let effects = vec![Effect::new("fx-1", "gaussian-blur")];
        let kfs = vec![
            Keyframe::new("a", "clip", AnimatableProperty::effect("fx-1", "radius"), 0.0, 0.0, Easing::Linear),
            Keyframe::new("b", "clip", AnimatableProperty::effect("fx-1", "radius"), 2.0, 10.0, Easing::Linear),
            Keyframe::new("c", "clip", AnimatableProperty::effect("gone", "radius"), 0.0, 1.0, Easing::Linear),
        ];
        let out = apply_effect_keyframes(&effects, &kfs, 1.0);
        assert_eq!(out.len(), 1);
        let radius = out[0].get_param("radius").and_then(ParamValue::as_float).unwrap();
        assert!((radius - 5.0).abs() < 1e-9);
        // the stored effect is untouched
        assert_eq!(effects[0].get_param("radius").and_then(ParamValue::as_float), Some(0.0));
    }
}
