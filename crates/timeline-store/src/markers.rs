//! Timeline markers, kept sorted by time.

use crate::error::{TimelineError, TimelineResult};
use crate::state::TimelineState;
use crate::types::{new_id, Marker};

pub const DEFAULT_MARKER_COLOR: &str = "#ffcc00";

fn marker_not_found(marker_id: &str) -> TimelineError {
    TimelineError::MarkerNotFound {
        marker_id: marker_id.to_string(),
    }
}

fn sort_markers(state: &mut TimelineState) {
    state.markers.sort_by(|a, b| a.time.total_cmp(&b.time));
}

/// Add a marker. Missing labels become "Marker N".
pub fn add_marker(state: &mut TimelineState, time: f64, label: Option<&str>, color: Option<&str>) -> String {
    let id = new_id("marker");
    let label = label
        .map(str::to_string)
        .unwrap_or_else(|| format!("Marker {}", state.markers.len() + 1));
    state.markers.push(Marker {
        id: id.clone(),
        time: time.max(0.0),
        label,
        color: color.unwrap_or(DEFAULT_MARKER_COLOR).to_string(),
    });
    sort_markers(state);
    id
}

pub fn remove_marker(state: &mut TimelineState, marker_id: &str) -> TimelineResult<()> {
    let before = state.markers.len();
    state.markers.retain(|m| m.id != marker_id);
    if state.markers.len() == before {
        return Err(marker_not_found(marker_id));
    }
    Ok(())
}

pub fn move_marker(state: &mut TimelineState, marker_id: &str, time: f64) -> TimelineResult<()> {
    let marker = state
        .markers
        .iter_mut()
        .find(|m| m.id == marker_id)
        .ok_or_else(|| marker_not_found(marker_id))?;
    marker.time = time.max(0.0);
    sort_markers(state);
    Ok(())
}

pub fn update_marker(
    state: &mut TimelineState,
    marker_id: &str,
    label: Option<&str>,
    color: Option<&str>,
) -> TimelineResult<()> {
    let marker = state
        .markers
        .iter_mut()
        .find(|m| m.id == marker_id)
        .ok_or_else(|| marker_not_found(marker_id))?;
    if let Some(label) = label {
        marker.label = label.to_string();
    }
    if let Some(color) = color {
        marker.color = color.to_string();
    }
    Ok(())
}

/// First marker strictly after `time`.
pub fn next_marker_after(state: &TimelineState, time: f64) -> Option<&Marker> {
    state.markers.iter().find(|m| m.time > time + 1e-9)
}

/// Last marker strictly before `time`.
pub fn previous_marker_before(state: &TimelineState, time: f64) -> Option<&Marker> {
    state.markers.iter().rev().find(|m| m.time < time - 1e-9)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ms_common::TimelineConfig;

    #[test]
    fn markers_stay_sorted() {
        let mut state = TimelineState::new(&TimelineConfig::default());
        let late = add_marker(&mut state, 5.0, None, None);
        let early = add_marker(&mut state, 1.0, Some("Intro"), Some("#ff0000"));
        assert_eq!(state.markers[0].id, early);
        assert_eq!(state.markers[1].label, "Marker 1");
        assert_eq!(state.markers[1].color, DEFAULT_MARKER_COLOR);

        move_marker(&mut state, &early, 9.0).unwrap();
        assert_eq!(state.markers[0].id, late);
    }

    #[test]
    fn navigation_skips_the_current_position() {
        let mut state = TimelineState::new(&TimelineConfig::default());
        add_marker(&mut state, 1.0, Some("a"), None);
        add_marker(&mut state, 3.0, Some("b"), None);
        assert_eq!(next_marker_after(&state, 1.0).map(|m| m.label.as_str()), Some("b"));
        assert_eq!(previous_marker_before(&state, 3.0).map(|m| m.label.as_str()), Some("a"));
        assert!(next_marker_after(&state, 3.0).is_none());
    }

    #[test]
    fn missing_markers_are_reported() {
        let mut state = TimelineState::new(&TimelineConfig::default());
        assert!(matches!(remove_marker(&mut state, "x"), Err(TimelineError::MarkerNotFound { .. })));
        let id = add_marker(&mut state, 0.0, None, None);
        update_marker(&mut state, &id, Some("Cut"), None).unwrap();
        assert_eq!(state.markers[0].label, "Cut");
    }
}
