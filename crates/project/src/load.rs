//! Deserialization: loading and validating project files.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::{ProjectError, ProjectResult};
use crate::types::{CompositionData, ProjectFile, CURRENT_VERSION};

/// Deserialize and validate a project from a JSON string.
pub fn from_json_string(json: &str) -> ProjectResult<ProjectFile> {
    let project: ProjectFile = serde_json::from_str(json)?;

    debug!(
        project_name = %project.name,
        version = project.version,
        media_count = project.media.len(),
        composition_count = project.compositions.len(),
        "Deserialized project from JSON"
    );

    validate_project(&project)?;
    Ok(project)
}

/// Deserialize a single composition (no project envelope).
pub fn composition_from_json(json: &str) -> ProjectResult<CompositionData> {
    let comp: CompositionData = serde_json::from_str(json)?;
    validate_composition(&comp)?;
    Ok(comp)
}

/// Load a project from a file at the given path.
pub fn load_project(path: &Path) -> ProjectResult<ProjectFile> {
    if !path.is_file() {
        return Err(ProjectError::NotFound {
            path: path.display().to_string(),
        });
    }

    let json = std::fs::read_to_string(path).map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "Failed to read project file");
        ProjectError::Io(e)
    })?;

    let project = from_json_string(&json)?;

    info!(
        project_name = %project.name,
        path = %path.display(),
        compositions = project.compositions.len(),
        media_files = project.media.len(),
        "Project loaded"
    );
    Ok(project)
}

fn validate_project(project: &ProjectFile) -> ProjectResult<()> {
    if project.version > CURRENT_VERSION {
        return Err(ProjectError::UnsupportedVersion {
            version: project.version,
            supported: CURRENT_VERSION,
        });
    }

    if project.name.is_empty() {
        warn!("Project has empty name");
        return Err(ProjectError::InvalidSettings {
            reason: "project name is empty".into(),
        });
    }

    if project.settings.width == 0 || project.settings.height == 0 {
        return Err(ProjectError::InvalidSettings {
            reason: format!(
                "invalid resolution: {}x{}",
                project.settings.width, project.settings.height
            ),
        });
    }

    if project.settings.frame_rate <= 0.0 {
        return Err(ProjectError::InvalidSettings {
            reason: format!("invalid frame rate: {}", project.settings.frame_rate),
        });
    }

    for comp in &project.compositions {
        validate_composition(comp)?;
    }
    Ok(())
}

/// Duplicate ids are fatal. Dangling references are only warned about; the
/// store drops them on load.
fn validate_composition(comp: &CompositionData) -> ProjectResult<()> {
    let mut track_ids = HashSet::new();
    for track in &comp.tracks {
        if !track_ids.insert(track.id.as_str()) {
            return Err(ProjectError::DuplicateId {
                composition_id: comp.id.clone(),
                kind: "track",
                id: track.id.clone(),
            });
        }
    }

    let mut clip_ids = HashSet::new();
    for clip in &comp.clips {
        if !clip_ids.insert(clip.id.as_str()) {
            return Err(ProjectError::DuplicateId {
                composition_id: comp.id.clone(),
                kind: "clip",
                id: clip.id.clone(),
            });
        }
    }

    for clip in &comp.clips {
        if !track_ids.contains(clip.track_id.as_str()) {
            warn!(
                clip_id = %clip.id,
                track_id = %clip.track_id,
                composition = %comp.name,
                "Clip references non-existent track"
            );
        }
        if let Some(linked) = clip.linked_clip_id.as_deref() {
            let symmetric = comp
                .clip(linked)
                .is_some_and(|other| other.linked_clip_id.as_deref() == Some(clip.id.as_str()));
            if !symmetric {
                warn!(
                    clip_id = %clip.id,
                    linked_clip_id = linked,
                    composition = %comp.name,
                    "Asymmetric or dangling clip link"
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::save::{composition_to_json, save_project, to_json_string};
    use crate::types::{ClipData, ProjectSettings, TrackData};
    use ms_common::{MediaKind, TrackType};

    fn sample_project() -> ProjectFile {
        let mut project = ProjectFile::new("Load Test", ProjectSettings::default());
        let mut comp = CompositionData::new("comp-1", "Main", 1920, 1080, 30.0);
        comp.tracks.push(TrackData {
            id: "v1".into(),
            name: "Video 1".into(),
            track_type: TrackType::Video,
            height: 60,
            locked: false,
            visible: true,
            muted: false,
            solo: false,
            parent_track_id: None,
        });
        let mut clip = ClipData::new("clip-1", "v1", MediaKind::Video, 0.0, 5.0);
        clip.media_file_id = Some("media-1".into());
        clip.natural_duration = Some(10.0);
        comp.clips.push(clip);
        project.compositions.push(comp);
        project
    }

    fn envelope(name: &str, width: u32, frame_rate: f64, version: u32) -> String {
        serde_json::json!({
            "version": version,
            "name": name,
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z",
            "settings": {
                "width": width,
                "height": 1080,
                "frameRate": frame_rate,
                "sampleRate": 48000
            }
        })
        .to_string()
    }

    #[test]
    fn from_json_string_basic() {
        let json = to_json_string(&sample_project()).expect("serialize");
        let loaded = from_json_string(&json).expect("deserialize");
        assert_eq!(loaded.name, "Load Test");
        assert_eq!(loaded.compositions[0].clips.len(), 1);
        assert_eq!(
            loaded.compositions[0].clips[0].media_file_id.as_deref(),
            Some("media-1")
        );
    }

    #[test]
    fn load_project_file_roundtrip() {
        let dir = std::env::temp_dir().join(format!("ms_project_load_{}", std::process::id()));
        let _ = std::fs::create_dir_all(&dir);
        let path = dir.join("load_test.msproj");

        let project = sample_project();
        save_project(&project, &path).expect("save");
        let loaded = load_project(&path).expect("load");
        assert_eq!(loaded.compositions, project.compositions);

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_dir(&dir);
    }

    #[test]
    fn load_project_nonexistent_file() {
        let path = std::path::PathBuf::from("/nonexistent/path/project.msproj");
        let err = load_project(&path).unwrap_err();
        assert!(matches!(err, ProjectError::NotFound { .. }));
    }

    #[test]
    fn from_json_string_invalid_json() {
        assert!(matches!(from_json_string("this is not json"), Err(ProjectError::Json(_))));
    }

    #[test]
    fn minimal_envelope_loads() {
        let loaded = from_json_string(&envelope("Minimal", 1920, 30.0, 1)).expect("load");
        assert!(loaded.compositions.is_empty());
        assert!(loaded.active_composition_id.is_none());
    }

    #[test]
    fn validate_rejects_bad_envelopes() {
        let err = from_json_string(&envelope("", 1920, 30.0, 1)).unwrap_err();
        assert!(err.to_string().contains("empty"));
        let err = from_json_string(&envelope("Bad", 0, 30.0, 1)).unwrap_err();
        assert!(err.to_string().contains("resolution"));
        let err = from_json_string(&envelope("Bad FPS", 1920, -1.0, 1)).unwrap_err();
        assert!(err.to_string().contains("frame rate"));
        let err = from_json_string(&envelope("Future", 1920, 30.0, 7)).unwrap_err();
        assert!(matches!(err, ProjectError::UnsupportedVersion { version: 7, .. }));
    }

    #[test]
    fn duplicate_clip_ids_are_rejected() {
        let mut project = sample_project();
        let dup = project.compositions[0].clips[0].clone();
        project.compositions[0].clips.push(dup);
        let json = to_json_string(&project).unwrap();
        let err = from_json_string(&json).unwrap_err();
        assert!(err.to_string().contains("duplicate clip id"));
    }

    #[test]
    fn composition_json_roundtrip() {
        let project = sample_project();
        let json = composition_to_json(&project.compositions[0]).unwrap();
        let back = composition_from_json(&json).unwrap();
        assert_eq!(back, project.compositions[0]);
    }
}
