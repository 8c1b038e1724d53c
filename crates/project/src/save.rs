//! Serialization: compositions and project files to JSON.

use std::path::Path;

use tracing::{debug, info};

use crate::error::{ProjectError, ProjectResult};
use crate::types::{CompositionData, ProjectFile};

/// Serialize a project to a pretty-printed JSON string.
pub fn to_json_string(project: &ProjectFile) -> ProjectResult<String> {
    let json = serde_json::to_string_pretty(project)?;
    debug!(
        project_name = %project.name,
        json_len = json.len(),
        "Serialized project to JSON"
    );
    Ok(json)
}

/// Serialize a single composition to compact JSON (clipboard, nesting).
pub fn composition_to_json(comp: &CompositionData) -> ProjectResult<String> {
    let json = serde_json::to_string(comp)?;
    debug!(
        composition_id = %comp.id,
        clips = comp.clips.len(),
        tracks = comp.tracks.len(),
        "Serialized composition"
    );
    Ok(json)
}

/// Save a project to `path`.
///
/// Data is written to a sibling temp file first and then renamed over the
/// target, so an interrupted save never leaves a truncated project.
pub fn save_project(project: &ProjectFile, path: &Path) -> ProjectResult<()> {
    let json = to_json_string(project)?;
    let temp_path = path.with_extension("msproj.tmp");

    std::fs::write(&temp_path, json.as_bytes()).map_err(|e| {
        tracing::error!(path = %temp_path.display(), error = %e, "Failed to write temp file");
        ProjectError::Io(e)
    })?;

    std::fs::rename(&temp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&temp_path);
        tracing::error!(
            from = %temp_path.display(),
            to = %path.display(),
            error = %e,
            "Failed to move temp file into place"
        );
        ProjectError::Io(e)
    })?;

    info!(
        project_name = %project.name,
        path = %path.display(),
        compositions = project.compositions.len(),
        "Project saved"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClipData, ProjectSettings};
    use ms_common::MediaKind;

    fn sample_project() -> ProjectFile {
        let mut project = ProjectFile::new("Save Test", ProjectSettings::default());
        let mut comp = CompositionData::new("comp-1", "Main", 1920, 1080, 30.0);
        comp.clips.push(ClipData::new("c1", "video-1", MediaKind::Solid, 0.0, 2.0));
        project.compositions.push(comp);
        project
    }

    fn scratch_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("ms_project_{name}_{}", std::process::id()));
        let _ = std::fs::create_dir_all(&dir);
        dir
    }

    #[test]
    fn to_json_string_produces_valid_json() {
        let json = to_json_string(&sample_project()).expect("serialize");
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse as Value");
        assert_eq!(value["name"], "Save Test");
        assert_eq!(value["version"], 1);
        assert_eq!(value["compositions"][0]["clips"][0]["sourceType"], "solid");
    }

    #[test]
    fn composition_json_is_compact() {
        let project = sample_project();
        let json = composition_to_json(&project.compositions[0]).expect("serialize");
        assert!(!json.contains('\n'));
        assert!(json.contains("\"tracks\":[]"));
    }

    #[test]
    fn save_project_atomic_no_temp_residue() {
        let dir = scratch_dir("atomic");
        let path = dir.join("atomic.msproj");
        let temp_path = path.with_extension("msproj.tmp");

        save_project(&sample_project(), &path).expect("save");

        assert!(path.exists());
        assert!(!temp_path.exists());
        let contents = std::fs::read_to_string(&path).expect("read");
        assert!(contents.contains("Save Test"));

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_dir(&dir);
    }

    #[test]
    fn save_into_missing_directory_fails_with_io() {
        let path = std::env::temp_dir()
            .join("ms_project_definitely_missing_dir")
            .join("nested")
            .join("x.msproj");
        let err = save_project(&sample_project(), &path).unwrap_err();
        assert!(matches!(err, ProjectError::Io(_)));
    }
}
