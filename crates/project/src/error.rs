//! Errors raised while reading or writing project and composition files.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("project file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed project JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Written by a newer build than this one understands.
    #[error("project format v{version} is newer than supported v{supported}")]
    UnsupportedVersion { version: u32, supported: u32 },

    /// Name, resolution, or frame rate out of range.
    #[error("bad project settings: {reason}")]
    InvalidSettings { reason: String },

    /// Two tracks (or two clips) in one composition share an id.
    #[error("duplicate {kind} id {id} in composition {composition_id}")]
    DuplicateId {
        composition_id: String,
        kind: &'static str,
        id: String,
    },

    #[error("no project file at {path}")]
    NotFound { path: String },
}

pub type ProjectResult<T> = Result<T, ProjectError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_id_names_the_composition() {
        let err = ProjectError::DuplicateId {
            composition_id: "comp-main".into(),
            kind: "track",
            id: "video-1".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("duplicate track id video-1"));
        assert!(msg.contains("comp-main"));
    }

    #[test]
    fn version_message_shows_both_versions() {
        let msg = ProjectError::UnsupportedVersion {
            version: 4,
            supported: 2,
        }
        .to_string();
        assert!(msg.contains("v4") && msg.contains("v2"));
    }

    #[test]
    fn serde_failures_become_json_errors() {
        let parsed: Result<crate::types::CompositionData, _> = serde_json::from_str("{\"id\":");
        let err: ProjectError = parsed.unwrap_err().into();
        assert!(matches!(err, ProjectError::Json(_)));
    }
}
