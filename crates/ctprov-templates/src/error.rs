use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template {index} of '{resource}' is missing required field '{field}'")]
    MissingField {
        field: &'static str,
        index: usize,
        resource: String,
    },

    #[error("invalid config file name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("failed to write {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize templates for '{resource}'")]
    Serialize {
        resource: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to set ownership {user}:{group} on {}", path.display())]
    Ownership {
        path: PathBuf,
        user: String,
        group: String,
        #[source]
        source: anyhow::Error,
    },
}

impl TemplateError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
