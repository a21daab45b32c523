use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("invalid installation request: {reason}")]
    InvalidRequest { reason: String },

    #[error("failed to list installed versions under {}", root.display())]
    ListVersions {
        root: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to stop the managed service; stale versions {stale:?} were left in place")]
    ServiceStop {
        stale: Vec<String>,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to create version directory {}", path.display())]
    CreateVersionDir {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to fetch {url} into {}", destination.display())]
    Fetch {
        url: String,
        destination: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("archive {url} did not provide {}", path.display())]
    MissingProgram { url: String, path: PathBuf },

    #[error("failed to remove {}", path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

impl LifecycleError {
    pub(crate) fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }
}
