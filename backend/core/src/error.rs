use thiserror::Error;

/// Error taxonomy for the installation pipeline.
///
/// Errors raised before the background run starts are returned to the HTTP
/// caller; errors raised during a run only ever surface as progress records.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("failed to start installer: {0}")]
    Spawn(String),

    #[error("disk layout error: {0}")]
    Layout(String),

    #[error("failed to write {path}: {message}")]
    ConfigWrite { path: String, message: String },

    #[error("terminal read failed: {0}")]
    RelayIo(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{command} failed: {message}")]
    Collaborator { command: String, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl InstallError {
    pub fn config_write(path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        Self::ConfigWrite {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    /// Whether the error was caused by the caller rather than the host.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidRequest(_))
    }
}
