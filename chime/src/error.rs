use thiserror::Error;

/// Errors surfaced at the core boundary.
///
/// None of these are fatal to the process: the core logs them and hands them back
/// to the caller so it can decide whether to retry.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("application '{0}' is already registered")]
    ApplicationAlreadyRegistered(String),

    #[error("application '{0}' is not registered")]
    ApplicationNotRegistered(String),

    #[error("no primary notification backend is active")]
    NoPrimaryBackend,

    #[error("no backend named '{0}' is loaded")]
    UnknownBackend(String),

    #[error("backend '{name}' is unusable: {source}")]
    BackendUnusable {
        name: String,
        #[source]
        source: BackendError,
    },

    #[error("the notification core has shut down")]
    ShutDown,

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// Errors reported by backend plugins.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The backend cannot work at all (missing service, lost connection).
    /// Reporting this deselects the backend.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// A single notification could not be delivered.
    #[error("delivery failed: {0}")]
    Delivery(String),
}

impl BackendError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

#[derive(Debug, Error)]
pub enum IconError {
    #[error("failed to read icon: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode icon: {0}")]
    Decode(#[from] image::ImageError),

    #[error("failed to fetch icon: {0}")]
    Fetch(String),
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
