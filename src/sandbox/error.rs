use thiserror::Error;

/// Failures the engine reports to its caller.
///
/// Compile errors, timeouts, runtime faults and programs blocked on input are
/// normal outcomes of running user code and live in the outcome types instead.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Missing, empty or rejected request field. No subprocess was spawned.
    #[error("{0}")]
    InvalidInput(String),

    /// The isolated runtime could not be created.
    #[error("environment unavailable: {0}")]
    EnvironmentUnavailable(String),

    /// Both install attempts failed; carries the diagnostic of the second one.
    #[error("Failed to install {package}")]
    InstallFailed { package: String, diagnostic: String },

    #[error("Package installation timed out for {package}")]
    InstallTimedOut { package: String },

    #[error("Failed to list packages")]
    ListFailed { diagnostic: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Whether the failure was caused by the request rather than the host.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}
