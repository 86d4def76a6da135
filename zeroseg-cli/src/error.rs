//! CLI-specific error types and exit code mapping

use zeroseg_core::error::{EnforceError, PolicyError, ResolveError, ZerosegError};

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to standard Unix exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// Policy document failed to load or validate.
    #[error("{0}")]
    Policy(#[from] PolicyError),

    /// Inventory loading failed (label resolution setup).
    #[error("resolver error: {0}")]
    Resolve(#[from] ResolveError),

    /// Enforcement did not take effect.
    #[error("enforcement error: {0}")]
    Enforce(#[from] EnforceError),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                         |
    /// |------|---------------------------------|
    /// | 0    | Success                         |
    /// | 1    | Enforcement / general error     |
    /// | 2    | Configuration / resolver error  |
    /// | 3    | Policy validation error         |
    /// | 10   | IO error                        |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Resolve(_) => 2,
            Self::Policy(_) => 3,
            Self::Io(_) => 10,
            Self::Enforce(_) => 1,
        }
    }
}

impl From<ZerosegError> for CliError {
    fn from(e: ZerosegError) -> Self {
        match e {
            ZerosegError::Config(e) => Self::Config(e.to_string()),
            ZerosegError::Policy(e) => Self::Policy(e),
            ZerosegError::Resolve(e) => Self::Resolve(e),
            ZerosegError::Enforce(e) => Self::Enforce(e),
            ZerosegError::Io(e) => Self::Io(e),
        }
    }
}
