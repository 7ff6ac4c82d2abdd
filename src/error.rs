//! error types for vmsh

use thiserror::Error;

use crate::vbox::SessionState;

/// failures reported by the management service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("invalid object state: {0}")]
    InvalidState(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("call failed (rc={code:#010x}): {message}")]
    Failed { code: u32, message: String },

    #[error("service unavailable: {0}")]
    Unavailable(String),
}

/// failures of the unsafe scripting interface
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("failed to spawn script: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("script exited with status {status}: {stderr}")]
    Exit { status: i32, stderr: String },

    #[error("script rejected: {0}")]
    Rejected(String),
}

#[derive(Error, Debug)]
pub enum ShellError {
    #[error("usage: {0}")]
    Usage(String),

    #[error("Machine '{0}' is unknown, use list command to find available machines")]
    MachineNotFound(String),

    #[error("Session to '{machine}' not open: {source}")]
    SessionNotOpen {
        machine: String,
        #[source]
        source: ApiError,
    },

    #[error("Session to '{machine}' in wrong state: {state}")]
    SessionState { machine: String, state: SessionState },

    #[error("'{0}' is not available over this binding")]
    LocalOnly(&'static str),

    #[error("failed: {0}")]
    Api(#[from] ApiError),

    #[error("failed: {0}")]
    Script(#[from] ScriptError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ShellError>;

/// result of a call into the management service
pub type ApiResult<T> = std::result::Result<T, ApiError>;
