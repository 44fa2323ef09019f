//! Crate-level error type, mapping every category in the error handling
//! design onto the wire error-name vocabulary clients see at the boundary.

use std::sync::Arc;

/// Well-known `org.freedesktop.DBus.Error.*` names this crate can raise
/// locally (as opposed to ones relayed verbatim from a remote ERROR
/// message, which travel in [`Error::MethodError`]).
pub mod error_name {
    pub const FAILED: &str = "org.freedesktop.DBus.Error.Failed";
    pub const NO_MEMORY: &str = "org.freedesktop.DBus.Error.NoMemory";
    pub const SERVICE_UNKNOWN: &str = "org.freedesktop.DBus.Error.ServiceUnknown";
    pub const NO_REPLY: &str = "org.freedesktop.DBus.Error.NoReply";
    pub const BAD_ADDRESS: &str = "org.freedesktop.DBus.Error.BadAddress";
    pub const UNKNOWN_METHOD: &str = "org.freedesktop.DBus.Error.UnknownMethod";
    pub const UNKNOWN_INTERFACE: &str = "org.freedesktop.DBus.Error.UnknownInterface";
    pub const UNKNOWN_PROPERTY: &str = "org.freedesktop.DBus.Error.UnknownProperty";
    pub const PROPERTY_READ_ONLY: &str = "org.freedesktop.DBus.Error.PropertyReadOnly";
    pub const ACCESS_DENIED: &str = "org.freedesktop.DBus.Error.AccessDenied";
    pub const INVALID_ARGS: &str = "org.freedesktop.DBus.Error.InvalidArgs";
    pub const DISCONNECTED: &str = "org.freedesktop.DBus.Error.Disconnected";
    pub const TIMEOUT: &str = "org.freedesktop.DBus.Error.Timeout";
    pub const AUTH_FAILED: &str = "org.freedesktop.DBus.Error.AuthFailed";
    pub const INCONSISTENT_MESSAGE: &str = "org.freedesktop.DBus.Error.InconsistentMessage";
    pub const INTERACTIVE_AUTHORIZATION_REQUIRED: &str =
        "org.freedesktop.DBus.Error.InteractiveAuthorizationRequired";
    pub const LIMITS_EXCEEDED: &str = "org.freedesktop.DBus.Error.LimitsExceeded";
    pub const MATCH_RULE_INVALID: &str = "org.freedesktop.DBus.Error.MatchRuleInvalid";
    pub const FILE_EXISTS: &str = "org.freedesktop.DBus.Error.FileExists";
    pub const FILE_NOT_FOUND: &str = "org.freedesktop.DBus.Error.FileNotFound";
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Transport category: connect-refused, EOF, write-failed.
    #[error("connection lost: {0}")]
    Disconnected(String),

    /// Protocol-fatal category: the connection must be torn down.
    #[error("inconsistent message: {0}")]
    InconsistentMessage(String),

    /// Codec category: the connection survives, this one message failed.
    #[error(transparent)]
    Codec(#[from] ipcbus_types::Error),

    #[error(transparent)]
    Names(#[from] ipcbus_names::Error),

    /// Auth category: terminal SASL outcome that never reached `OK BEGIN`.
    #[error("SASL authentication failed: {0}")]
    AuthFailed(String),

    /// Call category: remote returned an ERROR message.
    #[error("method call failed: {name}: {message}")]
    MethodError {
        name: ipcbus_names::OwnedErrorName,
        message: Option<String>,
    },

    /// Call category: no reply arrived before the call's deadline.
    #[error("method call timed out")]
    Timeout,

    /// Argument category: raised synchronously, no wire traffic involved.
    #[error("invalid argument: {0}")]
    InvalidArgs(String),

    #[error("malformed D-Bus address: {0}")]
    BadAddress(String),

    #[error("duplicate handler name in pipeline: {0}")]
    DuplicateHandlerName(String),

    #[error("no handler named {0} in pipeline")]
    NoSuchHandler(String),

    #[error(transparent)]
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(Arc::new(e))
    }
}

impl Error {
    /// The wire error name this error would be reported as, if it crossed
    /// the boundary as a METHOD_RETURN-less ERROR message.
    pub fn wire_name(&self) -> &str {
        match self {
            Error::Disconnected(_) | Error::Io(_) => error_name::DISCONNECTED,
            Error::InconsistentMessage(_) => error_name::INCONSISTENT_MESSAGE,
            Error::AuthFailed(_) => error_name::AUTH_FAILED,
            Error::MethodError { name, .. } => name.as_str(),
            Error::Timeout => error_name::NO_REPLY,
            Error::InvalidArgs(_) => error_name::INVALID_ARGS,
            Error::BadAddress(_) => error_name::BAD_ADDRESS,
            Error::Codec(_) => error_name::INVALID_ARGS,
            Error::Names(_) => error_name::INVALID_ARGS,
            Error::DuplicateHandlerName(_) | Error::NoSuchHandler(_) => error_name::FAILED,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
