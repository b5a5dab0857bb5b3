use thiserror::Error;

/// Faults reported by the connection collaborator.
///
/// These cover the transport's own lifecycle (connect, stream, send). They
/// are never retried by the session layer; callers see them wrapped in
/// [`SessionError::Transport`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    #[error("not connected")]
    NotConnected,

    #[error("response timeout")]
    Timeout,

    #[error("stream error: {0}")]
    Stream(String),
}

/// Authentication failures reported by the transport during login.
///
/// Login has a soft contract: these are logged and turned into a boolean
/// failure rather than propagated as session errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("authentication failed: {0}")]
    Failure(String),
}

/// The stable domain error taxonomy.
///
/// Every protocol-shaped fault the underlying transport or server can report
/// is mapped into one of these before it reaches a caller. The set is
/// transport-independent by design: callers branch on variants, never on
/// wire-level conditions.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Connect or send failed at the transport level. Surfaced, not retried.
    #[error("transport fault: {0}")]
    Transport(#[from] TransportError),

    /// The server reported that the account already exists. This is an
    /// expected business outcome of registration, not an operational fault.
    #[error("account already exists")]
    AccountConflict,

    /// Any other server-reported error condition, carrying the server's
    /// message where one was provided.
    #[error("server fault: {0}")]
    ServerFault(String),

    /// The server advertises no user-search capability. Distinct from an
    /// empty directory, which is an `Ok` result with no rows.
    #[error("no user search service advertised by the server")]
    NoSearchServiceFound,

    /// A structured response did not have the expected shape.
    #[error("malformed server response: {0}")]
    MalformedResponse(String),

    /// Strict gate policy only: a privileged operation was invoked while
    /// logged out.
    #[error("operation requires an authenticated session")]
    NotAuthenticated,

    /// Strict gate policy only: an operation that must run logged out was
    /// invoked while authenticated.
    #[error("operation requires a logged-out session")]
    AlreadyAuthenticated,
}

/// A specialized Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
