//! Error types for sshexec.

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

/// Main error type for sshexec operations.
///
/// A non-zero remote exit status is never an error; it is reported inside a
/// successful [`ExecutionResult`](crate::ExecutionResult).
#[derive(Error, Debug)]
pub enum Error {
    /// Missing, malformed or rejected credentials
    #[error("Authentication error: {0}")]
    Authentication(#[from] AuthError),

    /// Session or channel establishment failures
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// I/O failure while draining remote output
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// SSH protocol failure outside of the classified steps
    #[error("Unexpected SSH failure: {0}")]
    Ssh(#[from] russh::Error),

    /// Any other propagated fault
    #[error("Unexpected failure: {0}")]
    Unexpected(String),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Authentication,
    Connection,
    Stream,
    Unexpected,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Authentication(_) => ErrorKind::Authentication,
            Error::Connection(_) => ErrorKind::Connection,
            Error::Stream(_) => ErrorKind::Stream,
            Error::Ssh(_) | Error::Unexpected(_) => ErrorKind::Unexpected,
        }
    }
}

/// Credential errors (key loading, authentication rejection).
#[derive(Error, Debug)]
pub enum AuthError {
    /// Private key file does not exist
    #[error("Private key not found at {}", path.display())]
    KeyMissing { path: std::path::PathBuf },

    /// Private key could not be parsed or decrypted
    #[error("Invalid private key ({origin}): {reason}")]
    KeyInvalid { origin: String, reason: String },

    /// Default key location could not be resolved
    #[error("Cannot resolve default key: no home directory")]
    NoHomeDirectory,

    /// Server rejected the key
    #[error("Authentication rejected for user '{user}'")]
    Rejected { user: String },
}

/// Transport and channel establishment errors.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Failed to connect or complete the SSH handshake
    #[error("Connection failed to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: russh::Error,
    },

    /// Transport setup timed out
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    /// Host key is not in known_hosts
    #[error("Host key for {host}:{port} is not in known_hosts")]
    HostKeyUnknown { host: String, port: u16 },

    /// Host key does not match the known_hosts entry
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// known_hosts could not be read
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Failed to open a session channel
    #[error("Failed to open channel: {0}")]
    ChannelOpen(#[source] russh::Error),

    /// PTY allocation request failed
    #[error("Failed to request PTY: {0}")]
    PtyRequest(#[source] russh::Error),

    /// Exec request failed
    #[error("Failed to start command: {0}")]
    ExecRequest(#[source] russh::Error),
}

/// Which remote output stream an operation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdout => f.write_str("stdout"),
            StreamKind::Stderr => f.write_str("stderr"),
        }
    }
}

/// Errors raised while draining remote output.
#[derive(Error, Debug)]
pub enum StreamError {
    /// Reading from a stream failed
    #[error("Failed reading {stream}: {source}")]
    Read {
        stream: StreamKind,
        #[source]
        source: io::Error,
    },
}

/// Result type alias using sshexec's Error.
pub type Result<T> = std::result::Result<T, Error>;
