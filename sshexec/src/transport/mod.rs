//! SSH transport layer.
//!
//! The executor drives a transport through three traits, mirroring the
//! lifetime of one invocation: a [`Connector`] opens a [`Session`], the
//! session opens an [`ExecChannel`], and the channel runs the command.
//! [`SshConnector`] implements them on top of russh; other implementations
//! (for example a scripted fake in tests) can be plugged into
//! [`RemoteExecutor`](crate::RemoteExecutor).

pub mod config;
mod ssh;

use std::future::Future;
use std::sync::Arc;

use russh::keys::PrivateKey;

use crate::channel::ExecStreams;
use crate::error::Result;

pub use config::{Credential, Endpoint, HostKeyPolicy, PtyConfig, SshConfig};
pub use ssh::{SshChannel, SshConnector, SshSession};

/// Opens transport sessions.
pub trait Connector: Send + Sync {
    type Session: Session;

    /// Connect to the endpoint and complete the handshake (no authentication).
    fn connect(&self, endpoint: &Endpoint) -> impl Future<Output = Result<Self::Session>> + Send;
}

/// An open transport connection.
pub trait Session: Send {
    type Channel: ExecChannel;

    /// Authenticate with a private key.
    fn authenticate(
        &mut self,
        user: &str,
        key: Arc<PrivateKey>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Open a session channel for command execution.
    fn open_channel(&mut self) -> impl Future<Output = Result<Self::Channel>> + Send;

    /// Tear the connection down.
    fn disconnect(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// A channel that runs exactly one command.
pub trait ExecChannel: Send {
    /// Attach a pseudo-terminal. Must precede [`exec`](Self::exec).
    fn request_pty(&mut self, pty: &PtyConfig) -> impl Future<Output = Result<()>> + Send;

    /// Start `command` and hand back its output streams.
    fn exec(&mut self, command: &str) -> impl Future<Output = Result<ExecStreams>> + Send;

    /// Release the channel.
    fn disconnect(&mut self) -> impl Future<Output = Result<()>> + Send;
}
