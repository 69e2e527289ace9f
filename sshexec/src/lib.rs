//! # sshexec
//!
//! Async one-shot remote command execution over SSH.
//!
//! Each call opens an authenticated session, runs one command on an exec
//! channel (with a pseudo-terminal by default), drains stdout and stderr
//! concurrently, and returns the exit status alongside both captured streams.
//! Nothing is pooled or reused between calls.
//!
//! ## Features
//!
//! - Async SSH connections via russh
//! - Private key authentication from a file or from memory
//! - Explicit host key policy, verifying against known_hosts by default
//! - Deadlock-free capture of large output on both streams
//! - Channel and session released on every exit path
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sshexec::RemoteExecutor;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), sshexec::Error> {
//!     let executor = RemoteExecutor::builder()
//!         .private_key("/home/deploy/.ssh/id_ed25519")
//!         .build()?;
//!
//!     let result = executor.execute("deploy", "192.168.1.1", "uname -a").await?;
//!     println!("exit {}: {}", result.status(), result.stdout());
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod error;
pub mod executor;
pub mod transport;

// Re-export main types for convenience
pub use error::{AuthError, ConnectionError, Error, ErrorKind, StreamError, StreamKind};
pub use executor::{ExecutionResult, ExecutorBuilder, RemoteExecutor};
pub use transport::{Credential, HostKeyPolicy, PtyConfig, SshConfig};

/// Run `command` as `user` on `host` with default settings.
///
/// Uses `~/.ssh/id_rsa`, port 22, a PTY, and verifies the host key against
/// `~/.ssh/known_hosts`.
pub async fn execute(user: &str, host: &str, command: &str) -> error::Result<ExecutionResult> {
    RemoteExecutor::builder()
        .build()?
        .execute(user, host, command)
        .await
}
