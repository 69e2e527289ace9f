//! Remote command execution.
//!
//! [`RemoteExecutor`] orchestrates a single invocation over the transport
//! traits: connect, authenticate, open a channel, attach a PTY, start the
//! command, drain both output streams concurrently, collect the exit status
//! and release everything.

mod builder;
mod remote;
mod result;

pub use builder::ExecutorBuilder;
pub use remote::RemoteExecutor;
pub use result::ExecutionResult;
