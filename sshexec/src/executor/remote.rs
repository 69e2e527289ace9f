//! One-shot remote command execution.

use std::fmt;
use std::sync::Arc;

use log::{debug, warn};

use super::builder::ExecutorBuilder;
use super::result::ExecutionResult;
use crate::channel::drain_lines;
use crate::error::{Result, StreamKind};
use crate::transport::{
    Connector, Credential, Endpoint, ExecChannel, PtyConfig, Session, SshConnector,
};

/// Lifecycle of a single invocation. No stage is revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Connecting,
    Authenticated,
    ChannelOpen,
    Executing,
    Draining,
    Closed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Connecting => "connecting",
            Stage::Authenticated => "authenticated",
            Stage::ChannelOpen => "channel open",
            Stage::Executing => "executing",
            Stage::Draining => "draining",
            Stage::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Runs one command per call over a fresh SSH session.
///
/// Every call performs exactly one connect / execute / disconnect cycle and
/// shares nothing with other calls, so one executor can serve concurrent
/// invocations.
#[derive(Debug)]
pub struct RemoteExecutor<C = SshConnector> {
    connector: C,
    credential: Credential,
    port: u16,
    pty: Option<PtyConfig>,
}

impl RemoteExecutor<SshConnector> {
    /// Start building an executor.
    pub fn builder() -> ExecutorBuilder {
        ExecutorBuilder::new()
    }
}

impl<C: Connector> RemoteExecutor<C> {
    pub(crate) fn from_parts(
        connector: C,
        credential: Credential,
        port: u16,
        pty: Option<PtyConfig>,
    ) -> Self {
        Self {
            connector,
            credential,
            port,
            pty,
        }
    }

    /// Get the transport connector.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Get the credential used for authentication.
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Port used for every invocation.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// PTY parameters, or `None` when commands run without a PTY.
    pub fn pty(&self) -> Option<&PtyConfig> {
        self.pty.as_ref()
    }

    /// Run `command` as `user` on `host` and capture its output.
    ///
    /// The command string is passed to the remote shell verbatim. The channel
    /// and the session are released on every path once acquired, channel
    /// first; a release failure is logged and never replaces the primary
    /// error.
    pub async fn execute(&self, user: &str, host: &str, command: &str) -> Result<ExecutionResult> {
        let endpoint = Endpoint::new(user, host, self.port);

        let key = Arc::new(self.credential.load()?);

        debug!("{}: {}", endpoint, Stage::Connecting);
        let mut session = self.connector.connect(&endpoint).await?;

        let outcome = self
            .run_session(&mut session, &endpoint, key, command)
            .await;

        if let Err(e) = session.disconnect().await {
            warn!("{}: failed to disconnect session: {}", endpoint, e);
        }

        match &outcome {
            Ok(result) => debug!("{}: done, status {}", endpoint, result.status()),
            Err(e) => debug!("{}: failed: {}", endpoint, e),
        }
        outcome
    }

    async fn run_session(
        &self,
        session: &mut C::Session,
        endpoint: &Endpoint,
        key: Arc<russh::keys::PrivateKey>,
        command: &str,
    ) -> Result<ExecutionResult> {
        session.authenticate(&endpoint.user, key).await?;
        debug!("{}: {}", endpoint, Stage::Authenticated);

        let mut channel = session.open_channel().await?;
        debug!("{}: {}", endpoint, Stage::ChannelOpen);

        let outcome = self.run_channel(&mut channel, endpoint, command).await;

        if let Err(e) = channel.disconnect().await {
            warn!("{}: failed to release channel: {}", endpoint, e);
        }
        outcome
    }

    async fn run_channel(
        &self,
        channel: &mut <C::Session as Session>::Channel,
        endpoint: &Endpoint,
        command: &str,
    ) -> Result<ExecutionResult> {
        if let Some(pty) = &self.pty {
            channel.request_pty(pty).await?;
        }

        let streams = channel.exec(command).await?;
        debug!("{}: {}: {:?}", endpoint, Stage::Executing, command);

        debug!("{}: {}", endpoint, Stage::Draining);
        let (stdout, stderr) = tokio::try_join!(
            drain_lines(streams.stdout, StreamKind::Stdout),
            drain_lines(streams.stderr, StreamKind::Stderr),
        )?;

        let report = streams.completion.wait().await;
        if !report.closed {
            warn!(
                "{}: channel never reported closed, exit status unknown",
                endpoint
            );
        }
        debug!("{}: {} ({:?})", endpoint, Stage::Closed, report);

        Ok(ExecutionResult::from_report(report, stdout, stderr))
    }
}
