//! Builder for creating remote executors.

use std::path::PathBuf;
use std::time::Duration;

use super::remote::RemoteExecutor;
use crate::error::Result;
use crate::transport::{
    Connector, Credential, HostKeyPolicy, PtyConfig, SshConfig, SshConnector,
};

/// Builder for constructing a [`RemoteExecutor`].
///
/// Defaults: port 22, key at `~/.ssh/id_rsa`, host keys verified against
/// `~/.ssh/known_hosts`, a PTY attached to every command.
///
/// # Example
///
/// ```rust,no_run
/// use sshexec::{HostKeyPolicy, RemoteExecutor};
///
/// # async fn example() -> Result<(), sshexec::Error> {
/// let executor = RemoteExecutor::builder()
///     .port(2222)
///     .private_key("/etc/deploy/id_ed25519")
///     .host_key_policy(HostKeyPolicy::Verify)
///     .build()?;
///
/// let result = executor.execute("deploy", "build-01", "uptime").await?;
/// println!("{}", result);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ExecutorBuilder {
    ssh: SshConfig,
    credential: Option<Credential>,
    pty: Option<PtyConfig>,
}

impl Default for ExecutorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutorBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self {
            ssh: SshConfig::default(),
            credential: None,
            pty: Some(PtyConfig::default()),
        }
    }

    /// Replace the whole transport configuration.
    pub fn ssh_config(mut self, config: SshConfig) -> Self {
        self.ssh = config;
        self
    }

    /// Set the SSH port (default: 22).
    pub fn port(mut self, port: u16) -> Self {
        self.ssh.port = port;
        self
    }

    /// Set the credential used for authentication.
    pub fn credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Authenticate with the private key at `key_path`.
    pub fn private_key(self, key_path: impl Into<PathBuf>) -> Self {
        self.credential(Credential::key_file(key_path))
    }

    /// Authenticate with an encrypted private key.
    pub fn private_key_with_passphrase(
        self,
        key_path: impl Into<PathBuf>,
        passphrase: impl Into<String>,
    ) -> Self {
        self.credential(Credential::key_file(key_path).with_passphrase(passphrase))
    }

    /// Authenticate with in-memory key material.
    pub fn private_key_data(self, pem: impl Into<String>) -> Self {
        self.credential(Credential::key_data(pem))
    }

    /// Set the host key policy (default: [`HostKeyPolicy::Verify`]).
    pub fn host_key_policy(mut self, policy: HostKeyPolicy) -> Self {
        self.ssh.host_key_policy = policy;
        self
    }

    /// Accept any host key. Shorthand for `host_key_policy(HostKeyPolicy::Insecure)`.
    pub fn insecure_skip_host_key_check(self) -> Self {
        self.host_key_policy(HostKeyPolicy::Insecure)
    }

    /// Use a specific known_hosts file.
    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ssh.known_hosts_path = Some(path.into());
        self
    }

    /// Set the transport establishment timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.ssh.connect_timeout = timeout;
        self
    }

    /// Set PTY parameters.
    pub fn pty(mut self, pty: PtyConfig) -> Self {
        self.pty = Some(pty);
        self
    }

    /// Run commands without a PTY, keeping stderr separate from stdout.
    pub fn no_pty(mut self) -> Self {
        self.pty = None;
        self
    }

    /// Build an executor backed by russh.
    pub fn build(self) -> Result<RemoteExecutor<SshConnector>> {
        let connector = SshConnector::new(self.ssh.clone());
        self.build_with(connector)
    }

    /// Build an executor over a custom transport.
    ///
    /// Only the port is taken from the SSH settings; host key handling is up
    /// to the connector.
    pub fn build_with<C: Connector>(self, connector: C) -> Result<RemoteExecutor<C>> {
        let credential = match self.credential {
            Some(credential) => credential,
            None => Credential::default_key_file()?,
        };

        Ok(RemoteExecutor::from_parts(
            connector,
            credential,
            self.ssh.port,
            self.pty,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_settings_reach_connector() {
        let executor = ExecutorBuilder::new()
            .port(2222)
            .private_key("/tmp/id_ed25519")
            .insecure_skip_host_key_check()
            .known_hosts_path("/tmp/known_hosts")
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap();

        let config = executor.connector().config();
        assert_eq!(config.port, 2222);
        assert_eq!(config.host_key_policy, HostKeyPolicy::Insecure);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(
            config.known_hosts_path.as_deref(),
            Some(std::path::Path::new("/tmp/known_hosts"))
        );
        assert_eq!(executor.port(), 2222);
        assert_eq!(
            executor.credential().path(),
            Some(std::path::Path::new("/tmp/id_ed25519"))
        );
    }

    #[test]
    fn test_builder_defaults() {
        let executor = ExecutorBuilder::new()
            .private_key("/tmp/id_rsa")
            .build()
            .unwrap();
        assert_eq!(executor.port(), 22);
        assert_eq!(
            executor.connector().config().host_key_policy,
            HostKeyPolicy::Verify
        );
        assert_eq!(executor.pty(), Some(&PtyConfig::default()));
    }

    #[test]
    fn test_no_pty() {
        let executor = ExecutorBuilder::new()
            .private_key("/tmp/id_rsa")
            .no_pty()
            .build()
            .unwrap();
        assert!(executor.pty().is_none());
    }
}
