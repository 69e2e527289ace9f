//! SSH connection configuration.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use russh::keys::{PrivateKey, decode_secret_key, load_secret_key};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::AuthError;

/// Host key verification policy, analogous to OpenSSH's `StrictHostKeyChecking`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyPolicy {
    /// The host key must already be present in known_hosts and match.
    #[default]
    Verify,

    /// Accept any host key without checking. Connections are open to
    /// man-in-the-middle attacks; every connection logs a warning.
    Insecure,
}

/// Transport-level configuration shared by every invocation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// SSH port (default: 22).
    pub port: u16,

    /// Upper bound on TCP connect plus handshake. Command execution itself
    /// is not bounded.
    pub connect_timeout: Duration,

    /// Host key verification policy.
    pub host_key_policy: HostKeyPolicy,

    /// Path to known_hosts file. `None` uses `~/.ssh/known_hosts`.
    pub known_hosts_path: Option<PathBuf>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            port: 22,
            connect_timeout: Duration::from_secs(30),
            host_key_policy: HostKeyPolicy::Verify,
            known_hosts_path: None,
        }
    }
}

/// Remote endpoint of a single invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub user: String,
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(user: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
            port,
        }
    }

    /// Get the socket address for connection.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

/// Private key source used for public key authentication.
#[derive(Debug)]
pub enum Credential {
    /// Key stored in a file.
    KeyFile {
        /// Path to the private key file.
        path: PathBuf,
        /// Optional passphrase for encrypted keys.
        passphrase: Option<SecretString>,
    },

    /// Key material held in memory (OpenSSH or PEM encoded).
    KeyData {
        pem: SecretString,
        passphrase: Option<SecretString>,
    },
}

impl Credential {
    /// Unencrypted key file at `path`.
    pub fn key_file(path: impl Into<PathBuf>) -> Self {
        Credential::KeyFile {
            path: path.into(),
            passphrase: None,
        }
    }

    /// Unencrypted in-memory key.
    pub fn key_data(pem: impl Into<String>) -> Self {
        Credential::KeyData {
            pem: SecretString::from(pem.into()),
            passphrase: None,
        }
    }

    /// The conventional `~/.ssh/id_rsa` of the invoking user.
    pub fn default_key_file() -> Result<Self, AuthError> {
        let home = dirs::home_dir().ok_or(AuthError::NoHomeDirectory)?;
        Ok(Self::key_file(home.join(".ssh").join("id_rsa")))
    }

    /// Attach a passphrase for an encrypted key.
    pub fn with_passphrase(mut self, value: impl Into<String>) -> Self {
        let secret = Some(SecretString::from(value.into()));
        match &mut self {
            Credential::KeyFile { passphrase, .. } | Credential::KeyData { passphrase, .. } => {
                *passphrase = secret;
            }
        }
        self
    }

    /// Key file path, if this credential is file-backed.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Credential::KeyFile { path, .. } => Some(path),
            Credential::KeyData { .. } => None,
        }
    }

    /// Read and decode the private key.
    pub fn load(&self) -> Result<PrivateKey, AuthError> {
        match self {
            Credential::KeyFile { path, passphrase } => {
                if !path.is_file() {
                    return Err(AuthError::KeyMissing { path: path.clone() });
                }
                load_secret_key(path, passphrase.as_ref().map(|p| p.expose_secret())).map_err(
                    |e| AuthError::KeyInvalid {
                        origin: path.display().to_string(),
                        reason: e.to_string(),
                    },
                )
            }
            Credential::KeyData { pem, passphrase } => decode_secret_key(
                pem.expose_secret(),
                passphrase.as_ref().map(|p| p.expose_secret()),
            )
            .map_err(|e| AuthError::KeyInvalid {
                origin: "in-memory key".to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Pseudo-terminal parameters requested for the remote command.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PtyConfig {
    /// Value of `TERM` on the remote side.
    pub term: String,

    /// Terminal width in columns.
    pub width: u32,

    /// Terminal height in rows.
    pub height: u32,
}

impl Default for PtyConfig {
    fn default() -> Self {
        Self {
            term: "xterm".to_string(),
            width: 80,
            height: 24,
        }
    }
}
