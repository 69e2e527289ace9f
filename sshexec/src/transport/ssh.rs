//! SSH transport implementation using russh.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use log::{debug, trace, warn};
use russh::client::{self, Handle, Msg};
use russh::keys::known_hosts::{check_known_hosts, check_known_hosts_path};
use russh::keys::{PrivateKey, PrivateKeyWithHashAlg, PublicKey};
use russh::{Channel, ChannelMsg, Disconnect, Sig};

use super::config::{Endpoint, HostKeyPolicy, PtyConfig, SshConfig};
use super::{Connector, ExecChannel, Session};
use crate::channel::{ChannelEvent, EventSource, ExecStreams, PumpHandle, spawn_pump};
use crate::error::{AuthError, ConnectionError, Error, Result};

/// Opens russh sessions according to an [`SshConfig`].
#[derive(Debug, Clone, Default)]
pub struct SshConnector {
    config: SshConfig,
}

impl SshConnector {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &SshConfig {
        &self.config
    }
}

impl Connector for SshConnector {
    type Session = SshSession;

    async fn connect(&self, endpoint: &Endpoint) -> Result<SshSession> {
        if self.config.host_key_policy == HostKeyPolicy::Insecure {
            warn!(
                "{}: host key verification is disabled, accepting any server key",
                endpoint
            );
        }

        let host_key_error: Arc<Mutex<Option<ConnectionError>>> = Arc::new(Mutex::new(None));

        let handler = HostKeyHandler {
            host: endpoint.host.clone(),
            port: endpoint.port,
            policy: self.config.host_key_policy,
            known_hosts_path: self.config.known_hosts_path.clone(),
            host_key_error: host_key_error.clone(),
        };

        let timeout = self.config.connect_timeout;
        let handle = tokio::time::timeout(
            timeout,
            client::connect(
                Arc::new(client::Config::default()),
                (endpoint.host.as_str(), endpoint.port),
                handler,
            ),
        )
        .await
        .map_err(|_| ConnectionError::Timeout(timeout))?
        .map_err(|source| {
            // A rejected host key surfaces from russh as a generic error;
            // prefer the detailed one recorded by the handler.
            take_error(&host_key_error).unwrap_or_else(|| ConnectionError::Connect {
                host: endpoint.host.clone(),
                port: endpoint.port,
                source,
            })
        })?;

        debug!("{}: transport established", endpoint);

        Ok(SshSession {
            handle,
            endpoint: endpoint.clone(),
            connected: true,
        })
    }
}

fn take_error(slot: &Mutex<Option<ConnectionError>>) -> Option<ConnectionError> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

/// An open russh connection.
pub struct SshSession {
    handle: Handle<HostKeyHandler>,
    endpoint: Endpoint,
    connected: bool,
}

impl std::fmt::Debug for SshSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshSession")
            .field("endpoint", &self.endpoint)
            .field("handle", &"<russh::Handle>")
            .field("connected", &self.connected)
            .finish()
    }
}

impl Session for SshSession {
    type Channel = SshChannel;

    async fn authenticate(&mut self, user: &str, key: Arc<PrivateKey>) -> Result<()> {
        // Get the best RSA hash algorithm supported by the server
        let hash_alg = self
            .handle
            .best_supported_rsa_hash()
            .await
            .map_err(|e| self.transport_error(e))?
            .flatten();

        let auth = self
            .handle
            .authenticate_publickey(user, PrivateKeyWithHashAlg::new(key, hash_alg))
            .await
            .map_err(|e| self.transport_error(e))?;

        if !auth.success() {
            return Err(AuthError::Rejected {
                user: user.to_string(),
            }
            .into());
        }

        debug!("{}: authenticated", self.endpoint);
        Ok(())
    }

    async fn open_channel(&mut self) -> Result<SshChannel> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(ConnectionError::ChannelOpen)?;

        trace!("{}: channel {:?} open", self.endpoint, channel.id());
        Ok(SshChannel {
            channel: Some(channel),
            backlog: VecDeque::new(),
            pump: None,
        })
    }

    async fn disconnect(&mut self) -> Result<()> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;

        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await?;
        debug!("{}: disconnected", self.endpoint);
        Ok(())
    }
}

impl SshSession {
    /// A transport failure after the handshake, still during session setup.
    fn transport_error(&self, source: russh::Error) -> ConnectionError {
        ConnectionError::Connect {
            host: self.endpoint.host.clone(),
            port: self.endpoint.port,
            source,
        }
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        if self.connected {
            warn!("{}: session dropped without disconnect", self.endpoint);
        }
    }
}

/// A russh session channel running one command.
///
/// Before `exec` the channel is held directly; afterwards it is owned by the
/// pump task that splits its output. Messages that arrive while a request
/// reply is awaited are kept in `backlog` and handed to the pump first.
pub struct SshChannel {
    channel: Option<Channel<Msg>>,
    backlog: VecDeque<ChannelMsg>,
    pump: Option<PumpHandle>,
}

impl std::fmt::Debug for SshChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshChannel")
            .field("started", &self.pump.is_some())
            .finish()
    }
}

impl ExecChannel for SshChannel {
    async fn request_pty(&mut self, pty: &PtyConfig) -> Result<()> {
        let channel = self
            .channel
            .as_mut()
            .ok_or_else(|| Error::Unexpected("PTY requested after command start".to_string()))?;

        channel
            .request_pty(true, &pty.term, pty.width, pty.height, 0, 0, &[])
            .await
            .map_err(ConnectionError::PtyRequest)?;
        await_reply(channel, &mut self.backlog)
            .await
            .map_err(ConnectionError::PtyRequest)?;
        Ok(())
    }

    async fn exec(&mut self, command: &str) -> Result<ExecStreams> {
        let Some(channel) = self.channel.as_mut() else {
            return Err(Error::Unexpected(
                "command already started on this channel".to_string(),
            ));
        };

        channel
            .exec(true, command)
            .await
            .map_err(ConnectionError::ExecRequest)?;
        await_reply(channel, &mut self.backlog)
            .await
            .map_err(ConnectionError::ExecRequest)?;

        let Some(channel) = self.channel.take() else {
            return Err(Error::Unexpected("channel lost before command start".to_string()));
        };
        let (streams, pump) = spawn_pump(RusshEvents::new(
            channel,
            std::mem::take(&mut self.backlog),
        ));
        self.pump = Some(pump);
        Ok(streams)
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut pump) = self.pump.take() {
            pump.shutdown().await;
        }
        if let Some(channel) = self.channel.take() {
            channel.close().await?;
        }
        Ok(())
    }
}

/// Wait for the server's reply to a channel request sent with `want_reply`.
///
/// Anything else received meanwhile is queued on `backlog`.
async fn await_reply(
    channel: &mut Channel<Msg>,
    backlog: &mut VecDeque<ChannelMsg>,
) -> std::result::Result<(), russh::Error> {
    loop {
        match channel.wait().await {
            Some(ChannelMsg::Success) => return Ok(()),
            Some(ChannelMsg::Failure) => return Err(russh::Error::RequestDenied),
            Some(msg) => backlog.push_back(msg),
            None => return Err(russh::Error::Disconnect),
        }
    }
}

/// Adapts russh channel messages to [`ChannelEvent`]s.
///
/// russh drops a client channel's queue when the server closes it, without
/// delivering `Close`. The end of the queue therefore counts as a close once
/// the command has finished (EOF or an exit report was seen); before that it
/// means the session was lost.
struct RusshEvents {
    channel: Channel<Msg>,
    backlog: VecDeque<ChannelMsg>,
    finished: bool,
    ended: bool,
}

impl RusshEvents {
    fn new(channel: Channel<Msg>, backlog: VecDeque<ChannelMsg>) -> Self {
        Self {
            channel,
            backlog,
            finished: false,
            ended: false,
        }
    }

    fn end_of_queue(&mut self) -> Option<ChannelEvent> {
        if self.ended {
            return None;
        }
        self.ended = true;
        if self.finished {
            trace!("channel {:?} released by server", self.channel.id());
            Some(ChannelEvent::Close)
        } else {
            debug!("channel {:?} lost before the command finished", self.channel.id());
            None
        }
    }
}

impl EventSource for RusshEvents {
    async fn next_event(&mut self) -> Option<ChannelEvent> {
        loop {
            let msg = match self.backlog.pop_front() {
                Some(msg) => msg,
                None => match self.channel.wait().await {
                    Some(msg) => msg,
                    None => return self.end_of_queue(),
                },
            };
            let Some(event) = translate(msg) else {
                continue;
            };
            if matches!(
                event,
                ChannelEvent::Eof | ChannelEvent::ExitStatus(_) | ChannelEvent::ExitSignal(_)
            ) {
                self.finished = true;
            }
            if event == ChannelEvent::Close {
                self.ended = true;
            }
            return Some(event);
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.channel.close().await {
            trace!("channel close: {}", e);
        }
    }
}

/// Map one channel message to an event, or `None` if it is irrelevant here.
fn translate(msg: ChannelMsg) -> Option<ChannelEvent> {
    let event = match msg {
        ChannelMsg::Data { data } => ChannelEvent::Stdout(Bytes::copy_from_slice(&data[..])),
        ChannelMsg::ExtendedData { data, ext: 1 } => {
            ChannelEvent::Stderr(Bytes::copy_from_slice(&data[..]))
        }
        ChannelMsg::ExtendedData { ext, .. } => {
            trace!("ignoring extended data of type {}", ext);
            return None;
        }
        ChannelMsg::ExitStatus { exit_status } => ChannelEvent::ExitStatus(exit_status),
        ChannelMsg::ExitSignal { signal_name, .. } => {
            ChannelEvent::ExitSignal(signal(signal_name))
        }
        ChannelMsg::Eof => ChannelEvent::Eof,
        ChannelMsg::Close => ChannelEvent::Close,
        other => {
            trace!("ignoring channel message {:?}", other);
            return None;
        }
    };
    Some(event)
}

/// Signal name without the `SIG` prefix, as sent on the wire.
fn signal(sig: Sig) -> String {
    match sig {
        Sig::Custom(name) => name,
        known => format!("{:?}", known),
    }
}

/// SSH client handler enforcing the [`HostKeyPolicy`].
struct HostKeyHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
    known_hosts_path: Option<PathBuf>,
    /// Stores a detailed host-key error so connect() can surface it
    /// instead of the generic russh error.
    host_key_error: Arc<Mutex<Option<ConnectionError>>>,
}

impl HostKeyHandler {
    /// Check the host key against known_hosts.
    fn verify(&self, pubkey: &PublicKey) -> std::result::Result<(), ConnectionError> {
        let result = match &self.known_hosts_path {
            Some(path) => check_known_hosts_path(&self.host, self.port, pubkey, path),
            None => check_known_hosts(&self.host, self.port, pubkey),
        };

        match result {
            Ok(true) => Ok(()),
            Ok(false) => Err(ConnectionError::HostKeyUnknown {
                host: self.host.clone(),
                port: self.port,
            }),
            Err(russh::keys::Error::KeyChanged { line }) => Err(ConnectionError::HostKeyChanged {
                host: self.host.clone(),
                port: self.port,
                line,
            }),
            Err(e) => Err(ConnectionError::KnownHosts(e.to_string())),
        }
    }
}

impl client::Handler for HostKeyHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match self.policy {
            HostKeyPolicy::Insecure => Ok(true),
            HostKeyPolicy::Verify => match self.verify(server_public_key) {
                Ok(()) => Ok(true),
                Err(e) => {
                    debug!("rejecting host key: {}", e);
                    *self
                        .host_key_error
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner) = Some(e);
                    Ok(false)
                }
            },
        }
    }
}
