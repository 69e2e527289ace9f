//! Scripted in-memory transport for driving `RemoteExecutor` without a server.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use russh::keys::PrivateKey;
use sshexec::channel::{
    ChannelEvent, Completion, EventSource, ExecStreams, ExitReport, PumpHandle, spawn_pump,
};
use sshexec::error::{AuthError, ConnectionError, Error, Result};
use sshexec::transport::{Connector, Endpoint, ExecChannel, PtyConfig, Session};

/// Path of the unencrypted test key.
pub fn fixture_key() -> String {
    format!("{}/tests/fixtures/id_ed25519", env!("CARGO_MANIFEST_DIR"))
}

/// Step at which the fake transport fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Connect,
    Authenticate,
    OpenChannel,
    Pty,
    Exec,
    Drain,
}

/// What the fake transport does for each invocation.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub events: Vec<ChannelEvent>,
    pub fail_at: Option<FailAt>,
    pub fail_channel_release: bool,
    pub fail_session_release: bool,
}

impl Script {
    pub fn events(events: Vec<ChannelEvent>) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }

    pub fn failing_at(step: FailAt) -> Self {
        Self {
            fail_at: Some(step),
            ..Self::default()
        }
    }

    /// Output of a command that prints `stdout` and exits with `status`.
    pub fn exits_with(stdout: &'static [u8], status: u32) -> Self {
        let mut events = Vec::new();
        if !stdout.is_empty() {
            events.push(ChannelEvent::Stdout(Bytes::from_static(stdout)));
        }
        events.extend([
            ChannelEvent::ExitStatus(status),
            ChannelEvent::Eof,
            ChannelEvent::Close,
        ]);
        Self::events(events)
    }

    fn fails_at(&self, step: FailAt) -> bool {
        self.fail_at == Some(step)
    }
}

/// Everything the fake transport was asked to do, in order.
#[derive(Debug, Default)]
pub struct Calls {
    steps: Mutex<Vec<String>>,
}

impl Calls {
    fn record(&self, step: impl Into<String>) {
        self.steps.lock().unwrap().push(step.into());
    }

    pub fn steps(&self) -> Vec<String> {
        self.steps.lock().unwrap().clone()
    }

    pub fn count(&self, step: &str) -> usize {
        self.steps
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.as_str() == step)
            .count()
    }
}

fn io_failure(message: &str) -> russh::Error {
    russh::Error::from(io::Error::other(message.to_string()))
}

pub struct FakeConnector {
    script: Script,
    calls: Arc<Calls>,
}

impl FakeConnector {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            calls: Arc::new(Calls::default()),
        }
    }

    pub fn calls(&self) -> &Calls {
        &self.calls
    }
}

impl Connector for FakeConnector {
    type Session = FakeSession;

    async fn connect(&self, endpoint: &Endpoint) -> Result<FakeSession> {
        self.calls.record("connect");
        if self.script.fails_at(FailAt::Connect) {
            return Err(ConnectionError::Connect {
                host: endpoint.host.clone(),
                port: endpoint.port,
                source: io_failure("network unreachable"),
            }
            .into());
        }
        Ok(FakeSession {
            script: self.script.clone(),
            calls: self.calls.clone(),
        })
    }
}

pub struct FakeSession {
    script: Script,
    calls: Arc<Calls>,
}

impl Session for FakeSession {
    type Channel = FakeChannel;

    async fn authenticate(&mut self, user: &str, _key: Arc<PrivateKey>) -> Result<()> {
        self.calls.record("authenticate");
        if self.script.fails_at(FailAt::Authenticate) {
            return Err(AuthError::Rejected {
                user: user.to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn open_channel(&mut self) -> Result<FakeChannel> {
        self.calls.record("open_channel");
        if self.script.fails_at(FailAt::OpenChannel) {
            return Err(ConnectionError::ChannelOpen(io_failure("administratively prohibited")).into());
        }
        Ok(FakeChannel {
            script: self.script.clone(),
            calls: self.calls.clone(),
            pump: None,
        })
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.calls.record("session_disconnect");
        if self.script.fail_session_release {
            return Err(Error::Unexpected("session already gone".to_string()));
        }
        Ok(())
    }
}

pub struct FakeChannel {
    script: Script,
    calls: Arc<Calls>,
    pump: Option<PumpHandle>,
}

impl ExecChannel for FakeChannel {
    async fn request_pty(&mut self, pty: &PtyConfig) -> Result<()> {
        self.calls.record(format!("request_pty {}", pty.term));
        if self.script.fails_at(FailAt::Pty) {
            return Err(ConnectionError::PtyRequest(io_failure("pty denied")).into());
        }
        Ok(())
    }

    async fn exec(&mut self, command: &str) -> Result<ExecStreams> {
        self.calls.record(format!("exec {}", command));
        if self.script.fails_at(FailAt::Exec) {
            return Err(ConnectionError::ExecRequest(io_failure("exec denied")).into());
        }
        if self.script.fails_at(FailAt::Drain) {
            let stdout = tokio_test::io::Builder::new()
                .read(b"first line\n")
                .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
                .build();
            return Ok(ExecStreams::new(
                stdout,
                tokio::io::empty(),
                Completion::ready(ExitReport::default()),
            ));
        }

        let source = ScriptedEvents {
            events: self.script.events.clone().into(),
            calls: self.calls.clone(),
        };
        let (streams, pump) = spawn_pump(source);
        self.pump = Some(pump);
        Ok(streams)
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.calls.record("channel_disconnect");
        if let Some(mut pump) = self.pump.take() {
            pump.shutdown().await;
        }
        if self.script.fail_channel_release {
            return Err(Error::Unexpected("channel already gone".to_string()));
        }
        Ok(())
    }
}

struct ScriptedEvents {
    events: VecDeque<ChannelEvent>,
    calls: Arc<Calls>,
}

impl EventSource for ScriptedEvents {
    async fn next_event(&mut self) -> Option<ChannelEvent> {
        // Let the drains interleave with the pump
        tokio::task::yield_now().await;
        self.events.pop_front()
    }

    async fn close(&mut self) {
        self.calls.record("source_close");
    }
}

/// Interleaved output of `chunks` chunks per stream, each chunk made of
/// 64-byte lines tagged with the stream and a running line number.
pub fn bulk_output(chunks: usize, lines_per_chunk: usize) -> Vec<ChannelEvent> {
    let mut events = Vec::with_capacity(chunks * 2 + 3);
    let mut line_no = 0usize;
    for _ in 0..chunks {
        let mut out = Vec::with_capacity(lines_per_chunk * 64);
        let mut err = Vec::with_capacity(lines_per_chunk * 64);
        for _ in 0..lines_per_chunk {
            out.extend_from_slice(format!("out {:>59}\n", line_no).as_bytes());
            err.extend_from_slice(format!("err {:>59}\n", line_no).as_bytes());
            line_no += 1;
        }
        events.push(ChannelEvent::Stdout(Bytes::from(out)));
        events.push(ChannelEvent::Stderr(Bytes::from(err)));
    }
    events.extend([
        ChannelEvent::ExitStatus(0),
        ChannelEvent::Eof,
        ChannelEvent::Close,
    ]);
    events
}

/// Upper bound for tests that would otherwise hang on a deadlock.
pub const DEADLOCK_GUARD: Duration = Duration::from_secs(120);
