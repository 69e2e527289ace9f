//! Demultiplexing of an exec channel's message stream.
//!
//! An SSH channel delivers stdout, stderr and status messages interleaved on a
//! single queue. The pump task reads that queue and writes each stream into
//! its own bounded pipe, so the two streams can be drained independently.
//! A stalled reader only stalls the pump; as long as both readers are polled
//! the pump always makes progress.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use log::{debug, trace, warn};
use tokio::io::{AsyncRead, AsyncWriteExt, DuplexStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Capacity of each per-stream pipe.
const PIPE_CAPACITY: usize = 64 * 1024;

/// Owned readable half of a remote output stream.
pub type StreamReader = Pin<Box<dyn AsyncRead + Send>>;

/// A message received on an exec channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Standard output data.
    Stdout(Bytes),
    /// Extended data of type 1 (standard error).
    Stderr(Bytes),
    /// `exit-status` request.
    ExitStatus(u32),
    /// `exit-signal` request, carrying the signal name.
    ExitSignal(String),
    /// The remote side will send no more data.
    Eof,
    /// The remote side closed the channel.
    Close,
}

/// Source of channel events, read by the pump task.
pub trait EventSource: Send + 'static {
    /// Next event, or `None` once the underlying channel is gone.
    fn next_event(&mut self) -> impl Future<Output = Option<ChannelEvent>> + Send;

    /// Close the underlying channel. Called exactly once, when the pump exits.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// How the remote process finished, as far as the channel reported it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExitReport {
    /// Whether the channel reported closed.
    pub closed: bool,

    /// Exit status, if one was sent.
    pub exit_status: Option<u32>,

    /// Signal name, if the process was killed by a signal.
    pub exit_signal: Option<String>,
}

/// Resolves to the [`ExitReport`] once the channel is finished.
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<ExitReport>,
}

impl Completion {
    /// A completion that is already resolved.
    pub fn ready(report: ExitReport) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(report);
        Self { rx }
    }

    /// Wait for the channel to finish.
    ///
    /// If the producer went away without reporting, the channel is treated as
    /// never having reported closed.
    pub async fn wait(self) -> ExitReport {
        self.rx.await.unwrap_or_default()
    }
}

/// The readable side of a started command.
pub struct ExecStreams {
    pub stdout: StreamReader,
    pub stderr: StreamReader,
    pub completion: Completion,
}

impl ExecStreams {
    pub fn new(
        stdout: impl AsyncRead + Send + 'static,
        stderr: impl AsyncRead + Send + 'static,
        completion: Completion,
    ) -> Self {
        Self {
            stdout: Box::pin(stdout),
            stderr: Box::pin(stderr),
            completion,
        }
    }
}

impl std::fmt::Debug for ExecStreams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecStreams")
            .field("stdout", &"<reader>")
            .field("stderr", &"<reader>")
            .field("completion", &self.completion)
            .finish()
    }
}

/// Handle to a running pump task.
///
/// Dropping the handle aborts the task, which drops (and so releases) the
/// event source.
#[derive(Debug)]
pub struct PumpHandle {
    release_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl PumpHandle {
    /// Ask the pump to stop, then wait for it to close the source.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.release_tx.take() {
            // Err means the pump already exited on its own
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("channel pump task failed: {}", e);
            }
        }
    }

    /// Whether the pump has been shut down.
    pub fn is_shut_down(&self) -> bool {
        self.task.is_none()
    }
}

impl Drop for PumpHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            debug!("channel pump dropped without shutdown, aborting");
            task.abort();
        }
    }
}

/// Spawn a pump over `source`.
///
/// Returns the two readers plus completion, and the handle used to release
/// the channel. Must be called within a Tokio runtime.
pub fn spawn_pump<S: EventSource>(source: S) -> (ExecStreams, PumpHandle) {
    let (stdout_tx, stdout_rx) = tokio::io::duplex(PIPE_CAPACITY);
    let (stderr_tx, stderr_rx) = tokio::io::duplex(PIPE_CAPACITY);
    let (report_tx, report_rx) = oneshot::channel();
    let (release_tx, release_rx) = oneshot::channel();

    let task = tokio::spawn(pump(source, stdout_tx, stderr_tx, report_tx, release_rx));

    let streams = ExecStreams::new(stdout_rx, stderr_rx, Completion { rx: report_rx });
    let handle = PumpHandle {
        release_tx: Some(release_tx),
        task: Some(task),
    };
    (streams, handle)
}

async fn pump<S: EventSource>(
    mut source: S,
    stdout: DuplexStream,
    stderr: DuplexStream,
    report_tx: oneshot::Sender<ExitReport>,
    mut release_rx: oneshot::Receiver<()>,
) {
    let mut stdout = Some(stdout);
    let mut stderr = Some(stderr);
    let mut report = ExitReport::default();

    loop {
        let event = tokio::select! {
            event = source.next_event() => event,
            _ = &mut release_rx => {
                trace!("pump: release requested");
                break;
            }
        };

        match event {
            Some(ChannelEvent::Stdout(data)) => forward(&mut stdout, &data, "stdout").await,
            Some(ChannelEvent::Stderr(data)) => forward(&mut stderr, &data, "stderr").await,
            Some(ChannelEvent::ExitStatus(code)) => {
                debug!("pump: exit status {}", code);
                report.exit_status = Some(code);
            }
            Some(ChannelEvent::ExitSignal(signal)) => {
                debug!("pump: exit signal {}", signal);
                report.exit_signal = Some(signal);
            }
            Some(ChannelEvent::Eof) => {
                trace!("pump: eof");
                stdout = None;
                stderr = None;
            }
            Some(ChannelEvent::Close) => {
                trace!("pump: channel closed");
                report.closed = true;
                break;
            }
            None => {
                debug!("pump: channel ended without close");
                break;
            }
        }
    }

    // Readers see end-of-stream once the writers are gone
    drop(stdout);
    drop(stderr);
    let _ = report_tx.send(report);
    source.close().await;
}

async fn forward(writer: &mut Option<DuplexStream>, data: &[u8], name: &str) {
    let Some(w) = writer.as_mut() else {
        trace!("pump: discarding {} bytes of {}", data.len(), name);
        return;
    };
    if let Err(e) = w.write_all(data).await {
        debug!("pump: {} reader gone ({}), discarding further output", name, e);
        *writer = None;
    }
}
