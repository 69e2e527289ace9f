//! Channel layer: stream demultiplexing and draining.
//!
//! An exec channel's interleaved messages are split into two readable
//! streams by a pump task; each stream is then drained line by line.

mod events;
mod lines;

pub use events::{
    ChannelEvent, Completion, EventSource, ExecStreams, ExitReport, PumpHandle, StreamReader,
    spawn_pump,
};
pub use lines::drain_lines;
