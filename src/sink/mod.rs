//! Dispatch sinks - where the subscriber hands each event.
//!
//! A sink accepts or rejects one event at a time. The subscriber commits a
//! record's offset only after its sink returned `Ok`, so a sink that fails
//! leaves the record to be redelivered.
//!
//! Included sinks:
//! - any `FnMut(&Event) -> Result<(), DispatchError>` closure
//! - `ChannelSink` - forwards into an `mpsc` channel
//! - `JsonLinesSink` - writes one JSON document per line (stdout, files, buffers)
//! - `EmitterSink` - emits on an in-process `EventEmitter` (feature `emitter`)

mod event;

use std::io::{self, Write};
use std::sync::mpsc;

use thiserror::Error;

pub use event::{Event, TRIGGER};

/// Error returned when a sink rejects an event.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The sink refused the event.
    #[error("event rejected: {0}")]
    Rejected(String),
    /// The receiving side is gone.
    #[error("dispatch target disconnected")]
    Disconnected,
    #[error("failed to write event: {0}")]
    Io(#[from] io::Error),
    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Destination for subscriber events.
pub trait DispatchSink: Send {
    /// Deliver one event. Returning `Ok` allows the offset to be committed.
    fn dispatch(&mut self, event: &Event) -> Result<(), DispatchError>;
}

impl<F> DispatchSink for F
where
    F: FnMut(&Event) -> Result<(), DispatchError> + Send,
{
    fn dispatch(&mut self, event: &Event) -> Result<(), DispatchError> {
        self(event)
    }
}

/// Forwards events into a channel.
pub struct ChannelSink {
    sender: mpsc::Sender<Event>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Create a sink together with the receiving end.
    pub fn channel() -> (Self, mpsc::Receiver<Event>) {
        let (sender, receiver) = mpsc::channel();
        (Self::new(sender), receiver)
    }
}

impl DispatchSink for ChannelSink {
    fn dispatch(&mut self, event: &Event) -> Result<(), DispatchError> {
        self.sender
            .send(event.clone())
            .map_err(|_| DispatchError::Disconnected)
    }
}

/// Writes each event as a single line of JSON.
pub struct JsonLinesSink<W> {
    writer: W,
}

impl JsonLinesSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> DispatchSink for JsonLinesSink<W> {
    fn dispatch(&mut self, event: &Event) -> Result<(), DispatchError> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Emits events for in-process listeners.
///
/// Listeners receive the event serialized as a JSON string. `dispatch` waits
/// for every listener to finish; a listener that panics rejects the event.
#[cfg(feature = "emitter")]
pub struct EmitterSink {
    emitter: event_emitter_rs::EventEmitter,
    trigger: String,
}

#[cfg(feature = "emitter")]
impl EmitterSink {
    /// Emit under the default `kafka.new_message` trigger.
    pub fn new(emitter: event_emitter_rs::EventEmitter) -> Self {
        Self::with_trigger(emitter, TRIGGER)
    }

    pub fn with_trigger(emitter: event_emitter_rs::EventEmitter, trigger: impl Into<String>) -> Self {
        Self {
            emitter,
            trigger: trigger.into(),
        }
    }
}

#[cfg(feature = "emitter")]
impl DispatchSink for EmitterSink {
    fn dispatch(&mut self, event: &Event) -> Result<(), DispatchError> {
        let payload = event.to_json()?;
        let handles = self.emitter.emit(&self.trigger, payload);

        let mut panicked = 0;
        for handle in handles {
            if handle.join().is_err() {
                panicked += 1;
            }
        }
        if panicked > 0 {
            return Err(DispatchError::Rejected(format!(
                "{panicked} listener(s) on {} panicked",
                self.trigger
            )));
        }
        Ok(())
    }
}
