use log::{debug, warn};
use midir::MidiOutputConnection;

use crate::general::message::MidiMessage;

/// Receiver of outbound messages. Delivery is fire-and-forget: a sink that
/// cannot deliver a message drops it.
pub trait MidiSink {
    fn send(&mut self, message: MidiMessage);
}

impl<S: MidiSink + ?Sized> MidiSink for &mut S {
    fn send(&mut self, message: MidiMessage) {
        (**self).send(message)
    }
}

impl<S: MidiSink + ?Sized> MidiSink for Box<S> {
    fn send(&mut self, message: MidiMessage) {
        (**self).send(message)
    }
}

/// `None` is a detached sink: messages vanish, state keeps moving.
impl<S: MidiSink> MidiSink for Option<S> {
    fn send(&mut self, message: MidiMessage) {
        match self {
            Some(sink) => sink.send(message),
            None => debug!("no output attached, dropping {:?}", message),
        }
    }
}

/// Keeps every message it receives, in order.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    messages: Vec<MidiMessage>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[MidiMessage] {
        &self.messages
    }

    /// Return the recorded messages and start over.
    pub fn take(&mut self) -> Vec<MidiMessage> {
        std::mem::take(&mut self.messages)
    }
}

impl MidiSink for RecordingSink {
    fn send(&mut self, message: MidiMessage) {
        self.messages.push(message);
    }
}

/// Sink backed by an open midir output connection.
pub struct MidirSink {
    conn: MidiOutputConnection,
    channel: u8,
    port_name: String,
}

impl MidirSink {
    pub fn new(conn: MidiOutputConnection, channel: u8, port_name: String) -> Self {
        Self {
            conn,
            channel,
            port_name,
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl MidiSink for MidirSink {
    fn send(&mut self, message: MidiMessage) {
        let Some(bytes) = message.to_bytes(self.channel) else {
            warn!("{:?} is outside the MIDI note range, not sent", message);
            return;
        };
        if let Err(err) = self.conn.send(&bytes) {
            warn!("error sending MIDI message to '{}': {}", self.port_name, err);
        }
    }
}
