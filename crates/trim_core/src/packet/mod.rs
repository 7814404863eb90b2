//! Trace packets and where they go.
//!
//! A [`Packet`] is one API call as the trace writer will see it. The core
//! never looks inside a captured packet body; it only needs the call name
//! and the handles the call touches, which is what reference marking walks.

pub mod generate;
mod recorder;

pub use recorder::PacketRecorder;

use crate::error::PacketError;
use crate::handle::Handle;
use parking_lot::Mutex;
use serde::Serialize;
use std::io;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    call: &'static str,
    references: Vec<Handle>,
    body: Vec<u8>,
    synthesized: bool,
}

impl Packet {
    /// Wrap a packet produced by the interception layer.
    pub fn captured(call: &'static str, references: impl Into<Vec<Handle>>, body: Vec<u8>) -> Self {
        Self {
            call,
            references: references.into(),
            body,
            synthesized: false,
        }
    }

    /// Build a packet for a call the application never made, with its
    /// arguments encoded as JSON.
    pub fn synthesize<A: Serialize>(
        call: &'static str,
        references: impl Into<Vec<Handle>>,
        args: &A,
    ) -> Result<Self, PacketError> {
        let body = serde_json::to_vec(args).map_err(|source| PacketError::Encode { call, source })?;
        Ok(Self {
            call,
            references: references.into(),
            body,
            synthesized: true,
        })
    }

    pub fn call(&self) -> &'static str {
        self.call
    }

    /// Handles the call reads, writes, creates or destroys.
    pub fn references(&self) -> &[Handle] {
        &self.references
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn is_synthesized(&self) -> bool {
        self.synthesized
    }

    pub fn touches(&self, handle: Handle) -> bool {
        self.references.contains(&handle)
    }
}

/// Destination of emitted packets, normally the trace file writer.
pub trait PacketSink {
    fn write_packet(&mut self, packet: &Packet) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: PacketSink + ?Sized> PacketSink for Box<S> {
    fn write_packet(&mut self, packet: &Packet) -> io::Result<()> {
        (**self).write_packet(packet)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

/// Sink that keeps everything in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    packets: Arc<Mutex<Vec<Packet>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn packets(&self) -> Vec<Packet> {
        self.packets.lock().clone()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.packets.lock().iter().map(Packet::call).collect()
    }

    pub fn len(&self) -> usize {
        self.packets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PacketSink for MemorySink {
    fn write_packet(&mut self, packet: &Packet) -> io::Result<()> {
        self.packets.lock().push(packet.clone());
        Ok(())
    }
}

/// Sink that discards everything, for sessions with trimming disabled.
#[derive(Debug, Default)]
pub struct NullSink;

impl PacketSink for NullSink {
    fn write_packet(&mut self, _packet: &Packet) -> io::Result<()> {
        Ok(())
    }
}
