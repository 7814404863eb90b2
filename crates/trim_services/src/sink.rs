//! JSON-lines output for trimmed streams

use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use trim_core::{Handle, Packet, PacketSink};

/// One line per packet: call name, touched handles, and for synthesized
/// packets the decoded arguments.
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

#[derive(Serialize)]
struct PacketLine<'a> {
    call: &'a str,
    references: &'a [Handle],
    synthesized: bool,
    body_len: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<serde_json::Value>,
}

impl JsonLinesSink<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
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

impl<W: Write> PacketSink for JsonLinesSink<W> {
    fn write_packet(&mut self, packet: &Packet) -> io::Result<()> {
        let args = if packet.is_synthesized() {
            serde_json::from_slice(packet.body()).ok()
        } else {
            None
        };
        let line = PacketLine {
            call: packet.call(),
            references: packet.references(),
            synthesized: packet.is_synthesized(),
            body_len: packet.body().len(),
            args,
        };
        serde_json::to_writer(&mut self.writer, &line)?;
        self.writer.write_all(b"\n")
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
