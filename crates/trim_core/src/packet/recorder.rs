use crate::emit::{self, TrimStats};
use crate::error::TrimError;
use crate::packet::{Packet, PacketSink};
use crate::session::ImageCreationPolicy;
use crate::tracker::StateTracker;

/// Owns the packets captured during the trim window until they are flushed or discarded.
#[derive(Debug, Default)]
pub struct PacketRecorder {
    recorded: Vec<Packet>,
    released: usize,
}

impl PacketRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, packet: Packet) {
        self.recorded.push(packet);
    }

    pub fn recorded(&self) -> &[Packet] {
        &self.recorded
    }

    pub fn len(&self) -> usize {
        self.recorded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recorded.is_empty()
    }

    /// Take ownership of packets that will never be written, and free them.
    pub fn release(&mut self, packets: impl IntoIterator<Item = Packet>) -> usize {
        let count = packets.into_iter().count();
        self.released += count;
        count
    }

    /// Packets freed without being written since the recorder was created.
    pub fn released_count(&self) -> usize {
        self.released
    }

    /// Write every recorded packet in arrival order, plus the creation of any
    /// object `live` gained inside the window without a recorded creation call.
    /// Nothing is freed.
    pub fn write_recorded(
        &self,
        snapshot: &StateTracker,
        live: &StateTracker,
        sink: &mut dyn PacketSink,
    ) -> Result<TrimStats, TrimError> {
        emit::write_recorded_packets(&self.recorded, snapshot, live, sink)
    }

    /// Write the whole trimmed stream (creation, recorded, destroy) and then free
    /// every buffered packet, whether or not the writes succeeded.
    pub fn flush_referenced(
        &mut self,
        snapshot: &mut StateTracker,
        live: &mut StateTracker,
        policy: ImageCreationPolicy,
        sink: &mut dyn PacketSink,
    ) -> Result<TrimStats, TrimError> {
        let result = self.write_stream(snapshot, live, policy, sink);
        let released = self.delete_all(snapshot, live);
        result.map(|mut stats| {
            stats.packets_released = released;
            stats
        })
    }

    fn write_stream(
        &self,
        snapshot: &StateTracker,
        live: &StateTracker,
        policy: ImageCreationPolicy,
        sink: &mut dyn PacketSink,
    ) -> Result<TrimStats, TrimError> {
        let mut stats = emit::write_all_referenced_object_calls(snapshot, policy, sink)?;
        let recorded = self.write_recorded(snapshot, live, sink)?;
        stats.packets_written += recorded.packets_written;
        stats.packets_skipped += recorded.packets_skipped;
        stats.packets_written += emit::write_destroy_packets(live, sink)?;
        sink.flush()?;
        Ok(stats)
    }

    /// Free every buffered packet without writing anything.
    pub fn discard_all(&mut self, snapshot: &mut StateTracker, live: &mut StateTracker) -> usize {
        let released = self.delete_all(snapshot, live);
        tracing::debug!(released, "discarded trim packets");
        released
    }

    /// Free the recorded packets and clear both trackers. Returns how many packets were freed.
    pub(crate) fn delete_all(&mut self, snapshot: &mut StateTracker, live: &mut StateTracker) -> usize {
        let before = self.released;
        let recorded = std::mem::take(&mut self.recorded);
        self.release(recorded);
        snapshot.clear(self);
        live.clear(self);
        self.released - before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{Handle, ObjectCategory};
    use crate::packet::MemorySink;
    use std::io;

    struct FailingSink;

    impl PacketSink for FailingSink {
        fn write_packet(&mut self, _packet: &Packet) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }
    }

    fn recorder_with(count: usize) -> PacketRecorder {
        let mut recorder = PacketRecorder::new();
        for _ in 0..count {
            recorder.record(Packet::captured("vkQueuePresentKHR", vec![Handle(1)], Vec::new()));
        }
        recorder
    }

    #[test]
    fn flush_leaves_nothing_buffered() {
        let mut recorder = recorder_with(3);
        let mut snapshot = StateTracker::new();
        let mut live = StateTracker::new();
        live.add(ObjectCategory::Instance, Handle(1)).unwrap();
        let mut sink = MemorySink::new();

        let stats = recorder
            .flush_referenced(&mut snapshot, &mut live, ImageCreationPolicy::Ordered, &mut sink)
            .unwrap();

        assert!(recorder.is_empty());
        assert!(live.is_empty());
        assert_eq!(sink.len(), 3);
        assert_eq!(stats.packets_released, 3);
    }

    #[test]
    fn failed_flush_still_frees_everything() {
        let mut recorder = recorder_with(2);
        let mut snapshot = StateTracker::new();
        let mut live = StateTracker::new();

        let result = recorder.flush_referenced(
            &mut snapshot,
            &mut live,
            ImageCreationPolicy::Unordered,
            &mut FailingSink,
        );

        assert!(matches!(result, Err(TrimError::Write(_))));
        assert!(recorder.is_empty());
        assert_eq!(recorder.released_count(), 2);
    }

    #[test]
    fn discard_writes_nothing() {
        let mut recorder = recorder_with(4);
        let mut snapshot = StateTracker::new();
        let mut live = StateTracker::new();
        assert_eq!(recorder.discard_all(&mut snapshot, &mut live), 4);
        assert!(recorder.is_empty());
    }
}
