//! Trim session
//!
//! The context object the interception layer and the frame-present hook talk
//! to. It owns the live tracker, the snapshot taken when the window opens,
//! the packet recorder and the output sink, all behind one lock.
//!
//! Per intercepted call the interception layer reports object lifetimes
//! ([`TrimSession::add`], [`TrimSession::remove`]), command-buffer recording
//! and the packet itself ([`TrimSession::record`]). Once per presented frame
//! the hook calls [`TrimSession::advance_frame`], which opens the window
//! (snapshot) and closes it (emit) as the frame counter crosses the
//! configured range.

mod config;
mod frame;
mod phase;

pub use config::{FrameRange, ImageCreationPolicy, TrimConfig};
pub use frame::FrameCounter;
pub use phase::TrimPhase;

use crate::allocator::AllocatorRegistry;
use crate::emit::{self, TrimStats};
use crate::error::{ConfigError, TrackError, TrimError};
use crate::handle::{Handle, ObjectCategory};
use crate::object::{BufferTransition, ImageTransition, ObjectInfo};
use crate::packet::{Packet, PacketRecorder, PacketSink};
use crate::tracker::StateTracker;
use ash::vk;
use parking_lot::Mutex;
use std::time::Duration;
use trim_metrics::{Counter, PhaseTimer};

struct SessionState {
    config: TrimConfig,
    phase: TrimPhase,
    frames: FrameCounter,
    live: StateTracker,
    /// Copy of `live` taken when the window opened.
    snapshot: Option<StateTracker>,
    recorder: PacketRecorder,
    sink: Box<dyn PacketSink + Send>,
    stats: TrimStats,
    counters: Counter,
    timer: PhaseTimer,
}

impl SessionState {
    fn reset(&mut self) {
        let mut snapshot = self.snapshot.take().unwrap_or_default();
        let released = self.recorder.discard_all(&mut snapshot, &mut self.live);
        if released > 0 {
            tracing::debug!(released, "dropped packets from previous session");
        }
        self.frames.reset();
        self.stats = TrimStats::default();
        self.counters.reset_all();
        self.timer.reset();
        self.phase = TrimPhase::initial(self.config.frames);
        if self.phase == TrimPhase::Active {
            self.take_snapshot();
        }
    }

    /// Pre-mark every non-command-buffer object and copy the live tracker.
    fn take_snapshot(&mut self) -> usize {
        let live = &mut self.live;
        let count = self.timer.time_phase("snapshot", || {
            let handles: Vec<Handle> = live
                .iter_all()
                .filter(|info| info.category() != ObjectCategory::CommandBuffer)
                .map(ObjectInfo::handle)
                .collect();
            for handle in handles {
                if let Some(info) = live.get_mut(handle) {
                    info.mark_referenced();
                }
            }
            live.len()
        });
        self.snapshot = Some(self.live.clone());
        self.stats.objects_snapshotted = count;
        self.counters.increment("objects_snapshotted", count);
        tracing::debug!(objects = count, frame = self.frames.frame(), "took trim snapshot");
        count
    }

    fn flush(&mut self) -> Result<TrimStats, TrimError> {
        let mut snapshot = self.snapshot.take().unwrap_or_default();
        let policy = self.config.image_creation;
        let recorder = &mut self.recorder;
        let live = &mut self.live;
        let sink = &mut *self.sink;
        let result = self
            .timer
            .time_phase("emit", || recorder.flush_referenced(&mut snapshot, live, policy, sink));

        match &result {
            Ok(stats) => {
                self.stats.packets_written += stats.packets_written;
                self.stats.packets_skipped += stats.packets_skipped;
                self.stats.packets_released += stats.packets_released;
                self.counters.increment("packets_written", stats.packets_written);
                self.counters.increment("packets_released", stats.packets_released);
            }
            Err(err) => tracing::error!(error = %err, "trim flush failed"),
        }
        result.map(|_| self.stats)
    }

    /// Apply a mark to the live tracker, and to the snapshot while the window is open.
    fn mark_with(&mut self, mark: impl Fn(&mut StateTracker) -> usize) -> usize {
        if !self.phase.is_recording() {
            return 0;
        }
        let marked = mark(&mut self.live);
        if let Some(snapshot) = self.snapshot.as_mut() {
            mark(snapshot);
        }
        marked
    }

    fn mark_packet_references(&mut self, packet: &Packet) {
        for &handle in packet.references() {
            if self.live.category_of(handle) == Some(ObjectCategory::CommandBuffer) {
                self.mark_with(|tracker| tracker.mark_command_buffer_referenced(handle));
            } else {
                self.mark_with(|tracker| tracker.mark_referenced(handle));
            }
        }
    }

    fn require_phase(&self, operation: &'static str, allowed: &[TrimPhase]) -> Result<(), TrimError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(TrimError::InvalidPhase { operation, phase: self.phase })
        }
    }
}

/// One trim session: tracking, the trim window state machine, and emission.
pub struct TrimSession {
    state: Mutex<SessionState>,
    allocators: AllocatorRegistry,
}

impl TrimSession {
    pub fn new(config: TrimConfig, sink: impl PacketSink + Send + 'static) -> Result<Self, ConfigError> {
        config.validate()?;
        let session = Self {
            state: Mutex::new(SessionState {
                config,
                phase: TrimPhase::Disabled,
                frames: FrameCounter::new(),
                live: StateTracker::new(),
                snapshot: None,
                recorder: PacketRecorder::new(),
                sink: Box::new(sink),
                stats: TrimStats::default(),
                counters: Counter::new(),
                timer: PhaseTimer::new(),
            }),
            allocators: AllocatorRegistry::new(),
        };
        session.initialize();
        Ok(session)
    }

    /// Reset every piece of session state for a new trim window.
    pub fn initialize(&self) {
        self.allocators.clear();
        let mut state = self.state.lock();
        state.reset();
        tracing::info!(phase = %state.phase, frames = ?state.config.frames, "trim session initialized");
    }

    pub fn phase(&self) -> TrimPhase {
        self.state.lock().phase
    }

    pub fn frame(&self) -> u64 {
        self.state.lock().frames.frame()
    }

    pub fn config(&self) -> TrimConfig {
        self.state.lock().config.clone()
    }

    pub fn stats(&self) -> TrimStats {
        self.state.lock().stats
    }

    pub fn allocators(&self) -> &AllocatorRegistry {
        &self.allocators
    }

    /// Named counter value. Always 0 without the `metrics` feature.
    pub fn counter(&self, name: &str) -> usize {
        self.state.lock().counters.get(name)
    }

    /// Time spent in the `snapshot` or `emit` phase.
    pub fn phase_timing(&self, name: &str) -> Duration {
        self.state.lock().timer.get_timing(name)
    }

    /// Count one presented frame, opening or closing the window when the
    /// counter crosses the configured range. Emit failures are logged, never
    /// returned.
    pub fn advance_frame(&self) -> TrimPhase {
        let mut state = self.state.lock();
        let frame = state.frames.advance();
        let next = state.phase.next(state.config.frames, frame);
        match (state.phase, next) {
            (TrimPhase::Armed, TrimPhase::Active) => {
                state.phase = next;
                state.take_snapshot();
            }
            (TrimPhase::Active, TrimPhase::Drained) => {
                state.phase = next;
                if let Ok(stats) = state.flush() {
                    tracing::info!(
                        frame,
                        written = stats.packets_written,
                        released = stats.packets_released,
                        "trim window emitted"
                    );
                }
            }
            _ => state.phase = next,
        }
        state.phase
    }

    /// Start tracking an object and let `populate` fill in its record.
    /// Outside the tracking phases this does nothing.
    pub fn add(
        &self,
        category: ObjectCategory,
        handle: Handle,
        populate: impl FnOnce(&mut ObjectInfo),
    ) -> Result<(), TrackError> {
        let mut state = self.state.lock();
        if !state.phase.is_tracking() {
            return Ok(());
        }
        let info = state.live.add(category, handle).map_err(|err| {
            tracing::warn!(error = %err, "object not tracked");
            err
        })?;
        populate(info);
        Ok(())
    }

    /// Like [`add`](Self::add), but an existing record of the same category is released first.
    pub fn replace(
        &self,
        category: ObjectCategory,
        handle: Handle,
        populate: impl FnOnce(&mut ObjectInfo),
    ) -> Result<(), TrackError> {
        let mut state = self.state.lock();
        if !state.phase.is_tracking() {
            return Ok(());
        }
        let SessionState { live, recorder, .. } = &mut *state;
        populate(live.replace(category, handle, recorder)?);
        Ok(())
    }

    /// Mutate a tracked record. `None` when the handle is not tracked.
    pub fn update<R>(&self, handle: Handle, f: impl FnOnce(&mut ObjectInfo) -> R) -> Option<R> {
        self.state.lock().live.get_mut(handle).map(f)
    }

    pub fn inspect<R>(&self, handle: Handle, f: impl FnOnce(&ObjectInfo) -> R) -> Option<R> {
        self.state.lock().live.get(handle).map(f)
    }

    /// Read access to the live tracker.
    pub fn with_tracker<R>(&self, f: impl FnOnce(&StateTracker) -> R) -> R {
        f(&self.state.lock().live)
    }

    /// Stop tracking an object. Returns `false` if it was not tracked.
    pub fn remove(&self, handle: Handle) -> bool {
        let mut state = self.state.lock();
        let SessionState { live, recorder, .. } = &mut *state;
        live.remove(handle, recorder).is_some()
    }

    /// Returns how many records were newly marked in the live tracker.
    pub fn mark_referenced(&self, handle: Handle) -> usize {
        self.state
            .lock()
            .mark_with(|tracker| tracker.mark_referenced(handle))
    }

    pub fn mark_command_buffer_referenced(&self, command_buffer: Handle) -> usize {
        self.state
            .lock()
            .mark_with(|tracker| tracker.mark_command_buffer_referenced(command_buffer))
    }

    pub fn append_command_buffer_call(&self, command_buffer: Handle, packet: Packet) {
        let mut state = self.state.lock();
        if let Err(packet) = state.live.append_command_buffer_call(command_buffer, packet) {
            tracing::trace!(%command_buffer, call = packet.call(), "call on untracked command buffer");
            state.recorder.release([packet]);
        }
    }

    pub fn clear_command_buffer_calls(&self, command_buffer: Handle) -> usize {
        let mut state = self.state.lock();
        let SessionState { live, recorder, .. } = &mut *state;
        live.clear_command_buffer_calls(command_buffer, recorder)
    }

    /// Returns the descriptor sets that stopped being tracked.
    pub fn reset_descriptor_pool(&self, pool: Handle) -> Vec<Handle> {
        let mut state = self.state.lock();
        let SessionState { live, recorder, .. } = &mut *state;
        live.reset_descriptor_pool(pool, recorder)
    }

    pub fn add_image_call(&self, packet: Packet) {
        let mut state = self.state.lock();
        if state.phase.is_tracking() {
            state.live.add_image_call(packet);
        } else {
            state.recorder.release([packet]);
        }
    }

    pub fn add_image_transition(&self, command_buffer: Handle, transition: ImageTransition) -> bool {
        self.state
            .lock()
            .live
            .add_image_transition(command_buffer, transition)
    }

    pub fn add_buffer_transition(&self, command_buffer: Handle, transition: BufferTransition) -> bool {
        self.state
            .lock()
            .live
            .add_buffer_transition(command_buffer, transition)
    }

    pub fn apply_command_buffer_transitions(&self, command_buffer: Handle) -> usize {
        self.state
            .lock()
            .live
            .apply_command_buffer_transitions(command_buffer)
    }

    /// Buffer a packet for the trimmed stream and mark everything it touches.
    /// Outside the window the packet is released immediately.
    pub fn record(&self, packet: Packet) {
        let mut state = self.state.lock();
        if !state.phase.is_recording() {
            state.recorder.release([packet]);
            return;
        }
        state.mark_packet_references(&packet);
        state.recorder.record(packet);
    }

    /// Take the snapshot now, regardless of the frame counter. Returns how many objects it holds.
    pub fn snapshot_state_tracker(&self) -> usize {
        self.state.lock().take_snapshot()
    }

    /// Write the calls that rebuild the snapshot.
    pub fn write_all_referenced_object_calls(&self) -> Result<TrimStats, TrimError> {
        let mut state = self.state.lock();
        let SessionState { snapshot, sink, config, phase, .. } = &mut *state;
        let snapshot = snapshot.as_ref().ok_or(TrimError::InvalidPhase {
            operation: "write snapshot objects",
            phase: *phase,
        })?;
        emit::write_all_referenced_object_calls(snapshot, config.image_creation, &mut **sink)
    }

    /// Write every packet recorded inside the window.
    pub fn write_recorded_packets(&self) -> Result<usize, TrimError> {
        let mut state = self.state.lock();
        state.require_phase("write recorded packets", &[TrimPhase::Active, TrimPhase::Drained])?;
        let SessionState { recorder, sink, snapshot, live, .. } = &mut *state;
        let empty = StateTracker::new();
        let snapshot = snapshot.as_ref().unwrap_or(&empty);
        recorder
            .write_recorded(snapshot, live, &mut **sink)
            .map(|stats| stats.packets_written)
    }

    /// Write teardown for every referenced object still alive.
    pub fn write_destroy_packets(&self) -> Result<usize, TrimError> {
        let mut state = self.state.lock();
        state.require_phase("write destroy packets", &[TrimPhase::Active, TrimPhase::Drained])?;
        let SessionState { live, sink, .. } = &mut *state;
        let written = emit::write_destroy_packets(live, &mut **sink)?;
        sink.flush()?;
        Ok(written)
    }

    /// Free every buffered packet and clear both trackers.
    pub fn delete_all_packets(&self) -> usize {
        let mut state = self.state.lock();
        let SessionState { snapshot, live, recorder, .. } = &mut *state;
        let mut taken = snapshot.take().unwrap_or_default();
        let released = recorder.delete_all(&mut taken, live);
        state.stats.packets_released += released;
        released
    }

    /// Emit the whole window now and move to `Drained`.
    pub fn flush(&self) -> Result<TrimStats, TrimError> {
        let mut state = self.state.lock();
        state.require_phase("flush", &[TrimPhase::Active])?;
        state.phase = TrimPhase::Drained;
        state.flush()
    }

    /// Abort the window: free every buffered packet without writing, and move to `Drained`.
    pub fn discard_all(&self) -> usize {
        let mut state = self.state.lock();
        let SessionState { snapshot, live, recorder, .. } = &mut *state;
        let mut taken = snapshot.take().unwrap_or_default();
        let released = recorder.discard_all(&mut taken, live);
        state.stats.packets_released += released;
        if state.phase.is_tracking() {
            state.phase = TrimPhase::Drained;
        }
        released
    }

    pub fn lookup_memory_properties(&self, device: Handle, memory_type_index: u32) -> Option<vk::MemoryPropertyFlags> {
        self.state
            .lock()
            .live
            .lookup_memory_properties(device, memory_type_index)
    }

    pub fn is_device_only_memory(&self, device: Handle, memory: Handle) -> bool {
        self.state.lock().live.is_device_only_memory(device, memory)
    }

    pub fn find_memory_type_index(&self, device: Handle, type_bits: u32, required: vk::MemoryPropertyFlags) -> u32 {
        self.state
            .lock()
            .live
            .find_memory_type_index(device, type_bits, required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::DescriptorWrite;
    use crate::packet::{MemorySink, NullSink};

    fn captured(call: &'static str, handles: &[Handle]) -> Packet {
        Packet::captured(call, handles.to_vec(), Vec::new())
    }

    fn open_session(start: u64, end: u64) -> (TrimSession, MemorySink) {
        let sink = MemorySink::new();
        let session = TrimSession::new(TrimConfig::with_frames(FrameRange::new(start, end)), sink.clone()).unwrap();
        (session, sink)
    }

    /// Instance 1, physical device 2, device 3, each with its creation packet.
    fn add_device(session: &TrimSession) {
        session
            .add(ObjectCategory::Instance, Handle(1), |info| {
                info.create_packet = Some(captured("vkCreateInstance", &[Handle(1)]));
            })
            .unwrap();
        session
            .add(ObjectCategory::PhysicalDevice, Handle(2), |info| {
                info.set_owners(Handle(1), Handle::NULL, Handle::NULL);
                info.create_packet = Some(captured("vkEnumeratePhysicalDevices", &[Handle(1), Handle(2)]));
            })
            .unwrap();
        session
            .add(ObjectCategory::Device, Handle(3), |info| {
                info.set_owners(Handle(1), Handle(2), Handle::NULL);
                info.create_packet = Some(captured("vkCreateDevice", &[Handle(2), Handle(3)]));
            })
            .unwrap();
    }

    fn position(packets: &[Packet], call: &str, handle: Handle) -> usize {
        packets
            .iter()
            .position(|p| p.call() == call && p.touches(handle))
            .unwrap_or_else(|| panic!("{call} for {handle} not emitted"))
    }

    #[test]
    fn rejects_empty_ranges() {
        let result = TrimSession::new(TrimConfig::with_frames(FrameRange::new(5, 5)), MemorySink::new());
        assert!(result.is_err());
    }

    #[test]
    fn image_created_in_window_follows_its_device() {
        let (session, sink) = open_session(1, 2);
        add_device(&session);
        assert_eq!(session.advance_frame(), TrimPhase::Active);

        let create = captured("vkCreateImage", &[Handle(3), Handle(20)]);
        session
            .add(ObjectCategory::Image, Handle(20), |info| {
                info.set_owners(Handle(1), Handle(2), Handle(3));
                info.create_packet = Some(create.clone());
            })
            .unwrap();
        session.record(create);
        session.mark_referenced(Handle(20));

        assert_eq!(session.advance_frame(), TrimPhase::Drained);
        let calls: Vec<_> = sink.calls().into_iter().take(4).collect();
        assert_eq!(calls, vec![
            "vkCreateInstance",
            "vkEnumeratePhysicalDevices",
            "vkCreateDevice",
            "vkCreateImage",
        ]);
        let packets = sink.packets();
        assert!(position(&packets, "vkCreateDevice", Handle(3)) < position(&packets, "vkCreateImage", Handle(20)));
    }

    #[test]
    fn image_tracked_in_window_without_a_captured_call_is_still_created() {
        let (session, sink) = open_session(1, 2);
        add_device(&session);
        session.advance_frame();

        session
            .add(ObjectCategory::Image, Handle(20), |info| {
                info.set_owners(Handle(1), Handle(2), Handle(3));
                info.create_packet = Some(captured("vkCreateImage", &[Handle(3), Handle(20)]));
            })
            .unwrap();
        session.mark_referenced(Handle(20));
        session.advance_frame();

        assert_eq!(sink.calls(), vec![
            "vkCreateInstance",
            "vkEnumeratePhysicalDevices",
            "vkCreateDevice",
            "vkCreateImage",
            "vkDestroyImage",
            "vkDestroyDevice",
            "vkDestroyInstance",
        ]);
    }

    #[test]
    fn calls_from_many_threads_land_in_one_tracker() {
        const THREADS: u64 = 4;
        const PER_THREAD: u64 = 16;

        let (session, sink) = open_session(0, 10);
        add_device(&session);
        std::thread::scope(|scope| {
            for thread in 0..THREADS {
                let session = &session;
                scope.spawn(move || {
                    for i in 0..PER_THREAD {
                        let handle = Handle(0x100 + thread * PER_THREAD + i);
                        let create = captured("vkCreateBuffer", &[Handle(3), handle]);
                        session
                            .add(ObjectCategory::Buffer, handle, |info| {
                                info.set_owners(Handle(1), Handle(2), Handle(3));
                                info.create_packet = Some(create.clone());
                            })
                            .unwrap();
                        session.record(create);
                        session.mark_referenced(handle);
                    }
                });
            }
        });

        let buffers = (THREADS * PER_THREAD) as usize;
        assert_eq!(session.with_tracker(|t| t.count(ObjectCategory::Buffer)), buffers);
        assert!(session.with_tracker(|t| t.iter_all().all(ObjectInfo::is_referenced)));

        session.flush().unwrap();
        let calls = sink.calls();
        assert_eq!(calls.iter().filter(|c| **c == "vkCreateBuffer").count(), buffers);
        assert_eq!(calls.iter().filter(|c| **c == "vkDestroyBuffer").count(), buffers);
    }

    #[test]
    fn pool_reset_drops_sets_without_destroy_packets() {
        let (session, sink) = open_session(1, 2);
        add_device(&session);
        session
            .add(ObjectCategory::DescriptorPool, Handle(40), |info| {
                info.set_owners(Handle(1), Handle(2), Handle(3));
                info.create_packet = Some(captured("vkCreateDescriptorPool", &[Handle(3), Handle(40)]));
            })
            .unwrap();
        session
            .add(ObjectCategory::DescriptorSet, Handle(41), |info| {
                info.set_owners(Handle(1), Handle(2), Handle(3));
                info.payload.as_descriptor_set_mut().unwrap().pool = Handle(40);
            })
            .unwrap();

        assert_eq!(session.reset_descriptor_pool(Handle(40)), vec![Handle(41)]);
        assert!(session.inspect(Handle(41), |_| ()).is_none());

        session.advance_frame();
        session.advance_frame();
        let packets = sink.packets();
        assert!(packets.iter().all(|p| !p.touches(Handle(41))));
        assert!(position(&packets, "vkResetDescriptorPool", Handle(40)) < position(&packets, "vkDestroyDescriptorPool", Handle(40)));
    }

    #[test]
    fn each_referenced_object_is_created_once_and_destroyed_at_most_once() {
        let (session, sink) = open_session(1, 3);
        add_device(&session);
        session
            .add(ObjectCategory::Buffer, Handle(21), |info| {
                info.set_owners(Handle(1), Handle(2), Handle(3));
                info.create_packet = Some(captured("vkCreateBuffer", &[Handle(3), Handle(21)]));
            })
            .unwrap();
        session.advance_frame();

        let create = captured("vkCreateSampler", &[Handle(3), Handle(22)]);
        session
            .add(ObjectCategory::Sampler, Handle(22), |info| {
                info.set_owners(Handle(1), Handle(2), Handle(3));
                info.create_packet = Some(create.clone());
            })
            .unwrap();
        session.record(create);
        session.record(captured("vkCmdFillBuffer", &[Handle(21)]));
        session.advance_frame();
        session.advance_frame();

        let packets = sink.packets();
        for (handle, create, destroy) in [
            (Handle(21), "vkCreateBuffer", "vkDestroyBuffer"),
            (Handle(22), "vkCreateSampler", "vkDestroySampler"),
        ] {
            let creates = packets.iter().filter(|p| p.call() == create && p.touches(handle)).count();
            let destroys = packets.iter().filter(|p| p.call() == destroy && p.touches(handle)).count();
            assert_eq!(creates, 1, "{create}");
            assert!(destroys <= 1, "{destroy}");
            let first_use = packets.iter().position(|p| p.touches(handle)).unwrap();
            assert_eq!(first_use, position(&packets, create, handle));
        }
    }

    #[test]
    fn command_buffers_pull_in_what_they_touch() {
        let (session, sink) = open_session(1, 2);
        add_device(&session);
        for (category, raw) in [
            (ObjectCategory::CommandPool, 30),
            (ObjectCategory::CommandBuffer, 31),
            (ObjectCategory::Image, 20),
        ] {
            session
                .add(category, Handle(raw), |info| info.set_owners(Handle(1), Handle(2), Handle(3)))
                .unwrap();
        }
        session.update(Handle(31), |info| {
            info.payload.as_command_buffer_mut().unwrap().pool = Handle(30);
        });
        session.append_command_buffer_call(Handle(31), captured("vkCmdClearColorImage", &[Handle(31), Handle(20)]));
        session.advance_frame();

        assert!(!session.inspect(Handle(31), ObjectInfo::is_referenced).unwrap());
        session.record(captured("vkQueueSubmit", &[Handle(31)]));
        assert!(session.inspect(Handle(31), ObjectInfo::is_referenced).unwrap());

        session.advance_frame();
        assert!(sink.calls().contains(&"vkCmdClearColorImage"));
    }

    #[test]
    fn unreferenced_command_buffer_streams_are_not_written() {
        let (session, sink) = open_session(1, 2);
        add_device(&session);
        session
            .add(ObjectCategory::CommandBuffer, Handle(31), |info| info.set_owners(Handle(1), Handle(2), Handle(3)))
            .unwrap();
        session.append_command_buffer_call(Handle(31), captured("vkCmdDraw", &[Handle(31)]));
        session.advance_frame();
        session.advance_frame();
        assert!(!sink.calls().contains(&"vkCmdDraw"));
    }

    #[test]
    fn flush_and_discard_leave_nothing_buffered() {
        let (session, sink) = open_session(0, 10);
        add_device(&session);
        assert_eq!(session.phase(), TrimPhase::Active);
        session.record(captured("vkQueuePresentKHR", &[Handle(3)]));

        let stats = session.flush().unwrap();
        assert_eq!(session.phase(), TrimPhase::Drained);
        assert!(stats.packets_released >= 1);
        assert_eq!(session.with_tracker(StateTracker::len), 0);
        assert!(!sink.is_empty());

        let (session, sink) = open_session(0, 10);
        add_device(&session);
        session.record(captured("vkQueuePresentKHR", &[Handle(3)]));
        assert!(session.discard_all() >= 1);
        assert!(sink.is_empty());
        assert!(session.flush().is_err());
    }

    #[test]
    fn nothing_is_recorded_outside_the_window() {
        let (session, sink) = open_session(2, 3);
        add_device(&session);
        session.record(captured("vkQueuePresentKHR", &[Handle(3)]));
        assert_eq!(session.mark_referenced(Handle(3)), 0);
        assert!(matches!(
            session.write_recorded_packets(),
            Err(TrimError::InvalidPhase { phase: TrimPhase::Armed, .. })
        ));

        session.advance_frame();
        assert_eq!(session.phase(), TrimPhase::Armed);
        session.advance_frame();
        assert_eq!(session.phase(), TrimPhase::Active);
        assert_eq!(session.write_recorded_packets().unwrap(), 0);
        assert!(sink.is_empty());
    }

    #[test]
    fn emit_phases_can_be_driven_one_by_one() {
        let (session, sink) = open_session(1, 100);
        add_device(&session);
        session.advance_frame();
        session.record(captured("vkQueueWaitIdle", &[Handle(3)]));

        session.write_all_referenced_object_calls().unwrap();
        assert_eq!(session.write_recorded_packets().unwrap(), 1);
        session.write_destroy_packets().unwrap();
        assert!(session.delete_all_packets() >= 4);

        let calls = sink.calls();
        assert_eq!(calls.first(), Some(&"vkCreateInstance"));
        assert_eq!(calls.last(), Some(&"vkDestroyInstance"));
        assert!(session.write_all_referenced_object_calls().is_err());
    }

    #[test]
    fn initialize_starts_over() {
        let (session, _sink) = open_session(1, 2);
        add_device(&session);
        session.advance_frame();
        session.advance_frame();
        assert_eq!(session.phase(), TrimPhase::Drained);

        session.initialize();
        assert_eq!(session.phase(), TrimPhase::Armed);
        assert_eq!(session.frame(), 0);
        assert_eq!(session.with_tracker(StateTracker::len), 0);
    }

    #[test]
    fn disabled_sessions_track_nothing() {
        let session = TrimSession::new(TrimConfig::default(), NullSink).unwrap();
        assert_eq!(session.phase(), TrimPhase::Disabled);
        add_device(&session);
        session.record(captured("vkQueuePresentKHR", &[Handle(3)]));
        assert_eq!(session.with_tracker(StateTracker::len), 0);
        assert_eq!(session.advance_frame(), TrimPhase::Disabled);
        assert_eq!(session.stats().packets_written, 0);
    }

    #[test]
    fn descriptor_updates_in_the_snapshot_are_replayed() {
        let (session, sink) = open_session(1, 2);
        add_device(&session);
        session
            .add(ObjectCategory::DescriptorPool, Handle(40), |info| info.set_owners(Handle(1), Handle(2), Handle(3)))
            .unwrap();
        session
            .add(ObjectCategory::DescriptorSet, Handle(41), |info| {
                info.set_owners(Handle(1), Handle(2), Handle(3));
                let set = info.payload.as_descriptor_set_mut().unwrap();
                set.pool = Handle(40);
                set.record_write(DescriptorWrite {
                    binding: 0,
                    array_element: 0,
                    descriptor_type: vk::DescriptorType::SAMPLER,
                    resources: vec![Handle(60)],
                });
            })
            .unwrap();
        session.advance_frame();
        session.advance_frame();

        let packets = sink.packets();
        assert!(position(&packets, "vkAllocateDescriptorSets", Handle(41)) < position(&packets, "vkUpdateDescriptorSets", Handle(41)));
    }
}
