//! Reference recording: which tracked objects the trim window touches, and the
//! per-command-buffer state that decides it.

use crate::handle::{Handle, ObjectCategory};
use crate::object::{BufferTransition, ImageTransition};
use crate::packet::{Packet, PacketRecorder};
use crate::tracker::StateTracker;
use std::collections::HashSet;

impl StateTracker {
    /// Mark `handle` referenced, along with its owners and everything its
    /// recreation depends on. Returns how many records were newly marked.
    ///
    /// Untracked handles are ignored. Marking twice has no further effect.
    pub fn mark_referenced(&mut self, handle: Handle) -> usize {
        let mut worklist = vec![handle];
        let mut marked = 0;
        while let Some(next) = worklist.pop() {
            let Some(info) = self.get_mut(next) else {
                continue;
            };
            if !info.mark_referenced() {
                continue;
            }
            marked += 1;
            worklist.extend(info.owners());
            worklist.extend(info.payload.dependencies());
        }
        marked
    }

    /// Mark a command buffer and every object its recorded calls touch,
    /// following executed secondary command buffers.
    pub fn mark_command_buffer_referenced(&mut self, command_buffer: Handle) -> usize {
        let mut marked = self.mark_referenced(command_buffer);
        let mut pending = vec![command_buffer];
        let mut visited = HashSet::new();

        while let Some(cb) = pending.pop() {
            if !visited.insert(cb) {
                continue;
            }
            let Some(state) = self
                .get_in(ObjectCategory::CommandBuffer, cb)
                .and_then(|info| info.payload.as_command_buffer())
            else {
                continue;
            };
            let touched: Vec<Handle> = state
                .calls
                .iter()
                .flat_map(|packet| packet.references().iter().copied())
                .collect();

            for handle in touched {
                if handle != cb && self.category_of(handle) == Some(ObjectCategory::CommandBuffer) {
                    pending.push(handle);
                }
                marked += self.mark_referenced(handle);
            }
        }
        marked
    }

    /// Append a recorded call to a command buffer's stream. An untracked
    /// command buffer hands the packet back.
    pub fn append_command_buffer_call(&mut self, command_buffer: Handle, packet: Packet) -> Result<(), Packet> {
        match self
            .get_in_mut(ObjectCategory::CommandBuffer, command_buffer)
            .and_then(|info| info.payload.as_command_buffer_mut())
        {
            Some(state) => {
                state.calls.push(packet);
                Ok(())
            }
            None => Err(packet),
        }
    }

    /// Drop a command buffer's recorded stream and pending transitions, as on
    /// reset or begin. Returns how many packets were released.
    pub fn clear_command_buffer_calls(&mut self, command_buffer: Handle, recorder: &mut PacketRecorder) -> usize {
        let Some(state) = self
            .get_in_mut(ObjectCategory::CommandBuffer, command_buffer)
            .and_then(|info| info.payload.as_command_buffer_mut())
        else {
            return 0;
        };
        state.image_transitions.clear();
        state.buffer_transitions.clear();
        state.active_render_pass = None;
        recorder.release(std::mem::take(&mut state.calls))
    }

    /// Reset a descriptor pool: its sets stop being tracked, with no per-set
    /// destroy. Returns the handles of the sets that were dropped.
    pub fn reset_descriptor_pool(&mut self, pool: Handle, recorder: &mut PacketRecorder) -> Vec<Handle> {
        match self
            .get_in_mut(ObjectCategory::DescriptorPool, pool)
            .and_then(|info| info.payload.as_descriptor_pool_mut())
        {
            Some(state) => state.allocated_sets = 0,
            None => {
                tracing::debug!(%pool, "reset of untracked descriptor pool");
                return Vec::new();
            }
        }

        let sets: Vec<Handle> = self
            .iter(ObjectCategory::DescriptorSet)
            .into_iter()
            .filter(|info| info.payload.as_descriptor_set().is_some_and(|set| set.pool == pool))
            .map(|info| info.handle())
            .collect();
        for &set in &sets {
            self.remove(set, recorder);
        }
        tracing::trace!(%pool, sets = sets.len(), "descriptor pool reset");
        sets
    }

    pub fn add_image_transition(&mut self, command_buffer: Handle, transition: ImageTransition) -> bool {
        match self
            .get_in_mut(ObjectCategory::CommandBuffer, command_buffer)
            .and_then(|info| info.payload.as_command_buffer_mut())
        {
            Some(state) => {
                state.image_transitions.push(transition);
                true
            }
            None => false,
        }
    }

    pub fn add_buffer_transition(&mut self, command_buffer: Handle, transition: BufferTransition) -> bool {
        match self
            .get_in_mut(ObjectCategory::CommandBuffer, command_buffer)
            .and_then(|info| info.payload.as_command_buffer_mut())
        {
            Some(state) => {
                state.buffer_transitions.push(transition);
                true
            }
            None => false,
        }
    }

    /// Apply a submitted command buffer's cached transitions to the images and
    /// buffers they name. Returns how many were applied.
    pub fn apply_command_buffer_transitions(&mut self, command_buffer: Handle) -> usize {
        let Some(state) = self
            .get_in(ObjectCategory::CommandBuffer, command_buffer)
            .and_then(|info| info.payload.as_command_buffer())
        else {
            return 0;
        };
        let images = state.image_transitions.clone();
        let buffers = state.buffer_transitions.clone();

        let mut applied = 0;
        for transition in images {
            if let Some(image) = self
                .get_in_mut(ObjectCategory::Image, transition.image)
                .and_then(|info| info.payload.as_image_mut())
            {
                image.most_recent_layout = transition.new_layout;
                image.access_flags = transition.dst_access;
                applied += 1;
            }
        }
        for transition in buffers {
            if let Some(buffer) = self
                .get_in_mut(ObjectCategory::Buffer, transition.buffer)
                .and_then(|info| info.payload.as_buffer_mut())
            {
                buffer.access_flags = transition.dst_access;
                applied += 1;
            }
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    fn call(name: &'static str, handles: &[Handle]) -> Packet {
        Packet::captured(name, handles.to_vec(), Vec::new())
    }

    /// Instance 1, device 3, command pool 30, primary 31, secondary 32, image 20 bound to memory 10.
    fn tracker() -> StateTracker {
        let mut tracker = StateTracker::new();
        tracker.add(ObjectCategory::Instance, Handle(1)).unwrap();
        tracker
            .add(ObjectCategory::Device, Handle(3))
            .unwrap()
            .set_owners(Handle(1), Handle::NULL, Handle::NULL);
        for (category, raw) in [
            (ObjectCategory::CommandPool, 30),
            (ObjectCategory::CommandBuffer, 31),
            (ObjectCategory::CommandBuffer, 32),
            (ObjectCategory::DeviceMemory, 10),
            (ObjectCategory::Image, 20),
            (ObjectCategory::Buffer, 21),
        ] {
            tracker
                .add(category, Handle(raw))
                .unwrap()
                .set_owners(Handle(1), Handle::NULL, Handle(3));
        }
        for cb in [31, 32] {
            tracker
                .get_mut(Handle(cb))
                .unwrap()
                .payload
                .as_command_buffer_mut()
                .unwrap()
                .pool = Handle(30);
        }
        tracker
            .get_mut(Handle(20))
            .unwrap()
            .payload
            .as_image_mut()
            .unwrap()
            .memory = Some(Handle(10));
        tracker
    }

    fn is_referenced(tracker: &StateTracker, raw: u64) -> bool {
        tracker.get(Handle(raw)).unwrap().is_referenced()
    }

    #[test]
    fn marking_pulls_in_owners_and_dependencies() {
        let mut tracker = tracker();
        assert_eq!(tracker.mark_referenced(Handle(20)), 4);
        for raw in [1, 3, 10, 20] {
            assert!(is_referenced(&tracker, raw), "{raw}");
        }
        assert!(!is_referenced(&tracker, 30));
    }

    #[test]
    fn marking_is_idempotent() {
        let mut tracker = tracker();
        tracker.mark_referenced(Handle(21));
        let marked: Vec<Handle> = tracker
            .iter_all()
            .filter(|info| info.is_referenced())
            .map(|info| info.handle())
            .collect();

        assert_eq!(tracker.mark_referenced(Handle(21)), 0);
        let again: Vec<Handle> = tracker
            .iter_all()
            .filter(|info| info.is_referenced())
            .map(|info| info.handle())
            .collect();
        assert_eq!(marked, again);
        assert_eq!(tracker.mark_referenced(Handle(999)), 0);
    }

    #[test]
    fn command_buffer_marking_follows_recorded_calls() {
        let mut tracker = tracker();
        tracker
            .append_command_buffer_call(Handle(32), call("vkCmdCopyBuffer", &[Handle(32), Handle(21)]))
            .unwrap();
        tracker
            .append_command_buffer_call(Handle(31), call("vkCmdClearColorImage", &[Handle(31), Handle(20)]))
            .unwrap();
        tracker
            .append_command_buffer_call(Handle(31), call("vkCmdExecuteCommands", &[Handle(31), Handle(32)]))
            .unwrap();

        tracker.mark_command_buffer_referenced(Handle(31));
        for raw in [31, 30, 20, 10, 32, 21] {
            assert!(is_referenced(&tracker, raw), "{raw}");
        }
    }

    #[test]
    fn calls_on_untracked_command_buffers_come_back() {
        let mut tracker = tracker();
        let packet = call("vkCmdDraw", &[Handle(77)]);
        let returned = tracker.append_command_buffer_call(Handle(77), packet).unwrap_err();
        assert_eq!(returned.call(), "vkCmdDraw");
    }

    #[test]
    fn clearing_calls_releases_them() {
        let mut tracker = tracker();
        let mut recorder = PacketRecorder::new();
        tracker
            .append_command_buffer_call(Handle(31), call("vkCmdDraw", &[Handle(31)]))
            .unwrap();
        tracker.add_image_transition(Handle(31), ImageTransition {
            image: Handle(20),
            old_layout: vk::ImageLayout::UNDEFINED,
            new_layout: vk::ImageLayout::GENERAL,
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::SHADER_WRITE,
        });

        assert_eq!(tracker.clear_command_buffer_calls(Handle(31), &mut recorder), 1);
        assert_eq!(recorder.released_count(), 1);
        assert_eq!(tracker.apply_command_buffer_transitions(Handle(31)), 0);
    }

    #[test]
    fn submitted_transitions_update_images_and_buffers() {
        let mut tracker = tracker();
        tracker.add_image_transition(Handle(31), ImageTransition {
            image: Handle(20),
            old_layout: vk::ImageLayout::UNDEFINED,
            new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::SHADER_READ,
        });
        tracker.add_buffer_transition(Handle(31), BufferTransition {
            buffer: Handle(21),
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::UNIFORM_READ,
        });
        assert!(!tracker.add_buffer_transition(Handle(99), BufferTransition {
            buffer: Handle(21),
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::empty(),
        }));

        assert_eq!(tracker.apply_command_buffer_transitions(Handle(31)), 2);
        let image = tracker.get(Handle(20)).unwrap().payload.as_image().unwrap();
        assert_eq!(image.most_recent_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        let buffer = tracker.get(Handle(21)).unwrap().payload.as_buffer().unwrap();
        assert_eq!(buffer.access_flags, vk::AccessFlags::UNIFORM_READ);
    }

    #[test]
    fn pool_reset_drops_sets_without_destroying_them() {
        let mut tracker = tracker();
        let mut recorder = PacketRecorder::new();
        tracker
            .add(ObjectCategory::DescriptorPool, Handle(40))
            .unwrap()
            .payload
            .as_descriptor_pool_mut()
            .unwrap()
            .allocated_sets = 2;
        for (set, pool) in [(41, 40), (42, 40), (43, 44)] {
            let info = tracker.add(ObjectCategory::DescriptorSet, Handle(set)).unwrap();
            info.create_packet = Some(call("vkAllocateDescriptorSets", &[Handle(set)]));
            info.payload.as_descriptor_set_mut().unwrap().pool = Handle(pool);
        }

        let dropped = tracker.reset_descriptor_pool(Handle(40), &mut recorder);
        assert_eq!(dropped, vec![Handle(41), Handle(42)]);
        assert!(tracker.get(Handle(41)).is_none());
        assert!(tracker.get(Handle(43)).is_some());
        assert_eq!(recorder.released_count(), 2);
        let pool = tracker.get(Handle(40)).unwrap().payload.as_descriptor_pool().unwrap();
        assert_eq!(pool.allocated_sets, 0);
        assert!(tracker.reset_descriptor_pool(Handle(99), &mut recorder).is_empty());
    }
}
