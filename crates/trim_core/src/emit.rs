//! Writers for the three parts of a trimmed stream: the calls that rebuild the
//! snapshot, the calls captured inside the window, and the teardown.

use crate::error::{PacketError, TrimError};
use crate::handle::{Handle, ObjectCategory};
use crate::object::{ObjectInfo, ObjectPayload};
use crate::packet::generate::{self, StagingResources};
use crate::packet::{Packet, PacketSink};
use crate::session::ImageCreationPolicy;
use crate::tracker::StateTracker;
use ash::vk;
use std::collections::{HashMap, HashSet};

/// Staging objects get handles from a range real drivers do not hand out.
const STAGING_HANDLE_BASE: u64 = 0xffff_ff00_0000_0000;

const COMMAND_BUFFER_LEVELS: [vk::CommandBufferLevel; 2] = [
    vk::CommandBufferLevel::PRIMARY,
    vk::CommandBufferLevel::SECONDARY,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrimStats {
    pub objects_snapshotted: usize,
    pub packets_written: usize,
    /// Synthesized packets that could not be built and were left out.
    pub packets_skipped: usize,
    pub packets_released: usize,
}

struct Emitter<'a> {
    sink: &'a mut dyn PacketSink,
    written: usize,
    skipped: usize,
    next_staging: u64,
}

impl<'a> Emitter<'a> {
    fn new(sink: &'a mut dyn PacketSink) -> Self {
        Self {
            sink,
            written: 0,
            skipped: 0,
            next_staging: STAGING_HANDLE_BASE,
        }
    }

    fn write(&mut self, packet: &Packet) -> Result<(), TrimError> {
        self.sink.write_packet(packet)?;
        self.written += 1;
        Ok(())
    }

    fn write_each<'p>(&mut self, packets: impl IntoIterator<Item = &'p Packet>) -> Result<(), TrimError> {
        for packet in packets {
            self.write(packet)?;
        }
        Ok(())
    }

    /// A packet that failed to build is logged and left out; the stream goes on.
    fn write_synthesized<P>(&mut self, packets: Result<P, PacketError>) -> Result<(), TrimError>
    where
        P: IntoIterator<Item = Packet>,
    {
        match packets {
            Ok(packets) => {
                for packet in packets {
                    self.write(&packet)?;
                }
            }
            Err(err) => {
                self.skipped += 1;
                tracing::error!(error = %err, "skipping synthesized packet");
            }
        }
        Ok(())
    }

    fn staging(&mut self, tracker: &StateTracker, device: Handle, size: u64) -> StagingResources {
        let buffer = Handle(self.next_staging);
        let memory = Handle(self.next_staging + 1);
        self.next_staging += 2;
        StagingResources {
            buffer,
            memory,
            memory_type_index: tracker.find_memory_type_index(
                device,
                !0,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            ),
            size,
        }
    }

    fn stats(&self) -> TrimStats {
        TrimStats {
            packets_written: self.written,
            packets_skipped: self.skipped,
            ..TrimStats::default()
        }
    }
}

fn referenced(tracker: &StateTracker, category: ObjectCategory) -> impl Iterator<Item = &ObjectInfo> {
    tracker
        .iter(category)
        .into_iter()
        .filter(|info| info.is_referenced())
}

fn is_host_visible(tracker: &StateTracker, memory: Handle) -> bool {
    tracker
        .get(memory)
        .and_then(|info| info.payload.as_device_memory())
        .is_some_and(|state| state.property_flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE))
}

fn is_swapchain_image(info: &ObjectInfo) -> bool {
    info.payload
        .as_image()
        .is_some_and(|image| image.is_swapchain_image)
}

/// Creation packet (captured, or rebuilt from the record) plus follow-up packets.
fn write_creation(out: &mut Emitter<'_>, info: &ObjectInfo) -> Result<(), TrimError> {
    match &info.create_packet {
        Some(packet) => out.write(packet)?,
        // Physical devices come back through the instance's enumerate calls.
        None if info.category() == ObjectCategory::PhysicalDevice => {}
        None => {
            tracing::debug!(category = %info.category(), handle = %info.handle(), "rebuilding creation packet");
            out.write_synthesized(generate::recreate(info).map(Some))?;
        }
    }
    out.write_each(&info.setup_packets)
}

fn write_objects(out: &mut Emitter<'_>, tracker: &StateTracker, category: ObjectCategory) -> Result<(), TrimError> {
    for info in referenced(tracker, category) {
        write_creation(out, info)?;
    }
    Ok(())
}

fn write_command_pools(out: &mut Emitter<'_>, tracker: &StateTracker) -> Result<(), TrimError> {
    for info in referenced(tracker, ObjectCategory::CommandPool) {
        write_creation(out, info)?;
        let Some(pool) = info.payload.as_command_pool() else {
            continue;
        };
        let device = info.owning_device.unwrap_or_default();
        for level in COMMAND_BUFFER_LEVELS {
            let buffers = command_buffers_of(tracker, info.handle(), level);
            if buffers.is_empty() {
                continue;
            }
            tracing::trace!(
                pool = %info.handle(),
                allocated = pool.allocated(level),
                referenced = buffers.len(),
                "reallocating command buffers"
            );
            out.write_synthesized(
                generate::allocate_command_buffers(device, info.handle(), level, &buffers).map(Some),
            )?;
        }
    }
    Ok(())
}

fn write_image_packets(out: &mut Emitter<'_>, info: &ObjectInfo) -> Result<(), TrimError> {
    write_creation(out, info)?;
    if let Some(image) = info.payload.as_image() {
        out.write_each(&image.memory_requirements_packet)?;
        out.write_each(&image.bind_packet)?;
    }
    Ok(())
}

fn write_images(
    out: &mut Emitter<'_>,
    tracker: &StateTracker,
    policy: ImageCreationPolicy,
) -> Result<(), TrimError> {
    let images: Vec<&ObjectInfo> = referenced(tracker, ObjectCategory::Image)
        .filter(|info| !is_swapchain_image(info))
        .collect();

    // Host-visible contents go straight through a map/unmap of the backing memory.
    for info in &images {
        let (Some(image), Some(device)) = (info.payload.as_image(), info.owning_device) else {
            continue;
        };
        if let Some(memory) = image.memory {
            if !image.needs_staging && is_host_visible(tracker, memory) {
                out.write_synthesized(generate::map_unmap(
                    device,
                    memory,
                    image.memory_offset,
                    image.memory_size,
                ))?;
            }
        }
    }

    match policy {
        ImageCreationPolicy::Ordered => {
            out.write_each(tracker.image_calls())?;
            // Images the ordered list never mentioned still need to exist.
            for info in &images {
                if !tracker.image_calls().iter().any(|p| p.touches(info.handle())) {
                    write_image_packets(out, info)?;
                }
            }
        }
        ImageCreationPolicy::Unordered => {
            for info in &images {
                write_image_packets(out, info)?;
            }
        }
    }

    for info in &images {
        let Some(image) = info.payload.as_image() else {
            continue;
        };
        let Some(device) = info.owning_device else {
            tracing::warn!(image = %info.handle(), "image has no owning device, skipping its contents");
            continue;
        };
        if image.needs_staging {
            let staging = out.staging(tracker, device, image.memory_size);
            out.write_synthesized(generate::staged_image_upload(device, info.handle(), image, staging))?;
        } else if image.most_recent_layout != vk::ImageLayout::UNDEFINED
            && image.most_recent_layout != image.initial_layout
        {
            out.write_synthesized(
                generate::transition_image(
                    device,
                    info.handle(),
                    image,
                    image.initial_layout,
                    image.most_recent_layout,
                )
                .map(Some),
            )?;
        }
    }
    Ok(())
}

fn write_buffers(out: &mut Emitter<'_>, tracker: &StateTracker) -> Result<(), TrimError> {
    for info in referenced(tracker, ObjectCategory::Buffer) {
        write_creation(out, info)?;
        let Some(buffer) = info.payload.as_buffer() else {
            continue;
        };
        out.write_each(&buffer.bind_packet)?;

        let (Some(device), Some(memory)) = (info.owning_device, buffer.memory) else {
            continue;
        };
        if buffer.needs_staging {
            let staging = out.staging(tracker, device, buffer.size);
            out.write_synthesized(generate::staged_buffer_upload(device, info.handle(), buffer, staging))?;
        } else if is_host_visible(tracker, memory) {
            out.write_synthesized(generate::map_unmap(device, memory, buffer.memory_offset, buffer.size))?;
        }
    }

    // Mappings the application still holds when the window opens.
    for info in referenced(tracker, ObjectCategory::DeviceMemory) {
        let Some(memory) = info.payload.as_device_memory() else {
            continue;
        };
        let Some(mapping) = memory.mapping else {
            continue;
        };
        match &memory.persistent_map_packet {
            Some(packet) => out.write(packet)?,
            None => out.write_synthesized(
                generate::map_memory(
                    info.owning_device.unwrap_or_default(),
                    info.handle(),
                    mapping.offset,
                    mapping.size,
                )
                .map(Some),
            )?,
        }
    }
    Ok(())
}

fn write_descriptor_pools(out: &mut Emitter<'_>, tracker: &StateTracker) -> Result<(), TrimError> {
    let sets: Vec<&ObjectInfo> = referenced(tracker, ObjectCategory::DescriptorSet).collect();
    for info in referenced(tracker, ObjectCategory::DescriptorPool) {
        write_creation(out, info)?;
        let allocated: Vec<(Handle, Handle)> = sets
            .iter()
            .filter_map(|set| {
                let state = set.payload.as_descriptor_set()?;
                (state.pool == info.handle()).then_some((set.handle(), state.layout))
            })
            .collect();
        if !allocated.is_empty() {
            let device = info.owning_device.unwrap_or_default();
            out.write_synthesized(
                generate::allocate_descriptor_sets(device, info.handle(), &allocated).map(Some),
            )?;
        }
    }
    Ok(())
}

/// One update call per device, covering every set with recorded writes or copies.
fn write_descriptor_updates(out: &mut Emitter<'_>, tracker: &StateTracker) -> Result<(), TrimError> {
    let mut devices: Vec<Handle> = Vec::new();
    let mut per_device: HashMap<Handle, Vec<(Handle, &crate::object::DescriptorSetState)>> = HashMap::new();
    for info in referenced(tracker, ObjectCategory::DescriptorSet) {
        let Some(state) = info.payload.as_descriptor_set() else {
            continue;
        };
        if !state.has_updates() {
            continue;
        }
        let device = info.owning_device.unwrap_or_default();
        if !per_device.contains_key(&device) {
            devices.push(device);
        }
        per_device.entry(device).or_default().push((info.handle(), state));
    }
    for device in devices {
        if let Some(sets) = per_device.get(&device) {
            out.write_synthesized(generate::update_descriptor_sets(device, sets).map(Some))?;
        }
    }
    Ok(())
}

/// Calls recorded into command buffers before the window. Unreferenced streams are not written.
fn write_command_buffer_calls(out: &mut Emitter<'_>, tracker: &StateTracker) -> Result<(), TrimError> {
    for info in referenced(tracker, ObjectCategory::CommandBuffer) {
        if let Some(cb) = info.payload.as_command_buffer() {
            out.write_each(&cb.calls)?;
        }
    }
    Ok(())
}

/// Empty submissions that put semaphores and fences back into their pending state.
fn write_signal_submits(out: &mut Emitter<'_>, tracker: &StateTracker) -> Result<(), TrimError> {
    for info in referenced(tracker, ObjectCategory::Semaphore) {
        let Some(queue) = info.payload.as_semaphore().and_then(|s| s.signaled_on_queue) else {
            continue;
        };
        let device = info.owning_device.unwrap_or_default();
        out.write_synthesized(generate::queue_submit(device, queue, &[info.handle()], None).map(Some))?;
    }
    for info in referenced(tracker, ObjectCategory::Fence) {
        let Some(queue) = info.payload.as_fence().and_then(|f| f.pending_on_queue) else {
            continue;
        };
        let device = info.owning_device.unwrap_or_default();
        out.write_synthesized(generate::queue_submit(device, queue, &[], Some(info.handle())).map(Some))?;
    }
    Ok(())
}

/// Write the calls that recreate every referenced object of `tracker`, in creation order.
pub fn write_all_referenced_object_calls(
    tracker: &StateTracker,
    policy: ImageCreationPolicy,
    sink: &mut dyn PacketSink,
) -> Result<TrimStats, TrimError> {
    let mut out = Emitter::new(sink);
    for category in ObjectCategory::CREATION_ORDER {
        match category {
            ObjectCategory::CommandPool => write_command_pools(&mut out, tracker)?,
            ObjectCategory::Image => write_images(&mut out, tracker, policy)?,
            ObjectCategory::Buffer => write_buffers(&mut out, tracker)?,
            ObjectCategory::DescriptorPool => write_descriptor_pools(&mut out, tracker)?,
            ObjectCategory::DescriptorSet => write_descriptor_updates(&mut out, tracker)?,
            ObjectCategory::CommandBuffer => write_command_buffer_calls(&mut out, tracker)?,
            _ => write_objects(&mut out, tracker, category)?,
        }
    }
    write_signal_submits(&mut out, tracker)?;
    tracing::debug!(written = out.written, skipped = out.skipped, "wrote snapshot objects");
    Ok(out.stats())
}

/// Objects created inside the window whose creation call is not among `recorded`.
///
/// A captured creation packet counts as recorded when an identical packet was
/// recorded. An object without one counts as recorded when any recorded packet
/// touches it, since the first such packet is the call that returned it.
fn uncaptured_creations(recorded: &[Packet], snapshot: &StateTracker, live: &StateTracker) -> HashSet<Handle> {
    live.iter_all()
        .filter(|info| info.is_referenced() && snapshot.get(info.handle()).is_none())
        .filter(|info| !is_swapchain_image(info))
        .filter(|info| match &info.create_packet {
            Some(create) => !recorded.contains(create),
            None => !recorded.iter().any(|packet| packet.touches(info.handle())),
        })
        .map(ObjectInfo::handle)
        .collect()
}

/// Write the creation of `handle` if it is still pending, owners and dependencies first.
fn write_pending_creation(
    out: &mut Emitter<'_>,
    live: &StateTracker,
    pending: &mut HashSet<Handle>,
    handle: Handle,
) -> Result<(), TrimError> {
    if !pending.remove(&handle) {
        return Ok(());
    }
    let Some(info) = live.get(handle) else {
        return Ok(());
    };
    for dependency in info.owners().chain(info.payload.dependencies()) {
        write_pending_creation(out, live, pending, dependency)?;
    }
    tracing::debug!(category = %info.category(), %handle, "writing uncaptured creation");
    write_creation(out, info)
}

/// Write the packets captured inside the window, in arrival order.
///
/// Objects created inside the window whose creation call never reached the
/// recorder get it written right before the first recorded packet that uses
/// them, or after the last recorded packet when none does.
pub fn write_recorded_packets(
    recorded: &[Packet],
    snapshot: &StateTracker,
    live: &StateTracker,
    sink: &mut dyn PacketSink,
) -> Result<TrimStats, TrimError> {
    let mut out = Emitter::new(sink);
    let mut pending = uncaptured_creations(recorded, snapshot, live);
    for packet in recorded {
        for &handle in packet.references() {
            write_pending_creation(&mut out, live, &mut pending, handle)?;
        }
        out.write(packet)?;
    }
    let remaining: Vec<Handle> = live
        .iter_all()
        .map(ObjectInfo::handle)
        .filter(|handle| pending.contains(handle))
        .collect();
    for handle in remaining {
        write_pending_creation(&mut out, live, &mut pending, handle)?;
    }
    Ok(out.stats())
}

fn command_buffers_of(tracker: &StateTracker, pool: Handle, level: vk::CommandBufferLevel) -> Vec<Handle> {
    referenced(tracker, ObjectCategory::CommandBuffer)
        .filter(|info| {
            info.payload
                .as_command_buffer()
                .is_some_and(|cb| cb.pool == pool && cb.level == level)
        })
        .map(ObjectInfo::handle)
        .collect()
}

/// Write teardown calls for every referenced object still alive in `tracker`,
/// children before parents.
pub fn write_destroy_packets(tracker: &StateTracker, sink: &mut dyn PacketSink) -> Result<usize, TrimError> {
    let mut out = Emitter::new(sink);

    for info in referenced(tracker, ObjectCategory::Queue) {
        let device = info.owning_device.unwrap_or_default();
        out.write_synthesized(generate::queue_wait_idle(device, info.handle()).map(Some))?;
    }

    for category in ObjectCategory::DESTRUCTION_ORDER {
        let objects: Vec<&ObjectInfo> = referenced(tracker, category).collect();
        for info in objects.into_iter().rev() {
            let device = info.owning_device.unwrap_or_default();
            match &info.payload {
                ObjectPayload::Image(image) if image.is_swapchain_image => continue,
                ObjectPayload::DescriptorPool(_) => {
                    out.write_synthesized(generate::reset_descriptor_pool(device, info.handle()).map(Some))?;
                }
                ObjectPayload::CommandPool(_) => {
                    for level in COMMAND_BUFFER_LEVELS {
                        let buffers = command_buffers_of(tracker, info.handle(), level);
                        if !buffers.is_empty() {
                            out.write_synthesized(
                                generate::free_command_buffers(device, info.handle(), level, &buffers)
                                    .map(Some),
                            )?;
                        }
                    }
                }
                _ => {}
            }
            if let Some(packet) = generate::destroy(info) {
                out.write_synthesized(packet.map(Some))?;
            }
        }
    }

    tracing::debug!(written = out.written, "wrote destroy packets");
    Ok(out.written)
}
