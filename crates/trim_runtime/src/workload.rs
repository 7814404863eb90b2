//! Scripted application workload
//!
//! Plays the part of an application plus its interception layer: creates a
//! small device worth of objects, records one command buffer, then submits
//! and presents it every frame.

use anyhow::Result;
use ash::vk;
use trim_core::object::{DescriptorWrite, ImageTransition, MemoryMapping, MemoryType};
use trim_core::{Handle, ObjectCategory, ObjectInfo, Packet, TrimSession};

const IMAGE_EXTENT: vk::Extent3D = vk::Extent3D {
    width: 256,
    height: 256,
    depth: 1,
};

fn call(name: &'static str, handles: &[Handle]) -> Packet {
    Packet::captured(name, handles.to_vec(), Vec::new())
}

pub struct ScriptedApp {
    next_handle: u64,
    frame: u64,
    instance: Handle,
    physical_device: Handle,
    device: Handle,
    queue: Handle,
    command_buffer: Handle,
    image: Handle,
    buffer: Handle,
    descriptor_set: Handle,
    fence: Handle,
}

impl ScriptedApp {
    /// Create every long-lived object the workload uses.
    pub fn start(session: &TrimSession) -> Result<Self> {
        let mut app = Self {
            next_handle: 0x1000,
            frame: 0,
            instance: Handle::NULL,
            physical_device: Handle::NULL,
            device: Handle::NULL,
            queue: Handle::NULL,
            command_buffer: Handle::NULL,
            image: Handle::NULL,
            buffer: Handle::NULL,
            descriptor_set: Handle::NULL,
            fence: Handle::NULL,
        };
        app.create_device(session)?;
        app.create_resources(session)?;
        app.create_descriptors(session)?;
        app.record_command_buffer(session)?;
        tracing::info!(objects = session.with_tracker(|t| t.len()), "workload started");
        Ok(app)
    }

    fn allocate(&mut self) -> Handle {
        self.next_handle += 0x10;
        Handle(self.next_handle)
    }

    /// Track a device-level object whose creation call is `create`.
    fn create_on_device(
        &mut self,
        session: &TrimSession,
        category: ObjectCategory,
        create: &'static str,
        populate: impl FnOnce(&mut ObjectInfo),
    ) -> Result<Handle> {
        let handle = self.allocate();
        let packet = call(create, &[self.device, handle]);
        let (instance, physical_device, device) = (self.instance, self.physical_device, self.device);
        session.add(category, handle, |info| {
            info.set_owners(instance, physical_device, device);
            info.create_packet = Some(packet.clone());
            populate(info);
        })?;
        session.record(packet);
        Ok(handle)
    }

    fn create_device(&mut self, session: &TrimSession) -> Result<()> {
        self.instance = self.allocate();
        self.physical_device = self.allocate();
        self.device = self.allocate();
        let (instance, physical_device, device) = (self.instance, self.physical_device, self.device);

        session.add(ObjectCategory::Instance, instance, |info| {
            info.create_packet = Some(call("vkCreateInstance", &[instance]));
            info.setup_packets
                .push(call("vkEnumeratePhysicalDevices", &[instance, physical_device]));
        })?;
        session.add(ObjectCategory::PhysicalDevice, physical_device, |info| {
            info.set_owners(instance, Handle::NULL, Handle::NULL);
            info.setup_packets
                .push(call("vkGetPhysicalDeviceMemoryProperties", &[physical_device]));
            if let Some(state) = info.payload.as_physical_device_mut() {
                state.queue_family_count = 1;
                state.memory_types = vec![
                    MemoryType {
                        property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
                        heap_index: 0,
                    },
                    MemoryType {
                        property_flags: vk::MemoryPropertyFlags::HOST_VISIBLE
                            | vk::MemoryPropertyFlags::HOST_COHERENT,
                        heap_index: 1,
                    },
                ];
            }
        })?;
        session.add(ObjectCategory::Device, device, |info| {
            info.set_owners(instance, physical_device, Handle::NULL);
            info.create_packet = Some(call("vkCreateDevice", &[physical_device, device]));
        })?;
        self.queue = self.create_on_device(session, ObjectCategory::Queue, "vkGetDeviceQueue", |_| {})?;
        Ok(())
    }

    fn create_memory(&mut self, session: &TrimSession, type_index: u32, size: u64) -> Result<Handle> {
        let flags = session
            .lookup_memory_properties(self.device, type_index)
            .unwrap_or_default();
        self.create_on_device(session, ObjectCategory::DeviceMemory, "vkAllocateMemory", |info| {
            if let Some(memory) = info.payload.as_device_memory_mut() {
                memory.size = size;
                memory.memory_type_index = type_index;
                memory.property_flags = flags;
            }
        })
    }

    fn create_resources(&mut self, session: &TrimSession) -> Result<()> {
        let device_local = session.find_memory_type_index(self.device, !0, vk::MemoryPropertyFlags::DEVICE_LOCAL);
        let host_visible = session.find_memory_type_index(self.device, !0, vk::MemoryPropertyFlags::HOST_VISIBLE);
        let image_memory = self.create_memory(session, device_local, 1 << 20)?;
        let buffer_memory = self.create_memory(session, host_visible, 1 << 16)?;

        let device = self.device;
        let needs_staging = session.is_device_only_memory(device, image_memory);
        self.image = self.create_on_device(session, ObjectCategory::Image, "vkCreateImage", |info| {
            let handle = info.handle();
            if let Some(image) = info.payload.as_image_mut() {
                image.describe(vk::Format::R8G8B8A8_UNORM, IMAGE_EXTENT, 1, 1, vk::ImageLayout::UNDEFINED);
                image.memory = Some(image_memory);
                image.memory_size = 1 << 18;
                image.needs_staging = needs_staging;
                image.bind_packet = Some(call("vkBindImageMemory", &[device, handle, image_memory]));
            }
        })?;
        if let Some(create) = session.inspect(self.image, |info| info.create_packet.clone()).flatten() {
            session.add_image_call(create);
        }
        session.add_image_call(call("vkBindImageMemory", &[device, self.image, image_memory]));

        self.buffer = self.create_on_device(session, ObjectCategory::Buffer, "vkCreateBuffer", |info| {
            let handle = info.handle();
            if let Some(buffer) = info.payload.as_buffer_mut() {
                buffer.size = 1 << 16;
                buffer.memory = Some(buffer_memory);
                buffer.bind_packet = Some(call("vkBindBufferMemory", &[device, handle, buffer_memory]));
            }
        })?;

        // The uniform buffer stays mapped for the whole run.
        session.update(buffer_memory, |info| {
            if let Some(memory) = info.payload.as_device_memory_mut() {
                memory.mapping = Some(MemoryMapping { offset: 0, size: 1 << 16 });
                memory.persistent_map_packet = Some(call("vkMapMemory", &[device, buffer_memory]));
            }
        });

        self.fence = self.create_on_device(session, ObjectCategory::Fence, "vkCreateFence", |_| {})?;
        Ok(())
    }

    fn create_descriptors(&mut self, session: &TrimSession) -> Result<()> {
        let layout = self.create_on_device(
            session,
            ObjectCategory::DescriptorSetLayout,
            "vkCreateDescriptorSetLayout",
            |_| {},
        )?;
        let pool = self.create_on_device(session, ObjectCategory::DescriptorPool, "vkCreateDescriptorPool", |info| {
            if let Some(pool) = info.payload.as_descriptor_pool_mut() {
                pool.max_sets = 4;
                pool.allocated_sets = 1;
            }
        })?;
        let buffer = self.buffer;
        self.descriptor_set =
            self.create_on_device(session, ObjectCategory::DescriptorSet, "vkAllocateDescriptorSets", |info| {
                if let Some(set) = info.payload.as_descriptor_set_mut() {
                    set.pool = pool;
                    set.layout = layout;
                    set.record_write(DescriptorWrite {
                        binding: 0,
                        array_element: 0,
                        descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                        resources: vec![buffer],
                    });
                }
            })?;
        Ok(())
    }

    fn record_command_buffer(&mut self, session: &TrimSession) -> Result<()> {
        let pool = self.create_on_device(session, ObjectCategory::CommandPool, "vkCreateCommandPool", |info| {
            if let Some(pool) = info.payload.as_command_pool_mut() {
                pool.note_allocated(vk::CommandBufferLevel::PRIMARY, 1);
            }
        })?;
        let cb = self.create_on_device(session, ObjectCategory::CommandBuffer, "vkAllocateCommandBuffers", |info| {
            if let Some(cb) = info.payload.as_command_buffer_mut() {
                cb.pool = pool;
                cb.level = vk::CommandBufferLevel::PRIMARY;
            }
        })?;
        self.command_buffer = cb;

        session.clear_command_buffer_calls(cb);
        for packet in [
            call("vkBeginCommandBuffer", &[cb]),
            call("vkCmdPipelineBarrier", &[cb, self.image]),
            call("vkCmdCopyBufferToImage", &[cb, self.buffer, self.image]),
            call("vkCmdBindDescriptorSets", &[cb, self.descriptor_set]),
            call("vkEndCommandBuffer", &[cb]),
        ] {
            session.append_command_buffer_call(cb, packet);
        }
        session.add_image_transition(
            cb,
            ImageTransition {
                image: self.image,
                old_layout: vk::ImageLayout::UNDEFINED,
                new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::SHADER_READ,
            },
        );
        Ok(())
    }

    /// One frame: submit, wait, present. Every third frame also churns a sampler.
    pub fn frame(&mut self, session: &TrimSession) -> Result<()> {
        self.frame += 1;
        let (queue, cb, fence, device) = (self.queue, self.command_buffer, self.fence, self.device);

        session.record(call("vkQueueSubmit", &[queue, cb, fence]));
        session.apply_command_buffer_transitions(cb);
        session.update(fence, |info| {
            if let Some(state) = info.payload.as_fence_mut() {
                state.pending_on_queue = Some(queue);
                state.signaled = false;
            }
        });

        session.record(call("vkWaitForFences", &[device, fence]));
        session.update(fence, |info| {
            if let Some(state) = info.payload.as_fence_mut() {
                state.pending_on_queue = None;
                state.signaled = true;
            }
        });
        session.record(call("vkResetFences", &[device, fence]));

        if self.frame % 3 == 0 {
            let sampler = self.create_on_device(session, ObjectCategory::Sampler, "vkCreateSampler", |_| {})?;
            session.record(call("vkDestroySampler", &[device, sampler]));
            session.remove(sampler);
        }

        session.record(call("vkQueuePresentKHR", &[queue]));
        Ok(())
    }
}
