//! Per-object records held by the state tracker.
//!
//! Every live API object has one [`ObjectInfo`]: identity, the trim-window
//! reference flag, non-owning links to its instance / physical device /
//! device, the packets that recreate it, and a category payload. Payloads
//! are a sum type over [`ObjectCategory`]; use the `as_*` accessors, which
//! return `None` when the record belongs to another category.

mod command;
mod resource;

pub use command::{
    AttachmentLayouts, CommandBufferState, CommandPoolState, DescriptorBinding, DescriptorCopy,
    DescriptorPoolState, DescriptorSetLayoutState, DescriptorSetState, DescriptorWrite,
    FenceState, FramebufferState, PipelineKind, PipelineLayoutState, PipelineState, QueryPoolState,
    QueueState, RenderPassState, SemaphoreState,
};
pub use resource::{
    BufferState, BufferTransition, BufferViewState, DeviceMemoryState, ImageState,
    ImageTransition, ImageViewState, MemoryMapping, MemoryType, PhysicalDeviceState,
    SwapchainState,
};

use crate::allocator::AllocatorId;
use crate::handle::{Handle, ObjectCategory};
use crate::packet::Packet;

#[derive(Debug, Clone)]
pub enum ObjectPayload {
    Instance,
    PhysicalDevice(PhysicalDeviceState),
    Device,
    Surface,
    CommandPool(CommandPoolState),
    CommandBuffer(CommandBufferState),
    DescriptorPool(DescriptorPoolState),
    DescriptorSet(DescriptorSetState),
    DescriptorSetLayout(DescriptorSetLayoutState),
    RenderPass(RenderPassState),
    PipelineCache,
    Pipeline(PipelineState),
    PipelineLayout(PipelineLayoutState),
    Queue(QueueState),
    Semaphore(SemaphoreState),
    Fence(FenceState),
    DeviceMemory(DeviceMemoryState),
    Swapchain(SwapchainState),
    Image(ImageState),
    ImageView(ImageViewState),
    Buffer(BufferState),
    BufferView(BufferViewState),
    Sampler,
    Framebuffer(FramebufferState),
    Event,
    QueryPool(QueryPoolState),
    ShaderModule,
}

macro_rules! payload_accessors {
    ($($variant:ident => $state:ty, $get:ident, $get_mut:ident;)*) => {
        impl ObjectPayload {
            $(
                pub fn $get(&self) -> Option<&$state> {
                    match self {
                        ObjectPayload::$variant(state) => Some(state),
                        _ => None,
                    }
                }

                pub fn $get_mut(&mut self) -> Option<&mut $state> {
                    match self {
                        ObjectPayload::$variant(state) => Some(state),
                        _ => None,
                    }
                }
            )*
        }
    };
}

payload_accessors! {
    PhysicalDevice => PhysicalDeviceState, as_physical_device, as_physical_device_mut;
    CommandPool => CommandPoolState, as_command_pool, as_command_pool_mut;
    CommandBuffer => CommandBufferState, as_command_buffer, as_command_buffer_mut;
    DescriptorPool => DescriptorPoolState, as_descriptor_pool, as_descriptor_pool_mut;
    DescriptorSet => DescriptorSetState, as_descriptor_set, as_descriptor_set_mut;
    DescriptorSetLayout => DescriptorSetLayoutState, as_descriptor_set_layout, as_descriptor_set_layout_mut;
    RenderPass => RenderPassState, as_render_pass, as_render_pass_mut;
    Pipeline => PipelineState, as_pipeline, as_pipeline_mut;
    PipelineLayout => PipelineLayoutState, as_pipeline_layout, as_pipeline_layout_mut;
    Queue => QueueState, as_queue, as_queue_mut;
    Semaphore => SemaphoreState, as_semaphore, as_semaphore_mut;
    Fence => FenceState, as_fence, as_fence_mut;
    DeviceMemory => DeviceMemoryState, as_device_memory, as_device_memory_mut;
    Swapchain => SwapchainState, as_swapchain, as_swapchain_mut;
    Image => ImageState, as_image, as_image_mut;
    ImageView => ImageViewState, as_image_view, as_image_view_mut;
    Buffer => BufferState, as_buffer, as_buffer_mut;
    BufferView => BufferViewState, as_buffer_view, as_buffer_view_mut;
    Framebuffer => FramebufferState, as_framebuffer, as_framebuffer_mut;
    QueryPool => QueryPoolState, as_query_pool, as_query_pool_mut;
}

impl ObjectPayload {
    /// Default-initialized payload for a freshly added object.
    pub fn empty(category: ObjectCategory) -> Self {
        match category {
            ObjectCategory::Instance => ObjectPayload::Instance,
            ObjectCategory::PhysicalDevice => ObjectPayload::PhysicalDevice(Default::default()),
            ObjectCategory::Device => ObjectPayload::Device,
            ObjectCategory::Surface => ObjectPayload::Surface,
            ObjectCategory::CommandPool => ObjectPayload::CommandPool(Default::default()),
            ObjectCategory::CommandBuffer => ObjectPayload::CommandBuffer(Default::default()),
            ObjectCategory::DescriptorPool => ObjectPayload::DescriptorPool(Default::default()),
            ObjectCategory::DescriptorSet => ObjectPayload::DescriptorSet(Default::default()),
            ObjectCategory::DescriptorSetLayout => {
                ObjectPayload::DescriptorSetLayout(Default::default())
            }
            ObjectCategory::RenderPass => ObjectPayload::RenderPass(Default::default()),
            ObjectCategory::PipelineCache => ObjectPayload::PipelineCache,
            ObjectCategory::Pipeline => ObjectPayload::Pipeline(Default::default()),
            ObjectCategory::PipelineLayout => ObjectPayload::PipelineLayout(Default::default()),
            ObjectCategory::Queue => ObjectPayload::Queue(Default::default()),
            ObjectCategory::Semaphore => ObjectPayload::Semaphore(Default::default()),
            ObjectCategory::Fence => ObjectPayload::Fence(Default::default()),
            ObjectCategory::DeviceMemory => ObjectPayload::DeviceMemory(Default::default()),
            ObjectCategory::Swapchain => ObjectPayload::Swapchain(Default::default()),
            ObjectCategory::Image => ObjectPayload::Image(Default::default()),
            ObjectCategory::ImageView => ObjectPayload::ImageView(Default::default()),
            ObjectCategory::Buffer => ObjectPayload::Buffer(Default::default()),
            ObjectCategory::BufferView => ObjectPayload::BufferView(Default::default()),
            ObjectCategory::Sampler => ObjectPayload::Sampler,
            ObjectCategory::Framebuffer => ObjectPayload::Framebuffer(Default::default()),
            ObjectCategory::Event => ObjectPayload::Event,
            ObjectCategory::QueryPool => ObjectPayload::QueryPool(Default::default()),
            ObjectCategory::ShaderModule => ObjectPayload::ShaderModule,
        }
    }

    pub fn category(&self) -> ObjectCategory {
        match self {
            ObjectPayload::Instance => ObjectCategory::Instance,
            ObjectPayload::PhysicalDevice(_) => ObjectCategory::PhysicalDevice,
            ObjectPayload::Device => ObjectCategory::Device,
            ObjectPayload::Surface => ObjectCategory::Surface,
            ObjectPayload::CommandPool(_) => ObjectCategory::CommandPool,
            ObjectPayload::CommandBuffer(_) => ObjectCategory::CommandBuffer,
            ObjectPayload::DescriptorPool(_) => ObjectCategory::DescriptorPool,
            ObjectPayload::DescriptorSet(_) => ObjectCategory::DescriptorSet,
            ObjectPayload::DescriptorSetLayout(_) => ObjectCategory::DescriptorSetLayout,
            ObjectPayload::RenderPass(_) => ObjectCategory::RenderPass,
            ObjectPayload::PipelineCache => ObjectCategory::PipelineCache,
            ObjectPayload::Pipeline(_) => ObjectCategory::Pipeline,
            ObjectPayload::PipelineLayout(_) => ObjectCategory::PipelineLayout,
            ObjectPayload::Queue(_) => ObjectCategory::Queue,
            ObjectPayload::Semaphore(_) => ObjectCategory::Semaphore,
            ObjectPayload::Fence(_) => ObjectCategory::Fence,
            ObjectPayload::DeviceMemory(_) => ObjectCategory::DeviceMemory,
            ObjectPayload::Swapchain(_) => ObjectCategory::Swapchain,
            ObjectPayload::Image(_) => ObjectCategory::Image,
            ObjectPayload::ImageView(_) => ObjectCategory::ImageView,
            ObjectPayload::Buffer(_) => ObjectCategory::Buffer,
            ObjectPayload::BufferView(_) => ObjectCategory::BufferView,
            ObjectPayload::Sampler => ObjectCategory::Sampler,
            ObjectPayload::Framebuffer(_) => ObjectCategory::Framebuffer,
            ObjectPayload::Event => ObjectCategory::Event,
            ObjectPayload::QueryPool(_) => ObjectCategory::QueryPool,
            ObjectPayload::ShaderModule => ObjectCategory::ShaderModule,
        }
    }

    /// Objects this one cannot be recreated without, besides its owners.
    /// Recorded command-buffer calls are not included.
    pub fn dependencies(&self) -> Vec<Handle> {
        let mut deps = Vec::new();
        match self {
            ObjectPayload::CommandBuffer(cb) => deps.push(cb.pool),
            ObjectPayload::DescriptorSet(set) => {
                deps.push(set.pool);
                deps.push(set.layout);
                for write in &set.writes {
                    deps.extend(write.resources.iter().copied());
                }
                deps.extend(set.copies.iter().map(|copy| copy.src_set));
            }
            ObjectPayload::PipelineLayout(layout) => deps.extend(layout.set_layouts.iter().copied()),
            ObjectPayload::Pipeline(pipeline) => {
                deps.push(pipeline.layout);
                deps.extend(pipeline.render_pass);
                deps.extend(pipeline.shader_modules.iter().copied());
                deps.extend(pipeline.cache);
            }
            ObjectPayload::Image(image) => deps.extend(image.memory),
            ObjectPayload::Buffer(buffer) => deps.extend(buffer.memory),
            ObjectPayload::ImageView(view) => deps.push(view.image),
            ObjectPayload::BufferView(view) => deps.push(view.buffer),
            ObjectPayload::Framebuffer(framebuffer) => {
                deps.push(framebuffer.render_pass);
                deps.extend(framebuffer.attachments.iter().copied());
            }
            _ => {}
        }
        deps.retain(|handle| !handle.is_null());
        deps
    }

    /// Packets stored inside the payload, drained for release.
    fn take_packets(&mut self, out: &mut Vec<Packet>) {
        match self {
            ObjectPayload::CommandBuffer(cb) => out.append(&mut cb.calls),
            ObjectPayload::DeviceMemory(memory) => out.extend(
                [
                    memory.map_packet.take(),
                    memory.unmap_packet.take(),
                    memory.persistent_map_packet.take(),
                ]
                .into_iter()
                .flatten(),
            ),
            ObjectPayload::Image(image) => out.extend(
                [image.memory_requirements_packet.take(), image.bind_packet.take()]
                    .into_iter()
                    .flatten(),
            ),
            ObjectPayload::Buffer(buffer) => out.extend(buffer.bind_packet.take()),
            _ => {}
        }
    }
}

/// Tracked state of one live API object.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    handle: Handle,
    sequence: u64,
    referenced_in_trim: bool,
    pub owning_instance: Option<Handle>,
    pub owning_physical_device: Option<Handle>,
    pub owning_device: Option<Handle>,
    pub allocator: Option<AllocatorId>,
    /// The call that created the object.
    pub create_packet: Option<Packet>,
    /// Follow-up calls replayed right after creation (queries, enumerations).
    pub setup_packets: Vec<Packet>,
    pub payload: ObjectPayload,
}

impl ObjectInfo {
    pub(crate) fn new(handle: Handle, category: ObjectCategory, sequence: u64) -> Self {
        Self {
            handle,
            sequence,
            referenced_in_trim: false,
            owning_instance: None,
            owning_physical_device: None,
            owning_device: None,
            allocator: None,
            create_packet: None,
            setup_packets: Vec::new(),
            payload: ObjectPayload::empty(category),
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn category(&self) -> ObjectCategory {
        self.payload.category()
    }

    /// First-seen order across the whole tracker.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn is_referenced(&self) -> bool {
        self.referenced_in_trim
    }

    /// Returns `true` only on the first call. The flag never clears.
    pub(crate) fn mark_referenced(&mut self) -> bool {
        !std::mem::replace(&mut self.referenced_in_trim, true)
    }

    /// Set the ancestor links. Null handles are stored as `None`.
    pub fn set_owners(&mut self, instance: Handle, physical_device: Handle, device: Handle) {
        self.owning_instance = instance.non_null();
        self.owning_physical_device = physical_device.non_null();
        self.owning_device = device.non_null();
    }

    /// Instance, physical device and device links, outermost first.
    pub fn owners(&self) -> impl Iterator<Item = Handle> {
        [
            self.owning_instance,
            self.owning_physical_device,
            self.owning_device,
        ]
        .into_iter()
        .flatten()
    }

    /// Detach every packet this record owns.
    pub(crate) fn take_packets(&mut self) -> Vec<Packet> {
        let mut packets = Vec::new();
        packets.extend(self.create_packet.take());
        packets.append(&mut self.setup_packets);
        self.payload.take_packets(&mut packets);
        packets
    }
}
