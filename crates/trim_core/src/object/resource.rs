//! Payloads for memory-backed objects and the physical devices that describe them.

use crate::handle::Handle;
use crate::packet::Packet;
use crate::query;
use ash::vk;

/// One entry of a physical device's memory type table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryType {
    pub property_flags: vk::MemoryPropertyFlags,
    pub heap_index: u32,
}

#[derive(Debug, Clone, Default)]
pub struct PhysicalDeviceState {
    /// Captured from the memory-properties query. Empty until that query is seen.
    pub memory_types: Vec<MemoryType>,
    pub queue_family_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryMapping {
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Default)]
pub struct DeviceMemoryState {
    pub size: u64,
    pub memory_type_index: u32,
    pub property_flags: vk::MemoryPropertyFlags,
    pub mapping: Option<MemoryMapping>,
    /// Most recent map/unmap pair, replayed to restore host-visible contents.
    pub map_packet: Option<Packet>,
    pub unmap_packet: Option<Packet>,
    /// Map call of a mapping still open at snapshot time.
    pub persistent_map_packet: Option<Packet>,
}

impl DeviceMemoryState {
    pub fn is_device_only(&self) -> bool {
        query::is_device_only(self.property_flags)
    }

    pub fn is_mapped(&self) -> bool {
        self.mapping.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SwapchainState {
    pub images: Vec<Handle>,
}

#[derive(Debug, Clone, Default)]
pub struct ImageState {
    pub is_swapchain_image: bool,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub sharing_mode: vk::SharingMode,
    pub queue_family_index: u32,
    pub access_flags: vk::AccessFlags,
    pub aspect_mask: vk::ImageAspectFlags,
    pub initial_layout: vk::ImageLayout,
    pub most_recent_layout: vk::ImageLayout,
    pub memory: Option<Handle>,
    pub memory_offset: u64,
    pub memory_size: u64,
    /// Device-local-only backing; contents must go through a staging buffer.
    pub needs_staging: bool,
    pub memory_requirements_packet: Option<Packet>,
    pub bind_packet: Option<Packet>,
}

impl ImageState {
    /// Record the creation parameters and derive the aspect mask from the format.
    pub fn describe(
        &mut self,
        format: vk::Format,
        extent: vk::Extent3D,
        mip_levels: u32,
        array_layers: u32,
        initial_layout: vk::ImageLayout,
    ) {
        self.format = format;
        self.extent = extent;
        self.mip_levels = mip_levels;
        self.array_layers = array_layers;
        self.aspect_mask = query::image_aspect_from_format(format);
        self.initial_layout = initial_layout;
        self.most_recent_layout = initial_layout;
    }

    /// Queue family used in barriers; concurrent images ignore ownership.
    pub fn barrier_queue_family(&self) -> u32 {
        if self.sharing_mode == vk::SharingMode::CONCURRENT {
            vk::QUEUE_FAMILY_IGNORED
        } else {
            self.queue_family_index
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BufferState {
    pub size: u64,
    pub queue_family_index: u32,
    pub access_flags: vk::AccessFlags,
    pub memory: Option<Handle>,
    pub memory_offset: u64,
    pub needs_staging: bool,
    pub bind_packet: Option<Packet>,
}

#[derive(Debug, Clone, Default)]
pub struct ImageViewState {
    pub image: Handle,
}

#[derive(Debug, Clone, Default)]
pub struct BufferViewState {
    pub buffer: Handle,
}

/// A layout change recorded into a command buffer, applied when it is submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageTransition {
    pub image: Handle,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferTransition {
    pub buffer: Handle,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
}
