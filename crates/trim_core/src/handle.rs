//! Object handles and the categories they are tracked under.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identity of an API object, as handed out by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(pub u64);

impl Handle {
    pub const NULL: Handle = Handle(0);

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// `None` for the null handle.
    #[inline]
    pub fn non_null(self) -> Option<Handle> {
        if self.is_null() {
            None
        } else {
            Some(self)
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Every kind of API object the tracker knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectCategory {
    Instance,
    PhysicalDevice,
    Device,
    Surface,
    CommandPool,
    CommandBuffer,
    DescriptorPool,
    DescriptorSet,
    DescriptorSetLayout,
    RenderPass,
    PipelineCache,
    Pipeline,
    PipelineLayout,
    Queue,
    Semaphore,
    Fence,
    DeviceMemory,
    Swapchain,
    Image,
    ImageView,
    Buffer,
    BufferView,
    Sampler,
    Framebuffer,
    Event,
    QueryPool,
    ShaderModule,
}

impl ObjectCategory {
    pub const COUNT: usize = 27;

    /// Order in which categories are recreated. Every owner precedes what it owns,
    /// and every object precedes the objects that are built on top of it.
    pub const CREATION_ORDER: [ObjectCategory; Self::COUNT] = [
        ObjectCategory::Instance,
        ObjectCategory::Surface,
        ObjectCategory::PhysicalDevice,
        ObjectCategory::Device,
        ObjectCategory::Queue,
        ObjectCategory::CommandPool,
        ObjectCategory::Swapchain,
        ObjectCategory::DeviceMemory,
        ObjectCategory::Image,
        ObjectCategory::ImageView,
        ObjectCategory::Buffer,
        ObjectCategory::BufferView,
        ObjectCategory::Sampler,
        ObjectCategory::DescriptorSetLayout,
        ObjectCategory::PipelineLayout,
        ObjectCategory::RenderPass,
        ObjectCategory::ShaderModule,
        ObjectCategory::PipelineCache,
        ObjectCategory::Pipeline,
        ObjectCategory::DescriptorPool,
        ObjectCategory::DescriptorSet,
        ObjectCategory::Framebuffer,
        ObjectCategory::Semaphore,
        ObjectCategory::Fence,
        ObjectCategory::Event,
        ObjectCategory::QueryPool,
        ObjectCategory::CommandBuffer,
    ];

    /// Order in which categories are torn down. Categories that are released
    /// implicitly with their parent (physical devices, queues, descriptor sets,
    /// command buffers) do not appear.
    pub const DESTRUCTION_ORDER: [ObjectCategory; 23] = [
        ObjectCategory::QueryPool,
        ObjectCategory::Event,
        ObjectCategory::Fence,
        ObjectCategory::Semaphore,
        ObjectCategory::Framebuffer,
        ObjectCategory::DescriptorPool,
        ObjectCategory::Pipeline,
        ObjectCategory::PipelineCache,
        ObjectCategory::ShaderModule,
        ObjectCategory::RenderPass,
        ObjectCategory::PipelineLayout,
        ObjectCategory::DescriptorSetLayout,
        ObjectCategory::Sampler,
        ObjectCategory::BufferView,
        ObjectCategory::Buffer,
        ObjectCategory::ImageView,
        ObjectCategory::Image,
        ObjectCategory::DeviceMemory,
        ObjectCategory::Swapchain,
        ObjectCategory::CommandPool,
        ObjectCategory::Device,
        ObjectCategory::Surface,
        ObjectCategory::Instance,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ObjectCategory::Instance => "Instance",
            ObjectCategory::PhysicalDevice => "PhysicalDevice",
            ObjectCategory::Device => "Device",
            ObjectCategory::Surface => "Surface",
            ObjectCategory::CommandPool => "CommandPool",
            ObjectCategory::CommandBuffer => "CommandBuffer",
            ObjectCategory::DescriptorPool => "DescriptorPool",
            ObjectCategory::DescriptorSet => "DescriptorSet",
            ObjectCategory::DescriptorSetLayout => "DescriptorSetLayout",
            ObjectCategory::RenderPass => "RenderPass",
            ObjectCategory::PipelineCache => "PipelineCache",
            ObjectCategory::Pipeline => "Pipeline",
            ObjectCategory::PipelineLayout => "PipelineLayout",
            ObjectCategory::Queue => "Queue",
            ObjectCategory::Semaphore => "Semaphore",
            ObjectCategory::Fence => "Fence",
            ObjectCategory::DeviceMemory => "DeviceMemory",
            ObjectCategory::Swapchain => "Swapchain",
            ObjectCategory::Image => "Image",
            ObjectCategory::ImageView => "ImageView",
            ObjectCategory::Buffer => "Buffer",
            ObjectCategory::BufferView => "BufferView",
            ObjectCategory::Sampler => "Sampler",
            ObjectCategory::Framebuffer => "Framebuffer",
            ObjectCategory::Event => "Event",
            ObjectCategory::QueryPool => "QueryPool",
            ObjectCategory::ShaderModule => "ShaderModule",
        }
    }

    /// Categories whose objects hang off a device rather than the instance.
    pub fn is_device_owned(self) -> bool {
        !matches!(
            self,
            ObjectCategory::Instance
                | ObjectCategory::PhysicalDevice
                | ObjectCategory::Device
                | ObjectCategory::Surface
        )
    }
}

impl fmt::Display for ObjectCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn creation_order_covers_every_category_once() {
        let unique: HashSet<_> = ObjectCategory::CREATION_ORDER.iter().collect();
        assert_eq!(unique.len(), ObjectCategory::COUNT);
    }

    #[test]
    fn ancestors_are_created_first_and_destroyed_last() {
        let position = |c| {
            ObjectCategory::CREATION_ORDER
                .iter()
                .position(|&x| x == c)
                .unwrap()
        };
        assert!(position(ObjectCategory::Instance) < position(ObjectCategory::PhysicalDevice));
        assert!(position(ObjectCategory::PhysicalDevice) < position(ObjectCategory::Device));
        for category in ObjectCategory::CREATION_ORDER {
            if category.is_device_owned() {
                assert!(position(ObjectCategory::Device) < position(category));
            }
        }
        assert_eq!(
            ObjectCategory::DESTRUCTION_ORDER.last(),
            Some(&ObjectCategory::Instance)
        );
    }

    #[test]
    fn null_handle_is_filtered() {
        assert_eq!(Handle::NULL.non_null(), None);
        assert_eq!(Handle(7).non_null(), Some(Handle(7)));
        assert_eq!(Handle(255).to_string(), "0xff");
    }
}
