//! Payloads for command recording, descriptors, pipelines and synchronization.

use crate::handle::Handle;
use crate::object::resource::{BufferTransition, ImageTransition};
use crate::packet::Packet;
use ash::vk;

#[derive(Debug, Clone, Copy, Default)]
pub struct QueueState {
    pub queue_family_index: u32,
    pub queue_index: u32,
}

#[derive(Debug, Clone, Default)]
pub struct CommandPoolState {
    pub queue_family_index: u32,
    /// Live command buffers, indexed by level (primary, secondary).
    allocated: [u32; 2],
}

impl CommandPoolState {
    fn slot(level: vk::CommandBufferLevel) -> usize {
        if level == vk::CommandBufferLevel::SECONDARY {
            1
        } else {
            0
        }
    }

    pub fn allocated(&self, level: vk::CommandBufferLevel) -> u32 {
        self.allocated[Self::slot(level)]
    }

    pub fn note_allocated(&mut self, level: vk::CommandBufferLevel, count: u32) {
        let slot = &mut self.allocated[Self::slot(level)];
        *slot = slot.saturating_add(count);
    }

    pub fn note_freed(&mut self, level: vk::CommandBufferLevel, count: u32) {
        let slot = &mut self.allocated[Self::slot(level)];
        *slot = slot.saturating_sub(count);
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommandBufferState {
    pub pool: Handle,
    pub level: vk::CommandBufferLevel,
    pub active_render_pass: Option<Handle>,
    /// Calls recorded into this command buffer, in recording order.
    pub calls: Vec<Packet>,
    pub image_transitions: Vec<ImageTransition>,
    pub buffer_transitions: Vec<BufferTransition>,
}

#[derive(Debug, Clone, Default)]
pub struct DescriptorPoolState {
    pub flags: vk::DescriptorPoolCreateFlags,
    pub max_sets: u32,
    pub allocated_sets: u32,
}

/// The resources bound by one `vkUpdateDescriptorSets` write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorWrite {
    pub binding: u32,
    pub array_element: u32,
    pub descriptor_type: vk::DescriptorType,
    pub resources: Vec<Handle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorCopy {
    pub src_set: Handle,
    pub src_binding: u32,
    pub src_array_element: u32,
    pub dst_binding: u32,
    pub dst_array_element: u32,
    pub count: u32,
}

#[derive(Debug, Clone, Default)]
pub struct DescriptorSetState {
    pub pool: Handle,
    pub layout: Handle,
    pub writes: Vec<DescriptorWrite>,
    pub copies: Vec<DescriptorCopy>,
}

impl DescriptorSetState {
    /// Later writes to the same slot replace earlier ones.
    pub fn record_write(&mut self, write: DescriptorWrite) {
        match self
            .writes
            .iter_mut()
            .find(|w| w.binding == write.binding && w.array_element == write.array_element)
        {
            Some(existing) => *existing = write,
            None => self.writes.push(write),
        }
    }

    pub fn record_copy(&mut self, copy: DescriptorCopy) {
        self.copies.push(copy);
    }

    pub fn has_updates(&self) -> bool {
        !self.writes.is_empty() || !self.copies.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub count: u32,
}

#[derive(Debug, Clone, Default)]
pub struct DescriptorSetLayoutState {
    pub bindings: Vec<DescriptorBinding>,
}

impl DescriptorSetLayoutState {
    fn count_where(&self, pred: impl Fn(vk::DescriptorType) -> bool) -> u32 {
        self.bindings
            .iter()
            .filter(|b| pred(b.descriptor_type))
            .map(|b| b.count)
            .sum()
    }

    pub fn image_count(&self) -> u32 {
        self.count_where(|ty| {
            matches!(
                ty,
                vk::DescriptorType::SAMPLER
                    | vk::DescriptorType::COMBINED_IMAGE_SAMPLER
                    | vk::DescriptorType::SAMPLED_IMAGE
                    | vk::DescriptorType::STORAGE_IMAGE
                    | vk::DescriptorType::INPUT_ATTACHMENT
            )
        })
    }

    pub fn buffer_count(&self) -> u32 {
        self.count_where(|ty| {
            matches!(
                ty,
                vk::DescriptorType::UNIFORM_BUFFER
                    | vk::DescriptorType::STORAGE_BUFFER
                    | vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
                    | vk::DescriptorType::STORAGE_BUFFER_DYNAMIC
            )
        })
    }

    pub fn texel_buffer_view_count(&self) -> u32 {
        self.count_where(|ty| {
            matches!(
                ty,
                vk::DescriptorType::UNIFORM_TEXEL_BUFFER | vk::DescriptorType::STORAGE_TEXEL_BUFFER
            )
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineLayoutState {
    pub set_layouts: Vec<Handle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentLayouts {
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
}

#[derive(Debug, Clone, Default)]
pub struct RenderPassState {
    pub attachments: Vec<AttachmentLayouts>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineKind {
    #[default]
    Graphics,
    Compute,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    pub kind: PipelineKind,
    pub layout: Handle,
    pub render_pass: Option<Handle>,
    pub shader_modules: Vec<Handle>,
    pub cache: Option<Handle>,
}

#[derive(Debug, Clone, Default)]
pub struct FramebufferState {
    pub render_pass: Handle,
    pub attachments: Vec<Handle>,
}

#[derive(Debug, Clone, Default)]
pub struct SemaphoreState {
    pub signaled_on_queue: Option<Handle>,
}

#[derive(Debug, Clone, Default)]
pub struct FenceState {
    pub signaled: bool,
    pub pending_on_queue: Option<Handle>,
}

#[derive(Debug, Clone, Default)]
pub struct QueryPoolState {
    pub query_type: vk::QueryType,
    results_available: Vec<bool>,
}

impl QueryPoolState {
    /// Upper bound on tracked query slots; availability past it reads as `false`.
    pub const MAX_TRACKED_QUERIES: u32 = 1 << 16;

    pub fn new(query_type: vk::QueryType, query_count: u32) -> Self {
        if query_count > Self::MAX_TRACKED_QUERIES {
            tracing::warn!(query_count, limit = Self::MAX_TRACKED_QUERIES, "query pool too large, clamping");
        }
        Self {
            query_type,
            results_available: vec![false; query_count.min(Self::MAX_TRACKED_QUERIES) as usize],
        }
    }

    pub fn query_count(&self) -> u32 {
        self.results_available.len() as u32
    }

    /// Out-of-range slots are ignored.
    pub fn set_available(&mut self, first_query: u32, count: u32, available: bool) {
        let start = (first_query as usize).min(self.results_available.len());
        let end = start
            .saturating_add(count as usize)
            .min(self.results_available.len());
        self.results_available[start..end].fill(available);
    }

    pub fn is_available(&self, query: u32) -> bool {
        self.results_available
            .get(query as usize)
            .copied()
            .unwrap_or(false)
    }
}
