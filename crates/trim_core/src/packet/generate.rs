//! Synthesized packets: calls the application never made in this form, but that
//! replay needs to rebuild the state the trim window starts from.

use crate::allocator::AllocatorId;
use crate::error::PacketError;
use crate::handle::{Handle, ObjectCategory};
use crate::object::{BufferState, DescriptorSetState, ImageState, ObjectInfo};
use crate::packet::Packet;
use ash::vk;
use serde::Serialize;

/// Entry point that creates objects of `category`.
pub fn create_call(category: ObjectCategory) -> &'static str {
    match category {
        ObjectCategory::Instance => "vkCreateInstance",
        ObjectCategory::PhysicalDevice => "vkEnumeratePhysicalDevices",
        ObjectCategory::Device => "vkCreateDevice",
        ObjectCategory::Surface => "vkCreateSurfaceKHR",
        ObjectCategory::CommandPool => "vkCreateCommandPool",
        ObjectCategory::CommandBuffer => "vkAllocateCommandBuffers",
        ObjectCategory::DescriptorPool => "vkCreateDescriptorPool",
        ObjectCategory::DescriptorSet => "vkAllocateDescriptorSets",
        ObjectCategory::DescriptorSetLayout => "vkCreateDescriptorSetLayout",
        ObjectCategory::RenderPass => "vkCreateRenderPass",
        ObjectCategory::PipelineCache => "vkCreatePipelineCache",
        ObjectCategory::Pipeline => "vkCreateGraphicsPipelines",
        ObjectCategory::PipelineLayout => "vkCreatePipelineLayout",
        ObjectCategory::Queue => "vkGetDeviceQueue",
        ObjectCategory::Semaphore => "vkCreateSemaphore",
        ObjectCategory::Fence => "vkCreateFence",
        ObjectCategory::DeviceMemory => "vkAllocateMemory",
        ObjectCategory::Swapchain => "vkCreateSwapchainKHR",
        ObjectCategory::Image => "vkCreateImage",
        ObjectCategory::ImageView => "vkCreateImageView",
        ObjectCategory::Buffer => "vkCreateBuffer",
        ObjectCategory::BufferView => "vkCreateBufferView",
        ObjectCategory::Sampler => "vkCreateSampler",
        ObjectCategory::Framebuffer => "vkCreateFramebuffer",
        ObjectCategory::Event => "vkCreateEvent",
        ObjectCategory::QueryPool => "vkCreateQueryPool",
        ObjectCategory::ShaderModule => "vkCreateShaderModule",
    }
}

/// Entry point that destroys objects of `category`, if they are destroyed individually.
pub fn destroy_call(category: ObjectCategory) -> Option<&'static str> {
    let call = match category {
        ObjectCategory::Instance => "vkDestroyInstance",
        ObjectCategory::Device => "vkDestroyDevice",
        ObjectCategory::Surface => "vkDestroySurfaceKHR",
        ObjectCategory::CommandPool => "vkDestroyCommandPool",
        ObjectCategory::DescriptorPool => "vkDestroyDescriptorPool",
        ObjectCategory::DescriptorSetLayout => "vkDestroyDescriptorSetLayout",
        ObjectCategory::RenderPass => "vkDestroyRenderPass",
        ObjectCategory::PipelineCache => "vkDestroyPipelineCache",
        ObjectCategory::Pipeline => "vkDestroyPipeline",
        ObjectCategory::PipelineLayout => "vkDestroyPipelineLayout",
        ObjectCategory::Semaphore => "vkDestroySemaphore",
        ObjectCategory::Fence => "vkDestroyFence",
        ObjectCategory::DeviceMemory => "vkFreeMemory",
        ObjectCategory::Swapchain => "vkDestroySwapchainKHR",
        ObjectCategory::Image => "vkDestroyImage",
        ObjectCategory::ImageView => "vkDestroyImageView",
        ObjectCategory::Buffer => "vkDestroyBuffer",
        ObjectCategory::BufferView => "vkDestroyBufferView",
        ObjectCategory::Sampler => "vkDestroySampler",
        ObjectCategory::Framebuffer => "vkDestroyFramebuffer",
        ObjectCategory::Event => "vkDestroyEvent",
        ObjectCategory::QueryPool => "vkDestroyQueryPool",
        ObjectCategory::ShaderModule => "vkDestroyShaderModule",
        ObjectCategory::PhysicalDevice
        | ObjectCategory::Queue
        | ObjectCategory::CommandBuffer
        | ObjectCategory::DescriptorSet => return None,
    };
    Some(call)
}

/// Handle of the object a call is issued against: the instance for
/// instance-level objects, the device for everything else.
fn parent_of(info: &ObjectInfo) -> Handle {
    match info.category() {
        ObjectCategory::Instance => info.handle(),
        ObjectCategory::Surface | ObjectCategory::PhysicalDevice | ObjectCategory::Device => {
            info.owning_instance.unwrap_or_default()
        }
        _ => info.owning_device.unwrap_or_default(),
    }
}

fn references(handles: impl IntoIterator<Item = Handle>) -> Vec<Handle> {
    handles.into_iter().filter(|h| !h.is_null()).collect()
}

#[derive(Serialize)]
struct RecreateArgs<'a> {
    category: &'a str,
    handle: Handle,
    instance: Option<Handle>,
    physical_device: Option<Handle>,
    device: Option<Handle>,
}

/// Creation call for an object whose original creation packet was never captured.
pub fn recreate(info: &ObjectInfo) -> Result<Packet, PacketError> {
    let category = info.category();
    let mut refs = references(info.owners());
    refs.push(info.handle());
    Packet::synthesize(
        create_call(category),
        refs,
        &RecreateArgs {
            category: category.name(),
            handle: info.handle(),
            instance: info.owning_instance,
            physical_device: info.owning_physical_device,
            device: info.owning_device,
        },
    )
}

#[derive(Serialize)]
struct DestroyArgs {
    parent: Handle,
    handle: Handle,
    allocator: Option<AllocatorId>,
}

/// Destroy call for a tracked object, or `None` for categories without one.
pub fn destroy(info: &ObjectInfo) -> Option<Result<Packet, PacketError>> {
    let call = destroy_call(info.category())?;
    let parent = parent_of(info);
    Some(Packet::synthesize(
        call,
        references([parent, info.handle()]),
        &DestroyArgs {
            parent,
            handle: info.handle(),
            allocator: info.allocator,
        },
    ))
}

#[derive(Serialize)]
struct CommandBufferArgs<'a> {
    device: Handle,
    pool: Handle,
    level: i32,
    count: u32,
    command_buffers: &'a [Handle],
}

/// Allocation of `command_buffers` from `pool`, all at `level`.
pub fn allocate_command_buffers(
    device: Handle,
    pool: Handle,
    level: vk::CommandBufferLevel,
    command_buffers: &[Handle],
) -> Result<Packet, PacketError> {
    let mut refs = references([device, pool]);
    refs.extend_from_slice(command_buffers);
    Packet::synthesize(
        "vkAllocateCommandBuffers",
        refs,
        &CommandBufferArgs {
            device,
            pool,
            level: level.as_raw(),
            count: command_buffers.len() as u32,
            command_buffers,
        },
    )
}

pub fn free_command_buffers(
    device: Handle,
    pool: Handle,
    level: vk::CommandBufferLevel,
    command_buffers: &[Handle],
) -> Result<Packet, PacketError> {
    let mut refs = references([device, pool]);
    refs.extend_from_slice(command_buffers);
    Packet::synthesize(
        "vkFreeCommandBuffers",
        refs,
        &CommandBufferArgs {
            device,
            pool,
            level: level.as_raw(),
            count: command_buffers.len() as u32,
            command_buffers,
        },
    )
}

#[derive(Serialize)]
struct AllocateSetsArgs<'a> {
    device: Handle,
    pool: Handle,
    sets: &'a [Handle],
    layouts: &'a [Handle],
}

/// One allocation call for every `(set, layout)` pair drawn from `pool`.
pub fn allocate_descriptor_sets(
    device: Handle,
    pool: Handle,
    sets: &[(Handle, Handle)],
) -> Result<Packet, PacketError> {
    let (set_handles, layouts): (Vec<Handle>, Vec<Handle>) = sets.iter().copied().unzip();
    let mut refs = references([device, pool]);
    refs.extend(set_handles.iter().copied());
    refs.extend(references(layouts.iter().copied()));
    Packet::synthesize(
        "vkAllocateDescriptorSets",
        refs,
        &AllocateSetsArgs {
            device,
            pool,
            sets: &set_handles,
            layouts: &layouts,
        },
    )
}

#[derive(Serialize)]
struct WriteArgs<'a> {
    set: Handle,
    binding: u32,
    array_element: u32,
    descriptor_type: i32,
    resources: &'a [Handle],
}

#[derive(Serialize)]
struct CopyArgs {
    src_set: Handle,
    src_binding: u32,
    src_array_element: u32,
    dst_set: Handle,
    dst_binding: u32,
    dst_array_element: u32,
    count: u32,
}

#[derive(Serialize)]
struct UpdateSetsArgs<'a> {
    device: Handle,
    writes: Vec<WriteArgs<'a>>,
    copies: Vec<CopyArgs>,
}

/// A single update call restoring the bindings of every given set.
pub fn update_descriptor_sets(
    device: Handle,
    sets: &[(Handle, &DescriptorSetState)],
) -> Result<Packet, PacketError> {
    let mut refs = references([device]);
    let mut writes = Vec::new();
    let mut copies = Vec::new();
    for &(set, state) in sets {
        refs.push(set);
        for write in &state.writes {
            refs.extend(references(write.resources.iter().copied()));
            writes.push(WriteArgs {
                set,
                binding: write.binding,
                array_element: write.array_element,
                descriptor_type: write.descriptor_type.as_raw(),
                resources: &write.resources,
            });
        }
        for copy in &state.copies {
            refs.push(copy.src_set);
            copies.push(CopyArgs {
                src_set: copy.src_set,
                src_binding: copy.src_binding,
                src_array_element: copy.src_array_element,
                dst_set: set,
                dst_binding: copy.dst_binding,
                dst_array_element: copy.dst_array_element,
                count: copy.count,
            });
        }
    }
    Packet::synthesize(
        "vkUpdateDescriptorSets",
        refs,
        &UpdateSetsArgs { device, writes, copies },
    )
}

#[derive(Serialize)]
struct PoolArgs {
    device: Handle,
    pool: Handle,
}

pub fn reset_descriptor_pool(device: Handle, pool: Handle) -> Result<Packet, PacketError> {
    Packet::synthesize(
        "vkResetDescriptorPool",
        references([device, pool]),
        &PoolArgs { device, pool },
    )
}

#[derive(Serialize)]
struct QueueArgs<'a> {
    device: Handle,
    queue: Handle,
    signal_semaphores: &'a [Handle],
    fence: Option<Handle>,
}

pub fn queue_wait_idle(device: Handle, queue: Handle) -> Result<Packet, PacketError> {
    Packet::synthesize(
        "vkQueueWaitIdle",
        references([device, queue]),
        &QueueArgs {
            device,
            queue,
            signal_semaphores: &[],
            fence: None,
        },
    )
}

/// An empty submission that only signals semaphores and/or a fence.
pub fn queue_submit(
    device: Handle,
    queue: Handle,
    signal_semaphores: &[Handle],
    fence: Option<Handle>,
) -> Result<Packet, PacketError> {
    let mut refs = references([device, queue]);
    refs.extend_from_slice(signal_semaphores);
    refs.extend(fence);
    Packet::synthesize(
        "vkQueueSubmit",
        refs,
        &QueueArgs {
            device,
            queue,
            signal_semaphores,
            fence,
        },
    )
}

#[derive(Serialize)]
struct MapArgs {
    device: Handle,
    memory: Handle,
    offset: u64,
    size: u64,
}

pub fn map_memory(device: Handle, memory: Handle, offset: u64, size: u64) -> Result<Packet, PacketError> {
    Packet::synthesize(
        "vkMapMemory",
        references([device, memory]),
        &MapArgs { device, memory, offset, size },
    )
}

pub fn unmap_memory(device: Handle, memory: Handle) -> Result<Packet, PacketError> {
    Packet::synthesize(
        "vkUnmapMemory",
        references([device, memory]),
        &MapArgs { device, memory, offset: 0, size: 0 },
    )
}

/// Map/unmap pair that carries a memory range's contents.
pub fn map_unmap(device: Handle, memory: Handle, offset: u64, size: u64) -> Result<[Packet; 2], PacketError> {
    Ok([
        map_memory(device, memory, offset, size)?,
        unmap_memory(device, memory)?,
    ])
}

#[derive(Serialize)]
struct ImageBarrierArgs {
    device: Handle,
    image: Handle,
    old_layout: i32,
    new_layout: i32,
    src_access: u32,
    dst_access: u32,
    aspect_mask: u32,
    queue_family: u32,
    mip_levels: u32,
    array_layers: u32,
}

/// Pipeline barrier moving every subresource of `image` between layouts.
pub fn transition_image(
    device: Handle,
    image: Handle,
    state: &ImageState,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Result<Packet, PacketError> {
    Packet::synthesize(
        "vkCmdPipelineBarrier",
        references([device, image]),
        &ImageBarrierArgs {
            device,
            image,
            old_layout: old_layout.as_raw(),
            new_layout: new_layout.as_raw(),
            src_access: vk::AccessFlags::empty().as_raw(),
            dst_access: state.access_flags.as_raw(),
            aspect_mask: state.aspect_mask.as_raw(),
            queue_family: state.barrier_queue_family(),
            mip_levels: state.mip_levels.max(1),
            array_layers: state.array_layers.max(1),
        },
    )
}

/// Temporary host-visible buffer used to upload device-local contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StagingResources {
    pub buffer: Handle,
    pub memory: Handle,
    pub memory_type_index: u32,
    pub size: u64,
}

#[derive(Serialize)]
struct StagingCreateArgs {
    device: Handle,
    staging: StagingResources,
}

#[derive(Serialize)]
struct CopyRegion {
    aspect_mask: u32,
    mip_level: u32,
    array_layers: u32,
    width: u32,
    height: u32,
    depth: u32,
}

#[derive(Serialize)]
struct CopyToImageArgs {
    device: Handle,
    staging_buffer: Handle,
    image: Handle,
    layout: i32,
    regions: Vec<CopyRegion>,
}

#[derive(Serialize)]
struct CopyToBufferArgs {
    device: Handle,
    staging_buffer: Handle,
    buffer: Handle,
    src_offset: u64,
    dst_offset: u64,
    size: u64,
}

fn staging_prologue(device: Handle, staging: StagingResources) -> Result<Vec<Packet>, PacketError> {
    let args = StagingCreateArgs { device, staging };
    Ok(vec![
        Packet::synthesize("vkCreateBuffer", references([device, staging.buffer]), &args)?,
        Packet::synthesize("vkAllocateMemory", references([device, staging.memory]), &args)?,
        Packet::synthesize(
            "vkBindBufferMemory",
            references([device, staging.buffer, staging.memory]),
            &args,
        )?,
        map_memory(device, staging.memory, 0, staging.size)?,
        unmap_memory(device, staging.memory)?,
    ])
}

fn staging_epilogue(device: Handle, staging: StagingResources, out: &mut Vec<Packet>) -> Result<(), PacketError> {
    let args = StagingCreateArgs { device, staging };
    out.push(Packet::synthesize("vkDestroyBuffer", references([device, staging.buffer]), &args)?);
    out.push(Packet::synthesize("vkFreeMemory", references([device, staging.memory]), &args)?);
    Ok(())
}

/// Copy regions per aspect and mip level. Depth and stencil are copied separately.
fn image_copy_regions(state: &ImageState) -> Vec<CopyRegion> {
    let aspects: Vec<vk::ImageAspectFlags> =
        if state.aspect_mask == vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL {
            vec![vk::ImageAspectFlags::DEPTH, vk::ImageAspectFlags::STENCIL]
        } else {
            vec![state.aspect_mask]
        };
    let mut regions = Vec::new();
    for aspect in aspects {
        for mip_level in 0..state.mip_levels.max(1) {
            regions.push(CopyRegion {
                aspect_mask: aspect.as_raw(),
                mip_level,
                array_layers: state.array_layers.max(1),
                width: (state.extent.width >> mip_level).max(1),
                height: (state.extent.height >> mip_level).max(1),
                depth: (state.extent.depth >> mip_level).max(1),
            });
        }
    }
    regions
}

/// Upload sequence for a device-local image: staging setup, transition to
/// transfer destination, copy, transition to the most recent layout, teardown.
pub fn staged_image_upload(
    device: Handle,
    image: Handle,
    state: &ImageState,
    staging: StagingResources,
) -> Result<Vec<Packet>, PacketError> {
    let mut packets = staging_prologue(device, staging)?;
    packets.push(transition_image(
        device,
        image,
        state,
        state.initial_layout,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    )?);
    packets.push(Packet::synthesize(
        "vkCmdCopyBufferToImage",
        references([device, staging.buffer, image]),
        &CopyToImageArgs {
            device,
            staging_buffer: staging.buffer,
            image,
            layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL.as_raw(),
            regions: image_copy_regions(state),
        },
    )?);
    if state.most_recent_layout != vk::ImageLayout::UNDEFINED {
        packets.push(transition_image(
            device,
            image,
            state,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            state.most_recent_layout,
        )?);
    }
    staging_epilogue(device, staging, &mut packets)?;
    Ok(packets)
}

/// Upload sequence for a device-local buffer.
pub fn staged_buffer_upload(
    device: Handle,
    buffer: Handle,
    state: &BufferState,
    staging: StagingResources,
) -> Result<Vec<Packet>, PacketError> {
    let mut packets = staging_prologue(device, staging)?;
    packets.push(Packet::synthesize(
        "vkCmdCopyBuffer",
        references([device, staging.buffer, buffer]),
        &CopyToBufferArgs {
            device,
            staging_buffer: staging.buffer,
            buffer,
            src_offset: 0,
            dst_offset: 0,
            size: state.size,
        },
    )?);
    staging_epilogue(device, staging, &mut packets)?;
    Ok(packets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::DescriptorWrite;

    #[test]
    fn every_destroyable_category_has_a_destroy_call() {
        for category in ObjectCategory::DESTRUCTION_ORDER {
            assert!(destroy_call(category).is_some(), "{category}");
        }
        assert_eq!(destroy_call(ObjectCategory::Queue), None);
    }

    #[test]
    fn destroy_targets_the_owning_device() {
        let mut info = ObjectInfo::new(Handle(20), ObjectCategory::Sampler, 0);
        info.set_owners(Handle(1), Handle(2), Handle(3));
        let packet = destroy(&info).unwrap().unwrap();
        assert_eq!(packet.call(), "vkDestroySampler");
        assert_eq!(packet.references(), &[Handle(3), Handle(20)]);
    }

    #[test]
    fn depth_stencil_uploads_copy_each_aspect() {
        let mut state = ImageState::default();
        state.describe(
            vk::Format::D24_UNORM_S8_UINT,
            vk::Extent3D { width: 8, height: 8, depth: 1 },
            2,
            1,
            vk::ImageLayout::UNDEFINED,
        );
        assert_eq!(image_copy_regions(&state).len(), 4);

        state.most_recent_layout = vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL;
        let staging = StagingResources { buffer: Handle(90), memory: Handle(91), memory_type_index: 1, size: 512 };
        let calls: Vec<_> = staged_image_upload(Handle(3), Handle(40), &state, staging)
            .unwrap()
            .iter()
            .map(Packet::call)
            .collect();
        assert_eq!(
            calls,
            vec![
                "vkCreateBuffer",
                "vkAllocateMemory",
                "vkBindBufferMemory",
                "vkMapMemory",
                "vkUnmapMemory",
                "vkCmdPipelineBarrier",
                "vkCmdCopyBufferToImage",
                "vkCmdPipelineBarrier",
                "vkDestroyBuffer",
                "vkFreeMemory",
            ]
        );
    }

    #[test]
    fn descriptor_update_references_bound_resources() {
        let mut state = DescriptorSetState::default();
        state.record_write(DescriptorWrite {
            binding: 0,
            array_element: 0,
            descriptor_type: vk::DescriptorType::STORAGE_BUFFER,
            resources: vec![Handle(77)],
        });
        let packet = update_descriptor_sets(Handle(3), &[(Handle(50), &state)]).unwrap();
        assert!(packet.touches(Handle(50)));
        assert!(packet.touches(Handle(77)));
    }
}
