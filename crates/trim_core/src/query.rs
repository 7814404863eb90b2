//! Derived queries over tracked state.

use crate::handle::Handle;
use crate::object::MemoryType;
use crate::tracker::StateTracker;
use ash::vk;

/// Upper bound on memory types a physical device reports.
pub const MAX_MEMORY_TYPES: usize = vk::MAX_MEMORY_TYPES;

/// Device-local and not host-visible: contents can only be reached through a staging copy.
pub fn is_device_only(flags: vk::MemoryPropertyFlags) -> bool {
    flags & (vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE)
        == vk::MemoryPropertyFlags::DEVICE_LOCAL
}

/// Aspects a view or barrier on an image of this format may name.
pub fn image_aspect_from_format(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        vk::Format::D16_UNORM_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// First memory type allowed by `type_bits` whose flags contain `required`.
pub fn find_memory_type(
    memory_types: &[MemoryType],
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Option<u32> {
    memory_types
        .iter()
        .take(MAX_MEMORY_TYPES)
        .enumerate()
        .find(|&(index, ty)| type_bits & (1 << index) != 0 && ty.property_flags.contains(required))
        .map(|(index, _)| index as u32)
}

impl StateTracker {
    fn memory_types_of_device(&self, device: Handle) -> Option<&[MemoryType]> {
        let physical_device = self.get(device)?.owning_physical_device?;
        let state = self.get(physical_device)?.payload.as_physical_device()?;
        Some(&state.memory_types)
    }

    /// Property flags of a memory type, as reported by the device's physical device.
    /// `None` when the device, its physical device, or the index is unknown.
    pub fn lookup_memory_properties(
        &self,
        device: Handle,
        memory_type_index: u32,
    ) -> Option<vk::MemoryPropertyFlags> {
        if memory_type_index as usize >= MAX_MEMORY_TYPES {
            return None;
        }
        self.memory_types_of_device(device)?
            .get(memory_type_index as usize)
            .map(|ty| ty.property_flags)
    }

    /// `false` for untracked memory.
    pub fn is_device_only_memory(&self, _device: Handle, memory: Handle) -> bool {
        self.get(memory)
            .and_then(|info| info.payload.as_device_memory())
            .map(|state| state.is_device_only())
            .unwrap_or(false)
    }

    /// Index of a memory type suitable for `required`, falling back to 0.
    pub fn find_memory_type_index(
        &self,
        device: Handle,
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    ) -> u32 {
        self.memory_types_of_device(device)
            .and_then(|types| find_memory_type(types, type_bits, required))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::ObjectCategory;

    const DEVICE_LOCAL: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
    const HOST_VISIBLE: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::HOST_VISIBLE;

    fn tracker_with_memory_types(types: Vec<MemoryType>) -> StateTracker {
        let mut tracker = StateTracker::new();
        tracker
            .add(ObjectCategory::PhysicalDevice, Handle(2))
            .unwrap()
            .payload
            .as_physical_device_mut()
            .unwrap()
            .memory_types = types;
        tracker
            .add(ObjectCategory::Device, Handle(3))
            .unwrap()
            .set_owners(Handle::NULL, Handle(2), Handle::NULL);
        tracker
    }

    #[test]
    fn device_only_requires_local_without_host_visible() {
        assert!(is_device_only(DEVICE_LOCAL));
        assert!(!is_device_only(DEVICE_LOCAL | HOST_VISIBLE));
        assert!(!is_device_only(HOST_VISIBLE));
        assert!(is_device_only(DEVICE_LOCAL | vk::MemoryPropertyFlags::LAZILY_ALLOCATED));
    }

    #[test]
    fn aspect_from_format() {
        assert_eq!(image_aspect_from_format(vk::Format::D16_UNORM), vk::ImageAspectFlags::DEPTH);
        assert_eq!(image_aspect_from_format(vk::Format::S8_UINT), vk::ImageAspectFlags::STENCIL);
        assert_eq!(
            image_aspect_from_format(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(image_aspect_from_format(vk::Format::R8G8B8A8_UNORM), vk::ImageAspectFlags::COLOR);
    }

    #[test]
    fn memory_properties_follow_the_owning_physical_device() {
        let tracker = tracker_with_memory_types(vec![
            MemoryType { property_flags: DEVICE_LOCAL, heap_index: 0 },
            MemoryType { property_flags: HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT, heap_index: 1 },
        ]);

        assert_eq!(tracker.lookup_memory_properties(Handle(3), 0), Some(DEVICE_LOCAL));
        assert_eq!(tracker.lookup_memory_properties(Handle(3), 5), None);
        assert_eq!(tracker.lookup_memory_properties(Handle(99), 0), None);

        assert_eq!(tracker.find_memory_type_index(Handle(3), !0, HOST_VISIBLE), 1);
        assert_eq!(tracker.find_memory_type_index(Handle(3), 0b01, HOST_VISIBLE), 0);
        assert_eq!(tracker.find_memory_type_index(Handle(99), !0, HOST_VISIBLE), 0);
    }

    #[test]
    fn device_only_memory_lookup() {
        let mut tracker = tracker_with_memory_types(Vec::new());
        tracker
            .add(ObjectCategory::DeviceMemory, Handle(10))
            .unwrap()
            .payload
            .as_device_memory_mut()
            .unwrap()
            .property_flags = DEVICE_LOCAL;
        tracker
            .add(ObjectCategory::DeviceMemory, Handle(11))
            .unwrap()
            .payload
            .as_device_memory_mut()
            .unwrap()
            .property_flags = DEVICE_LOCAL | HOST_VISIBLE;

        assert!(tracker.is_device_only_memory(Handle(3), Handle(10)));
        assert!(!tracker.is_device_only_memory(Handle(3), Handle(11)));
        assert!(!tracker.is_device_only_memory(Handle(3), Handle(12)));
    }
}
