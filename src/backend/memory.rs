// Device memory selection and allocation
//
// Every resource gets its own allocation sized by the driver-reported
// requirements. The memory type is the first one allowed by the resource's
// type bits that has all requested property flags.

use ash::vk;

use super::driver::Driver;
use crate::config::MemoryConfig;
use crate::error::{Result, VkResultExt, VwError};

/// What to do when no memory type matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryPolicy {
    /// Report `VwError::NoMemoryType`
    #[default]
    Strict,
    /// Use type 0 and log one warning
    FallbackToFirst,
}

impl From<&MemoryConfig> for MemoryPolicy {
    fn from(config: &MemoryConfig) -> Self {
        if config.fallback_to_first_type {
            MemoryPolicy::FallbackToFirst
        } else {
            MemoryPolicy::Strict
        }
    }
}

/// Find a suitable memory type index
pub fn find_memory_type(
    mem_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
    policy: MemoryPolicy,
) -> Result<u32> {
    for i in 0..mem_properties.memory_type_count {
        let has_type = (type_filter & (1 << i)) != 0;
        let has_properties = mem_properties.memory_types[i as usize]
            .property_flags
            .contains(properties);

        if has_type && has_properties {
            return Ok(i);
        }
    }

    match policy {
        MemoryPolicy::Strict => Err(VwError::NoMemoryType {
            type_bits: type_filter,
            flags: properties,
        }),
        MemoryPolicy::FallbackToFirst => {
            log::warn!(
                "No memory type in bits {:#b} has {:?}, falling back to type 0",
                type_filter,
                properties
            );
            Ok(0)
        }
    }
}

/// Allocate one block satisfying `requirements` with the given properties
pub fn allocate<D: Driver>(
    driver: &D,
    requirements: vk::MemoryRequirements,
    properties: vk::MemoryPropertyFlags,
    policy: MemoryPolicy,
    what: &'static str,
) -> Result<vk::DeviceMemory> {
    let memory_type_index = find_memory_type(
        &driver.memory_properties(),
        requirements.memory_type_bits,
        properties,
        policy,
    )?;

    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);

    unsafe { driver.allocate_memory(&alloc_info) }.context(what)
}

/// Host-visible memory that needs no explicit flushes
pub const HOST_MAPPABLE: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);
