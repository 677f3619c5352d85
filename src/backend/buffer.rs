// Buffer and image memory helpers
//
// One allocation per resource. Host-visible memory is always coherent, so
// mapped writes need no flush.

use ash::vk;

use super::driver::Driver;
use super::memory::{self, MemoryPolicy};
use crate::error::{Result, VkResultExt};

/// Create an exclusive buffer of `size` bytes
pub fn create_buffer<D: Driver>(
    driver: &D,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    what: &'static str,
) -> Result<vk::Buffer> {
    let buffer_info = vk::BufferCreateInfo::builder()
        .size(size)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    unsafe { driver.create_buffer(&buffer_info) }.context(what)
}

/// Allocate memory of the buffer's reported size
pub fn allocate_buffer_memory<D: Driver>(
    driver: &D,
    buffer: vk::Buffer,
    properties: vk::MemoryPropertyFlags,
    policy: MemoryPolicy,
    what: &'static str,
) -> Result<vk::DeviceMemory> {
    let requirements = unsafe { driver.buffer_memory_requirements(buffer) };
    memory::allocate(driver, requirements, properties, policy, what)
}

/// Map `memory`, copy `data` to its start and unmap
pub fn write_mapped<D: Driver, T: Copy>(driver: &D, memory: vk::DeviceMemory, data: &[T]) -> Result<()> {
    let size = std::mem::size_of_val(data) as vk::DeviceSize;

    unsafe {
        let ptr = driver
            .map_memory(memory, 0, size)
            .context("Failed to map memory")? as *mut T;

        ptr.copy_from_nonoverlapping(data.as_ptr(), data.len());
        driver.unmap_memory(memory);
    }

    Ok(())
}

/// Depth attachment shared by every framebuffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DepthBuffer {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
}

pub const DEPTH_FORMAT: vk::Format = vk::Format::D16_UNORM;

impl DepthBuffer {
    /// Create the depth image, memory, and view
    pub fn new<D: Driver>(driver: &D, extent: vk::Extent2D, policy: MemoryPolicy) -> Result<Self> {
        let mut depth = DepthBuffer::default();
        match depth.build(driver, extent, policy) {
            Ok(()) => Ok(depth),
            Err(e) => {
                depth.destroy(driver);
                Err(e)
            }
        }
    }

    fn build<D: Driver>(&mut self, driver: &D, extent: vk::Extent2D, policy: MemoryPolicy) -> Result<()> {
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(DEPTH_FORMAT)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        self.image = unsafe { driver.create_image(&image_info) }.context("Failed to create depth image")?;

        let requirements = unsafe { driver.image_memory_requirements(self.image) };
        self.memory = memory::allocate(
            driver,
            requirements,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            policy,
            "Failed to allocate depth image memory",
        )?;

        unsafe { driver.bind_image_memory(self.image, self.memory, 0) }
            .context("Failed to bind depth image memory")?;

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(self.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(DEPTH_FORMAT)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::DEPTH,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        self.view = unsafe { driver.create_image_view(&view_info) }.context("Failed to create depth image view")?;
        Ok(())
    }

    /// View, image, memory; null handles are skipped
    pub fn destroy<D: Driver>(&mut self, driver: &D) {
        unsafe {
            if self.view != vk::ImageView::null() {
                driver.destroy_image_view(self.view);
            }
            if self.image != vk::Image::null() {
                driver.destroy_image(self.image);
            }
            if self.memory != vk::DeviceMemory::null() {
                driver.free_memory(self.memory);
            }
        }
        *self = DepthBuffer::default();
    }
}
