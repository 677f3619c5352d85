// Shapes: host-visible vertex buffers filled once from floats

use ash::vk;

use super::buffer::{allocate_buffer_memory, create_buffer, write_mapped};
use super::driver::Driver;
use super::memory::{MemoryPolicy, HOST_MAPPABLE};
use crate::error::{Result, VkResultExt, VwError};

/// Floats per vertex (one vec4)
pub const FLOATS_PER_VERTEX: usize = 4;

#[derive(Debug, Default)]
pub struct Shape {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub vertex_count: u32,
}

impl Shape {
    pub fn new<D: Driver>(driver: &D, vertices: &[f32], policy: MemoryPolicy) -> Result<Self> {
        if vertices.is_empty() {
            return Err(VwError::invalid("shape needs at least one vertex"));
        }

        let mut shape = Shape {
            vertex_count: (vertices.len() / FLOATS_PER_VERTEX) as u32,
            ..Default::default()
        };

        match shape.upload(driver, vertices, policy) {
            Ok(()) => {
                log::debug!("Created shape with {} vertices", shape.vertex_count);
                Ok(shape)
            }
            Err(e) => {
                shape.destroy(driver);
                Err(e)
            }
        }
    }

    fn upload<D: Driver>(&mut self, driver: &D, vertices: &[f32], policy: MemoryPolicy) -> Result<()> {
        let size = std::mem::size_of_val(vertices) as vk::DeviceSize;

        self.buffer = create_buffer(
            driver,
            size,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            "Failed to create vertex buffer",
        )?;
        self.memory = allocate_buffer_memory(
            driver,
            self.buffer,
            HOST_MAPPABLE,
            policy,
            "Failed to allocate vertex memory",
        )?;

        write_mapped(driver, self.memory, vertices)?;

        unsafe { driver.bind_buffer_memory(self.buffer, self.memory, 0) }.context("Failed to bind vertex memory")
    }

    /// Buffer, then memory
    pub fn destroy<D: Driver>(&mut self, driver: &D) {
        unsafe {
            if self.buffer != vk::Buffer::null() {
                driver.destroy_buffer(self.buffer);
            }
            if self.memory != vk::DeviceMemory::null() {
                driver.free_memory(self.memory);
            }
        }
        self.buffer = vk::Buffer::null();
        self.memory = vk::DeviceMemory::null();
    }
}
