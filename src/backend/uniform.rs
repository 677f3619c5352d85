// Draw instances
//
// A draw instance pairs one pipeline with its own uniform buffer and
// descriptor set. Binding 0 always points at the whole uniform buffer;
// binding 1 holds whatever textures were last bound.

use ash::vk;

use super::buffer::{allocate_buffer_memory, create_buffer, write_mapped};
use super::driver::Driver;
use super::memory::{MemoryPolicy, HOST_MAPPABLE};
use super::pipeline::Pipeline;
use crate::error::{Result, VkResultExt, VwError};

/// Floats in the textured-instance transform (one 4x4 matrix)
pub const MATRIX_FLOATS: usize = 16;

#[derive(Debug, Default)]
pub struct DrawInstance {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub pool: vk::DescriptorPool,
    pub set: vk::DescriptorSet,
    /// By-value copy of the pipeline's handles
    pub pipeline: Pipeline,
    /// Uniform buffer size in bytes
    pub size: vk::DeviceSize,
}

impl DrawInstance {
    /// Create the uniform buffer and descriptor set, writing `textures` to
    /// binding 1 when given
    pub fn new<D: Driver>(
        driver: &D,
        pipeline: Pipeline,
        n_floats: usize,
        textures: &[vk::DescriptorImageInfo],
        policy: MemoryPolicy,
    ) -> Result<Self> {
        if n_floats == 0 {
            return Err(VwError::invalid("uniform buffer needs at least one float"));
        }
        check_texture_count(&pipeline, textures.len())?;

        let mut instance = DrawInstance {
            pipeline,
            size: (n_floats * std::mem::size_of::<f32>()) as vk::DeviceSize,
            ..Default::default()
        };

        match instance.build(driver, textures, policy) {
            Ok(()) => {
                log::debug!(
                    "Created draw instance: {} byte uniform, {} texture(s)",
                    instance.size,
                    textures.len()
                );
                Ok(instance)
            }
            Err(e) => {
                instance.destroy(driver);
                Err(e)
            }
        }
    }

    fn build<D: Driver>(&mut self, driver: &D, textures: &[vk::DescriptorImageInfo], policy: MemoryPolicy) -> Result<()> {
        self.buffer = create_buffer(
            driver,
            self.size,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            "Failed to create uniform buffer",
        )?;

        // Pool sized for every binding the layout declares
        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: 1,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: self.pipeline.texture_slots.max(1),
            },
        ];
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(1)
            .pool_sizes(&pool_sizes);

        self.pool =
            unsafe { driver.create_descriptor_pool(&pool_info) }.context("Failed to create descriptor pool")?;

        let set_layouts = [self.pipeline.set_layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(&set_layouts);

        let sets = unsafe { driver.allocate_descriptor_sets(&alloc_info) }
            .context("Failed to allocate descriptor set")?;
        self.set = sets.into_iter().next().unwrap_or_default();

        self.memory = allocate_buffer_memory(
            driver,
            self.buffer,
            HOST_MAPPABLE,
            policy,
            "Failed to allocate uniform memory",
        )?;

        unsafe { driver.bind_buffer_memory(self.buffer, self.memory, 0) }
            .context("Failed to bind uniform memory")?;

        let buffer_info = [vk::DescriptorBufferInfo {
            buffer: self.buffer,
            offset: 0,
            range: self.size,
        }];
        let uniform_write = vk::WriteDescriptorSet::builder()
            .dst_set(self.set)
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&buffer_info)
            .build();

        unsafe { driver.update_descriptor_sets(&[uniform_write]) };

        if !textures.is_empty() {
            self.write_textures(driver, textures)?;
        }
        Ok(())
    }

    /// Point binding 1 at `textures`, starting at array element 0
    pub fn write_textures<D: Driver>(&self, driver: &D, textures: &[vk::DescriptorImageInfo]) -> Result<()> {
        check_texture_count(&self.pipeline, textures.len())?;
        if textures.is_empty() {
            return Ok(());
        }

        let texture_write = vk::WriteDescriptorSet::builder()
            .dst_set(self.set)
            .dst_binding(1)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(textures)
            .build();

        unsafe { driver.update_descriptor_sets(&[texture_write]) };
        Ok(())
    }

    /// Copy `floats` to the start of the uniform buffer
    pub fn write<D: Driver>(&self, driver: &D, floats: &[f32]) -> Result<()> {
        let bytes = std::mem::size_of_val(floats) as vk::DeviceSize;
        if bytes > self.size {
            return Err(VwError::invalid(format!(
                "{} floats do not fit a {} byte uniform buffer",
                floats.len(),
                self.size
            )));
        }
        write_mapped(driver, self.memory, floats)
    }

    /// Free memory, free the set, destroy the pool, destroy the buffer
    pub fn destroy<D: Driver>(&mut self, driver: &D) {
        unsafe {
            if self.memory != vk::DeviceMemory::null() {
                driver.free_memory(self.memory);
            }
            if self.set != vk::DescriptorSet::null() {
                if let Err(result) = driver.free_descriptor_sets(self.pool, &[self.set]) {
                    log::warn!("Failed to free descriptor set: {:?}", result);
                }
            }
            if self.pool != vk::DescriptorPool::null() {
                driver.destroy_descriptor_pool(self.pool);
            }
            if self.buffer != vk::Buffer::null() {
                driver.destroy_buffer(self.buffer);
            }
        }
        self.memory = vk::DeviceMemory::null();
        self.set = vk::DescriptorSet::null();
        self.pool = vk::DescriptorPool::null();
        self.buffer = vk::Buffer::null();
    }
}

fn check_texture_count(pipeline: &Pipeline, count: usize) -> Result<()> {
    if count > pipeline.texture_slots as usize {
        return Err(VwError::invalid(format!(
            "{} textures exceed the pipeline's {} sampler slot(s)",
            count, pipeline.texture_slots
        )));
    }
    Ok(())
}
