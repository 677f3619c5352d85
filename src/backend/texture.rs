// Textures
//
// Every texture owns a linear, host-mappable RGBA8 image that the CPU writes
// rows into. When the device cannot sample linear images directly the
// texture is "staged": an optimal-tiled device-local image is sampled
// instead and refreshed from the linear one by an image copy.
//
// Uploads are only recorded here. The context queues textures after every
// write and records their GPU-side work at the start of the next frame.

use ash::vk;

use super::driver::Driver;
use super::memory::{self, MemoryPolicy, HOST_MAPPABLE};
use super::swapchain::color_range;
use crate::error::{Result, VkResultExt, VwError};

pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

const BYTES_PER_PIXEL: usize = 4;

/// Which one-time layout transitions a texture has had recorded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadState {
    mappable_ready: bool,
    sampled_ready: bool,
}

#[derive(Debug, Default)]
pub struct Texture {
    /// Linear image the CPU writes into
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    /// Optimal image sampled by shaders (staged textures only)
    pub sampled_image: vk::Image,
    pub sampled_memory: vk::DeviceMemory,
    pub sampler: vk::Sampler,
    pub view: vk::ImageView,
    pub width: u32,
    pub height: u32,
    pub row_pitch: vk::DeviceSize,
    pub row_offset: vk::DeviceSize,
    pub mapped_size: vk::DeviceSize,
    pub staged: bool,
    /// Linear image has left PREINITIALIZED, sampled image had its first transition
    upload: UploadState,
}

impl Texture {
    pub fn new<D: Driver>(driver: &D, width: u32, height: u32, rgba: &[u8], policy: MemoryPolicy) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(VwError::invalid(format!("texture size {}x{} is empty", width, height)));
        }
        check_pixel_count(width, height, rgba)?;

        let linear_features = driver.format_properties(TEXTURE_FORMAT).linear_tiling_features;
        let mut texture = Texture {
            width,
            height,
            staged: !linear_features.contains(vk::FormatFeatureFlags::SAMPLED_IMAGE),
            ..Default::default()
        };

        match texture.build(driver, rgba, policy) {
            Ok(()) => {
                log::debug!(
                    "Created {}x{} texture (pitch {}, {})",
                    width,
                    height,
                    texture.row_pitch,
                    if texture.staged { "staged" } else { "linear" }
                );
                Ok(texture)
            }
            Err(e) => {
                texture.destroy(driver);
                Err(e)
            }
        }
    }

    fn build<D: Driver>(&mut self, driver: &D, rgba: &[u8], policy: MemoryPolicy) -> Result<()> {
        let usage = if self.staged {
            vk::ImageUsageFlags::TRANSFER_SRC
        } else {
            vk::ImageUsageFlags::SAMPLED
        };
        self.image = self.create_image(driver, vk::ImageTiling::LINEAR, vk::ImageLayout::PREINITIALIZED, usage)?;

        let requirements = unsafe { driver.image_memory_requirements(self.image) };
        self.memory = memory::allocate(
            driver,
            requirements,
            HOST_MAPPABLE,
            policy,
            "Failed to allocate texture memory",
        )?;
        self.mapped_size = requirements.size;

        unsafe { driver.bind_image_memory(self.image, self.memory, 0) }.context("Failed to bind texture memory")?;

        let layout = unsafe {
            driver.image_subresource_layout(
                self.image,
                vk::ImageSubresource {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    array_layer: 0,
                },
            )
        };
        self.row_pitch = layout.row_pitch;
        self.row_offset = layout.offset;

        if self.staged {
            self.sampled_image = self.create_image(
                driver,
                vk::ImageTiling::OPTIMAL,
                vk::ImageLayout::UNDEFINED,
                vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            )?;

            let requirements = unsafe { driver.image_memory_requirements(self.sampled_image) };
            self.sampled_memory = memory::allocate(
                driver,
                requirements,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
                policy,
                "Failed to allocate staged texture memory",
            )?;

            unsafe { driver.bind_image_memory(self.sampled_image, self.sampled_memory, 0) }
                .context("Failed to bind staged texture memory")?;
        }

        self.write_pixels(driver, rgba)?;

        let sampler_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::NEAREST)
            .min_filter(vk::Filter::NEAREST)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .anisotropy_enable(false)
            .max_anisotropy(1.0)
            .compare_enable(false)
            .compare_op(vk::CompareOp::NEVER)
            .min_lod(0.0)
            .max_lod(0.0)
            .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE)
            .unnormalized_coordinates(false);

        self.sampler = unsafe { driver.create_sampler(&sampler_info) }.context("Failed to create sampler")?;

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(self.sampled())
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(TEXTURE_FORMAT)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::R,
                g: vk::ComponentSwizzle::G,
                b: vk::ComponentSwizzle::B,
                a: vk::ComponentSwizzle::A,
            })
            .subresource_range(color_range());

        self.view = unsafe { driver.create_image_view(&view_info) }.context("Failed to create texture view")?;
        Ok(())
    }

    fn create_image<D: Driver>(
        &self,
        driver: &D,
        tiling: vk::ImageTiling,
        initial_layout: vk::ImageLayout,
        usage: vk::ImageUsageFlags,
    ) -> Result<vk::Image> {
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(TEXTURE_FORMAT)
            .extent(self.extent())
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(tiling)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(initial_layout);

        unsafe { driver.create_image(&image_info) }.context("Failed to create texture image")
    }

    fn extent(&self) -> vk::Extent3D {
        vk::Extent3D {
            width: self.width,
            height: self.height,
            depth: 1,
        }
    }

    /// The image shaders read from
    pub fn sampled(&self) -> vk::Image {
        if self.staged {
            self.sampled_image
        } else {
            self.image
        }
    }

    /// Layout the sampled image is in whenever a frame's render pass runs
    pub fn read_layout(&self) -> vk::ImageLayout {
        if self.staged {
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        } else {
            vk::ImageLayout::GENERAL
        }
    }

    pub fn descriptor(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler,
            image_view: self.view,
            image_layout: self.read_layout(),
        }
    }

    /// Replace the pixels; the size must match the texture's
    pub fn update<D: Driver>(&mut self, driver: &D, width: u32, height: u32, rgba: &[u8]) -> Result<()> {
        if width != self.width || height != self.height {
            return Err(VwError::invalid(format!(
                "update is {}x{} but the texture is {}x{}",
                width, height, self.width, self.height
            )));
        }
        check_pixel_count(width, height, rgba)?;
        self.write_pixels(driver, rgba)
    }

    fn write_pixels<D: Driver>(&self, driver: &D, rgba: &[u8]) -> Result<()> {
        unsafe {
            let ptr = driver
                .map_memory(self.memory, 0, self.mapped_size)
                .context("Failed to map texture memory")? as *mut u8;
            let mapped = std::slice::from_raw_parts_mut(ptr, self.mapped_size as usize);

            let result = copy_rows(
                mapped,
                self.row_offset as usize,
                self.row_pitch as usize,
                self.width as usize,
                self.height as usize,
                rgba,
            );
            driver.unmap_memory(self.memory);
            result
        }
    }

    /// Record this texture's pending GPU-side work into `cmd`
    pub fn record_upload<D: Driver>(&mut self, driver: &D, cmd: vk::CommandBuffer) {
        if !self.upload.mappable_ready {
            let (dst_access, dst_stage) = if self.staged {
                (vk::AccessFlags::TRANSFER_READ, vk::PipelineStageFlags::TRANSFER)
            } else {
                (vk::AccessFlags::SHADER_READ, vk::PipelineStageFlags::FRAGMENT_SHADER)
            };
            let barrier = image_barrier(
                self.image,
                vk::ImageLayout::PREINITIALIZED,
                vk::ImageLayout::GENERAL,
                vk::AccessFlags::HOST_WRITE,
                dst_access,
            );
            unsafe { driver.cmd_pipeline_barrier(cmd, vk::PipelineStageFlags::HOST, dst_stage, &[barrier]) };
            self.upload.mappable_ready = true;
        }

        if !self.staged {
            return;
        }

        let old_layout = if self.upload.sampled_ready {
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        } else {
            vk::ImageLayout::UNDEFINED
        };
        let to_transfer = image_barrier(
            self.sampled_image,
            old_layout,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::AccessFlags::SHADER_READ,
            vk::AccessFlags::TRANSFER_WRITE,
        );

        let layers = vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        };
        let region = vk::ImageCopy {
            src_subresource: layers,
            src_offset: vk::Offset3D::default(),
            dst_subresource: layers,
            dst_offset: vk::Offset3D::default(),
            extent: self.extent(),
        };

        let to_shader = image_barrier(
            self.sampled_image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::SHADER_READ,
        );

        unsafe {
            driver.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::PipelineStageFlags::TRANSFER,
                &[to_transfer],
            );
            driver.cmd_copy_image(
                cmd,
                self.image,
                vk::ImageLayout::GENERAL,
                self.sampled_image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                region,
            );
            driver.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                &[to_shader],
            );
        }
        self.upload.sampled_ready = true;
    }

    pub fn upload_state(&self) -> UploadState {
        self.upload
    }

    /// Roll back to `state` when recorded uploads never reached the GPU
    pub fn restore_upload_state(&mut self, state: UploadState) {
        self.upload = state;
    }

    /// View, sampler, optimal image and memory, linear image and memory
    pub fn destroy<D: Driver>(&mut self, driver: &D) {
        unsafe {
            if self.view != vk::ImageView::null() {
                driver.destroy_image_view(self.view);
            }
            if self.sampler != vk::Sampler::null() {
                driver.destroy_sampler(self.sampler);
            }
            if self.sampled_image != vk::Image::null() {
                driver.destroy_image(self.sampled_image);
            }
            if self.sampled_memory != vk::DeviceMemory::null() {
                driver.free_memory(self.sampled_memory);
            }
            if self.image != vk::Image::null() {
                driver.destroy_image(self.image);
            }
            if self.memory != vk::DeviceMemory::null() {
                driver.free_memory(self.memory);
            }
        }
        self.view = vk::ImageView::null();
        self.sampler = vk::Sampler::null();
        self.sampled_image = vk::Image::null();
        self.sampled_memory = vk::DeviceMemory::null();
        self.image = vk::Image::null();
        self.memory = vk::DeviceMemory::null();
    }
}

fn check_pixel_count(width: u32, height: u32, rgba: &[u8]) -> Result<()> {
    let expected = width as usize * height as usize * BYTES_PER_PIXEL;
    if rgba.len() != expected {
        return Err(VwError::invalid(format!(
            "{}x{} texture needs {} bytes, got {}",
            width,
            height,
            expected,
            rgba.len()
        )));
    }
    Ok(())
}

/// Copy tightly packed RGBA rows into a pitched destination
///
/// Row `y` lands at `offset + y * pitch`; bytes past `width * 4` in each row
/// are left as they were.
pub fn copy_rows(dst: &mut [u8], offset: usize, pitch: usize, width: usize, height: usize, rgba: &[u8]) -> Result<()> {
    let row_bytes = width * BYTES_PER_PIXEL;
    if pitch < row_bytes {
        return Err(VwError::invalid(format!("row pitch {} is below {} bytes", pitch, row_bytes)));
    }
    if height > 0 && offset + (height - 1) * pitch + row_bytes > dst.len() {
        return Err(VwError::invalid("texture rows overrun the mapped memory"));
    }

    for (y, row) in rgba.chunks_exact(row_bytes).take(height).enumerate() {
        let start = offset + y * pitch;
        dst[start..start + row_bytes].copy_from_slice(row);
    }
    Ok(())
}

fn image_barrier(
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
) -> vk::ImageMemoryBarrier {
    vk::ImageMemoryBarrier::builder()
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(color_range())
        .build()
}
