// Swapchain - Window presentation
//
// The render targets are everything sized by the window: the swapchain and
// its images, one view and framebuffer per image, the render pass and the
// shared depth buffer. They are built together and torn down together.

use ash::vk;

use super::buffer::DepthBuffer;
use super::device::VulkanDevice;
use super::driver::Driver;
use super::memory::MemoryPolicy;
use super::pipeline::{create_framebuffers, create_render_pass};
use super::sync::submit_and_wait;
use crate::config::Config;
use crate::error::{Result, VkResultExt, VwError};

/// Swapchain options taken from the config
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainSettings {
    pub present_mode: vk::PresentModeKHR,
    /// Requested image count before clamping
    pub buffering: u32,
}

impl Default for SwapchainSettings {
    fn default() -> Self {
        Self {
            present_mode: vk::PresentModeKHR::MAILBOX,
            buffering: 2,
        }
    }
}

impl From<&Config> for SwapchainSettings {
    fn from(config: &Config) -> Self {
        Self {
            present_mode: config.present_mode(),
            buffering: config.graphics.buffering,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Surface negotiation
// ─────────────────────────────────────────────────────────────────────────────

/// Prefer sRGB BGRA8; a lone UNDEFINED entry means "anything", so pick UNORM BGRA8
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    if let [only] = formats {
        if only.format == vk::Format::UNDEFINED {
            return Some(vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: only.color_space,
            });
        }
    }

    formats
        .iter()
        .find(|f| f.format == vk::Format::B8G8R8A8_SRGB && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| formats.first())
        .copied()
}

/// The requested mode when available, otherwise FIFO (always supported)
pub fn choose_present_mode(requested: vk::PresentModeKHR, available: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if available.contains(&requested) {
        requested
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Requested depth clamped to the surface limits (max 0 means unbounded)
pub fn choose_image_count(requested: u32, caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut image_count = requested.max(caps.min_image_count);
    if caps.max_image_count > 0 && image_count > caps.max_image_count {
        image_count = caps.max_image_count;
    }
    image_count
}

pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// A swapchain cannot be built with zero area, e.g. for a minimized window
pub fn check_extent(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(VwError::invalid(format!("render target size {}x{} has no area", width, height)));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Render targets
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct RenderTargets {
    pub swapchain: vk::SwapchainKHR,
    /// Owned by the swapchain
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub render_pass: vk::RenderPass,
    pub depth: DepthBuffer,
    pub framebuffers: Vec<vk::Framebuffer>,
}

impl RenderTargets {
    /// Build views, depth buffer, render pass and framebuffers around an
    /// existing swapchain, then move every present image to PRESENT_SRC_KHR
    ///
    /// Takes ownership of `swapchain`: it is destroyed if anything fails.
    #[allow(clippy::too_many_arguments)]
    pub fn from_swapchain<D: Driver>(
        driver: &D,
        swapchain: vk::SwapchainKHR,
        images: Vec<vk::Image>,
        format: vk::Format,
        extent: vk::Extent2D,
        queue: vk::Queue,
        cmd: vk::CommandBuffer,
        policy: MemoryPolicy,
    ) -> Result<Self> {
        let mut targets = RenderTargets {
            swapchain,
            images,
            format,
            extent,
            ..Default::default()
        };

        match targets.build(driver, queue, cmd, policy) {
            Ok(()) => {
                log::info!(
                    "Render targets ready: {} images, {}x{}, {:?}",
                    targets.images.len(),
                    extent.width,
                    extent.height,
                    format
                );
                Ok(targets)
            }
            Err(e) => {
                targets.destroy(driver);
                Err(e)
            }
        }
    }

    fn build<D: Driver>(
        &mut self,
        driver: &D,
        queue: vk::Queue,
        cmd: vk::CommandBuffer,
        policy: MemoryPolicy,
    ) -> Result<()> {
        for &image in &self.images {
            let create_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(color_range());

            let view = unsafe { driver.create_image_view(&create_info) }.context("Failed to create image view")?;
            self.image_views.push(view);
        }

        self.depth = DepthBuffer::new(driver, self.extent, policy)?;
        self.render_pass = create_render_pass(driver, self.format)?;
        self.framebuffers =
            create_framebuffers(driver, &self.image_views, self.depth.view, self.render_pass, self.extent)?;

        transition_to_present(driver, queue, cmd, &self.images)
    }

    /// Framebuffers, image views, render pass, depth view, depth image,
    /// depth memory, swapchain
    pub fn destroy<D: Driver>(&mut self, driver: &D) {
        unsafe {
            for framebuffer in self.framebuffers.drain(..) {
                driver.destroy_framebuffer(framebuffer);
            }
            for view in self.image_views.drain(..) {
                driver.destroy_image_view(view);
            }
            if self.render_pass != vk::RenderPass::null() {
                driver.destroy_render_pass(self.render_pass);
                self.render_pass = vk::RenderPass::null();
            }
            self.depth.destroy(driver);
            if self.swapchain != vk::SwapchainKHR::null() {
                driver.destroy_swapchain(self.swapchain);
                self.swapchain = vk::SwapchainKHR::null();
            }
        }
        self.images.clear();
    }

    pub fn viewport(&self) -> vk::Viewport {
        vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.extent.width as f32,
            height: self.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    pub fn scissor(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        }
    }
}

pub(crate) fn color_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// One-time submit moving fresh present images from UNDEFINED to PRESENT_SRC_KHR
fn transition_to_present<D: Driver>(
    driver: &D,
    queue: vk::Queue,
    cmd: vk::CommandBuffer,
    images: &[vk::Image],
) -> Result<()> {
    let barriers: Vec<_> = images
        .iter()
        .map(|&image| {
            vk::ImageMemoryBarrier::builder()
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::MEMORY_READ)
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(color_range())
                .build()
        })
        .collect();

    let begin_info = vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

    unsafe {
        driver
            .begin_command_buffer(cmd, &begin_info)
            .context("Failed to begin command buffer")?;
        driver.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            &barriers,
        );
        driver
            .end_command_buffer(cmd)
            .context("Failed to end command buffer")?;
    }

    submit_and_wait(driver, queue, cmd)
}

impl VulkanDevice {
    /// Create a swapchain for the device's surface and wrap it in render targets
    pub fn create_render_targets(
        &self,
        width: u32,
        height: u32,
        settings: SwapchainSettings,
        policy: MemoryPolicy,
    ) -> Result<RenderTargets> {
        check_extent(width, height)?;
        log::info!("Creating swapchain: {}x{}", width, height);

        let (surface_caps, formats, present_modes) = unsafe {
            (
                self.surface_loader
                    .get_physical_device_surface_capabilities(self.physical_device, self.surface)
                    .context("Failed to query surface capabilities")?,
                self.surface_loader
                    .get_physical_device_surface_formats(self.physical_device, self.surface)
                    .context("Failed to query surface formats")?,
                self.surface_loader
                    .get_physical_device_surface_present_modes(self.physical_device, self.surface)
                    .context("Failed to query present modes")?,
            )
        };

        let surface_format = choose_surface_format(&formats)
            .ok_or_else(|| VwError::invalid("surface reports no formats"))?;
        let present_mode = choose_present_mode(settings.present_mode, &present_modes);
        if present_mode != settings.present_mode {
            log::warn!("Present mode {:?} unsupported, using FIFO", settings.present_mode);
        }
        log::info!("Present mode: {:?}", present_mode);

        let extent = choose_extent(&surface_caps, width, height);
        check_extent(extent.width, extent.height)?;
        let image_count = choose_image_count(settings.buffering, &surface_caps);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(surface_caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let swapchain = unsafe { self.swapchain_loader.create_swapchain(&create_info, None) }
            .context("Failed to create swapchain")?;

        let images = match unsafe { self.swapchain_loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(result) => {
                unsafe { self.destroy_swapchain(swapchain) };
                return Err(result).context("Failed to get swapchain images");
            }
        };

        log::info!("Created swapchain with {} images", images.len());

        RenderTargets::from_swapchain(
            self,
            swapchain,
            images,
            surface_format.format,
            extent,
            self.present_queue,
            self.command_buffer,
            policy,
        )
    }
}
