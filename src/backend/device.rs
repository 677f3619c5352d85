// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation with window-system extensions (+ validation layers)
// - Surface creation from caller-supplied raw window handles
// - Physical device selection (graphics + present queue, prefer discrete GPU)
// - Logical device, present queue, command pool and the single command buffer
// - Forwarding the `Driver` calls to ash

use anyhow::{Context, Result};
use ash::extensions::{ext::DebugUtils, khr};
use ash::prelude::VkResult;
use ash::{vk, Entry};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::{c_void, CStr, CString};

use super::driver::Driver;

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    // Vulkan handles (destroyed in reverse order in Drop)
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub instance: ash::Instance,
    _entry: Entry,

    // Presentation
    pub surface: vk::SurfaceKHR,
    pub surface_loader: khr::Surface,
    pub swapchain_loader: khr::Swapchain,

    // Queue handles
    pub present_queue: vk::Queue,
    pub present_queue_family: u32,

    // The one command buffer every frame and upload is recorded into
    pub command_pool: vk::CommandPool,
    pub command_buffer: vk::CommandBuffer,

    // Debug utils (if validation enabled)
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,

    // Device properties (cached)
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl VulkanDevice {
    /// Create the device and everything that lives as long as it
    ///
    /// # Arguments
    /// * `app_name` - Application name for debugging
    /// * `display` / `window` - Native handles of the window to present to
    /// * `enable_validation` - Enable Vulkan validation layers
    pub fn new(
        app_name: &str,
        display: RawDisplayHandle,
        window: RawWindowHandle,
        enable_validation: bool,
    ) -> Result<Self> {
        log::info!("Creating Vulkan device: {}", app_name);

        // Step 1: Load Vulkan library
        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        // Step 2: Create instance
        let instance = Self::create_instance(&entry, app_name, display, enable_validation)?;

        // Step 3: Setup debug messenger if validation enabled
        let debug_utils = if enable_validation {
            match Self::setup_debug_messenger(&entry, &instance) {
                Ok(debug_utils) => Some(debug_utils),
                Err(e) => {
                    unsafe { Self::destroy_instance(&instance, None, None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        // Step 4: Wrap the caller's window in a surface
        let surface_loader = khr::Surface::new(&entry, &instance);
        let surface = match unsafe { ash_window::create_surface(&entry, &instance, display, window, None) } {
            Ok(surface) => surface,
            Err(e) => {
                unsafe { Self::destroy_instance(&instance, None, debug_utils.as_ref()) };
                return Err(e).context("Failed to create window surface");
            }
        };

        // Steps 5-7: GPU, logical device, command buffer
        let created = Self::pick_physical_device(&instance, &surface_loader, surface).and_then(
            |(physical_device, present_queue_family)| {
                let (device, present_queue) =
                    Self::create_logical_device(&instance, physical_device, present_queue_family)?;
                match Self::create_command_buffer(&device, present_queue_family) {
                    Ok((pool, cmd)) => Ok((physical_device, present_queue_family, device, present_queue, pool, cmd)),
                    Err(e) => {
                        unsafe { device.destroy_device(None) };
                        Err(e)
                    }
                }
            },
        );
        let (physical_device, present_queue_family, device, present_queue, command_pool, command_buffer) =
            match created {
                Ok(created) => created,
                Err(e) => {
                    unsafe {
                        Self::destroy_instance(&instance, Some((&surface_loader, surface)), debug_utils.as_ref())
                    };
                    return Err(e);
                }
            };

        // Step 8: Cache device properties
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );

        let swapchain_loader = khr::Swapchain::new(&instance, &device);

        Ok(Self {
            device,
            physical_device,
            instance,
            _entry: entry,
            surface,
            surface_loader,
            swapchain_loader,
            present_queue,
            present_queue_family,
            command_pool,
            command_buffer,
            debug_utils,
            properties,
            memory_properties,
        })
    }

    fn create_instance(
        entry: &Entry,
        app_name: &str,
        display: RawDisplayHandle,
        enable_validation: bool,
    ) -> Result<ash::Instance> {
        let app_name_cstr = CString::new(app_name)?;
        let engine_name = CString::new("vw")?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_0);

        // Surface extensions for whatever window system the caller uses
        let mut extensions = ash_window::enumerate_required_extensions(display)
            .context("Unsupported window system")?
            .to_vec();

        if enable_validation {
            extensions.push(DebugUtils::name().as_ptr());
        }

        // Validation layers
        let validation_layer = CString::new("VK_LAYER_KHRONOS_validation")?;
        let layer_names = if enable_validation {
            vec![validation_layer.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("Failed to create Vulkan instance")?;

        Ok(instance)
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .context("Failed to create debug messenger")?;

        Ok((debug_utils, messenger))
    }

    fn pick_physical_device(
        instance: &ash::Instance,
        surface_loader: &khr::Surface,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, u32)> {
        let devices = unsafe { instance.enumerate_physical_devices() }?;

        if devices.is_empty() {
            anyhow::bail!("No Vulkan-capable GPU found");
        }

        // Score each device
        let mut best_device = None;
        let mut best_score = 0;

        for device in devices {
            let props = unsafe { instance.get_physical_device_properties(device) };

            let queue_families =
                unsafe { instance.get_physical_device_queue_family_properties(device) };

            // One family has to both draw and present
            let present_family = queue_families.iter().enumerate().find_map(|(i, family)| {
                let index = i as u32;
                let presents = unsafe {
                    surface_loader.get_physical_device_surface_support(device, index, surface)
                }
                .unwrap_or(false);
                (presents && family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
                    .then_some(index)
            });

            if let Some(present_family) = present_family {
                // Score device (prefer discrete GPU)
                let score = match props.device_type {
                    vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
                    vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
                    _ => 1,
                };

                if score > best_score {
                    best_score = score;
                    best_device = Some((device, present_family));
                }
            }
        }

        best_device.ok_or_else(|| anyhow::anyhow!("No GPU can present to this surface"))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        present_queue_family: u32,
    ) -> Result<(ash::Device, vk::Queue)> {
        let queue_priorities = [1.0];
        let queue_create_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(present_queue_family)
            .queue_priorities(&queue_priorities)
            .build();

        let extensions = [khr::Swapchain::name().as_ptr()];

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_extension_names(&extensions);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .context("Failed to create logical device")?;

        let present_queue = unsafe { device.get_device_queue(present_queue_family, 0) };

        Ok((device, present_queue))
    }

    fn create_command_buffer(
        device: &ash::Device,
        present_queue_family: u32,
    ) -> Result<(vk::CommandPool, vk::CommandBuffer)> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(present_queue_family)
            // RESET: begin_command_buffer resets the buffer every frame
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let command_pool = unsafe { device.create_command_pool(&pool_info, None) }
            .context("Failed to create command pool")?;

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let command_buffer = match unsafe { device.allocate_command_buffers(&alloc_info) } {
            Ok(buffers) => buffers[0],
            Err(e) => {
                unsafe { device.destroy_command_pool(command_pool, None) };
                return Err(e).context("Failed to allocate command buffer");
            }
        };

        Ok((command_pool, command_buffer))
    }

    /// Tear down the instance-level objects of a failed or finished device
    unsafe fn destroy_instance(
        instance: &ash::Instance,
        surface: Option<(&khr::Surface, vk::SurfaceKHR)>,
        debug_utils: Option<&(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    ) {
        if let Some((loader, surface)) = surface {
            loader.destroy_surface(surface, None);
        }
        if let Some((debug_utils, messenger)) = debug_utils {
            debug_utils.destroy_debug_utils_messenger(*messenger, None);
        }
        instance.destroy_instance(None);
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }?;
        Ok(())
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        // Wait for device to finish
        let _ = self.wait_idle();

        // Cleanup in reverse order
        unsafe {
            self.device
                .free_command_buffers(self.command_pool, &[self.command_buffer]);
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);

            let debug_utils = self.debug_utils.take();
            Self::destroy_instance(
                &self.instance,
                Some((&self.surface_loader, self.surface)),
                debug_utils.as_ref(),
            );
        }
    }
}

impl Driver for VulkanDevice {
    fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties {
        self.memory_properties
    }

    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        }
    }

    unsafe fn allocate_memory(&self, info: &vk::MemoryAllocateInfo) -> VkResult<vk::DeviceMemory> {
        self.device.allocate_memory(info, None)
    }

    unsafe fn free_memory(&self, memory: vk::DeviceMemory) {
        self.device.free_memory(memory, None)
    }

    unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> VkResult<*mut c_void> {
        self.device
            .map_memory(memory, offset, size, vk::MemoryMapFlags::empty())
    }

    unsafe fn unmap_memory(&self, memory: vk::DeviceMemory) {
        self.device.unmap_memory(memory)
    }

    unsafe fn create_buffer(&self, info: &vk::BufferCreateInfo) -> VkResult<vk::Buffer> {
        self.device.create_buffer(info, None)
    }

    unsafe fn destroy_buffer(&self, buffer: vk::Buffer) {
        self.device.destroy_buffer(buffer, None)
    }

    unsafe fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        self.device.get_buffer_memory_requirements(buffer)
    }

    unsafe fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()> {
        self.device.bind_buffer_memory(buffer, memory, offset)
    }

    unsafe fn create_image(&self, info: &vk::ImageCreateInfo) -> VkResult<vk::Image> {
        self.device.create_image(info, None)
    }

    unsafe fn destroy_image(&self, image: vk::Image) {
        self.device.destroy_image(image, None)
    }

    unsafe fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        self.device.get_image_memory_requirements(image)
    }

    unsafe fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()> {
        self.device.bind_image_memory(image, memory, offset)
    }

    unsafe fn image_subresource_layout(
        &self,
        image: vk::Image,
        subresource: vk::ImageSubresource,
    ) -> vk::SubresourceLayout {
        self.device.get_image_subresource_layout(image, subresource)
    }

    unsafe fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> VkResult<vk::ImageView> {
        self.device.create_image_view(info, None)
    }

    unsafe fn destroy_image_view(&self, view: vk::ImageView) {
        self.device.destroy_image_view(view, None)
    }

    unsafe fn create_sampler(&self, info: &vk::SamplerCreateInfo) -> VkResult<vk::Sampler> {
        self.device.create_sampler(info, None)
    }

    unsafe fn destroy_sampler(&self, sampler: vk::Sampler) {
        self.device.destroy_sampler(sampler, None)
    }

    unsafe fn create_descriptor_set_layout(
        &self,
        info: &vk::DescriptorSetLayoutCreateInfo,
    ) -> VkResult<vk::DescriptorSetLayout> {
        self.device.create_descriptor_set_layout(info, None)
    }

    unsafe fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.device.destroy_descriptor_set_layout(layout, None)
    }

    unsafe fn create_descriptor_pool(
        &self,
        info: &vk::DescriptorPoolCreateInfo,
    ) -> VkResult<vk::DescriptorPool> {
        self.device.create_descriptor_pool(info, None)
    }

    unsafe fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        self.device.destroy_descriptor_pool(pool, None)
    }

    unsafe fn allocate_descriptor_sets(
        &self,
        info: &vk::DescriptorSetAllocateInfo,
    ) -> VkResult<Vec<vk::DescriptorSet>> {
        self.device.allocate_descriptor_sets(info)
    }

    unsafe fn free_descriptor_sets(
        &self,
        pool: vk::DescriptorPool,
        sets: &[vk::DescriptorSet],
    ) -> VkResult<()> {
        self.device.free_descriptor_sets(pool, sets)
    }

    unsafe fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet]) {
        self.device.update_descriptor_sets(writes, &[])
    }

    unsafe fn create_shader_module(
        &self,
        info: &vk::ShaderModuleCreateInfo,
    ) -> VkResult<vk::ShaderModule> {
        self.device.create_shader_module(info, None)
    }

    unsafe fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.device.destroy_shader_module(module, None)
    }

    unsafe fn create_pipeline_layout(
        &self,
        info: &vk::PipelineLayoutCreateInfo,
    ) -> VkResult<vk::PipelineLayout> {
        self.device.create_pipeline_layout(info, None)
    }

    unsafe fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.device.destroy_pipeline_layout(layout, None)
    }

    unsafe fn create_graphics_pipeline(
        &self,
        info: &vk::GraphicsPipelineCreateInfo,
    ) -> VkResult<vk::Pipeline> {
        self.device
            .create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(info), None)
            .map(|pipelines| pipelines[0])
            .map_err(|(_, e)| e)
    }

    unsafe fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.device.destroy_pipeline(pipeline, None)
    }

    unsafe fn create_render_pass(&self, info: &vk::RenderPassCreateInfo) -> VkResult<vk::RenderPass> {
        self.device.create_render_pass(info, None)
    }

    unsafe fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.device.destroy_render_pass(render_pass, None)
    }

    unsafe fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo) -> VkResult<vk::Framebuffer> {
        self.device.create_framebuffer(info, None)
    }

    unsafe fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.device.destroy_framebuffer(framebuffer, None)
    }

    unsafe fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        self.swapchain_loader.destroy_swapchain(swapchain, None)
    }

    unsafe fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        self.device
            .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
    }

    unsafe fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.device.destroy_semaphore(semaphore, None)
    }

    unsafe fn create_fence(&self) -> VkResult<vk::Fence> {
        self.device.create_fence(&vk::FenceCreateInfo::default(), None)
    }

    unsafe fn destroy_fence(&self, fence: vk::Fence) {
        self.device.destroy_fence(fence, None)
    }

    unsafe fn wait_for_fence(&self, fence: vk::Fence) -> VkResult<()> {
        self.device.wait_for_fences(&[fence], true, u64::MAX)
    }

    unsafe fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        self.swapchain_loader
            .acquire_next_image(swapchain, u64::MAX, semaphore, vk::Fence::null())
    }

    unsafe fn queue_submit(
        &self,
        queue: vk::Queue,
        submit: &vk::SubmitInfo,
        fence: vk::Fence,
    ) -> VkResult<()> {
        self.device
            .queue_submit(queue, std::slice::from_ref(submit), fence)
    }

    unsafe fn queue_present(&self, queue: vk::Queue, info: &vk::PresentInfoKHR) -> VkResult<bool> {
        self.swapchain_loader.queue_present(queue, info)
    }

    unsafe fn device_wait_idle(&self) -> VkResult<()> {
        self.device.device_wait_idle()
    }

    unsafe fn begin_command_buffer(
        &self,
        cmd: vk::CommandBuffer,
        info: &vk::CommandBufferBeginInfo,
    ) -> VkResult<()> {
        self.device.begin_command_buffer(cmd, info)
    }

    unsafe fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        self.device.end_command_buffer(cmd)
    }

    unsafe fn cmd_pipeline_barrier(
        &self,
        cmd: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        image_barriers: &[vk::ImageMemoryBarrier],
    ) {
        self.device.cmd_pipeline_barrier(
            cmd,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            image_barriers,
        )
    }

    unsafe fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, info: &vk::RenderPassBeginInfo) {
        self.device
            .cmd_begin_render_pass(cmd, info, vk::SubpassContents::INLINE)
    }

    unsafe fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        self.device.cmd_end_render_pass(cmd)
    }

    unsafe fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: vk::Viewport) {
        self.device.cmd_set_viewport(cmd, 0, &[viewport])
    }

    unsafe fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: vk::Rect2D) {
        self.device.cmd_set_scissor(cmd, 0, &[scissor])
    }

    unsafe fn cmd_bind_vertex_buffer(
        &self,
        cmd: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
    ) {
        self.device.cmd_bind_vertex_buffers(cmd, 0, &[buffer], &[offset])
    }

    unsafe fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.device
            .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline)
    }

    unsafe fn cmd_bind_descriptor_set(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    ) {
        self.device.cmd_bind_descriptor_sets(
            cmd,
            vk::PipelineBindPoint::GRAPHICS,
            layout,
            0,
            &[set],
            &[],
        )
    }

    unsafe fn cmd_draw(&self, cmd: vk::CommandBuffer, vertex_count: u32) {
        self.device.cmd_draw(cmd, vertex_count, 1, 0, 0)
    }

    unsafe fn cmd_copy_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        region: vk::ImageCopy,
    ) {
        self.device
            .cmd_copy_image(cmd, src, src_layout, dst, dst_layout, &[region])
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}
