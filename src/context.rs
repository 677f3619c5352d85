// =============================================================================
// CONTEXT - Handle tables and resource lifetimes
// =============================================================================
//
// The context owns the driver, the render targets and one generation-checked
// table per resource kind. Every resource is created through the context and
// destroyed exactly once: by its free call, or at teardown.
//
// TEARDOWN ORDER:
// 1. Frame semaphores left over from an interrupted frame
// 2. Draw instances, shapes, textures, pipelines
// 3. Render targets (framebuffers ... swapchain)
// 4. The driver itself (command pool, device, surface, instance)

use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use slotmap::{new_key_type, SlotMap};

use crate::backend::memory::MemoryPolicy;
use crate::backend::pipeline::{build_pipelines, Pipeline};
use crate::backend::shader::ShaderPair;
use crate::backend::shape::Shape;
use crate::backend::swapchain::{check_extent, RenderTargets, SwapchainSettings};
use crate::backend::texture::Texture;
use crate::backend::uniform::{DrawInstance, MATRIX_FLOATS};
use crate::backend::{Driver, VulkanDevice};
use crate::config::Config;
use crate::error::{Result, VwError};
use crate::frame::{Frame, FrameState};

new_key_type! {
    /// A built graphics pipeline
    pub struct PipelineKey;
    /// A uniform buffer + descriptor set bound to one pipeline
    pub struct InstanceKey;
    /// A vertex buffer
    pub struct ShapeKey;
    /// A sampled RGBA8 texture
    pub struct TextureKey;
}

pub(crate) struct InstanceEntry {
    pub instance: DrawInstance,
    /// Textures currently written to binding 1
    pub textures: Vec<TextureKey>,
}

/// Rendering context over a driver
///
/// `Context<VulkanDevice>` is the real thing; tests drive the same code
/// through a recording driver.
pub struct Context<D: Driver = VulkanDevice> {
    pub(crate) pipelines: SlotMap<PipelineKey, Pipeline>,
    pub(crate) instances: SlotMap<InstanceKey, InstanceEntry>,
    pub(crate) shapes: SlotMap<ShapeKey, Shape>,
    pub(crate) textures: SlotMap<TextureKey, Texture>,
    /// Textures whose GPU-side upload is recorded at the next `draw_begin`
    pub(crate) pending_uploads: Vec<TextureKey>,

    pub(crate) targets: RenderTargets,
    pub(crate) frame: Frame,

    pub(crate) queue: vk::Queue,
    pub(crate) cmd: vk::CommandBuffer,
    pub(crate) policy: MemoryPolicy,
    settings: SwapchainSettings,

    // Dropped last: the device outlives everything created from it
    pub(crate) driver: D,
}

impl Context<VulkanDevice> {
    /// Create the device for a native window and build the render targets
    pub fn new(
        display: RawDisplayHandle,
        window: RawWindowHandle,
        width: u32,
        height: u32,
        config: &Config,
    ) -> Result<Self> {
        let device = VulkanDevice::new(
            &config.window.title,
            display,
            window,
            config.debug.validation_layers,
        )?;

        let policy = MemoryPolicy::from(&config.memory);
        let settings = SwapchainSettings::from(config);
        let targets = device.create_render_targets(width, height, settings, policy)?;

        let queue = device.present_queue;
        let cmd = device.command_buffer;
        Ok(Self::from_parts(device, targets, queue, cmd, policy, settings))
    }

    /// Rebuild the render targets at a new size (only between frames)
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        check_extent(width, height)?;
        let settings = self.settings;
        self.rebuild_targets(|device, policy| device.create_render_targets(width, height, settings, policy))
    }
}

impl<D: Driver> Context<D> {
    /// Assemble a context from an already created driver and render targets
    pub fn from_parts(
        driver: D,
        targets: RenderTargets,
        queue: vk::Queue,
        cmd: vk::CommandBuffer,
        policy: MemoryPolicy,
        settings: SwapchainSettings,
    ) -> Self {
        Self {
            pipelines: SlotMap::with_key(),
            instances: SlotMap::with_key(),
            shapes: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            pending_uploads: Vec::new(),
            targets,
            frame: Frame::default(),
            queue,
            cmd,
            policy,
            settings,
            driver,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.targets.extent
    }

    /// Number of swapchain images reported by the driver
    pub fn image_count(&self) -> usize {
        self.targets.images.len()
    }

    pub fn frame_state(&self) -> FrameState {
        self.frame.state
    }

    /// Wait for the device, destroy the render targets and build new ones
    pub fn rebuild_targets<F>(&mut self, build: F) -> Result<()>
    where
        F: FnOnce(&D, MemoryPolicy) -> Result<RenderTargets>,
    {
        self.frame.expect(FrameState::Idle)?;

        unsafe { self.driver.device_wait_idle() }.map_err(|result| VwError::Vulkan {
            what: "Failed to wait for device idle",
            result,
        })?;

        self.targets.destroy(&self.driver);
        self.targets = build(&self.driver, self.policy)?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pipelines
    // ─────────────────────────────────────────────────────────────────────────

    /// Build one pipeline per shader pair against the context's render pass
    pub fn build_pipelines(&mut self, pairs: &[ShaderPair<'_>]) -> Result<Vec<PipelineKey>> {
        if pairs.is_empty() {
            return Err(VwError::invalid("no shader pairs given"));
        }
        let pipelines = build_pipelines(&self.driver, self.targets.render_pass, pairs)?;
        Ok(pipelines.into_iter().map(|p| self.pipelines.insert(p)).collect())
    }

    fn pipeline(&self, key: PipelineKey) -> Result<Pipeline> {
        self.pipelines.get(key).copied().ok_or(VwError::StaleHandle("pipeline"))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Draw instances
    // ─────────────────────────────────────────────────────────────────────────

    /// Uniform buffer of `n_floats` floats with no texture bound
    pub fn new_instance(&mut self, pipeline: PipelineKey, n_floats: usize) -> Result<InstanceKey> {
        let pipeline = self.pipeline(pipeline)?;
        let instance = DrawInstance::new(&self.driver, pipeline, n_floats, &[], self.policy)?;
        Ok(self.instances.insert(InstanceEntry {
            instance,
            textures: Vec::new(),
        }))
    }

    /// 4x4 matrix uniform plus `textures` bound at binding 1
    pub fn new_textured_instance(&mut self, pipeline: PipelineKey, textures: &[TextureKey]) -> Result<InstanceKey> {
        let pipeline = self.pipeline(pipeline)?;
        let infos = self.texture_infos(textures)?;
        let instance = DrawInstance::new(&self.driver, pipeline, MATRIX_FLOATS, &infos, self.policy)?;
        Ok(self.instances.insert(InstanceEntry {
            instance,
            textures: textures.to_vec(),
        }))
    }

    /// Rewrite binding 1 of an instance's descriptor set (only between frames)
    pub fn set_instance_textures(&mut self, instance: InstanceKey, textures: &[TextureKey]) -> Result<()> {
        self.frame.expect(FrameState::Idle)?;
        let infos = self.texture_infos(textures)?;
        let entry = self.instances.get_mut(instance).ok_or(VwError::StaleHandle("instance"))?;
        entry.instance.write_textures(&self.driver, &infos)?;
        entry.textures = textures.to_vec();
        Ok(())
    }

    /// Copy floats into the instance's uniform buffer
    pub fn write_uniform(&self, instance: InstanceKey, floats: &[f32]) -> Result<()> {
        let entry = self.instances.get(instance).ok_or(VwError::StaleHandle("instance"))?;
        entry.instance.write(&self.driver, floats)
    }

    pub fn free_instance(&mut self, instance: InstanceKey) -> Result<()> {
        self.frame.expect(FrameState::Idle)?;
        let mut entry = self.instances.remove(instance).ok_or(VwError::StaleHandle("instance"))?;
        entry.instance.destroy(&self.driver);
        Ok(())
    }

    fn texture_infos(&self, textures: &[TextureKey]) -> Result<Vec<vk::DescriptorImageInfo>> {
        textures
            .iter()
            .map(|&key| {
                self.textures
                    .get(key)
                    .map(Texture::descriptor)
                    .ok_or(VwError::StaleHandle("texture"))
            })
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Shapes
    // ─────────────────────────────────────────────────────────────────────────

    /// Upload vertices (4 floats each) into a new vertex buffer
    pub fn new_shape(&mut self, vertices: &[f32]) -> Result<ShapeKey> {
        let shape = Shape::new(&self.driver, vertices, self.policy)?;
        Ok(self.shapes.insert(shape))
    }

    pub fn free_shape(&mut self, shape: ShapeKey) -> Result<()> {
        self.frame.expect(FrameState::Idle)?;
        let mut shape = self.shapes.remove(shape).ok_or(VwError::StaleHandle("shape"))?;
        shape.destroy(&self.driver);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Textures
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a texture from tightly packed RGBA8 rows (only between frames)
    ///
    /// Its first layout transitions are recorded by the next `draw_begin`.
    pub fn new_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> Result<TextureKey> {
        self.frame.expect(FrameState::Idle)?;
        let texture = Texture::new(&self.driver, width, height, rgba, self.policy)?;
        let key = self.textures.insert(texture);
        self.pending_uploads.push(key);
        Ok(key)
    }

    /// Replace a texture's pixels; the GPU side is refreshed at the next frame
    pub fn update_texture(&mut self, texture: TextureKey, width: u32, height: u32, rgba: &[u8]) -> Result<()> {
        let entry = self.textures.get_mut(texture).ok_or(VwError::StaleHandle("texture"))?;
        entry.update(&self.driver, width, height, rgba)?;
        if !self.pending_uploads.contains(&texture) {
            self.pending_uploads.push(texture);
        }
        Ok(())
    }

    pub fn free_texture(&mut self, texture: TextureKey) -> Result<()> {
        self.frame.expect(FrameState::Idle)?;
        let mut entry = self.textures.remove(texture).ok_or(VwError::StaleHandle("texture"))?;
        self.pending_uploads.retain(|&key| key != texture);
        if self.instances.values().any(|i| i.textures.contains(&texture)) {
            log::warn!("Freeing a texture that is still bound to a draw instance; draws with it will fail");
        }
        entry.destroy(&self.driver);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Teardown
    // ─────────────────────────────────────────────────────────────────────────

    /// Destroy every resource the context still owns, then the render targets
    pub(crate) fn release_all(&mut self) {
        if let Err(result) = unsafe { self.driver.device_wait_idle() } {
            log::warn!("Device wait idle failed during teardown: {:?}", result);
        }

        if let Some(sync) = self.frame.sync.take() {
            sync.destroy(&self.driver);
        }
        self.frame = Frame::default();

        for (_, mut entry) in self.instances.drain() {
            entry.instance.destroy(&self.driver);
        }
        for (_, mut shape) in self.shapes.drain() {
            shape.destroy(&self.driver);
        }
        for (_, mut texture) in self.textures.drain() {
            texture.destroy(&self.driver);
        }
        for (_, pipeline) in self.pipelines.drain() {
            pipeline.destroy(&self.driver);
        }
        self.pending_uploads.clear();

        self.targets.destroy(&self.driver);
    }
}

impl<D: Driver> Drop for Context<D> {
    fn drop(&mut self) {
        log::info!("Destroying context...");
        self.release_all();
    }
}
