// =============================================================================
// FRAME LOOP
// =============================================================================
//
// Fully serialized: one frame is acquired, recorded, submitted, waited on and
// presented before the next can begin. No frames are in flight between calls.
//
// FRAME TIMELINE:
// ┌──────────────────────────────────────────────────────────────────────────┐
// │ draw_begin:  semaphores → acquire (1 retry on OUT_OF_DATE) → begin cmd   │
// │              → queued texture uploads → PRESENT_SRC → COLOR_ATTACHMENT   │
// │              → begin render pass → viewport + scissor                    │
// │ draw_shape:  bind vertex buffer → bind pipeline → bind set → draw        │
// │ draw_end:    end pass → COLOR_ATTACHMENT → PRESENT_SRC → end cmd         │
// │              → fence → submit → wait → present → destroy → device idle   │
// └──────────────────────────────────────────────────────────────────────────┘

use ash::vk;

use crate::backend::swapchain::color_range;
use crate::backend::sync::FrameSync;
use crate::backend::texture::UploadState;
use crate::backend::Driver;
use crate::context::{Context, InstanceKey, ShapeKey, TextureKey};
use crate::error::{Result, VkResultExt, VwError};

/// Where the frame loop is between calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameState {
    #[default]
    Idle,
    Acquiring,
    Recording,
    Submitted,
    Presented,
}

impl FrameState {
    pub fn name(self) -> &'static str {
        match self {
            FrameState::Idle => "idle",
            FrameState::Acquiring => "acquiring",
            FrameState::Recording => "recording",
            FrameState::Submitted => "submitted",
            FrameState::Presented => "presented",
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Frame {
    pub state: FrameState,
    /// Semaphores of the frame being recorded
    pub sync: Option<FrameSync>,
    pub image_index: u32,
    /// Uploads recorded this frame, with the state to roll back to if it never completes
    pub uploads: Vec<(TextureKey, UploadState)>,
}

impl Frame {
    pub fn expect(&self, expected: FrameState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(VwError::FrameState {
                expected: expected.name(),
                found: self.state.name(),
            })
        }
    }
}

impl<D: Driver> Context<D> {
    /// Acquire the next image and start recording a frame cleared to (r, g, b)
    pub fn draw_begin(&mut self, r: f32, g: f32, b: f32) -> Result<()> {
        self.frame.expect(FrameState::Idle)?;
        if self.targets.swapchain == vk::SwapchainKHR::null() {
            return Err(VwError::invalid("no render targets, resize the context to rebuild them"));
        }
        self.frame.state = FrameState::Acquiring;

        let (sync, image_index) = match self.acquire() {
            Ok(acquired) => acquired,
            Err(e) => {
                self.frame.state = FrameState::Idle;
                return Err(e);
            }
        };
        self.frame.sync = Some(sync);
        self.frame.image_index = image_index;

        if let Err(e) = self.record_begin([r, g, b, 1.0]) {
            log::warn!("Abandoning frame: {}", e);
            self.abandon_frame();
            return Err(e);
        }

        self.frame.state = FrameState::Recording;
        Ok(())
    }

    /// Fresh semaphores plus the next image; one retry when the swapchain is out of date
    fn acquire(&self) -> Result<(FrameSync, u32)> {
        let swapchain = self.targets.swapchain;
        let mut sync = FrameSync::new(&self.driver)?;
        let mut result = unsafe { self.driver.acquire_next_image(swapchain, sync.image_acquired) };

        if matches!(result, Err(vk::Result::ERROR_OUT_OF_DATE_KHR)) {
            log::warn!("Swapchain out of date, retrying acquisition once");
            sync.destroy(&self.driver);
            sync = FrameSync::new(&self.driver)?;
            result = unsafe { self.driver.acquire_next_image(swapchain, sync.image_acquired) };
        }

        match result {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    log::debug!("Acquired image {} from a suboptimal swapchain", index);
                }
                Ok((sync, index))
            }
            Err(result) => {
                sync.destroy(&self.driver);
                Err(VwError::Acquire(result))
            }
        }
    }

    fn record_begin(&mut self, clear_color: [f32; 4]) -> Result<()> {
        let cmd = self.cmd;
        let index = self.frame.image_index as usize;
        let image = *self
            .targets
            .images
            .get(index)
            .ok_or_else(|| VwError::invalid(format!("acquired image {} out of range", index)))?;

        let begin_info = vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.driver.begin_command_buffer(cmd, &begin_info) }.context("Failed to begin command buffer")?;

        for key in self.pending_uploads.drain(..) {
            if let Some(texture) = self.textures.get_mut(key) {
                self.frame.uploads.push((key, texture.upload_state()));
                texture.record_upload(&self.driver, cmd);
            }
        }

        let to_attachment = vk::ImageMemoryBarrier::builder()
            .src_access_mask(vk::AccessFlags::MEMORY_READ)
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .old_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .new_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(color_range())
            .build();

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue { float32: clear_color },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            },
        ];
        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.targets.render_pass)
            .framebuffer(self.targets.framebuffers[index])
            .render_area(self.targets.scissor())
            .clear_values(&clear_values);

        unsafe {
            self.driver.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                &[to_attachment],
            );
            self.driver.cmd_begin_render_pass(cmd, &render_pass_info);
            self.driver.cmd_set_viewport(cmd, self.targets.viewport());
            self.driver.cmd_set_scissor(cmd, self.targets.scissor());
        }
        Ok(())
    }

    /// Record one draw of `shape` with `instance`'s pipeline and descriptor set
    pub fn draw_shape(&mut self, shape: ShapeKey, instance: InstanceKey) -> Result<()> {
        self.frame.expect(FrameState::Recording)?;
        let shape = self.shapes.get(shape).ok_or(VwError::StaleHandle("shape"))?;
        let entry = self.instances.get(instance).ok_or(VwError::StaleHandle("instance"))?;
        if entry.textures.iter().any(|&key| !self.textures.contains_key(key)) {
            return Err(VwError::StaleHandle("texture"));
        }
        let instance = &entry.instance;

        unsafe {
            self.driver.cmd_bind_vertex_buffer(self.cmd, shape.buffer, 0);
            self.driver.cmd_bind_pipeline(self.cmd, instance.pipeline.pipeline);
            self.driver
                .cmd_bind_descriptor_set(self.cmd, instance.pipeline.layout, instance.set);
            self.driver.cmd_draw(self.cmd, shape.vertex_count);
        }
        Ok(())
    }

    /// Submit, wait, present and go idle
    ///
    /// Returns `true` when the swapchain is suboptimal or out of date and
    /// should be rebuilt. The frame's fence and semaphores are destroyed and
    /// the loop returns to idle whatever happens.
    pub fn draw_end(&mut self) -> Result<bool> {
        self.frame.expect(FrameState::Recording)?;
        let Some(sync) = self.frame.sync.take() else {
            self.requeue_uploads();
            self.frame = Default::default();
            return Err(VwError::invalid("recording frame has no semaphores"));
        };

        let result = self.submit_and_present(sync);

        let idle = if result.is_ok() {
            sync.destroy(&self.driver);
            unsafe { self.driver.device_wait_idle() }.context("Failed to wait for device idle")
        } else {
            // Nothing may still be waiting on the semaphores when they go
            let idle = unsafe { self.driver.device_wait_idle() }.context("Failed to wait for device idle");
            sync.destroy(&self.driver);
            idle
        };

        self.requeue_uploads();
        self.frame = Default::default();
        let needs_resize = result?;
        idle?;
        Ok(needs_resize)
    }

    fn submit_and_present(&mut self, sync: FrameSync) -> Result<bool> {
        let cmd = self.cmd;
        let image_index = self.frame.image_index;
        let image = self.targets.images[image_index as usize];

        let to_present = vk::ImageMemoryBarrier::builder()
            .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .dst_access_mask(vk::AccessFlags::MEMORY_READ)
            .old_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(color_range())
            .build();

        unsafe {
            self.driver.cmd_end_render_pass(cmd);
            self.driver.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::ALL_COMMANDS,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                &[to_present],
            );
            self.driver
                .end_command_buffer(cmd)
                .context("Failed to end command buffer")?;
        }

        // ─────────────────────────────────────────────────────────────────────
        // Submitted
        // ─────────────────────────────────────────────────────────────────────
        self.frame.state = FrameState::Submitted;

        let fence = unsafe { self.driver.create_fence() }.context("Failed to create fence")?;

        let wait_semaphores = [sync.image_acquired];
        let wait_stages = [vk::PipelineStageFlags::BOTTOM_OF_PIPE];
        let signal_semaphores = [sync.render_complete];
        let command_buffers = [cmd];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        let waited = unsafe {
            self.driver
                .queue_submit(self.queue, &submit_info, fence)
                .context("Failed to submit frame")
                .and_then(|()| self.driver.wait_for_fence(fence).context("Failed to wait for frame fence"))
        };
        unsafe { self.driver.destroy_fence(fence) };
        waited?;
        self.frame.uploads.clear();

        // ─────────────────────────────────────────────────────────────────────
        // Presented
        // ─────────────────────────────────────────────────────────────────────
        let swapchains = [self.targets.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let presented = unsafe { self.driver.queue_present(self.queue, &present_info) };
        self.frame.state = FrameState::Presented;

        match presented {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(result) => Err(VwError::Vulkan {
                what: "Failed to present",
                result,
            }),
        }
    }

    /// Drop a frame that failed after acquisition
    fn abandon_frame(&mut self) {
        if let Err(result) = unsafe { self.driver.device_wait_idle() } {
            log::warn!("Device wait idle failed: {:?}", result);
        }
        if let Some(sync) = self.frame.sync.take() {
            sync.destroy(&self.driver);
        }
        self.requeue_uploads();
        self.frame = Frame::default();
    }

    /// Queue this frame's uploads again when its command buffer never ran
    fn requeue_uploads(&mut self) {
        for (key, state) in std::mem::take(&mut self.frame.uploads) {
            let Some(texture) = self.textures.get_mut(key) else {
                continue;
            };
            texture.restore_upload_state(state);
            if !self.pending_uploads.contains(&key) {
                self.pending_uploads.push(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{Kind, MockDriver};
    use crate::backend::swapchain::tests::mock_targets;
    use crate::context::tests::{mock_context, textured_pipeline};
    use ash::vk::Handle;

    fn frame(ctx: &mut Context<MockDriver>) -> bool {
        ctx.draw_begin(0.1, 0.2, 0.3).unwrap();
        ctx.draw_end().unwrap()
    }

    #[test]
    fn one_frame_waits_once_on_fence_and_device() {
        let mut ctx = mock_context(MockDriver::new());
        let pipeline = textured_pipeline(&mut ctx, 1);
        let shape = ctx.new_shape(&[0.0; 12]).unwrap();
        let instance = ctx.new_instance(pipeline, 16).unwrap();
        let fence_waits = ctx.driver().calls("wait_for_fence");

        ctx.draw_begin(0.0, 0.0, 0.0).unwrap();
        assert_eq!(ctx.frame_state(), FrameState::Recording);
        ctx.draw_shape(shape, instance).unwrap();
        assert!(!ctx.draw_end().unwrap());

        let driver = ctx.driver();
        assert_eq!(driver.calls("wait_for_fence") - fence_waits, 1);
        assert_eq!(driver.calls("device_wait_idle"), 1);
        assert_eq!(driver.calls("queue_present"), 1);
        assert_eq!(driver.draws(), vec![3]);
        assert_eq!(ctx.frame_state(), FrameState::Idle);
    }

    #[test]
    fn semaphores_are_fresh_every_frame() {
        let mut ctx = mock_context(MockDriver::new());

        frame(&mut ctx);
        frame(&mut ctx);

        let driver = ctx.driver();
        let semaphores = driver.created(Kind::Semaphore);
        assert_eq!(semaphores.len(), 4);
        let acquired = driver.acquire_semaphores();
        assert_ne!(acquired[0], acquired[1]);

        // Submit waits on the acquire semaphore, present on the other one
        assert_eq!(driver.submit_waits()[1..], [vec![acquired[0]], vec![acquired[1]]]);
        let presents = driver.present_waits();
        assert!(!presents[0].contains(&acquired[0]));
        assert_ne!(presents[0], presents[1]);

        let mut destroyed = driver.destroyed(Kind::Semaphore);
        destroyed.sort();
        assert_eq!(destroyed, semaphores);
    }

    #[test]
    fn out_of_date_acquire_is_retried_once() {
        let mut ctx = mock_context(MockDriver::new());
        ctx.driver().push_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));
        ctx.driver().push_acquire(Ok((1, false)));

        ctx.draw_begin(0.0, 0.0, 0.0).unwrap();

        let driver = ctx.driver();
        assert_eq!(driver.calls("acquire_next_image"), 2);
        // The first pair was replaced before retrying
        assert_eq!(driver.created(Kind::Semaphore).len(), 4);
        assert_eq!(driver.destroyed(Kind::Semaphore).len(), 2);
        let acquired = driver.acquire_semaphores();
        assert_ne!(acquired[0], acquired[1]);
        assert_eq!(ctx.frame.image_index, 1);
    }

    #[test]
    fn second_out_of_date_is_returned() {
        let mut ctx = mock_context(MockDriver::new());
        ctx.driver().push_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));
        ctx.driver().push_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));

        let err = ctx.draw_begin(0.0, 0.0, 0.0).unwrap_err();

        assert!(matches!(err, VwError::Acquire(vk::Result::ERROR_OUT_OF_DATE_KHR)));
        assert_eq!(ctx.driver().calls("acquire_next_image"), 2);
        assert_eq!(ctx.frame_state(), FrameState::Idle);
        assert_eq!(
            ctx.driver().created(Kind::Semaphore).len(),
            ctx.driver().destroyed(Kind::Semaphore).len()
        );
    }

    #[test]
    fn other_acquire_errors_are_not_retried() {
        for code in [
            vk::Result::ERROR_SURFACE_LOST_KHR,
            vk::Result::ERROR_DEVICE_LOST,
            vk::Result::TIMEOUT,
        ] {
            let mut ctx = mock_context(MockDriver::new());
            ctx.driver().push_acquire(Err(code));

            let err = ctx.draw_begin(0.0, 0.0, 0.0).unwrap_err();

            assert!(matches!(err, VwError::Acquire(c) if c == code));
            assert_eq!(ctx.driver().calls("acquire_next_image"), 1);
            assert_eq!(ctx.driver().destroyed(Kind::Semaphore).len(), 2);
            assert_eq!(ctx.driver().calls("begin_command_buffer"), 1, "only the target setup");
        }
    }

    #[test]
    fn calls_out_of_order_are_rejected() {
        let mut ctx = mock_context(MockDriver::new());
        let shape = ctx.new_shape(&[0.0; 4]).unwrap();
        let pipeline = textured_pipeline(&mut ctx, 1);
        let instance = ctx.new_instance(pipeline, 4).unwrap();

        assert!(matches!(
            ctx.draw_shape(shape, instance),
            Err(VwError::FrameState { expected: "recording", found: "idle" })
        ));
        assert!(matches!(ctx.draw_end(), Err(VwError::FrameState { .. })));

        ctx.draw_begin(0.0, 0.0, 0.0).unwrap();
        assert!(matches!(
            ctx.draw_begin(0.0, 0.0, 0.0),
            Err(VwError::FrameState { expected: "idle", found: "recording" })
        ));
        assert!(matches!(ctx.free_shape(shape), Err(VwError::FrameState { .. })));
        assert!(matches!(
            ctx.rebuild_targets(|_, _| unreachable!()),
            Err(VwError::FrameState { .. })
        ));
        ctx.draw_end().unwrap();
    }

    #[test]
    fn suboptimal_or_out_of_date_present_requests_resize() {
        let mut ctx = mock_context(MockDriver::new());
        ctx.driver().push_present(Ok(true));
        ctx.driver().push_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));
        ctx.driver().push_present(Ok(false));

        assert!(frame(&mut ctx));
        assert!(frame(&mut ctx));
        assert!(!frame(&mut ctx));
    }

    #[test]
    fn failed_submit_still_cleans_up() {
        let mut ctx = mock_context(MockDriver::new());
        ctx.draw_begin(0.0, 0.0, 0.0).unwrap();
        ctx.driver().fail("queue_submit", vk::Result::ERROR_DEVICE_LOST);

        let err = ctx.draw_end().unwrap_err();

        assert!(matches!(err, VwError::Vulkan { result: vk::Result::ERROR_DEVICE_LOST, .. }));
        assert_eq!(ctx.frame_state(), FrameState::Idle);
        let driver = ctx.driver();
        assert_eq!(driver.calls("queue_present"), 0);
        assert_eq!(driver.created(Kind::Fence).len(), driver.destroyed(Kind::Fence).len());
        assert_eq!(
            driver.created(Kind::Semaphore).len(),
            driver.destroyed(Kind::Semaphore).len()
        );
    }

    #[test]
    fn failed_present_still_destroys_semaphores() {
        let mut ctx = mock_context(MockDriver::new());
        ctx.driver().push_present(Err(vk::Result::ERROR_SURFACE_LOST_KHR));

        ctx.draw_begin(0.0, 0.0, 0.0).unwrap();
        assert!(ctx.draw_end().is_err());

        assert_eq!(ctx.frame_state(), FrameState::Idle);
        assert_eq!(ctx.driver().destroyed(Kind::Semaphore).len(), 2);
        ctx.draw_begin(0.0, 0.0, 0.0).unwrap();
    }

    #[test]
    fn frame_moves_the_acquired_image_through_its_layouts() {
        let mut ctx = mock_context(MockDriver::new());
        ctx.driver().push_acquire(Ok((1, false)));
        let image = ctx.targets.images[1].as_raw();
        let setup_barriers = ctx.driver().barriers().len();

        frame(&mut ctx);

        let layouts: Vec<_> = ctx.driver().barriers()[setup_barriers..]
            .iter()
            .map(|b| (b.image, b.old_layout, b.new_layout))
            .collect();
        assert_eq!(
            layouts,
            vec![
                (image, vk::ImageLayout::PRESENT_SRC_KHR, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
                (image, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL, vk::ImageLayout::PRESENT_SRC_KHR),
            ]
        );
    }

    #[test]
    fn queued_uploads_are_recorded_before_the_render_pass() {
        let mut ctx = mock_context(MockDriver::new().with_linear_sampling(false));
        let setup_barriers = ctx.driver().barriers().len();
        let texture = ctx.new_texture(2, 2, &[0; 16]).unwrap();

        frame(&mut ctx);
        assert_eq!(ctx.driver().copies().len(), 1);
        // Upload barriers come before the attachment barrier
        let barriers = ctx.driver().barriers();
        let barriers = &barriers[setup_barriers..];
        assert_eq!(barriers.len(), 5);
        assert_eq!(barriers[3].new_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        // Nothing queued, nothing copied
        frame(&mut ctx);
        assert_eq!(ctx.driver().copies().len(), 1);

        ctx.update_texture(texture, 2, 2, &[5; 16]).unwrap();
        frame(&mut ctx);
        assert_eq!(ctx.driver().copies().len(), 2);
    }

    #[test]
    fn stale_handles_in_draw_shape() {
        let mut ctx = mock_context(MockDriver::new());
        let pipeline = textured_pipeline(&mut ctx, 1);
        let instance = ctx.new_instance(pipeline, 4).unwrap();
        let shape = ctx.new_shape(&[0.0; 4]).unwrap();
        ctx.free_shape(shape).unwrap();

        ctx.draw_begin(0.0, 0.0, 0.0).unwrap();
        assert!(matches!(ctx.draw_shape(shape, instance), Err(VwError::StaleHandle("shape"))));
        ctx.draw_end().unwrap();
        assert!(ctx.driver().draws().is_empty());
    }

    #[test]
    fn freed_texture_blocks_draws_with_its_instance() {
        let mut ctx = mock_context(MockDriver::new());
        let pipeline = textured_pipeline(&mut ctx, 1);
        let shape = ctx.new_shape(&[0.0; 12]).unwrap();
        let texture = ctx.new_texture(2, 2, &[0; 16]).unwrap();
        let instance = ctx.new_textured_instance(pipeline, &[texture]).unwrap();
        ctx.free_texture(texture).unwrap();

        ctx.draw_begin(0.0, 0.0, 0.0).unwrap();
        assert!(matches!(ctx.draw_shape(shape, instance), Err(VwError::StaleHandle("texture"))));
        ctx.draw_end().unwrap();
        assert!(ctx.driver().draws().is_empty());

        // Rebinding a live texture makes the instance drawable again
        let texture = ctx.new_texture(2, 2, &[0; 16]).unwrap();
        ctx.set_instance_textures(instance, &[texture]).unwrap();
        ctx.draw_begin(0.0, 0.0, 0.0).unwrap();
        ctx.draw_shape(shape, instance).unwrap();
        ctx.draw_end().unwrap();
        assert_eq!(ctx.driver().draws(), vec![3]);
    }

    #[test]
    fn uploads_from_a_failed_frame_are_recorded_again() {
        let mut ctx = mock_context(MockDriver::new().with_linear_sampling(false));
        let texture = ctx.new_texture(2, 2, &[0; 16]).unwrap();

        ctx.draw_begin(0.0, 0.0, 0.0).unwrap();
        assert_eq!(ctx.driver().copies().len(), 1);
        ctx.driver().fail("queue_submit", vk::Result::ERROR_DEVICE_LOST);
        assert!(ctx.draw_end().is_err());
        assert_eq!(ctx.pending_uploads, vec![texture]);

        ctx.driver().heal("queue_submit");
        let before = ctx.driver().barriers().len();
        frame(&mut ctx);

        assert_eq!(ctx.driver().copies().len(), 2);
        assert!(ctx.pending_uploads.is_empty());
        // The retry starts from the images' initial layouts again
        let barriers = ctx.driver().barriers();
        let old_layouts: Vec<_> = barriers[before..before + 2].iter().map(|b| b.old_layout).collect();
        assert_eq!(
            old_layouts,
            vec![vk::ImageLayout::PREINITIALIZED, vk::ImageLayout::UNDEFINED]
        );
    }

    #[test]
    fn uploads_stay_done_when_only_present_fails() {
        let mut ctx = mock_context(MockDriver::new().with_linear_sampling(false));
        ctx.new_texture(2, 2, &[0; 16]).unwrap();
        ctx.driver().push_present(Err(vk::Result::ERROR_SURFACE_LOST_KHR));

        ctx.draw_begin(0.0, 0.0, 0.0).unwrap();
        assert!(ctx.draw_end().is_err());
        assert!(ctx.pending_uploads.is_empty());

        frame(&mut ctx);
        assert_eq!(ctx.driver().copies().len(), 1);
    }

    #[test]
    fn draw_begin_needs_render_targets() {
        let mut ctx = mock_context(MockDriver::new());
        let err = ctx
            .rebuild_targets(|_, _| Err(VwError::invalid("surface gone")))
            .unwrap_err();
        assert!(matches!(err, VwError::InvalidArgument(_)));

        assert!(matches!(ctx.draw_begin(0.0, 0.0, 0.0), Err(VwError::InvalidArgument(_))));
        assert_eq!(ctx.frame_state(), FrameState::Idle);
        assert_eq!(ctx.driver().calls("acquire_next_image"), 0);

        ctx.rebuild_targets(|driver, _| Ok(mock_targets(driver, 2))).unwrap();
        frame(&mut ctx);
        assert_eq!(ctx.driver().calls("acquire_next_image"), 1);
    }
}
