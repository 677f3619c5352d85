// Synchronization primitives
//
// The frame loop is fully serialized: every frame gets two fresh semaphores
// which are destroyed once the frame has been presented. The per-frame fence
// is created and destroyed inside `draw_end`.

use ash::vk;

use super::driver::Driver;
use crate::error::{Result, VkResultExt};

/// Semaphore pair owned by one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSync {
    /// Signaled by acquisition, waited on by the submit
    pub image_acquired: vk::Semaphore,
    /// Signaled by the submit, waited on by present
    pub render_complete: vk::Semaphore,
}

impl FrameSync {
    pub fn new<D: Driver>(driver: &D) -> Result<Self> {
        unsafe {
            let image_acquired = driver
                .create_semaphore()
                .context("Failed to create image-acquired semaphore")?;
            let render_complete = match driver.create_semaphore() {
                Ok(semaphore) => semaphore,
                Err(result) => {
                    driver.destroy_semaphore(image_acquired);
                    return Err(result).context("Failed to create render-complete semaphore");
                }
            };
            Ok(Self {
                image_acquired,
                render_complete,
            })
        }
    }

    pub fn destroy<D: Driver>(self, driver: &D) {
        unsafe {
            driver.destroy_semaphore(self.image_acquired);
            driver.destroy_semaphore(self.render_complete);
        }
    }
}

/// Submit `cmd` with no semaphores and block until it has executed
pub fn submit_and_wait<D: Driver>(driver: &D, queue: vk::Queue, cmd: vk::CommandBuffer) -> Result<()> {
    let fence = unsafe { driver.create_fence() }.context("Failed to create fence")?;

    let command_buffers = [cmd];
    let submit = vk::SubmitInfo::builder().command_buffers(&command_buffers);

    let result = unsafe {
        driver
            .queue_submit(queue, &submit, fence)
            .context("Failed to submit command buffer")
            .and_then(|()| driver.wait_for_fence(fence).context("Failed to wait for fence"))
    };
    unsafe { driver.destroy_fence(fence) };
    result
}
