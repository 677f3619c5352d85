// Error types
//
// Every driver call result is turned into a VwError and handed back to the
// caller. Nothing in this crate aborts or exits the process.

use ash::prelude::VkResult;
use ash::vk;
use thiserror::Error;

/// Errors returned by every fallible operation of the crate
#[derive(Error, Debug)]
pub enum VwError {
    /// A driver call returned something other than success
    #[error("{what}: {result:?} ({})", .result.as_raw())]
    Vulkan {
        /// The operation that failed
        what: &'static str,
        /// Raw driver result
        result: vk::Result,
    },

    /// Swapchain image acquisition failed after the out-of-date retry
    #[error("vkAcquireNextImageKHR failed: {0:?} ({})", .0.as_raw())]
    Acquire(vk::Result),

    /// No memory type satisfies the resource's type bits and property flags
    #[error("no memory type in bits {type_bits:#b} with flags {flags:?}")]
    NoMemoryType {
        type_bits: u32,
        flags: vk::MemoryPropertyFlags,
    },

    /// The handle was freed already or never issued by this context
    #[error("stale {0} handle")]
    StaleHandle(&'static str),

    #[error("invalid shader bytecode: {0}")]
    InvalidShader(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A frame-loop call arrived in the wrong state
    #[error("frame loop is {found}, expected {expected}")]
    FrameState {
        expected: &'static str,
        found: &'static str,
    },

    /// Instance, surface or device setup failed
    #[error("initialization failed: {0:#}")]
    Init(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, VwError>;

/// Attach the failing operation's name to a raw driver result
pub trait VkResultExt<T> {
    fn context(self, what: &'static str) -> Result<T>;
}

impl<T> VkResultExt<T> for VkResult<T> {
    fn context(self, what: &'static str) -> Result<T> {
        self.map_err(|result| VwError::Vulkan { what, result })
    }
}

impl VwError {
    /// Shorthand for argument validation failures
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}
