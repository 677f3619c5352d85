// =============================================================================
// VW-GPU - Thin Vulkan binding layer
// =============================================================================
//
// Initializes a rendering device for a native window, builds shader
// pipelines, uploads vertex and texture data and runs a serialized
// acquire/record/submit/present loop. Usable from Rust through `Context` and
// from other runtimes through the C ABI in `ffi`.
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  ffi (extern "C", status codes, u64 handles)                    │
// │    └── Context (handle tables, frame loop)                      │
// │          └── backend (pipelines, instances, shapes, textures)   │
// │                └── Driver trait ── VulkanDevice (ash)           │
// └─────────────────────────────────────────────────────────────────┘
//
// Every driver failure comes back as a `VwError`; nothing aborts.

pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod ffi;
pub mod frame;

pub use backend::{Driver, ShaderPair, VulkanDevice};
pub use config::Config;
pub use context::{Context, InstanceKey, PipelineKey, ShapeKey, TextureKey};
pub use error::{Result, VwError};
pub use frame::FrameState;

/// Initialize env_logger at the configured level (`RUST_LOG` wins)
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(config: &Config) {
    use env_logger::{Builder, Env};

    let mut builder = Builder::from_env(Env::default().default_filter_or(config.debug.log_level.as_str()));
    builder.format_timestamp_millis();

    if builder.try_init().is_ok() {
        log::debug!("Logging initialized at '{}'", config.debug.log_level);
    }
}
