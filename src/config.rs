// =============================================================================
// CONFIGURATION - Load settings from vw.toml
// =============================================================================
//
// Settings for context creation, memory policy, logging and the demo.
// Every section falls back to defaults when the file or a key is missing.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Default config file looked up by `Config::load`
pub const CONFIG_FILE: &str = "vw.toml";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub memory: MemoryConfig,
    pub debug: DebugConfig,
    pub demo: DemoConfig,
}

/// Window settings (application name and demo window size)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "vw".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

/// Swapchain settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    /// Requested swapchain depth, clamped to what the surface allows
    pub buffering: u32,
    pub clear_color: [f32; 3],
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "mailbox".to_string(),
            buffering: 2,
            clear_color: [0.1, 0.2, 0.8],
        }
    }
}

/// Memory-type selection policy
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Use memory type 0 (with a warning) when nothing matches instead of failing
    pub fallback_to_first_type: bool,
}

/// Debug settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_level: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: false,
            log_level: "info".to_string(),
        }
    }
}

/// Compiled SPIR-V used by the demo binary
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub vertex_shader: String,
    pub fragment_shader: String,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            vertex_shader: "shaders/textured.vert.spv".to_string(),
            fragment_shader: "shaders/textured.frag.spv".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path(CONFIG_FILE).unwrap_or_else(|e| {
            log::warn!("Failed to load {}: {:#}. Using defaults.", CONFIG_FILE, e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Get present mode as Vulkan enum
    pub fn present_mode(&self) -> ash::vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => ash::vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => ash::vk::PresentModeKHR::MAILBOX,
            "fifo" => ash::vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => ash::vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to FIFO",
                    self.graphics.present_mode
                );
                ash::vk::PresentModeKHR::FIFO
            }
        }
    }
}
