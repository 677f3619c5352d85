// Shader module loading
//
// SPIR-V arrives as raw bytes from the caller. `ash::util::read_spv` checks
// the length and magic number and copies into aligned words, so unaligned
// input is fine.

use ash::vk;
use std::io::Cursor;

use super::driver::Driver;
use crate::error::{Result, VkResultExt, VwError};

/// One vertex + fragment program and the number of textures it samples
#[derive(Debug, Clone, Copy)]
pub struct ShaderPair<'a> {
    pub vertex: &'a [u8],
    pub fragment: &'a [u8],
    /// Combined image samplers at binding 1 (the layout always declares at least one)
    pub textures: u32,
}

impl<'a> ShaderPair<'a> {
    pub fn new(vertex: &'a [u8], fragment: &'a [u8]) -> Self {
        Self {
            vertex,
            fragment,
            textures: 0,
        }
    }

    pub fn with_textures(mut self, textures: u32) -> Self {
        self.textures = textures;
        self
    }
}

/// Decode SPIR-V bytes into words
pub fn read_words(code: &[u8]) -> Result<Vec<u32>> {
    if code.is_empty() {
        return Err(VwError::InvalidShader("empty bytecode".to_string()));
    }
    ash::util::read_spv(&mut Cursor::new(code)).map_err(|e| VwError::InvalidShader(e.to_string()))
}

/// Create a shader module from SPIR-V bytes
pub fn create_shader_module<D: Driver>(driver: &D, code: &[u8]) -> Result<vk::ShaderModule> {
    let words = read_words(code)?;
    let create_info = vk::ShaderModuleCreateInfo::builder().code(&words);

    unsafe { driver.create_shader_module(&create_info) }.context("Failed to create shader module")
}
