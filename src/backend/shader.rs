// Shader module loading
//
// Vulkan consumes SPIR-V bytecode. The build script compiles the GLSL
// sources; here we read the result from disk and wrap it in a module.

use anyhow::{Context, Result};
use ash::vk;
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use super::VulkanDevice;

/// Decode SPIR-V words, checking size, alignment and the magic number
pub fn read_spirv<R: Read + Seek>(reader: &mut R) -> Result<Vec<u32>> {
    ash::util::read_spv(reader).context("Invalid SPIR-V")
}

pub fn create_shader_module(device: &VulkanDevice, code: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::default().code(code);

    unsafe { device.device.create_shader_module(&create_info, None) }
        .context("Failed to create shader module")
}

/// Load a compiled shader from `path` and create a shader module from it
pub fn load_shader_module(device: &VulkanDevice, path: &Path) -> Result<vk::ShaderModule> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read shader {:?}. Was it compiled with glslc?", path))?;

    let code = read_spirv(&mut Cursor::new(bytes))
        .with_context(|| format!("Failed to load shader {:?}", path))?;

    log::debug!("Loaded shader {:?} ({} words)", path, code.len());

    create_shader_module(device, &code)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn test_read_spirv_words() {
        let words = [SPIRV_MAGIC, 0x0001_0000, 0, 1, 0];
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();

        let code = read_spirv(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(code, words);
    }

    #[test]
    fn test_read_spirv_rejects_truncated_input() {
        let bytes = vec![0x03, 0x02, 0x23, 0x07, 0x00];
        assert!(read_spirv(&mut Cursor::new(bytes)).is_err());
    }

    #[test]
    fn test_read_spirv_rejects_bad_magic() {
        let bytes = vec![0u8; 20];
        assert!(read_spirv(&mut Cursor::new(bytes)).is_err());
    }
}
