/// Shader - Vulkan implementation of the Shader trait, with SPIR-V reflection

use emy_engine::emy::Result;
use emy_engine::emy::render::{
    Shader as RendererShader, ShaderStage, BindingType, BindingLayoutEntry,
};
use emy_engine::{engine_warn, engine_warn_err};
use ash::vk;
use std::ffi::CString;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;

/// A descriptor binding declared by a shader module
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReflectedBinding {
    pub name: String,
    pub set: u32,
    pub binding: u32,
    /// `None` for descriptor types the engine never binds (storage images, ...)
    pub binding_type: Option<BindingType>,
}

/// Vulkan shader implementation
pub struct Shader {
    ctx: Arc<GpuContext>,
    /// Vulkan shader module
    pub(crate) module: vk::ShaderModule,
    /// Pipeline stage
    stage: ShaderStage,
    /// Debug name
    name: String,
    /// Entry point name
    pub(crate) entry_point: CString,
    /// Descriptor bindings found by reflection
    pub(crate) reflected_bindings: Vec<ReflectedBinding>,
}

impl Shader {
    pub(crate) fn new(
        ctx: Arc<GpuContext>,
        module: vk::ShaderModule,
        stage: ShaderStage,
        name: &str,
        entry_point: CString,
        reflected_bindings: Vec<ReflectedBinding>,
    ) -> Self {
        Self {
            ctx,
            module,
            stage,
            name: name.to_string(),
            entry_point,
            reflected_bindings,
        }
    }

    /// Warn about every binding this shader reads that `entries` does not provide
    ///
    /// Returns the number of mismatches.
    pub(crate) fn check_bindings(&self, entries: &[BindingLayoutEntry]) -> usize {
        let missing = missing_bindings(self.stage, &self.reflected_bindings, entries);
        for reflected in &missing {
            engine_warn!("emy::vulkan",
                "Shader '{}' declares '{}' at set {} binding {} ({:?}) which the pipeline layout does not provide",
                self.name, reflected.name, reflected.set, reflected.binding, reflected.binding_type);
        }
        missing.len()
    }
}

/// Reflected bindings of a `stage` shader that `entries` (set 0) does not satisfy
///
/// A binding is satisfied when set 0 has an entry at the same binding number,
/// of the same type, visible to `stage`.
pub(crate) fn missing_bindings<'a>(
    stage: ShaderStage,
    reflected: &'a [ReflectedBinding],
    entries: &[BindingLayoutEntry],
) -> Vec<&'a ReflectedBinding> {
    reflected
        .iter()
        .filter(|binding| {
            let provided = entries.iter().find(|entry| entry.binding == binding.binding);
            let satisfied = binding.set == 0
                && match (provided, binding.binding_type) {
                    (Some(entry), Some(binding_type)) => {
                        entry.binding_type == binding_type && entry.stage_flags.contains(stage.flag())
                    }
                    _ => false,
                };
            !satisfied
        })
        .collect()
}

impl RendererShader for Shader {
    fn stage(&self) -> ShaderStage {
        self.stage
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_shader_module(self.module, None);
        }
    }
}

/// SPIR-V magic number (first word of every module)
pub(crate) const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Reinterpret shader bytes as SPIR-V words
///
/// Fails (Warn severity) when the length is not a multiple of 4 or the magic
/// number is missing.
pub(crate) fn spirv_words(name: &str, code: &[u8]) -> Result<Vec<u32>> {
    if code.is_empty() || code.len() % 4 != 0 {
        return Err(engine_warn_err!("emy::vulkan",
            "Shader '{}' code not 4-byte aligned (size: {} bytes)", name, code.len()));
    }

    let words: Vec<u32> = code
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    if words[0] != SPIRV_MAGIC {
        return Err(engine_warn_err!("emy::vulkan",
            "Shader '{}' is not SPIR-V (first word {:#010x})", name, words[0]));
    }

    Ok(words)
}

/// Parse SPIR-V and extract the descriptor bindings of every entry point
pub(crate) fn reflect_bindings(name: &str, code: &[u32]) -> Result<Vec<ReflectedBinding>> {
    let entry_points = spirq::ReflectConfig::new()
        .spv(code)
        .ref_all_rscs(true)
        .reflect()
        .map_err(|e| engine_warn_err!("emy::vulkan",
            "SPIR-V reflection of '{}' failed: {:?}", name, e))?;

    let mut bindings: Vec<ReflectedBinding> = Vec::new();

    for entry_point in &entry_points {
        for var in entry_point.vars.iter() {
            if let spirq::var::Variable::Descriptor { name, desc_bind, desc_ty, .. } = var {
                let reflected = ReflectedBinding {
                    name: name.clone().unwrap_or_default(),
                    set: desc_bind.set(),
                    binding: desc_bind.bind(),
                    binding_type: descriptor_type_to_binding_type(desc_ty),
                };
                if !bindings.contains(&reflected) {
                    bindings.push(reflected);
                }
            }
        }
    }

    Ok(bindings)
}

/// Convert a spirq descriptor type to the engine BindingType
fn descriptor_type_to_binding_type(desc_ty: &spirq::ty::DescriptorType) -> Option<BindingType> {
    use spirq::ty::DescriptorType;
    match desc_ty {
        DescriptorType::UniformBuffer() => Some(BindingType::UniformBuffer),
        DescriptorType::CombinedImageSampler() => Some(BindingType::CombinedImageSampler),
        _ => None,
    }
}

#[cfg(test)]
#[path = "vulkan_shader_tests.rs"]
mod tests;
