/// Shader trait and shader descriptor

use bitflags::bitflags;

/// Programmable pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Vertex,
    TessellationControl,
    TessellationEvaluation,
    Geometry,
    Fragment,
}

impl ShaderStage {
    /// Visibility flag for this stage
    pub fn flag(&self) -> ShaderStageFlags {
        match self {
            ShaderStage::Vertex => ShaderStageFlags::VERTEX,
            ShaderStage::TessellationControl => ShaderStageFlags::TESSELLATION_CONTROL,
            ShaderStage::TessellationEvaluation => ShaderStageFlags::TESSELLATION_EVALUATION,
            ShaderStage::Geometry => ShaderStageFlags::GEOMETRY,
            ShaderStage::Fragment => ShaderStageFlags::FRAGMENT,
        }
    }
}

bitflags! {
    /// Set of shader stages a binding is visible to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX = 0x01;
        const TESSELLATION_CONTROL = 0x02;
        const TESSELLATION_EVALUATION = 0x04;
        const GEOMETRY = 0x08;
        const FRAGMENT = 0x10;
    }
}

/// Descriptor for creating a shader module
#[derive(Debug, Clone)]
pub struct ShaderDesc<'a> {
    /// Debug name (e.g. "BaseVert")
    pub name: &'a str,
    /// SPIR-V bytecode
    pub code: &'a [u8],
    /// Pipeline stage this module runs in
    pub stage: ShaderStage,
    /// Entry point name
    pub entry_point: &'a str,
}

/// Shader module trait
pub trait Shader: Send + Sync {
    /// Pipeline stage of this module
    fn stage(&self) -> ShaderStage;

    /// Debug name
    fn name(&self) -> &str;
}
