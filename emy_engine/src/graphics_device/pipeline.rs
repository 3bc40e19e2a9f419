/// Pipeline trait, binding layouts, and fixed-function state

use std::sync::Arc;
use crate::graphics_device::{BufferFormat, Shader, ShaderStageFlags};

// ============================================================================
// Binding layout
// ============================================================================

/// Type of resource bound at a given slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingType {
    /// Uniform buffer (read-only structured data)
    UniformBuffer,
    /// Combined image sampler (texture + sampler in one binding)
    CombinedImageSampler,
}

/// One slot of a binding layout (`layout(binding = N)` in GLSL)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingLayoutEntry {
    pub binding: u32,
    pub binding_type: BindingType,
    pub stage_flags: ShaderStageFlags,
}

/// GPU descriptor set layout
///
/// Created once per pipeline state and shared by the compiled pipeline and
/// every binding group allocated for it.
pub trait BindingLayout: Send + Sync {
    /// Ordered binding slots
    fn entries(&self) -> &[BindingLayoutEntry];
}

// ============================================================================
// Fixed-function state
// ============================================================================

/// Primitive topology
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveTopology {
    TriangleList,
    TriangleStrip,
    LineList,
    PointList,
}

/// Polygon rasterization mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolygonMode {
    #[default]
    Fill,
    Line,
    Point,
}

/// Face culling mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    Back,
}

/// Winding order of front faces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontFace {
    CounterClockwise,
    Clockwise,
}

/// Depth comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

/// MSAA sample count
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SampleCount {
    S1,
    S2,
    S4,
    S8,
    S16,
    S32,
    S64,
}

impl SampleCount {
    /// Samples per pixel
    pub fn count(&self) -> u32 {
        match self {
            SampleCount::S1 => 1,
            SampleCount::S2 => 2,
            SampleCount::S4 => 4,
            SampleCount::S8 => 8,
            SampleCount::S16 => 16,
            SampleCount::S32 => 32,
            SampleCount::S64 => 64,
        }
    }

    /// Largest supported count not above `count` (non powers of two round down)
    pub fn from_count(count: u32) -> Self {
        match count {
            0 | 1 => SampleCount::S1,
            2..=3 => SampleCount::S2,
            4..=7 => SampleCount::S4,
            8..=15 => SampleCount::S8,
            16..=31 => SampleCount::S16,
            32..=63 => SampleCount::S32,
            _ => SampleCount::S64,
        }
    }
}

/// Rasterization state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterizationState {
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
}

impl Default for RasterizationState {
    fn default() -> Self {
        Self {
            polygon_mode: PolygonMode::Fill,
            cull_mode: CullMode::Back,
            front_face: FrontFace::CounterClockwise,
        }
    }
}

/// Depth test state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthState {
    pub test_enable: bool,
    pub write_enable: bool,
    pub compare_op: CompareOp,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            test_enable: true,
            write_enable: true,
            compare_op: CompareOp::Less,
        }
    }
}

// ============================================================================
// Vertex input
// ============================================================================

/// Per-vertex or per-instance stepping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexInputRate {
    Vertex,
    Instance,
}

/// Vertex attribute description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub binding: u32,
    pub format: BufferFormat,
    pub offset: u32,
}

/// Vertex buffer binding description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBinding {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: VertexInputRate,
}

/// Complete vertex input layout
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VertexLayout {
    pub bindings: Vec<VertexBinding>,
    pub attributes: Vec<VertexAttribute>,
}

// ============================================================================
// Pipeline
// ============================================================================

/// Everything needed to compile a graphics pipeline against a swapchain
pub struct PipelineDesc<'a> {
    /// Shader stages, at most one per stage type
    pub stages: &'a [Arc<dyn Shader>],
    /// Descriptor set layout (set 0)
    pub binding_layout: &'a Arc<dyn BindingLayout>,
    pub vertex_layout: VertexLayout,
    pub topology: PrimitiveTopology,
    pub rasterization: RasterizationState,
    pub depth: DepthState,
    pub blend_enable: bool,
}

/// Compiled graphics pipeline
///
/// Viewport and scissor are baked in from the swapchain extent at creation;
/// a resized swapchain needs a new pipeline.
pub trait Pipeline: Send + Sync {
    /// Swapchain extent (width, height) baked into this pipeline
    fn extent(&self) -> (u32, u32);
}
