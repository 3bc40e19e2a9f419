//! Resource-level mesh type.
//!
//! A `Mesh` is a GPU vertex/index buffer pair plus its source format tag.
//! It is owned by the `ResourceManager` and shared by key across any number
//! of models.

use std::sync::Arc;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use crate::error::Result;
use crate::engine_bail_warn;
use crate::graphics_device::{
    self, Buffer, BufferDesc, BufferUsage, BufferFormat, CommandList, IndexType,
    VertexAttribute, VertexBinding, VertexInputRate, VertexLayout,
};
use crate::resource::loader::{MeshData, MeshFormat};

// ============================================================================
// VERTEX
// ============================================================================

/// Interleaved vertex, binding 0, per-vertex rate
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub tangent: Vec3,
    pub tex_coord: Vec2,
}

impl Vertex {
    /// Vertex input layout matching the field order
    pub fn layout() -> VertexLayout {
        let attribute = |location, format, offset| VertexAttribute {
            location,
            binding: 0,
            format,
            offset,
        };
        VertexLayout {
            bindings: vec![VertexBinding {
                binding: 0,
                stride: std::mem::size_of::<Vertex>() as u32,
                input_rate: VertexInputRate::Vertex,
            }],
            attributes: vec![
                attribute(0, BufferFormat::R32G32B32_SFLOAT, 0),
                attribute(1, BufferFormat::R32G32B32_SFLOAT, 12),
                attribute(2, BufferFormat::R32G32B32_SFLOAT, 24),
                attribute(3, BufferFormat::R32G32_SFLOAT, 36),
            ],
        }
    }
}

// ============================================================================
// MESH
// ============================================================================

/// GPU-resident indexed mesh
pub struct Mesh {
    name: String,
    format: MeshFormat,
    vertex_buffer: Arc<dyn Buffer>,
    index_buffer: Arc<dyn Buffer>,
    vertex_count: u32,
    index_count: u32,
}

impl Mesh {
    /// Upload `data` into new vertex and index buffers
    pub(crate) fn from_data(
        graphics_device: &dyn graphics_device::GraphicsDevice,
        name: &str,
        format: MeshFormat,
        data: &MeshData,
    ) -> Result<Self> {
        if data.vertices.is_empty() || data.indices.is_empty() {
            engine_bail_warn!("emy::Mesh", "Mesh '{}' has no geometry", name);
        }
        if let Some(max) = data.max_index() {
            if max as usize >= data.vertices.len() {
                engine_bail_warn!("emy::Mesh",
                    "Mesh '{}' index {} out of range ({} vertices)",
                    name, max, data.vertices.len());
            }
        }

        let vertex_bytes: &[u8] = bytemuck::cast_slice(&data.vertices);
        let vertex_buffer = graphics_device.create_buffer(BufferDesc {
            size: vertex_bytes.len() as u64,
            usage: BufferUsage::Vertex,
        })?;
        vertex_buffer.update(0, vertex_bytes)?;

        let index_bytes: &[u8] = bytemuck::cast_slice(&data.indices);
        let index_buffer = graphics_device.create_buffer(BufferDesc {
            size: index_bytes.len() as u64,
            usage: BufferUsage::Index,
        })?;
        index_buffer.update(0, index_bytes)?;

        Ok(Self {
            name: name.to_string(),
            format,
            vertex_buffer,
            index_buffer,
            vertex_count: data.vertices.len() as u32,
            index_count: data.indices.len() as u32,
        })
    }

    /// Bind the vertex and index buffers
    pub fn bind(&self, cmd: &mut dyn CommandList) -> Result<()> {
        cmd.bind_vertex_buffer(&self.vertex_buffer, 0)?;
        cmd.bind_index_buffer(&self.index_buffer, 0, IndexType::U32)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> MeshFormat {
        self.format
    }

    pub fn vertex_buffer(&self) -> &Arc<dyn Buffer> {
        &self.vertex_buffer
    }

    pub fn index_buffer(&self) -> &Arc<dyn Buffer> {
        &self.index_buffer
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Number of indices drawn per model
    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

#[cfg(test)]
#[path = "mesh_tests.rs"]
mod tests;
