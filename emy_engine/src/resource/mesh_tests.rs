//! Unit tests for mesh.rs

use super::*;
use crate::error::Error;
use crate::graphics_device::mock_graphics_device::{MockCommandList, MockGraphicsDevice};
use crate::graphics_device::{Buffer, BufferUsage, CommandList};
use glam::{Vec2, Vec3};

fn triangle() -> MeshData {
    let vertex = |x: f32, y: f32| Vertex {
        position: Vec3::new(x, y, 0.0),
        normal: Vec3::Z,
        tangent: Vec3::X,
        tex_coord: Vec2::new(x, y),
    };
    MeshData {
        vertices: vec![vertex(0.0, 0.0), vertex(1.0, 0.0), vertex(0.0, 1.0)],
        indices: vec![0, 1, 2],
    }
}

// ============================================================================
// Vertex layout
// ============================================================================

#[test]
fn test_vertex_is_tightly_packed() {
    assert_eq!(std::mem::size_of::<Vertex>(), 44);
}

#[test]
fn test_vertex_layout_matches_fields() {
    let layout = Vertex::layout();
    assert_eq!(layout.bindings.len(), 1);
    assert_eq!(layout.bindings[0].stride, 44);

    let offsets: Vec<u32> = layout.attributes.iter().map(|a| a.offset).collect();
    assert_eq!(offsets, vec![0, 12, 24, 36]);
    let locations: Vec<u32> = layout.attributes.iter().map(|a| a.location).collect();
    assert_eq!(locations, vec![0, 1, 2, 3]);
    assert_eq!(layout.attributes[3].format, BufferFormat::R32G32_SFLOAT);
}

// ============================================================================
// Mesh upload
// ============================================================================

#[test]
fn test_from_data_uploads_vertices_and_indices() {
    let device = MockGraphicsDevice::new();
    let mesh = Mesh::from_data(&device, "triangle", MeshFormat::Raw, &triangle()).unwrap();

    assert_eq!(mesh.name(), "triangle");
    assert_eq!(mesh.format(), MeshFormat::Raw);
    assert_eq!(mesh.vertex_count(), 3);
    assert_eq!(mesh.index_count(), 3);
    assert_eq!(mesh.vertex_buffer().size(), 3 * 44);

    let indices = device.buffer_contents(mesh.index_buffer()).unwrap();
    assert_eq!(indices, bytemuck::cast_slice::<u32, u8>(&[0, 1, 2]).to_vec());

    let buffers = device.buffers.lock().unwrap();
    assert_eq!(buffers[0].usage, BufferUsage::Vertex);
    assert_eq!(buffers[1].usage, BufferUsage::Index);
}

#[test]
fn test_from_data_rejects_empty_geometry() {
    let device = MockGraphicsDevice::new();
    let result = Mesh::from_data(&device, "empty", MeshFormat::Raw, &MeshData::default());
    assert!(matches!(result, Err(Error::InvalidResource(_))));
}

#[test]
fn test_from_data_rejects_out_of_range_index() {
    let device = MockGraphicsDevice::new();
    let mut data = triangle();
    data.indices[2] = 3;

    let result = Mesh::from_data(&device, "broken", MeshFormat::Obj, &data);
    assert!(matches!(result, Err(Error::InvalidResource(ref m)) if m.contains("out of range")));
    assert!(device.buffers.lock().unwrap().is_empty());
}

#[test]
fn test_bind_records_vertex_then_index_buffer() {
    let device = MockGraphicsDevice::new();
    let mesh = Mesh::from_data(&device, "triangle", MeshFormat::Raw, &triangle()).unwrap();
    let (vertex_id, index_id) = {
        let buffers = device.buffers.lock().unwrap();
        (buffers[0].id, buffers[1].id)
    };

    let mut cmd = MockCommandList::new();
    cmd.begin().unwrap();
    mesh.bind(&mut cmd).unwrap();

    assert_eq!(cmd.commands[1], format!("bind_vertex_buffer({})", vertex_id));
    assert_eq!(cmd.commands[2], format!("bind_index_buffer({}, U32)", index_id));
}

#[test]
fn test_mesh_data_max_index() {
    assert_eq!(triangle().max_index(), Some(2));
    assert_eq!(MeshData::default().max_index(), None);
}
