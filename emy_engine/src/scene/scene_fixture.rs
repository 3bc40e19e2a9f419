//! Shared fixture for scene unit tests: a mock device with two created
//! pipeline states, two meshes and two textures.

use std::sync::Arc;
use crate::graphics_device::mock_graphics_device::{MockGraphicsDevice, MockShader, MockSwapchain};
use crate::graphics_device::{PolygonMode, ShaderStage};
use crate::resource::{
    GraphicPipeline, ImageData, MeshData, MeshFormat, MeshKey, PipelineKey, ResourceManager,
    TextureKey, Vertex,
};
use super::{Model, ModelKey, Scene, Transform};

pub(crate) struct SceneFixture {
    pub device: MockGraphicsDevice,
    pub swapchain: MockSwapchain,
    pub resources: ResourceManager,
    pub scene: Scene,
    pub p1: PipelineKey,
    pub p2: PipelineKey,
    pub m1: MeshKey,
    pub m2: MeshKey,
    pub albedo: TextureKey,
    pub normal: TextureKey,
}

fn mesh_data(triangles: u32) -> MeshData {
    MeshData {
        vertices: vec![Vertex::default(); 3],
        indices: (0..triangles * 3).map(|i| i % 3).collect(),
    }
}

fn image() -> ImageData {
    ImageData { width: 2, height: 2, pixels: vec![128; 16], has_alpha: false }
}

fn pipeline(resources: &mut ResourceManager, device: &MockGraphicsDevice, swapchain: &MockSwapchain, name: &str) -> PipelineKey {
    let mut state = GraphicPipeline::new(name);
    state.add_shader(Arc::new(MockShader::new("BaseVert", ShaderStage::Vertex)), false);
    state.add_shader(Arc::new(MockShader::new("BaseFrag", ShaderStage::Fragment)), false);
    state.create(device, swapchain, PolygonMode::Fill).unwrap();
    resources.add_pipeline(state).unwrap()
}

impl SceneFixture {
    pub fn new() -> Self {
        let device = MockGraphicsDevice::new();
        let swapchain = device.create_swapchain(800, 600);
        let mut resources = ResourceManager::new();

        let p1 = pipeline(&mut resources, &device, &swapchain, "p1");
        let p2 = pipeline(&mut resources, &device, &swapchain, "p2");
        // M1 draws 3 indices, M2 draws 6, so draws are distinguishable
        let m1 = resources.add_mesh(&device, "m1", MeshFormat::Raw, &mesh_data(1)).unwrap();
        let m2 = resources.add_mesh(&device, "m2", MeshFormat::Raw, &mesh_data(2)).unwrap();
        let albedo = resources.add_texture(&device, "albedo", &image(), true).unwrap();
        let normal = resources.add_texture(&device, "normal", &image(), false).unwrap();

        Self {
            device,
            swapchain,
            resources,
            scene: Scene::new(),
            p1,
            p2,
            m1,
            m2,
            albedo,
            normal,
        }
    }

    pub fn model(&self, pipeline: PipelineKey, mesh: MeshKey) -> Model {
        Model::new(
            &self.device,
            &self.resources,
            mesh,
            self.albedo,
            self.normal,
            pipeline,
            Transform::default(),
        )
        .unwrap()
    }

    pub fn add(&mut self, pipeline: PipelineKey, mesh: MeshKey) -> ModelKey {
        let model = self.model(pipeline, mesh);
        self.scene.add(model)
    }

    pub fn pipeline_id(&self, key: PipelineKey) -> u32 {
        let pipeline = self.resources.pipeline(key).unwrap().graphics_device_pipeline().unwrap();
        self.device.pipeline_id(pipeline).unwrap()
    }

    pub fn vertex_buffer_id(&self, key: MeshKey) -> u32 {
        self.device.buffer_id(self.resources.mesh(key).unwrap().vertex_buffer()).unwrap()
    }

    pub fn group_id(&self, key: ModelKey, slot: usize) -> u32 {
        let model = self.scene.model(key).unwrap();
        self.device.binding_group_id(model.frame(slot).binding_group()).unwrap()
    }
}
