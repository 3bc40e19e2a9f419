/// Batched drawing.
///
/// Records a scene walk into a command list: each pipeline is bound once
/// per bucket, each mesh's buffers once per bucket, then one indexed draw
/// per model with that model's binding group for the current frame slot.

use std::sync::Arc;
use crate::error::{Error, Result};
use crate::graphics_device::{CommandList, Pipeline};
use crate::resource::{MeshKey, PipelineKey, ResourceManager};
use super::model::Model;
use super::scene::SceneVisitor;

/// Scene visitor recording draw commands for one frame slot.
///
/// Must run inside an active render pass.
pub struct BatchedDrawer<'a> {
    resources: &'a ResourceManager,
    cmd: &'a mut dyn CommandList,
    slot: usize,
    bound_pipeline: Option<Arc<dyn Pipeline>>,
    bound_index_count: u32,
    draw_calls: u32,
}

impl<'a> BatchedDrawer<'a> {
    pub fn new(resources: &'a ResourceManager, cmd: &'a mut dyn CommandList, slot: usize) -> Self {
        Self {
            resources,
            cmd,
            slot,
            bound_pipeline: None,
            bound_index_count: 0,
            draw_calls: 0,
        }
    }

    /// Draw calls recorded so far
    pub fn draw_calls(&self) -> u32 {
        self.draw_calls
    }
}

impl SceneVisitor for BatchedDrawer<'_> {
    fn pipeline(&mut self, key: PipelineKey) -> Result<()> {
        let state = self.resources.require_pipeline(key)?;
        let pipeline = state.graphics_device_pipeline()
            .ok_or_else(|| Error::InvalidState(format!("pipeline '{}' is not created", state.name())))?
            .clone();
        self.cmd.bind_pipeline(&pipeline)?;
        self.bound_pipeline = Some(pipeline);
        Ok(())
    }

    fn mesh(&mut self, key: MeshKey) -> Result<()> {
        let mesh = self.resources.mesh(key)
            .ok_or_else(|| Error::InvalidResource(format!("unknown mesh {:?}", key)))?;
        mesh.bind(self.cmd)?;
        self.bound_index_count = mesh.index_count();
        Ok(())
    }

    fn model(&mut self, model: &Model) -> Result<()> {
        let pipeline = self.bound_pipeline.as_ref()
            .ok_or_else(|| Error::InvalidState("model visited before its pipeline".to_string()))?;
        self.cmd.bind_binding_group(pipeline, 0, model.frame(self.slot).binding_group())?;
        self.cmd.draw_indexed(self.bound_index_count, 0, 0)?;
        self.draw_calls += 1;
        Ok(())
    }
}

#[cfg(test)]
#[path = "drawer_tests.rs"]
mod tests;
