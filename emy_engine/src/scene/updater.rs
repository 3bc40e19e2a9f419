/// Uniform updates.
///
/// Writes each model's uniform block for the current frame slot. The other
/// slot's buffer may still be read by a frame in flight and is left alone.

use crate::error::Result;
use super::model::Model;
use super::scene::SceneVisitor;
use super::uniform::FrameUniforms;

/// Scene visitor writing the uniform buffers of one frame slot
pub struct UniformUpdater<'a> {
    frame: &'a FrameUniforms,
    slot: usize,
    updated: usize,
}

impl<'a> UniformUpdater<'a> {
    pub fn new(frame: &'a FrameUniforms, slot: usize) -> Self {
        Self { frame, slot, updated: 0 }
    }

    /// Models written so far
    pub fn updated(&self) -> usize {
        self.updated
    }
}

impl SceneVisitor for UniformUpdater<'_> {
    fn model(&mut self, model: &Model) -> Result<()> {
        let ubo = self.frame.for_model(model.transform().model_matrix());
        model.write_uniforms(self.slot, &ubo)?;
        self.updated += 1;
        Ok(())
    }
}

#[cfg(test)]
#[path = "updater_tests.rs"]
mod tests;
