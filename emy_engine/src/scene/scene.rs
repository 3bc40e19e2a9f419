/// Scene - the pipeline → mesh → model index driving batched submission.
///
/// Models live in their mesh bucket, which lives in its pipeline bucket.
/// A SlotMap maps every ModelKey to its bucket so removal never scans the
/// whole scene. Buckets are ordered maps, so traversal order is
/// deterministic for a given sequence of insertions.

use std::collections::BTreeMap;
use rustc_hash::FxHashSet;
use slotmap::SlotMap;
use crate::error::Result;
use crate::resource::{MeshKey, PipelineKey};
use super::model::{Model, ModelKey};

/// Bucket a model lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ModelLocation {
    pipeline: PipelineKey,
    mesh: MeshKey,
}

/// Callbacks for `Scene::walk`.
///
/// `pipeline` is called once per pipeline bucket, `mesh` once per mesh
/// bucket inside it, `model` once per model inside that.
pub trait SceneVisitor {
    fn pipeline(&mut self, _key: PipelineKey) -> Result<()> {
        Ok(())
    }

    fn mesh(&mut self, _key: MeshKey) -> Result<()> {
        Ok(())
    }

    fn model(&mut self, model: &Model) -> Result<()>;
}

/// Three-level model index
pub struct Scene {
    buckets: BTreeMap<PipelineKey, BTreeMap<MeshKey, Vec<Model>>>,
    locations: SlotMap<ModelKey, ModelLocation>,
    pending_removals: Vec<ModelKey>,
    pending_set: FxHashSet<ModelKey>,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            buckets: BTreeMap::new(),
            locations: SlotMap::with_key(),
            pending_removals: Vec::new(),
            pending_set: FxHashSet::default(),
        }
    }

    /// Insert a model, creating its pipeline and mesh buckets on demand.
    ///
    /// Insertion order within a mesh bucket is draw order.
    pub fn add(&mut self, mut model: Model) -> ModelKey {
        let location = ModelLocation {
            pipeline: model.pipeline(),
            mesh: model.mesh(),
        };
        let key = self.locations.insert(location);
        model.set_key(key);
        self.buckets
            .entry(location.pipeline)
            .or_default()
            .entry(location.mesh)
            .or_default()
            .push(model);
        key
    }

    /// Queue a model for removal at the next `flush_removals`.
    ///
    /// Returns false for unknown keys and for models already queued.
    pub fn mark_for_removal(&mut self, key: ModelKey) -> bool {
        if !self.locations.contains_key(key) || !self.pending_set.insert(key) {
            return false;
        }
        self.pending_removals.push(key);
        true
    }

    /// Number of models waiting for `flush_removals`
    pub fn pending_removal_count(&self) -> usize {
        self.pending_removals.len()
    }

    /// Remove every queued model and prune the buckets they leave empty.
    ///
    /// Dropping a model releases its uniform buffers and binding groups, so
    /// this must only run when no submitted frame still references them.
    /// Returns the number of models removed.
    pub fn flush_removals(&mut self) -> usize {
        let mut removed = 0;
        for key in std::mem::take(&mut self.pending_removals) {
            let Some(location) = self.locations.remove(key) else { continue };

            let Some(meshes) = self.buckets.get_mut(&location.pipeline) else { continue };
            if let Some(models) = meshes.get_mut(&location.mesh) {
                if let Some(index) = models.iter().position(|m| m.key() == key) {
                    models.remove(index);
                    removed += 1;
                }
                if models.is_empty() {
                    meshes.remove(&location.mesh);
                }
            }
            if meshes.is_empty() {
                self.buckets.remove(&location.pipeline);
            }
        }
        self.pending_set.clear();
        if removed > 0 {
            crate::engine_debug!("emy::Scene", "Removed {} model(s)", removed);
        }
        removed
    }

    /// Visit every pipeline bucket, mesh bucket and model in order
    pub fn walk<V: SceneVisitor + ?Sized>(&self, visitor: &mut V) -> Result<()> {
        for (&pipeline, meshes) in &self.buckets {
            visitor.pipeline(pipeline)?;
            for (&mesh, models) in meshes {
                visitor.mesh(mesh)?;
                for model in models {
                    visitor.model(model)?;
                }
            }
        }
        Ok(())
    }

    // ===== QUERIES =====

    pub fn contains(&self, key: ModelKey) -> bool {
        self.locations.contains_key(key)
    }

    pub fn model(&self, key: ModelKey) -> Option<&Model> {
        let location = self.locations.get(key)?;
        self.buckets.get(&location.pipeline)?
            .get(&location.mesh)?
            .iter()
            .find(|m| m.key() == key)
    }

    pub fn model_mut(&mut self, key: ModelKey) -> Option<&mut Model> {
        let location = *self.locations.get(key)?;
        self.buckets.get_mut(&location.pipeline)?
            .get_mut(&location.mesh)?
            .iter_mut()
            .find(|m| m.key() == key)
    }

    pub fn model_count(&self) -> usize {
        self.locations.len()
    }

    /// Number of non-empty pipeline buckets
    pub fn pipeline_bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Number of mesh buckets under `pipeline` (0 if the bucket is absent)
    pub fn mesh_bucket_count(&self, pipeline: PipelineKey) -> usize {
        self.buckets.get(&pipeline).map_or(0, |m| m.len())
    }

    pub fn has_mesh_bucket(&self, pipeline: PipelineKey, mesh: MeshKey) -> bool {
        self.buckets.get(&pipeline).is_some_and(|m| m.contains_key(&mesh))
    }

    /// Keys of all models in traversal order
    pub fn model_keys(&self) -> Vec<ModelKey> {
        self.buckets
            .values()
            .flat_map(|meshes| meshes.values())
            .flat_map(|models| models.iter().map(|m| m.key()))
            .collect()
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "scene_tests.rs"]
mod tests;
