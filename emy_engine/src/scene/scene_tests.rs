/// Unit tests for Scene
///
/// These tests validate bucket creation, deferred removal and pruning,
/// and traversal order.

use super::*;
use crate::scene::scene_fixture::SceneFixture;

/// Records the walk as strings
#[derive(Default)]
struct Trace {
    events: Vec<String>,
}

impl SceneVisitor for Trace {
    fn pipeline(&mut self, key: PipelineKey) -> Result<()> {
        self.events.push(format!("pipeline {:?}", key));
        Ok(())
    }

    fn mesh(&mut self, key: MeshKey) -> Result<()> {
        self.events.push(format!("mesh {:?}", key));
        Ok(())
    }

    fn model(&mut self, model: &Model) -> Result<()> {
        self.events.push(format!("model {:?}", model.key()));
        Ok(())
    }
}

fn trace(scene: &Scene) -> Vec<String> {
    let mut trace = Trace::default();
    scene.walk(&mut trace).unwrap();
    trace.events
}

// ============================================================================
// Insertion
// ============================================================================

#[test]
fn test_add_creates_buckets_lazily() {
    let mut fx = SceneFixture::new();
    assert_eq!(fx.scene.pipeline_bucket_count(), 0);

    let a = fx.add(fx.p1, fx.m1);
    let b = fx.add(fx.p1, fx.m2);

    assert_eq!(fx.scene.model_count(), 2);
    assert_eq!(fx.scene.pipeline_bucket_count(), 1);
    assert_eq!(fx.scene.mesh_bucket_count(fx.p1), 2);
    assert_eq!(fx.scene.model(a).unwrap().mesh(), fx.m1);
    assert_eq!(fx.scene.model(b).unwrap().key(), b);
}

#[test]
fn test_same_bucket_keeps_insertion_order() {
    let mut fx = SceneFixture::new();
    let first = fx.add(fx.p1, fx.m1);
    let second = fx.add(fx.p1, fx.m1);
    let third = fx.add(fx.p1, fx.m1);

    assert_eq!(fx.scene.model_keys(), vec![first, second, third]);
    assert_eq!(fx.scene.mesh_bucket_count(fx.p1), 1);
}

#[test]
fn test_model_mut_updates_transform() {
    let mut fx = SceneFixture::new();
    let key = fx.add(fx.p1, fx.m1);

    fx.scene.model_mut(key).unwrap().transform_mut().position = glam::Vec3::new(4.0, 0.0, 0.0);

    assert_eq!(fx.scene.model(key).unwrap().transform().position.x, 4.0);
}

// ============================================================================
// Deferred removal
// ============================================================================

#[test]
fn test_mark_for_removal_is_deferred() {
    let mut fx = SceneFixture::new();
    let key = fx.add(fx.p1, fx.m1);

    assert!(fx.scene.mark_for_removal(key));

    assert!(fx.scene.contains(key));
    assert_eq!(fx.scene.pending_removal_count(), 1);
    assert_eq!(fx.scene.model_count(), 1);
}

#[test]
fn test_flush_prunes_empty_mesh_and_pipeline_buckets() {
    let mut fx = SceneFixture::new();
    let a = fx.add(fx.p1, fx.m1);
    let b = fx.add(fx.p1, fx.m2);
    let c = fx.add(fx.p2, fx.m1);

    fx.scene.mark_for_removal(a);
    fx.scene.mark_for_removal(c);
    assert_eq!(fx.scene.flush_removals(), 2);

    assert!(!fx.scene.contains(a));
    assert!(!fx.scene.contains(c));
    assert!(fx.scene.model(a).is_none());
    assert!(!fx.scene.has_mesh_bucket(fx.p1, fx.m1));
    assert!(fx.scene.has_mesh_bucket(fx.p1, fx.m2));
    assert_eq!(fx.scene.mesh_bucket_count(fx.p2), 0);
    assert_eq!(fx.scene.pipeline_bucket_count(), 1);
    assert_eq!(fx.scene.model_keys(), vec![b]);
}

#[test]
fn test_flush_keeps_bucket_with_remaining_models() {
    let mut fx = SceneFixture::new();
    let a = fx.add(fx.p1, fx.m1);
    let b = fx.add(fx.p1, fx.m1);

    fx.scene.mark_for_removal(a);
    fx.scene.flush_removals();

    assert!(fx.scene.has_mesh_bucket(fx.p1, fx.m1));
    assert_eq!(fx.scene.model_keys(), vec![b]);
}

#[test]
fn test_removing_everything_leaves_no_buckets() {
    let mut fx = SceneFixture::new();
    let keys = vec![fx.add(fx.p1, fx.m1), fx.add(fx.p1, fx.m2), fx.add(fx.p2, fx.m2)];

    for &key in &keys {
        fx.scene.mark_for_removal(key);
    }
    assert_eq!(fx.scene.flush_removals(), 3);

    assert_eq!(fx.scene.pipeline_bucket_count(), 0);
    assert_eq!(fx.scene.model_count(), 0);
    assert!(trace(&fx.scene).is_empty());
}

#[test]
fn test_duplicate_and_unknown_removals_are_ignored() {
    let mut fx = SceneFixture::new();
    let key = fx.add(fx.p1, fx.m1);

    assert!(fx.scene.mark_for_removal(key));
    assert!(!fx.scene.mark_for_removal(key));
    assert_eq!(fx.scene.flush_removals(), 1);

    // Stale key after flush
    assert!(!fx.scene.mark_for_removal(key));
    assert!(!fx.scene.mark_for_removal(ModelKey::default()));
    assert_eq!(fx.scene.flush_removals(), 0);
}

#[test]
fn test_flush_without_requests_is_noop() {
    let mut fx = SceneFixture::new();
    fx.add(fx.p1, fx.m1);
    assert_eq!(fx.scene.flush_removals(), 0);
    assert_eq!(fx.scene.model_count(), 1);
}

#[test]
fn test_removed_model_releases_its_buffers() {
    let mut fx = SceneFixture::new();
    let key = fx.add(fx.p1, fx.m1);
    let buffer = fx.scene.model(key).unwrap().frame(0).uniform_buffer().clone();
    // scene + fixture registry + local clone
    assert_eq!(std::sync::Arc::strong_count(&buffer), 3);

    fx.scene.mark_for_removal(key);
    fx.scene.flush_removals();

    assert_eq!(std::sync::Arc::strong_count(&buffer), 2);
}

// ============================================================================
// Traversal
// ============================================================================

#[test]
fn test_walk_visits_each_bucket_once_in_nesting_order() {
    let mut fx = SceneFixture::new();
    let a = fx.add(fx.p1, fx.m1);
    let b = fx.add(fx.p1, fx.m2);
    let c = fx.add(fx.p1, fx.m1);

    let events = trace(&fx.scene);

    assert_eq!(events, vec![
        format!("pipeline {:?}", fx.p1),
        format!("mesh {:?}", fx.m1),
        format!("model {:?}", a),
        format!("model {:?}", c),
        format!("mesh {:?}", fx.m2),
        format!("model {:?}", b),
    ]);
}

#[test]
fn test_walk_is_deterministic() {
    let mut fx = SceneFixture::new();
    fx.add(fx.p2, fx.m2);
    fx.add(fx.p1, fx.m1);
    fx.add(fx.p2, fx.m1);

    assert_eq!(trace(&fx.scene), trace(&fx.scene));
}

#[test]
fn test_walk_stops_at_first_error() {
    struct FailOnModel(usize);
    impl SceneVisitor for FailOnModel {
        fn model(&mut self, _model: &Model) -> Result<()> {
            self.0 += 1;
            Err(crate::error::Error::InvalidState("stop".to_string()))
        }
    }

    let mut fx = SceneFixture::new();
    fx.add(fx.p1, fx.m1);
    fx.add(fx.p1, fx.m1);

    let mut visitor = FailOnModel(0);
    assert!(fx.scene.walk(&mut visitor).is_err());
    assert_eq!(visitor.0, 1);
}
