/// Unit tests for Renderer
///
/// The renderer slot is a process global: every test here is #[serial].

use super::*;
use crate::graphics_device::mock_graphics_device::{MockGraphicsDevice, SwapchainScript};
use crate::graphics_device::{Pipeline, PresentResult, ShaderStage};
use crate::resource::{ImageData, MeshData, MeshKey, Vertex};
use glam::Vec3;
use serial_test::serial;

// ============================================================================
// TEST HELPERS
// ============================================================================

const SPIRV: [u8; 16] = [0; 16];

struct TestSurface {
    extent: (u32, u32),
    resized: bool,
}

impl WindowSurface for TestSurface {
    fn extent(&self) -> (u32, u32) {
        self.extent
    }

    fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.resized)
    }
}

struct Harness {
    device: Arc<MockGraphicsDevice>,
    script: SwapchainScript,
    surface: TestSurface,
    renderer: Renderer,
    pipeline: PipelineKey,
    mesh: MeshKey,
    albedo: TextureKey,
}

fn stages() -> [ShaderDesc<'static>; 2] {
    [
        ShaderDesc { name: "BaseVert", code: &SPIRV, stage: ShaderStage::Vertex, entry_point: "main" },
        ShaderDesc { name: "BaseFrag", code: &SPIRV, stage: ShaderStage::Fragment, entry_point: "main" },
    ]
}

fn triangle() -> MeshData {
    MeshData { vertices: vec![Vertex::default(); 3], indices: vec![0, 1, 2] }
}

fn image() -> ImageData {
    ImageData { width: 2, height: 2, pixels: vec![255; 16], has_alpha: false }
}

fn harness() -> Harness {
    let device = Arc::new(MockGraphicsDevice::new());
    let swapchain = device.create_swapchain(800, 600);
    let script = swapchain.script();
    let mut renderer = Renderer::new(device.clone(), Box::new(swapchain), RendererConfig::default()).unwrap();

    let pipeline = renderer.create_pipeline("base", &stages(), PolygonMode::Fill).unwrap();
    let resources = renderer.resources_mut();
    let mesh = resources.add_mesh(device.as_ref(), "triangle", MeshFormat::Raw, &triangle()).unwrap();
    let albedo = resources.add_texture(device.as_ref(), "albedo", &image(), true).unwrap();
    let normal = resources.add_texture(device.as_ref(), "flat_normal", &image(), false).unwrap();
    renderer.set_default_normal_texture(normal).unwrap();

    Harness {
        device,
        script,
        surface: TestSurface { extent: (800, 600), resized: false },
        renderer,
        pipeline,
        mesh,
        albedo,
    }
}

impl Harness {
    fn add_model(&mut self) -> ModelKey {
        self.renderer.add_model(ModelDesc {
            mesh: self.mesh,
            albedo: self.albedo,
            normal: None,
            pipeline: None,
            transform: Transform::default(),
        })
        .unwrap()
    }

    fn present(&mut self) -> FrameOutcome {
        self.renderer.present(&mut self.surface).unwrap()
    }

    fn uniform_bytes(&self, key: ModelKey, slot: usize) -> Vec<u8> {
        let model = self.renderer.scene().model(key).unwrap();
        self.device.buffer_contents(model.frame(slot).uniform_buffer()).unwrap()
    }
}

/// Index of the first call equal to `pattern`, or named `pattern` with arguments
fn position(calls: &[String], pattern: &str) -> usize {
    let with_args = format!("{}(", pattern);
    calls.iter()
        .position(|c| c == pattern || c.starts_with(&with_args))
        .unwrap_or_else(|| panic!("'{}' not in {:?}", pattern, calls))
}

fn count(calls: &[String], prefix: &str) -> usize {
    calls.iter().filter(|c| c.starts_with(prefix)).count()
}

// ============================================================================
// Construction
// ============================================================================

#[test]
#[serial]
fn test_new_creates_one_command_list_per_slot() {
    let h = harness();
    assert_eq!(count(&h.device.calls(), "create_command_list"), MAX_FRAMES_IN_FLIGHT);
    assert_eq!(h.renderer.frame_slot(), 0);
    assert_eq!(h.renderer.clear_color(), RendererConfig::default().clear_color);
}

#[test]
#[serial]
fn test_second_live_renderer_fails() {
    let h = harness();

    let other = Arc::new(MockGraphicsDevice::new());
    let swapchain = other.create_swapchain(640, 480);
    let result = Renderer::new(other, Box::new(swapchain), RendererConfig::default());

    assert!(matches!(result, Err(Error::InitializationFailed(_))));
    drop(h);
}

#[test]
#[serial]
fn test_slot_released_when_renderer_dropped() {
    let h = harness();
    drop(h);

    let device = Arc::new(MockGraphicsDevice::new());
    let swapchain = device.create_swapchain(640, 480);
    assert!(Renderer::new(device.clone(), Box::new(swapchain), RendererConfig::default()).is_ok());
    // Drop waits for the device before releasing GPU objects
    assert_eq!(device.calls().last().map(String::as_str), Some("wait_idle"));
}

// ============================================================================
// Frame cycle
// ============================================================================

#[test]
#[serial]
fn test_frame_call_order() {
    let mut h = harness();
    h.add_model();
    h.device.clear_calls();

    assert_eq!(h.present(), FrameOutcome::Presented { image_index: 0 });

    let calls = h.device.calls();
    let order = [
        "wait_for_frame(0)",
        "acquire(slot=0)",
        "begin",
        "begin_render_pass(image=0, clears=2)",
        "set_viewport(800x600)",
        "set_scissor(800x600)",
        "bind_pipeline",
        "draw_indexed(3)",
        "end_render_pass",
        "end",
        "submit_frame(0)",
        "present(image=0, slot=0)",
        "wait_present_idle",
    ];
    let positions: Vec<usize> = order.iter().map(|p| position(&calls, p)).collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "{:?}", calls);
    assert_eq!(count(&calls, "wait_idle"), 0);
}

#[test]
#[serial]
fn test_frame_slot_round_robin() {
    let mut h = harness();
    h.device.clear_calls();

    for expected_next in [1, 0, 1, 0, 1] {
        h.present();
        assert_eq!(h.renderer.frame_slot(), expected_next);
    }

    let submits: Vec<String> = h.device.calls().into_iter()
        .filter(|c| c.starts_with("submit_frame"))
        .collect();
    assert_eq!(submits, ["submit_frame(0)", "submit_frame(1)", "submit_frame(0)", "submit_frame(1)", "submit_frame(0)"]);
    assert_eq!(h.renderer.stats().frames_presented, 5);
}

#[test]
#[serial]
fn test_uniforms_written_for_current_slot_only() {
    let mut h = harness();
    let key = h.add_model();

    h.present();
    let slot0 = h.uniform_bytes(key, 0);
    assert!(slot0.iter().any(|&b| b != 0));
    assert!(h.uniform_bytes(key, 1).iter().all(|&b| b == 0));

    h.renderer.camera_mut().set_position(Vec3::new(3.0, 3.0, 3.0));
    h.present();
    assert_eq!(h.uniform_bytes(key, 0), slot0);
    assert_ne!(h.uniform_bytes(key, 1), slot0);
}

#[test]
#[serial]
fn test_stats_count_draw_calls() {
    let mut h = harness();
    h.add_model();
    h.add_model();

    h.present();

    let stats = h.renderer.stats();
    assert_eq!(stats.last_draw_calls, 2);
    assert_eq!(stats.frames_skipped, 0);
    assert_eq!(h.device.stats().frames_submitted, 1);
}

#[test]
#[serial]
fn test_overlay_draws_after_scene_inside_render_pass() {
    struct Hud;
    impl Overlay for Hud {
        fn render_into(&mut self, cmd: &mut dyn CommandList) -> Result<()> {
            cmd.draw(6, 0)
        }
    }

    let mut h = harness();
    h.add_model();
    h.renderer.set_overlay(Box::new(Hud));
    h.device.clear_calls();

    h.present();

    let calls = h.device.calls();
    assert!(position(&calls, "draw_indexed") < position(&calls, "draw(6)"));
    assert!(position(&calls, "draw(6)") < position(&calls, "end_render_pass"));
    assert!(h.renderer.clear_overlay().is_some());
}

#[test]
#[serial]
fn test_record_failure_propagates() {
    struct Broken;
    impl Overlay for Broken {
        fn render_into(&mut self, _cmd: &mut dyn CommandList) -> Result<()> {
            Err(Error::BackendError("overlay lost its font atlas".to_string()))
        }
    }

    let mut h = harness();
    h.renderer.set_overlay(Box::new(Broken));
    h.device.clear_calls();

    let result = h.renderer.present(&mut h.surface);

    assert!(matches!(result, Err(Error::BackendError(_))));
    assert_eq!(count(&h.device.calls(), "submit_frame"), 0);
}

// ============================================================================
// Deferred removal
// ============================================================================

#[test]
#[serial]
fn test_removal_applies_at_next_frame() {
    let mut h = harness();
    let key = h.add_model();

    assert!(h.renderer.mark_model_for_removal(key));
    assert!(!h.renderer.mark_model_for_removal(key));
    assert!(h.renderer.scene().contains(key));

    h.device.clear_calls();
    h.present();

    assert!(!h.renderer.scene().contains(key));
    assert_eq!(count(&h.device.calls(), "draw_indexed"), 0);
    assert_eq!(h.renderer.stats().last_draw_calls, 0);
}

// ============================================================================
// Swapchain recreation
// ============================================================================

#[test]
#[serial]
fn test_out_of_date_acquire_skips_frame() {
    let mut h = harness();
    h.script.push_acquire(AcquireResult::OutOfDate);
    h.device.clear_calls();

    assert_eq!(h.present(), FrameOutcome::Skipped);

    let calls = h.device.calls();
    assert_eq!(h.renderer.frame_slot(), 0);
    assert_eq!(count(&calls, "submit_frame"), 0);
    assert_eq!(count(&calls, "present("), 0);
    assert_eq!(count(&calls, "begin"), 0);
    assert_eq!(h.renderer.stats().frames_skipped, 1);
}

#[test]
#[serial]
fn test_out_of_date_acquire_recreates_before_next_frame() {
    let mut h = harness();
    h.script.push_acquire(AcquireResult::OutOfDate);
    h.present();
    h.device.clear_calls();

    assert_eq!(h.present(), FrameOutcome::Presented { image_index: 0 });

    let calls = h.device.calls();
    assert!(position(&calls, "wait_idle") < position(&calls, "recreate_swapchain(800x600)"));
    assert!(position(&calls, "recreate_swapchain") < position(&calls, "create_pipeline"));
    assert!(position(&calls, "create_pipeline") < position(&calls, "wait_for_frame(0)"));
    assert_eq!(h.renderer.stats().swapchain_recreations, 1);
}

#[test]
#[serial]
fn test_suboptimal_present_recreates_after_present() {
    let mut h = harness();
    h.script.push_present(PresentResult::Suboptimal);
    h.device.clear_calls();

    assert_eq!(h.present(), FrameOutcome::Presented { image_index: 0 });

    let calls = h.device.calls();
    assert!(position(&calls, "present") < position(&calls, "wait_idle"));
    assert!(position(&calls, "recreate_swapchain") < position(&calls, "wait_present_idle"));
    assert_eq!(h.renderer.frame_slot(), 1);
    assert_eq!(h.renderer.stats().swapchain_recreations, 1);
}

#[test]
#[serial]
fn test_out_of_date_present_recreates_after_present() {
    let mut h = harness();
    h.script.push_present(PresentResult::OutOfDate);
    h.device.clear_calls();

    assert_eq!(h.present(), FrameOutcome::Presented { image_index: 0 });

    let calls = h.device.calls();
    assert!(position(&calls, "present") < position(&calls, "recreate_swapchain(800x600)"));
    assert_eq!(h.renderer.frame_slot(), 1);
    assert_eq!(h.renderer.stats().swapchain_recreations, 1);
    assert_eq!(h.renderer.stats().frames_presented, 1);
}

#[test]
#[serial]
fn test_suboptimal_acquire_still_presents_then_recreates() {
    let mut h = harness();
    h.add_model();
    h.script.push_acquire(AcquireResult::Image { index: 0, suboptimal: true });
    h.device.clear_calls();

    assert_eq!(h.present(), FrameOutcome::Presented { image_index: 0 });

    let calls = h.device.calls();
    assert_eq!(count(&calls, "draw_indexed"), 1);
    assert!(position(&calls, "submit_frame") < position(&calls, "recreate_swapchain"));
    assert!(position(&calls, "present") < position(&calls, "recreate_swapchain"));
    assert_eq!(h.renderer.frame_slot(), 1);
    assert_eq!(h.renderer.stats().swapchain_recreations, 1);

    h.device.clear_calls();
    h.present();
    assert_eq!(count(&h.device.calls(), "recreate_swapchain"), 0);
}

#[test]
#[serial]
fn test_resize_during_out_of_date_acquire_recreates_once() {
    let mut h = harness();
    h.script.push_acquire(AcquireResult::OutOfDate);
    h.surface.extent = (1024, 768);
    h.surface.resized = true;
    h.device.clear_calls();

    assert_eq!(h.present(), FrameOutcome::Skipped);
    assert!(!h.surface.resized);
    assert_eq!(h.present(), FrameOutcome::Presented { image_index: 0 });

    let calls = h.device.calls();
    assert_eq!(count(&calls, "recreate_swapchain"), 1);
    assert_eq!(count(&calls, "recreate_swapchain(1024x768)"), 1);
    assert!(position(&calls, "recreate_swapchain") < position(&calls, "wait_for_frame"));
    assert_eq!(h.renderer.stats().swapchain_recreations, 1);
}

#[test]
#[serial]
fn test_resize_flag_rebuilds_pipelines_at_new_extent() {
    let mut h = harness();
    h.add_model();
    h.surface.extent = (1024, 768);
    h.surface.resized = true;
    h.device.clear_calls();

    h.present();

    let calls = h.device.calls();
    assert!(!h.surface.resized);
    assert_eq!(count(&calls, "recreate_swapchain(1024x768)"), 1);
    assert_eq!(count(&calls, "create_pipeline"), 1);
    assert!(calls.iter().any(|c| c.starts_with("create_pipeline") && c.ends_with("1024x768)")));
    assert_eq!((h.renderer.swapchain().width(), h.renderer.swapchain().height()), (1024, 768));

    let pipeline = h.renderer.resources().pipeline(h.pipeline).unwrap();
    assert_eq!(pipeline.graphics_device_pipeline().unwrap().extent(), (1024, 768));

    // Next frame draws at the new size
    h.device.clear_calls();
    h.present();
    assert_eq!(count(&h.device.calls(), "set_viewport(1024x768)"), 1);
}

#[test]
#[serial]
fn test_zero_size_surface_defers_recreation() {
    let mut h = harness();
    h.script.push_acquire(AcquireResult::OutOfDate);
    h.surface.extent = (0, 0);
    h.present();
    h.device.clear_calls();

    assert_eq!(h.present(), FrameOutcome::Skipped);
    assert_eq!(h.present(), FrameOutcome::Skipped);

    let calls = h.device.calls();
    assert_eq!(count(&calls, "recreate_swapchain"), 0);
    assert_eq!(count(&calls, "wait_for_frame"), 0);
    assert_eq!(h.renderer.stats().frames_skipped, 3);

    h.surface.extent = (640, 480);
    assert_eq!(h.present(), FrameOutcome::Presented { image_index: 0 });
    assert_eq!(count(&h.device.calls(), "recreate_swapchain(640x480)"), 1);
}

#[test]
#[serial]
fn test_pipeline_failure_during_recreation_is_fatal() {
    let mut h = harness();
    h.surface.resized = true;
    h.device.fail_pipelines.store(true, std::sync::atomic::Ordering::Relaxed);

    let result = h.renderer.present(&mut h.surface);

    assert!(matches!(result, Err(Error::BackendError(_))));
}

// ============================================================================
// Setup API
// ============================================================================

#[test]
#[serial]
fn test_first_pipeline_becomes_default() {
    let mut h = harness();
    let wireframe = h.renderer.create_pipeline("wireframe", &stages(), PolygonMode::Line).unwrap();
    let key = h.add_model();
    assert_eq!(h.renderer.scene().model(key).unwrap().pipeline(), h.pipeline);

    h.renderer.set_default_pipeline(wireframe).unwrap();
    let key = h.add_model();
    assert_eq!(h.renderer.scene().model(key).unwrap().pipeline(), wireframe);
    assert_eq!(h.renderer.scene().pipeline_bucket_count(), 2);
}

#[test]
#[serial]
fn test_create_pipeline_rejects_duplicate_stage() {
    let mut h = harness();
    let [vertex, _] = stages();

    let result = h.renderer.create_pipeline("broken", &[vertex.clone(), vertex], PolygonMode::Fill);

    assert!(matches!(result, Err(Error::InvalidResource(_))));
    assert_eq!(h.renderer.resources().pipeline_count(), 1);
}

#[test]
#[serial]
fn test_create_pipeline_requires_fragment_stage() {
    let mut h = harness();
    let [vertex, _] = stages();

    let result = h.renderer.create_pipeline("vertex_only", &[vertex], PolygonMode::Fill);

    assert!(matches!(result, Err(Error::InvalidState(_))));
    assert!(h.renderer.resources().pipeline_key("vertex_only").is_none());
}

#[test]
#[serial]
fn test_device_pipeline_failure_is_propagated() {
    let mut h = harness();
    h.device.fail_pipelines.store(true, std::sync::atomic::Ordering::Relaxed);

    let result = h.renderer.create_pipeline("unlucky", &stages(), PolygonMode::Point);

    assert!(matches!(result, Err(Error::BackendError(_))));
}

#[test]
#[serial]
fn test_add_model_requires_default_normal_texture() {
    let device = Arc::new(MockGraphicsDevice::new());
    let swapchain = device.create_swapchain(800, 600);
    let mut renderer = Renderer::new(device.clone(), Box::new(swapchain), RendererConfig::default()).unwrap();
    renderer.create_pipeline("base", &stages(), PolygonMode::Fill).unwrap();
    let mesh = renderer.resources_mut().add_mesh(device.as_ref(), "m", MeshFormat::Raw, &triangle()).unwrap();
    let albedo = renderer.resources_mut().add_texture(device.as_ref(), "a", &image(), false).unwrap();

    let result = renderer.add_model(ModelDesc {
        mesh,
        albedo,
        normal: None,
        pipeline: None,
        transform: Transform::default(),
    });

    assert!(matches!(result, Err(Error::InvalidState(_))));
    assert_eq!(renderer.scene().model_count(), 0);
}

#[test]
#[serial]
fn test_set_defaults_reject_unknown_keys() {
    let mut h = harness();
    assert!(h.renderer.set_default_pipeline(PipelineKey::default()).is_err());
    assert!(h.renderer.set_default_normal_texture(TextureKey::default()).is_err());
}

#[test]
#[serial]
fn test_load_model_reuses_loaded_assets() {
    struct Meshes;
    impl MeshLoader for Meshes {
        fn load_mesh(&self, _name: &str, format: MeshFormat) -> Result<MeshData> {
            assert_eq!(format, MeshFormat::Obj);
            Ok(triangle())
        }
    }
    struct Textures;
    impl TextureLoader for Textures {
        fn load_texture(&self, _name: &str) -> Result<ImageData> {
            Ok(image())
        }
    }

    let mut h = harness();
    h.renderer.set_asset_loaders(Box::new(Meshes), Box::new(Textures));

    let a = h.renderer.load_model("crate", "crate.png", Transform::default()).unwrap();
    let b = h.renderer.load_model("crate", "crate.png", Transform::from_position(Vec3::X)).unwrap();

    let resources = h.renderer.resources();
    assert_eq!(resources.mesh_count(), 2);
    assert_eq!(resources.texture_count(), 3);
    let model_a = h.renderer.scene().model(a).unwrap();
    let model_b = h.renderer.scene().model(b).unwrap();
    assert_eq!(model_a.mesh(), model_b.mesh());
    assert_eq!(model_a.albedo(), resources.texture_key("crate.png").unwrap());
    assert_eq!(h.renderer.scene().mesh_bucket_count(h.pipeline), 1);
}

#[test]
#[serial]
fn test_load_model_without_loaders_fails() {
    let mut h = harness();
    let result = h.renderer.load_model("crate", "crate.png", Transform::default());
    assert!(matches!(result, Err(Error::InvalidResource(_))));
}
