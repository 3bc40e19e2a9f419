/// Mock graphics device for unit tests (no GPU required)
///
/// Every device, swapchain and command list call is appended to a shared
/// call log so tests can assert on frame sequencing. Acquire and present
/// outcomes can be scripted through `SwapchainScript`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::graphics_device::{
    GraphicsDevice, GraphicsDeviceStats, Buffer, Texture, Shader, Pipeline, BindingLayout,
    BindingGroup, CommandList, Swapchain, BufferDesc, BufferUsage, TextureDesc, TextureInfo,
    TextureFormat, ShaderDesc, ShaderStage, PipelineDesc, PolygonMode, BindingLayoutEntry,
    BindingResource, SampleCount, AcquireResult, PresentResult, Viewport, Rect2D, ClearValue,
    IndexType,
};
use crate::error::{Error, Result};
use crate::{engine_bail, engine_bail_warn};

/// Shared, ordered record of mock calls
pub type CallLog = Arc<Mutex<Vec<String>>>;

fn push(log: &CallLog, entry: String) {
    if let Ok(mut log) = log.lock() {
        log.push(entry);
    }
}

// ============================================================================
// Mock Buffer
// ============================================================================

#[derive(Debug)]
pub struct MockBuffer {
    pub id: u32,
    pub size: u64,
    pub usage: BufferUsage,
    pub data: Mutex<Vec<u8>>,
}

impl MockBuffer {
    pub fn new(id: u32, size: u64, usage: BufferUsage) -> Self {
        Self {
            id,
            size,
            usage,
            data: Mutex::new(vec![0; size as usize]),
        }
    }

    /// Copy of the current contents
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

impl Buffer for MockBuffer {
    fn update(&self, offset: u64, data: &[u8]) -> Result<()> {
        let end = offset + data.len() as u64;
        if end > self.size {
            engine_bail!("emy::mock", "Buffer {} update out of range ({} > {})", self.id, end, self.size);
        }
        let mut contents = self.data.lock()
            .map_err(|_| Error::BackendError("mock buffer lock poisoned".to_string()))?;
        contents[offset as usize..end as usize].copy_from_slice(data);
        Ok(())
    }

    fn size(&self) -> u64 {
        self.size
    }
}

// ============================================================================
// Mock Texture
// ============================================================================

#[derive(Debug)]
pub struct MockTexture {
    pub id: u32,
    pub info: TextureInfo,
}

impl MockTexture {
    pub fn new(id: u32, width: u32, height: u32, mip_levels: u32) -> Self {
        Self {
            id,
            info: TextureInfo {
                width,
                height,
                format: TextureFormat::R8G8B8A8_SRGB,
                mip_levels,
            },
        }
    }
}

impl Texture for MockTexture {
    fn info(&self) -> &TextureInfo {
        &self.info
    }
}

// ============================================================================
// Mock Shader
// ============================================================================

#[derive(Debug)]
pub struct MockShader {
    pub name: String,
    pub stage: ShaderStage,
}

impl MockShader {
    pub fn new(name: &str, stage: ShaderStage) -> Self {
        Self { name: name.to_string(), stage }
    }
}

impl Shader for MockShader {
    fn stage(&self) -> ShaderStage {
        self.stage
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Mock BindingLayout / BindingGroup
// ============================================================================

#[derive(Debug)]
pub struct MockBindingLayout {
    pub id: u32,
    pub entries: Vec<BindingLayoutEntry>,
}

impl BindingLayout for MockBindingLayout {
    fn entries(&self) -> &[BindingLayoutEntry] {
        &self.entries
    }
}

#[derive(Debug)]
pub struct MockBindingGroup {
    pub id: u32,
    pub binding_count: usize,
}

impl BindingGroup for MockBindingGroup {
    fn binding_count(&self) -> usize {
        self.binding_count
    }
}

// ============================================================================
// Mock Pipeline
// ============================================================================

#[derive(Debug)]
pub struct MockPipeline {
    pub id: u32,
    pub extent: (u32, u32),
    pub polygon_mode: PolygonMode,
    pub stages: Vec<String>,
}

impl Pipeline for MockPipeline {
    fn extent(&self) -> (u32, u32) {
        self.extent
    }
}

// ============================================================================
// Mock CommandList
// ============================================================================

/// Records commands locally and, when attached, into a device call log
#[derive(Debug)]
pub struct MockCommandList {
    pub commands: Vec<String>,
    pub recording: bool,
    log: Option<CallLog>,
}

impl MockCommandList {
    pub fn new() -> Self {
        Self { commands: Vec::new(), recording: false, log: None }
    }

    pub fn with_log(log: CallLog) -> Self {
        Self { commands: Vec::new(), recording: false, log: Some(log) }
    }

    fn record(&mut self, command: String) -> Result<()> {
        if !self.recording {
            return Err(Error::InvalidState(format!("'{}' outside begin/end", command)));
        }
        if let Some(log) = &self.log {
            push(log, command.clone());
        }
        self.commands.push(command);
        Ok(())
    }
}

impl CommandList for MockCommandList {
    fn begin(&mut self) -> Result<()> {
        self.commands.clear();
        self.recording = true;
        self.record("begin".to_string())
    }

    fn end(&mut self) -> Result<()> {
        self.record("end".to_string())?;
        self.recording = false;
        Ok(())
    }

    fn begin_render_pass(
        &mut self,
        _swapchain: &dyn Swapchain,
        image_index: u32,
        clear_values: &[ClearValue],
    ) -> Result<()> {
        self.record(format!("begin_render_pass(image={}, clears={})", image_index, clear_values.len()))
    }

    fn end_render_pass(&mut self) -> Result<()> {
        self.record("end_render_pass".to_string())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.record(format!("set_viewport({}x{})", viewport.width, viewport.height))
    }

    fn set_scissor(&mut self, scissor: Rect2D) -> Result<()> {
        self.record(format!("set_scissor({}x{})", scissor.width, scissor.height))
    }

    fn bind_pipeline(&mut self, pipeline: &Arc<dyn Pipeline>) -> Result<()> {
        // Only mock pipelines exist in unit tests
        let mock = unsafe { &*(Arc::as_ptr(pipeline) as *const MockPipeline) };
        self.record(format!("bind_pipeline({})", mock.id))
    }

    fn bind_binding_group(
        &mut self,
        _pipeline: &Arc<dyn Pipeline>,
        set_index: u32,
        binding_group: &Arc<dyn BindingGroup>,
    ) -> Result<()> {
        let mock = unsafe { &*(Arc::as_ptr(binding_group) as *const MockBindingGroup) };
        self.record(format!("bind_binding_group(set={}, group={})", set_index, mock.id))
    }

    fn bind_vertex_buffer(&mut self, buffer: &Arc<dyn Buffer>, _offset: u64) -> Result<()> {
        let mock = unsafe { &*(Arc::as_ptr(buffer) as *const MockBuffer) };
        self.record(format!("bind_vertex_buffer({})", mock.id))
    }

    fn bind_index_buffer(&mut self, buffer: &Arc<dyn Buffer>, _offset: u64, index_type: IndexType) -> Result<()> {
        let mock = unsafe { &*(Arc::as_ptr(buffer) as *const MockBuffer) };
        self.record(format!("bind_index_buffer({}, {:?})", mock.id, index_type))
    }

    fn draw(&mut self, vertex_count: u32, _first_vertex: u32) -> Result<()> {
        self.record(format!("draw({})", vertex_count))
    }

    fn draw_indexed(&mut self, index_count: u32, _first_index: u32, _vertex_offset: i32) -> Result<()> {
        self.record(format!("draw_indexed({})", index_count))
    }
}

// ============================================================================
// Mock Swapchain
// ============================================================================

/// Queued acquire/present outcomes, consumed front to back
///
/// When a queue is empty the swapchain behaves nominally.
#[derive(Debug, Clone, Default)]
pub struct SwapchainScript {
    acquire: Arc<Mutex<VecDeque<AcquireResult>>>,
    present: Arc<Mutex<VecDeque<PresentResult>>>,
}

impl SwapchainScript {
    pub fn push_acquire(&self, result: AcquireResult) {
        if let Ok(mut queue) = self.acquire.lock() {
            queue.push_back(result);
        }
    }

    pub fn push_present(&self, result: PresentResult) {
        if let Ok(mut queue) = self.present.lock() {
            queue.push_back(result);
        }
    }

    fn next_acquire(&self) -> Option<AcquireResult> {
        self.acquire.lock().ok().and_then(|mut q| q.pop_front())
    }

    fn next_present(&self) -> Option<PresentResult> {
        self.present.lock().ok().and_then(|mut q| q.pop_front())
    }
}

#[derive(Debug)]
pub struct MockSwapchain {
    pub width: u32,
    pub height: u32,
    pub image_count: u32,
    pub sample_count: SampleCount,
    next_image: u32,
    script: SwapchainScript,
    log: CallLog,
}

impl MockSwapchain {
    pub fn new(width: u32, height: u32, image_count: u32, log: CallLog) -> Self {
        Self {
            width,
            height,
            image_count,
            sample_count: SampleCount::S8,
            next_image: 0,
            script: SwapchainScript::default(),
            log,
        }
    }

    /// Handle for scripting outcomes after the swapchain is moved into a renderer
    pub fn script(&self) -> SwapchainScript {
        self.script.clone()
    }
}

impl Swapchain for MockSwapchain {
    fn acquire_next_image(&mut self, slot: usize) -> Result<AcquireResult> {
        push(&self.log, format!("acquire(slot={})", slot));
        if let Some(result) = self.script.next_acquire() {
            return Ok(result);
        }
        let index = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count;
        Ok(AcquireResult::Image { index, suboptimal: false })
    }

    fn present(&mut self, image_index: u32, slot: usize) -> Result<PresentResult> {
        push(&self.log, format!("present(image={}, slot={})", image_index, slot));
        Ok(self.script.next_present().unwrap_or(PresentResult::Optimal))
    }

    fn recreate(&mut self, width: u32, height: u32) -> Result<()> {
        push(&self.log, format!("recreate_swapchain({}x{})", width, height));
        self.width = width;
        self.height = height;
        self.next_image = 0;
        Ok(())
    }

    fn image_count(&self) -> usize {
        self.image_count as usize
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn format(&self) -> TextureFormat {
        TextureFormat::B8G8R8A8_SRGB
    }

    fn sample_count(&self) -> SampleCount {
        self.sample_count
    }
}

// ============================================================================
// Mock GraphicsDevice
// ============================================================================

/// Mock device that tracks created resources without GPU
#[derive(Debug)]
pub struct MockGraphicsDevice {
    /// Ordered device, swapchain and command list calls
    pub log: CallLog,
    /// Every buffer created, for content inspection
    pub buffers: Arc<Mutex<Vec<Arc<MockBuffer>>>>,
    /// Every pipeline created
    pub pipelines: Arc<Mutex<Vec<Arc<MockPipeline>>>>,
    /// Every binding group created
    pub binding_groups: Arc<Mutex<Vec<Arc<MockBindingGroup>>>>,
    /// Make `create_pipeline` fail while set
    pub fail_pipelines: Arc<AtomicBool>,
    pub msaa: SampleCount,
    next_id: AtomicU32,
    frames_submitted: AtomicU64,
}

impl MockGraphicsDevice {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            buffers: Arc::new(Mutex::new(Vec::new())),
            pipelines: Arc::new(Mutex::new(Vec::new())),
            binding_groups: Arc::new(Mutex::new(Vec::new())),
            fail_pipelines: Arc::new(AtomicBool::new(false)),
            msaa: SampleCount::S8,
            next_id: AtomicU32::new(1),
            frames_submitted: AtomicU64::new(0),
        }
    }

    /// Swapchain sharing this device's call log
    pub fn create_swapchain(&self, width: u32, height: u32) -> MockSwapchain {
        let mut swapchain = MockSwapchain::new(width, height, 3, self.log.clone());
        swapchain.sample_count = self.msaa;
        swapchain
    }

    /// Snapshot of the call log
    pub fn calls(&self) -> Vec<String> {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Clear the call log
    pub fn clear_calls(&self) {
        if let Ok(mut log) = self.log.lock() {
            log.clear();
        }
    }

    /// Current contents of a buffer created by this device
    pub fn buffer_contents(&self, buffer: &Arc<dyn Buffer>) -> Option<Vec<u8>> {
        let target = Arc::as_ptr(buffer) as *const u8;
        self.buffers.lock().ok()?.iter()
            .find(|b| Arc::as_ptr(b) as *const u8 == target)
            .map(|b| b.contents())
    }

    /// Id of a buffer created by this device
    pub fn buffer_id(&self, buffer: &Arc<dyn Buffer>) -> Option<u32> {
        find_id(&self.buffers, Arc::as_ptr(buffer) as *const u8, |b| b.id)
    }

    /// Id of a pipeline created by this device
    pub fn pipeline_id(&self, pipeline: &Arc<dyn Pipeline>) -> Option<u32> {
        find_id(&self.pipelines, Arc::as_ptr(pipeline) as *const u8, |p| p.id)
    }

    /// Id of a binding group created by this device
    pub fn binding_group_id(&self, group: &Arc<dyn BindingGroup>) -> Option<u32> {
        find_id(&self.binding_groups, Arc::as_ptr(group) as *const u8, |g| g.id)
    }

    fn next_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

fn find_id<T>(list: &Mutex<Vec<Arc<T>>>, target: *const u8, id: impl Fn(&T) -> u32) -> Option<u32> {
    list.lock().ok()?.iter()
        .find(|item| Arc::as_ptr(item) as *const u8 == target)
        .map(|item| id(item))
}

fn register<T>(list: &Mutex<Vec<Arc<T>>>, item: &Arc<T>) -> Result<()> {
    list.lock()
        .map_err(|_| Error::BackendError("mock registry poisoned".to_string()))?
        .push(item.clone());
    Ok(())
}

impl GraphicsDevice for MockGraphicsDevice {
    fn create_buffer(&self, desc: BufferDesc) -> Result<Arc<dyn Buffer>> {
        let buffer = Arc::new(MockBuffer::new(self.next_id(), desc.size, desc.usage));
        push(&self.log, format!("create_buffer({}, {:?}, {})", buffer.id, desc.usage, desc.size));
        register(&self.buffers, &buffer)?;
        Ok(buffer)
    }

    fn create_texture(&self, desc: TextureDesc) -> Result<Arc<dyn Texture>> {
        let expected = desc.width as usize * desc.height as usize * 4;
        if desc.data.len() != expected {
            engine_bail_warn!("emy::mock", "Texture data is {} bytes, expected {}", desc.data.len(), expected);
        }
        let texture = MockTexture::new(self.next_id(), desc.width, desc.height, desc.mip_levels());
        push(&self.log, format!("create_texture({}, {}x{}, mips={})",
            texture.id, desc.width, desc.height, texture.info.mip_levels));
        Ok(Arc::new(texture))
    }

    fn create_shader(&self, desc: ShaderDesc) -> Result<Arc<dyn Shader>> {
        if desc.code.is_empty() || desc.code.len() % 4 != 0 {
            engine_bail_warn!("emy::mock", "Shader '{}' code is not SPIR-V sized", desc.name);
        }
        push(&self.log, format!("create_shader({})", desc.name));
        Ok(Arc::new(MockShader::new(desc.name, desc.stage)))
    }

    fn create_binding_layout(&self, entries: &[BindingLayoutEntry]) -> Result<Arc<dyn BindingLayout>> {
        let layout = MockBindingLayout { id: self.next_id(), entries: entries.to_vec() };
        push(&self.log, format!("create_binding_layout({}, bindings={})", layout.id, entries.len()));
        Ok(Arc::new(layout))
    }

    fn create_pipeline(&self, desc: &PipelineDesc, swapchain: &dyn Swapchain) -> Result<Arc<dyn Pipeline>> {
        if self.fail_pipelines.load(Ordering::Relaxed) {
            engine_bail!("emy::mock", "vkCreateGraphicsPipelines failed (scripted)");
        }
        let pipeline = Arc::new(MockPipeline {
            id: self.next_id(),
            extent: (swapchain.width(), swapchain.height()),
            polygon_mode: desc.rasterization.polygon_mode,
            stages: desc.stages.iter().map(|s| s.name().to_string()).collect(),
        });
        push(&self.log, format!("create_pipeline({}, {}x{})", pipeline.id, pipeline.extent.0, pipeline.extent.1));
        register(&self.pipelines, &pipeline)?;
        Ok(pipeline)
    }

    fn create_binding_group(
        &self,
        layout: &Arc<dyn BindingLayout>,
        resources: &[BindingResource],
    ) -> Result<Arc<dyn BindingGroup>> {
        if resources.len() != layout.entries().len() {
            engine_bail_warn!("emy::mock",
                "Binding group has {} resources, layout expects {}",
                resources.len(), layout.entries().len());
        }
        let group = Arc::new(MockBindingGroup { id: self.next_id(), binding_count: resources.len() });
        push(&self.log, format!("create_binding_group({})", group.id));
        register(&self.binding_groups, &group)?;
        Ok(group)
    }

    fn create_command_list(&self) -> Result<Box<dyn CommandList>> {
        push(&self.log, "create_command_list".to_string());
        Ok(Box::new(MockCommandList::with_log(self.log.clone())))
    }

    fn wait_for_frame(&self, slot: usize) -> Result<()> {
        push(&self.log, format!("wait_for_frame({})", slot));
        Ok(())
    }

    fn submit_frame(&self, _commands: &dyn CommandList, _swapchain: &dyn Swapchain, slot: usize) -> Result<()> {
        push(&self.log, format!("submit_frame({})", slot));
        self.frames_submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn wait_present_idle(&self) -> Result<()> {
        push(&self.log, "wait_present_idle".to_string());
        Ok(())
    }

    fn wait_idle(&self) -> Result<()> {
        push(&self.log, "wait_idle".to_string());
        Ok(())
    }

    fn msaa_samples(&self) -> SampleCount {
        self.msaa
    }

    fn stats(&self) -> GraphicsDeviceStats {
        GraphicsDeviceStats {
            frames_submitted: self.frames_submitted.load(Ordering::Relaxed),
            gpu_memory_used: 0,
            descriptor_pools: 1,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "mock_graphics_device_tests.rs"]
mod tests;
