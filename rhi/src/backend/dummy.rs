//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't drive any GPU but simulates one faithfully enough
//! to exercise the synchronization contract: every queue owns a worker
//! thread that plays the GPU timeline, executes batches strictly in
//! submission order, honours semaphore waits and performs copies against
//! host memory so uploads can be read back.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::{RhiError, RhiResult};
use crate::sync::QueueTimeline;
use crate::types::{
    BufferDesc, FormatCapabilities, ImageFormat, QueueDesc, RendererApi, ShaderTarget,
    SubresourceDataDesc, SwapChainDesc, TextureDesc, WindowHandle,
};

use super::{
    BackendCapabilities, BackendStats, GpuBackend, GpuBuffer, GpuCommand, GpuQueue, GpuSwapChain,
    GpuTexture, HostMemory, PresentBatch, SubmitBatch, TextureLayout,
};

/// Behaviour knobs of the dummy backend.
#[derive(Debug, Clone, PartialEq)]
pub struct DummyConfig {
    /// Simulated GPU time of every submission.
    pub submit_delay: Duration,
    /// Simulated display time of every present.
    pub present_delay: Duration,
    /// Report split barrier support.
    pub split_barriers: bool,
    /// Number of simulated linked GPUs.
    pub gpu_count: u32,
    /// Highest shader model reported.
    pub max_shader_target: ShaderTarget,
    /// Hand an image back to the swap chain as soon as its present is
    /// enqueued instead of after it has executed. Acquire then no longer
    /// throttles the CPU, as with a mailbox swap chain.
    pub early_image_release: bool,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            submit_delay: Duration::ZERO,
            present_delay: Duration::ZERO,
            split_barriers: false,
            gpu_count: 1,
            max_shader_target: ShaderTarget::Sm6_3,
            early_image_release: false,
        }
    }
}

impl DummyConfig {
    /// Set the per-submission delay.
    pub fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = delay;
        self
    }

    /// Set the per-present delay.
    pub fn with_present_delay(mut self, delay: Duration) -> Self {
        self.present_delay = delay;
        self
    }

    /// Toggle split barrier support.
    pub fn with_split_barriers(mut self, split_barriers: bool) -> Self {
        self.split_barriers = split_barriers;
        self
    }

    /// Toggle early release of presented images.
    pub fn with_early_image_release(mut self, early_image_release: bool) -> Self {
        self.early_image_release = early_image_release;
        self
    }

    /// Set the number of linked GPUs.
    pub fn with_gpu_count(mut self, gpu_count: u32) -> Self {
        self.gpu_count = gpu_count.max(1);
        self
    }
}

#[derive(Debug, Default)]
struct DummyStats {
    submissions: AtomicU64,
    presents: AtomicU64,
    draws: AtomicU64,
    dispatches: AtomicU64,
    copies: AtomicU64,
    barriers: AtomicU64,
}

impl DummyStats {
    fn snapshot(&self) -> BackendStats {
        BackendStats {
            submissions: self.submissions.load(Ordering::Relaxed),
            presents: self.presents.load(Ordering::Relaxed),
            draws: self.draws.load(Ordering::Relaxed),
            dispatches: self.dispatches.load(Ordering::Relaxed),
            copies: self.copies.load(Ordering::Relaxed),
            barriers: self.barriers.load(Ordering::Relaxed),
        }
    }
}

/// Dummy GPU backend.
#[derive(Debug)]
pub struct DummyBackend {
    config: DummyConfig,
    capabilities: BackendCapabilities,
    stats: Arc<DummyStats>,
    queue_count: AtomicU64,
}

impl DummyBackend {
    /// Create a new dummy backend.
    pub fn new(config: DummyConfig) -> Self {
        let capabilities = BackendCapabilities {
            max_shader_target: config.max_shader_target,
            gpu_count: config.gpu_count,
            split_barriers: config.split_barriers,
            uniform_buffer_alignment: 256,
            upload_buffer_texture_alignment: 16,
            upload_buffer_texture_row_alignment: 1,
            max_vertex_input_bindings: crate::types::MAX_VERTEX_BINDINGS as u32,
            multi_draw_indirect: true,
            timestamp_queries: true,
            occlusion_queries: true,
            pipeline_statistics_queries: true,
            hdr_output: false,
        };
        Self {
            config,
            capabilities,
            stats: Arc::new(DummyStats::default()),
            queue_count: AtomicU64::new(0),
        }
    }
}

impl GpuBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn api(&self) -> RendererApi {
        RendererApi::Headless
    }

    fn capabilities(&self) -> &BackendCapabilities {
        &self.capabilities
    }

    fn format_capabilities(&self, format: ImageFormat) -> FormatCapabilities {
        if format == ImageFormat::Undefined {
            FormatCapabilities::empty()
        } else if format.is_depth() {
            FormatCapabilities::SHADER_READ | FormatCapabilities::DEPTH_STENCIL
        } else if format.is_compressed() {
            FormatCapabilities::SHADER_READ
        } else {
            let mut caps = FormatCapabilities::SHADER_READ
                | FormatCapabilities::COLOR_WRITE
                | FormatCapabilities::VERTEX;
            // Storage images of sRGB and BGRA formats are not portable
            if !format.is_srgb() && format != ImageFormat::B8G8R8A8Unorm {
                caps |= FormatCapabilities::SHADER_WRITE;
            }
            caps
        }
    }

    fn create_queue(
        &self,
        desc: &QueueDesc,
        timeline: Arc<QueueTimeline>,
    ) -> RhiResult<Arc<dyn GpuQueue>> {
        let index = self.queue_count.fetch_add(1, Ordering::Relaxed);
        log::trace!("DummyBackend: creating {:?} queue {}", desc.queue_type, index);
        let queue = DummyQueue::spawn(
            format!("rhi-dummy-queue-{index}"),
            timeline,
            self.config.clone(),
            Arc::clone(&self.stats),
        )?;
        Ok(Arc::new(queue))
    }

    fn create_buffer(&self, desc: &BufferDesc) -> RhiResult<GpuBuffer> {
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            desc.name,
            desc.size
        );
        Ok(GpuBuffer::Dummy(HostMemory::zeroed(desc.size)))
    }

    fn create_texture(&self, desc: &TextureDesc) -> RhiResult<GpuTexture> {
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{}x{})",
            desc.name,
            desc.width,
            desc.height,
            desc.depth
        );
        let layout = TextureLayout::from_desc(desc);
        Ok(GpuTexture::Dummy {
            memory: HostMemory::zeroed(layout.total_size()),
            layout,
        })
    }

    fn create_swap_chain(
        &self,
        desc: &SwapChainDesc,
        window: Option<&WindowHandle>,
    ) -> RhiResult<Arc<dyn GpuSwapChain>> {
        log::debug!(
            "DummyBackend: creating swap chain {}x{} with {} images (window: {})",
            desc.width,
            desc.height,
            desc.image_count,
            window.is_some()
        );
        Ok(Arc::new(DummySwapChain::new(desc.image_count, desc.enable_vsync)))
    }

    fn timestamp_frequency(&self) -> f64 {
        1_000_000_000.0
    }

    fn stats(&self) -> BackendStats {
        self.stats.snapshot()
    }
}

enum Job {
    Submit(SubmitBatch),
    Present { batch: PresentBatch, released: bool },
}

struct DummyQueue {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    timeline: Arc<QueueTimeline>,
    early_image_release: bool,
}

impl DummyQueue {
    fn spawn(
        name: String,
        timeline: Arc<QueueTimeline>,
        config: DummyConfig,
        stats: Arc<DummyStats>,
    ) -> RhiResult<Self> {
        let early_image_release = config.early_image_release;
        let (sender, receiver) = mpsc::channel::<Job>();
        let worker = std::thread::Builder::new()
            .name(name)
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    match job {
                        Job::Submit(batch) => execute_submit(batch, &config, &stats),
                        Job::Present { batch, released } => {
                            execute_present(batch, released, &config, &stats)
                        }
                    }
                }
            })
            .map_err(|e| RhiError::InitializationFailed(format!("queue worker: {e}")))?;
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            timeline,
            early_image_release,
        })
    }

    fn send(&self, job: Job) -> RhiResult<()> {
        let sender = self.sender.lock();
        sender
            .as_ref()
            .ok_or(RhiError::DeviceLost)?
            .send(job)
            .map_err(|_| RhiError::DeviceLost)
    }
}

impl GpuQueue for DummyQueue {
    fn submit(&self, batch: SubmitBatch) -> RhiResult<()> {
        self.send(Job::Submit(batch))
    }

    fn present(&self, batch: PresentBatch) -> RhiResult<()> {
        if self.early_image_release {
            batch.swap_chain.present(batch.index);
        }
        self.send(Job::Present {
            batch,
            released: self.early_image_release,
        })
    }

    fn wait_idle(&self) {
        self.timeline.wait_idle();
    }
}

impl Drop for DummyQueue {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain and exit
        drop(self.sender.lock().take());
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                log::error!("DummyBackend: queue worker panicked");
            }
        }
    }
}

fn execute_submit(batch: SubmitBatch, config: &DummyConfig, stats: &DummyStats) {
    batch.wait_semaphores();
    log::trace!(
        "DummyBackend: executing submission {} ({} commands)",
        batch.id,
        batch.commands.len()
    );
    for command in &batch.commands {
        if let Err(e) = execute_command(command, stats) {
            log::error!("DummyBackend: command failed: {e}");
        }
    }
    if !config.submit_delay.is_zero() {
        std::thread::sleep(config.submit_delay);
    }
    stats.submissions.fetch_add(1, Ordering::Relaxed);
    batch.complete();
}

fn execute_present(batch: PresentBatch, released: bool, config: &DummyConfig, stats: &DummyStats) {
    for (semaphore, target) in &batch.waits {
        semaphore.wait_for(*target);
    }
    if !config.present_delay.is_zero() {
        std::thread::sleep(config.present_delay);
    }
    if !released {
        batch.swap_chain.present(batch.index);
    }
    stats.presents.fetch_add(1, Ordering::Relaxed);
    batch.timeline.complete(batch.id);
}

fn execute_command(command: &GpuCommand, stats: &DummyStats) -> RhiResult<()> {
    match command {
        GpuCommand::Barrier { count } => {
            stats.barriers.fetch_add(*count as u64, Ordering::Relaxed);
        }
        GpuCommand::CopyBuffer {
            src,
            src_offset,
            dst,
            dst_offset,
            size,
        } => {
            let (Some(src), Some(dst)) = (src.host_memory(), dst.host_memory()) else {
                return Err(RhiError::FeatureNotSupported("copy of device memory".into()));
            };
            dst.copy_from(*dst_offset, src, *src_offset, *size)?;
            stats.copies.fetch_add(1, Ordering::Relaxed);
        }
        GpuCommand::CopyBufferToTexture { src, dst, region } => {
            copy_buffer_to_texture(src, dst, region)?;
            stats.copies.fetch_add(1, Ordering::Relaxed);
        }
        GpuCommand::Draw { count, instances } => {
            log::trace!("DummyBackend: draw {count} x {instances}");
            stats.draws.fetch_add(1, Ordering::Relaxed);
        }
        GpuCommand::Dispatch { groups } => {
            log::trace!("DummyBackend: dispatch {groups:?}");
            stats.dispatches.fetch_add(1, Ordering::Relaxed);
        }
        GpuCommand::ExecuteIndirect { max_count } => {
            stats.draws.fetch_add(*max_count as u64, Ordering::Relaxed);
        }
        GpuCommand::ResolveQuery {
            dst,
            offset,
            count,
            result_size,
        } => {
            if let Some(memory) = dst.host_memory() {
                memory.write(*offset, &vec![0; (*count as u64 * result_size) as usize])?;
            }
        }
    }
    Ok(())
}

fn copy_buffer_to_texture(
    src: &GpuBuffer,
    dst: &GpuTexture,
    region: &SubresourceDataDesc,
) -> RhiResult<()> {
    let (Some(src_memory), Some(dst_memory)) = (src.host_memory(), dst.host_memory()) else {
        return Err(RhiError::FeatureNotSupported("copy of device memory".into()));
    };
    let layout = dst.layout();
    let sub = layout.subresource(region.mip_level, region.array_layer)?;
    let (block_width, block_height) = layout.format.block_extent();
    let block_size = layout.format.bytes_per_block() as u64;
    let row_bytes = layout.format.surface_size(region.region.width, block_height, 1);
    let rows = region.region.height.div_ceil(block_height);
    let x = (region.region.x_offset / block_width) as u64 * block_size;
    let first_row = region.region.y_offset / block_height;

    for z in 0..region.region.depth.max(1) {
        for row in 0..rows {
            let src_offset = region.buffer_offset
                + z as u64 * region.slice_pitch as u64
                + row as u64 * region.row_pitch as u64;
            let dst_offset = sub.offset
                + (region.region.z_offset + z) as u64 * sub.slice_pitch
                + (first_row + row) as u64 * sub.row_pitch
                + x;
            dst_memory.copy_from(dst_offset, src_memory, src_offset, row_bytes)?;
        }
    }
    Ok(())
}

#[derive(Debug)]
struct SwapChainState {
    available: VecDeque<u32>,
    vsync: bool,
}

/// Swap chain whose images are recycled in present order.
#[derive(Debug)]
struct DummySwapChain {
    image_count: u32,
    state: Mutex<SwapChainState>,
    cond: Condvar,
}

impl DummySwapChain {
    fn new(image_count: u32, vsync: bool) -> Self {
        Self {
            image_count,
            state: Mutex::new(SwapChainState {
                available: (0..image_count).collect(),
                vsync,
            }),
            cond: Condvar::new(),
        }
    }
}

impl GpuSwapChain for DummySwapChain {
    fn image_count(&self) -> u32 {
        self.image_count
    }

    fn acquire_next_image(&self) -> RhiResult<u32> {
        let mut state = self.state.lock();
        loop {
            if let Some(index) = state.available.pop_front() {
                return Ok(index);
            }
            self.cond.wait(&mut state);
        }
    }

    fn present(&self, index: u32) {
        let mut state = self.state.lock();
        state.available.push_back(index);
        self.cond.notify_all();
    }

    fn vsync(&self) -> bool {
        self.state.lock().vsync
    }

    fn set_vsync(&self, enabled: bool) {
        self.state.lock().vsync = enabled;
    }
}
