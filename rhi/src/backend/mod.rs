//! GPU backend abstraction layer.
//!
//! The renderer front end validates calls, tracks object lifetimes and
//! resource states, then hands fully resolved work to a backend through
//! the traits in this module.
//!
//! # Available Backends
//!
//! - `dummy` (default): headless CPU simulation of a GPU timeline
//!
//! # Architecture
//!
//! Each backend implements [`GpuBackend`], which provides:
//! - Queue creation ([`GpuQueue`] executes [`SubmitBatch`]es in order)
//! - Resource storage creation (buffers, textures)
//! - Swap chain creation ([`GpuSwapChain`])
//! - Capability and format queries

pub mod dummy;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{RhiError, RhiResult};
use crate::sync::{Fence, QueueTimeline, Semaphore};
use crate::types::{
    BufferDesc, FormatCapabilities, ImageFormat, QueueDesc, RendererApi, ShaderTarget,
    SubresourceDataDesc, SwapChainDesc, TextureDesc, WindowHandle,
};

/// Backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendType {
    /// Best available backend.
    #[default]
    Auto,
    /// Headless dummy backend.
    Dummy,
}

impl BackendType {
    /// Parse a backend name as used in config files and on the command line.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "dummy" | "headless" => Some(Self::Dummy),
            _ => None,
        }
    }
}

/// Device limits and features reported by a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendCapabilities {
    /// Highest supported shader model.
    pub max_shader_target: ShaderTarget,
    /// Number of linked GPUs.
    pub gpu_count: u32,
    /// Split (begin/end) barriers are supported.
    pub split_barriers: bool,
    /// Required alignment of uniform buffer offsets.
    pub uniform_buffer_alignment: u32,
    /// Required alignment of texture data in upload buffers.
    pub upload_buffer_texture_alignment: u32,
    /// Required alignment of texture rows in upload buffers.
    pub upload_buffer_texture_row_alignment: u32,
    /// Maximum vertex buffer bindings.
    pub max_vertex_input_bindings: u32,
    /// Multi-draw indirect is supported.
    pub multi_draw_indirect: bool,
    /// Timestamp queries are supported.
    pub timestamp_queries: bool,
    /// Occlusion queries are supported.
    pub occlusion_queries: bool,
    /// Pipeline statistics queries are supported.
    pub pipeline_statistics_queries: bool,
    /// HDR swap chains are supported.
    pub hdr_output: bool,
}

/// Work counters of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackendStats {
    /// Executed submissions.
    pub submissions: u64,
    /// Executed presents.
    pub presents: u64,
    /// Draw calls, counting each indirect command.
    pub draws: u64,
    /// Compute dispatches.
    pub dispatches: u64,
    /// Buffer and texture copies.
    pub copies: u64,
    /// Resource transitions.
    pub barriers: u64,
}

/// CPU-visible memory backing a resource.
#[derive(Debug, Default)]
pub struct HostMemory {
    bytes: Mutex<Vec<u8>>,
}

impl HostMemory {
    /// Zero-initialised memory of `size` bytes.
    pub fn zeroed(size: u64) -> Self {
        Self {
            bytes: Mutex::new(vec![0; size as usize]),
        }
    }

    /// Size in bytes.
    pub fn len(&self) -> u64 {
        self.bytes.lock().len() as u64
    }

    /// Returns true if the memory is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy `size` bytes starting at `offset`.
    pub fn read(&self, offset: u64, size: u64) -> RhiResult<Vec<u8>> {
        let bytes = self.bytes.lock();
        let range = checked_range(bytes.len(), offset, size)?;
        Ok(bytes[range].to_vec())
    }

    /// Overwrite the bytes starting at `offset`.
    pub fn write(&self, offset: u64, data: &[u8]) -> RhiResult<()> {
        let mut bytes = self.bytes.lock();
        let range = checked_range(bytes.len(), offset, data.len() as u64)?;
        bytes[range].copy_from_slice(data);
        Ok(())
    }

    /// Copy a range of `src` into this memory.
    pub fn copy_from(&self, dst_offset: u64, src: &HostMemory, src_offset: u64, size: u64) -> RhiResult<()> {
        let data = src.read(src_offset, size)?;
        self.write(dst_offset, &data)
    }
}

fn checked_range(len: usize, offset: u64, size: u64) -> RhiResult<std::ops::Range<usize>> {
    let end = offset
        .checked_add(size)
        .filter(|end| *end <= len as u64)
        .ok_or_else(|| {
            RhiError::InvalidParameter(format!(
                "range {offset}..{} exceeds resource size {len}",
                offset.saturating_add(size)
            ))
        })?;
    Ok(offset as usize..end as usize)
}

/// Backend storage of a buffer.
#[derive(Debug)]
pub enum GpuBuffer {
    /// Dummy backend (host memory)
    Dummy(HostMemory),
}

impl GpuBuffer {
    /// Size in bytes.
    pub fn size(&self) -> u64 {
        match self {
            Self::Dummy(memory) => memory.len(),
        }
    }

    /// Host memory behind the buffer, if the backend exposes it.
    pub fn host_memory(&self) -> Option<&HostMemory> {
        match self {
            Self::Dummy(memory) => Some(memory),
        }
    }
}

/// Placement of one subresource in tightly packed texture memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubresourceLayout {
    /// Byte offset of the subresource.
    pub offset: u64,
    /// Bytes per row of blocks.
    pub row_pitch: u64,
    /// Bytes per depth slice.
    pub slice_pitch: u64,
    /// Rows of blocks.
    pub rows: u32,
    /// Depth slices.
    pub depth: u32,
}

impl SubresourceLayout {
    /// Total size in bytes.
    pub fn size(&self) -> u64 {
        self.slice_pitch * self.depth as u64
    }
}

/// Tightly packed memory layout of a texture: layer-major, then mips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureLayout {
    /// Format.
    pub format: ImageFormat,
    /// Width of mip 0.
    pub width: u32,
    /// Height of mip 0.
    pub height: u32,
    /// Depth of mip 0.
    pub depth: u32,
    /// Array layers.
    pub array_size: u32,
    /// Mip levels.
    pub mip_levels: u32,
}

impl TextureLayout {
    /// Layout of a texture created from `desc`.
    pub fn from_desc(desc: &TextureDesc) -> Self {
        Self {
            format: desc.format,
            width: desc.width.max(1),
            height: desc.height.max(1),
            depth: desc.depth.max(1),
            array_size: desc.array_size.max(1),
            mip_levels: desc.mip_levels.max(1),
        }
    }

    /// Extent of `mip`.
    pub fn mip_extent(&self, mip: u32) -> (u32, u32, u32) {
        (
            (self.width >> mip).max(1),
            (self.height >> mip).max(1),
            (self.depth >> mip).max(1),
        )
    }

    fn mip_layout(&self, mip: u32, offset: u64) -> SubresourceLayout {
        let (width, height, depth) = self.mip_extent(mip);
        let (_, block_height) = self.format.block_extent();
        let rows = height.div_ceil(block_height);
        let row_pitch = self.format.surface_size(width, block_height, 1);
        SubresourceLayout {
            offset,
            row_pitch,
            slice_pitch: row_pitch * rows as u64,
            rows,
            depth,
        }
    }

    fn layer_size(&self) -> u64 {
        (0..self.mip_levels)
            .map(|mip| self.mip_layout(mip, 0).size())
            .sum()
    }

    /// Total size in bytes.
    pub fn total_size(&self) -> u64 {
        self.layer_size() * self.array_size as u64
    }

    /// Layout of one subresource.
    pub fn subresource(&self, mip: u32, layer: u32) -> RhiResult<SubresourceLayout> {
        if mip >= self.mip_levels || layer >= self.array_size {
            return Err(RhiError::InvalidParameter(format!(
                "subresource mip {mip} layer {layer} out of range ({} mips, {} layers)",
                self.mip_levels, self.array_size
            )));
        }
        let mut offset = self.layer_size() * layer as u64;
        for previous in 0..mip {
            offset += self.mip_layout(previous, 0).size();
        }
        Ok(self.mip_layout(mip, offset))
    }
}

/// Backend storage of a texture.
#[derive(Debug)]
pub enum GpuTexture {
    /// Dummy backend (host memory)
    Dummy {
        /// Texel memory.
        memory: HostMemory,
        /// Placement of the subresources in `memory`.
        layout: TextureLayout,
    },
}

impl GpuTexture {
    /// Memory layout of the texture.
    pub fn layout(&self) -> TextureLayout {
        match self {
            Self::Dummy { layout, .. } => *layout,
        }
    }

    /// Host memory behind the texture, if the backend exposes it.
    pub fn host_memory(&self) -> Option<&HostMemory> {
        match self {
            Self::Dummy { memory, .. } => Some(memory),
        }
    }
}

/// Work item of a submission, with every handle resolved to storage.
#[derive(Debug)]
pub enum GpuCommand {
    /// Resource state transitions.
    Barrier {
        /// Number of transitions after deduplication.
        count: usize,
    },
    /// Buffer to buffer copy.
    CopyBuffer {
        /// Source storage.
        src: Arc<GpuBuffer>,
        /// Source offset.
        src_offset: u64,
        /// Destination storage.
        dst: Arc<GpuBuffer>,
        /// Destination offset.
        dst_offset: u64,
        /// Bytes to copy.
        size: u64,
    },
    /// Buffer to texture subresource copy.
    CopyBufferToTexture {
        /// Source storage.
        src: Arc<GpuBuffer>,
        /// Destination storage.
        dst: Arc<GpuTexture>,
        /// Source placement and destination subresource.
        region: SubresourceDataDesc,
    },
    /// Draw call.
    Draw {
        /// Vertices or indices per instance.
        count: u32,
        /// Instances.
        instances: u32,
    },
    /// Compute dispatch.
    Dispatch {
        /// Group counts.
        groups: [u32; 3],
    },
    /// Indirect draws or dispatches.
    ExecuteIndirect {
        /// Upper bound of commands executed.
        max_count: u32,
    },
    /// Write query results into a buffer.
    ResolveQuery {
        /// Destination storage.
        dst: Arc<GpuBuffer>,
        /// Destination offset.
        offset: u64,
        /// Number of queries.
        count: u32,
        /// Bytes per query.
        result_size: u64,
    },
}

/// One queue submission ready for execution.
#[derive(Debug)]
pub struct SubmitBatch {
    /// Position on the queue timeline.
    pub id: u64,
    /// Commands of every command buffer, in order.
    pub commands: Vec<GpuCommand>,
    /// Semaphores and the signal count each must reach first.
    pub waits: Vec<(Semaphore, u64)>,
    /// Semaphores signaled on completion.
    pub signals: Vec<Semaphore>,
    /// Fence signaled on completion.
    pub fence: Option<Fence>,
    /// Timeline of the queue.
    pub timeline: Arc<QueueTimeline>,
}

impl SubmitBatch {
    /// Block until every wait semaphore is signaled.
    pub fn wait_semaphores(&self) {
        for (semaphore, target) in &self.waits {
            semaphore.wait_for(*target);
        }
    }

    /// Signal everything attached to the batch.
    ///
    /// The timeline completes first so that a thread woken by the fence
    /// sees every resource of the batch as idle.
    pub fn complete(self) {
        self.timeline.complete(self.id);
        for semaphore in &self.signals {
            semaphore.signal();
        }
        if let Some(fence) = &self.fence {
            fence.signal();
        }
    }
}

/// One present operation ready for execution.
pub struct PresentBatch {
    /// Position on the queue timeline.
    pub id: u64,
    /// Swap chain to present.
    pub swap_chain: Arc<dyn GpuSwapChain>,
    /// Image to present.
    pub index: u32,
    /// Semaphores and the signal count each must reach first.
    pub waits: Vec<(Semaphore, u64)>,
    /// Timeline of the queue.
    pub timeline: Arc<QueueTimeline>,
}

impl std::fmt::Debug for PresentBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresentBatch")
            .field("id", &self.id)
            .field("index", &self.index)
            .field("waits", &self.waits.len())
            .finish_non_exhaustive()
    }
}

/// GPU backend trait for abstracting different GPU APIs.
pub trait GpuBackend: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Native API the backend drives.
    fn api(&self) -> RendererApi;

    /// Device limits and features.
    fn capabilities(&self) -> &BackendCapabilities;

    /// What the device can do with `format`.
    fn format_capabilities(&self, format: ImageFormat) -> FormatCapabilities;

    /// Create a queue executing on `timeline`.
    fn create_queue(
        &self,
        desc: &QueueDesc,
        timeline: Arc<QueueTimeline>,
    ) -> RhiResult<Arc<dyn GpuQueue>>;

    /// Create buffer storage.
    fn create_buffer(&self, desc: &BufferDesc) -> RhiResult<GpuBuffer>;

    /// Create texture storage.
    fn create_texture(&self, desc: &TextureDesc) -> RhiResult<GpuTexture>;

    /// Create a swap chain. The window handle is only used during this call.
    fn create_swap_chain(
        &self,
        desc: &SwapChainDesc,
        window: Option<&WindowHandle>,
    ) -> RhiResult<Arc<dyn GpuSwapChain>>;

    /// Timestamp ticks per second.
    fn timestamp_frequency(&self) -> f64;

    /// Work executed so far. Backends without counters report zeros.
    fn stats(&self) -> BackendStats {
        BackendStats::default()
    }
}

/// An ordered execution channel.
pub trait GpuQueue: Send + Sync {
    /// Enqueue a submission. Never blocks on GPU work.
    fn submit(&self, batch: SubmitBatch) -> RhiResult<()>;

    /// Enqueue a present. Never blocks on GPU work.
    fn present(&self, batch: PresentBatch) -> RhiResult<()>;

    /// Block until everything enqueued so far has executed.
    fn wait_idle(&self);
}

/// Ring of presentable images.
pub trait GpuSwapChain: Send + Sync {
    /// Number of images.
    fn image_count(&self) -> u32;

    /// Block until an image is free and return its index.
    fn acquire_next_image(&self) -> RhiResult<u32>;

    /// Hand an image to the display (GPU timeline side).
    fn present(&self, index: u32);

    /// Current vsync mode.
    fn vsync(&self) -> bool;

    /// Change the vsync mode.
    fn set_vsync(&self, enabled: bool);
}

/// Create a backend of the requested type.
///
/// [`BackendType::Auto`] walks the compiled-in backends and falls back to
/// the dummy backend.
pub fn create_backend(
    backend: BackendType,
    dummy_config: &dummy::DummyConfig,
) -> RhiResult<Arc<dyn GpuBackend>> {
    match backend {
        BackendType::Auto | BackendType::Dummy => {
            #[cfg(feature = "dummy")]
            {
                log::info!("Using dummy backend");
                Ok(Arc::new(dummy::DummyBackend::new(dummy_config.clone())))
            }
            #[cfg(not(feature = "dummy"))]
            {
                let _ = dummy_config;
                Err(RhiError::InitializationFailed(format!(
                    "no backend available for {backend:?}"
                )))
            }
        }
    }
}

/// Check if a real GPU backend is available.
pub fn has_gpu_backend() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_memory_bounds() {
        let memory = HostMemory::zeroed(8);
        memory.write(4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(memory.read(4, 4).unwrap(), vec![1, 2, 3, 4]);
        assert!(memory.write(6, &[0; 4]).is_err());
        assert!(memory.read(u64::MAX, 2).is_err());
    }

    #[test]
    fn test_texture_layout_offsets() {
        let desc = TextureDesc::new_2d(4, 4, ImageFormat::R8G8B8A8Unorm).with_mip_levels(3);
        let layout = TextureLayout::from_desc(&desc);
        // 64 + 16 + 4 bytes per layer
        assert_eq!(layout.total_size(), 84);
        let mip1 = layout.subresource(1, 0).unwrap();
        assert_eq!(mip1.offset, 64);
        assert_eq!(mip1.row_pitch, 8);
        assert_eq!(layout.subresource(2, 0).unwrap().offset, 80);
        assert!(layout.subresource(3, 0).is_err());
    }

    #[test]
    fn test_backend_names() {
        assert_eq!(BackendType::from_name("Dummy"), Some(BackendType::Dummy));
        assert_eq!(BackendType::from_name("auto"), Some(BackendType::Auto));
        assert_eq!(BackendType::from_name("metal"), None);
    }
}
