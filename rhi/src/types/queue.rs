//! Renderer, queue and command buffer descriptors.

use bitflags::bitflags;

use crate::handle::{CmdHandle, CmdPoolHandle, FenceHandle, QueueHandle, SemaphoreHandle, SwapChainHandle};

/// Native graphics API behind a renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RendererApi {
    /// Direct3D 12.
    D3D12 = 0,
    /// Vulkan.
    Vulkan,
    /// Metal.
    Metal,
    /// Direct3D 12 on Xbox.
    XboxD3D12,
    /// Direct3D 11.
    D3D11,
    /// PlayStation.
    Orbis,
    /// Headless CPU simulation used for testing.
    Headless,
}

/// Minimum shader model required by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u32)]
pub enum ShaderTarget {
    /// Shader model 5.1.
    #[default]
    Sm5_1 = 0,
    /// Shader model 6.0.
    Sm6_0,
    /// Shader model 6.1.
    Sm6_1,
    /// Shader model 6.2.
    Sm6_2,
    /// Shader model 6.3, required for ray tracing.
    Sm6_3,
}

/// GPU selection mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum GpuMode {
    /// A single adapter.
    #[default]
    Single = 0,
    /// Multiple linked adapters.
    Linked,
}

/// Kind of work a queue accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum QueueType {
    /// Graphics, compute and transfer.
    #[default]
    Graphics = 0,
    /// Transfer only.
    Transfer,
    /// Compute and transfer.
    Compute,
}

bitflags! {
    /// Queue creation flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct QueueFlag: u32 {
        /// No flags.
        const NONE = 0x0;
        /// Disable the driver's GPU timeout detection.
        const DISABLE_GPU_TIMEOUT = 0x1;
        /// Register the queue with the profiler.
        const INIT_MICROPROFILE = 0x2;
    }
}

/// Scheduling priority of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum QueuePriority {
    /// Normal priority.
    #[default]
    Normal = 0,
    /// High priority.
    High,
    /// Global realtime priority.
    GlobalRealtime,
}

/// Status of a fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum FenceStatus {
    /// The submission the fence was attached to has finished.
    Complete = 0,
    /// The fence was submitted and the GPU has not finished yet.
    Incomplete,
    /// The fence was never submitted.
    NotSubmitted,
}

/// Descriptor for creating a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct QueueDesc {
    /// Kind of work the queue accepts.
    pub queue_type: QueueType,
    /// Creation flags.
    pub flags: QueueFlag,
    /// Scheduling priority.
    pub priority: QueuePriority,
    /// GPU index in linked mode.
    pub node_index: u32,
}

impl QueueDesc {
    /// Descriptor for a queue of the given type.
    pub fn new(queue_type: QueueType) -> Self {
        Self {
            queue_type,
            ..Default::default()
        }
    }

    /// Set the queue priority.
    pub fn with_priority(mut self, priority: QueuePriority) -> Self {
        self.priority = priority;
        self
    }
}

/// Descriptor for creating a command pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CmdPoolDesc {
    /// Queue the pool's command buffers are submitted to.
    pub queue: QueueHandle,
    /// Command buffers are short-lived.
    pub transient: bool,
}

impl CmdPoolDesc {
    /// Pool for `queue`.
    pub fn new(queue: QueueHandle) -> Self {
        Self {
            queue,
            transient: false,
        }
    }
}

/// Descriptor for allocating command buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CmdDesc {
    /// Pool to allocate from.
    pub pool: CmdPoolHandle,
    /// Allocate secondary command buffers.
    pub secondary: bool,
}

impl CmdDesc {
    /// Primary command buffer from `pool`.
    pub fn new(pool: CmdPoolHandle) -> Self {
        Self {
            pool,
            secondary: false,
        }
    }
}

/// A batch of command buffers submitted to a queue.
#[derive(Debug, Clone, Default)]
pub struct QueueSubmitDesc {
    /// Executable command buffers, executed in order.
    pub cmds: Vec<CmdHandle>,
    /// Fence signaled when the whole batch has finished.
    pub signal_fence: Option<FenceHandle>,
    /// Semaphores the batch waits on before executing.
    pub wait_semaphores: Vec<SemaphoreHandle>,
    /// Semaphores signaled when the batch has finished.
    pub signal_semaphores: Vec<SemaphoreHandle>,
}

/// Presentation of one swap chain image.
#[derive(Debug, Clone)]
pub struct QueuePresentDesc {
    /// Swap chain to present.
    pub swap_chain: SwapChainHandle,
    /// Semaphores to wait on before presenting.
    pub wait_semaphores: Vec<SemaphoreHandle>,
    /// Image index returned by `acquire_next_image`.
    pub index: u32,
}
