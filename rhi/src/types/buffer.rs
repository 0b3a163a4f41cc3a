//! Buffer types and descriptors.

use bitflags::bitflags;

use super::{DescriptorType, ImageFormat, ResourceState};

/// Memory heap a resource is allocated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum ResourceMemoryUsage {
    /// Unknown usage.
    #[default]
    Unknown = 0,
    /// Device-local memory, not CPU visible.
    GpuOnly = 1,
    /// Host memory, used for staging.
    CpuOnly = 2,
    /// Host-visible memory written by the CPU and read by the GPU.
    CpuToGpu = 3,
    /// Host-visible memory written by the GPU and read back by the CPU.
    GpuToCpu = 4,
}

impl ResourceMemoryUsage {
    /// Returns true if the memory can be mapped by the CPU.
    pub fn is_cpu_visible(self) -> bool {
        matches!(self, Self::CpuOnly | Self::CpuToGpu | Self::GpuToCpu)
    }
}

bitflags! {
    /// Buffer creation flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferCreationFlags: u32 {
        /// Default allocation.
        const NONE = 0x01;
        /// Buffer allocates its own memory.
        const OWN_MEMORY = 0x02;
        /// Buffer stays mapped for its whole lifetime.
        const PERSISTENT_MAP = 0x04;
        /// Allocate from ESRAM.
        const ESRAM = 0x08;
        /// Do not create descriptor views.
        const NO_DESCRIPTOR_VIEW_CREATION = 0x10;
    }
}

/// Index element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum IndexType {
    /// 32-bit indices.
    #[default]
    Uint32 = 0,
    /// 16-bit indices.
    Uint16,
}

impl IndexType {
    /// Size of one index in bytes.
    pub fn size(self) -> u64 {
        match self {
            Self::Uint32 => 4,
            Self::Uint16 => 2,
        }
    }
}

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BufferDesc {
    /// Size in bytes.
    pub size: u64,
    /// Required alignment in bytes (0 for default).
    pub alignment: u32,
    /// Memory heap.
    pub memory_usage: ResourceMemoryUsage,
    /// Creation flags.
    pub flags: BufferCreationFlags,
    /// State the buffer starts in.
    pub start_state: ResourceState,
    /// First element for structured views.
    pub first_element: u64,
    /// Element count for structured views.
    pub element_count: u64,
    /// Element stride for structured views.
    pub struct_stride: u64,
    /// Format for typed views.
    pub format: ImageFormat,
    /// How the buffer will be bound.
    pub descriptors: DescriptorType,
    /// Debug name.
    pub name: Option<String>,
    /// GPU index in linked mode.
    pub node_index: u32,
}

impl BufferDesc {
    /// Buffer of `size` bytes bound as `descriptors`, in device-local memory.
    pub fn new(size: u64, descriptors: DescriptorType) -> Self {
        Self {
            size,
            descriptors,
            memory_usage: ResourceMemoryUsage::GpuOnly,
            ..Default::default()
        }
    }

    /// Set the memory heap.
    pub fn with_memory_usage(mut self, memory_usage: ResourceMemoryUsage) -> Self {
        self.memory_usage = memory_usage;
        self
    }

    /// Set the start state.
    pub fn with_start_state(mut self, start_state: ResourceState) -> Self {
        self.start_state = start_state;
        self
    }

    /// Set the debug name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// State a freshly uploaded buffer should end up in.
    ///
    /// An explicit start state wins. Otherwise the state is derived from
    /// the descriptor types the buffer will be bound as.
    pub fn resident_state(&self) -> ResourceState {
        if !self.start_state.is_empty() {
            return self.start_state;
        }
        let mut state = ResourceState::empty();
        if self
            .descriptors
            .intersects(DescriptorType::VERTEX_BUFFER | DescriptorType::UNIFORM_BUFFER)
        {
            state |= ResourceState::VERTEX_AND_CONSTANT_BUFFER;
        }
        if self.descriptors.contains(DescriptorType::INDEX_BUFFER) {
            state |= ResourceState::INDEX_BUFFER;
        }
        if self.descriptors.contains(DescriptorType::INDIRECT_BUFFER) {
            state |= ResourceState::INDIRECT_ARGUMENT;
        }
        if self.descriptors.contains(DescriptorType::BUFFER) {
            state |= ResourceState::SHADER_RESOURCE;
        }
        if self.descriptors.contains(DescriptorType::RW_BUFFER) {
            state = ResourceState::UNORDERED_ACCESS;
        }
        if state.is_empty() {
            ResourceState::COMMON
        } else {
            state
        }
    }
}

/// Byte range of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ReadRange {
    /// Offset in bytes.
    pub offset: u64,
    /// Size in bytes.
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resident_state_from_descriptors() {
        let vb = BufferDesc::new(64, DescriptorType::VERTEX_BUFFER);
        assert_eq!(vb.resident_state(), ResourceState::VERTEX_AND_CONSTANT_BUFFER);

        let ib = BufferDesc::new(64, DescriptorType::INDEX_BUFFER);
        assert_eq!(ib.resident_state(), ResourceState::INDEX_BUFFER);

        let explicit = BufferDesc::new(64, DescriptorType::VERTEX_BUFFER)
            .with_start_state(ResourceState::COPY_SOURCE);
        assert_eq!(explicit.resident_state(), ResourceState::COPY_SOURCE);
    }

    #[test]
    fn test_index_size() {
        assert_eq!(IndexType::Uint16.size(), 2);
        assert_eq!(IndexType::Uint32.size(), 4);
    }
}
