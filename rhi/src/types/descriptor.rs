//! Descriptor set descriptors and update payloads.

use crate::handle::{
    AccelerationStructureHandle, BufferHandle, DescriptorSetHandle, PipelineHandle,
    RootSignatureHandle, SamplerHandle, TextureHandle,
};

/// How often a descriptor set is rewritten. Also the set index in shaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[repr(u32)]
pub enum DescriptorUpdateFrequency {
    /// Written once.
    #[default]
    None = 0,
    /// Rewritten every frame.
    PerFrame,
    /// Rewritten per batch of draws.
    PerBatch,
    /// Rewritten per draw.
    PerDraw,
}

impl DescriptorUpdateFrequency {
    /// Number of frequencies.
    pub const COUNT: usize = 4;

    /// Every frequency, in set index order.
    pub const ALL: [Self; Self::COUNT] = [Self::None, Self::PerFrame, Self::PerBatch, Self::PerDraw];

    /// Frequency for a shader set index.
    pub fn from_set(set: u32) -> Option<Self> {
        Self::ALL.get(set as usize).copied()
    }
}

/// Descriptor for allocating descriptor sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorSetDesc {
    /// Root signature the sets are laid out for.
    pub root_signature: RootSignatureHandle,
    /// Update frequency (set index) of the tables.
    pub update_frequency: DescriptorUpdateFrequency,
    /// Number of tables in the pool.
    pub max_sets: u32,
    /// GPU index in linked mode.
    pub node_index: u32,
}

impl DescriptorSetDesc {
    /// `max_sets` tables at `update_frequency`.
    pub fn new(
        root_signature: RootSignatureHandle,
        update_frequency: DescriptorUpdateFrequency,
        max_sets: u32,
    ) -> Self {
        Self {
            root_signature,
            update_frequency,
            max_sets,
            node_index: 0,
        }
    }
}

/// Resources written to one named binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DescriptorResources {
    /// Textures.
    Textures(Vec<TextureHandle>),
    /// Samplers.
    Samplers(Vec<SamplerHandle>),
    /// Buffers with optional per-buffer offsets and sizes.
    Buffers {
        /// Buffers.
        buffers: Vec<BufferHandle>,
        /// Byte offset per buffer.
        offsets: Option<Vec<u64>>,
        /// Byte size per buffer.
        sizes: Option<Vec<u64>>,
    },
    /// Pipelines (indirect command buffers).
    Pipelines(Vec<PipelineHandle>),
    /// Nested descriptor sets.
    DescriptorSets(Vec<DescriptorSetHandle>),
    /// Ray tracing acceleration structures.
    AccelerationStructures(Vec<AccelerationStructureHandle>),
}

impl DescriptorResources {
    /// Number of resources.
    pub fn len(&self) -> usize {
        match self {
            Self::Textures(v) => v.len(),
            Self::Samplers(v) => v.len(),
            Self::Buffers { buffers, .. } => buffers.len(),
            Self::Pipelines(v) => v.len(),
            Self::DescriptorSets(v) => v.len(),
            Self::AccelerationStructures(v) => v.len(),
        }
    }

    /// Returns true if there are no resources.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Name of the resource kind, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Textures(_) => "textures",
            Self::Samplers(_) => "samplers",
            Self::Buffers { .. } => "buffers",
            Self::Pipelines(_) => "pipelines",
            Self::DescriptorSets(_) => "descriptor sets",
            Self::AccelerationStructures(_) => "acceleration structures",
        }
    }
}

/// One entry of a descriptor set update.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DescriptorData {
    /// Name of the shader resource.
    pub name: String,
    /// Resources to write.
    pub resources: DescriptorResources,
    /// Mip slice for RW texture views.
    pub uav_mip_slice: u32,
    /// Bind the stencil aspect of a depth/stencil texture.
    pub bind_stencil_resource: bool,
    /// First array element written.
    pub array_offset: u32,
}

impl DescriptorData {
    /// Write `resources` to the binding called `name`.
    pub fn new(name: impl Into<String>, resources: DescriptorResources) -> Self {
        Self {
            name: name.into(),
            resources,
            uav_mip_slice: 0,
            bind_stencil_resource: false,
            array_offset: 0,
        }
    }

    /// Write one texture.
    pub fn texture(name: impl Into<String>, texture: TextureHandle) -> Self {
        Self::new(name, DescriptorResources::Textures(vec![texture]))
    }

    /// Write one sampler.
    pub fn sampler(name: impl Into<String>, sampler: SamplerHandle) -> Self {
        Self::new(name, DescriptorResources::Samplers(vec![sampler]))
    }

    /// Write one buffer.
    pub fn buffer(name: impl Into<String>, buffer: BufferHandle) -> Self {
        Self::new(
            name,
            DescriptorResources::Buffers {
                buffers: vec![buffer],
                offsets: None,
                sizes: None,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::Handle;

    #[test]
    fn test_frequency_from_set() {
        assert_eq!(DescriptorUpdateFrequency::from_set(0), Some(DescriptorUpdateFrequency::None));
        assert_eq!(DescriptorUpdateFrequency::from_set(3), Some(DescriptorUpdateFrequency::PerDraw));
        assert_eq!(DescriptorUpdateFrequency::from_set(4), None);
    }

    #[test]
    fn test_resources_len() {
        let data = DescriptorData::texture("texture0", TextureHandle::from_raw(0, 0));
        assert_eq!(data.resources.len(), 1);
        assert_eq!(data.resources.kind_name(), "textures");
    }
}
