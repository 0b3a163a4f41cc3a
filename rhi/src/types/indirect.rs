//! Indirect argument layouts, command signatures and query pools.

use bytemuck::{Pod, Zeroable};
use static_assertions::assert_eq_size;

use crate::handle::{CmdPoolHandle, RootSignatureHandle};

/// Kind of argument in an indirect command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum IndirectArgumentType {
    /// Non-indexed draw.
    Draw = 0,
    /// Indexed draw.
    DrawIndex,
    /// Compute dispatch.
    Dispatch,
    /// Vertex buffer view.
    VertexBuffer,
    /// Index buffer view.
    IndexBuffer,
    /// Inline root constants.
    Constant,
    /// Descriptor table (Vulkan).
    DescriptorTable,
    /// Pipeline switch (Vulkan).
    Pipeline,
    /// Constant buffer view (D3D12).
    ConstantBufferView,
    /// Shader resource view (D3D12).
    ShaderResourceView,
    /// Unordered access view (D3D12).
    UnorderedAccessView,
    /// Metal indirect command buffer.
    CommandBuffer,
    /// Metal indirect command buffer optimization.
    CommandBufferOptimize,
}

impl IndirectArgumentType {
    /// Size in bytes of one argument of this type holding `count` values.
    pub fn stride(self, count: u32) -> u32 {
        match self {
            Self::Draw => std::mem::size_of::<IndirectDrawArguments>() as u32,
            Self::DrawIndex => std::mem::size_of::<IndirectDrawIndexArguments>() as u32,
            Self::Dispatch => std::mem::size_of::<IndirectDispatchArguments>() as u32,
            // GPU address, size and stride
            Self::VertexBuffer | Self::IndexBuffer => 16,
            Self::Constant => 4 * count.max(1),
            Self::DescriptorTable | Self::Pipeline => 4,
            Self::ConstantBufferView | Self::ShaderResourceView | Self::UnorderedAccessView => 8,
            Self::CommandBuffer | Self::CommandBufferOptimize => 0,
        }
    }

    /// Returns true for arguments that issue work.
    pub fn is_action(self) -> bool {
        matches!(self, Self::Draw | Self::DrawIndex | Self::Dispatch)
    }
}

/// Arguments of an indirect draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
#[repr(C)]
pub struct IndirectDrawArguments {
    /// Vertices per instance.
    pub vertex_count: u32,
    /// Instance count.
    pub instance_count: u32,
    /// First vertex.
    pub start_vertex: u32,
    /// First instance.
    pub start_instance: u32,
}

/// Arguments of an indirect indexed draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
#[repr(C)]
pub struct IndirectDrawIndexArguments {
    /// Indices per instance.
    pub index_count: u32,
    /// Instance count.
    pub instance_count: u32,
    /// First index.
    pub start_index: u32,
    /// Value added to each index.
    pub vertex_offset: u32,
    /// First instance.
    pub start_instance: u32,
}

/// Arguments of an indirect dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
#[repr(C)]
pub struct IndirectDispatchArguments {
    /// Groups in X.
    pub group_count_x: u32,
    /// Groups in Y.
    pub group_count_y: u32,
    /// Groups in Z.
    pub group_count_z: u32,
}

assert_eq_size!(IndirectDrawArguments, [u32; 4]);
assert_eq_size!(IndirectDrawIndexArguments, [u32; 5]);
assert_eq_size!(IndirectDispatchArguments, [u32; 3]);

/// One argument of a command signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndirectArgumentDescriptor {
    /// Argument type.
    pub arg_type: IndirectArgumentType,
    /// Name of the root constant or descriptor the argument updates.
    pub name: Option<String>,
    /// Root parameter index.
    pub root_parameter_index: u32,
    /// Number of values (root constants).
    pub count: u32,
    /// Instance step rate.
    pub divisor: u32,
}

impl IndirectArgumentDescriptor {
    /// Argument of `arg_type` with no name.
    pub fn new(arg_type: IndirectArgumentType) -> Self {
        Self {
            arg_type,
            name: None,
            root_parameter_index: 0,
            count: 0,
            divisor: 0,
        }
    }
}

/// Descriptor for an indirect command signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandSignatureDesc {
    /// Pool the signature is used with.
    pub cmd_pool: CmdPoolHandle,
    /// Root signature for argument names (required for constants).
    pub root_signature: Option<RootSignatureHandle>,
    /// Arguments, in buffer order.
    pub arg_descs: Vec<IndirectArgumentDescriptor>,
}

/// Kind of GPU query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum QueryType {
    /// GPU timestamp.
    Timestamp = 0,
    /// Pipeline statistics.
    PipelineStatistics,
    /// Occlusion counter.
    Occlusion,
}

impl QueryType {
    /// Bytes written per query when resolved.
    pub fn result_size(self) -> u64 {
        match self {
            Self::Timestamp | Self::Occlusion => 8,
            // 11 counters of 8 bytes
            Self::PipelineStatistics => 88,
        }
    }
}

/// Descriptor for a query pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryPoolDesc {
    /// Query kind.
    pub query_type: QueryType,
    /// Number of queries.
    pub query_count: u32,
    /// GPU index in linked mode.
    pub node_index: u32,
}

/// Which query in a pool a begin/end refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryDesc {
    /// Query index.
    pub index: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argument_strides() {
        assert_eq!(IndirectArgumentType::Draw.stride(0), 16);
        assert_eq!(IndirectArgumentType::DrawIndex.stride(0), 20);
        assert_eq!(IndirectArgumentType::Dispatch.stride(0), 12);
        assert_eq!(IndirectArgumentType::Constant.stride(3), 12);
    }

    #[test]
    fn test_arguments_cast_to_bytes() {
        let args = IndirectDrawIndexArguments {
            index_count: 36,
            instance_count: 1,
            ..Default::default()
        };
        let bytes: &[u8] = bytemuck::bytes_of(&args);
        assert_eq!(bytes.len(), 20);
        assert_eq!(bytemuck::pod_read_unaligned::<u32>(&bytes[0..4]), 36);
    }
}
