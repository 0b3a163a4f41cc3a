//! Object tables of a device.
//!
//! Every object kind lives in its own [`Arena`]. All arenas sit behind one
//! lock so a call sees a consistent snapshot of every object it touches.
//! The lock is never held across a blocking wait.

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::{GpuBuffer, GpuQueue, GpuSwapChain, GpuTexture};
use crate::error::{RhiError, RhiResult};
use crate::handle::{
    Arena, BufferHandle, CmdHandle, CmdPoolHandle, CommandSignatureHandle, DescriptorSetHandle,
    FenceHandle, Handle, PipelineHandle, QueryPoolHandle, QueueHandle, RenderTargetHandle,
    RootSignatureHandle, SamplerHandle, SemaphoreHandle, ShaderHandle, SwapChainHandle,
    TextureHandle,
};
use crate::sync::{Fence, QueueTimeline, Semaphore};
use crate::types::{
    BufferDesc, ClearValue, CmdPoolDesc, DescriptorResources, DescriptorSetDesc,
    DescriptorUpdateFrequency, ImageFormat, IndirectArgumentType, IndexType, PipelineDesc,
    PipelineReflection, PipelineType, QueryPoolDesc, QueueDesc, RenderTargetDesc, ResourceState,
    RootSignatureFlags, SamplerDesc, ShaderResource, ShaderStage, TextureDesc,
};

use super::command::Command;

/// Recording state of a command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmdState {
    /// Freshly allocated or reset.
    Initial,
    /// Between `begin_cmd` and `end_cmd`.
    Recording,
    /// Recorded and ready for submission.
    Executable,
    /// Submitted and possibly still executing.
    Submitted,
}

/// Last submission that referenced a resource.
#[derive(Debug, Clone)]
pub(crate) struct GpuUse {
    pub timeline: Arc<QueueTimeline>,
    pub id: u64,
}

impl GpuUse {
    pub fn is_complete(&self) -> bool {
        self.timeline.is_complete(self.id)
    }
}

pub(crate) struct QueueObject {
    pub desc: QueueDesc,
    pub gpu: Arc<dyn GpuQueue>,
    pub timeline: Arc<QueueTimeline>,
}

pub(crate) struct CmdPoolObject {
    pub desc: CmdPoolDesc,
}

/// Binding state tracked while a command buffer records.
#[derive(Debug, Default)]
pub(crate) struct RecordingState {
    pub pipeline: Option<PipelineHandle>,
    pub index_buffer: Option<IndexType>,
    pub vertex_buffers: usize,
    pub descriptor_sets: [Option<(DescriptorSetHandle, u32)>; DescriptorUpdateFrequency::COUNT],
    pub render_targets_bound: bool,
    pub marker_depth: u32,
    pub open_queries: Vec<(QueryPoolHandle, u32)>,
    /// Split barriers recorded as immediate transitions, awaiting their end half.
    pub collapsed_splits: HashMap<StateKey, ResourceState>,
}

pub(crate) struct CmdObject {
    pub pool: CmdPoolHandle,
    pub queue: QueueHandle,
    pub state: CmdState,
    pub commands: Vec<Command>,
    pub recording: RecordingState,
    pub submission: Option<GpuUse>,
}

pub(crate) struct FenceObject {
    pub fence: Fence,
}

pub(crate) struct SemaphoreObject {
    pub semaphore: Semaphore,
}

pub(crate) struct BufferObject {
    pub desc: BufferDesc,
    pub storage: Arc<GpuBuffer>,
    pub state: ResourceState,
    pub pending_split: Option<ResourceState>,
    pub mapped: bool,
    pub last_use: Option<GpuUse>,
}

pub(crate) struct TextureObject {
    pub desc: TextureDesc,
    pub storage: Arc<GpuTexture>,
    pub state: ResourceState,
    pub pending_split: Option<ResourceState>,
    pub last_use: Option<GpuUse>,
    /// Render target that owns the texture.
    pub owner: Option<RenderTargetHandle>,
}

pub(crate) struct RenderTargetObject {
    pub desc: RenderTargetDesc,
    pub texture: TextureHandle,
    /// Swap chain that owns the render target.
    pub swap_chain: Option<SwapChainHandle>,
}

pub(crate) struct SamplerObject {
    pub desc: SamplerDesc,
}

pub(crate) struct ShaderObject {
    pub name: String,
    pub stages: ShaderStage,
    pub entry_points: Vec<String>,
    pub reflection: PipelineReflection,
    pub code_size: usize,
}

pub(crate) struct RootSignatureObject {
    pub pipeline_type: PipelineType,
    pub shaders: Vec<ShaderHandle>,
    /// Merged descriptor resources, excluding root constants.
    pub descriptors: Vec<ShaderResource>,
    pub root_constants: Vec<ShaderResource>,
    pub static_samplers: Vec<(String, SamplerHandle)>,
    pub max_bindless_textures: u32,
    pub flags: RootSignatureFlags,
}

impl RootSignatureObject {
    pub fn descriptor(&self, name: &str) -> Option<&ShaderResource> {
        self.descriptors.iter().find(|r| r.name == name)
    }

    pub fn is_static_sampler(&self, name: &str) -> bool {
        self.static_samplers.iter().any(|(n, _)| n == name)
    }

    /// Descriptors a set at `frequency` can write.
    pub fn updatable(&self, frequency: DescriptorUpdateFrequency) -> impl Iterator<Item = &ShaderResource> {
        self.descriptors
            .iter()
            .filter(move |r| r.set == frequency as u32 && !self.is_static_sampler(&r.name))
    }
}

pub(crate) struct DescriptorSetObject {
    pub desc: DescriptorSetDesc,
    pub tables: Vec<HashMap<String, DescriptorResources>>,
}

pub(crate) struct PipelineObject {
    pub desc: PipelineDesc,
    pub pipeline_type: PipelineType,
}

impl PipelineObject {
    pub fn root_signature(&self) -> RootSignatureHandle {
        self.desc.root_signature()
    }
}

pub(crate) struct SwapChainObject {
    pub gpu: Arc<dyn GpuSwapChain>,
    pub width: u32,
    pub height: u32,
    pub color_format: ImageFormat,
    pub color_clear_value: ClearValue,
    pub present_queues: Vec<QueueHandle>,
    pub render_targets: Vec<RenderTargetHandle>,
    pub acquired: Vec<bool>,
}

pub(crate) struct QueryPoolObject {
    pub desc: QueryPoolDesc,
}

pub(crate) struct CommandSignatureObject {
    pub root_signature: Option<RootSignatureHandle>,
    pub stride: u32,
    pub action: IndirectArgumentType,
}

/// Resource whose state is tracked. Render targets resolve to their texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum StateKey {
    Buffer(BufferHandle),
    Texture(TextureHandle),
}

#[derive(Default)]
pub(crate) struct Objects {
    pub queues: Arena<QueueHandle, QueueObject>,
    pub cmd_pools: Arena<CmdPoolHandle, CmdPoolObject>,
    pub cmds: Arena<CmdHandle, CmdObject>,
    pub fences: Arena<FenceHandle, FenceObject>,
    pub semaphores: Arena<SemaphoreHandle, SemaphoreObject>,
    pub buffers: Arena<BufferHandle, BufferObject>,
    pub textures: Arena<TextureHandle, TextureObject>,
    pub render_targets: Arena<RenderTargetHandle, RenderTargetObject>,
    pub samplers: Arena<SamplerHandle, SamplerObject>,
    pub shaders: Arena<ShaderHandle, ShaderObject>,
    pub root_signatures: Arena<RootSignatureHandle, RootSignatureObject>,
    pub descriptor_sets: Arena<DescriptorSetHandle, DescriptorSetObject>,
    pub pipelines: Arena<PipelineHandle, PipelineObject>,
    pub swap_chains: Arena<SwapChainHandle, SwapChainObject>,
    pub query_pools: Arena<QueryPoolHandle, QueryPoolObject>,
    pub command_signatures: Arena<CommandSignatureHandle, CommandSignatureObject>,
}

fn default_name<H: Handle>(handle: H, name: Option<&String>) -> String {
    match name {
        Some(name) => name.clone(),
        None => format!("{}#{}", H::KIND, handle.index()),
    }
}

impl Objects {
    /// Kind and count of the first object kind with live objects.
    pub fn first_live(&self) -> Option<(&'static str, usize)> {
        let counts = [
            (SwapChainHandle::KIND, self.swap_chains.len()),
            (PipelineHandle::KIND, self.pipelines.len()),
            (DescriptorSetHandle::KIND, self.descriptor_sets.len()),
            (CommandSignatureHandle::KIND, self.command_signatures.len()),
            (RootSignatureHandle::KIND, self.root_signatures.len()),
            (ShaderHandle::KIND, self.shaders.len()),
            (SamplerHandle::KIND, self.samplers.len()),
            (RenderTargetHandle::KIND, self.render_targets.len()),
            (TextureHandle::KIND, self.textures.len()),
            (BufferHandle::KIND, self.buffers.len()),
            (QueryPoolHandle::KIND, self.query_pools.len()),
            (SemaphoreHandle::KIND, self.semaphores.len()),
            (FenceHandle::KIND, self.fences.len()),
            (CmdHandle::KIND, self.cmds.len()),
            (CmdPoolHandle::KIND, self.cmd_pools.len()),
            (QueueHandle::KIND, self.queues.len()),
        ];
        counts.into_iter().find(|(_, count)| *count > 0)
    }

    pub fn render_target_key(&self, render_target: RenderTargetHandle) -> RhiResult<StateKey> {
        Ok(StateKey::Texture(self.render_targets.get(render_target)?.texture))
    }

    /// Committed state and open split transition of a resource.
    pub fn state(&self, key: StateKey) -> RhiResult<(ResourceState, Option<ResourceState>)> {
        match key {
            StateKey::Buffer(buffer) => {
                let buffer = self.buffers.get(buffer)?;
                Ok((buffer.state, buffer.pending_split))
            }
            StateKey::Texture(texture) => {
                let texture = self.textures.get(texture)?;
                Ok((texture.state, texture.pending_split))
            }
        }
    }

    pub fn set_state(
        &mut self,
        key: StateKey,
        state: ResourceState,
        pending_split: Option<ResourceState>,
    ) -> RhiResult<()> {
        match key {
            StateKey::Buffer(buffer) => {
                let buffer = self.buffers.get_mut(buffer)?;
                buffer.state = state;
                buffer.pending_split = pending_split;
            }
            StateKey::Texture(texture) => {
                let texture = self.textures.get_mut(texture)?;
                texture.state = state;
                texture.pending_split = pending_split;
            }
        }
        Ok(())
    }

    /// Debug name of a resource, for error messages.
    pub fn name(&self, key: StateKey) -> String {
        match key {
            StateKey::Buffer(handle) => {
                default_name(handle, self.buffers.get(handle).ok().and_then(|b| b.desc.name.as_ref()))
            }
            StateKey::Texture(handle) => match self.textures.get(handle) {
                Ok(texture) => match texture.owner.and_then(|rt| self.render_targets.get(rt).ok()) {
                    Some(rt) if rt.desc.name.is_some() => default_name(handle, rt.desc.name.as_ref()),
                    _ => default_name(handle, texture.desc.name.as_ref()),
                },
                Err(_) => default_name(handle, None),
            },
        }
    }

    pub fn stamp_use(&mut self, key: StateKey, gpu_use: &GpuUse) {
        match key {
            StateKey::Buffer(buffer) => {
                if let Ok(buffer) = self.buffers.get_mut(buffer) {
                    buffer.last_use = Some(gpu_use.clone());
                }
            }
            StateKey::Texture(texture) => {
                if let Ok(texture) = self.textures.get_mut(texture) {
                    texture.last_use = Some(gpu_use.clone());
                }
            }
        }
    }

    pub fn cmd_mut(&mut self, cmd: CmdHandle) -> RhiResult<&mut CmdObject> {
        self.cmds.get_mut(cmd)
    }

    /// Command buffer that is currently recording.
    pub fn recording(&self, cmd: CmdHandle) -> RhiResult<&CmdObject> {
        let object = self.cmds.get(cmd)?;
        if object.state != CmdState::Recording {
            return Err(RhiError::InvalidCmdState(format!(
                "command buffer is {:?}, expected Recording",
                object.state
            )));
        }
        Ok(object)
    }

    /// Mutable access to a command buffer that is currently recording.
    pub fn recording_cmd(&mut self, cmd: CmdHandle) -> RhiResult<&mut CmdObject> {
        let object = self.cmds.get_mut(cmd)?;
        if object.state != CmdState::Recording {
            return Err(RhiError::InvalidCmdState(format!(
                "command buffer is {:?}, expected Recording",
                object.state
            )));
        }
        Ok(object)
    }
}
