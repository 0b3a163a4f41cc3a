//! Command buffer recording.
//!
//! Recording is local CPU work: every `cmd_*` call validates its shape
//! against the objects it names and the binding state of the command
//! buffer, then appends a [`Command`]. Nothing touches the GPU until
//! `queue_submit`.

use crate::barrier::{BarrierBatch, BarrierResource, ResourceBarrier};
use crate::error::{RhiError, RhiResult};
use crate::handle::{
    BufferHandle, CmdHandle, CommandSignatureHandle, DescriptorSetHandle, PipelineHandle,
    QueryPoolHandle, RootSignatureHandle, TextureHandle,
};
use crate::types::{
    BindRenderTargetsDesc, BufferBarrier, DescriptorType, IndexType,
    IndirectArgumentType, PipelineType, QueryDesc, RenderTargetBarrier, ResourceState,
    ScissorRect, SubresourceDataDesc, TextureBarrier, Viewport, MAX_RENDER_TARGET_ATTACHMENTS,
    MAX_VERTEX_BINDINGS,
};

use super::objects::{CmdState, Objects, RecordingState, StateKey};
use super::Device;

/// One recorded command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// State transitions, after deduplication and split collapse.
    ResourceBarrier(Vec<ResourceBarrier>),
    /// Render pass attachments.
    BindRenderTargets(BindRenderTargetsDesc),
    /// Viewport.
    SetViewport(Viewport),
    /// Scissor rectangle.
    SetScissor(ScissorRect),
    /// Pipeline.
    BindPipeline(PipelineHandle),
    /// Table `index` of a descriptor set.
    BindDescriptorSet {
        /// Table index.
        index: u32,
        /// Descriptor set.
        set: DescriptorSetHandle,
    },
    /// Root constant data.
    BindPushConstants {
        /// Root signature declaring the constants.
        root_signature: RootSignatureHandle,
        /// Name of the root constant.
        name: String,
        /// Constant bytes.
        data: Vec<u8>,
    },
    /// Index buffer.
    BindIndexBuffer {
        /// Buffer.
        buffer: BufferHandle,
        /// Index width.
        index_type: IndexType,
        /// Byte offset.
        offset: u64,
    },
    /// Vertex buffers starting at binding 0.
    BindVertexBuffers {
        /// Buffers.
        buffers: Vec<BufferHandle>,
        /// Stride per buffer.
        strides: Vec<u32>,
        /// Byte offset per buffer.
        offsets: Vec<u64>,
    },
    /// Non-indexed draw.
    Draw {
        /// Vertices per instance.
        vertex_count: u32,
        /// First vertex.
        first_vertex: u32,
        /// Instances.
        instance_count: u32,
        /// First instance.
        first_instance: u32,
    },
    /// Indexed draw.
    DrawIndexed {
        /// Indices per instance.
        index_count: u32,
        /// First index.
        first_index: u32,
        /// Instances.
        instance_count: u32,
        /// Value added to every index.
        first_vertex: u32,
        /// First instance.
        first_instance: u32,
    },
    /// Compute dispatch.
    Dispatch {
        /// Group counts.
        groups: [u32; 3],
    },
    /// Indirect draws or dispatches.
    ExecuteIndirect {
        /// Command signature.
        signature: CommandSignatureHandle,
        /// Upper bound of commands executed.
        max_count: u32,
        /// Argument buffer.
        buffer: BufferHandle,
        /// Offset of the first argument.
        offset: u64,
        /// Optional buffer and offset holding the actual count.
        counter: Option<(BufferHandle, u64)>,
    },
    /// Buffer to buffer copy.
    UpdateBuffer {
        /// Destination.
        dst: BufferHandle,
        /// Destination offset.
        dst_offset: u64,
        /// Source.
        src: BufferHandle,
        /// Source offset.
        src_offset: u64,
        /// Bytes to copy.
        size: u64,
    },
    /// Buffer to texture subresource copy.
    UpdateSubresource {
        /// Destination texture.
        texture: TextureHandle,
        /// Source buffer.
        src: BufferHandle,
        /// Source placement and destination subresource.
        desc: SubresourceDataDesc,
    },
    /// Start of a query.
    BeginQuery {
        /// Query pool.
        pool: QueryPoolHandle,
        /// Query index.
        index: u32,
    },
    /// End of a query.
    EndQuery {
        /// Query pool.
        pool: QueryPoolHandle,
        /// Query index.
        index: u32,
    },
    /// Copy query results into a buffer.
    ResolveQuery {
        /// Query pool.
        pool: QueryPoolHandle,
        /// Destination buffer.
        readback: BufferHandle,
        /// First query.
        start: u32,
        /// Number of queries.
        count: u32,
    },
    /// Open a debug region.
    BeginDebugMarker {
        /// Marker color.
        color: [f32; 3],
        /// Marker label.
        name: String,
    },
    /// Close the innermost debug region.
    EndDebugMarker,
    /// Single debug label.
    AddDebugMarker {
        /// Marker color.
        color: [f32; 3],
        /// Marker label.
        name: String,
    },
}

fn require_nonzero(value: u32, what: &str) -> RhiResult<()> {
    if value == 0 {
        return Err(RhiError::InvalidParameter(format!("{what} must be nonzero")));
    }
    Ok(())
}

fn check_range(offset: u64, size: u64, len: u64, what: &str) -> RhiResult<()> {
    match offset.checked_add(size) {
        Some(end) if end <= len => Ok(()),
        _ => Err(RhiError::InvalidParameter(format!(
            "{what} range {offset}+{size} exceeds size {len}"
        ))),
    }
}

impl Objects {
    /// Pipeline bound to a recording command buffer, checked against `expected`.
    fn bound_pipeline(&self, recording: &RecordingState, expected: PipelineType) -> RhiResult<RootSignatureHandle> {
        let handle = recording
            .pipeline
            .ok_or_else(|| RhiError::InvalidCmdState("no pipeline bound".into()))?;
        let pipeline = self.pipelines.get(handle)?;
        if pipeline.pipeline_type != expected {
            return Err(RhiError::InvalidCmdState(format!(
                "bound pipeline is {:?}, expected {expected:?}",
                pipeline.pipeline_type
            )));
        }
        let root_signature = pipeline.root_signature();
        for (set, _) in recording.descriptor_sets.iter().flatten() {
            if self.descriptor_sets.get(*set)?.desc.root_signature != root_signature {
                return Err(RhiError::BindingMismatch(
                    "bound descriptor set belongs to a different root signature".into(),
                ));
            }
        }
        Ok(root_signature)
    }

    fn check_draw(&self, recording: &RecordingState, indexed: bool) -> RhiResult<()> {
        self.bound_pipeline(recording, PipelineType::Graphics)?;
        if !recording.render_targets_bound {
            return Err(RhiError::InvalidCmdState("no render targets bound".into()));
        }
        if indexed && recording.index_buffer.is_none() {
            return Err(RhiError::InvalidCmdState("no index buffer bound".into()));
        }
        Ok(())
    }
}

impl Device {
    fn record(&self, cmd: CmdHandle, command: Command) -> RhiResult<()> {
        let mut objects = self.objects.write();
        objects.recording_cmd(cmd)?.commands.push(command);
        Ok(())
    }

    /// Start recording.
    ///
    /// A command buffer whose last submission has completed is reset first.
    /// One that is still executing cannot be re-recorded.
    pub fn begin_cmd(&self, cmd: CmdHandle) -> RhiResult<()> {
        let mut objects = self.objects.write();
        let object = objects.cmd_mut(cmd)?;
        match object.state {
            CmdState::Recording => {
                return Err(RhiError::InvalidCmdState("command buffer is already recording".into()));
            }
            CmdState::Submitted => {
                if object.submission.as_ref().is_some_and(|s| !s.is_complete()) {
                    return Err(RhiError::CmdInFlight);
                }
            }
            CmdState::Initial | CmdState::Executable => {}
        }
        object.state = CmdState::Recording;
        object.commands.clear();
        object.recording = RecordingState::default();
        object.submission = None;
        Ok(())
    }

    /// Finish recording.
    pub fn end_cmd(&self, cmd: CmdHandle) -> RhiResult<()> {
        let mut objects = self.objects.write();
        let object = objects.recording_cmd(cmd)?;
        if object.recording.marker_depth != 0 {
            return Err(RhiError::InvalidCmdState(format!(
                "{} debug marker(s) still open",
                object.recording.marker_depth
            )));
        }
        if !object.recording.open_queries.is_empty() {
            return Err(RhiError::InvalidCmdState("query still open".into()));
        }
        object.state = CmdState::Executable;
        Ok(())
    }

    /// Discard whatever was recorded and return to the initial state.
    ///
    /// Fails with [`RhiError::CmdInFlight`] while a submission of the
    /// command buffer is still executing.
    pub fn reset_cmd(&self, cmd: CmdHandle) -> RhiResult<()> {
        let mut objects = self.objects.write();
        let object = objects.cmd_mut(cmd)?;
        if object.submission.as_ref().is_some_and(|s| !s.is_complete()) {
            return Err(RhiError::CmdInFlight);
        }
        object.state = CmdState::Initial;
        object.commands.clear();
        object.recording = RecordingState::default();
        object.submission = None;
        Ok(())
    }

    /// Recording state of a command buffer.
    pub fn cmd_state(&self, cmd: CmdHandle) -> RhiResult<CmdState> {
        Ok(self.objects.read().cmds.get(cmd)?.state)
    }

    /// Snapshot of the commands recorded so far.
    pub fn cmd_recorded_commands(&self, cmd: CmdHandle) -> RhiResult<Vec<Command>> {
        Ok(self.objects.read().cmds.get(cmd)?.commands.clone())
    }

    /// Bind color and depth attachments, or unbind everything.
    pub fn cmd_bind_render_targets(&self, cmd: CmdHandle, desc: &BindRenderTargetsDesc) -> RhiResult<()> {
        let mut objects = self.objects.write();
        objects.recording(cmd)?;
        if desc.render_targets.len() > MAX_RENDER_TARGET_ATTACHMENTS {
            return Err(RhiError::InvalidParameter(format!(
                "{} render targets bound, maximum is {MAX_RENDER_TARGET_ATTACHMENTS}",
                desc.render_targets.len()
            )));
        }
        for &rt in &desc.render_targets {
            let target = objects.render_targets.get(rt)?;
            if target.desc.format.is_depth() {
                return Err(RhiError::InvalidParameter(
                    "depth render target bound as color attachment".into(),
                ));
            }
        }
        if let Some(depth) = desc.depth_stencil {
            if !objects.render_targets.get(depth)?.desc.format.is_depth() {
                return Err(RhiError::InvalidParameter(
                    "color render target bound as depth attachment".into(),
                ));
            }
        }
        let object = objects.recording_cmd(cmd)?;
        object.recording.render_targets_bound = !desc.is_unbind();
        object.commands.push(Command::BindRenderTargets(desc.clone()));
        Ok(())
    }

    /// Set the viewport.
    pub fn cmd_set_viewport(&self, cmd: CmdHandle, viewport: Viewport) -> RhiResult<()> {
        if !viewport.is_valid() {
            return Err(RhiError::InvalidParameter(format!("invalid viewport {viewport:?}")));
        }
        self.record(cmd, Command::SetViewport(viewport))
    }

    /// Set the scissor rectangle.
    pub fn cmd_set_scissor(&self, cmd: CmdHandle, scissor: ScissorRect) -> RhiResult<()> {
        self.record(cmd, Command::SetScissor(scissor))
    }

    /// Bind a pipeline.
    pub fn cmd_bind_pipeline(&self, cmd: CmdHandle, pipeline: PipelineHandle) -> RhiResult<()> {
        let mut objects = self.objects.write();
        objects.pipelines.get(pipeline)?;
        let object = objects.recording_cmd(cmd)?;
        object.recording.pipeline = Some(pipeline);
        object.commands.push(Command::BindPipeline(pipeline));
        Ok(())
    }

    /// Bind table `index` of a descriptor set.
    pub fn cmd_bind_descriptor_set(&self, cmd: CmdHandle, index: u32, set: DescriptorSetHandle) -> RhiResult<()> {
        let mut objects = self.objects.write();
        objects.recording(cmd)?;
        let desc = objects.descriptor_sets.get(set)?.desc;
        if index >= desc.max_sets {
            return Err(RhiError::InvalidParameter(format!(
                "descriptor set index {index} out of range (max_sets {})",
                desc.max_sets
            )));
        }
        let object = objects.recording_cmd(cmd)?;
        object.recording.descriptor_sets[desc.update_frequency as usize] = Some((set, index));
        object.commands.push(Command::BindDescriptorSet { index, set });
        Ok(())
    }

    /// Write a root constant block by name.
    pub fn cmd_bind_push_constants(
        &self,
        cmd: CmdHandle,
        root_signature: RootSignatureHandle,
        name: &str,
        data: &[u8],
    ) -> RhiResult<()> {
        let mut objects = self.objects.write();
        objects.recording(cmd)?;
        let root = objects.root_signatures.get(root_signature)?;
        let constant = root
            .root_constants
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| RhiError::BindingMismatch(format!("no root constant named '{name}'")))?;
        if data.len() as u64 > u64::from(constant.size) {
            return Err(RhiError::BindingMismatch(format!(
                "root constant '{name}' holds {} bytes, got {}",
                constant.size,
                data.len()
            )));
        }
        let name = constant.name.clone();
        objects.recording_cmd(cmd)?.commands.push(Command::BindPushConstants {
            root_signature,
            name,
            data: data.to_vec(),
        });
        Ok(())
    }

    /// Write a root constant block by its index in the root signature.
    pub fn cmd_bind_push_constants_by_index(
        &self,
        cmd: CmdHandle,
        root_signature: RootSignatureHandle,
        param_index: u32,
        data: &[u8],
    ) -> RhiResult<()> {
        let name = {
            let objects = self.objects.read();
            let root = objects.root_signatures.get(root_signature)?;
            root.root_constants
                .get(param_index as usize)
                .map(|c| c.name.clone())
                .ok_or_else(|| {
                    RhiError::BindingMismatch(format!("no root constant at index {param_index}"))
                })?
        };
        self.cmd_bind_push_constants(cmd, root_signature, &name, data)
    }

    /// Bind an index buffer.
    pub fn cmd_bind_index_buffer(
        &self,
        cmd: CmdHandle,
        buffer: BufferHandle,
        index_type: IndexType,
        offset: u64,
    ) -> RhiResult<()> {
        let mut objects = self.objects.write();
        objects.recording(cmd)?;
        let desc = &objects.buffers.get(buffer)?.desc;
        if !desc.descriptors.contains(DescriptorType::INDEX_BUFFER) {
            return Err(RhiError::InvalidParameter(
                "buffer was not created with INDEX_BUFFER usage".into(),
            ));
        }
        check_range(offset, 0, desc.size, "index buffer")?;
        let object = objects.recording_cmd(cmd)?;
        object.recording.index_buffer = Some(index_type);
        object.commands.push(Command::BindIndexBuffer {
            buffer,
            index_type,
            offset,
        });
        Ok(())
    }

    /// Bind vertex buffers starting at binding 0.
    pub fn cmd_bind_vertex_buffer(
        &self,
        cmd: CmdHandle,
        buffers: &[BufferHandle],
        strides: &[u32],
        offsets: Option<&[u64]>,
    ) -> RhiResult<()> {
        if buffers.is_empty() || buffers.len() > MAX_VERTEX_BINDINGS {
            return Err(RhiError::InvalidParameter(format!(
                "{} vertex buffers bound, expected 1..={MAX_VERTEX_BINDINGS}",
                buffers.len()
            )));
        }
        if strides.len() != buffers.len() || offsets.is_some_and(|o| o.len() != buffers.len()) {
            return Err(RhiError::InvalidParameter(
                "vertex buffer strides and offsets must match the buffer count".into(),
            ));
        }
        let offsets = offsets.map_or_else(|| vec![0; buffers.len()], <[u64]>::to_vec);
        let mut objects = self.objects.write();
        objects.recording(cmd)?;
        for (&buffer, &offset) in buffers.iter().zip(&offsets) {
            let desc = &objects.buffers.get(buffer)?.desc;
            if !desc.descriptors.contains(DescriptorType::VERTEX_BUFFER) {
                return Err(RhiError::InvalidParameter(
                    "buffer was not created with VERTEX_BUFFER usage".into(),
                ));
            }
            check_range(offset, 0, desc.size, "vertex buffer")?;
        }
        let object = objects.recording_cmd(cmd)?;
        object.recording.vertex_buffers = buffers.len();
        object.commands.push(Command::BindVertexBuffers {
            buffers: buffers.to_vec(),
            strides: strides.to_vec(),
            offsets,
        });
        Ok(())
    }

    /// Draw `vertex_count` vertices.
    pub fn cmd_draw(&self, cmd: CmdHandle, vertex_count: u32, first_vertex: u32) -> RhiResult<()> {
        self.cmd_draw_instanced(cmd, vertex_count, first_vertex, 1, 0)
    }

    /// Draw `instance_count` instances of `vertex_count` vertices.
    pub fn cmd_draw_instanced(
        &self,
        cmd: CmdHandle,
        vertex_count: u32,
        first_vertex: u32,
        instance_count: u32,
        first_instance: u32,
    ) -> RhiResult<()> {
        require_nonzero(vertex_count, "vertex count")?;
        require_nonzero(instance_count, "instance count")?;
        let mut objects = self.objects.write();
        let recording = &objects.recording(cmd)?.recording;
        objects.check_draw(recording, false)?;
        objects.recording_cmd(cmd)?.commands.push(Command::Draw {
            vertex_count,
            first_vertex,
            instance_count,
            first_instance,
        });
        Ok(())
    }

    /// Draw `index_count` indices from the bound index buffer.
    pub fn cmd_draw_indexed(
        &self,
        cmd: CmdHandle,
        index_count: u32,
        first_index: u32,
        first_vertex: u32,
    ) -> RhiResult<()> {
        self.cmd_draw_indexed_instanced(cmd, index_count, first_index, 1, first_vertex, 0)
    }

    /// Draw `instance_count` instances of `index_count` indices.
    pub fn cmd_draw_indexed_instanced(
        &self,
        cmd: CmdHandle,
        index_count: u32,
        first_index: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> RhiResult<()> {
        require_nonzero(index_count, "index count")?;
        require_nonzero(instance_count, "instance count")?;
        let mut objects = self.objects.write();
        let recording = &objects.recording(cmd)?.recording;
        objects.check_draw(recording, true)?;
        objects.recording_cmd(cmd)?.commands.push(Command::DrawIndexed {
            index_count,
            first_index,
            instance_count,
            first_vertex,
            first_instance,
        });
        Ok(())
    }

    /// Dispatch compute groups.
    pub fn cmd_dispatch(&self, cmd: CmdHandle, x: u32, y: u32, z: u32) -> RhiResult<()> {
        require_nonzero(x, "group count x")?;
        require_nonzero(y, "group count y")?;
        require_nonzero(z, "group count z")?;
        let mut objects = self.objects.write();
        let recording = &objects.recording(cmd)?.recording;
        objects.bound_pipeline(recording, PipelineType::Compute)?;
        objects
            .recording_cmd(cmd)?
            .commands
            .push(Command::Dispatch { groups: [x, y, z] });
        Ok(())
    }

    /// Record resource state transitions.
    ///
    /// Transitions of one resource within a call collapse to the last one.
    /// On backends without split barriers the begin half of a split
    /// becomes an immediate transition and its end half is dropped.
    pub fn cmd_resource_barrier(
        &self,
        cmd: CmdHandle,
        buffers: &[BufferBarrier],
        textures: &[TextureBarrier],
        render_targets: &[RenderTargetBarrier],
    ) -> RhiResult<()> {
        if buffers.is_empty() && textures.is_empty() && render_targets.is_empty() {
            return Err(RhiError::InvalidParameter("empty resource barrier".into()));
        }
        let barriers = buffers
            .iter()
            .map(|b| (BarrierResource::Buffer(b.buffer), b.new_state, b.split))
            .chain(textures.iter().map(|t| (BarrierResource::Texture(t.texture), t.new_state, t.split)))
            .chain(
                render_targets
                    .iter()
                    .map(|r| (BarrierResource::RenderTarget(r.render_target), r.new_state, r.split)),
            );

        let mut objects = self.objects.write();
        objects.recording(cmd)?;
        let mut batch = BarrierBatch::new();
        for (resource, new_state, split) in barriers {
            if new_state == ResourceState::UNDEFINED {
                return Err(RhiError::InvalidParameter(format!(
                    "barrier of {resource:?} to UNDEFINED"
                )));
            }
            let key = match resource {
                BarrierResource::Buffer(buffer) => {
                    objects.buffers.get(buffer)?;
                    StateKey::Buffer(buffer)
                }
                BarrierResource::Texture(texture) => {
                    objects.textures.get(texture)?;
                    StateKey::Texture(texture)
                }
                BarrierResource::RenderTarget(rt) => objects.render_target_key(rt)?,
            };
            batch.add(
                key,
                ResourceBarrier {
                    resource,
                    new_state,
                    split,
                },
            );
        }
        let split_supported = self.backend.capabilities().split_barriers;
        let object = objects.recording_cmd(cmd)?;
        let recorded = batch.collapse_splits(split_supported, &mut object.recording.collapsed_splits);
        if recorded.is_empty() {
            log::trace!("Barrier call fully collapsed into earlier split transitions");
            return Ok(());
        }
        object.commands.push(Command::ResourceBarrier(recorded));
        Ok(())
    }

    /// Execute up to `max_count` indirect commands from `buffer`.
    pub fn cmd_execute_indirect(
        &self,
        cmd: CmdHandle,
        signature: CommandSignatureHandle,
        max_count: u32,
        buffer: BufferHandle,
        offset: u64,
        counter: Option<(BufferHandle, u64)>,
    ) -> RhiResult<()> {
        require_nonzero(max_count, "indirect max count")?;
        let mut objects = self.objects.write();
        let recording = &objects.recording(cmd)?.recording;
        let command_signature = objects.command_signatures.get(signature)?;
        match command_signature.action {
            IndirectArgumentType::Dispatch => {
                objects.bound_pipeline(recording, PipelineType::Compute)?;
            }
            action => objects.check_draw(recording, action == IndirectArgumentType::DrawIndex)?,
        }
        let desc = &objects.buffers.get(buffer)?.desc;
        if !desc.descriptors.contains(DescriptorType::INDIRECT_BUFFER) {
            return Err(RhiError::InvalidParameter(
                "buffer was not created with INDIRECT_BUFFER usage".into(),
            ));
        }
        let size = u64::from(command_signature.stride) * u64::from(max_count);
        check_range(offset, size, desc.size, "indirect argument")?;
        if let Some((counter_buffer, counter_offset)) = counter {
            let counter_desc = &objects.buffers.get(counter_buffer)?.desc;
            check_range(counter_offset, 4, counter_desc.size, "indirect counter")?;
        }
        objects.recording_cmd(cmd)?.commands.push(Command::ExecuteIndirect {
            signature,
            max_count,
            buffer,
            offset,
            counter,
        });
        Ok(())
    }

    /// Copy `size` bytes between buffers.
    pub fn cmd_update_buffer(
        &self,
        cmd: CmdHandle,
        dst: BufferHandle,
        dst_offset: u64,
        src: BufferHandle,
        src_offset: u64,
        size: u64,
    ) -> RhiResult<()> {
        if size == 0 {
            return Err(RhiError::InvalidParameter("copy size must be nonzero".into()));
        }
        let mut objects = self.objects.write();
        objects.recording(cmd)?;
        check_range(src_offset, size, objects.buffers.get(src)?.desc.size, "copy source")?;
        check_range(dst_offset, size, objects.buffers.get(dst)?.desc.size, "copy destination")?;
        objects.recording_cmd(cmd)?.commands.push(Command::UpdateBuffer {
            dst,
            dst_offset,
            src,
            src_offset,
            size,
        });
        Ok(())
    }

    /// Copy buffer rows into one texture subresource.
    pub fn cmd_update_subresource(
        &self,
        cmd: CmdHandle,
        texture: TextureHandle,
        src: BufferHandle,
        desc: &SubresourceDataDesc,
    ) -> RhiResult<()> {
        let mut objects = self.objects.write();
        objects.recording(cmd)?;
        let target = objects.textures.get(texture)?;
        if desc.mip_level >= target.desc.mip_levels || desc.array_layer >= target.desc.array_size {
            return Err(RhiError::InvalidParameter(format!(
                "subresource mip {} layer {} out of range",
                desc.mip_level, desc.array_layer
            )));
        }
        let (block_w, block_h) = target.desc.format.block_extent();
        let rows = u64::from(desc.region.height.div_ceil(block_h));
        let depth = u64::from(desc.region.depth.max(1));
        let row_bytes = u64::from(desc.region.width.div_ceil(block_w))
            * u64::from(target.desc.format.bytes_per_block());
        if u64::from(desc.row_pitch) < row_bytes {
            return Err(RhiError::InvalidParameter(format!(
                "row pitch {} smaller than row size {row_bytes}",
                desc.row_pitch
            )));
        }
        let size = (depth - 1) * u64::from(desc.slice_pitch)
            + rows.saturating_sub(1) * u64::from(desc.row_pitch)
            + row_bytes;
        check_range(desc.buffer_offset, size, objects.buffers.get(src)?.desc.size, "copy source")?;
        objects.recording_cmd(cmd)?.commands.push(Command::UpdateSubresource {
            texture,
            src,
            desc: *desc,
        });
        Ok(())
    }

    /// Begin query `query.index` of `pool`.
    pub fn cmd_begin_query(&self, cmd: CmdHandle, pool: QueryPoolHandle, query: &QueryDesc) -> RhiResult<()> {
        let mut objects = self.objects.write();
        objects.recording(cmd)?;
        let count = objects.query_pools.get(pool)?.desc.query_count;
        if query.index >= count {
            return Err(RhiError::InvalidParameter(format!(
                "query index {} out of range ({count} queries)",
                query.index
            )));
        }
        let object = objects.recording_cmd(cmd)?;
        if object.recording.open_queries.contains(&(pool, query.index)) {
            return Err(RhiError::InvalidCmdState("query already open".into()));
        }
        object.recording.open_queries.push((pool, query.index));
        object.commands.push(Command::BeginQuery {
            pool,
            index: query.index,
        });
        Ok(())
    }

    /// End a query opened with [`Device::cmd_begin_query`].
    pub fn cmd_end_query(&self, cmd: CmdHandle, pool: QueryPoolHandle, query: &QueryDesc) -> RhiResult<()> {
        let mut objects = self.objects.write();
        objects.query_pools.get(pool)?;
        let object = objects.recording_cmd(cmd)?;
        let open = &mut object.recording.open_queries;
        let Some(position) = open.iter().position(|q| *q == (pool, query.index)) else {
            return Err(RhiError::InvalidCmdState("query was not begun".into()));
        };
        open.remove(position);
        object.commands.push(Command::EndQuery {
            pool,
            index: query.index,
        });
        Ok(())
    }

    /// Write results of `count` queries starting at `start` into `readback`.
    pub fn cmd_resolve_query(
        &self,
        cmd: CmdHandle,
        pool: QueryPoolHandle,
        readback: BufferHandle,
        start: u32,
        count: u32,
    ) -> RhiResult<()> {
        require_nonzero(count, "query count")?;
        let mut objects = self.objects.write();
        objects.recording(cmd)?;
        let desc = objects.query_pools.get(pool)?.desc;
        check_range(u64::from(start), u64::from(count), u64::from(desc.query_count), "query")?;
        let size = desc.query_type.result_size() * u64::from(count);
        check_range(0, size, objects.buffers.get(readback)?.desc.size, "query readback")?;
        objects.recording_cmd(cmd)?.commands.push(Command::ResolveQuery {
            pool,
            readback,
            start,
            count,
        });
        Ok(())
    }

    /// Open a debug region.
    pub fn cmd_begin_debug_marker(&self, cmd: CmdHandle, color: [f32; 3], name: &str) -> RhiResult<()> {
        let mut objects = self.objects.write();
        let object = objects.recording_cmd(cmd)?;
        object.recording.marker_depth += 1;
        object.commands.push(Command::BeginDebugMarker {
            color,
            name: name.to_string(),
        });
        Ok(())
    }

    /// Close the innermost debug region.
    pub fn cmd_end_debug_marker(&self, cmd: CmdHandle) -> RhiResult<()> {
        let mut objects = self.objects.write();
        let object = objects.recording_cmd(cmd)?;
        if object.recording.marker_depth == 0 {
            return Err(RhiError::InvalidCmdState("no debug marker open".into()));
        }
        object.recording.marker_depth -= 1;
        object.commands.push(Command::EndDebugMarker);
        Ok(())
    }

    /// Insert a single debug label.
    pub fn cmd_add_debug_marker(&self, cmd: CmdHandle, color: [f32; 3], name: &str) -> RhiResult<()> {
        self.record(
            cmd,
            Command::AddDebugMarker {
                color,
                name: name.to_string(),
            },
        )
    }
}

