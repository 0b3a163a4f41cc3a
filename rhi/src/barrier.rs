//! Resource barrier batching and state validation.
//!
//! Barriers are recorded per call as one [`BarrierBatch`]: transitions are
//! keyed by resource so a call never transitions the same resource twice,
//! and render targets are keyed by their backing texture.
//!
//! The layer does not insert barriers on its own. Callers declare every
//! transition; at submit time [`StateValidator`] replays the recorded
//! commands against the committed resource states and rejects the first
//! use that does not match the last declared state.

use std::collections::HashMap;

use crate::error::{RhiError, RhiResult};
use crate::handle::{BufferHandle, DescriptorSetHandle, RenderTargetHandle, TextureHandle};
use crate::renderer::Command;
use crate::renderer::objects::{Objects, StateKey};
use crate::types::{DescriptorResources, DescriptorType, DescriptorUpdateFrequency, ResourceState};

/// Resource named by a recorded barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarrierResource {
    /// A buffer.
    Buffer(BufferHandle),
    /// A texture.
    Texture(TextureHandle),
    /// A render target (tracked through its texture).
    RenderTarget(RenderTargetHandle),
}

/// One recorded state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceBarrier {
    /// Resource to transition.
    pub resource: BarrierResource,
    /// State after the transition.
    pub new_state: ResourceState,
    /// Begin half of a split transition.
    pub split: bool,
}

/// Transitions of one `cmd_resource_barrier` call.
///
/// If a transition for the same resource already exists, it is replaced.
/// Insertion order is kept so the recorded stream is deterministic.
#[derive(Debug, Default)]
pub(crate) struct BarrierBatch {
    barriers: Vec<(StateKey, ResourceBarrier)>,
    index: HashMap<StateKey, usize>,
}

impl BarrierBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: StateKey, barrier: ResourceBarrier) {
        match self.index.get(&key) {
            Some(&slot) => self.barriers[slot] = (key, barrier),
            None => {
                self.index.insert(key, self.barriers.len());
                self.barriers.push((key, barrier));
            }
        }
    }

    /// Resolve split transitions for a backend without split barriers.
    ///
    /// The begin half becomes an immediate transition and is remembered in
    /// `collapsed`; the matching end half recorded later is dropped.
    pub fn collapse_splits(
        self,
        split_supported: bool,
        collapsed: &mut HashMap<StateKey, ResourceState>,
    ) -> Vec<ResourceBarrier> {
        if split_supported {
            return self.barriers.into_iter().map(|(_, b)| b).collect();
        }
        let mut out = Vec::with_capacity(self.barriers.len());
        for (key, mut barrier) in self.barriers {
            if barrier.split {
                barrier.split = false;
                collapsed.insert(key, barrier.new_state);
            } else if collapsed.remove(&key) == Some(barrier.new_state) {
                continue;
            }
            out.push(barrier);
        }
        out
    }
}

type TrackedState = (ResourceState, Option<ResourceState>);

/// Replays recorded commands against resource states.
///
/// With checks disabled the validator only tracks transitions so the final
/// states can still be committed.
pub(crate) struct StateValidator<'a> {
    objects: &'a Objects,
    checks: bool,
    overlay: HashMap<StateKey, TrackedState>,
    used: Vec<StateKey>,
}

impl<'a> StateValidator<'a> {
    pub fn new(objects: &'a Objects, checks: bool) -> Self {
        Self {
            objects,
            checks,
            overlay: HashMap::new(),
            used: Vec::new(),
        }
    }

    fn current(&self, key: StateKey) -> RhiResult<TrackedState> {
        match self.overlay.get(&key) {
            Some(state) => Ok(*state),
            None => self.objects.state(key),
        }
    }

    fn touch(&mut self, key: StateKey) {
        if !self.used.contains(&key) {
            self.used.push(key);
        }
    }

    fn violation(&self, key: StateKey, required: ResourceState, actual: ResourceState) -> RhiError {
        RhiError::BarrierViolation {
            resource: self.objects.name(key),
            required,
            actual,
        }
    }

    fn key(&self, resource: BarrierResource) -> RhiResult<StateKey> {
        match resource {
            BarrierResource::Buffer(buffer) => Ok(StateKey::Buffer(buffer)),
            BarrierResource::Texture(texture) => Ok(StateKey::Texture(texture)),
            BarrierResource::RenderTarget(rt) => self.objects.render_target_key(rt),
        }
    }

    fn barrier(&mut self, barrier: &ResourceBarrier) -> RhiResult<()> {
        let key = self.key(barrier.resource)?;
        self.touch(key);
        let (state, pending) = self.current(key)?;
        let next = match pending {
            // End half of an open split transition
            Some(target) if !barrier.split && barrier.new_state == target => (target, None),
            Some(target) if self.checks => {
                return Err(self.violation(key, target, barrier.new_state));
            }
            Some(_) | None if barrier.split => (state, Some(barrier.new_state)),
            _ => (barrier.new_state, None),
        };
        self.overlay.insert(key, next);
        Ok(())
    }

    fn require(
        &mut self,
        key: StateKey,
        required: ResourceState,
        accepts: impl Fn(ResourceState) -> bool,
    ) -> RhiResult<()> {
        self.touch(key);
        if !self.checks {
            return Ok(());
        }
        let (state, pending) = self.current(key)?;
        if pending.is_some() || !accepts(state) {
            return Err(self.violation(key, required, state));
        }
        Ok(())
    }

    fn require_state(&mut self, key: StateKey, required: ResourceState) -> RhiResult<()> {
        self.require(key, required, |state| state.contains(required))
    }

    fn require_shader_read(&mut self, key: StateKey) -> RhiResult<()> {
        self.require(key, ResourceState::SHADER_RESOURCE, ResourceState::is_shader_readable)
    }

    fn check_descriptor_set(&mut self, set: DescriptorSetHandle, index: u32) -> RhiResult<()> {
        let objects = self.objects;
        let set = objects.descriptor_sets.get(set)?;
        let root = objects.root_signatures.get(set.desc.root_signature)?;
        let Some(table) = set.tables.get(index as usize) else {
            return Ok(());
        };
        for (name, resources) in table {
            let Some(declared) = root.descriptor(name) else {
                continue;
            };
            let ty = declared.descriptor_type;
            match resources {
                DescriptorResources::Textures(textures) => {
                    for &texture in textures {
                        let key = StateKey::Texture(texture);
                        if ty.contains(DescriptorType::RW_TEXTURE) {
                            self.require_state(key, ResourceState::UNORDERED_ACCESS)?;
                        } else {
                            self.require_shader_read(key)?;
                        }
                    }
                }
                DescriptorResources::Buffers { buffers, .. } => {
                    for &buffer in buffers {
                        let key = StateKey::Buffer(buffer);
                        if ty.contains(DescriptorType::RW_BUFFER) {
                            self.require_state(key, ResourceState::UNORDERED_ACCESS)?;
                        } else if ty.contains(DescriptorType::UNIFORM_BUFFER) {
                            self.require_state(key, ResourceState::VERTEX_AND_CONSTANT_BUFFER)?;
                        } else if ty.contains(DescriptorType::BUFFER) {
                            self.require_shader_read(key)?;
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn check_bound_sets(
        &mut self,
        sets: &[Option<(DescriptorSetHandle, u32)>; DescriptorUpdateFrequency::COUNT],
    ) -> RhiResult<()> {
        for (set, index) in sets.iter().flatten() {
            self.check_descriptor_set(*set, *index)?;
        }
        Ok(())
    }

    /// Replay the commands of one command buffer.
    pub fn replay(&mut self, commands: &[Command]) -> RhiResult<()> {
        let mut sets = [None; DescriptorUpdateFrequency::COUNT];
        for command in commands {
            match command {
                Command::ResourceBarrier(barriers) => {
                    for barrier in barriers {
                        self.barrier(barrier)?;
                    }
                }
                Command::BindRenderTargets(desc) => {
                    for &rt in &desc.render_targets {
                        let key = self.objects.render_target_key(rt)?;
                        self.require_state(key, ResourceState::RENDER_TARGET)?;
                    }
                    if let Some(depth) = desc.depth_stencil {
                        let key = self.objects.render_target_key(depth)?;
                        self.require(key, ResourceState::DEPTH_WRITE, |state| {
                            state.intersects(ResourceState::DEPTH_WRITE | ResourceState::DEPTH_READ)
                        })?;
                    }
                }
                Command::BindDescriptorSet { index, set } => {
                    let frequency = self.objects.descriptor_sets.get(*set)?.desc.update_frequency;
                    sets[frequency as usize] = Some((*set, *index));
                }
                Command::BindIndexBuffer { buffer, .. } => {
                    self.require_state(StateKey::Buffer(*buffer), ResourceState::INDEX_BUFFER)?;
                }
                Command::BindVertexBuffers { buffers, .. } => {
                    for &buffer in buffers {
                        self.require_state(
                            StateKey::Buffer(buffer),
                            ResourceState::VERTEX_AND_CONSTANT_BUFFER,
                        )?;
                    }
                }
                Command::Draw { .. } | Command::DrawIndexed { .. } | Command::Dispatch { .. } => {
                    self.check_bound_sets(&sets)?;
                }
                Command::ExecuteIndirect {
                    buffer, counter, ..
                } => {
                    self.require_state(StateKey::Buffer(*buffer), ResourceState::INDIRECT_ARGUMENT)?;
                    if let Some((counter, _)) = counter {
                        self.require_state(
                            StateKey::Buffer(*counter),
                            ResourceState::INDIRECT_ARGUMENT,
                        )?;
                    }
                    self.check_bound_sets(&sets)?;
                }
                Command::UpdateBuffer { dst, src, .. } => {
                    self.require_state(StateKey::Buffer(*src), ResourceState::COPY_SOURCE)?;
                    self.require_state(StateKey::Buffer(*dst), ResourceState::COPY_DEST)?;
                }
                Command::UpdateSubresource { texture, src, .. } => {
                    self.require_state(StateKey::Buffer(*src), ResourceState::COPY_SOURCE)?;
                    self.require_state(StateKey::Texture(*texture), ResourceState::COPY_DEST)?;
                }
                Command::ResolveQuery { readback, .. } => {
                    self.require_state(StateKey::Buffer(*readback), ResourceState::COPY_DEST)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Final states of every transitioned resource and every resource used.
    pub fn finish(self) -> (HashMap<StateKey, TrackedState>, Vec<StateKey>) {
        (self.overlay, self.used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::Handle;

    fn buffer_barrier(index: u32, new_state: ResourceState, split: bool) -> (StateKey, ResourceBarrier) {
        let buffer = BufferHandle::from_raw(index, 0);
        (
            StateKey::Buffer(buffer),
            ResourceBarrier {
                resource: BarrierResource::Buffer(buffer),
                new_state,
                split,
            },
        )
    }

    #[test]
    fn test_batch_replaces_duplicates() {
        let mut batch = BarrierBatch::new();
        let (key, first) = buffer_barrier(0, ResourceState::COPY_DEST, false);
        batch.add(key, first);
        let (other, second) = buffer_barrier(1, ResourceState::INDEX_BUFFER, false);
        batch.add(other, second);
        let (key, last) = buffer_barrier(0, ResourceState::SHADER_RESOURCE, false);
        batch.add(key, last);

        let barriers = batch.collapse_splits(true, &mut HashMap::new());
        assert_eq!(barriers.len(), 2);
        assert_eq!(barriers[0].new_state, ResourceState::SHADER_RESOURCE);
        assert_eq!(barriers[1].new_state, ResourceState::INDEX_BUFFER);
    }

    #[test]
    fn test_split_collapse_drops_end_half() {
        let mut collapsed = HashMap::new();

        let mut begin = BarrierBatch::new();
        let (key, barrier) = buffer_barrier(0, ResourceState::SHADER_RESOURCE, true);
        begin.add(key, barrier);
        let recorded = begin.collapse_splits(false, &mut collapsed);
        assert_eq!(recorded.len(), 1);
        assert!(!recorded[0].split);

        let mut end = BarrierBatch::new();
        let (key, barrier) = buffer_barrier(0, ResourceState::SHADER_RESOURCE, false);
        end.add(key, barrier);
        assert!(end.collapse_splits(false, &mut collapsed).is_empty());
        assert!(collapsed.is_empty());
    }

    #[test]
    fn test_split_kept_when_supported() {
        let mut batch = BarrierBatch::new();
        let (key, barrier) = buffer_barrier(0, ResourceState::COPY_SOURCE, true);
        batch.add(key, barrier);
        let recorded = batch.collapse_splits(true, &mut HashMap::new());
        assert!(recorded[0].split);
    }
}
