//! Typed object handles and the generational arena that issues them.
//!
//! Every RHI object kind gets its own `Copy` handle type. A handle is an
//! index into an [`Arena`] plus the generation of the slot at the time the
//! object was inserted, so a handle that outlives its object is detected
//! instead of aliasing whatever was allocated into the slot afterwards.
//!
//! Slots also carry a dependent count. Objects that other live objects
//! depend on (a queue referenced by a command pool, a texture owned by a
//! render target, ...) cannot be removed until every dependent is gone,
//! which enforces reverse-creation-order teardown.

use std::marker::PhantomData;

use crate::error::{RhiError, RhiResult};

/// Common interface of all typed handles.
pub trait Handle: Copy + Eq + std::hash::Hash + std::fmt::Debug {
    /// Human-readable object kind, used in error messages.
    const KIND: &'static str;

    /// Construct a handle from its raw parts.
    fn from_raw(index: u32, generation: u32) -> Self;

    /// Slot index of the handle.
    fn index(self) -> u32;

    /// Slot generation of the handle.
    fn generation(self) -> u32;
}

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name {
            index: u32,
            generation: u32,
        }

        impl Handle for $name {
            const KIND: &'static str = $kind;

            fn from_raw(index: u32, generation: u32) -> Self {
                Self { index, generation }
            }

            fn index(self) -> u32 {
                self.index
            }

            fn generation(self) -> u32 {
                self.generation
            }
        }
    };
}

define_handle!(
    /// Handle to a submission queue.
    QueueHandle,
    "queue"
);
define_handle!(
    /// Handle to a command pool.
    CmdPoolHandle,
    "command pool"
);
define_handle!(
    /// Handle to a command buffer.
    CmdHandle,
    "command buffer"
);
define_handle!(
    /// Handle to a CPU-observable fence.
    FenceHandle,
    "fence"
);
define_handle!(
    /// Handle to a GPU-only semaphore.
    SemaphoreHandle,
    "semaphore"
);
define_handle!(
    /// Handle to a GPU buffer.
    BufferHandle,
    "buffer"
);
define_handle!(
    /// Handle to a GPU texture.
    TextureHandle,
    "texture"
);
define_handle!(
    /// Handle to a render target.
    RenderTargetHandle,
    "render target"
);
define_handle!(
    /// Handle to a sampler.
    SamplerHandle,
    "sampler"
);
define_handle!(
    /// Handle to a shader program.
    ShaderHandle,
    "shader"
);
define_handle!(
    /// Handle to a root signature (pipeline layout).
    RootSignatureHandle,
    "root signature"
);
define_handle!(
    /// Handle to a pool of descriptor sets.
    DescriptorSetHandle,
    "descriptor set"
);
define_handle!(
    /// Handle to a compiled pipeline.
    PipelineHandle,
    "pipeline"
);
define_handle!(
    /// Handle to a swap chain.
    SwapChainHandle,
    "swap chain"
);
define_handle!(
    /// Handle to a query pool.
    QueryPoolHandle,
    "query pool"
);
define_handle!(
    /// Handle to an indirect command signature.
    CommandSignatureHandle,
    "command signature"
);
define_handle!(
    /// Handle to a ray tracing acceleration structure.
    ///
    /// Acceleration structures are never created by this crate; the handle
    /// only exists so descriptor data can name one.
    AccelerationStructureHandle,
    "acceleration structure"
);

struct Slot<T> {
    generation: u32,
    value: Option<T>,
    dependents: u32,
}

/// Generational storage for one object kind.
pub struct Arena<H: Handle, T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
    _marker: PhantomData<H>,
}

impl<H: Handle, T> Default for Arena<H, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Handle, T> Arena<H, T> {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            _marker: PhantomData,
        }
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no objects are alive.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert an object and return its handle.
    pub fn insert(&mut self, value: T) -> H {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            slot.dependents = 0;
            return H::from_raw(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
            dependents: 0,
        });
        H::from_raw(index, 0)
    }

    fn slot(&self, handle: H) -> Option<&Slot<T>> {
        self.slots
            .get(handle.index() as usize)
            .filter(|slot| slot.generation == handle.generation() && slot.value.is_some())
    }

    fn slot_mut(&mut self, handle: H) -> Option<&mut Slot<T>> {
        self.slots
            .get_mut(handle.index() as usize)
            .filter(|slot| slot.generation == handle.generation() && slot.value.is_some())
    }

    /// Returns true if the handle refers to a live object.
    pub fn contains(&self, handle: H) -> bool {
        self.slot(handle).is_some()
    }

    /// Borrow a live object.
    pub fn get(&self, handle: H) -> RhiResult<&T> {
        self.slot(handle)
            .and_then(|slot| slot.value.as_ref())
            .ok_or(RhiError::InvalidHandle { kind: H::KIND })
    }

    /// Mutably borrow a live object.
    pub fn get_mut(&mut self, handle: H) -> RhiResult<&mut T> {
        self.slot_mut(handle)
            .and_then(|slot| slot.value.as_mut())
            .ok_or(RhiError::InvalidHandle { kind: H::KIND })
    }

    /// Record that a new live object depends on `handle`.
    pub fn retain(&mut self, handle: H) -> RhiResult<()> {
        let slot = self
            .slot_mut(handle)
            .ok_or(RhiError::InvalidHandle { kind: H::KIND })?;
        slot.dependents += 1;
        Ok(())
    }

    /// Drop one dependency previously recorded with [`Arena::retain`].
    pub fn release(&mut self, handle: H) {
        if let Some(slot) = self.slot_mut(handle) {
            slot.dependents = slot.dependents.saturating_sub(1);
        }
    }

    /// Number of live objects depending on `handle`.
    pub fn dependents(&self, handle: H) -> u32 {
        self.slot(handle).map_or(0, |slot| slot.dependents)
    }

    /// Remove an object that nothing depends on anymore.
    pub fn remove(&mut self, handle: H) -> RhiResult<T> {
        let slot = self
            .slot_mut(handle)
            .ok_or(RhiError::InvalidHandle { kind: H::KIND })?;
        if slot.dependents > 0 {
            return Err(RhiError::ObjectInUse {
                kind: H::KIND,
                dependents: slot.dependents,
            });
        }
        let value = slot.value.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index());
        self.len -= 1;
        value.ok_or(RhiError::InvalidHandle { kind: H::KIND })
    }

    /// Iterate over all live objects.
    pub fn iter(&self) -> impl Iterator<Item = (H, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (H::from_raw(index as u32, slot.generation), value))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut arena: Arena<BufferHandle, u32> = Arena::new();
        let a = arena.insert(1);
        let b = arena.insert(2);
        assert_ne!(a, b);
        assert_eq!(*arena.get(a).unwrap(), 1);
        assert_eq!(*arena.get(b).unwrap(), 2);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_stale_handle_rejected() {
        let mut arena: Arena<TextureHandle, &str> = Arena::new();
        let old = arena.insert("first");
        arena.remove(old).unwrap();
        let new = arena.insert("second");

        // Same slot, new generation
        assert_eq!(old.index(), new.index());
        assert_eq!(
            arena.get(old).unwrap_err(),
            RhiError::InvalidHandle { kind: "texture" }
        );
        assert_eq!(*arena.get(new).unwrap(), "second");
    }

    #[test]
    fn test_remove_with_dependents_fails() {
        let mut arena: Arena<QueueHandle, ()> = Arena::new();
        let queue = arena.insert(());
        arena.retain(queue).unwrap();

        assert_eq!(
            arena.remove(queue).unwrap_err(),
            RhiError::ObjectInUse {
                kind: "queue",
                dependents: 1
            }
        );

        arena.release(queue);
        assert!(arena.remove(queue).is_ok());
        assert!(arena.is_empty());
    }

    #[test]
    fn test_iter_skips_removed() {
        let mut arena: Arena<FenceHandle, u8> = Arena::new();
        let a = arena.insert(1);
        let _b = arena.insert(2);
        arena.remove(a).unwrap();
        let values: Vec<u8> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![2]);
    }
}
