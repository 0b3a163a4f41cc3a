//! Frame pacing over swap chain images.
//!
//! [`FramePacer`] owns the per-image synchronization of a render loop: one
//! fence and one render-complete semaphore per swap chain image plus one
//! image-acquired semaphore.
//!
//! ```text
//! image_count = 3
//!
//! Slot 0: [Frame 0] ──► [Frame 3] ──► [Frame 6] ──►
//! Slot 1: [Frame 1] ──► [Frame 4] ──► [Frame 7] ──►
//! Slot 2: [Frame 2] ──► [Frame 5] ──► [Frame 8] ──►
//! ```
//!
//! Before the command buffer of a slot is recorded again, the fence of the
//! slot's previous submission is waited on. The CPU therefore never runs
//! more than `image_count` frames ahead of the GPU.
//!
//! # Example
//!
//! ```ignore
//! let mut pacer = FramePacer::new(&renderer, image_count)?;
//! loop {
//!     let index = pacer.acquire(&renderer, swap_chain)?;
//!     // record cmds[index] ...
//!     pacer.submit(&renderer, queue, &[cmds[index as usize]])?;
//!     pacer.present(&renderer, queue, swap_chain)?;
//! }
//! pacer.wait_idle(&renderer)?;
//! pacer.destroy(&renderer)?;
//! ```
//!
//! `FramePacer` is not thread-safe. It should be owned by the render thread.

use crate::error::{RhiError, RhiResult};
use crate::handle::{CmdHandle, FenceHandle, QueueHandle, SemaphoreHandle, SwapChainHandle};
use crate::renderer::Device;
use crate::types::{FenceStatus, QueuePresentDesc, QueueSubmitDesc};

/// Per-image fence ring of a render loop.
#[derive(Debug)]
pub struct FramePacer {
    fences: Vec<FenceHandle>,
    render_complete: Vec<SemaphoreHandle>,
    image_acquired: SemaphoreHandle,
    /// Image acquired by the current frame.
    frame_index: Option<u32>,
    /// The current frame was submitted.
    submitted: bool,
    frame_count: u64,
    fence_waits: u64,
    max_lookahead: usize,
}

impl FramePacer {
    /// Create the synchronization objects for `image_count` images.
    pub fn new(device: &Device, image_count: u32) -> RhiResult<Self> {
        if image_count == 0 {
            return Err(RhiError::InvalidParameter("frame pacer without images".into()));
        }
        let image_acquired = device.add_semaphore()?;
        let mut pacer = Self {
            fences: Vec::with_capacity(image_count as usize),
            render_complete: Vec::with_capacity(image_count as usize),
            image_acquired,
            frame_index: None,
            submitted: false,
            frame_count: 0,
            fence_waits: 0,
            max_lookahead: 0,
        };
        for _ in 0..image_count {
            let created = device
                .add_fence()
                .and_then(|fence| match device.add_semaphore() {
                    Ok(semaphore) => Ok((fence, semaphore)),
                    Err(err) => {
                        let _ = device.remove_fence(fence);
                        Err(err)
                    }
                });
            match created {
                Ok((fence, semaphore)) => {
                    pacer.fences.push(fence);
                    pacer.render_complete.push(semaphore);
                }
                Err(err) => {
                    let _ = pacer.destroy(device);
                    return Err(err);
                }
            }
        }
        log::debug!("Created frame pacer for {image_count} images");
        Ok(pacer)
    }

    /// Acquire the next swap chain image and wait until its slot is free.
    ///
    /// Returns the image index, which is also the index of the command
    /// buffer to record.
    pub fn acquire(&mut self, device: &Device, swap_chain: SwapChainHandle) -> RhiResult<u32> {
        if self.frame_index.is_some() {
            return Err(RhiError::InvalidParameter(
                "previous frame was not presented".into(),
            ));
        }
        let index = device.acquire_next_image(swap_chain, Some(self.image_acquired), None)?;
        let Some(&fence) = self.fences.get(index as usize) else {
            return Err(RhiError::InvalidParameter(format!(
                "image index {index} out of range ({} slots)",
                self.fences.len()
            )));
        };
        if device.get_fence_status(fence)? == FenceStatus::Incomplete {
            log::trace!("Waiting for slot {index} of frame {}", self.frame_count);
            device.wait_for_fences(&[fence])?;
            self.fence_waits += 1;
        }
        self.frame_index = Some(index);
        self.frame_count += 1;
        log::trace!("Begin frame {} (image {index})", self.frame_count);
        Ok(index)
    }

    /// Submit the frame's command buffers.
    ///
    /// The batch waits on the image-acquired semaphore and signals the
    /// slot's render-complete semaphore and fence.
    pub fn submit(&mut self, device: &Device, queue: QueueHandle, cmds: &[CmdHandle]) -> RhiResult<()> {
        let index = self.current()?;
        if self.submitted {
            return Err(RhiError::InvalidParameter("frame was already submitted".into()));
        }
        self.submit_slot(device, queue, cmds, index)?;
        self.submitted = true;
        let lookahead = self.in_flight(device)?;
        self.max_lookahead = self.max_lookahead.max(lookahead);
        Ok(())
    }

    /// Present the frame's image once rendering has completed.
    pub fn present(&mut self, device: &Device, queue: QueueHandle, swap_chain: SwapChainHandle) -> RhiResult<()> {
        let index = self.current()?;
        self.present_slot(device, queue, swap_chain, index)?;
        log::trace!("End frame {} (image {index})", self.frame_count);
        self.frame_index = None;
        self.submitted = false;
        Ok(())
    }

    /// Give up on the frame started by the last `acquire`.
    ///
    /// `cmd` is the slot's command buffer. If the frame was not submitted
    /// yet, `cmd` is reset and submitted empty, so the acquire semaphore,
    /// the slot fence and the image still pass through one submit and one
    /// present. The pacer accepts the next `acquire` afterwards even if
    /// this call fails.
    pub fn abandon(
        &mut self,
        device: &Device,
        queue: QueueHandle,
        swap_chain: SwapChainHandle,
        cmd: CmdHandle,
    ) -> RhiResult<()> {
        let Ok(index) = self.current() else {
            return Ok(());
        };
        let submitted = std::mem::take(&mut self.submitted);
        self.frame_index = None;
        log::warn!("Abandoning frame {} (image {index})", self.frame_count);
        if !submitted {
            device.reset_cmd(cmd)?;
            device.begin_cmd(cmd)?;
            device.end_cmd(cmd)?;
            self.submit_slot(device, queue, &[cmd], index)?;
        }
        self.present_slot(device, queue, swap_chain, index)
    }

    /// Block until every submitted frame has completed.
    pub fn wait_idle(&self, device: &Device) -> RhiResult<()> {
        log::trace!("Waiting for {} frame slots", self.fences.len());
        device.wait_for_fences(&self.fences)
    }

    /// Number of submitted frames the GPU has not finished.
    pub fn in_flight(&self, device: &Device) -> RhiResult<usize> {
        let mut count = 0;
        for &fence in &self.fences {
            if device.get_fence_status(fence)? == FenceStatus::Incomplete {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Image acquired by the frame being recorded.
    pub fn frame_index(&self) -> Option<u32> {
        self.frame_index
    }

    /// Number of frames started.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Number of times `acquire` blocked on a slot fence.
    pub fn fence_waits(&self) -> u64 {
        self.fence_waits
    }

    /// Most frames observed in flight right after a submission.
    pub fn max_lookahead(&self) -> usize {
        self.max_lookahead
    }

    /// Number of slots.
    pub fn image_count(&self) -> usize {
        self.fences.len()
    }

    /// Fence of slot `index`.
    pub fn fence(&self, index: u32) -> Option<FenceHandle> {
        self.fences.get(index as usize).copied()
    }

    /// Destroy the synchronization objects. Call after [`FramePacer::wait_idle`].
    pub fn destroy(self, device: &Device) -> RhiResult<()> {
        for (fence, semaphore) in self.fences.into_iter().zip(self.render_complete) {
            device.remove_semaphore(semaphore)?;
            device.remove_fence(fence)?;
        }
        device.remove_semaphore(self.image_acquired)
    }

    fn submit_slot(&self, device: &Device, queue: QueueHandle, cmds: &[CmdHandle], index: usize) -> RhiResult<()> {
        device.queue_submit(
            queue,
            &QueueSubmitDesc {
                cmds: cmds.to_vec(),
                signal_fence: Some(self.fences[index]),
                wait_semaphores: vec![self.image_acquired],
                signal_semaphores: vec![self.render_complete[index]],
            },
        )
    }

    fn present_slot(
        &self,
        device: &Device,
        queue: QueueHandle,
        swap_chain: SwapChainHandle,
        index: usize,
    ) -> RhiResult<()> {
        device.queue_present(
            queue,
            &QueuePresentDesc {
                swap_chain,
                wait_semaphores: vec![self.render_complete[index]],
                index: index as u32,
            },
        )
    }

    fn current(&self) -> RhiResult<usize> {
        match self.frame_index {
            Some(index) => Ok(index as usize),
            None => Err(RhiError::InvalidParameter("no image acquired".into())),
        }
    }
}
