//! Queues, command pools, command buffers, fences and semaphores.
//!
//! Submission is the point where recorded commands meet the GPU timeline:
//! `queue_submit` validates the batch, replays barrier states, resolves
//! handles to backend storage and enqueues the work without blocking.

use std::sync::Arc;

use crate::backend::{GpuCommand, PresentBatch, SubmitBatch};
use crate::barrier::StateValidator;
use crate::error::{RhiError, RhiResult};
use crate::handle::{CmdHandle, CmdPoolHandle, FenceHandle, QueueHandle, SemaphoreHandle};
use crate::sync::{Fence, QueueTimeline, Semaphore};
use crate::types::{
    CmdDesc, CmdPoolDesc, FenceStatus, QueueDesc, QueuePresentDesc, QueueSubmitDesc, ResourceState,
    MAX_PRESENT_WAIT_SEMAPHORES, MAX_SUBMIT_CMDS, MAX_SUBMIT_SIGNAL_SEMAPHORES,
    MAX_SUBMIT_WAIT_SEMAPHORES,
};

use super::command::Command;
use super::objects::{
    CmdObject, CmdPoolObject, CmdState, FenceObject, GpuUse, Objects, QueueObject,
    RecordingState, SemaphoreObject,
};
use super::Device;

fn check_count(count: usize, max: usize, what: &str) -> RhiResult<()> {
    if count > max {
        return Err(RhiError::InvalidParameter(format!(
            "{count} {what}, maximum is {max}"
        )));
    }
    Ok(())
}

/// Semaphores a queue operation waits on, checked for a pending signal.
fn wait_semaphores(objects: &Objects, handles: &[SemaphoreHandle]) -> RhiResult<Vec<Semaphore>> {
    let mut semaphores = Vec::with_capacity(handles.len());
    for (i, &handle) in handles.iter().enumerate() {
        if handles[..i].contains(&handle) {
            return Err(RhiError::InvalidParameter("semaphore waited on twice".into()));
        }
        let semaphore = &objects.semaphores.get(handle)?.semaphore;
        if !semaphore.has_pending_signal() {
            return Err(RhiError::SemaphoreNotSignaled);
        }
        semaphores.push(semaphore.clone());
    }
    Ok(semaphores)
}

fn schedule_waits(semaphores: Vec<Semaphore>) -> RhiResult<Vec<(Semaphore, u64)>> {
    semaphores
        .into_iter()
        .map(|semaphore| {
            let target = semaphore.schedule_wait()?;
            Ok((semaphore, target))
        })
        .collect()
}

/// Resolve the commands of a command buffer to backend work.
fn translate(objects: &Objects, commands: &[Command], out: &mut Vec<GpuCommand>) -> RhiResult<()> {
    for command in commands {
        let gpu = match command {
            Command::ResourceBarrier(barriers) => GpuCommand::Barrier {
                count: barriers.len(),
            },
            Command::Draw {
                vertex_count,
                instance_count,
                ..
            } => GpuCommand::Draw {
                count: *vertex_count,
                instances: *instance_count,
            },
            Command::DrawIndexed {
                index_count,
                instance_count,
                ..
            } => GpuCommand::Draw {
                count: *index_count,
                instances: *instance_count,
            },
            Command::Dispatch { groups } => GpuCommand::Dispatch { groups: *groups },
            Command::ExecuteIndirect { max_count, .. } => GpuCommand::ExecuteIndirect {
                max_count: *max_count,
            },
            Command::UpdateBuffer {
                dst,
                dst_offset,
                src,
                src_offset,
                size,
            } => GpuCommand::CopyBuffer {
                src: Arc::clone(&objects.buffers.get(*src)?.storage),
                src_offset: *src_offset,
                dst: Arc::clone(&objects.buffers.get(*dst)?.storage),
                dst_offset: *dst_offset,
                size: *size,
            },
            Command::UpdateSubresource { texture, src, desc } => GpuCommand::CopyBufferToTexture {
                src: Arc::clone(&objects.buffers.get(*src)?.storage),
                dst: Arc::clone(&objects.textures.get(*texture)?.storage),
                region: *desc,
            },
            Command::ResolveQuery {
                pool,
                readback,
                count,
                ..
            } => GpuCommand::ResolveQuery {
                dst: Arc::clone(&objects.buffers.get(*readback)?.storage),
                offset: 0,
                count: *count,
                result_size: objects.query_pools.get(*pool)?.desc.query_type.result_size(),
            },
            _ => continue,
        };
        out.push(gpu);
    }
    Ok(())
}

impl Device {
    /// Create a queue.
    pub fn add_queue(&self, desc: &QueueDesc) -> RhiResult<QueueHandle> {
        let timeline = Arc::new(QueueTimeline::new());
        let gpu = self.backend.create_queue(desc, Arc::clone(&timeline))?;
        let handle = self.objects.write().queues.insert(QueueObject {
            desc: *desc,
            gpu,
            timeline,
        });
        log::trace!("Added {:?} queue {:?}", desc.queue_type, handle);
        Ok(handle)
    }

    /// Destroy a queue. Waits for its outstanding work.
    pub fn remove_queue(&self, queue: QueueHandle) -> RhiResult<()> {
        let removed = self.objects.write().queues.remove(queue)?;
        removed.gpu.wait_idle();
        log::trace!("Removed queue {:?}", queue);
        Ok(())
    }

    /// Descriptor of a queue.
    pub fn queue_desc(&self, queue: QueueHandle) -> RhiResult<QueueDesc> {
        Ok(self.objects.read().queues.get(queue)?.desc)
    }

    /// Block until everything submitted to `queue` has executed.
    pub fn wait_queue_idle(&self, queue: QueueHandle) -> RhiResult<()> {
        let gpu = Arc::clone(&self.objects.read().queues.get(queue)?.gpu);
        gpu.wait_idle();
        Ok(())
    }

    /// Submission timeline of a queue.
    pub fn queue_timeline(&self, queue: QueueHandle) -> RhiResult<Arc<QueueTimeline>> {
        Ok(Arc::clone(&self.objects.read().queues.get(queue)?.timeline))
    }

    /// Create a command pool on a queue.
    pub fn add_cmd_pool(&self, desc: &CmdPoolDesc) -> RhiResult<CmdPoolHandle> {
        let mut objects = self.objects.write();
        objects.queues.retain(desc.queue)?;
        Ok(objects.cmd_pools.insert(CmdPoolObject { desc: *desc }))
    }

    /// Destroy a command pool whose command buffers are all removed.
    pub fn remove_cmd_pool(&self, pool: CmdPoolHandle) -> RhiResult<()> {
        let mut objects = self.objects.write();
        let removed = objects.cmd_pools.remove(pool)?;
        objects.queues.release(removed.desc.queue);
        Ok(())
    }

    /// Allocate a command buffer.
    pub fn add_cmd(&self, desc: &CmdDesc) -> RhiResult<CmdHandle> {
        let mut objects = self.objects.write();
        let queue = objects.cmd_pools.get(desc.pool)?.desc.queue;
        objects.cmd_pools.retain(desc.pool)?;
        Ok(objects.cmds.insert(CmdObject {
            pool: desc.pool,
            queue,
            state: CmdState::Initial,
            commands: Vec::new(),
            recording: RecordingState::default(),
            submission: None,
        }))
    }

    /// Allocate `count` command buffers, for example one per swap chain image.
    pub fn add_cmd_n(&self, desc: &CmdDesc, count: u32) -> RhiResult<Vec<CmdHandle>> {
        if count == 0 {
            return Err(RhiError::InvalidParameter("command buffer count must be nonzero".into()));
        }
        (0..count).map(|_| self.add_cmd(desc)).collect()
    }

    /// Free a command buffer that is not executing.
    pub fn remove_cmd(&self, cmd: CmdHandle) -> RhiResult<()> {
        let mut objects = self.objects.write();
        let object = objects.cmds.get(cmd)?;
        if object.submission.as_ref().is_some_and(|s| !s.is_complete()) {
            return Err(RhiError::CmdInFlight);
        }
        let removed = objects.cmds.remove(cmd)?;
        objects.cmd_pools.release(removed.pool);
        Ok(())
    }

    /// Free several command buffers.
    pub fn remove_cmd_n(&self, cmds: &[CmdHandle]) -> RhiResult<()> {
        cmds.iter().try_for_each(|&cmd| self.remove_cmd(cmd))
    }

    /// Create a fence.
    pub fn add_fence(&self) -> RhiResult<FenceHandle> {
        Ok(self.objects.write().fences.insert(FenceObject { fence: Fence::new() }))
    }

    /// Destroy a fence.
    pub fn remove_fence(&self, fence: FenceHandle) -> RhiResult<()> {
        self.objects.write().fences.remove(fence)?;
        Ok(())
    }

    /// Create a semaphore.
    pub fn add_semaphore(&self) -> RhiResult<SemaphoreHandle> {
        Ok(self.objects.write().semaphores.insert(SemaphoreObject {
            semaphore: Semaphore::new(),
        }))
    }

    /// Destroy a semaphore.
    pub fn remove_semaphore(&self, semaphore: SemaphoreHandle) -> RhiResult<()> {
        self.objects.write().semaphores.remove(semaphore)?;
        Ok(())
    }

    /// Status of a fence. Has no side effects.
    pub fn get_fence_status(&self, fence: FenceHandle) -> RhiResult<FenceStatus> {
        Ok(self.objects.read().fences.get(fence)?.fence.status())
    }

    /// Block until every submitted fence in `fences` has completed.
    ///
    /// Fences that were never submitted are skipped. There is no timeout.
    pub fn wait_for_fences(&self, fences: &[FenceHandle]) -> RhiResult<()> {
        let fences = {
            let objects = self.objects.read();
            fences
                .iter()
                .map(|&f| Ok(objects.fences.get(f)?.fence.clone()))
                .collect::<RhiResult<Vec<Fence>>>()?
        };
        for fence in &fences {
            fence.wait();
        }
        Ok(())
    }

    /// Submit executable command buffers to `queue`.
    ///
    /// Every wait semaphore needs a pending signal. With validation on,
    /// the recorded barrier states are checked and a violation rejects the
    /// whole batch without changing anything. The call never blocks on GPU
    /// work.
    pub fn queue_submit(&self, queue: QueueHandle, desc: &QueueSubmitDesc) -> RhiResult<()> {
        if desc.cmds.is_empty() {
            return Err(RhiError::InvalidParameter("submission without command buffers".into()));
        }
        check_count(desc.cmds.len(), MAX_SUBMIT_CMDS, "command buffers submitted")?;
        check_count(desc.wait_semaphores.len(), MAX_SUBMIT_WAIT_SEMAPHORES, "wait semaphores")?;
        check_count(desc.signal_semaphores.len(), MAX_SUBMIT_SIGNAL_SEMAPHORES, "signal semaphores")?;

        let mut guard = self.objects.write();
        let objects = &mut *guard;

        let queue_object = objects.queues.get(queue)?;
        let gpu = Arc::clone(&queue_object.gpu);
        let timeline = Arc::clone(&queue_object.timeline);

        for (i, &cmd) in desc.cmds.iter().enumerate() {
            let object = objects.cmds.get(cmd)?;
            if object.state != CmdState::Executable {
                return Err(RhiError::InvalidCmdState(format!(
                    "command buffer is {:?}, expected Executable",
                    object.state
                )));
            }
            if object.queue != queue {
                return Err(RhiError::InvalidParameter(
                    "command buffer was allocated for a different queue".into(),
                ));
            }
            if desc.cmds[..i].contains(&cmd) {
                return Err(RhiError::InvalidParameter("command buffer submitted twice".into()));
            }
        }

        let fence = match desc.signal_fence {
            Some(handle) => {
                let fence = objects.fences.get(handle)?.fence.clone();
                if fence.status() == FenceStatus::Incomplete {
                    return Err(RhiError::InvalidParameter(
                        "fence is already attached to an in-flight submission".into(),
                    ));
                }
                Some(fence)
            }
            None => None,
        };
        let waits = wait_semaphores(objects, &desc.wait_semaphores)?;
        let signals = desc
            .signal_semaphores
            .iter()
            .map(|&s| Ok(objects.semaphores.get(s)?.semaphore.clone()))
            .collect::<RhiResult<Vec<Semaphore>>>()?;

        let mut validator = StateValidator::new(objects, self.desc.validation);
        let mut commands = Vec::new();
        for &cmd in &desc.cmds {
            let recorded = &objects.cmds.get(cmd)?.commands;
            validator.replay(recorded)?;
            translate(objects, recorded, &mut commands)?;
        }
        let (states, used) = validator.finish();

        // Nothing below can fail on a validated batch
        for (key, (state, pending)) in states {
            objects.set_state(key, state, pending)?;
        }
        let id = timeline.next_id();
        let gpu_use = GpuUse {
            timeline: Arc::clone(&timeline),
            id,
        };
        for key in used {
            objects.stamp_use(key, &gpu_use);
        }
        for &cmd in &desc.cmds {
            let object = objects.cmds.get_mut(cmd)?;
            object.state = CmdState::Submitted;
            object.submission = Some(gpu_use.clone());
        }
        if let Some(fence) = &fence {
            fence.mark_submitted()?;
        }
        let waits = schedule_waits(waits)?;
        for semaphore in &signals {
            semaphore.schedule_signal();
        }

        log::trace!(
            "Submitting {} command buffer(s) as {} on {:?}",
            desc.cmds.len(),
            id,
            queue
        );
        // Enqueued under the lock so ids reach the queue in order
        gpu.submit(SubmitBatch {
            id,
            commands,
            waits,
            signals,
            fence,
            timeline,
        })
    }

    /// Present a swap chain image on `queue`.
    ///
    /// The image must have been acquired. With validation on it must be in
    /// the `PRESENT` state.
    pub fn queue_present(&self, queue: QueueHandle, desc: &QueuePresentDesc) -> RhiResult<()> {
        check_count(desc.wait_semaphores.len(), MAX_PRESENT_WAIT_SEMAPHORES, "present wait semaphores")?;

        let mut guard = self.objects.write();
        let objects = &mut *guard;

        let queue_object = objects.queues.get(queue)?;
        let gpu = Arc::clone(&queue_object.gpu);
        let timeline = Arc::clone(&queue_object.timeline);

        let swap_chain = objects.swap_chains.get(desc.swap_chain)?;
        if !swap_chain.present_queues.contains(&queue) {
            return Err(RhiError::InvalidParameter(
                "queue is not a present queue of the swap chain".into(),
            ));
        }
        let index = desc.index as usize;
        let Some(&render_target) = swap_chain.render_targets.get(index) else {
            return Err(RhiError::InvalidParameter(format!(
                "image index {} out of range ({} images)",
                desc.index,
                swap_chain.render_targets.len()
            )));
        };
        if !swap_chain.acquired[index] {
            return Err(RhiError::InvalidParameter(format!(
                "image {} was not acquired",
                desc.index
            )));
        }
        let swap_chain_gpu = Arc::clone(&swap_chain.gpu);

        let key = objects.render_target_key(render_target)?;
        if self.desc.validation {
            let (state, pending) = objects.state(key)?;
            if pending.is_some() || state != ResourceState::PRESENT {
                return Err(RhiError::BarrierViolation {
                    resource: objects.name(key),
                    required: ResourceState::PRESENT,
                    actual: state,
                });
            }
        }
        let waits = wait_semaphores(objects, &desc.wait_semaphores)?;

        let waits = schedule_waits(waits)?;
        let id = timeline.next_id();
        objects.stamp_use(
            key,
            &GpuUse {
                timeline: Arc::clone(&timeline),
                id,
            },
        );
        objects.swap_chains.get_mut(desc.swap_chain)?.acquired[index] = false;
        gpu.present(PresentBatch {
            id,
            swap_chain: swap_chain_gpu,
            index: desc.index,
            waits,
            timeline,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::renderer::{Renderer, RendererDesc};
    use crate::types::{CmdDesc, CmdPoolDesc, FenceStatus, QueueDesc, QueueSubmitDesc, QueueType};
    use crate::RhiError;

    fn renderer() -> Renderer {
        Renderer::new("queue-test", &RendererDesc::default().with_validation(true)).unwrap()
    }

    #[test]
    fn test_cmd_state_machine() {
        let renderer = renderer();
        let queue = renderer.add_queue(&QueueDesc::new(QueueType::Graphics)).unwrap();
        let pool = renderer.add_cmd_pool(&CmdPoolDesc::new(queue)).unwrap();
        let cmd = renderer.add_cmd(&CmdDesc::new(pool)).unwrap();
        let fence = renderer.add_fence().unwrap();

        // Recording outside begin/end is rejected
        assert!(matches!(
            renderer.cmd_add_debug_marker(cmd, [1.0, 0.0, 0.0], "outside"),
            Err(RhiError::InvalidCmdState(_))
        ));
        assert!(matches!(renderer.end_cmd(cmd), Err(RhiError::InvalidCmdState(_))));

        renderer.begin_cmd(cmd).unwrap();
        assert!(matches!(renderer.begin_cmd(cmd), Err(RhiError::InvalidCmdState(_))));
        renderer.cmd_add_debug_marker(cmd, [1.0, 0.0, 0.0], "frame").unwrap();
        renderer.end_cmd(cmd).unwrap();

        assert_eq!(renderer.get_fence_status(fence).unwrap(), FenceStatus::NotSubmitted);
        renderer
            .queue_submit(
                queue,
                &QueueSubmitDesc {
                    cmds: vec![cmd],
                    signal_fence: Some(fence),
                    ..Default::default()
                },
            )
            .unwrap();
        renderer.wait_for_fences(&[fence]).unwrap();
        assert_eq!(renderer.get_fence_status(fence).unwrap(), FenceStatus::Complete);
        // Completed submissions can be re-recorded
        renderer.begin_cmd(cmd).unwrap();
        renderer.end_cmd(cmd).unwrap();

        renderer.remove_fence(fence).unwrap();
        renderer.remove_cmd(cmd).unwrap();
        renderer.remove_cmd_pool(pool).unwrap();
        renderer.remove_queue(queue).unwrap();
        renderer.shutdown().unwrap();
    }

    #[test]
    fn test_reverse_order_teardown_enforced() {
        let renderer = renderer();
        let queue = renderer.add_queue(&QueueDesc::new(QueueType::Graphics)).unwrap();
        let pool = renderer.add_cmd_pool(&CmdPoolDesc::new(queue)).unwrap();
        let cmds = renderer.add_cmd_n(&CmdDesc::new(pool), 3).unwrap();

        assert!(matches!(
            renderer.remove_queue(queue),
            Err(RhiError::ObjectInUse { dependents: 1, .. })
        ));
        assert!(matches!(
            renderer.remove_cmd_pool(pool),
            Err(RhiError::ObjectInUse { dependents: 3, .. })
        ));

        renderer.remove_cmd_n(&cmds).unwrap();
        renderer.remove_cmd_pool(pool).unwrap();
        renderer.remove_queue(queue).unwrap();
        // Stale handles are detected
        assert!(matches!(
            renderer.remove_queue(queue),
            Err(RhiError::InvalidHandle { .. })
        ));
        renderer.shutdown().unwrap();
    }

    #[test]
    fn test_wait_semaphore_requires_signal() {
        let renderer = renderer();
        let queue = renderer.add_queue(&QueueDesc::new(QueueType::Graphics)).unwrap();
        let pool = renderer.add_cmd_pool(&CmdPoolDesc::new(queue)).unwrap();
        let cmd = renderer.add_cmd(&CmdDesc::new(pool)).unwrap();
        let semaphore = renderer.add_semaphore().unwrap();

        renderer.begin_cmd(cmd).unwrap();
        renderer.end_cmd(cmd).unwrap();
        let result = renderer.queue_submit(
            queue,
            &QueueSubmitDesc {
                cmds: vec![cmd],
                wait_semaphores: vec![semaphore],
                ..Default::default()
            },
        );
        assert_eq!(result, Err(RhiError::SemaphoreNotSignaled));
        // The rejected batch left the command buffer executable
        assert_eq!(renderer.cmd_state(cmd).unwrap(), crate::CmdState::Executable);

        renderer.remove_semaphore(semaphore).unwrap();
        renderer.remove_cmd(cmd).unwrap();
        renderer.remove_cmd_pool(pool).unwrap();
        renderer.remove_queue(queue).unwrap();
        renderer.shutdown().unwrap();
    }

    #[test]
    fn test_shutdown_reports_live_objects() {
        let renderer = renderer();
        let _queue = renderer.add_queue(&QueueDesc::new(QueueType::Graphics)).unwrap();
        assert_eq!(
            renderer.shutdown(),
            Err(RhiError::LiveObjects {
                kind: "queue",
                count: 1
            })
        );
    }
}
