//! GPU synchronization primitives.
//!
//! These are the backend-side halves of the fence, semaphore and queue
//! timeline objects. The renderer owns them through handles. Backends
//! signal them from their GPU timeline.
//!
//! - [`Fence`]: CPU-observable completion of one submission.
//! - [`Semaphore`]: GPU-GPU ordering between queue operations.
//! - [`QueueTimeline`]: monotonically increasing submission counter of a queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::error::{RhiError, RhiResult};
use crate::types::FenceStatus;

#[derive(Debug)]
struct FenceInner {
    status: Mutex<FenceStatus>,
    cond: Condvar,
}

/// CPU-GPU synchronization primitive.
///
/// A fence is attached to at most one in-flight submission. It starts as
/// [`FenceStatus::NotSubmitted`], becomes [`FenceStatus::Incomplete`] when
/// submitted and [`FenceStatus::Complete`] when the GPU has finished the
/// batch. It stays complete until it is submitted again.
#[derive(Debug, Clone)]
pub struct Fence {
    inner: Arc<FenceInner>,
}

impl Default for Fence {
    fn default() -> Self {
        Self::new()
    }
}

impl Fence {
    /// Create a fence that was never submitted.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(FenceInner {
                status: Mutex::new(FenceStatus::NotSubmitted),
                cond: Condvar::new(),
            }),
        }
    }

    /// Current status of the fence.
    pub fn status(&self) -> FenceStatus {
        *self.inner.status.lock()
    }

    /// Attach the fence to a new submission.
    pub(crate) fn mark_submitted(&self) -> RhiResult<()> {
        let mut status = self.inner.status.lock();
        if *status == FenceStatus::Incomplete {
            return Err(RhiError::InvalidParameter(
                "fence is already attached to an in-flight submission".into(),
            ));
        }
        *status = FenceStatus::Incomplete;
        Ok(())
    }

    /// Signal the fence (GPU side).
    pub(crate) fn signal(&self) {
        let mut status = self.inner.status.lock();
        *status = FenceStatus::Complete;
        self.inner.cond.notify_all();
    }

    /// Block until the fence is no longer in flight.
    ///
    /// Returns immediately for fences that were never submitted.
    pub fn wait(&self) {
        let mut status = self.inner.status.lock();
        while *status == FenceStatus::Incomplete {
            self.inner.cond.wait(&mut status);
        }
    }
}

#[derive(Debug, Default)]
struct SemaphoreState {
    /// Signal operations scheduled by the CPU.
    scheduled_signals: u64,
    /// Wait operations scheduled by the CPU.
    scheduled_waits: u64,
    /// Signal operations executed by the GPU.
    signaled: u64,
}

#[derive(Debug, Default)]
struct SemaphoreInner {
    state: Mutex<SemaphoreState>,
    cond: Condvar,
}

/// GPU-only ordering primitive.
///
/// Every wait consumes one signal. Waits are matched to signals in order:
/// the n-th scheduled wait is satisfied by the n-th executed signal. A wait
/// can only be scheduled when a matching signal is already scheduled, which
/// rules out waits that could never complete.
#[derive(Debug, Clone, Default)]
pub struct Semaphore {
    inner: Arc<SemaphoreInner>,
}

impl Semaphore {
    /// Create an unsignaled semaphore.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a wait scheduled now would have a matching signal.
    pub fn has_pending_signal(&self) -> bool {
        let state = self.inner.state.lock();
        state.scheduled_waits < state.scheduled_signals
    }

    /// Record that a signal operation was enqueued.
    pub(crate) fn schedule_signal(&self) {
        self.inner.state.lock().scheduled_signals += 1;
    }

    /// Record that a wait operation was enqueued.
    ///
    /// Returns the signal count the GPU must reach before the wait is
    /// satisfied.
    pub(crate) fn schedule_wait(&self) -> RhiResult<u64> {
        let mut state = self.inner.state.lock();
        if state.scheduled_waits >= state.scheduled_signals {
            return Err(RhiError::SemaphoreNotSignaled);
        }
        state.scheduled_waits += 1;
        Ok(state.scheduled_waits)
    }

    /// Execute one signal operation (GPU side).
    pub(crate) fn signal(&self) {
        let mut state = self.inner.state.lock();
        state.signaled += 1;
        self.inner.cond.notify_all();
    }

    /// Block until `target` signals have executed (GPU side).
    pub(crate) fn wait_for(&self, target: u64) {
        let mut state = self.inner.state.lock();
        while state.signaled < target {
            self.inner.cond.wait(&mut state);
        }
    }
}

/// Submission timeline of one queue.
///
/// Every submission and present gets the next id. The GPU side completes
/// ids in order, so "id `n` completed" implies every earlier id completed.
#[derive(Debug, Default)]
pub struct QueueTimeline {
    submitted: AtomicU64,
    completed: Mutex<u64>,
    cond: Condvar,
}

impl QueueTimeline {
    /// Create an idle timeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the id of the next submission.
    pub(crate) fn next_id(&self) -> u64 {
        self.submitted.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Id of the last enqueued submission.
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Acquire)
    }

    /// Id of the last completed submission.
    pub fn completed(&self) -> u64 {
        *self.completed.lock()
    }

    /// Returns true if submission `id` has finished.
    pub fn is_complete(&self, id: u64) -> bool {
        self.completed() >= id
    }

    /// Mark submission `id` as finished (GPU side).
    pub(crate) fn complete(&self, id: u64) {
        let mut completed = self.completed.lock();
        if id > *completed {
            *completed = id;
        }
        self.cond.notify_all();
    }

    /// Block until submission `id` has finished.
    pub fn wait_for(&self, id: u64) {
        let mut completed = self.completed.lock();
        while *completed < id {
            self.cond.wait(&mut completed);
        }
    }

    /// Block until everything submitted so far has finished.
    pub fn wait_idle(&self) {
        self.wait_for(self.submitted());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fence_lifecycle() {
        let fence = Fence::new();
        assert_eq!(fence.status(), FenceStatus::NotSubmitted);
        // Waiting on an unsubmitted fence returns immediately
        fence.wait();

        fence.mark_submitted().unwrap();
        assert_eq!(fence.status(), FenceStatus::Incomplete);
        assert!(fence.mark_submitted().is_err());

        fence.signal();
        assert_eq!(fence.status(), FenceStatus::Complete);
        assert_eq!(fence.status(), FenceStatus::Complete);
    }

    #[test]
    fn test_fence_signal_and_wait() {
        let fence = Fence::new();
        fence.mark_submitted().unwrap();

        // Simulate GPU signaling from another thread
        let fence_clone = fence.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            fence_clone.signal();
        });

        fence.wait();
        assert_eq!(fence.status(), FenceStatus::Complete);
    }

    #[test]
    fn test_semaphore_wait_requires_signal() {
        let sem = Semaphore::new();
        assert_eq!(sem.schedule_wait(), Err(RhiError::SemaphoreNotSignaled));

        sem.schedule_signal();
        assert!(sem.has_pending_signal());
        assert_eq!(sem.schedule_wait(), Ok(1));
        assert!(!sem.has_pending_signal());
    }

    #[test]
    fn test_semaphore_wait_for_signal() {
        let sem = Semaphore::new();
        sem.schedule_signal();
        sem.schedule_signal();
        let first = sem.schedule_wait().unwrap();
        let second = sem.schedule_wait().unwrap();
        assert_eq!((first, second), (1, 2));

        let gpu = sem.clone();
        let handle = std::thread::spawn(move || {
            gpu.signal();
            gpu.signal();
        });
        sem.wait_for(second);
        handle.join().unwrap();
    }

    #[test]
    fn test_timeline_ordering() {
        let timeline = Arc::new(QueueTimeline::new());
        let a = timeline.next_id();
        let b = timeline.next_id();
        assert_eq!((a, b), (1, 2));
        assert!(!timeline.is_complete(a));

        let gpu = Arc::clone(&timeline);
        std::thread::spawn(move || {
            gpu.complete(a);
            std::thread::sleep(Duration::from_millis(5));
            gpu.complete(b);
        });
        timeline.wait_idle();
        assert!(timeline.is_complete(b));
        assert_eq!(timeline.completed(), 2);
    }
}
