//! RHI error types.
//!
//! Object creation returns `Err` where a C-style interface would hand back a
//! null handle. Precondition violations (stale handles, recording outside
//! `begin_cmd`/`end_cmd`, mismatched barrier states) are rejected with an
//! `Err` in every build profile instead of being left undefined.

use thiserror::Error;

use crate::types::ResourceState;

/// Errors that can occur in the RHI.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RhiError {
    /// Failed to initialize the renderer or the backend.
    #[error("initialization failed: {0}")]
    InitializationFailed(String),
    /// Failed to create a resource.
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
    /// A requested feature is not supported by the backend.
    #[error("feature not supported: {0}")]
    FeatureNotSupported(String),
    /// Out of GPU memory.
    #[error("out of GPU memory")]
    OutOfMemory,
    /// The GPU device was lost.
    #[error("GPU device lost")]
    DeviceLost,
    /// A handle does not refer to a live object.
    #[error("invalid {kind} handle")]
    InvalidHandle {
        /// Object kind of the handle.
        kind: &'static str,
    },
    /// An invalid parameter was provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// A command buffer call was made in the wrong recording state.
    #[error("invalid command buffer state: {0}")]
    InvalidCmdState(String),
    /// A command buffer was reset while its previous submission is still executing.
    #[error("command buffer is still in flight on the GPU")]
    CmdInFlight,
    /// A resource was accessed by the CPU while the GPU may still use it.
    #[error("resource '{0}' is still in use by the GPU")]
    ResourceInFlight(String),
    /// An object was removed while other live objects still depend on it.
    #[error("{kind} is still referenced by {dependents} live object(s)")]
    ObjectInUse {
        /// Object kind that could not be removed.
        kind: &'static str,
        /// Number of live dependents.
        dependents: u32,
    },
    /// A resource was used in a state that its last barrier did not declare.
    #[error("resource '{resource}' used as {required:?} but its last declared state is {actual:?}")]
    BarrierViolation {
        /// Debug name of the offending resource.
        resource: String,
        /// State the operation requires.
        required: ResourceState,
        /// State the resource was last transitioned to.
        actual: ResourceState,
    },
    /// A binding does not match the declared layout.
    #[error("binding mismatch: {0}")]
    BindingMismatch(String),
    /// A semaphore was waited on without any pending signal operation.
    #[error("semaphore waited on without a pending signal")]
    SemaphoreNotSignaled,
    /// The resource loader has not been initialized on this renderer.
    #[error("resource loader not initialized")]
    LoaderNotInitialized,
    /// The renderer was shut down while objects were still alive.
    #[error("{count} live {kind} object(s) at renderer shutdown")]
    LiveObjects {
        /// First object kind with live objects.
        kind: &'static str,
        /// Number of live objects of that kind.
        count: usize,
    },
    /// A file could not be read.
    #[error("io error: {0}")]
    Io(String),
}

/// Result alias used throughout the RHI.
pub type RhiResult<T> = Result<T, RhiError>;

impl From<std::io::Error> for RhiError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RhiError::OutOfMemory;
        assert_eq!(err.to_string(), "out of GPU memory");

        let err = RhiError::InitializationFailed("no GPU found".to_string());
        assert_eq!(err.to_string(), "initialization failed: no GPU found");
    }

    #[test]
    fn test_barrier_violation_display() {
        let err = RhiError::BarrierViolation {
            resource: "albedo".into(),
            required: ResourceState::SHADER_RESOURCE,
            actual: ResourceState::COPY_DEST,
        };
        let text = err.to_string();
        assert!(text.contains("albedo"));
        assert!(text.contains("SHADER_RESOURCE"));
    }
}
