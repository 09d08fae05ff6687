use std::path::PathBuf;

use thiserror::Error;

/// Failure at a GPU API boundary.
///
/// Every variant is fatal to the render thread. Nothing in the engine retries
/// or recovers from these; they propagate out and terminate the process.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Instance, adapter, device or surface could not be created.
    #[error("device creation failed: {0}")]
    DeviceCreation(String),

    /// A buffer, texture, view, pipeline or other device object could not be
    /// created or mapped.
    #[error("failed to create {what}: {reason}")]
    ResourceCreation { what: &'static str, reason: String },

    /// The OS wait primitive failed, or a fence value can never be reached.
    #[error("synchronization failed: {0}")]
    SynchronizationTimeout(String),

    /// A command list could not be closed or the queue rejected it.
    #[error("submission failed: {0}")]
    Submission(String),

    /// The presentation surface rejected acquire, present or resize.
    #[error("present failed: {0}")]
    Present(String),

    /// Compiled shader bytecode could not be read.
    #[error("failed to load shader {}", path.display())]
    ShaderLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl GpuError {
    pub(crate) fn resource(what: &'static str, reason: impl Into<String>) -> Self {
        GpuError::ResourceCreation { what, reason: reason.into() }
    }
}

/// Result type alias for device operations.
pub type GpuResult<T> = std::result::Result<T, GpuError>;
