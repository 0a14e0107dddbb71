use crate::config::ServiceConfig;
use crate::process::{ProcessHandle, TerminationResult};
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

/// High-level process manager trait for platform-independent service launches
///
/// This trait sits above the low-level [`crate::process`] traits: it is
/// configuration-aware, tracks the processes it started, and can tear all of
/// them down. Platform crates implement it by composing their low-level
/// process manager, and the launch engine is written against it so the retry
/// logic can be driven by a scripted fake in tests.
///
/// Implementations should:
/// - Internally use the low-level process traits for actual process operations
/// - Maintain active process tracking with appropriate synchronization
/// - Provide emergency cleanup in Drop implementations
#[async_trait]
pub trait ServiceProcessManager: Send + Sync {
    /// The type of process handle returned by this process manager
    type Handle: ProcessHandle;

    /// Create a new process manager instance with the given configuration
    ///
    /// The configuration is stored internally and used by `start_service()`.
    fn new(config: &ServiceConfig) -> Self
    where
        Self: Sized;

    /// Start the service process using the configuration provided during
    /// construction, with stdout/stderr captured into `log_path`.
    ///
    /// The started process is tracked for cleanup until it is either
    /// released (confirmed startup) or terminated (failed attempt).
    async fn start_service(&self, log_path: &Path) -> Result<Self::Handle>;

    /// Forcefully terminate a service process and everything it spawned.
    ///
    /// Used on the timeout path of a launch attempt, where teardown must be
    /// immediate rather than graceful, and after an observed exit to sweep
    /// up any surviving members of the child's process group. The process
    /// is removed from tracking.
    async fn terminate_service(&self, handle: &mut Self::Handle) -> TerminationResult;

    /// Stop tracking a service process without terminating it.
    ///
    /// Called once startup is confirmed: lifecycle ownership passes to the
    /// caller and the manager must no longer touch the process, not even
    /// from its Drop cleanup.
    async fn release_service(&self, handle: &Self::Handle);

    /// Terminate all tracked processes and release resources
    async fn cleanup(&self) -> Result<()>;
}

/// Factory trait for creating platform-specific ServiceProcessManager
/// implementations
#[async_trait]
pub trait ServiceProcessManagerFactory {
    /// The type of process manager this factory creates
    type Manager: ServiceProcessManager;

    /// Create a new process manager instance for the current platform
    fn create_process_manager(config: &ServiceConfig) -> Self::Manager;
}
