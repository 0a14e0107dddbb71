//! spinup - launch server processes and wait for log-confirmed readiness
//!
//! Starts a long-running service (originally an ML model-serving HTTP
//! endpoint) as a detached child process, captures its output to a log
//! file, and polls the log for a readiness marker. Failed attempts -
//! premature exit or startup timeout - are forcefully cleaned up and
//! retried up to a configurable cap.

mod model_server;
mod platform;
mod service_launcher;

pub use model_server::{
    DEFAULT_MAX_MODEL_LEN, DEFAULT_MODEL, DEFAULT_PORT, ModelServer, READY_MARKER,
};
pub use platform::{PlatformHandle, PlatformServiceManager, PlatformServiceManagerFactory};
pub use service_launcher::{ServiceLauncher, derive_log_path};

// Re-export the core surface so binary and tests use one crate
pub use spinup_core::{
    LaunchError, Launched, Launcher, LogWatcher, ProcessHandle, ProcessStatus, RetryPolicy,
    ServiceConfig, ServiceProcessManager,
};
