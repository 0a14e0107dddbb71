//! Unix process management for spinup service launches.

mod service_manager;
mod unix_process_manager;

#[cfg(unix)]
pub use service_manager::{UnixServiceManager, UnixServiceManagerFactory};
pub use unix_process_manager::{UnixProcessHandle, UnixProcessManager, UnixProcessManagerFactory};
