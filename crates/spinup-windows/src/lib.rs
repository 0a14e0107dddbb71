//! Windows process management for spinup service launches.

mod service_manager;
mod windows_process_manager;

#[cfg(windows)]
pub use service_manager::{WindowsServiceManager, WindowsServiceManagerFactory};
pub use windows_process_manager::{
    WindowsProcessHandle, WindowsProcessManager, WindowsProcessManagerFactory,
};
