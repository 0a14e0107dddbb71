use spinup_core::{ServiceConfig, ServiceProcessManager, ServiceProcessManagerFactory};

#[cfg(unix)]
pub type PlatformServiceManager = spinup_unix::UnixServiceManager;

#[cfg(windows)]
pub type PlatformServiceManager = spinup_windows::WindowsServiceManager;

#[cfg(not(any(unix, windows)))]
compile_error!("Unsupported platform: only Unix and Windows are currently supported");

/// Handle type produced by the platform's service manager
pub type PlatformHandle = <PlatformServiceManager as ServiceProcessManager>::Handle;

/// Compile-time selection of the platform service manager
pub struct PlatformServiceManagerFactory;

impl PlatformServiceManagerFactory {
    pub fn create_process_manager(config: &ServiceConfig) -> PlatformServiceManager {
        #[cfg(unix)]
        {
            spinup_unix::UnixServiceManagerFactory::create_process_manager(config)
        }

        #[cfg(windows)]
        {
            spinup_windows::WindowsServiceManagerFactory::create_process_manager(config)
        }
    }

    pub fn platform_name() -> &'static str {
        #[cfg(unix)]
        {
            use spinup_core::ProcessManagerFactory;
            spinup_unix::UnixProcessManagerFactory::platform_name()
        }

        #[cfg(windows)]
        {
            use spinup_core::ProcessManagerFactory;
            spinup_windows::WindowsProcessManagerFactory::platform_name()
        }
    }
}
