use crate::platform::{PlatformHandle, PlatformServiceManager, PlatformServiceManagerFactory};
use spinup_core::{LaunchError, Launched, Launcher, RetryPolicy, ServiceConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Derive the per-service log path from the workload name, the port it
/// serves on, and the machine's host name.
pub fn derive_log_path(log_dir: &Path, service: &str, port: Option<u16>) -> PathBuf {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "localhost".to_string());

    let file_name = match port {
        Some(port) => format!("{service}-{port}-{host}.log"),
        None => format!("{service}-{host}.log"),
    };
    log_dir.join(file_name)
}

/// Launches a configured service on the current platform.
///
/// Thin composition layer: picks the platform process manager, hands it to
/// the core [`Launcher`], and returns the confirmed-running service. On
/// success the child process keeps running after this returns (and after
/// this program exits - it lives in its own process group).
pub struct ServiceLauncher {
    config: ServiceConfig,
    policy: RetryPolicy,
}

impl ServiceLauncher {
    pub fn new(config: ServiceConfig, policy: RetryPolicy) -> Self {
        Self { config, policy }
    }

    pub async fn launch(self) -> Result<Launched<PlatformHandle>, LaunchError> {
        info!(
            service = %self.config.name,
            platform = PlatformServiceManagerFactory::platform_name(),
            attempts = self.policy.max_attempts,
            "launching service"
        );

        let manager: Arc<PlatformServiceManager> = Arc::new(
            PlatformServiceManagerFactory::create_process_manager(&self.config),
        );
        Launcher::new(self.config, self.policy, manager)?.launch().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_log_path_includes_service_port_and_host() {
        let path = derive_log_path(Path::new("/var/log/spinup"), "opt-125m", Some(8000));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("opt-125m-8000-"));
        assert!(name.ends_with(".log"));
        assert!(path.starts_with("/var/log/spinup"));
    }

    #[test]
    fn test_derive_log_path_without_port() {
        let path = derive_log_path(Path::new("logs"), "worker", None);
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("worker-"));
        assert!(!name.contains("worker-8000"));
    }
}
