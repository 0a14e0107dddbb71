#![cfg(windows)]

use crate::WindowsProcessHandle;
use crate::windows_process_manager::WindowsProcessManager;
use anyhow::{Context, Result};
use async_trait::async_trait;
use spinup_core::{
    ProcessHandle, ProcessId, ProcessLifecycle, ProcessManager, ProcessManagerFactory,
    ProcessTermination, ServiceConfig, ServiceProcessManager, ServiceProcessManagerFactory,
    TerminationResult,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Windows implementation of the ServiceProcessManager trait
///
/// Composes the low-level WindowsProcessManager and adds configuration-aware
/// startup, active-process tracking, and emergency cleanup. Tracking stops
/// either when a process is terminated (failed attempt) or released
/// (confirmed startup, ownership handed to the caller).
pub struct WindowsServiceManager {
    /// The underlying platform-specific process manager
    platform_manager: Arc<WindowsProcessManager>,
    /// Thread-safe tracking of active processes
    active_processes: Arc<Mutex<HashMap<ProcessId, String>>>,
    /// Stored service configuration
    config: ServiceConfig,
}

#[async_trait]
impl ServiceProcessManager for WindowsServiceManager {
    type Handle = WindowsProcessHandle;

    fn new(config: &ServiceConfig) -> Self {
        Self {
            platform_manager: Arc::new(
                crate::WindowsProcessManagerFactory::create_process_manager(),
            ),
            active_processes: Arc::new(Mutex::new(HashMap::new())),
            config: config.clone(),
        }
    }

    async fn start_service(&self, log_path: &Path) -> Result<WindowsProcessHandle> {
        let command = &self.config.command;
        let args = &self.config.args;
        let working_dir = self.config.working_directory.as_deref();
        let env = &self.config.env;

        let handle = self
            .platform_manager
            .spawn_service(command, args, working_dir, env, log_path)
            .await
            .with_context(|| format!("Failed to start service with command: {command}"))?;

        if let Some(pid) = handle.get_pid() {
            let mut active = self.active_processes.lock().unwrap();
            active.insert(pid, format!("service:{}", self.config.name));
        }

        Ok(handle)
    }

    async fn terminate_service(&self, handle: &mut WindowsProcessHandle) -> TerminationResult {
        let Some(pid) = handle.get_pid() else {
            return TerminationResult::ProcessNotFound;
        };

        let result = self.platform_manager.terminate_process_tree(pid).await;

        // Reap so no stale handle outlives the attempt
        let _ = self.platform_manager.force_kill(handle).await;

        self.active_processes.lock().unwrap().remove(&pid);
        result
    }

    async fn release_service(&self, handle: &WindowsProcessHandle) {
        if let Some(pid) = handle.get_pid() {
            self.active_processes.lock().unwrap().remove(&pid);
            tracing::info!(
                "released service process {} to the caller, no longer tracked",
                pid.0
            );
        }
    }

    async fn cleanup(&self) -> Result<()> {
        let active_processes = {
            let active = self.active_processes.lock().unwrap();
            active.keys().copied().collect::<Vec<_>>()
        };

        for pid in active_processes {
            let result = self.platform_manager.terminate_process_tree(pid).await;
            match result {
                TerminationResult::Success => {
                    tracing::info!("terminated process tree for PID {}", pid.0);
                }
                TerminationResult::ProcessNotFound => {
                    tracing::info!("process {} already terminated", pid.0);
                }
                other => {
                    tracing::warn!("failed to terminate process {}: {:?}", pid.0, other);
                }
            }
        }

        self.active_processes.lock().unwrap().clear();

        self.platform_manager.cleanup().await
    }
}

impl Drop for WindowsServiceManager {
    fn drop(&mut self) {
        // Emergency cleanup: anything still tracked here was neither
        // released nor terminated, so it must not outlive the manager.
        let active_processes = {
            let active = self.active_processes.lock().unwrap();
            active.keys().copied().collect::<Vec<_>>()
        };

        if !active_processes.is_empty() {
            tracing::warn!(
                "emergency cleanup: terminating {} processes during drop",
                active_processes.len()
            );

            for pid in active_processes {
                let result = std::process::Command::new("taskkill")
                    .args(["/PID", &pid.0.to_string(), "/T", "/F"])
                    .output();
                if let Err(e) = result {
                    tracing::warn!(
                        "failed to taskkill process {} during drop: {}",
                        pid.0,
                        e
                    );
                }
            }
        }
    }
}

/// Factory for creating Windows ServiceProcessManager instances
pub struct WindowsServiceManagerFactory;

#[async_trait]
impl ServiceProcessManagerFactory for WindowsServiceManagerFactory {
    type Manager = WindowsServiceManager;

    fn create_process_manager(config: &ServiceConfig) -> Self::Manager {
        WindowsServiceManager::new(config)
    }
}
