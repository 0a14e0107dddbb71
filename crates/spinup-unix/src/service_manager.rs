#![cfg(unix)]

use crate::UnixProcessHandle;
use crate::unix_process_manager::UnixProcessManager;
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

/// Unix implementation of the ServiceProcessManager trait
///
/// Composes the low-level UnixProcessManager and adds configuration-aware
/// startup, active-process tracking, and emergency cleanup. Tracking stops
/// either when a process is terminated (failed attempt) or released
/// (confirmed startup, ownership handed to the caller).
pub struct UnixServiceManager {
    /// The underlying platform-specific process manager
    platform_manager: Arc<UnixProcessManager>,
    /// Thread-safe tracking of active processes
    active_processes: Arc<Mutex<HashMap<ProcessId, String>>>,
    /// Stored service configuration
    config: ServiceConfig,
}

#[async_trait]
impl ServiceProcessManager for UnixServiceManager {
    type Handle = UnixProcessHandle;

    fn new(config: &ServiceConfig) -> Self {
        Self {
            platform_manager: Arc::new(
                crate::UnixProcessManagerFactory::create_process_manager(),
            ),
            active_processes: Arc::new(Mutex::new(HashMap::new())),
            config: config.clone(),
        }
    }

    async fn start_service(&self, log_path: &Path) -> Result<UnixProcessHandle> {
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

    async fn terminate_service(&self, handle: &mut UnixProcessHandle) -> TerminationResult {
        let Some(pid) = handle.get_pid() else {
            return TerminationResult::ProcessNotFound;
        };

        // Group kill first; the tree walk only matters if the child left
        // its own group.
        let result = match self.platform_manager.terminate_process_group(pid).await {
            TerminationResult::Success | TerminationResult::ProcessNotFound => {
                TerminationResult::Success
            }
            _ => self.platform_manager.terminate_process_tree(pid).await,
        };

        // Reap so no zombie outlives the attempt
        let _ = self.platform_manager.force_kill(handle).await;

        self.active_processes.lock().unwrap().remove(&pid);
        result
    }

    async fn release_service(&self, handle: &UnixProcessHandle) {
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

impl Drop for UnixServiceManager {
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
                use nix::sys::signal::{self, Signal};
                use nix::unistd::Pid as NixPid;

                let nix_pid = NixPid::from_raw(pid.0 as i32);

                // Group kill, then the process itself if the group is gone
                if signal::killpg(nix_pid, Signal::SIGKILL).is_err() {
                    if let Err(e) = signal::kill(nix_pid, Signal::SIGKILL) {
                        tracing::warn!(
                            "failed to send SIGKILL to process {} during drop: {}",
                            pid.0,
                            e
                        );
                    }
                }
            }
        }
    }
}

/// Factory for creating Unix ServiceProcessManager instances
pub struct UnixServiceManagerFactory;

#[async_trait]
impl ServiceProcessManagerFactory for UnixServiceManagerFactory {
    type Manager = UnixServiceManager;

    fn create_process_manager(config: &ServiceConfig) -> Self::Manager {
        UnixServiceManager::new(config)
    }
}
