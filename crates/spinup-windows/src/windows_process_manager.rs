use anyhow::Result;
use async_trait::async_trait;
use spinup_core::{
    ProcessHandle, ProcessId, ProcessLifecycle, ProcessManager, ProcessManagerFactory,
    ProcessStatus, ProcessTermination, TerminationResult,
};
use std::collections::HashMap;
use std::path::Path;

#[cfg(windows)]
mod windows_impl {
    use super::*;
    use std::process::Stdio;
    use sysinfo::System;
    use tokio::process::{Child, Command};
    use tracing::{info, warn};

    /// Windows-specific process handle implementation
    pub struct WindowsProcessHandle {
        child: Child,
        command: String,
        args: Vec<String>,
    }

    impl WindowsProcessHandle {
        pub fn new(child: Child, command: String, args: Vec<String>) -> Self {
            Self {
                child,
                command,
                args,
            }
        }
    }

    #[async_trait]
    impl ProcessHandle for WindowsProcessHandle {
        fn get_pid(&self) -> Option<ProcessId> {
            self.child.id().map(ProcessId::from)
        }

        fn get_command(&self) -> &str {
            &self.command
        }

        fn get_args(&self) -> &[String] {
            &self.args
        }

        async fn is_running(&self) -> bool {
            if let Some(pid) = self.get_pid() {
                let mut system = System::new();
                system.refresh_processes_specifics(
                    sysinfo::ProcessesToUpdate::All,
                    true,
                    sysinfo::ProcessRefreshKind::default(),
                );
                system.processes().keys().any(|p| p.as_u32() == pid.0)
            } else {
                false
            }
        }

        async fn try_wait(&mut self) -> Result<Option<ProcessStatus>> {
            match self.child.try_wait()? {
                Some(status) => Ok(Some(ProcessStatus::Exited(status))),
                None => Ok(None),
            }
        }

        async fn wait(&mut self) -> Result<ProcessStatus> {
            let status = self.child.wait().await?;
            Ok(ProcessStatus::Exited(status))
        }

        async fn kill(&mut self) -> Result<()> {
            self.child
                .kill()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to kill process: {}", e))
        }
    }

    /// Windows-specific process manager with process tree management
    pub struct WindowsProcessManager {
        system: std::sync::Mutex<System>,
    }

    impl Default for WindowsProcessManager {
        fn default() -> Self {
            <Self as ProcessManager>::new()
        }
    }

    #[async_trait]
    impl ProcessLifecycle for WindowsProcessManager {
        type Handle = WindowsProcessHandle;

        async fn spawn_service(
            &self,
            command: &str,
            args: &[String],
            working_dir: Option<&Path>,
            env: &HashMap<String, String>,
            log_path: &Path,
        ) -> Result<WindowsProcessHandle> {
            let log_file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_path)
                .map_err(|e| {
                    anyhow::anyhow!("Failed to open log file {}: {}", log_path.display(), e)
                })?;
            let err_file = log_file.try_clone()?;

            let mut cmd = Command::new(command);
            cmd.args(args);

            if let Some(dir) = working_dir {
                cmd.current_dir(dir);
            }

            for (key, value) in env {
                cmd.env(key, value);
            }

            cmd.stdin(Stdio::null())
                .stdout(Stdio::from(log_file))
                .stderr(Stdio::from(err_file));

            // Detached background process without a console window
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            cmd.creation_flags(CREATE_NEW_PROCESS_GROUP | CREATE_NO_WINDOW);

            let child = cmd.spawn()?;

            if let Some(pid) = child.id() {
                info!(
                    pid = %pid,
                    command = %command,
                    args = ?args,
                    "spawned service process"
                );
            }

            Ok(WindowsProcessHandle::new(
                child,
                command.to_string(),
                args.to_vec(),
            ))
        }
    }

    #[async_trait]
    impl ProcessTermination for WindowsProcessManager {
        async fn force_kill(&self, handle: &mut dyn ProcessHandle) -> TerminationResult {
            if let Some(pid) = handle.get_pid() {
                match taskkill(pid.0).await {
                    Ok(true) => {
                        // Also reap through the handle
                        if let Err(e) = handle.kill().await {
                            warn!(error=%e, "handle kill cleanup failed");
                        }
                        TerminationResult::Success
                    }
                    Ok(false) => TerminationResult::ProcessNotFound,
                    Err(e) => TerminationResult::Failed(format!("taskkill failed: {e}")),
                }
            } else {
                TerminationResult::ProcessNotFound
            }
        }

        async fn find_child_processes(&self, parent_pid: ProcessId) -> Result<Vec<ProcessId>> {
            let mut system = self.system.lock().unwrap();
            system.refresh_processes_specifics(
                sysinfo::ProcessesToUpdate::All,
                true,
                sysinfo::ProcessRefreshKind::default(),
            );

            let mut children = Vec::new();
            Self::find_children_recursive(&system, parent_pid.0, &mut children);

            Ok(children.into_iter().map(ProcessId::from).collect())
        }

        async fn terminate_process_tree(&self, root_pid: ProcessId) -> TerminationResult {
            info!(root_pid = %root_pid.0, "terminating process tree");

            // taskkill /T takes the whole tree down in one call
            match taskkill_tree(root_pid.0).await {
                Ok(true) => TerminationResult::Success,
                Ok(false) => TerminationResult::ProcessNotFound,
                Err(e) => {
                    warn!(root_pid = %root_pid.0, error = %e, "taskkill /T failed, killing manually");

                    let children = match self.find_child_processes(root_pid).await {
                        Ok(children) => children,
                        Err(e) => {
                            return TerminationResult::Failed(format!(
                                "Failed to enumerate children: {e}"
                            ));
                        }
                    };

                    for child_pid in children.iter().rev() {
                        let _ = taskkill(child_pid.0).await;
                    }

                    match taskkill(root_pid.0).await {
                        Ok(true) => TerminationResult::Success,
                        Ok(false) => TerminationResult::ProcessNotFound,
                        Err(e) => TerminationResult::Failed(format!("taskkill failed: {e}")),
                    }
                }
            }
        }

        async fn terminate_process_group(&self, _pid: ProcessId) -> TerminationResult {
            // Process groups are a Unix concept; callers fall through to
            // the tree kill.
            TerminationResult::ProcessNotFound
        }
    }

    impl WindowsProcessManager {
        /// Recursively find all child processes, grandchildren first
        fn find_children_recursive(system: &System, parent_pid: u32, result: &mut Vec<u32>) {
            for (pid, process) in system.processes() {
                #[allow(clippy::collapsible_if)]
                if let Some(ppid) = process.parent() {
                    if ppid.as_u32() == parent_pid {
                        let child_pid = pid.as_u32();
                        Self::find_children_recursive(system, child_pid, result);
                        result.push(child_pid);
                    }
                }
            }
        }
    }

    /// Forcefully taskkill a single PID.
    /// Ok(false) means the process was already gone.
    async fn taskkill(pid: u32) -> Result<bool> {
        let output = Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/F"])
            .output()
            .await?;
        if output.status.success() {
            return Ok(true);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("not found") {
            Ok(false)
        } else {
            anyhow::bail!("taskkill exited with {}: {}", output.status, stderr.trim())
        }
    }

    /// Forcefully kill a PID and all of its descendants.
    async fn taskkill_tree(pid: u32) -> Result<bool> {
        let output = Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/T", "/F"])
            .output()
            .await?;
        if output.status.success() {
            return Ok(true);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("not found") {
            Ok(false)
        } else {
            anyhow::bail!("taskkill exited with {}: {}", output.status, stderr.trim())
        }
    }

    #[async_trait]
    impl ProcessManager for WindowsProcessManager {
        fn new() -> Self {
            Self {
                system: std::sync::Mutex::new(System::new_all()),
            }
        }

        async fn cleanup(&self) -> Result<()> {
            Ok(())
        }
    }
}

// Re-export the Windows implementation when on Windows systems
#[cfg(windows)]
pub use windows_impl::{WindowsProcessHandle, WindowsProcessManager};

// Provide stub implementations for non-Windows systems
#[cfg(not(windows))]
pub struct WindowsProcessHandle;

#[cfg(not(windows))]
pub struct WindowsProcessManager;

#[cfg(not(windows))]
impl WindowsProcessManager {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(not(windows))]
impl Default for WindowsProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Factory for creating Windows process managers
pub struct WindowsProcessManagerFactory;

#[cfg(windows)]
impl ProcessManagerFactory for WindowsProcessManagerFactory {
    type Manager = WindowsProcessManager;

    fn create_process_manager() -> Self::Manager {
        <WindowsProcessManager as ProcessManager>::new()
    }

    fn platform_name() -> &'static str {
        "Windows"
    }
}
