use anyhow::Result;
use async_trait::async_trait;
use spinup_core::{
    ProcessHandle, ProcessId, ProcessLifecycle, ProcessManager, ProcessManagerFactory,
    ProcessStatus, ProcessTermination, TerminationResult,
};
use std::collections::HashMap;
use std::path::Path;

#[cfg(unix)]
mod unix_impl {
    use super::*;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid as NixPid;
    use std::process::Stdio;
    use sysinfo::System;
    use tokio::process::{Child, Command};
    use tracing::{info, warn};

    /// Unix-specific process handle implementation
    #[derive(Debug)]
    pub struct UnixProcessHandle {
        child: Child,
        command: String,
        args: Vec<String>,
    }

    impl UnixProcessHandle {
        pub fn new(child: Child, command: String, args: Vec<String>) -> Self {
            Self {
                child,
                command,
                args,
            }
        }
    }

    #[async_trait]
    impl ProcessHandle for UnixProcessHandle {
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
                // Signal 0 probes for existence without touching the process
                let nix_pid = NixPid::from_raw(pid.0 as i32);
                if signal::kill(nix_pid, None).is_err() {
                    info!("process {} is no longer running", pid.0);
                    false
                } else {
                    true
                }
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

    /// Unix-specific process manager with process tree management
    pub struct UnixProcessManager {
        system: std::sync::Mutex<System>,
    }

    impl Default for UnixProcessManager {
        fn default() -> Self {
            <Self as ProcessManager>::new()
        }
    }

    #[async_trait]
    impl ProcessLifecycle for UnixProcessManager {
        type Handle = UnixProcessHandle;

        async fn spawn_service(
            &self,
            command: &str,
            args: &[String],
            working_dir: Option<&Path>,
            env: &HashMap<String, String>,
            log_path: &Path,
        ) -> Result<UnixProcessHandle> {
            // stdout and stderr share one append-mode capture file
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

            // New process group: group-wide kills and survival past the
            // launcher's own exit
            cmd.process_group(0);

            let child = cmd.spawn()?;

            if let Some(pid) = child.id() {
                info!(
                    "spawned service process: {} (PID: {}) with args: {:?}",
                    command, pid, args
                );
            }

            Ok(UnixProcessHandle::new(
                child,
                command.to_string(),
                args.to_vec(),
            ))
        }
    }

    #[async_trait]
    impl ProcessTermination for UnixProcessManager {
        async fn force_kill(&self, handle: &mut dyn ProcessHandle) -> TerminationResult {
            if let Some(pid) = handle.get_pid() {
                let nix_pid = NixPid::from_raw(pid.0 as i32);

                match signal::kill(nix_pid, Signal::SIGKILL) {
                    Ok(()) => {
                        info!("sent SIGKILL to process {}", pid.0);
                        // Also reap through the handle
                        if let Err(e) = handle.kill().await {
                            warn!("handle kill cleanup failed: {}", e);
                        }
                        TerminationResult::Success
                    }
                    Err(nix::errno::Errno::ESRCH) => TerminationResult::ProcessNotFound,
                    Err(nix::errno::Errno::EPERM) => {
                        warn!("permission denied to kill process {}", pid.0);
                        TerminationResult::AccessDenied
                    }
                    Err(e) => TerminationResult::Failed(format!("SIGKILL failed: {e}")),
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
            info!("terminating process tree for root PID {}", root_pid.0);

            let children = match self.find_child_processes(root_pid).await {
                Ok(children) => children,
                Err(e) => {
                    return TerminationResult::Failed(format!(
                        "Failed to enumerate children: {e}"
                    ));
                }
            };

            // Children first, bottom-up, so nothing re-parents mid-kill
            for child_pid in children.iter().rev() {
                match Self::kill_single_process(*child_pid) {
                    TerminationResult::Success | TerminationResult::ProcessNotFound => {}
                    result => {
                        warn!(
                            "failed to terminate child process {}: {:?}",
                            child_pid.0, result
                        );
                    }
                }
            }

            Self::kill_single_process(root_pid)
        }

        async fn terminate_process_group(&self, pid: ProcessId) -> TerminationResult {
            let pgid = NixPid::from_raw(pid.0 as i32);

            // The timeout path is not a graceful shutdown: SIGKILL the
            // whole group at once.
            match signal::killpg(pgid, Signal::SIGKILL) {
                Ok(()) => {
                    info!("sent SIGKILL to process group {}", pid.0);
                    TerminationResult::Success
                }
                Err(nix::errno::Errno::ESRCH) => TerminationResult::ProcessNotFound,
                Err(nix::errno::Errno::EPERM) => {
                    warn!("permission denied to kill process group {}", pid.0);
                    TerminationResult::AccessDenied
                }
                Err(e) => {
                    TerminationResult::Failed(format!("SIGKILL to process group failed: {e}"))
                }
            }
        }
    }

    impl UnixProcessManager {
        /// SIGKILL a single process by PID
        fn kill_single_process(pid: ProcessId) -> TerminationResult {
            let nix_pid = NixPid::from_raw(pid.0 as i32);

            match signal::kill(nix_pid, Signal::SIGKILL) {
                Ok(()) => TerminationResult::Success,
                Err(nix::errno::Errno::ESRCH) => TerminationResult::ProcessNotFound,
                Err(nix::errno::Errno::EPERM) => TerminationResult::AccessDenied,
                Err(e) => TerminationResult::Failed(format!("SIGKILL failed: {e}")),
            }
        }

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

    #[async_trait]
    impl ProcessManager for UnixProcessManager {
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

// Re-export the Unix implementation when on Unix systems
#[cfg(unix)]
pub use unix_impl::{UnixProcessHandle, UnixProcessManager};

// Provide stub implementations for non-Unix systems
#[cfg(not(unix))]
#[derive(Debug)]
pub struct UnixProcessHandle;

#[cfg(not(unix))]
pub struct UnixProcessManager;

#[cfg(not(unix))]
impl UnixProcessManager {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(not(unix))]
impl Default for UnixProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Factory for creating Unix process managers
pub struct UnixProcessManagerFactory;

#[cfg(unix)]
impl ProcessManagerFactory for UnixProcessManagerFactory {
    type Manager = UnixProcessManager;

    fn create_process_manager() -> Self::Manager {
        <UnixProcessManager as ProcessManager>::new()
    }

    fn platform_name() -> &'static str {
        "Unix"
    }
}
