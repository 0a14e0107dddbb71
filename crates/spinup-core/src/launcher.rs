use crate::config::{RetryPolicy, ServiceConfig};
use crate::error::LaunchError;
use crate::log_watch::LogWatcher;
use crate::manager::ServiceProcessManager;
use crate::process::{ProcessHandle, ProcessId, ProcessStatus};
use backon::{ConstantBuilder, Retryable};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Outcome of a single launch attempt's polling loop
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// The readiness marker appeared in the log
    Started,
    /// The child exited before emitting the marker
    ProcessExited(ProcessStatus),
    /// Neither marker nor exit within the startup budget
    TimedOut { waited: Duration },
}

/// One start-monitor-terminate-or-succeed cycle. Created at the start of
/// each retry iteration, discarded when the attempt concludes.
struct LaunchAttempt {
    number: u32,
    started_at: Instant,
    pid: Option<ProcessId>,
    log_path: PathBuf,
}

/// A service whose startup has been confirmed.
///
/// The child process is still running; dropping this value does not stop
/// it. Lifecycle ownership has passed to the caller.
#[derive(Debug)]
pub struct Launched<Handle> {
    attempts: u32,
    pid: Option<ProcessId>,
    log_path: PathBuf,
    handle: Handle,
}

impl<Handle: ProcessHandle> Launched<Handle> {
    /// Number of attempts used, including the successful one
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn pid(&self) -> Option<ProcessId> {
        self.pid
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn into_handle(self) -> Handle {
        self.handle
    }
}

/// Launches a service process and confirms startup by polling its log for
/// a readiness marker, retrying failed attempts up to the policy's cap.
///
/// Per attempt: truncate the log, spawn the service, then poll. The marker
/// wins, a premature exit fails the attempt, and hitting the startup budget
/// forcefully kills the child before the next attempt. Sequential attempts
/// only: at most one child is alive per launcher at any time.
pub struct Launcher<Manager> {
    config: ServiceConfig,
    policy: RetryPolicy,
    manager: Arc<Manager>,
    log_path: PathBuf,
}

impl<Manager: ServiceProcessManager> Launcher<Manager> {
    pub fn new(
        config: ServiceConfig,
        policy: RetryPolicy,
        manager: Arc<Manager>,
    ) -> Result<Self, LaunchError> {
        policy.validate()?;
        config.validate()?;
        let log_path = config
            .log_path
            .clone()
            .ok_or_else(|| LaunchError::InvalidConfig("log path must be set".to_string()))?;

        Ok(Self {
            config,
            policy,
            manager,
            log_path,
        })
    }

    /// Run attempts until the service confirms startup or the attempt
    /// budget is exhausted.
    pub async fn launch(&self) -> Result<Launched<Manager::Handle>, LaunchError> {
        let attempts = AtomicU32::new(0);

        let operation = || async {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            self.launch_attempt(attempt).await
        };

        let retry_strategy = ConstantBuilder::default()
            .with_delay(self.policy.retry_delay())
            .with_max_times(self.policy.max_attempts.saturating_sub(1) as usize);

        let result = operation
            .retry(retry_strategy)
            .when(|e: &LaunchError| e.is_retryable())
            .notify(|err: &LaunchError, _| {
                warn!(service = %self.config.name, error = %err, "launch attempt failed, retrying");
            })
            .await;

        match result {
            Ok(launched) => Ok(launched),
            Err(last) => {
                let attempts = attempts.load(Ordering::SeqCst);
                let note = format!(
                    "spinup: giving up on {} after {} attempts: {}",
                    self.config.name, attempts, last
                );
                if let Err(e) = LogWatcher::new(&self.log_path).append_line(&note).await {
                    warn!(error = %e, "failed to append failure note to log");
                }
                if let Err(e) = self.manager.cleanup().await {
                    warn!(error = %e, "process manager cleanup failed");
                }
                Err(LaunchError::AttemptsExhausted {
                    attempts,
                    last: Box::new(last),
                })
            }
        }
    }

    async fn launch_attempt(
        &self,
        attempt: u32,
    ) -> Result<Launched<Manager::Handle>, LaunchError> {
        let watcher = LogWatcher::new(&self.log_path);
        watcher.truncate().await?;

        let mut handle = self
            .manager
            .start_service(&self.log_path)
            .await
            .map_err(|e| LaunchError::SpawnFailed(format!("{e:#}")))?;

        let record = LaunchAttempt {
            number: attempt,
            started_at: Instant::now(),
            pid: handle.get_pid(),
            log_path: self.log_path.clone(),
        };
        info!(
            service = %self.config.name,
            attempt = record.number,
            pid = record.pid.map(|p| p.0),
            log = %record.log_path.display(),
            "launch attempt started"
        );

        let outcome = match self.poll_for_readiness(&watcher, &mut handle, &record).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // The child may still be alive; never leave it behind.
                let _ = self.manager.terminate_service(&mut handle).await;
                return Err(e);
            }
        };

        match outcome {
            AttemptOutcome::Started => {
                self.manager.release_service(&handle).await;
                info!(
                    service = %self.config.name,
                    attempt,
                    pid = record.pid.map(|p| p.0),
                    "service ready"
                );
                Ok(Launched {
                    attempts: attempt,
                    pid: record.pid,
                    log_path: record.log_path,
                    handle,
                })
            }
            AttemptOutcome::ProcessExited(status) => {
                // Sweep any surviving members of the child's process group
                // so the next attempt starts clean.
                let _ = self.manager.terminate_service(&mut handle).await;
                Err(LaunchError::ProcessExited { attempt, status })
            }
            AttemptOutcome::TimedOut { waited } => {
                let result = self.manager.terminate_service(&mut handle).await;
                warn!(
                    service = %self.config.name,
                    attempt,
                    termination = ?result,
                    "killed unresponsive service"
                );
                Err(LaunchError::TimedOut { attempt, waited })
            }
        }
    }

    async fn poll_for_readiness(
        &self,
        watcher: &LogWatcher,
        handle: &mut Manager::Handle,
        record: &LaunchAttempt,
    ) -> Result<AttemptOutcome, LaunchError> {
        let timeout = self.policy.startup_timeout();

        loop {
            // Marker is checked before liveness: a child that exits right
            // after printing the marker still counts as started.
            if watcher.contains_marker(&self.config.success_marker).await? {
                return Ok(AttemptOutcome::Started);
            }

            if let Some(status) = handle.try_wait().await? {
                return Ok(AttemptOutcome::ProcessExited(status));
            }

            let waited = record.started_at.elapsed();
            if waited >= timeout {
                return Ok(AttemptOutcome::TimedOut { waited });
            }

            tokio::time::sleep(self.policy.poll_interval()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::TerminationResult;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    /// Scripted behavior for one spawned process, consumed per attempt.
    #[derive(Clone)]
    enum Script {
        /// Write the marker to the log after the delay, then stay alive.
        ReadyAfter(Duration),
        /// Write the marker immediately and exit at once (the race case).
        ReadyAndExit,
        /// Exit without ever writing the marker.
        ExitAfter(Duration),
        /// Stay alive forever without writing the marker.
        Hang,
        /// Fail to spawn at all.
        FailSpawn,
    }

    #[derive(Debug)]
    struct MockHandle {
        pid: Option<ProcessId>,
        command: String,
        exit_at: Option<Instant>,
        killed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl ProcessHandle for MockHandle {
        fn get_pid(&self) -> Option<ProcessId> {
            self.pid
        }

        fn get_command(&self) -> &str {
            &self.command
        }

        fn get_args(&self) -> &[String] {
            &[]
        }

        async fn is_running(&self) -> bool {
            !self.killed.load(Ordering::SeqCst)
                && self.exit_at.is_none_or(|at| Instant::now() < at)
        }

        async fn try_wait(&mut self) -> Result<Option<ProcessStatus>> {
            if self.killed.load(Ordering::SeqCst) {
                return Ok(Some(ProcessStatus::Terminated));
            }
            match self.exit_at {
                Some(at) if Instant::now() >= at => Ok(Some(ProcessStatus::Terminated)),
                _ => Ok(None),
            }
        }

        async fn wait(&mut self) -> Result<ProcessStatus> {
            Ok(ProcessStatus::Terminated)
        }

        async fn kill(&mut self) -> Result<()> {
            self.killed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct MockServiceManager {
        config: ServiceConfig,
        scripts: Mutex<VecDeque<Script>>,
        spawned: AtomicUsize,
        terminated: AtomicUsize,
        released: AtomicUsize,
    }

    impl MockServiceManager {
        fn scripted(
            config: &ServiceConfig,
            scripts: impl IntoIterator<Item = Script>,
        ) -> Arc<Self> {
            let manager = Self::new(config);
            *manager.scripts.lock().unwrap() = scripts.into_iter().collect();
            Arc::new(manager)
        }

        fn spawned(&self) -> usize {
            self.spawned.load(Ordering::SeqCst)
        }

        fn terminated(&self) -> usize {
            self.terminated.load(Ordering::SeqCst)
        }

        fn released(&self) -> usize {
            self.released.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ServiceProcessManager for MockServiceManager {
        type Handle = MockHandle;

        fn new(config: &ServiceConfig) -> Self {
            Self {
                config: config.clone(),
                scripts: Mutex::new(VecDeque::new()),
                spawned: AtomicUsize::new(0),
                terminated: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
            }
        }

        async fn start_service(&self, log_path: &Path) -> Result<MockHandle> {
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Script::Hang);
            let n = self.spawned.fetch_add(1, Ordering::SeqCst) + 1;

            let marker = self.config.success_marker.clone();
            let watcher = LogWatcher::new(log_path);

            let exit_at = match script {
                Script::FailSpawn => {
                    anyhow::bail!("spawn refused");
                }
                Script::ReadyAfter(delay) => {
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = watcher.append_line(&marker).await;
                    });
                    None
                }
                Script::ReadyAndExit => {
                    watcher.append_line(&marker).await?;
                    Some(Instant::now())
                }
                Script::ExitAfter(delay) => Some(Instant::now() + delay),
                Script::Hang => None,
            };

            Ok(MockHandle {
                pid: Some(ProcessId(1000 + n as u32)),
                command: self.config.command.clone(),
                exit_at,
                killed: Arc::new(AtomicBool::new(false)),
            })
        }

        async fn terminate_service(&self, handle: &mut MockHandle) -> TerminationResult {
            self.terminated.fetch_add(1, Ordering::SeqCst);
            handle.killed.store(true, Ordering::SeqCst);
            TerminationResult::Success
        }

        async fn release_service(&self, _handle: &MockHandle) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }

        async fn cleanup(&self) -> Result<()> {
            Ok(())
        }
    }

    fn test_config(dir: &tempfile::TempDir) -> ServiceConfig {
        ServiceConfig::builder()
            .name("mock-service")
            .command("mock")
            .success_marker("service is ready")
            .log_path(dir.path().join("mock.log"))
            .build()
            .unwrap()
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            startup_timeout_secs: 1,
            poll_interval_ms: 10,
            retry_delay_ms: 0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_marker_before_timeout_succeeds_on_first_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let manager =
            MockServiceManager::scripted(&config, [Script::ReadyAfter(Duration::from_millis(30))]);

        let launcher = Launcher::new(config, fast_policy(2), manager.clone()).unwrap();
        let launched = launcher.launch().await.unwrap();

        assert_eq!(launched.attempts(), 1);
        assert!(launched.pid().is_some());
        assert_eq!(manager.spawned(), 1);
        assert_eq!(manager.released(), 1);
        assert_eq!(manager.terminated(), 0);
        assert!(launched.handle().is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_marker_wins_over_simultaneous_exit() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let manager = MockServiceManager::scripted(&config, [Script::ReadyAndExit]);

        let launcher = Launcher::new(config, fast_policy(2), manager.clone()).unwrap();
        let launched = launcher.launch().await.unwrap();

        assert_eq!(launched.attempts(), 1);
        assert_eq!(manager.terminated(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_before_marker_triggers_retry() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let manager = MockServiceManager::scripted(
            &config,
            [
                Script::ExitAfter(Duration::from_millis(20)),
                Script::ReadyAfter(Duration::from_millis(20)),
            ],
        );

        let launcher = Launcher::new(config, fast_policy(2), manager.clone()).unwrap();
        let launched = launcher.launch().await.unwrap();

        assert_eq!(launched.attempts(), 2);
        assert_eq!(manager.spawned(), 2);
        assert_eq!(manager.released(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hang_times_out_twice_and_exhausts() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let log_path = config.log_path.clone().unwrap();
        let manager = MockServiceManager::scripted(&config, [Script::Hang, Script::Hang]);

        let launcher = Launcher::new(config, fast_policy(2), manager.clone()).unwrap();
        let started = Instant::now();
        let err = launcher.launch().await.unwrap_err();

        // Two full startup budgets elapsed, two forced terminations.
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(manager.terminated(), 2);
        match err {
            LaunchError::AttemptsExhausted { attempts, last } => {
                assert_eq!(attempts, 2);
                assert!(matches!(*last, LaunchError::TimedOut { attempt: 2, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }

        // The terminal failure is appended to the log.
        let tail = LogWatcher::new(&log_path).tail(1).await.unwrap();
        assert!(tail[0].contains("giving up"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_exit_exhausts_with_last_reason() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let manager = MockServiceManager::scripted(
            &config,
            [
                Script::ExitAfter(Duration::from_millis(10)),
                Script::ExitAfter(Duration::from_millis(10)),
            ],
        );

        let launcher = Launcher::new(config, fast_policy(2), manager.clone()).unwrap();
        let err = launcher.launch().await.unwrap_err();

        assert_eq!(manager.spawned(), 2);
        match err {
            LaunchError::AttemptsExhausted { attempts, last } => {
                assert_eq!(attempts, 2);
                assert!(matches!(*last, LaunchError::ProcessExited { attempt: 2, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_failure_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let manager = MockServiceManager::scripted(
            &config,
            [Script::FailSpawn, Script::ReadyAfter(Duration::from_millis(10))],
        );

        let launcher = Launcher::new(config, fast_policy(2), manager.clone()).unwrap();
        let launched = launcher.launch().await.unwrap();

        assert_eq!(launched.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_shot_policy_does_not_retry() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let manager = MockServiceManager::scripted(
            &config,
            [Script::ExitAfter(Duration::from_millis(10)), Script::Hang],
        );

        let launcher = Launcher::new(config, fast_policy(1), manager.clone()).unwrap();
        let err = launcher.launch().await.unwrap_err();

        assert_eq!(manager.spawned(), 1);
        assert!(matches!(
            err,
            LaunchError::AttemptsExhausted { attempts: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_launcher_rejects_invalid_policy() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let manager = MockServiceManager::scripted(&config, std::iter::empty());

        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert!(matches!(
            Launcher::new(config, policy, manager),
            Err(LaunchError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_launcher_rejects_missing_log_path() {
        let config = ServiceConfig::builder()
            .name("mock-service")
            .command("mock")
            .success_marker("ready")
            .build()
            .unwrap();
        let manager = MockServiceManager::scripted(&config, std::iter::empty());

        assert!(matches!(
            Launcher::new(config, RetryPolicy::default(), manager),
            Err(LaunchError::InvalidConfig(_))
        ));
    }
}
