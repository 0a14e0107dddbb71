use std::time::Duration;
use thiserror::Error;

use crate::process::ProcessStatus;

/// Error taxonomy for service launches
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("failed to spawn service process: {0}")]
    SpawnFailed(String),

    #[error("process exited before readiness on attempt {attempt} ({status:?})")]
    ProcessExited { attempt: u32, status: ProcessStatus },

    #[error("no readiness marker after {waited:?} on attempt {attempt}")]
    TimedOut { attempt: u32, waited: Duration },

    #[error("all {attempts} launch attempts failed")]
    AttemptsExhausted {
        attempts: u32,
        #[source]
        last: Box<LaunchError>,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("process management error: {0}")]
    Process(#[from] anyhow::Error),
}

impl LaunchError {
    /// Check if this error is retryable within the attempt budget.
    ///
    /// Every per-attempt failure is retried identically; there is no
    /// transient/permanent split below the attempt cap.
    pub fn is_retryable(&self) -> bool {
        !self.is_permanent()
    }

    /// Check if this error indicates a permanent failure
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            LaunchError::InvalidConfig(_) | LaunchError::AttemptsExhausted { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categorization() {
        // Retryable errors
        assert!(LaunchError::SpawnFailed("test".to_string()).is_retryable());
        assert!(
            LaunchError::ProcessExited {
                attempt: 1,
                status: ProcessStatus::Terminated,
            }
            .is_retryable()
        );
        assert!(
            LaunchError::TimedOut {
                attempt: 1,
                waited: Duration::from_secs(10),
            }
            .is_retryable()
        );

        // Non-retryable errors
        assert!(!LaunchError::InvalidConfig("bad".to_string()).is_retryable());
        assert!(
            !LaunchError::AttemptsExhausted {
                attempts: 2,
                last: Box::new(LaunchError::TimedOut {
                    attempt: 2,
                    waited: Duration::from_secs(10),
                }),
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_error_display() {
        let error = LaunchError::TimedOut {
            attempt: 2,
            waited: Duration::from_secs(10),
        };
        let display = format!("{error}");
        assert!(display.contains("attempt 2"));

        let error = LaunchError::AttemptsExhausted {
            attempts: 2,
            last: Box::new(error),
        };
        assert!(format!("{error}").contains("2 launch attempts"));
    }

    #[test]
    fn test_exhaustion_preserves_last_failure() {
        let error = LaunchError::AttemptsExhausted {
            attempts: 2,
            last: Box::new(LaunchError::ProcessExited {
                attempt: 2,
                status: ProcessStatus::Terminated,
            }),
        };
        let source = std::error::Error::source(&error).expect("source");
        assert!(format!("{source}").contains("exited before readiness"));
    }
}
