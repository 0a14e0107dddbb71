use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Reader side of a service's combined stdout/stderr capture file.
///
/// The launcher truncates the file at the start of every attempt and then
/// polls it for the readiness marker. Only the child writes to the file;
/// the watcher never holds it open between polls.
pub struct LogWatcher {
    path: PathBuf,
}

impl LogWatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the log file, discarding any content from earlier attempts.
    pub async fn truncate(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::File::create(&self.path).await?;
        Ok(())
    }

    /// Check whether the accumulated log contains `marker` anywhere.
    ///
    /// Detection is purely textual; a missing file means the child has not
    /// produced output yet and reads as "no marker".
    pub async fn contains_marker(&self, marker: &str) -> std::io::Result<bool> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).contains(marker)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Append a line to the log, e.g. the terminal failure note.
    pub async fn append_line(&self, line: &str) -> std::io::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await
    }

    /// Last `n` lines of the log, for failure diagnostics.
    pub async fn tail(&self, n: usize) -> std::io::Result<Vec<String>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let text = String::from_utf8_lossy(&bytes);
        let lines: Vec<&str> = text.lines().collect();
        let start = lines.len().saturating_sub(n);
        Ok(lines[start..].iter().map(|s| (*s).to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_reads_as_no_marker() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = LogWatcher::new(dir.path().join("missing.log"));
        assert!(!watcher.contains_marker("ready").await.unwrap());
        assert!(watcher.tail(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_marker_detected_anywhere_in_log() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = LogWatcher::new(dir.path().join("svc.log"));
        watcher.truncate().await.unwrap();

        watcher.append_line("INFO loading weights").await.unwrap();
        assert!(!watcher.contains_marker("startup complete").await.unwrap());

        watcher
            .append_line("INFO startup complete (8000)")
            .await
            .unwrap();
        assert!(watcher.contains_marker("startup complete").await.unwrap());
    }

    #[tokio::test]
    async fn test_truncate_discards_previous_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = LogWatcher::new(dir.path().join("svc.log"));
        watcher.truncate().await.unwrap();
        watcher.append_line("ready").await.unwrap();
        assert!(watcher.contains_marker("ready").await.unwrap());

        watcher.truncate().await.unwrap();
        assert!(!watcher.contains_marker("ready").await.unwrap());
    }

    #[tokio::test]
    async fn test_truncate_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = LogWatcher::new(dir.path().join("logs/nested/svc.log"));
        watcher.truncate().await.unwrap();
        assert!(watcher.path().exists());
    }

    #[tokio::test]
    async fn test_tail_returns_last_lines() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = LogWatcher::new(dir.path().join("svc.log"));
        watcher.truncate().await.unwrap();
        for i in 0..5 {
            watcher.append_line(&format!("line {i}")).await.unwrap();
        }

        let tail = watcher.tail(2).await.unwrap();
        assert_eq!(tail, vec!["line 3".to_string(), "line 4".to_string()]);

        let all = watcher.tail(100).await.unwrap();
        assert_eq!(all.len(), 5);
    }
}
