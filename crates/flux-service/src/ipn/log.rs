//! The PayPal audit log file.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::io::AsyncWriteExt;

use super::error::IpnError;

/// Appends timestamped lines to `{data_dir}/logs/paypal.log`.
///
/// Every line is also emitted as a `tracing` event under the `flux::paypal`
/// target. Failing to write the file never fails the caller.
#[derive(Debug, Clone)]
pub struct PaypalLog {
    path: PathBuf,
}

impl PaypalLog {
    /// Log to an explicit file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Log to `logs/paypal.log` below a data directory.
    #[must_use]
    pub fn in_data_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join("logs").join("paypal.log"))
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a progress line.
    pub async fn puts(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!(target: "flux::paypal", "{message}");
        self.append(message).await;
    }

    /// Record a processing condition.
    pub async fn report(&self, error: &IpnError) {
        tracing::warn!(target: "flux::paypal", kind = error.kind(), "{error}");
        self.append(&error.to_string()).await;
    }

    async fn append(&self, message: &str) {
        let line = format!("[{}] {message}\n", Utc::now().format("%Y-%m-%d %H:%M:%S"));

        if let Err(e) = self.write_line(&line).await {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to write PayPal log"
            );
        }
    }

    async fn write_line(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lines_are_appended_with_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let log = PaypalLog::in_data_dir(dir.path());

        log.puts("first").await;
        log.report(&IpnError::UnknownServer {
            server_name: "NoSuchRO".into(),
        })
        .await;

        let contents = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] first"));
        assert!(lines[1].contains("Unknown game server \"NoSuchRO\""));
    }

    #[tokio::test]
    async fn unwritable_log_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("logs");
        std::fs::write(&blocker, b"not a directory").unwrap();

        PaypalLog::in_data_dir(dir.path()).puts("lost").await;
    }
}
