use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tracing::warn;

const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024; // 10MB

/// Append-only record of every allow/deny decision the gateway makes
#[derive(Debug, Clone)]
pub struct AuditLogger {
    file: Arc<LogFile>,
}

#[derive(Debug)]
struct LogFile {
    path: PathBuf,
    // Serializes rotate + append across concurrent requests
    write_lock: Mutex<()>,
}

/// One gateway decision
#[derive(Debug, Clone, Copy)]
pub struct AuditEntry<'a> {
    pub container: Option<&'a str>,
    pub repo_path: &'a str,
    pub allowed: bool,
    pub operation: &'a str,
    pub args: &'a [String],
    pub reason: &'a str,
}

impl AuditLogger {
    /// Create an AuditLogger with a custom log path
    pub fn with_path<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let log_path = path.as_ref().to_path_buf();

        // Ensure directory exists
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent)?;
        }

        Ok(Self {
            file: Arc::new(LogFile {
                path: log_path,
                write_lock: Mutex::new(()),
            }),
        })
    }

    /// Record a decision; failures are logged and swallowed
    pub fn log_decision(&self, entry: AuditEntry<'_>) {
        let line = format_entry(&entry);
        if let Err(e) = self.file.append(&line) {
            self.warn_failed(&e);
        }
    }

    /// Record a decision from async code.
    ///
    /// The file I/O runs on the blocking pool, so request tasks never wait
    /// on the write lock or the disk. Failures are logged and swallowed.
    pub async fn record(&self, entry: AuditEntry<'_>) {
        let line = format_entry(&entry);
        let file = Arc::clone(&self.file);

        match tokio::task::spawn_blocking(move || file.append(&line)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.warn_failed(&e),
            Err(e) => self.warn_failed(&e),
        }
    }

    fn warn_failed(&self, error: &dyn std::fmt::Display) {
        warn!(
            path = %self.file.path.display(),
            error = %error,
            "failed to write audit log entry"
        );
    }

    /// Get the path to the log file
    pub fn log_path(&self) -> &Path {
        &self.file.path
    }
}

impl LogFile {
    fn append(&self, line: &str) -> std::io::Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        // Check and rotate log if needed
        self.rotate_if_needed()?;

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;

        file.write_all(line.as_bytes())?;
        file.flush()?;

        Ok(())
    }

    /// Rotate log file if it exceeds MAX_LOG_SIZE
    fn rotate_if_needed(&self) -> std::io::Result<()> {
        if !self.path.exists() {
            return Ok(());
        }

        let metadata = fs::metadata(&self.path)?;
        if metadata.len() > MAX_LOG_SIZE {
            // Rotate: audit.log -> audit.log.1
            let backup_path = self.path.with_extension("log.1");
            fs::rename(&self.path, backup_path)?;
        }

        Ok(())
    }
}

fn format_entry(entry: &AuditEntry<'_>) -> String {
    format!(
        "[{}] [{}] [{}] [{}] {} {} {}\n",
        Utc::now().to_rfc3339(),
        entry.container.unwrap_or("unknown"),
        entry.repo_path,
        if entry.allowed { "ALLOWED" } else { "DENIED" },
        entry.operation,
        format_args(entry.args),
        format_reason(entry.reason),
    )
}

fn format_args(args: &[String]) -> String {
    format!("{:?}", args)
}

// Keep one entry per line whatever the reason text contains
fn format_reason(reason: &str) -> String {
    format!("reason=\"{}\"", reason.replace(['\n', '\r'], " "))
}
