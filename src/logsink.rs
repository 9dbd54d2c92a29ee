use anyhow::{Context, Result};
use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Append-only, line-oriented activity log read back by the status view.
pub struct LogSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl LogSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    /// Appends `timestamp - message` as one line.
    pub fn append(&self, message: &str) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("Log sink lock poisoned"))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context(format!("Failed to open log sink: {}", self.path.display()))?;

        let line = format!(
            "{} - {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
            message.replace('\n', " ")
        );
        file.write_all(line.as_bytes())
            .context("Failed to write to log sink")?;

        Ok(())
    }

    /// Whole log contents; empty when nothing was logged yet.
    pub fn read_all(&self) -> Result<String> {
        if !self.path.exists() {
            return Ok(String::new());
        }
        std::fs::read_to_string(&self.path)
            .context(format!("Failed to read log sink: {}", self.path.display()))
    }
}
