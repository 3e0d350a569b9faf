use chrono::{DateTime, Utc};
use std::error::Error as StdError;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{error, warn};
use omni_core::Error;

/// Append-only file of model failures. Writes are best effort.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn record(&self, err: &Error) {
        error!("{}", err.summary());
        if let Err(e) = self.append(&format_entry(err, Utc::now())).await {
            warn!("could not write error log {}: {}", self.path.display(), e);
        }
    }

    async fn append(&self, entry: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path).await?;
        file.write_all(entry.as_bytes()).await?;
        file.flush().await
    }
}

pub fn format_entry(err: &Error, at: DateTime<Utc>) -> String {
    let mut entry = format!(
        "{}\ntime={}\nerror={}\n",
        "=".repeat(60),
        at.format("%Y-%m-%dT%H:%M:%SZ"),
        err.summary()
    );
    let mut source = err.source();
    while let Some(cause) = source {
        entry.push_str(&format!("caused by: {}\n", cause));
        source = cause.source();
    }
    entry.push('\n');
    entry
}
