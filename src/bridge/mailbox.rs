//! Request and response mailbox files
//!
//! Both files are single-slot handoff points. The request file is written by
//! an external producer and cleared by the bridge once consumed; the
//! response file is truncated when a request is accepted and then grows one
//! fragment at a time.

use crate::errors::{BridgeError, Result};
use crate::types::Fragment;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Default request file name
pub const DEFAULT_REQUEST_FILE: &str = "input.txt";

/// Default response file name
pub const DEFAULT_RESPONSE_FILE: &str = "output.txt";

/// How far each fragment is pushed before the next one is read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Durability {
    /// Handed to the OS, visible to concurrent readers
    #[default]
    Flush,

    /// Additionally forced to disk with `fsync`
    Sync,
}

impl Durability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Durability::Flush => "flush",
            Durability::Sync => "sync",
        }
    }
}

/// Paired request/response files
#[derive(Debug, Clone)]
pub struct Mailbox {
    request_path: PathBuf,
    response_path: PathBuf,
    durability: Durability,
    completion_marker: Option<PathBuf>,
}

impl Mailbox {
    pub fn new(request_path: impl Into<PathBuf>, response_path: impl Into<PathBuf>) -> Self {
        Self {
            request_path: request_path.into(),
            response_path: response_path.into(),
            durability: Durability::default(),
            completion_marker: None,
        }
    }

    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    /// Touch `marker` after every cycle and remove it when a request is accepted
    pub fn with_completion_marker(mut self, marker: Option<PathBuf>) -> Self {
        self.completion_marker = marker;
        self
    }

    pub fn request_path(&self) -> &Path {
        &self.request_path
    }

    pub fn response_path(&self) -> &Path {
        &self.response_path
    }

    pub fn completion_marker(&self) -> Option<&Path> {
        self.completion_marker.as_deref()
    }

    /// Create parent directories and an empty request file if missing
    pub async fn prepare(&self) -> Result<()> {
        for path in [&self.request_path, &self.response_path] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).await?;
            }
        }

        if fs::metadata(&self.request_path).await.is_err() {
            File::create(&self.request_path).await?;
            debug!(path = %self.request_path.display(), "Created request file");
        }

        Ok(())
    }

    /// Read the request file with surrounding whitespace removed
    ///
    /// A missing file reads as empty.
    pub async fn read_request(&self) -> Result<String> {
        match fs::read_to_string(&self.request_path).await {
            Ok(contents) => Ok(contents.trim().to_string()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) if e.kind() == ErrorKind::InvalidData => Err(BridgeError::MalformedRequest(
                "request file is not valid UTF-8".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Truncate the request file
    ///
    /// Returns `false` when it was already empty; an empty file is left
    /// untouched so clearing does not trigger yet another notification.
    pub async fn clear_request(&self) -> Result<bool> {
        match fs::metadata(&self.request_path).await {
            Ok(meta) if meta.len() == 0 => return Ok(false),
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        File::create(&self.request_path).await?;
        Ok(true)
    }

    /// Truncate the response file and open it for appending
    pub async fn reset_response(&self) -> Result<ResponseWriter> {
        File::create(&self.response_path)
            .await
            .map_err(|source| self.write_error(source))?;

        let file = OpenOptions::new()
            .append(true)
            .open(&self.response_path)
            .await
            .map_err(|source| self.write_error(source))?;

        Ok(ResponseWriter {
            file,
            path: self.response_path.clone(),
            durability: self.durability,
            bytes_written: 0,
        })
    }

    /// Read the full response file
    pub async fn read_response(&self) -> Result<String> {
        match fs::read_to_string(&self.response_path).await {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn remove_marker(&self) -> Result<()> {
        let Some(marker) = &self.completion_marker else {
            return Ok(());
        };

        match fs::remove_file(marker).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn write_marker(&self) -> Result<()> {
        let Some(marker) = &self.completion_marker else {
            return Ok(());
        };

        fs::write(marker, chrono::Utc::now().to_rfc3339()).await?;
        Ok(())
    }

    fn write_error(&self, source: std::io::Error) -> BridgeError {
        BridgeError::PartialWrite {
            path: self.response_path.clone(),
            source,
        }
    }
}

/// Append handle for one cycle's response
#[derive(Debug)]
pub struct ResponseWriter {
    file: File,
    path: PathBuf,
    durability: Durability,
    bytes_written: u64,
}

impl ResponseWriter {
    /// Append one fragment; it is visible to readers when this returns
    pub async fn append(&mut self, fragment: &Fragment) -> Result<()> {
        self.write(fragment.content().as_bytes())
            .await
            .map_err(|source| BridgeError::PartialWrite {
                path: self.path.clone(),
                source,
            })?;

        self.bytes_written += fragment.len() as u64;
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.file.write_all(bytes).await?;
        self.file.flush().await?;
        if self.durability == Durability::Sync {
            self.file.sync_data().await?;
        }
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn mailbox(dir: &TempDir) -> Mailbox {
        Mailbox::new(dir.path().join("input.txt"), dir.path().join("output.txt"))
    }

    #[tokio::test]
    async fn test_prepare_creates_request_file() {
        let dir = TempDir::new().unwrap();
        let mailbox = Mailbox::new(
            dir.path().join("nested/input.txt"),
            dir.path().join("nested/output.txt"),
        );

        mailbox.prepare().await.unwrap();
        assert!(mailbox.request_path().exists());
        assert_eq!(mailbox.read_request().await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_prepare_keeps_existing_request() {
        let dir = TempDir::new().unwrap();
        let mailbox = mailbox(&dir);
        std::fs::write(mailbox.request_path(), "{\"model\":\"x\"}").unwrap();

        mailbox.prepare().await.unwrap();
        assert_eq!(mailbox.read_request().await.unwrap(), "{\"model\":\"x\"}");
    }

    #[tokio::test]
    async fn test_read_request_trims() {
        let dir = TempDir::new().unwrap();
        let mailbox = mailbox(&dir);
        std::fs::write(mailbox.request_path(), "\n  {\"a\":1}  \n").unwrap();

        assert_eq!(mailbox.read_request().await.unwrap(), "{\"a\":1}");
    }

    #[tokio::test]
    async fn test_read_non_utf8_request_is_malformed() {
        let dir = TempDir::new().unwrap();
        let mailbox = mailbox(&dir);
        std::fs::write(mailbox.request_path(), [0x7b, 0xff, 0xfe, 0x7d]).unwrap();

        assert!(matches!(
            mailbox.read_request().await,
            Err(BridgeError::MalformedRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_read_missing_request_is_empty() {
        let dir = TempDir::new().unwrap();
        assert_eq!(mailbox(&dir).read_request().await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_clear_request_only_writes_when_needed() {
        let dir = TempDir::new().unwrap();
        let mailbox = mailbox(&dir);
        std::fs::write(mailbox.request_path(), "pending").unwrap();

        assert!(mailbox.clear_request().await.unwrap());
        assert_eq!(std::fs::read_to_string(mailbox.request_path()).unwrap(), "");
        assert!(!mailbox.clear_request().await.unwrap());
    }

    #[tokio::test]
    async fn test_reset_response_truncates_then_appends() {
        let dir = TempDir::new().unwrap();
        let mailbox = mailbox(&dir);
        std::fs::write(mailbox.response_path(), "stale answer").unwrap();

        let mut writer = mailbox.reset_response().await.unwrap();
        assert_eq!(mailbox.read_response().await.unwrap(), "");

        writer.append(&Fragment::new("Hel").unwrap()).await.unwrap();
        assert_eq!(mailbox.read_response().await.unwrap(), "Hel");

        writer.append(&Fragment::new("lo").unwrap()).await.unwrap();
        assert_eq!(mailbox.read_response().await.unwrap(), "Hello");
        assert_eq!(writer.bytes_written(), 5);
    }

    #[tokio::test]
    async fn test_sync_durability_appends() {
        let dir = TempDir::new().unwrap();
        let mailbox = mailbox(&dir).with_durability(Durability::Sync);

        let mut writer = mailbox.reset_response().await.unwrap();
        writer.append(&Fragment::new("durable").unwrap()).await.unwrap();
        assert_eq!(mailbox.read_response().await.unwrap(), "durable");
    }

    #[tokio::test]
    async fn test_reset_response_in_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let mailbox = Mailbox::new(
            dir.path().join("input.txt"),
            dir.path().join("missing/output.txt"),
        );

        let result = mailbox.reset_response().await;
        assert!(matches!(result, Err(BridgeError::PartialWrite { .. })));
    }

    #[tokio::test]
    async fn test_completion_marker_lifecycle() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("output.done");
        let mailbox = mailbox(&dir).with_completion_marker(Some(marker.clone()));

        mailbox.remove_marker().await.unwrap();
        mailbox.write_marker().await.unwrap();
        assert!(marker.exists());

        mailbox.remove_marker().await.unwrap();
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_marker_noop_when_unset() {
        let dir = TempDir::new().unwrap();
        let mailbox = mailbox(&dir);

        mailbox.write_marker().await.unwrap();
        mailbox.remove_marker().await.unwrap();
        assert!(mailbox.completion_marker().is_none());
    }

    #[test]
    fn test_durability_serde() {
        let parsed: Durability = serde_json::from_str("\"sync\"").unwrap();
        assert_eq!(parsed, Durability::Sync);
        assert_eq!(Durability::default().as_str(), "flush");
    }
}
